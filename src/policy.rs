// SPDX-License-Identifier: Apache-2.0

//! Rule set merge engine
//!
//! Folds the built-in seed and the user permit/deny/read-only maps into one
//! effective [`DialectPolicy`] per dialect. Rules are applied in a fixed
//! order (seed, user permit, user deny) and each application removes the
//! names from the opposite set, so the last applied rule wins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::RuleConfig;
use crate::dialect::{Dialect, DialectFamily};

/// Functions denied on the mysql family unless explicitly permitted.
pub const DEFAULT_MYSQL_DENY_FUNCTIONS: [&str; 2] = ["extractvalue", "updatexml"];

/// Kind of database object a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Functions,
    Tables,
    Schemas,
    Variants,
    /// Deny-only
    Objects,
    /// Deny-only; the deny set holds the read-only names
    ReadOnlyObjects,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        RuleCategory::Functions,
        RuleCategory::Tables,
        RuleCategory::Schemas,
        RuleCategory::Variants,
        RuleCategory::Objects,
        RuleCategory::ReadOnlyObjects,
    ];

    pub fn is_deny_only(&self) -> bool {
        matches!(self, Self::Objects | Self::ReadOnlyObjects)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Functions => "functions",
            Self::Tables => "tables",
            Self::Schemas => "schemas",
            Self::Variants => "variants",
            Self::Objects => "objects",
            Self::ReadOnlyObjects => "read_only_objects",
        }
    }
}

/// Normalized object name used for every lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Permit and deny sets for one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    pub permit: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

impl RuleSet {
    /// Adds names to the permit set and removes them from the deny set.
    pub fn permit_all<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            let name = normalize_name(name);
            self.deny.remove(&name);
            self.permit.insert(name);
        }
    }

    /// Adds names to the deny set and removes them from the permit set.
    pub fn deny_all<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            let name = normalize_name(name);
            self.permit.remove(&name);
            self.deny.insert(name);
        }
    }

    pub fn is_permitted(&self, name: &str) -> bool {
        self.permit.contains(name)
    }

    /// A name is denied when it is in the deny set and not explicitly
    /// permitted. Expects an already normalized name.
    pub fn is_denied(&self, name: &str) -> bool {
        self.deny.contains(name) && !self.permit.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.permit.is_empty() && self.deny.is_empty()
    }
}

/// Effective policy for one dialect
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DialectPolicy {
    pub functions: RuleSet,
    pub tables: RuleSet,
    pub schemas: RuleSet,
    pub variants: RuleSet,
    pub objects: RuleSet,
    pub read_only_objects: RuleSet,
}

impl DialectPolicy {
    pub fn rules(&self, category: RuleCategory) -> &RuleSet {
        match category {
            RuleCategory::Functions => &self.functions,
            RuleCategory::Tables => &self.tables,
            RuleCategory::Schemas => &self.schemas,
            RuleCategory::Variants => &self.variants,
            RuleCategory::Objects => &self.objects,
            RuleCategory::ReadOnlyObjects => &self.read_only_objects,
        }
    }

    pub fn rules_mut(&mut self, category: RuleCategory) -> &mut RuleSet {
        match category {
            RuleCategory::Functions => &mut self.functions,
            RuleCategory::Tables => &mut self.tables,
            RuleCategory::Schemas => &mut self.schemas,
            RuleCategory::Variants => &mut self.variants,
            RuleCategory::Objects => &mut self.objects,
            RuleCategory::ReadOnlyObjects => &mut self.read_only_objects,
        }
    }

    pub fn is_denied(&self, category: RuleCategory, name: &str) -> bool {
        self.rules(category).is_denied(name)
    }

    /// Names of `ReadOnlyObjects` are stored in the deny set.
    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only_objects.deny.contains(name)
    }

    /// Applies seed, user permit and user deny rules for `dialect` on top of
    /// the current sets. Running it twice gives the same policy as once.
    pub fn merge(&mut self, dialect: Dialect, seed: &PolicySeed, user: &RuleConfig) {
        for category in RuleCategory::ALL {
            let rules = self.rules_mut(category);

            if let Some(defaults) = seed.get(dialect, category) {
                rules.deny_all(defaults.iter().map(String::as_str));
            }

            if !category.is_deny_only() {
                if let Some(permits) = user.permit_rules(category).and_then(|r| r.get(dialect)) {
                    rules.permit_all(permits.iter().map(String::as_str));
                }
            }

            if let Some(denies) = user.deny_rules(category).get(dialect) {
                rules.deny_all(denies.iter().map(String::as_str));
            }
        }
    }
}

/// Builds the effective policy for `dialect` from scratch.
pub fn build_policy(dialect: Dialect, seed: &PolicySeed, user: &RuleConfig) -> DialectPolicy {
    let mut policy = DialectPolicy::default();
    policy.merge(dialect, seed, user);
    policy
}

/// Built-in deny rules applied before any user configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySeed {
    rules: BTreeMap<(Dialect, RuleCategory), BTreeSet<String>>,
}

impl PolicySeed {
    /// Seed without any rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shipped defaults: `extractvalue` and `updatexml` are denied on
    /// every mysql family dialect.
    pub fn builtin() -> Self {
        let mut seed = Self::empty();
        for dialect in Dialect::ALL {
            if dialect.family() == Some(DialectFamily::Mysql) {
                seed = seed.deny(dialect, RuleCategory::Functions, DEFAULT_MYSQL_DENY_FUNCTIONS);
            }
        }
        seed
    }

    pub fn deny<I, S>(mut self, dialect: Dialect, category: RuleCategory, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rules
            .entry((dialect, category))
            .or_default()
            .extend(names.into_iter().map(|n| normalize_name(n.as_ref())));
        self
    }

    pub fn get(&self, dialect: Dialect, category: RuleCategory) -> Option<&BTreeSet<String>> {
        self.rules.get(&(dialect, category))
    }
}

/// Lazily built, cached policies for every dialect seen so far
pub struct PolicyMap {
    seed: PolicySeed,
    user: Arc<RuleConfig>,
    cache: Mutex<HashMap<Dialect, Arc<DialectPolicy>>>,
}

impl PolicyMap {
    pub fn new(seed: PolicySeed, user: Arc<RuleConfig>) -> Self {
        Self {
            seed,
            user,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Policy map with the built-in seed.
    pub fn with_builtin_seed(user: Arc<RuleConfig>) -> Self {
        Self::new(PolicySeed::builtin(), user)
    }

    /// Returns the effective policy for `dialect`, building it on first use.
    pub fn policy_for(&self, dialect: Dialect) -> Arc<DialectPolicy> {
        let mut cache = self.cache.lock();
        if let Some(policy) = cache.get(&dialect) {
            return Arc::clone(policy);
        }

        let policy = Arc::new(build_policy(dialect, &self.seed, &self.user));
        debug!(
            dialect = %dialect,
            denied_functions = policy.functions.deny.len(),
            denied_tables = policy.tables.deny.len(),
            read_only = policy.read_only_objects.deny.len(),
            "Built sqlwall policy"
        );
        cache.insert(dialect, Arc::clone(&policy));
        policy
    }

    pub fn rule_config(&self) -> &RuleConfig {
        &self.user
    }

    /// Number of dialects with a cached policy.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}
