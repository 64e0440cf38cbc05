// SPDX-License-Identifier: Apache-2.0

//! sqlwall configuration
//!
//! Settings are plain JSON, loaded once at startup:
//!
//! ```json
//! {
//!   "enableWarningOnly": false,
//!   "supportCallable": true,
//!   "ignoredStatements": ["com.example.ReportMapper.rawExport"],
//!   "config": {
//!     "database2PermitFunctions": { "MYSQL": ["extractvalue"] },
//!     "database2ReadOnlyObjects": { "postgresql": ["audit_log"] }
//!   }
//! }
//! ```
//!
//! Every malformed input (unknown or duplicate dialect keys, wrong value
//! types, unknown fields, blank names) is rejected here so that a bad
//! configuration can never silently disable checking at runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::error::{WallError, WallResult};
use crate::interceptor::types::InterceptorConfig;
use crate::policy::RuleCategory;
use crate::wall::checker::CheckSettings;

/// Object names keyed by dialect, e.g. `{"mysql": ["extractvalue"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DialectRules(BTreeMap<Dialect, BTreeSet<String>>);

impl DialectRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds names for a dialect (builder style).
    pub fn with<I, S>(mut self, dialect: Dialect, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(dialect)
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, dialect: Dialect) -> Option<&BTreeSet<String>> {
        self.0.get(&dialect)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dialect, &BTreeSet<String>)> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for DialectRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DialectRulesVisitor;

        impl<'de> Visitor<'de> for DialectRulesVisitor {
            type Value = DialectRules;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from dialect name to a list of object names")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut rules = BTreeMap::new();
                while let Some(key) = map.next_key::<String>()? {
                    let dialect = Dialect::from_name(&key)
                        .ok_or_else(|| de::Error::custom(format!("unknown dialect '{}'", key)))?;
                    let names: BTreeSet<String> = map.next_value()?;
                    if rules.insert(dialect, names).is_some() {
                        return Err(de::Error::custom(format!(
                            "duplicate dialect key '{}'",
                            key
                        )));
                    }
                }
                Ok(DialectRules(rules))
            }
        }

        deserializer.deserialize_map(DialectRulesVisitor)
    }
}

/// Permit, deny and read-only rule maps plus checker switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default, rename = "database2DenyFunctions")]
    pub deny_functions: DialectRules,
    #[serde(default, rename = "database2DenyTables")]
    pub deny_tables: DialectRules,
    #[serde(default, rename = "database2DenySchemas")]
    pub deny_schemas: DialectRules,
    #[serde(default, rename = "database2DenyVariants")]
    pub deny_variants: DialectRules,
    #[serde(default, rename = "database2DenyObjects")]
    pub deny_objects: DialectRules,
    #[serde(default, rename = "database2PermitFunctions")]
    pub permit_functions: DialectRules,
    #[serde(default, rename = "database2PermitTables")]
    pub permit_tables: DialectRules,
    #[serde(default, rename = "database2PermitSchemas")]
    pub permit_schemas: DialectRules,
    #[serde(default, rename = "database2PermitVariants")]
    pub permit_variants: DialectRules,
    #[serde(default, rename = "database2ReadOnlyObjects")]
    pub read_only_objects: DialectRules,
    /// Allow several statements in one call
    #[serde(default)]
    pub multi_statement_allow: bool,
    /// Report statements the parser rejects
    #[serde(default = "default_true")]
    pub strict_syntax_check: bool,
    #[serde(default = "default_true")]
    pub truncate_allow: bool,
    #[serde(default = "default_true")]
    pub drop_table_allow: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            deny_functions: DialectRules::default(),
            deny_tables: DialectRules::default(),
            deny_schemas: DialectRules::default(),
            deny_variants: DialectRules::default(),
            deny_objects: DialectRules::default(),
            permit_functions: DialectRules::default(),
            permit_tables: DialectRules::default(),
            permit_schemas: DialectRules::default(),
            permit_variants: DialectRules::default(),
            read_only_objects: DialectRules::default(),
            multi_statement_allow: false,
            strict_syntax_check: true,
            truncate_allow: true,
            drop_table_allow: true,
        }
    }
}

impl RuleConfig {
    /// User permit entries for a category. Deny-only categories have none.
    pub fn permit_rules(&self, category: RuleCategory) -> Option<&DialectRules> {
        match category {
            RuleCategory::Functions => Some(&self.permit_functions),
            RuleCategory::Tables => Some(&self.permit_tables),
            RuleCategory::Schemas => Some(&self.permit_schemas),
            RuleCategory::Variants => Some(&self.permit_variants),
            RuleCategory::Objects | RuleCategory::ReadOnlyObjects => None,
        }
    }

    /// User deny (or read-only) entries for a category.
    pub fn deny_rules(&self, category: RuleCategory) -> &DialectRules {
        match category {
            RuleCategory::Functions => &self.deny_functions,
            RuleCategory::Tables => &self.deny_tables,
            RuleCategory::Schemas => &self.deny_schemas,
            RuleCategory::Variants => &self.deny_variants,
            RuleCategory::Objects => &self.deny_objects,
            RuleCategory::ReadOnlyObjects => &self.read_only_objects,
        }
    }

    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            multi_statement_allow: self.multi_statement_allow,
            strict_syntax_check: self.strict_syntax_check,
            truncate_allow: self.truncate_allow,
            drop_table_allow: self.drop_table_allow,
        }
    }

    fn validate(&self) -> WallResult<()> {
        for category in RuleCategory::ALL {
            let lists = self
                .permit_rules(category)
                .into_iter()
                .map(|rules| ("permit", rules))
                .chain(std::iter::once(("deny", self.deny_rules(category))));

            for (kind, rules) in lists {
                for (dialect, names) in rules.iter() {
                    if names.iter().any(|name| name.trim().is_empty()) {
                        return Err(WallError::config(format!(
                            "Blank name in {} {} rules for dialect '{}'",
                            kind,
                            category.as_str(),
                            dialect
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Top-level sqlwall settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WallSettings {
    /// Whether interceptors are installed at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log violations instead of rejecting statements
    #[serde(default)]
    pub enable_warning_only: bool,
    /// Whether stored procedure calls are checked
    #[serde(default = "default_true")]
    pub support_callable: bool,
    /// Statement ids that are never checked
    #[serde(default)]
    pub ignored_statements: BTreeSet<String>,
    #[serde(default)]
    pub config: RuleConfig,
}

impl Default for WallSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_warning_only: false,
            support_callable: true,
            ignored_statements: BTreeSet::new(),
            config: RuleConfig::default(),
        }
    }
}

impl WallSettings {
    /// Parses and validates settings from a JSON document.
    pub fn from_json_str(content: &str) -> WallResult<Self> {
        let settings: WallSettings = serde_json::from_str(content)
            .map_err(|e| WallError::config(format!("Failed to parse settings: {}", e)))?;
        settings.config.validate()?;
        Ok(settings)
    }

    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> WallResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WallError::config(format!("Failed to read settings {}: {}", path.display(), e))
        })?;

        let settings = Self::from_json_str(&content)?;
        info!("Loaded sqlwall settings from {:?}", path);
        Ok(settings)
    }

    /// Loads settings from a JSON file, falling back to defaults when the file
    /// does not exist. Any other failure is still an error.
    pub fn load_or_default(path: &Path) -> WallResult<Self> {
        if !path.exists() {
            debug!("No sqlwall settings file found at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn rule_config(&self) -> RuleConfig {
        self.config.clone()
    }

    pub fn interceptor_config(&self) -> InterceptorConfig {
        InterceptorConfig {
            warning_only: self.enable_warning_only,
            support_callable: self.support_callable,
            ignored_statements: self.ignored_statements.iter().cloned().collect(),
        }
    }
}
