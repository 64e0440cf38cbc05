// SPDX-License-Identifier: Apache-2.0

//! Firewall provider factory

use std::sync::Arc;

use tracing::debug;

use super::checker::{CheckSettings, WallProvider};
use super::SqlFirewall;
use crate::dialect::Dialect;
use crate::error::{WallError, WallResult};
use crate::policy::DialectPolicy;

/// Builds the firewall used by an interceptor once its dialect is known.
pub trait FirewallFactory: Send + Sync {
    fn create(&self, dialect: Dialect, policy: &DialectPolicy) -> WallResult<Arc<dyn SqlFirewall>>;
}

/// Creates the family checker for `dialect` with exactly `policy` as its
/// rules. The checker's own defaults are dropped first.
pub fn create_firewall(
    dialect: Dialect,
    policy: &DialectPolicy,
    settings: CheckSettings,
) -> WallResult<WallProvider> {
    let family = dialect
        .family()
        .ok_or_else(|| WallError::unsupported_dialect(dialect.name(), ""))?;

    let mut provider = WallProvider::new(dialect, family, family.default_config_dir(), settings);
    *provider.policy_mut() = policy.clone();

    debug!(
        dialect = %dialect,
        family = ?family,
        config_dir = provider.config_dir(),
        "Created firewall provider"
    );
    Ok(provider)
}

/// Factory backed by the bundled sqlparser checkers
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderFactory {
    settings: CheckSettings,
}

impl ProviderFactory {
    pub fn new(settings: CheckSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> CheckSettings {
        self.settings
    }
}

impl FirewallFactory for ProviderFactory {
    fn create(&self, dialect: Dialect, policy: &DialectPolicy) -> WallResult<Arc<dyn SqlFirewall>> {
        let provider = create_firewall(dialect, policy, self.settings)?;
        Ok(Arc::new(provider))
    }
}
