// SPDX-License-Identifier: Apache-2.0

//! Installation of interceptors on host data sources
//!
//! Every host gets its own interceptor (and therefore its own gate bound to
//! its own database) while all of them share one policy cache built from
//! the same settings.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WallSettings;
use crate::error::WallResult;
use crate::interceptor::types::ConnectionProbe;
use crate::interceptor::SqlWallInterceptor;
use crate::policy::PolicyMap;

/// A data source that can carry a sqlwall interceptor
pub trait InterceptorHost {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Probe resolving the database behind this host
    fn probe(&self) -> WallResult<Arc<dyn ConnectionProbe>>;

    /// Whether a sqlwall interceptor is already installed
    fn has_sqlwall(&self) -> bool;

    fn add_interceptor(&mut self, interceptor: Arc<SqlWallInterceptor>) -> WallResult<()>;
}

/// Installs one interceptor on each host that does not carry one yet.
///
/// A host that fails is logged and skipped. Returns the number of
/// interceptors installed.
pub fn install<H>(hosts: &mut [H], settings: &WallSettings) -> usize
where
    H: InterceptorHost,
{
    if !settings.enabled {
        info!("sqlwall disabled, no interceptor installed");
        return 0;
    }

    let policies = Arc::new(PolicyMap::with_builtin_seed(Arc::new(settings.rule_config())));
    let config = settings.interceptor_config();
    let mut installed = 0;

    for host in hosts.iter_mut() {
        if host.has_sqlwall() {
            info!(host = host.name(), "sqlwall interceptor already present");
            continue;
        }

        let result = host.probe().and_then(|probe| {
            let interceptor = SqlWallInterceptor::new(config.clone(), Arc::clone(&policies), probe);
            host.add_interceptor(Arc::new(interceptor))
        });

        match result {
            Ok(()) => {
                info!(host = host.name(), "sqlwall interceptor installed");
                installed += 1;
            }
            Err(e) => warn!(host = host.name(), error = %e, "Failed to install sqlwall interceptor"),
        }
    }

    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WallError;
    use crate::interceptor::types::{ProbeInfo, StatementContext};

    struct MockHost {
        name: &'static str,
        url: &'static str,
        fail_probe: bool,
        interceptors: Vec<Arc<SqlWallInterceptor>>,
    }

    impl MockHost {
        fn new(name: &'static str, url: &'static str) -> Self {
            Self {
                name,
                url,
                fail_probe: false,
                interceptors: Vec::new(),
            }
        }
    }

    impl InterceptorHost for MockHost {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self) -> WallResult<Arc<dyn ConnectionProbe>> {
            if self.fail_probe {
                return Err(WallError::probe("no configuration"));
            }
            let url = self.url;
            Ok(Arc::new(move || -> WallResult<ProbeInfo> { Ok(ProbeInfo::new(url)) }))
        }

        fn has_sqlwall(&self) -> bool {
            !self.interceptors.is_empty()
        }

        fn add_interceptor(&mut self, interceptor: Arc<SqlWallInterceptor>) -> WallResult<()> {
            self.interceptors.push(interceptor);
            Ok(())
        }
    }

    #[test]
    fn test_installs_once_per_host() {
        let settings = WallSettings::default();
        let mut hosts = vec![
            MockHost::new("orders", "jdbc:mysql://db1/orders"),
            MockHost::new("reports", "jdbc:postgresql://db2/reports"),
        ];

        assert_eq!(install(&mut hosts, &settings), 2);
        assert_eq!(install(&mut hosts, &settings), 0);
        assert!(hosts.iter().all(|h| h.interceptors.len() == 1));

        let ctx = StatementContext::prepared("a", "SELECT extractvalue(1, '/x')");
        assert!(hosts[0].interceptors[0].on_before_execute(&ctx).is_err());
        assert!(hosts[1].interceptors[0].on_before_execute(&ctx).is_ok());
    }

    #[test]
    fn test_failed_host_is_skipped() {
        let mut broken = MockHost::new("broken", "jdbc:mysql://db/x");
        broken.fail_probe = true;
        let mut hosts = vec![broken, MockHost::new("ok", "jdbc:mysql://db/y")];

        assert_eq!(install(&mut hosts, &WallSettings::default()), 1);
        assert!(hosts[0].interceptors.is_empty());
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let settings = WallSettings {
            enabled: false,
            ..WallSettings::default()
        };
        let mut hosts = vec![MockHost::new("orders", "jdbc:mysql://db1/orders")];
        assert_eq!(install(&mut hosts, &settings), 0);
        assert!(hosts[0].interceptors.is_empty());
    }
}
