// SPDX-License-Identifier: Apache-2.0

//! Interceptor Pipeline
//!
//! Per-statement decision protocol:
//! 1. Bypass: callable statements (when not supported) and ignored ids
//! 2. Gate: bind the firewall to the live database on first use
//! 3. Check: allow, warn (warning-only mode) or reject with the first violation

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::gate::{GateOutcome, GateState, InitGate};
use super::types::{
    BypassReason, ConnectionProbe, InterceptorConfig, StatementContext, StatementKind, Verdict,
};
use crate::config::WallSettings;
use crate::dialect::Dialect;
use crate::error::{WallError, WallResult};
use crate::metrics::{InterceptorMetrics, MetricsSnapshot};
use crate::policy::PolicyMap;
use crate::wall::{FirewallFactory, ProviderFactory};

/// SQL firewall interceptor for one data source
pub struct SqlWallInterceptor {
    config: InterceptorConfig,
    /// Shared across every interceptor installed from the same settings
    policies: Arc<PolicyMap>,
    probe: Arc<dyn ConnectionProbe>,
    factory: Arc<dyn FirewallFactory>,
    gate: InitGate,
    metrics: InterceptorMetrics,
}

impl SqlWallInterceptor {
    /// Creates an interceptor backed by the bundled dialect checkers.
    pub fn new(
        config: InterceptorConfig,
        policies: Arc<PolicyMap>,
        probe: Arc<dyn ConnectionProbe>,
    ) -> Self {
        let factory = ProviderFactory::new(policies.rule_config().check_settings());
        Self::with_factory(config, policies, probe, Arc::new(factory))
    }

    /// Creates an interceptor with a custom firewall factory.
    pub fn with_factory(
        config: InterceptorConfig,
        policies: Arc<PolicyMap>,
        probe: Arc<dyn ConnectionProbe>,
        factory: Arc<dyn FirewallFactory>,
    ) -> Self {
        Self {
            config,
            policies,
            probe,
            factory,
            gate: InitGate::new(),
            metrics: InterceptorMetrics::new(),
        }
    }

    /// Creates a standalone interceptor from loaded settings.
    pub fn from_settings(settings: &WallSettings, probe: Arc<dyn ConnectionProbe>) -> Self {
        let policies = Arc::new(PolicyMap::with_builtin_seed(Arc::new(settings.rule_config())));
        Self::new(settings.interceptor_config(), policies, probe)
    }

    /// Decides whether the statement may run.
    ///
    /// `Ok` lets the statement through, checked or bypassed. The only error
    /// is [`WallError::Rejected`]; initialization problems fail open as
    /// [`BypassReason::Unavailable`].
    #[instrument(skip(self, ctx), fields(statement = ctx.id))]
    pub fn on_before_execute(&self, ctx: &StatementContext<'_>) -> WallResult<Verdict> {
        let decision = self.decide(ctx);
        match &decision {
            Ok(verdict) => self.metrics.record_verdict(*verdict),
            Err(e) if e.is_rejection() => self.metrics.record_rejection(),
            Err(_) => {}
        }
        decision
    }

    /// Runs `proceed` only when the statement is not rejected.
    pub fn intercept<T, E, F>(&self, ctx: &StatementContext<'_>, proceed: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<WallError>,
    {
        self.on_before_execute(ctx)?;
        proceed()
    }

    fn decide(&self, ctx: &StatementContext<'_>) -> WallResult<Verdict> {
        if ctx.kind == StatementKind::Callable && !self.config.support_callable {
            debug!("Callable statement not checked");
            return Ok(Verdict::Bypassed(BypassReason::Callable));
        }

        if self.config.ignored_statements.contains(ctx.id) {
            debug!("Statement is ignored");
            return Ok(Verdict::Bypassed(BypassReason::Ignored));
        }

        let outcome = self.gate.ensure_ready(self.probe.as_ref(), |dialect| {
            let policy = self.policies.policy_for(dialect);
            self.factory.create(dialect, &policy)
        });
        let ready = match outcome {
            GateOutcome::Ready(ready) => ready,
            GateOutcome::Failed => {
                self.metrics.record_init_failure();
                return Ok(Verdict::Bypassed(BypassReason::Unavailable));
            }
            GateOutcome::Disabled => return Ok(Verdict::Bypassed(BypassReason::Unavailable)),
        };

        let sql = ctx.sql;
        let Some(violation) = ready.firewall.check(sql).into_iter().next() else {
            return Ok(Verdict::Allowed);
        };

        if self.config.warning_only {
            warn!(
                dialect = %ready.dialect,
                "sql injection violation, dbType: {}, {}: {}",
                ready.dialect,
                violation.message,
                sql
            );
            return Ok(Verdict::Warned);
        }

        Err(WallError::Rejected {
            dialect: ready.dialect,
            message: violation.message,
            sql: sql.to_string(),
            cause: violation.cause,
        })
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn state(&self) -> GateState {
        self.gate.state()
    }

    /// Dialect of the bound firewall, once initialized.
    pub fn dialect(&self) -> Option<Dialect> {
        self.gate.ready().map(|ready| ready.dialect)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::interceptor::types::ProbeInfo;
    use crate::policy::DialectPolicy;
    use crate::wall::{SqlFirewall, Violation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn mysql_probe() -> Arc<dyn ConnectionProbe> {
        Arc::new(|| -> WallResult<ProbeInfo> { Ok(ProbeInfo::new("jdbc:mysql://db:3306/app")) })
    }

    fn interceptor(config: InterceptorConfig) -> SqlWallInterceptor {
        let policies = Arc::new(PolicyMap::with_builtin_seed(Arc::new(RuleConfig::default())));
        SqlWallInterceptor::new(config, policies, mysql_probe())
    }

    /// Firewall that flags every statement containing `forbidden`.
    struct KeywordFirewall;

    impl SqlFirewall for KeywordFirewall {
        fn dialect(&self) -> Dialect {
            Dialect::Mysql
        }

        fn check(&self, sql: &str) -> Vec<Violation> {
            if sql.contains("forbidden") {
                vec![Violation::rule("keyword"), Violation::rule("second")]
            } else {
                Vec::new()
            }
        }
    }

    struct KeywordFactory {
        created: AtomicUsize,
    }

    impl FirewallFactory for KeywordFactory {
        fn create(
            &self,
            _dialect: Dialect,
            _policy: &DialectPolicy,
        ) -> WallResult<Arc<dyn SqlFirewall>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(KeywordFirewall))
        }
    }

    #[test]
    fn test_allows_clean_statement() {
        let interceptor = interceptor(InterceptorConfig::default());
        let ctx = StatementContext::prepared("UserMapper.findById", "SELECT * FROM users WHERE id = ?");
        assert_eq!(interceptor.on_before_execute(&ctx).unwrap(), Verdict::Allowed);
        assert_eq!(interceptor.dialect(), Some(Dialect::Mysql));
        assert_eq!(interceptor.state(), GateState::Ready);
    }

    #[test]
    fn test_rejects_first_violation_only() {
        let factory = Arc::new(KeywordFactory {
            created: AtomicUsize::new(0),
        });
        let policies = Arc::new(PolicyMap::with_builtin_seed(Arc::new(RuleConfig::default())));
        let interceptor = SqlWallInterceptor::with_factory(
            InterceptorConfig::default(),
            policies,
            mysql_probe(),
            factory.clone(),
        );

        let ctx = StatementContext::prepared("a", "SELECT forbidden FROM t");
        let err = interceptor.on_before_execute(&ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "sql injection violation, dbType: mysql, keyword: SELECT forbidden FROM t"
        );

        interceptor
            .on_before_execute(&StatementContext::prepared("b", "SELECT 1"))
            .unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_syntax_error_keeps_cause() {
        let interceptor = interceptor(InterceptorConfig::default());
        let ctx = StatementContext::prepared("a", "SELEC * FROM t");
        let err = interceptor.on_before_execute(&ctx).unwrap_err();
        assert!(err.is_rejection());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_callable_bypass() {
        let config = InterceptorConfig {
            support_callable: false,
            ..InterceptorConfig::default()
        };
        let interceptor = interceptor(config);
        let ctx = StatementContext::callable("ProcMapper.run", "CALL extractvalue(1, 'x')");
        assert_eq!(
            interceptor.on_before_execute(&ctx).unwrap(),
            Verdict::Bypassed(BypassReason::Callable)
        );
        assert_eq!(interceptor.state(), GateState::Uninitialized);
    }

    #[test]
    fn test_intercept_skips_proceed_on_rejection() {
        let interceptor = interceptor(InterceptorConfig::default());
        let ran = AtomicUsize::new(0);

        let ok: Result<u32, WallError> = interceptor.intercept(
            &StatementContext::prepared("a", "SELECT 1"),
            || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            },
        );
        assert_eq!(ok.unwrap(), 7);

        let rejected: Result<u32, WallError> = interceptor.intercept(
            &StatementContext::prepared("a", "SELECT extractvalue(1, '/x')"),
            || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            },
        );
        assert!(rejected.unwrap_err().is_rejection());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metrics_follow_decisions() {
        let config = InterceptorConfig {
            ignored_statements: ["skip.me".to_string()].into_iter().collect(),
            ..InterceptorConfig::default()
        };
        let interceptor = interceptor(config);

        interceptor
            .on_before_execute(&StatementContext::prepared("a", "SELECT 1"))
            .unwrap();
        interceptor
            .on_before_execute(&StatementContext::prepared("skip.me", "SELECT updatexml(1,2,3)"))
            .unwrap();
        let _ = interceptor.on_before_execute(&StatementContext::prepared("a", "SELECT updatexml(1,2,3)"));

        let snapshot = interceptor.metrics();
        assert_eq!(snapshot.checked, 2);
        assert_eq!(snapshot.allowed, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.bypassed_ignored, 1);
    }

    #[test]
    fn test_probe_failure_fails_open() {
        let probe: Arc<dyn ConnectionProbe> =
            Arc::new(|| -> WallResult<ProbeInfo> { Err(WallError::probe("refused")) });
        let policies = Arc::new(PolicyMap::with_builtin_seed(Arc::new(RuleConfig::default())));
        let interceptor = SqlWallInterceptor::new(InterceptorConfig::default(), policies, probe);

        let ctx = StatementContext::prepared("a", "SELECT extractvalue(1, '/x')");
        assert_eq!(
            interceptor.on_before_execute(&ctx).unwrap(),
            Verdict::Bypassed(BypassReason::Unavailable)
        );
        assert_eq!(interceptor.metrics().init_failures, 1);
    }

    #[test]
    fn test_concurrent_failures_counted_once_each() {
        const THREADS: usize = 6;
        let probe: Arc<dyn ConnectionProbe> = Arc::new(|| -> WallResult<ProbeInfo> {
            thread::sleep(Duration::from_millis(10));
            Err(WallError::probe("refused"))
        });
        let policies = Arc::new(PolicyMap::with_builtin_seed(Arc::new(RuleConfig::default())));
        let interceptor = SqlWallInterceptor::new(InterceptorConfig::default(), policies, probe);
        let barrier = Barrier::new(THREADS);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    barrier.wait();
                    let ctx = StatementContext::prepared("a", "SELECT 1");
                    assert_eq!(
                        interceptor.on_before_execute(&ctx).unwrap(),
                        Verdict::Bypassed(BypassReason::Unavailable)
                    );
                });
            }
        });

        let snapshot = interceptor.metrics();
        assert_eq!(snapshot.init_failures, THREADS as u64);
        assert_eq!(snapshot.bypassed_unavailable, THREADS as u64);
    }
}
