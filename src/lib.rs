// SPDX-License-Identifier: Apache-2.0

//! sqlwall - per-dialect SQL firewall for data-access layers
//!
//! Statements pass through a [`SqlWallInterceptor`] before execution. On
//! first use the interceptor probes the data source for its dialect, builds
//! the matching [`SqlFirewall`] with the merged permit/deny policy, and from
//! then on allows, warns about or rejects every statement.

pub mod config;
pub mod dialect;
pub mod error;
pub mod heuristics;
pub mod interceptor;
pub mod metrics;
pub mod observability;
pub mod policy;
pub mod startup;
pub mod wall;

pub use config::{DialectRules, RuleConfig, WallSettings};
pub use dialect::{Dialect, DialectFamily};
pub use error::{WallError, WallResult};
pub use interceptor::{
    BypassReason, ConnectionProbe, GateState, InterceptorConfig, ProbeInfo, SqlWallInterceptor,
    StatementContext, StatementKind, Verdict,
};
pub use policy::{build_policy, DialectPolicy, PolicyMap, PolicySeed, RuleCategory};
pub use wall::{FirewallFactory, SqlFirewall, Violation, ViolationKind};
