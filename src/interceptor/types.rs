// SPDX-License-Identifier: Apache-2.0

//! Interceptor Types
//!
//! Values passed between the host data-access layer and the interceptor.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::WallResult;
use crate::observability::Sensitive;

/// How the host is about to execute the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// Plain or prepared statement
    Prepared,
    /// Stored procedure call
    Callable,
}

impl Default for StatementKind {
    fn default() -> Self {
        Self::Prepared
    }
}

/// Statement about to be executed
#[derive(Debug, Clone, Copy)]
pub struct StatementContext<'a> {
    /// Mapped statement identifier, e.g. `com.example.UserMapper.findById`
    pub id: &'a str,
    pub kind: StatementKind,
    /// Bound SQL text
    pub sql: &'a str,
}

impl<'a> StatementContext<'a> {
    pub fn prepared(id: &'a str, sql: &'a str) -> Self {
        Self {
            id,
            kind: StatementKind::Prepared,
            sql,
        }
    }

    pub fn callable(id: &'a str, sql: &'a str) -> Self {
        Self {
            id,
            kind: StatementKind::Callable,
            sql,
        }
    }
}

/// Configuration for the interceptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorConfig {
    /// Log violations instead of rejecting
    #[serde(default)]
    pub warning_only: bool,
    /// Whether callable statements are checked
    #[serde(default = "default_true")]
    pub support_callable: bool,
    /// Statement ids that are never checked
    #[serde(default)]
    pub ignored_statements: HashSet<String>,
}

fn default_true() -> bool {
    true
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            warning_only: false,
            support_callable: true,
            ignored_statements: HashSet::new(),
        }
    }
}

/// Why a statement skipped the check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassReason {
    /// Callable statement while callable checking is off
    Callable,
    /// Statement id is in the ignored set
    Ignored,
    /// No firewall could be initialized
    Unavailable,
}

/// Outcome of a pre-execution check that lets the statement through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Checked with no violation
    Allowed,
    /// Violation found but only logged
    Warned,
    /// Not checked
    Bypassed(BypassReason),
}

impl Verdict {
    pub fn was_checked(&self) -> bool {
        matches!(self, Self::Allowed | Self::Warned)
    }
}

/// Result of probing the live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Connection URL as reported by the driver, credentials included
    pub url: Sensitive<String>,
    /// Driver supplied dialect name, used when the URL is not recognised
    pub dialect_name: Option<String>,
}

impl ProbeInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Sensitive::new(url.into()),
            dialect_name: None,
        }
    }

    pub fn with_dialect_name(mut self, name: impl Into<String>) -> Self {
        self.dialect_name = Some(name.into());
        self
    }
}

/// Opens a short-lived connection to discover what database sits behind the
/// data source.
pub trait ConnectionProbe: Send + Sync {
    fn resolve(&self) -> WallResult<ProbeInfo>;
}

impl<F> ConnectionProbe for F
where
    F: Fn() -> WallResult<ProbeInfo> + Send + Sync,
{
    fn resolve(&self) -> WallResult<ProbeInfo> {
        self()
    }
}
