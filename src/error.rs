// SPDX-License-Identifier: Apache-2.0

//! Error types for the sqlwall interceptor
//!
//! Configuration problems surface at load time, initialization problems are
//! counted by the gate, and rule violations become [`WallError::Rejected`].

use std::sync::Arc;

use thiserror::Error;

use crate::dialect::Dialect;

/// Underlying error attached to a violation, e.g. the parser error behind a
/// syntax violation.
pub type ViolationCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for all sqlwall operations
#[derive(Debug, Error)]
pub enum WallError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("dbType not support : {dialect}, url {url}")]
    UnsupportedDialect { dialect: String, url: String },

    #[error("Connection probe failed: {message}")]
    Probe { message: String },

    #[error("Firewall construction failed: {message}")]
    Construction { message: String },

    #[error("sql injection violation, dbType: {dialect}, {message}: {sql}")]
    Rejected {
        dialect: Dialect,
        message: String,
        sql: String,
        #[source]
        cause: Option<ViolationCause>,
    },
}

impl WallError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config { message: msg.into() }
    }

    pub fn unsupported_dialect(dialect: impl Into<String>, url: impl Into<String>) -> Self {
        Self::UnsupportedDialect {
            dialect: dialect.into(),
            url: url.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe { message: msg.into() }
    }

    pub fn construction(msg: impl Into<String>) -> Self {
        Self::Construction { message: msg.into() }
    }

    /// Returns true if this error is a rule rejection (as opposed to an
    /// infrastructure failure).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Result type alias for sqlwall operations
pub type WallResult<T> = Result<T, WallError>;
