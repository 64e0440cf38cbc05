// SPDX-License-Identifier: Apache-2.0

//! SQL firewall capability
//!
//! A [`SqlFirewall`] classifies one SQL text into an ordered list of
//! [`Violation`]s. The crate ships a sqlparser based implementation per
//! dialect family ([`checker::WallProvider`]); hosts may plug in their own
//! through [`provider::FirewallFactory`].

pub mod checker;
pub mod provider;

use std::fmt;

use serde::Serialize;

use crate::dialect::Dialect;
use crate::error::ViolationCause;

pub use checker::{CheckSettings, WallProvider};
pub use provider::{create_firewall, FirewallFactory, ProviderFactory};

/// Kind of violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The statement could not be parsed
    SyntaxError,
    /// A denied object or a non-permitted statement
    RuleViolation,
}

/// A single finding produced by a firewall check
#[derive(Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
    pub cause: Option<ViolationCause>,
}

impl Violation {
    pub fn rule(message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::RuleViolation,
            message: message.into(),
            cause: None,
        }
    }

    pub fn syntax_error(message: impl Into<String>, cause: ViolationCause) -> Self {
        Self {
            kind: ViolationKind::SyntaxError,
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn is_syntax_error(&self) -> bool {
        self.kind == ViolationKind::SyntaxError
    }
}

impl fmt::Debug for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Violation")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

/// Dialect specific statement checker
pub trait SqlFirewall: Send + Sync {
    /// Dialect this firewall was built for
    fn dialect(&self) -> Dialect;

    /// Checks one SQL text. An empty result means the statement is allowed.
    fn check(&self, sql: &str) -> Vec<Violation>;
}
