// SPDX-License-Identifier: Apache-2.0

//! SQL firewall interceptor
//!
//! Sits in front of statement execution:
//! - **Gate**: lazily binds a dialect checker to the real database, with a
//!   circuit breaker on repeated initialization failures
//! - **Pipeline**: per-statement bypass rules, check and allow/warn/reject

pub mod gate;
pub mod pipeline;
pub mod types;

pub use gate::{GateOutcome, GateState, InitGate, ReadyFirewall, MAX_INIT_FAILURES};
pub use pipeline::SqlWallInterceptor;
pub use types::*;
