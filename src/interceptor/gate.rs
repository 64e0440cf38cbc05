// SPDX-License-Identifier: Apache-2.0

//! Lazy Initialization Gate
//!
//! Binds a firewall to the database actually behind the data source the
//! first time a statement needs checking. Initialization is serialized by a
//! mutex and published once through a `OnceLock`, so the hot path is a
//! single atomic load. Failed attempts are counted; after more than
//! [`MAX_INIT_FAILURES`] of them the gate stops probing for good.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use super::types::ConnectionProbe;
use crate::dialect::Dialect;
use crate::error::{WallError, WallResult};
use crate::wall::SqlFirewall;

/// Failed initializations tolerated before the breaker opens
pub const MAX_INIT_FAILURES: u32 = 10;

/// Firewall bound to a resolved dialect
pub struct ReadyFirewall {
    pub dialect: Dialect,
    /// Connection URL with credentials masked
    pub url: String,
    pub firewall: Arc<dyn SqlFirewall>,
}

impl fmt::Debug for ReadyFirewall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyFirewall")
            .field("dialect", &self.dialect)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Result of one [`InitGate::ensure_ready`] call
#[derive(Debug)]
pub enum GateOutcome<'a> {
    Ready(&'a ReadyFirewall),
    /// This call's initialization attempt failed; the next call retries
    Failed,
    /// Breaker open, no attempt was made
    Disabled,
}

impl<'a> GateOutcome<'a> {
    pub fn ready(self) -> Option<&'a ReadyFirewall> {
        match self {
            Self::Ready(ready) => Some(ready),
            Self::Failed | Self::Disabled => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Observable gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Uninitialized,
    Initializing,
    Ready,
    PermanentlyDisabled,
}

#[derive(Default)]
pub struct InitGate {
    ready: OnceLock<ReadyFirewall>,
    init_lock: Mutex<()>,
    initializing: AtomicBool,
    error_count: AtomicU32,
    trip_logged: AtomicBool,
}

impl InitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ready firewall, initializing it on first use.
    ///
    /// [`GateOutcome::Failed`] is reported only to the call whose own
    /// attempt failed.
    pub fn ensure_ready<B>(&self, probe: &dyn ConnectionProbe, build: B) -> GateOutcome<'_>
    where
        B: FnOnce(Dialect) -> WallResult<Arc<dyn SqlFirewall>>,
    {
        if self.is_tripped() {
            self.log_trip_once();
            return GateOutcome::Disabled;
        }

        if let Some(ready) = self.ready.get() {
            return GateOutcome::Ready(ready);
        }

        let _guard = self.init_lock.lock();

        if let Some(ready) = self.ready.get() {
            return GateOutcome::Ready(ready);
        }
        if self.is_tripped() {
            self.log_trip_once();
            return GateOutcome::Disabled;
        }

        self.initializing.store(true, Ordering::Release);
        let result = initialize(probe, build);
        self.initializing.store(false, Ordering::Release);

        match result {
            Ok(ready) => {
                info!(
                    dialect = %ready.dialect,
                    url = %ready.url,
                    "sqlwall firewall initialized"
                );
                GateOutcome::Ready(self.ready.get_or_init(|| ready))
            }
            Err(e) => {
                let failures = self.error_count.fetch_add(1, Ordering::AcqRel) + 1;
                error!(error = %e, failures, "sqlwall initialization failed");
                GateOutcome::Failed
            }
        }
    }

    /// The published firewall, without attempting initialization.
    pub fn ready(&self) -> Option<&ReadyFirewall> {
        self.ready.get()
    }

    pub fn state(&self) -> GateState {
        if self.ready.get().is_some() {
            GateState::Ready
        } else if self.is_tripped() {
            GateState::PermanentlyDisabled
        } else if self.initializing.load(Ordering::Acquire) {
            GateState::Initializing
        } else {
            GateState::Uninitialized
        }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Acquire)
    }

    fn is_tripped(&self) -> bool {
        self.error_count() > MAX_INIT_FAILURES
    }

    fn log_trip_once(&self) {
        if !self.trip_logged.swap(true, Ordering::AcqRel) {
            warn!(
                failures = self.error_count(),
                "sqlwall initialization failed too many times, statement checking disabled"
            );
        }
    }
}

fn initialize<B>(probe: &dyn ConnectionProbe, build: B) -> WallResult<ReadyFirewall>
where
    B: FnOnce(Dialect) -> WallResult<Arc<dyn SqlFirewall>>,
{
    let info = probe.resolve()?;
    let url = info.url.redacted();

    let dialect = Dialect::from_url(info.url.expose())
        .or_else(|| info.dialect_name.as_deref().and_then(Dialect::from_name))
        .ok_or_else(|| {
            let name = info.dialect_name.as_deref().unwrap_or("unknown");
            WallError::unsupported_dialect(name, url.as_str())
        })?;

    if !dialect.is_supported() {
        return Err(WallError::unsupported_dialect(dialect.name(), url));
    }

    let firewall = build(dialect).map_err(|e| match e {
        WallError::UnsupportedDialect { dialect, .. } => {
            WallError::unsupported_dialect(dialect, url.as_str())
        }
        other => other,
    })?;

    Ok(ReadyFirewall {
        dialect,
        url,
        firewall,
    })
}
