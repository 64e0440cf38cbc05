// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory counters for one interceptor.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::interceptor::types::{BypassReason, Verdict};

#[derive(Debug, Default)]
pub struct InterceptorMetrics {
    checked: AtomicU64,
    allowed: AtomicU64,
    warned: AtomicU64,
    rejected: AtomicU64,
    bypassed_callable: AtomicU64,
    bypassed_ignored: AtomicU64,
    bypassed_unavailable: AtomicU64,
    init_failures: AtomicU64,
}

impl InterceptorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_verdict(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Allowed => &self.allowed,
            Verdict::Warned => &self.warned,
            Verdict::Bypassed(BypassReason::Callable) => &self.bypassed_callable,
            Verdict::Bypassed(BypassReason::Ignored) => &self.bypassed_ignored,
            Verdict::Bypassed(BypassReason::Unavailable) => &self.bypassed_unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if verdict.was_checked() {
            self.checked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejection(&self) {
        self.checked.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_init_failure(&self) {
        self.init_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let bypassed_callable = self.bypassed_callable.load(Ordering::Relaxed);
        let bypassed_ignored = self.bypassed_ignored.load(Ordering::Relaxed);
        let bypassed_unavailable = self.bypassed_unavailable.load(Ordering::Relaxed);

        MetricsSnapshot {
            checked: self.checked.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            warned: self.warned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            bypassed: bypassed_callable + bypassed_ignored + bypassed_unavailable,
            bypassed_callable,
            bypassed_ignored,
            bypassed_unavailable,
            init_failures: self.init_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub checked: u64,
    pub allowed: u64,
    pub warned: u64,
    pub rejected: u64,
    pub bypassed: u64,
    pub bypassed_callable: u64,
    pub bypassed_ignored: u64,
    pub bypassed_unavailable: u64,
    pub init_failures: u64,
}
