//! Per-upstream health state machine.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Lock-free health fields embedded in an upstream descriptor.
#[derive(Debug)]
pub struct HealthState {
    /// Unix seconds of the last failure; 0 means never failed.
    failed_at: AtomicU64,
    /// Consecutive failure count since the last recovery.
    fail_count: AtomicU32,
    /// False once fail_count reaches the configured threshold.
    available: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            failed_at: AtomicU64::new(0),
            fail_count: AtomicU32::new(0),
            available: AtomicBool::new(true),
        }
    }

    pub fn failed_at(&self) -> u64 {
        self.failed_at.load(Ordering::Relaxed)
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count.load(Ordering::Relaxed)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Record a failure at `now`. A fresh failure (or a failed retry
    /// probe) restamps the failure time; repeat failures bump the
    /// consecutive count. Returns true when this call crossed the
    /// threshold and cleared `available`.
    pub fn mark_down(&self, now: u64, retry_probe: bool, fail_threshold: u32) -> bool {
        let mut new_count = 0;
        if self.failed_at.load(Ordering::Relaxed) == 0 || retry_probe {
            self.failed_at.store(now, Ordering::Relaxed);
            if !retry_probe {
                self.fail_count.store(1, Ordering::Relaxed);
            }
        } else {
            new_count = self.fail_count.fetch_add(1, Ordering::Relaxed) + 1;
        }
        if new_count >= fail_threshold && self.available.swap(false, Ordering::Relaxed) {
            return true;
        }
        false
    }

    /// Record a recovery: fully reset, last writer wins.
    pub fn mark_up(&self) {
        self.available.store(true, Ordering::Relaxed);
        self.failed_at.store(0, Ordering::Relaxed);
        self.fail_count.store(0, Ordering::Relaxed);
    }

    /// Selection rule shared by every strategy. An upstream may be
    /// picked when it has never failed, is still under the failure
    /// threshold, its retry window has elapsed, or the caller has
    /// already wrapped the whole group. The last two picks are retry
    /// probes, flagged so a subsequent failure restamps the window.
    ///
    /// Returns `Some(retry_probe)` when selectable, `None` otherwise.
    pub fn eligibility(
        &self,
        fail_threshold: u32,
        retry_time: u64,
        now: u64,
        wrapped: bool,
    ) -> Option<bool> {
        let failed_at = self.failed_at.load(Ordering::Relaxed);
        if failed_at == 0 {
            return Some(false);
        }
        if self.fail_count.load(Ordering::Relaxed) < fail_threshold {
            return Some(false);
        }
        if now >= failed_at.saturating_add(retry_time) || wrapped {
            return Some(true);
        }
        None
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
