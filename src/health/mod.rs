//! Upstream health tracking.
//!
//! # State
//! Three fields per upstream, mutated from any request-processing
//! context without locks:
//! - `failed_at`: unix seconds of the last failure, 0 = never failed
//! - `fail_count`: consecutive failures since the last recovery
//! - `available`: cleared once `fail_count` reaches the fail threshold
//!
//! # Design Decisions
//! - Failure accounting is a heuristic: racing mark_down calls may
//!   under- or over-count by one, which is tolerated; interleavings are
//!   all well-defined and can never corrupt the three fields
//! - mark_up is last-writer-wins and resets everything
//! - Eligibility (including the retry-probe and wraparound rules) is
//!   computed here so every strategy applies the exact same rule

pub mod state;

pub use state::HealthState;
