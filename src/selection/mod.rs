//! Upstream selection subsystem.
//!
//! # Data Flow
//! ```text
//! RoutingTable match → RoutingRecord (group + strategy)
//!     → engine.rs (find / retry façade, snapshot checkout)
//!     → strategy.select(first_call, cursor)
//!         round_robin.rs: start index per variant, then the shared
//!                         eligibility walk with wraparound
//!         consistent.rs:  ring.rs candidates, primary then secondary
//!     → health eligibility per upstream (health::state)
//!     → Decision { Direct | ApiPinned | Specified | Fail }
//! ```
//!
//! # Design Decisions
//! - Strategy objects are config-immutable; all per-request iteration
//!   state lives in the SelectionCursor inside the Decision
//! - The strict counter and the latch are group-scoped atomics whose
//!   exact value is irrelevant; only `value mod group_size` matters
//! - Every select call is bounded by the group size; the forced-wrap
//!   path guarantees termination when bypass is disallowed

pub mod consistent;
pub mod cursor;
pub mod engine;
pub mod ring;
pub mod round_robin;

pub use cursor::{Decision, DecisionKind};
pub use engine::SelectionEngine;

use crate::request::RequestAttributes;
use crate::routing::record::RoutingRecord;
use cursor::SelectionCursor;
use std::fmt;

/// Inputs shared by every strategy call.
pub(crate) struct SelectContext<'a> {
    pub record: &'a RoutingRecord,
    pub req: &'a RequestAttributes,
    pub fail_threshold: u32,
    pub retry_time: u64,
    /// Unix seconds at the time of the call.
    pub now: u64,
}

/// Outcome of one strategy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pick {
    Upstream {
        group: crate::routing::upstream::GroupId,
        index: usize,
        /// True when this pick is a probe of a nominally-down upstream.
        retry: bool,
    },
    Direct,
    Fail,
}

/// One upstream-selection algorithm over a record's group(s).
///
/// `first_call` distinguishes the initial pick from a retry after a
/// reported failure; the cursor carries all per-request state between
/// the two.
pub(crate) trait SelectionStrategy: fmt::Debug + Send + Sync {
    fn select(
        &self,
        ctx: &SelectContext<'_>,
        cursor: &mut SelectionCursor,
        first_call: bool,
    ) -> Pick;
}
