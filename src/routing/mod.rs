//! Routing record model.
//!
//! # Data Flow
//! ```text
//! ConfigLine (one table line)
//!     → record.rs (directive parsing: parents, strategy, retry policy)
//!         → upstream.rs (UpstreamGroup of UpstreamDescriptors,
//!                        health atomics embedded)
//!     → RoutingRecord (immutable; owned by the table inside a snapshot)
//! ```
//!
//! # Design Decisions
//! - Records are immutable after construction; only the health atomics
//!   inside their upstream descriptors ever change
//! - A record's upstream groups and selection strategy are built once;
//!   the strategy's shared cursor state (strict counter, latch) lives
//!   in the strategy object, group-scoped like the record itself
//! - The source line number rides on the record as the global tie-break

pub mod record;
pub mod upstream;

pub use record::{RecordError, RetryPolicy, RoutingRecord, StrategyKind};
pub use upstream::{GroupId, UpstreamDescriptor, UpstreamGroup};
