//! Attribute matching subsystem.
//!
//! # Data Flow
//! ```text
//! RequestAttributes
//!     → table.rs (query all five indices)
//!         host/domain  → host.rs (suffix trie, every matching leaf)
//!         url regex    → linear scan, every matching pattern
//!         exact url    → hash lookup, at most one hit
//!         host regex   → linear scan over the host name
//!         ip range     → ip.rs (interval lookup, at most one hit)
//!     → each hit: modifier.rs (AND over secondary predicates)
//!     → best record = highest source line number across all indices
//! ```
//!
//! # Design Decisions
//! - Indices are built once (count, allocate, insert) and immutable after
//! - No index short-circuits; the line-number tie-break is global
//! - A bad line is skipped with a diagnostic, never fatal to the build

pub mod host;
pub mod ip;
pub mod modifier;
pub mod table;

pub use modifier::{ModifierChain, ModifierError};
pub use table::{IpKeySource, RoutingTable, TableOptions};
