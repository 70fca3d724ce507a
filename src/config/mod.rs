//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! routing table text (external loader/tokenizer)
//!     → line.rs (ConfigLine: match kind + key + label/value modifiers)
//!     → matcher::RoutingTable::build (per-line accept/skip)
//! policy file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → SelectionPolicy (fail threshold, retry window, enable flag)
//! both
//!     → snapshot.rs (ConfigSnapshot, immutable, refcounted)
//!     → SnapshotStore (atomic swap; readers keep old snapshots alive)
//!
//! On reload signal:
//!     watcher.rs detects change
//!     → rebuild table + policy
//!     → SnapshotStore::store (atomic publish)
//!     → in-flight requests keep their checked-out snapshot
//! ```
//!
//! # Design Decisions
//! - A snapshot is immutable once published; changes require full reload
//! - Bad routing lines are skipped with a diagnostic, never fatal
//! - Readers hold an Arc for the request lifetime, so a reload between
//!   find() and retry() is invisible to that request

pub mod line;
pub mod loader;
pub mod schema;
pub mod snapshot;
pub mod watcher;

pub use line::{ConfigLine, LineError, MatchKind};
pub use schema::SelectionPolicy;
pub use snapshot::{ConfigSnapshot, SnapshotStore};
