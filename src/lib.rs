//! Request-routing core for an HTTP proxy: attribute matching,
//! upstream selection, health tracking, and hot reload.

pub mod config;
pub mod health;
pub mod matcher;
pub mod request;
pub mod routing;
pub mod selection;

pub use config::schema::SelectionPolicy;
pub use config::snapshot::{ConfigSnapshot, SnapshotStore};
pub use config::watcher::TableWatcher;
pub use request::RequestAttributes;
pub use selection::{Decision, DecisionKind, SelectionEngine};
