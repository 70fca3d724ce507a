//! Immutable configuration snapshots and the atomic store.
//!
//! A snapshot bundles everything a request needs to route: the built
//! table, the fallback upstream group, and the policy values. Requests
//! check out one snapshot and use it end to end; a reload builds a new
//! snapshot off to the side and swaps it in atomically, so in-flight
//! requests keep the table they started with.

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;
use tracing::warn;

use crate::config::line::{ConfigLine, LineError};
use crate::config::schema::SelectionPolicy;
use crate::matcher::table::{RoutingTable, TableError, TableOptions};
use crate::request::RequestAttributes;
use crate::routing::record::{RecordError, RoutingRecord};

/// A line rejected while building a snapshot. Never fatal: the
/// snapshot holds every line that did build.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Line(#[from] LineError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("default upstream list: {0}")]
    DefaultParent(#[from] RecordError),
}

/// One consistent view of the routing configuration.
#[derive(Debug)]
pub struct ConfigSnapshot {
    pub table: RoutingTable,
    /// Fallback record when no table line matches.
    pub default_group: Option<Arc<RoutingRecord>>,
    pub policy: SelectionPolicy,
}

impl ConfigSnapshot {
    /// Build a snapshot from routing-table text and a policy. Rejected
    /// lines come back as errors alongside the snapshot.
    pub fn build(table_text: &str, policy: SelectionPolicy) -> (Self, Vec<SnapshotError>) {
        Self::build_with(table_text, policy, TableOptions::default())
    }

    pub fn build_with(
        table_text: &str,
        policy: SelectionPolicy,
        options: TableOptions,
    ) -> (Self, Vec<SnapshotError>) {
        let mut errors: Vec<SnapshotError> = Vec::new();

        let (lines, line_errors) = ConfigLine::parse_table(table_text);
        errors.extend(line_errors.into_iter().map(SnapshotError::from));

        let (table, table_errors) = RoutingTable::build(&lines, options);
        errors.extend(table_errors.into_iter().map(SnapshotError::from));

        let default_group = match policy.default_parent.as_deref() {
            Some(text) => match RoutingRecord::default_group(text) {
                Ok(record) => Some(record),
                Err(e) => {
                    errors.push(SnapshotError::DefaultParent(e));
                    None
                }
            },
            None => None,
        };

        for e in &errors {
            warn!(error = %e, "routing line rejected");
        }

        (
            Self {
                table,
                default_group,
                policy,
            },
            errors,
        )
    }

    /// The record responsible for a request: the table winner, or the
    /// fallback group.
    pub fn record_for(&self, req: &RequestAttributes) -> Option<Arc<RoutingRecord>> {
        self.table
            .match_request(req)
            .or_else(|| self.default_group.clone())
    }
}

/// Lock-free holder of the current snapshot. Readers pay one atomic
/// load per request; writers swap the whole snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<ConfigSnapshot>,
}

impl SnapshotStore {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Check out the current snapshot. The returned Arc stays valid
    /// for the caller's lifetime regardless of later swaps.
    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    pub fn replace(&self, snapshot: Arc<ConfigSnapshot>) {
        self.current.store(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_lines_do_not_block_the_snapshot() {
        let (snap, errors) = ConfigSnapshot::build(
            "dest_domain=good.com parent=p1:80\nnot a line\n",
            SelectionPolicy::default(),
        );
        assert_eq!(snap.table.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn fallback_group_applies_when_nothing_matches() {
        let mut policy = SelectionPolicy::default();
        policy.default_parent = Some("fallback:3128".to_string());
        let (snap, errors) =
            ConfigSnapshot::build("dest_domain=special.com parent=p1:80\n", policy);
        assert!(errors.is_empty());

        let matched = snap
            .record_for(&RequestAttributes::new("special.com"))
            .unwrap();
        assert_eq!(matched.line_num, 1);

        let fallback = snap.record_for(&RequestAttributes::new("other.com")).unwrap();
        assert_eq!(fallback.primary.get(0).unwrap().host, "fallback");
    }

    #[test]
    fn store_swap_is_visible_to_new_loads() {
        let (first, _) = ConfigSnapshot::build(
            "dest_domain=a.com parent=p1:80\n",
            SelectionPolicy::default(),
        );
        let store = SnapshotStore::new(first);
        let held = store.load();

        let (second, _) = ConfigSnapshot::build(
            "dest_domain=b.com parent=p2:80\n",
            SelectionPolicy::default(),
        );
        store.replace(Arc::new(second));

        // The held snapshot still matches the old table.
        assert!(held.record_for(&RequestAttributes::new("a.com")).is_some());
        // New loads see the new one.
        let fresh = store.load();
        assert!(fresh.record_for(&RequestAttributes::new("a.com")).is_none());
        assert!(fresh.record_for(&RequestAttributes::new("b.com")).is_some());
    }
}
