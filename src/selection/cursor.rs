//! Selection decisions and per-request cursor state.

use std::sync::Arc;

use crate::routing::record::RoutingRecord;
use crate::routing::upstream::GroupId;

/// What the pipeline should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionKind {
    /// Bypass every upstream and contact the origin directly.
    Direct,
    /// Use this upstream, chosen by the routing table.
    Specified { host: String, port: u16 },
    /// Use this upstream, pinned through the plugin API. Exempt from
    /// retry policy and health tracking.
    ApiPinned { host: String, port: u16 },
    /// No usable route; fail the transaction.
    Fail,
}

/// Per-request iteration state. Created at `find()`, advanced by each
/// `retry()`, discarded with the request. Never shared across requests.
#[derive(Debug, Default, Clone)]
pub(crate) struct SelectionCursor {
    /// First index tried in the round-robin walk.
    pub start: usize,
    /// Most recently returned index.
    pub last: usize,
    /// Set once the walk has revisited its starting point.
    pub wrap_around: bool,
    /// Which group the last pick came from.
    pub group: GroupId,
    /// Consistent-hash try order, computed once per request:
    /// (group, index) pairs in ring order per the record's
    /// secondary mode.
    pub ch_order: Vec<(GroupId, usize)>,
    /// Next position in `ch_order`.
    pub ch_pos: usize,
}

/// The routing core's answer for one request, including the state a
/// later `retry()` needs. The cursor and record reference are
/// crate-private: strategies and the engine mutate them, callers only
/// see the kind and the accessors.
#[derive(Debug, Clone)]
pub struct Decision {
    kind: DecisionKind,
    pub(crate) record: Option<Arc<RoutingRecord>>,
    pub(crate) cursor: SelectionCursor,
    pub(crate) retry_probe: bool,
    /// Completed attempts against this record (bumped by `retry()`).
    pub(crate) attempts: u32,
    /// Policy values captured at `find()` time. Like the record, they
    /// stay fixed for the request even if a reload swaps the snapshot.
    pub(crate) fail_threshold: u32,
    pub(crate) retry_time: u64,
}

impl Decision {
    pub(crate) fn new(kind: DecisionKind) -> Self {
        Self {
            kind,
            record: None,
            cursor: SelectionCursor::default(),
            retry_probe: false,
            attempts: 0,
            fail_threshold: 0,
            retry_time: 0,
        }
    }

    pub(crate) fn with_record(
        kind: DecisionKind,
        record: Arc<RoutingRecord>,
        fail_threshold: u32,
        retry_time: u64,
    ) -> Self {
        Self {
            kind,
            record: Some(record),
            cursor: SelectionCursor::default(),
            retry_probe: false,
            attempts: 0,
            fail_threshold,
            retry_time,
        }
    }

    pub(crate) fn set_kind(&mut self, kind: DecisionKind) {
        self.kind = kind;
    }

    pub fn kind(&self) -> &DecisionKind {
        &self.kind
    }

    /// Chosen upstream endpoint, for Specified and ApiPinned decisions.
    pub fn upstream(&self) -> Option<(&str, u16)> {
        match &self.kind {
            DecisionKind::Specified { host, port } | DecisionKind::ApiPinned { host, port } => {
                Some((host.as_str(), *port))
            }
            _ => None,
        }
    }

    /// True when the decision names a concrete upstream.
    pub fn is_some_result(&self) -> bool {
        matches!(
            self.kind,
            DecisionKind::Specified { .. } | DecisionKind::ApiPinned { .. }
        )
    }

    /// True when the matched record allows going direct instead of
    /// using an upstream. Without a record there is nothing to bypass.
    pub fn bypass_allowed(&self) -> bool {
        self.record.as_ref().map(|r| r.go_direct).unwrap_or(true)
    }

    /// True when the current pick is a probe of a nominally-down
    /// upstream whose retry window elapsed (or a forced wrap pick).
    pub fn is_retry_probe(&self) -> bool {
        self.retry_probe
    }

    /// True for decisions pinned through the plugin API.
    pub fn is_api_pinned(&self) -> bool {
        matches!(self.kind, DecisionKind::ApiPinned { .. })
    }

    /// Whether the matched record treats the upstream as a proxy
    /// (forward the full URL) or as an origin server.
    pub fn upstream_is_proxy(&self) -> bool {
        self.record
            .as_ref()
            .map(|r| r.parent_is_proxy)
            .unwrap_or(true)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
