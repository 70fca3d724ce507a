//! Consistent-hash strategy over one or two rings.
//!
//! The primary and secondary upstream groups each get their own ring,
//! built once with the record. The first call for a request computes
//! the full failover order (per the record's secondary mode) and parks
//! it in the cursor; retries just walk forward. Unlike the round-robin
//! family there is no forced wraparound: a request that exhausts its
//! order fails when bypass is disallowed.

use tracing::debug;

use crate::request::RequestAttributes;
use crate::routing::record::RoutingRecord;
use crate::routing::upstream::{GroupId, UpstreamGroup};
use crate::selection::cursor::SelectionCursor;
use crate::selection::ring::HashRing;
use crate::selection::{Pick, SelectContext, SelectionStrategy};

#[derive(Debug)]
pub struct ConsistentHashStrategy {
    primary: HashRing,
    secondary: Option<HashRing>,
}

impl ConsistentHashStrategy {
    pub fn new(primary: &UpstreamGroup, secondary: &UpstreamGroup) -> Self {
        Self {
            primary: build_ring(primary),
            secondary: if secondary.is_empty() {
                None
            } else {
                Some(build_ring(secondary))
            },
        }
    }

    /// Failover order for one request. Mode 1 keeps the primary pick
    /// but fails over to the secondary ring before the rest of the
    /// primary; mode 2 exhausts the primary ring first.
    fn try_order(&self, key: &str, mode: u8) -> Vec<(GroupId, usize)> {
        let primary = self.primary.assign(key);
        let secondary = match &self.secondary {
            Some(ring) => ring.assign(key),
            None => Vec::new(),
        };
        let mut order = Vec::with_capacity(primary.len() + secondary.len());
        match (mode, secondary.is_empty()) {
            (_, true) => {
                order.extend(primary.into_iter().map(|i| (GroupId::Primary, i)));
            }
            (2, false) => {
                order.extend(primary.into_iter().map(|i| (GroupId::Primary, i)));
                order.extend(secondary.into_iter().map(|i| (GroupId::Secondary, i)));
            }
            (_, false) => {
                let mut primary = primary.into_iter();
                order.extend(primary.next().map(|i| (GroupId::Primary, i)));
                order.extend(secondary.into_iter().map(|i| (GroupId::Secondary, i)));
                order.extend(primary.map(|i| (GroupId::Primary, i)));
            }
        }
        order
    }
}

fn build_ring(group: &UpstreamGroup) -> HashRing {
    // Ring points carry the full host:port key so the same host on two
    // ports stays two distinct members.
    let keys: Vec<(usize, String, f64)> = group
        .upstreams
        .iter()
        .map(|u| (u.index, u.hash_key(), u.weight))
        .collect();
    HashRing::build(keys.iter().map(|(index, key, weight)| (*index, key.as_str(), *weight)))
}

/// Ring key for a request: the URL (query stripped when the record
/// says so), falling back to the host when there is no parsed URL.
fn hash_key(record: &RoutingRecord, req: &RequestAttributes) -> String {
    match &req.url {
        Some(url) => {
            if record.ignore_query && url.query().is_some() {
                let mut trimmed = url.clone();
                trimmed.set_query(None);
                trimmed.to_string()
            } else {
                url.to_string()
            }
        }
        None => req.host.clone(),
    }
}

impl SelectionStrategy for ConsistentHashStrategy {
    fn select(
        &self,
        ctx: &SelectContext<'_>,
        cursor: &mut SelectionCursor,
        first_call: bool,
    ) -> Pick {
        if first_call {
            let key = hash_key(ctx.record, ctx.req);
            cursor.ch_order = self.try_order(&key, ctx.record.secondary_mode);
            cursor.ch_pos = 0;
        }

        while cursor.ch_pos < cursor.ch_order.len() {
            let (group, index) = cursor.ch_order[cursor.ch_pos];
            cursor.ch_pos += 1;
            let up = &ctx.record.group(group).upstreams[index];
            if let Some(retry) =
                up.health
                    .eligibility(ctx.fail_threshold, ctx.retry_time, ctx.now, false)
            {
                cursor.group = group;
                cursor.last = index;
                return Pick::Upstream { group, index, retry };
            }
        }

        if ctx.record.go_direct {
            debug!(line = ctx.record.line_num, "hash order exhausted, bypassing");
            Pick::Direct
        } else {
            Pick::Fail
        }
    }
}
