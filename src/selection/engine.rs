//! Selection façade over the snapshot store.
//!
//! The pipeline's whole view of routing is four calls: `find` a
//! decision for a request, `retry` after a failed attempt, and
//! `mark_down` / `mark_up` to report what happened. Each find checks
//! out the current snapshot; the decision pins the matched record and
//! the policy values so retries keep working against the configuration
//! the request started with.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::config::snapshot::SnapshotStore;
use crate::request::RequestAttributes;
use crate::routing::record::RoutingRecord;
use crate::routing::upstream::UpstreamDescriptor;
use crate::selection::cursor::{Decision, DecisionKind};
use crate::selection::{Pick, SelectContext};

#[derive(Debug)]
pub struct SelectionEngine {
    store: Arc<SnapshotStore>,
}

impl SelectionEngine {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Route one request: an API-pinned upstream wins outright, then
    /// the table (or the fallback group), then direct.
    pub fn find(&self, req: &RequestAttributes) -> Decision {
        if let Some((host, port)) = &req.api_upstream {
            debug!(host = %host, port, "using API-pinned upstream");
            return Decision::new(DecisionKind::ApiPinned {
                host: host.clone(),
                port: *port,
            });
        }

        let snapshot = self.store.load();
        if !snapshot.policy.enabled {
            return Decision::new(DecisionKind::Direct);
        }
        let Some(record) = snapshot.record_for(req) else {
            return Decision::new(DecisionKind::Direct);
        };

        let mut decision = Decision::with_record(
            DecisionKind::Fail,
            record,
            snapshot.policy.fail_threshold,
            snapshot.policy.retry_time,
        );
        self.advance(req, &mut decision, true);
        decision
    }

    /// Advance a decision after a failed attempt. API-pinned upstreams
    /// have no fallback; everything else asks the record's strategy for
    /// the next candidate.
    pub fn retry(&self, decision: &mut Decision, req: &RequestAttributes) {
        decision.attempts += 1;
        if decision.is_api_pinned() || decision.record.is_none() {
            decision.set_kind(DecisionKind::Fail);
            return;
        }
        self.advance(req, decision, false);
    }

    fn advance(&self, req: &RequestAttributes, decision: &mut Decision, first_call: bool) {
        // Record and policy values were both pinned at find time; a
        // reload between attempts cannot change them mid-request.
        let Some(record) = decision.record.clone() else {
            decision.set_kind(DecisionKind::Fail);
            return;
        };
        let ctx = SelectContext {
            record: &record,
            req,
            fail_threshold: decision.fail_threshold,
            retry_time: decision.retry_time,
            now: now_secs(),
        };
        match record.strategy.select(&ctx, &mut decision.cursor, first_call) {
            Pick::Upstream { group, index, retry } => {
                let up = &record.group(group).upstreams[index];
                decision.retry_probe = retry;
                decision.set_kind(DecisionKind::Specified {
                    host: up.host.clone(),
                    port: up.port,
                });
                debug!(
                    host = %up.host,
                    port = up.port,
                    line = record.line_num,
                    retry_probe = retry,
                    "upstream selected"
                );
            }
            Pick::Direct => decision.set_kind(DecisionKind::Direct),
            Pick::Fail => decision.set_kind(DecisionKind::Fail),
        }
    }

    /// Report a failed attempt against the decided upstream. A probe
    /// failure restamps the retry window; crossing the failure
    /// threshold takes the upstream out of plain rotation.
    pub fn mark_down(&self, decision: &Decision) {
        let Some(up) = self.decided_upstream(decision) else {
            return;
        };
        if up
            .health
            .mark_down(now_secs(), decision.retry_probe, decision.fail_threshold)
        {
            warn!(upstream = %up.hash_key(), "upstream marked unavailable");
        }
    }

    /// Report a successful attempt: full health reset.
    pub fn mark_up(&self, decision: &Decision) {
        let Some(up) = self.decided_upstream(decision) else {
            return;
        };
        if !up.health.is_available() {
            info!(upstream = %up.hash_key(), "upstream back in rotation");
        }
        up.health.mark_up();
    }

    /// Whether the attempt's response may be retried against another
    /// upstream, per the record's retry policy and the attempts already
    /// burned. API-pinned decisions are never retryable.
    pub fn response_is_retryable(&self, decision: &Decision, status: u16) -> bool {
        if decision.is_api_pinned() {
            return false;
        }
        match (&decision.record, decision.upstream()) {
            (Some(record), Some(_)) => record.retry.retryable(status, decision.attempts),
            _ => false,
        }
    }

    /// The live descriptor behind a Specified decision. API-pinned
    /// upstreams have no descriptor and no tracked health.
    fn decided_upstream<'a>(&self, decision: &'a Decision) -> Option<&'a UpstreamDescriptor> {
        if decision.is_api_pinned() {
            return None;
        }
        let record: &Arc<RoutingRecord> = decision.record.as_ref()?;
        let (host, port) = decision.upstream()?;
        let up = record.group(decision.cursor.group).get(decision.cursor.last)?;
        // Cursor and kind always agree; the check is a cheap tripwire.
        (up.host == host && up.port == port).then_some(up)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::SelectionPolicy;
    use crate::config::snapshot::ConfigSnapshot;

    fn engine(table: &str, policy: SelectionPolicy) -> SelectionEngine {
        let (snapshot, errors) = ConfigSnapshot::build(table, policy);
        assert!(errors.is_empty(), "{errors:?}");
        SelectionEngine::new(Arc::new(SnapshotStore::new(snapshot)))
    }

    #[test]
    fn disabled_policy_goes_direct() {
        let mut policy = SelectionPolicy::default();
        policy.enabled = false;
        let e = engine("dest_domain=a.com parent=p:80\n", policy);
        let d = e.find(&RequestAttributes::new("a.com"));
        assert_eq!(d.kind(), &DecisionKind::Direct);
    }

    #[test]
    fn api_pinned_wins_and_never_retries() {
        let e = engine("dest_domain=a.com parent=p:80\n", SelectionPolicy::default());
        let req = RequestAttributes::new("a.com").with_api_upstream("pinned", 9090);
        let mut d = e.find(&req);
        assert_eq!(d.upstream(), Some(("pinned", 9090)));
        assert!(d.is_api_pinned());
        assert!(!e.response_is_retryable(&d, 503));
        e.retry(&mut d, &req);
        assert_eq!(d.kind(), &DecisionKind::Fail);
        assert_eq!(d.attempts(), 1);
    }

    #[test]
    fn mark_down_is_a_no_op_without_an_upstream() {
        let e = engine("dest_domain=a.com parent=p:80\n", SelectionPolicy::default());
        let d = e.find(&RequestAttributes::new("nomatch.org"));
        assert_eq!(d.kind(), &DecisionKind::Direct);
        // Nothing to mark; must not panic.
        e.mark_down(&d);
        e.mark_up(&d);
    }

    #[test]
    fn policy_values_stay_pinned_across_a_reload() {
        let table = "dest_domain=a.com parent=p1:80,p2:80,p3:80 round_robin=false go_direct=false\n";
        let policy = SelectionPolicy {
            fail_threshold: 1,
            retry_time: 0,
            ..SelectionPolicy::default()
        };
        let e = engine(table, policy);
        let req = RequestAttributes::new("a.com");

        // p2 is down, but with a zero retry window it is an immediate
        // probe candidate.
        let rec = e.store().load().record_for(&req).unwrap();
        rec.primary.get(1).unwrap().health.mark_down(now_secs(), false, 1);

        let mut d = e.find(&req);
        assert_eq!(d.upstream(), Some(("p1", 80)));

        // A reload widens the retry window to an hour. The in-flight
        // decision keeps the window it was found under, so the retry
        // still probes p2 instead of skipping to p3.
        let wide = SelectionPolicy {
            fail_threshold: 1,
            retry_time: 3600,
            ..SelectionPolicy::default()
        };
        let (swapped, errors) = ConfigSnapshot::build(table, wide);
        assert!(errors.is_empty(), "{errors:?}");
        e.store().replace(Arc::new(swapped));

        e.retry(&mut d, &req);
        assert_eq!(d.upstream(), Some(("p2", 80)));
        assert!(d.is_retry_probe());
    }

    #[test]
    fn retry_counts_attempts_for_the_policy() {
        let e = engine(
            "dest_domain=a.com parent=p1:80,p2:80 round_robin=strict \
             parent_retry=unavailable_server_retry max_unavailable_server_retries=2\n",
            SelectionPolicy::default(),
        );
        let req = RequestAttributes::new("a.com");
        let mut d = e.find(&req);
        assert!(e.response_is_retryable(&d, 503));
        assert!(!e.response_is_retryable(&d, 500));
        e.retry(&mut d, &req);
        assert!(e.response_is_retryable(&d, 503));
        e.retry(&mut d, &req);
        assert!(!e.response_is_retryable(&d, 503));
    }
}
