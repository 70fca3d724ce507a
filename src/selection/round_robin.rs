//! Round-robin strategy family: none, strict, hash, latched.
//!
//! The four variants differ only in where the walk starts; the
//! eligibility walk and wraparound handling are shared. The strict
//! counter and the latch are the only cross-request state and both are
//! single atomics, group-scoped like the record that owns the strategy.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::routing::record::StrategyKind;
use crate::routing::upstream::GroupId;
use crate::selection::cursor::SelectionCursor;
use crate::selection::{Pick, SelectContext, SelectionStrategy};

#[derive(Debug)]
pub struct RoundRobinStrategy {
    kind: StrategyKind,
    /// Strict variant: one tick per request.
    counter: AtomicUsize,
    /// Latched variant: last index that served a request.
    latch: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            counter: AtomicUsize::new(0),
            latch: AtomicUsize::new(0),
        }
    }

    fn start_index(&self, ctx: &SelectContext<'_>, len: usize) -> usize {
        match self.kind {
            StrategyKind::Strict => self.counter.fetch_add(1, Ordering::Relaxed) % len,
            StrategyKind::Hash => match ctx.req.client_ip {
                Some(ip) => {
                    let mut h = DefaultHasher::new();
                    ip.hash(&mut h);
                    h.finish() as usize % len
                }
                None => 0,
            },
            StrategyKind::Latched => self.latch.load(Ordering::Relaxed) % len,
            _ => 0,
        }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select(
        &self,
        ctx: &SelectContext<'_>,
        cursor: &mut SelectionCursor,
        first_call: bool,
    ) -> Pick {
        let group = ctx.record.group(GroupId::Primary);
        let len = group.len();
        if len == 0 {
            return if ctx.record.go_direct {
                Pick::Direct
            } else {
                Pick::Fail
            };
        }

        let mut cur = if first_call {
            let start = self.start_index(ctx, len);
            cursor.start = start;
            cursor.wrap_around = false;
            cursor.group = GroupId::Primary;
            start
        } else {
            (cursor.last + 1) % len
        };

        // The walk ends where it began. Coming back around to the start
        // index means every candidate was seen; with bypass disallowed
        // the wrap is forced and the pass restarts from the start index
        // accepting anything. The initial visit to the start index on
        // the first call is not a wrap.
        let mut opening = first_call;
        loop {
            if cur == cursor.start {
                if opening {
                    opening = false;
                } else if cursor.wrap_around {
                    // A forced pass already came through here once.
                    return Pick::Fail;
                } else {
                    if ctx.record.go_direct {
                        debug!(line = ctx.record.line_num, "no eligible upstream, bypassing");
                        return Pick::Direct;
                    }
                    cursor.wrap_around = true;
                }
            }
            let up = &group.upstreams[cur];
            if let Some(retry) = up.health.eligibility(
                ctx.fail_threshold,
                ctx.retry_time,
                ctx.now,
                cursor.wrap_around,
            ) {
                cursor.last = cur;
                if self.kind == StrategyKind::Latched {
                    self.latch.store(cur, Ordering::Relaxed);
                }
                return Pick::Upstream {
                    group: GroupId::Primary,
                    index: cur,
                    retry,
                };
            }
            cur = (cur + 1) % len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::line::ConfigLine;
    use crate::request::RequestAttributes;
    use crate::routing::record::RoutingRecord;
    use proptest::prelude::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn record(text: &str) -> Arc<RoutingRecord> {
        RoutingRecord::from_line(&ConfigLine::parse(text, 1).unwrap().unwrap()).unwrap()
    }

    fn ctx<'a>(rec: &'a RoutingRecord, req: &'a RequestAttributes) -> SelectContext<'a> {
        SelectContext {
            record: rec,
            req,
            fail_threshold: 2,
            retry_time: 300,
            now: 10_000,
        }
    }

    fn pick_index(pick: Pick) -> usize {
        match pick {
            Pick::Upstream { index, .. } => index,
            other => panic!("expected an upstream, got {other:?}"),
        }
    }

    #[test]
    fn none_variant_always_starts_first() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=false");
        let req = RequestAttributes::new("h");
        for _ in 0..3 {
            let mut cursor = SelectionCursor::default();
            let pick = rec.strategy.select(&ctx(&rec, &req), &mut cursor, true);
            assert_eq!(pick_index(pick), 0);
        }
    }

    #[test]
    fn strict_variant_cycles() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=strict");
        let req = RequestAttributes::new("h");
        let picks: Vec<usize> = (0..6)
            .map(|_| {
                let mut cursor = SelectionCursor::default();
                pick_index(rec.strategy.select(&ctx(&rec, &req), &mut cursor, true))
            })
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn hash_variant_is_sticky_per_client() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80,d:80 round_robin=true");
        let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));
        let req = RequestAttributes::new("h").with_client_ip(ip);
        let mut cursor = SelectionCursor::default();
        let first = pick_index(rec.strategy.select(&ctx(&rec, &req), &mut cursor, true));
        for _ in 0..5 {
            let mut cursor = SelectionCursor::default();
            let pick = pick_index(rec.strategy.select(&ctx(&rec, &req), &mut cursor, true));
            assert_eq!(pick, first);
        }
    }

    #[test]
    fn retry_advances_past_reported_failure() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=strict");
        let req = RequestAttributes::new("h");
        let c = ctx(&rec, &req);
        let mut cursor = SelectionCursor::default();
        let first = pick_index(rec.strategy.select(&c, &mut cursor, true));
        let second = pick_index(rec.strategy.select(&c, &mut cursor, false));
        assert_eq!(second, (first + 1) % 3);
        let third = pick_index(rec.strategy.select(&c, &mut cursor, false));
        assert_eq!(third, (first + 2) % 3);
    }

    #[test]
    fn down_upstreams_are_skipped() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=false");
        for _ in 0..2 {
            rec.primary.get(0).unwrap().health.mark_down(10_000, false, 2);
        }
        let req = RequestAttributes::new("h");
        let mut cursor = SelectionCursor::default();
        let pick = pick_index(rec.strategy.select(&ctx(&rec, &req), &mut cursor, true));
        assert_eq!(pick, 1);
    }

    #[test]
    fn all_down_with_bypass_goes_direct() {
        let rec = record("dest_host=h parent=a:80,b:80 round_robin=strict");
        for i in 0..2 {
            for _ in 0..2 {
                rec.primary.get(i).unwrap().health.mark_down(10_000, false, 2);
            }
        }
        let req = RequestAttributes::new("h");
        let mut cursor = SelectionCursor::default();
        assert_eq!(
            rec.strategy.select(&ctx(&rec, &req), &mut cursor, true),
            Pick::Direct
        );
    }

    #[test]
    fn all_down_without_bypass_forces_a_probe() {
        let rec = record("dest_host=h parent=a:80,b:80 round_robin=strict go_direct=false");
        for i in 0..2 {
            for _ in 0..2 {
                rec.primary.get(i).unwrap().health.mark_down(10_000, false, 2);
            }
        }
        let req = RequestAttributes::new("h");
        let mut cursor = SelectionCursor::default();
        match rec.strategy.select(&ctx(&rec, &req), &mut cursor, true) {
            Pick::Upstream { retry, .. } => assert!(retry),
            other => panic!("expected a forced probe, got {other:?}"),
        }
        assert!(cursor.wrap_around);
    }

    #[test]
    fn forced_wrap_on_retry_lands_on_start() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=false go_direct=false");
        let req = RequestAttributes::new("h");
        let c = ctx(&rec, &req);
        let mut cursor = SelectionCursor::default();
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor, true)), 0);
        for i in 0..3 {
            for _ in 0..2 {
                rec.primary.get(i).unwrap().health.mark_down(10_000, false, 2);
            }
        }
        // With every upstream down the retry walk wraps and the forced
        // pick is the walk's start index, not the next slot.
        match rec.strategy.select(&c, &mut cursor, false) {
            Pick::Upstream { index, retry, .. } => {
                assert_eq!(index, 0);
                assert!(retry);
            }
            other => panic!("expected a forced probe of the start index, got {other:?}"),
        }
        assert!(cursor.wrap_around);
    }

    #[test]
    fn walk_fails_once_every_forced_probe_is_spent() {
        let rec = record("dest_host=h parent=a:80,b:80 round_robin=false go_direct=false");
        let req = RequestAttributes::new("h");
        let c = ctx(&rec, &req);
        for i in 0..2 {
            for _ in 0..2 {
                rec.primary.get(i).unwrap().health.mark_down(10_000, false, 2);
            }
        }
        let mut cursor = SelectionCursor::default();
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor, true)), 0);
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor, false)), 1);
        // Both forced probes have been handed out for this request.
        assert_eq!(rec.strategy.select(&c, &mut cursor, false), Pick::Fail);
    }

    #[test]
    fn elapsed_retry_window_yields_probe() {
        let rec = record("dest_host=h parent=a:80,b:80 round_robin=false");
        for _ in 0..2 {
            rec.primary.get(0).unwrap().health.mark_down(10_000, false, 2);
        }
        let req = RequestAttributes::new("h");
        let mut c = ctx(&rec, &req);
        c.now = 10_301;
        let mut cursor = SelectionCursor::default();
        match rec.strategy.select(&c, &mut cursor, true) {
            Pick::Upstream { index, retry, .. } => {
                assert_eq!(index, 0);
                assert!(retry);
            }
            other => panic!("expected a probe of the first upstream, got {other:?}"),
        }
    }

    #[test]
    fn latched_sticks_until_failure() {
        let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=latched");
        let req = RequestAttributes::new("h");
        let c = ctx(&rec, &req);
        let mut cursor = SelectionCursor::default();
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor, true)), 0);
        // New requests stay on the latched upstream.
        let mut cursor2 = SelectionCursor::default();
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor2, true)), 0);
        // A retry moves the latch forward.
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor2, false)), 1);
        let mut cursor3 = SelectionCursor::default();
        assert_eq!(pick_index(rec.strategy.select(&c, &mut cursor3, true)), 1);
    }

    proptest! {
        #[test]
        fn strict_distribution_is_even(requests in 1usize..200) {
            let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=strict");
            let req = RequestAttributes::new("h");
            let mut counts = [0usize; 3];
            for _ in 0..requests {
                let mut cursor = SelectionCursor::default();
                counts[pick_index(rec.strategy.select(&ctx(&rec, &req), &mut cursor, true))] += 1;
            }
            let (min, max) = (counts.iter().min().unwrap(), counts.iter().max().unwrap());
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn select_always_terminates(seed in 0u64..1000, down_mask in 0u8..8) {
            let rec = record("dest_host=h parent=a:80,b:80,c:80 round_robin=true go_direct=false");
            for i in 0..3 {
                if down_mask & (1 << i) != 0 {
                    for _ in 0..2 {
                        rec.primary.get(i).unwrap().health.mark_down(10_000, false, 2);
                    }
                }
            }
            let ip = IpAddr::V4(Ipv4Addr::from((seed as u32).to_be_bytes()));
            let req = RequestAttributes::new("h").with_client_ip(ip);
            let mut cursor = SelectionCursor::default();
            let pick = rec.strategy.select(&ctx(&rec, &req), &mut cursor, true);
            let picked = matches!(pick, Pick::Upstream { .. });
            prop_assert!(picked, "expected an upstream pick, got {:?}", pick);
        }
    }
}
