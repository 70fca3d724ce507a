//! Consistent-hash ring primitive.
//!
//! A pre-computed ring of hash points on a `BTreeMap`: each upstream is
//! placed at `weight * REPLICAS` positions derived from its ring key,
//! and a lookup hashes the request key onto the ring and walks
//! clockwise. The strategy layer treats this as an opaque
//! `assign(key) -> ordered candidate list` primitive; health and
//! iteration policy live entirely outside it.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Virtual nodes per unit of weight.
const REPLICAS: u32 = 128;

/// Immutable hash ring over the member indices of one upstream group.
#[derive(Debug)]
pub struct HashRing {
    ring: BTreeMap<u64, usize>,
    members: usize,
}

impl HashRing {
    /// Build a ring from `(index, key, weight)` members. Weights below
    /// one replica still get a single point so every member is
    /// reachable.
    pub fn build<'a>(members: impl Iterator<Item = (usize, &'a str, f64)>) -> Self {
        let mut ring = BTreeMap::new();
        let mut count = 0;
        for (index, key, weight) in members {
            count += 1;
            let replicas = ((weight * REPLICAS as f64).round() as u32).max(1);
            for replica in 0..replicas {
                ring.insert(hash_point(key, replica), index);
            }
        }
        Self {
            ring,
            members: count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Ordered candidate list for `key`: every member index exactly
    /// once, in clockwise ring order starting at the key's hash point.
    pub fn assign(&self, key: &str) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.members);
        if self.ring.is_empty() {
            return order;
        }
        let point = hash_point(key, 0);
        let walk = self
            .ring
            .range(point..)
            .chain(self.ring.range(..point))
            .map(|(_, idx)| *idx);
        for idx in walk {
            if !order.contains(&idx) {
                order.push(idx);
                if order.len() == self.members {
                    break;
                }
            }
        }
        order
    }
}

fn hash_point(key: &str, replica: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    replica.hash(&mut hasher);
    hasher.finish()
}
