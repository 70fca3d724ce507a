//! Upstream endpoint descriptors.

use std::fmt;

use crate::health::HealthState;

/// Primary or secondary upstream list of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupId {
    #[default]
    Primary,
    Secondary,
}

/// A single upstream endpoint within a group.
pub struct UpstreamDescriptor {
    /// Upstream host name.
    pub host: String,
    /// Upstream port.
    pub port: u16,
    /// Scheme tag applied by a `scheme=` modifier on the record.
    pub scheme: Option<String>,
    /// Stable position within the group; hashing and wraparound
    /// arithmetic depend on it never changing for a snapshot's lifetime.
    pub index: usize,
    /// Weight for the consistent-hash ring.
    pub weight: f64,
    /// Health fields, the only mutable state shared across requests.
    pub health: HealthState,
}

impl UpstreamDescriptor {
    pub fn new(host: String, port: u16, index: usize, weight: f64) -> Self {
        Self {
            host,
            port,
            scheme: None,
            index,
            weight,
            health: HealthState::new(),
        }
    }

    /// Stable ring key for consistent hashing.
    pub fn hash_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for UpstreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("index", &self.index)
            .field("weight", &self.weight)
            .field("available", &self.health.is_available())
            .finish()
    }
}

/// Ordered set of upstreams sharing one selection strategy.
#[derive(Debug, Default)]
pub struct UpstreamGroup {
    pub upstreams: Vec<UpstreamDescriptor>,
}

impl UpstreamGroup {
    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&UpstreamDescriptor> {
        self.upstreams.get(index)
    }
}
