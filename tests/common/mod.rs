//! Shared builders for the routing integration tests.

use std::sync::Arc;

use upstream_router::config::snapshot::{ConfigSnapshot, SnapshotStore};
use upstream_router::{RequestAttributes, SelectionEngine, SelectionPolicy};

/// Engine over a routing table with default policy.
#[allow(dead_code)]
pub fn engine(table: &str) -> SelectionEngine {
    engine_with(table, SelectionPolicy::default())
}

/// Engine over a routing table with an explicit policy. Rejected lines
/// fail the test immediately.
#[allow(dead_code)]
pub fn engine_with(table: &str, policy: SelectionPolicy) -> SelectionEngine {
    init_tracing();
    let (snapshot, errors) = ConfigSnapshot::build(table, policy);
    assert!(errors.is_empty(), "rejected routing lines: {errors:?}");
    SelectionEngine::new(Arc::new(SnapshotStore::new(snapshot)))
}

/// Policy where a single failure marks an upstream down and it stays
/// down well past the end of the test.
#[allow(dead_code)]
pub fn fail_policy() -> SelectionPolicy {
    SelectionPolicy {
        fail_threshold: 1,
        retry_time: 300,
        ..SelectionPolicy::default()
    }
}

/// Like [`fail_policy`] but with a one-second retry window, for tests
/// that wait the window out.
#[allow(dead_code)]
pub fn fast_fail_policy() -> SelectionPolicy {
    SelectionPolicy {
        retry_time: 1,
        ..fail_policy()
    }
}

/// Route tracing output through the test harness; honors RUST_LOG.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Request for a host with a matching URL, the common case.
#[allow(dead_code)]
pub fn request(host: &str, path: &str) -> RequestAttributes {
    RequestAttributes::new(host).with_url(&format!("http://{host}{path}"))
}

/// A table exercising every destination index and several modifiers.
#[allow(dead_code)]
pub const MIXED_TABLE: &str = "\
dest_domain=. parent=root1:80,root2:80 round_robin=strict
dest_domain=inktomi.com parent=ink1:80,ink2:80 round_robin=false
dest_host=www.pilot.net parent=pilot1:80
url_regex=snoopy parent=odie1:80,odie2:80 round_robin=strict
dest_ip=209.131.62.14 parent=direct1:80,direct2:80 go_direct=true
dest_domain=mail.example.com parent=mx1:25 method=put
host_regex=^cache[0-9] parent=peer1:80,peer2:80 round_robin=latched
";
