//! Selection policy schema.
//!
//! The policy is the small, table-independent half of a snapshot:
//! whether upstream routing is enabled at all, how many consecutive
//! failures mark an upstream unavailable, and how long to wait before
//! probing a down upstream again. All fields have defaults so a
//! minimal policy file works.

use serde::{Deserialize, Serialize};

/// Global upstream-selection policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionPolicy {
    /// Master switch; disabled means every request goes direct.
    pub enabled: bool,

    /// Consecutive failures after which an upstream is marked unavailable.
    pub fail_threshold: u32,

    /// Seconds a down upstream stays out of plain rotation before it
    /// may be selected again as a retry probe.
    pub retry_time: u64,

    /// Fallback upstream list (`host:port[|weight]`, separated by
    /// `,;` or space) used when no table line matches.
    pub default_parent: Option<String>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_threshold: 10,
            retry_time: 300,
            default_parent: None,
        }
    }
}
