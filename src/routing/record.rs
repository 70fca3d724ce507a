//! Routing record: one table line's upstreams, strategy and policy.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::config::line::ConfigLine;
use crate::matcher::modifier::{ModifierChain, ModifierError};
use crate::request::RequestAttributes;
use crate::routing::upstream::{GroupId, UpstreamDescriptor, UpstreamGroup};
use crate::selection::consistent::ConsistentHashStrategy;
use crate::selection::round_robin::RoundRobinStrategy;
use crate::selection::SelectionStrategy;

/// Selection algorithm named by the `round_robin=` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// `round_robin=false`: always start at the first upstream.
    None,
    /// `round_robin=strict`: every request advances a shared counter.
    Strict,
    /// `round_robin=true`: start index hashed from the client address.
    Hash,
    /// `round_robin=latched`: stick to the last upstream that worked.
    Latched,
    /// `round_robin=consistent_hash`: ring placement by request URL.
    Consistent,
}

impl StrategyKind {
    fn from_value(value: &str) -> Option<Self> {
        match value {
            "false" | "none" => Some(StrategyKind::None),
            "strict" => Some(StrategyKind::Strict),
            "true" => Some(StrategyKind::Hash),
            "latched" => Some(StrategyKind::Latched),
            "consistent_hash" => Some(StrategyKind::Consistent),
            _ => None,
        }
    }
}

/// Which failure responses may be retried against another upstream,
/// and how many times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub simple: bool,
    pub unavailable: bool,
    /// 4xx codes retried without marking the upstream down.
    pub simple_codes: Vec<u16>,
    /// 5xx codes that count against the upstream's health.
    pub unavailable_codes: Vec<u16>,
    pub max_simple_retries: u32,
    pub max_unavailable_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            simple: false,
            unavailable: false,
            simple_codes: vec![404],
            unavailable_codes: vec![503],
            max_simple_retries: 1,
            max_unavailable_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Whether a response with `status` may be retried, given how many
    /// attempts this request has already made.
    pub fn retryable(&self, status: u16, attempts: u32) -> bool {
        if self.simple && attempts < self.max_simple_retries && self.simple_codes.contains(&status)
        {
            return true;
        }
        self.unavailable
            && attempts < self.max_unavailable_retries
            && self.unavailable_codes.contains(&status)
    }

    /// Whether `status` is one of the codes that marks the upstream
    /// down (as opposed to a simple retry, which leaves health alone).
    pub fn counts_against_health(&self, status: u16) -> bool {
        self.unavailable && self.unavailable_codes.contains(&status)
    }
}

/// A rejected routing line. The table builder logs these and drops the
/// line; the rest of the table still loads.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Modifier(#[from] ModifierError),
    #[error("line {line}: bad upstream entry {entry:?}: {reason}")]
    BadUpstream {
        line: u32,
        entry: String,
        reason: &'static str,
    },
    #[error("line {line}: invalid value {value:?} for {label}")]
    BadDirective {
        line: u32,
        label: &'static str,
        value: String,
    },
    #[error("line {line}: no upstreams and bypass disabled")]
    NoUpstreams { line: u32 },
}

/// One immutable routing record: destination upstreams, the strategy
/// that picks among them, the retry policy, and the leftover modifiers
/// that gate the match. Only the health atomics inside the descriptors
/// mutate after construction.
#[derive(Debug)]
pub struct RoutingRecord {
    pub primary: UpstreamGroup,
    pub secondary: UpstreamGroup,
    pub strategy_kind: StrategyKind,
    pub(crate) strategy: Box<dyn SelectionStrategy>,
    /// Whether the origin may be contacted when no upstream is usable.
    pub go_direct: bool,
    /// Strip the query string before consistent hashing.
    pub ignore_query: bool,
    /// Upstream speaks proxy protocol (gets the full URL) vs origin.
    pub parent_is_proxy: bool,
    /// Failover order between the two groups under consistent hashing.
    pub secondary_mode: u8,
    pub retry: RetryPolicy,
    pub(crate) modifiers: ModifierChain,
    /// 1-based source line; the cross-index tie-break.
    pub line_num: u32,
}

impl RoutingRecord {
    /// Build a record from a parsed table line: consume the directive
    /// labels, hand the rest to the modifier chain.
    pub fn from_line(line: &ConfigLine) -> Result<Arc<Self>, RecordError> {
        let num = line.line_num;
        let mut primary_text: Option<&str> = None;
        let mut secondary_text: Option<&str> = None;
        let mut strategy_kind = StrategyKind::None;
        let mut go_direct = true;
        let mut ignore_query = false;
        let mut parent_is_proxy = true;
        let mut secondary_mode: u8 = 1;
        let mut retry = RetryPolicy::default();
        let mut simple_codes_given = false;
        let mut unavailable_codes_given = false;
        let mut scheme: Option<String> = None;
        let mut leftovers: Vec<(String, String)> = Vec::new();

        for (label, value) in &line.modifiers {
            match label.as_str() {
                "parent" | "primary_parent" => primary_text = Some(value),
                "secondary_parent" => secondary_text = Some(value),
                "round_robin" => {
                    strategy_kind = StrategyKind::from_value(value).ok_or(
                        RecordError::BadDirective {
                            line: num,
                            label: "round_robin",
                            value: value.clone(),
                        },
                    )?;
                }
                "go_direct" => go_direct = parse_bool(value, num, "go_direct")?,
                "parent_is_proxy" => parent_is_proxy = parse_bool(value, num, "parent_is_proxy")?,
                "qstring" => ignore_query = value == "ignore",
                "parent_retry" => match value.as_str() {
                    "simple_retry" => retry.simple = true,
                    "unavailable_server_retry" => retry.unavailable = true,
                    "both" => {
                        retry.simple = true;
                        retry.unavailable = true;
                    }
                    _ => {
                        return Err(RecordError::BadDirective {
                            line: num,
                            label: "parent_retry",
                            value: value.clone(),
                        })
                    }
                },
                "simple_server_retry_responses" => {
                    retry.simple_codes = parse_codes(value, 400..=499, num, label);
                    simple_codes_given = true;
                }
                "unavailable_server_retry_responses" => {
                    retry.unavailable_codes = parse_codes(value, 500..=599, num, label);
                    unavailable_codes_given = true;
                }
                "max_simple_retries" => {
                    retry.max_simple_retries = parse_retry_count(value, num, label);
                }
                "max_unavailable_server_retries" => {
                    retry.max_unavailable_retries = parse_retry_count(value, num, label);
                }
                "secondary_mode" => {
                    secondary_mode = match value.as_str() {
                        "1" => 1,
                        "2" => 2,
                        _ => {
                            warn!(line = num, value = %value, "unsupported secondary_mode, using 1");
                            1
                        }
                    };
                }
                "scheme" => {
                    scheme = Some(value.clone());
                    // Also a match predicate; keep it in the chain.
                    leftovers.push((label.clone(), value.clone()));
                }
                _ => leftovers.push((label.clone(), value.clone())),
            }
        }

        let primary = parse_group(primary_text.unwrap_or(""), scheme.as_deref(), num)?;
        let secondary = parse_group(secondary_text.unwrap_or(""), scheme.as_deref(), num)?;
        if primary.is_empty() && !go_direct {
            return Err(RecordError::NoUpstreams { line: num });
        }
        if retry.simple_codes.is_empty() {
            retry.simple_codes = vec![404];
        }
        if retry.unavailable_codes.is_empty() {
            retry.unavailable_codes = vec![503];
        }
        if simple_codes_given && !retry.simple {
            warn!(line = num, "simple_server_retry_responses without simple_retry is ignored");
        }
        if unavailable_codes_given && !retry.unavailable {
            warn!(
                line = num,
                "unavailable_server_retry_responses without unavailable_server_retry is ignored"
            );
        }

        let modifiers = ModifierChain::from_pairs(&leftovers, num)?;
        let strategy = build_strategy(strategy_kind, &primary, &secondary);

        Ok(Arc::new(Self {
            primary,
            secondary,
            strategy_kind,
            strategy,
            go_direct,
            ignore_query,
            parent_is_proxy,
            secondary_mode,
            retry,
            modifiers,
            line_num: num,
        }))
    }

    /// Fallback record for requests no table line matches: the global
    /// upstream list, first-eligible selection, bypass allowed.
    pub fn default_group(parents_text: &str) -> Result<Arc<Self>, RecordError> {
        let primary = parse_group(parents_text, None, 0)?;
        let strategy = build_strategy(StrategyKind::None, &primary, &UpstreamGroup::default());
        Ok(Arc::new(Self {
            primary,
            secondary: UpstreamGroup::default(),
            strategy_kind: StrategyKind::None,
            strategy,
            go_direct: true,
            ignore_query: false,
            parent_is_proxy: true,
            secondary_mode: 1,
            retry: RetryPolicy::default(),
            modifiers: ModifierChain::default(),
            line_num: 0,
        }))
    }

    pub fn group(&self, id: GroupId) -> &UpstreamGroup {
        match id {
            GroupId::Primary => &self.primary,
            GroupId::Secondary => &self.secondary,
        }
    }

    /// True when the record's modifier chain accepts the request.
    pub fn matches(&self, req: &RequestAttributes) -> bool {
        self.modifiers.matches(req)
    }
}

fn build_strategy(
    kind: StrategyKind,
    primary: &UpstreamGroup,
    secondary: &UpstreamGroup,
) -> Box<dyn SelectionStrategy> {
    match kind {
        StrategyKind::Consistent => Box::new(ConsistentHashStrategy::new(primary, secondary)),
        _ => Box::new(RoundRobinStrategy::new(kind)),
    }
}

fn parse_bool(value: &str, line: u32, label: &'static str) -> Result<bool, RecordError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(RecordError::BadDirective {
            line,
            label,
            value: value.to_string(),
        }),
    }
}

/// Parse a `host:port[|weight]` list separated by commas, semicolons
/// or spaces.
fn parse_group(
    text: &str,
    scheme: Option<&str>,
    line: u32,
) -> Result<UpstreamGroup, RecordError> {
    let mut upstreams = Vec::new();
    for entry in text
        .split([',', ';', ' '])
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        let (addr, weight_text) = match entry.split_once('|') {
            Some((addr, w)) => (addr, Some(w)),
            None => (entry, None),
        };
        let Some((host, port_text)) = addr.rsplit_once(':') else {
            return Err(RecordError::BadUpstream {
                line,
                entry: entry.to_string(),
                reason: "missing port",
            });
        };
        let port: u16 = port_text.parse().map_err(|_| RecordError::BadUpstream {
            line,
            entry: entry.to_string(),
            reason: "bad port",
        })?;
        let weight = match weight_text {
            Some(w) => w.parse::<f64>().map_err(|_| RecordError::BadUpstream {
                line,
                entry: entry.to_string(),
                reason: "bad weight",
            })?,
            None => 1.0,
        };
        if host.is_empty() {
            return Err(RecordError::BadUpstream {
                line,
                entry: entry.to_string(),
                reason: "empty host",
            });
        }
        let mut up = UpstreamDescriptor::new(host.to_string(), port, upstreams.len(), weight);
        up.scheme = scheme.map(str::to_string);
        upstreams.push(up);
    }
    Ok(UpstreamGroup { upstreams })
}

/// Parse a retry-responses code list, dropping codes outside `range`.
fn parse_codes(
    value: &str,
    range: std::ops::RangeInclusive<u16>,
    line: u32,
    label: &str,
) -> Vec<u16> {
    let mut codes = Vec::new();
    for piece in value.split([',', ' ']).map(str::trim).filter(|p| !p.is_empty()) {
        match piece.parse::<u16>() {
            Ok(code) if range.contains(&code) => codes.push(code),
            _ => {
                warn!(line, label, code = %piece, "ignoring out-of-range retry response code");
            }
        }
    }
    codes
}

fn parse_retry_count(value: &str, line: u32, label: &str) -> u32 {
    match value.parse::<u32>() {
        Ok(n) if (1..=5).contains(&n) => n,
        _ => {
            warn!(line, label, value = %value, "retry count out of range, using 1");
            1
        }
    }
}
