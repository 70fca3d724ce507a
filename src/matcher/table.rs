//! The routing table: five destination indices over one set of records.
//!
//! Every routing line lands in exactly one index, decided by its
//! destination label. A lookup queries all five and keeps every
//! candidate whose modifier chain accepts the request; when more than
//! one survives, the record from the highest source line wins,
//! regardless of which index produced it.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::line::{ConfigLine, MatchKind};
use crate::matcher::host::HostTable;
use crate::matcher::ip::{IpRange, IpRangeError, IpRangeMap};
use crate::request::RequestAttributes;
use crate::routing::record::{RecordError, RoutingRecord};

/// Which request address the IP index keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpKeySource {
    /// Resolved destination address (`dest_ip` semantics).
    #[default]
    Destination,
    /// Client source address.
    Client,
}

/// Build-time knobs for the table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    pub ip_key: IpKeySource,
}

/// A rejected routing line, reported alongside the built table. The
/// rest of the table still loads.
#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    IpRange(#[from] IpRangeError),
    #[error("line {line}: bad pattern {pattern:?}: {source}")]
    BadRegex {
        line: u32,
        pattern: String,
        source: regex::Error,
    },
    #[error("line {line}: duplicate url key {key:?}")]
    DuplicateUrl { line: u32, key: String },
}

/// Immutable matching structure shared by all requests of a snapshot.
#[derive(Debug)]
pub struct RoutingTable {
    host: HostTable<Arc<RoutingRecord>>,
    url_exact: HashMap<String, Arc<RoutingRecord>>,
    url_regex: Vec<(Regex, Arc<RoutingRecord>)>,
    host_regex: Vec<(Regex, Arc<RoutingRecord>)>,
    ip: IpRangeMap<Arc<RoutingRecord>>,
    ip_key: IpKeySource,
    len: usize,
}

impl RoutingTable {
    /// Build from parsed lines. Lines that fail to build come back as
    /// errors; the table holds everything that parsed.
    pub fn build(lines: &[ConfigLine], options: TableOptions) -> (Self, Vec<TableError>) {
        // Count per index first so each allocates exactly once.
        let mut counts: HashMap<MatchKind, usize> = HashMap::new();
        for line in lines {
            *counts.entry(line.kind).or_default() += 1;
        }
        let count = |kind| counts.get(&kind).copied().unwrap_or(0);

        let mut table = Self {
            host: HostTable::new(),
            url_exact: HashMap::with_capacity(count(MatchKind::Url)),
            url_regex: Vec::with_capacity(count(MatchKind::Regex)),
            host_regex: Vec::with_capacity(count(MatchKind::HostRegex)),
            ip: IpRangeMap::with_capacity(count(MatchKind::Ip)),
            ip_key: options.ip_key,
            len: 0,
        };
        let mut errors = Vec::new();

        for line in lines {
            if let Err(e) = table.insert(line) {
                errors.push(e);
            }
        }
        table.ip.freeze();

        info!(
            records = table.len,
            rejected = errors.len(),
            "routing table built"
        );
        (table, errors)
    }

    fn insert(&mut self, line: &ConfigLine) -> Result<(), TableError> {
        let record = RoutingRecord::from_line(line)?;
        match line.kind {
            MatchKind::Host => self.host.insert(&line.key, false, record),
            MatchKind::Domain => self.host.insert(&line.key, true, record),
            MatchKind::Url => {
                let key = normalize_url(&line.key);
                if self.url_exact.contains_key(&key) {
                    return Err(TableError::DuplicateUrl {
                        line: line.line_num,
                        key: line.key.clone(),
                    });
                }
                self.url_exact.insert(key, record);
            }
            MatchKind::Regex => {
                self.url_regex.push((compile(&line.key, line.line_num)?, record));
            }
            MatchKind::HostRegex => {
                self.host_regex
                    .push((compile(&line.key, line.line_num)?, record));
            }
            MatchKind::Ip => {
                let range = IpRange::parse(&line.key, line.line_num)?;
                self.ip.insert(range, record);
            }
        }
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The winning record for a request, if any line matches.
    pub fn match_request(&self, req: &RequestAttributes) -> Option<Arc<RoutingRecord>> {
        let mut state = MatchState::new(req);

        for record in self.host.matches(&req.host) {
            state.consider(record);
        }
        if let Some(url) = req.url_str() {
            if let Some(record) = self.url_exact.get(url) {
                state.consider(record);
            }
            for (pattern, record) in &self.url_regex {
                if pattern.is_match(url) {
                    state.consider(record);
                }
            }
        }
        for (pattern, record) in &self.host_regex {
            if pattern.is_match(&req.host) {
                state.consider(record);
            }
        }
        let addr = match self.ip_key {
            IpKeySource::Destination => req.dest_ip,
            IpKeySource::Client => req.client_ip,
        };
        if let Some(addr) = addr {
            if let Some(record) = self.ip.lookup(addr) {
                state.consider(record);
            }
        }

        let winner = state.into_winner();
        match &winner {
            Some(r) => debug!(host = %req.host, line = r.line_num, "routing line matched"),
            None => debug!(host = %req.host, "no routing line matched"),
        }
        winner
    }
}

fn compile(pattern: &str, line: u32) -> Result<Regex, TableError> {
    Regex::new(pattern).map_err(|source| TableError::BadRegex {
        line,
        pattern: pattern.to_string(),
        source,
    })
}

/// Exact-URL keys go through the URL parser so lookup and insert agree
/// on normalization; unparseable keys are kept verbatim.
fn normalize_url(key: &str) -> String {
    match url::Url::parse(key) {
        Ok(url) => url.to_string(),
        Err(_) => key.to_string(),
    }
}

/// Accumulates candidates across indices; the highest line wins.
struct MatchState<'a> {
    req: &'a RequestAttributes,
    best: Option<Arc<RoutingRecord>>,
    best_line: i64,
}

impl<'a> MatchState<'a> {
    fn new(req: &'a RequestAttributes) -> Self {
        Self {
            req,
            best: None,
            best_line: -1,
        }
    }

    fn consider(&mut self, record: &Arc<RoutingRecord>) {
        if i64::from(record.line_num) > self.best_line && record.matches(self.req) {
            self.best_line = i64::from(record.line_num);
            self.best = Some(Arc::clone(record));
        }
    }

    fn into_winner(self) -> Option<Arc<RoutingRecord>> {
        self.best
    }
}
