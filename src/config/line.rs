//! Parsed routing-table line model.
//!
//! The external config loader hands the table builder an ordered
//! sequence of these records: one destination label (which decides the
//! index the record lands in), the match key, the remaining label/value
//! pairs, and the source line number used for tie-breaking. The
//! `parse` helper turns one text line into a record; it exists for the
//! watcher and for tests, not as a general config-file parser.

use thiserror::Error;

/// Which index a routing line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// `dest_host=`: exact host name.
    Host,
    /// `dest_domain=`: domain suffix (matches the domain and any subdomain).
    Domain,
    /// `url=`: exact full URL.
    Url,
    /// `url_regex=`: regex over the full URL.
    Regex,
    /// `host_regex=`: regex over the host name only.
    HostRegex,
    /// `dest_ip=`: IP range `lo[-hi]`.
    Ip,
}

impl MatchKind {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "dest_host" => Some(MatchKind::Host),
            "dest_domain" => Some(MatchKind::Domain),
            "url" => Some(MatchKind::Url),
            "url_regex" => Some(MatchKind::Regex),
            "host_regex" => Some(MatchKind::HostRegex),
            "dest_ip" => Some(MatchKind::Ip),
            _ => None,
        }
    }
}

/// One already-tokenized routing-table line.
#[derive(Debug, Clone)]
pub struct ConfigLine {
    pub kind: MatchKind,
    /// The match key (host name, domain, URL, pattern, or IP range).
    pub key: String,
    /// Remaining `label=value` pairs: directives plus modifiers.
    pub modifiers: Vec<(String, String)>,
    /// 1-based source line number; the global tie-break.
    pub line_num: u32,
}

/// Errors for a single rejected line. The table builder logs these and
/// keeps going; they are never fatal.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line {line}: token {token:?} is not a label=value pair")]
    BadToken { line: u32, token: String },
    #[error("line {line}: no destination label (dest_host/dest_domain/url/url_regex/host_regex/dest_ip)")]
    MissingDestination { line: u32 },
    #[error("line {line}: more than one destination label")]
    DuplicateDestination { line: u32 },
}

impl ConfigLine {
    /// Parse one text line. Returns `Ok(None)` for blank and comment
    /// lines. Tokens are whitespace-separated `label=value` pairs; the
    /// value may be quoted to include spaces.
    pub fn parse(text: &str, line_num: u32) -> Result<Option<ConfigLine>, LineError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let mut kind = None;
        let mut key = String::new();
        let mut modifiers = Vec::new();

        for token in split_tokens(trimmed) {
            let Some((label, value)) = token.split_once('=') else {
                return Err(LineError::BadToken {
                    line: line_num,
                    token: token.to_string(),
                });
            };
            let label = label.trim().to_ascii_lowercase();
            let value = value.trim_matches('"').to_string();

            if let Some(k) = MatchKind::from_label(&label) {
                if kind.is_some() {
                    return Err(LineError::DuplicateDestination { line: line_num });
                }
                kind = Some(k);
                key = value;
            } else {
                modifiers.push((label, value));
            }
        }

        match kind {
            Some(kind) => Ok(Some(ConfigLine {
                kind,
                key,
                modifiers,
                line_num,
            })),
            None => Err(LineError::MissingDestination { line: line_num }),
        }
    }

    /// Parse a whole table text into lines, dropping blanks/comments.
    /// Rejected lines come back as errors alongside the good ones.
    pub fn parse_table(text: &str) -> (Vec<ConfigLine>, Vec<LineError>) {
        let mut lines = Vec::new();
        let mut errors = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            match ConfigLine::parse(raw, idx as u32 + 1) {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
        (lines, errors)
    }
}

/// Split on whitespace, keeping double-quoted values intact.
fn split_tokens(line: &str) -> impl Iterator<Item = &str> {
    let mut rest = line;
    std::iter::from_fn(move || {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let mut in_quote = false;
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
            match c {
                '"' => in_quote = !in_quote,
                c if c.is_whitespace() && !in_quote => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }
        let (tok, tail) = rest.split_at(end);
        rest = tail;
        Some(tok)
    })
}
