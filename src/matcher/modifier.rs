//! Secondary match predicates.
//!
//! A routing line may carry modifiers beyond its destination label:
//! `port=lo-hi`, `iport=n`, `scheme=`, `method=`, `prefix=`,
//! `suffix=a,b|*`, `src_ip=lo[-hi]`, `time=HH:MM[:SS]-HH:MM[:SS]`,
//! `tag=`, `internal=true|false`. A record matches only if every
//! modifier accepts the request (AND semantics); a chain with no
//! modifiers always matches.

use std::net::IpAddr;

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

use crate::request::RequestAttributes;

/// Parse failure for one modifier token. The table builder logs the
/// error and discards the whole line.
#[derive(Debug, Error)]
pub enum ModifierError {
    #[error("line {line}: unknown modifier {label:?}")]
    Unknown { line: u32, label: String },
    #[error("line {line}: invalid value {value:?} for {label}: {reason}")]
    Invalid {
        line: u32,
        label: &'static str,
        value: String,
        reason: &'static str,
    },
}

fn invalid(line: u32, label: &'static str, value: &str, reason: &'static str) -> ModifierError {
    ModifierError::Invalid {
        line,
        label,
        value: value.to_string(),
        reason,
    }
}

#[derive(Debug, Clone)]
enum Modifier {
    /// Destination port range (from the request URL).
    Port { lo: u16, hi: u16 },
    /// Exact inbound port.
    IncomingPort(u16),
    Scheme(String),
    Method(String),
    /// URL path prefix; leading '/' optional in config.
    Prefix(String),
    /// Path suffix set; empty set means `*` (any).
    Suffix(Vec<String>),
    SrcIp { lo: IpAddr, hi: IpAddr },
    /// Local time-of-day window; hi must be >= lo (no wrap).
    Time { lo: NaiveTime, hi: NaiveTime },
    Tag(String),
    Internal(bool),
}

impl Modifier {
    fn matches(&self, req: &RequestAttributes) -> bool {
        match self {
            Modifier::Port { lo, hi } => req
                .dest_port()
                .map(|p| (*lo..=*hi).contains(&p))
                .unwrap_or(false),
            Modifier::IncomingPort(p) => req.incoming_port == *p,
            Modifier::Scheme(s) => req
                .scheme()
                .map(|rs| rs.eq_ignore_ascii_case(s))
                .unwrap_or(false),
            Modifier::Method(m) => req
                .method
                .as_deref()
                .map(|rm| rm.eq_ignore_ascii_case(m))
                .unwrap_or(false),
            Modifier::Prefix(prefix) => req
                .path()
                .map(|p| p.trim_start_matches('/').starts_with(prefix.as_str()))
                .unwrap_or(false),
            Modifier::Suffix(suffixes) => {
                if suffixes.is_empty() {
                    return true;
                }
                let Some(path) = req.path() else { return false };
                match path.rsplit_once('.') {
                    Some((_, ext)) => suffixes.iter().any(|s| s.eq_ignore_ascii_case(ext)),
                    None => false,
                }
            }
            Modifier::SrcIp { lo, hi } => req
                .client_ip
                .map(|ip| ip_in_range(ip, *lo, *hi))
                .unwrap_or(false),
            Modifier::Time { lo, hi } => {
                let t = req.start.time();
                let t = NaiveTime::from_hms_opt(t.hour(), t.minute(), t.second())
                    .unwrap_or(t);
                t >= *lo && t <= *hi
            }
            // The one asymmetric rule: a tag on the record with no tag
            // on the request is a hard non-match.
            Modifier::Tag(tag) => req.tag.as_deref() == Some(tag.as_str()),
            Modifier::Internal(flag) => req.internal == *flag,
        }
    }
}

/// Ordered conjunction of modifiers for one routing record.
#[derive(Debug, Clone, Default)]
pub struct ModifierChain {
    modifiers: Vec<Modifier>,
}

impl ModifierChain {
    /// Build a chain from the label/value pairs left over after the
    /// record directives were consumed.
    pub fn from_pairs(pairs: &[(String, String)], line: u32) -> Result<Self, ModifierError> {
        let mut modifiers = Vec::with_capacity(pairs.len());
        for (label, value) in pairs {
            modifiers.push(parse_modifier(label, value, line)?);
        }
        Ok(Self { modifiers })
    }

    /// True when every modifier accepts the request.
    pub fn matches(&self, req: &RequestAttributes) -> bool {
        self.modifiers.iter().all(|m| m.matches(req))
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}

fn parse_modifier(label: &str, value: &str, line: u32) -> Result<Modifier, ModifierError> {
    match label {
        "port" => {
            let (lo, hi) = match value.split_once('-') {
                Some((lo, hi)) => (
                    lo.parse::<u16>()
                        .map_err(|_| invalid(line, "port", value, "bad low port"))?,
                    hi.parse::<u16>()
                        .map_err(|_| invalid(line, "port", value, "bad high port"))?,
                ),
                None => {
                    let p = value
                        .parse::<u16>()
                        .map_err(|_| invalid(line, "port", value, "bad port"))?;
                    (p, p)
                }
            };
            if lo > hi {
                return Err(invalid(line, "port", value, "low port above high port"));
            }
            Ok(Modifier::Port { lo, hi })
        }
        "iport" => value
            .parse::<u16>()
            .map(Modifier::IncomingPort)
            .map_err(|_| invalid(line, "iport", value, "bad port")),
        "scheme" => Ok(Modifier::Scheme(value.to_ascii_lowercase())),
        "method" => Ok(Modifier::Method(value.to_ascii_uppercase())),
        "prefix" => Ok(Modifier::Prefix(value.trim_start_matches('/').to_string())),
        "suffix" => {
            if value == "*" {
                Ok(Modifier::Suffix(Vec::new()))
            } else {
                Ok(Modifier::Suffix(
                    value.split(',').map(|s| s.trim().to_string()).collect(),
                ))
            }
        }
        "src_ip" => {
            let (lo, hi) = match value.split_once('-') {
                Some((lo, hi)) => (
                    lo.parse::<IpAddr>()
                        .map_err(|_| invalid(line, "src_ip", value, "bad low address"))?,
                    hi.parse::<IpAddr>()
                        .map_err(|_| invalid(line, "src_ip", value, "bad high address"))?,
                ),
                None => {
                    let ip = value
                        .parse::<IpAddr>()
                        .map_err(|_| invalid(line, "src_ip", value, "bad address"))?;
                    (ip, ip)
                }
            };
            if std::mem::discriminant(&lo) != std::mem::discriminant(&hi) {
                return Err(invalid(line, "src_ip", value, "mixed address families"));
            }
            Ok(Modifier::SrcIp { lo, hi })
        }
        "time" => {
            let (lo, hi) = value
                .split_once('-')
                .ok_or_else(|| invalid(line, "time", value, "expected lo-hi range"))?;
            let lo = parse_time_of_day(lo)
                .ok_or_else(|| invalid(line, "time", value, "bad low time"))?;
            let hi = parse_time_of_day(hi)
                .ok_or_else(|| invalid(line, "time", value, "bad high time"))?;
            if hi < lo {
                return Err(invalid(line, "time", value, "range may not wrap midnight"));
            }
            Ok(Modifier::Time { lo, hi })
        }
        "tag" => Ok(Modifier::Tag(value.to_string())),
        "internal" => match value {
            "true" => Ok(Modifier::Internal(true)),
            "false" => Ok(Modifier::Internal(false)),
            _ => Err(invalid(line, "internal", value, "expected true or false")),
        },
        _ => Err(ModifierError::Unknown {
            line,
            label: label.to_string(),
        }),
    }
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let mut parts = s.trim().split(':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let min: u32 = parts.next()?.parse().ok()?;
    let sec: u32 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveTime::from_hms_opt(hour, min, sec)
}

fn ip_in_range(ip: IpAddr, lo: IpAddr, hi: IpAddr) -> bool {
    match (ip, lo, hi) {
        (IpAddr::V4(ip), IpAddr::V4(lo), IpAddr::V4(hi)) => {
            let (ip, lo, hi) = (u32::from(ip), u32::from(lo), u32::from(hi));
            ip >= lo && ip <= hi
        }
        (IpAddr::V6(ip), IpAddr::V6(lo), IpAddr::V6(hi)) => {
            let (ip, lo, hi) = (u128::from(ip), u128::from(lo), u128::from(hi));
            ip >= lo && ip <= hi
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(l, v)| (l.to_string(), v.to_string()))
            .collect()
    }

    fn chain(list: &[(&str, &str)]) -> ModifierChain {
        ModifierChain::from_pairs(&pairs(list), 1).unwrap()
    }

    #[test]
    fn empty_chain_matches_everything() {
        let req = RequestAttributes::new("h");
        assert!(ModifierChain::default().matches(&req));
    }

    #[test]
    fn port_range() {
        let c = chain(&[("port", "8000-8080")]);
        assert!(c.matches(&RequestAttributes::new("h").with_url("http://h:8080/")));
        assert!(!c.matches(&RequestAttributes::new("h").with_url("http://h:9000/")));
        // No URL means no destination port to compare.
        assert!(!c.matches(&RequestAttributes::new("h")));
    }

    #[test]
    fn incoming_port() {
        let c = chain(&[("iport", "3128")]);
        assert!(c.matches(&RequestAttributes::new("h").with_incoming_port(3128)));
        assert!(!c.matches(&RequestAttributes::new("h").with_incoming_port(80)));
    }

    #[test]
    fn scheme_and_method_case_insensitive() {
        let c = chain(&[("scheme", "HTTP"), ("method", "get")]);
        let req = RequestAttributes::new("h")
            .with_url("http://h/")
            .with_method("GET");
        assert!(c.matches(&req));
    }

    #[test]
    fn prefix_ignores_leading_slash() {
        let c = chain(&[("prefix", "furry/rabbit")]);
        assert!(c.matches(&RequestAttributes::new("h").with_url("http://h/furry/rabbit/x.gif")));
        assert!(!c.matches(&RequestAttributes::new("h").with_url("http://h/other")));
    }

    #[test]
    fn suffix_list_and_wildcard() {
        let c = chain(&[("suffix", "gif,jpg")]);
        assert!(c.matches(&RequestAttributes::new("h").with_url("http://h/a.GIF")));
        assert!(!c.matches(&RequestAttributes::new("h").with_url("http://h/a.png")));
        assert!(!c.matches(&RequestAttributes::new("h").with_url("http://h/noext")));
        let any = chain(&[("suffix", "*")]);
        assert!(any.matches(&RequestAttributes::new("h").with_url("http://h/noext")));
    }

    #[test]
    fn src_ip_range() {
        let c = chain(&[("src_ip", "10.0.0.1-10.0.0.100")]);
        let inside = RequestAttributes::new("h").with_client_ip("10.0.0.50".parse().unwrap());
        let outside = RequestAttributes::new("h").with_client_ip("10.0.1.1".parse().unwrap());
        assert!(c.matches(&inside));
        assert!(!c.matches(&outside));
        // Client IP unknown: predicate cannot hold.
        assert!(!c.matches(&RequestAttributes::new("h")));
    }

    #[test]
    fn time_window() {
        let c = chain(&[("time", "08:00-17:30")]);
        let mut req = RequestAttributes::new("h");
        req.start = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(c.matches(&req));
        req.start = Local.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        assert!(!c.matches(&req));
    }

    #[test]
    fn time_wrap_rejected() {
        let err = ModifierChain::from_pairs(&pairs(&[("time", "22:00-02:00")]), 4);
        assert!(err.is_err());
    }

    #[test]
    fn tag_requires_request_tag() {
        let c = chain(&[("tag", "video")]);
        assert!(c.matches(&RequestAttributes::new("h").with_tag("video")));
        assert!(!c.matches(&RequestAttributes::new("h").with_tag("audio")));
        assert!(!c.matches(&RequestAttributes::new("h")));
    }

    #[test]
    fn internal_flag() {
        let c = chain(&[("internal", "true")]);
        assert!(c.matches(&RequestAttributes::new("h").with_internal(true)));
        assert!(!c.matches(&RequestAttributes::new("h")));
    }

    #[test]
    fn unknown_label_is_an_error() {
        let err = ModifierChain::from_pairs(&pairs(&[("frobnicate", "1")]), 9).unwrap_err();
        assert!(matches!(err, ModifierError::Unknown { line: 9, .. }));
    }

    #[test]
    fn and_semantics() {
        let c = chain(&[("scheme", "http"), ("iport", "80")]);
        let both = RequestAttributes::new("h")
            .with_url("http://h/")
            .with_incoming_port(80);
        let one = RequestAttributes::new("h")
            .with_url("http://h/")
            .with_incoming_port(81);
        assert!(c.matches(&both));
        assert!(!c.matches(&one));
    }
}
