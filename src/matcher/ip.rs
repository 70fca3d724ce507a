//! IP range index.
//!
//! Ranges are inclusive `lo..=hi` pairs (`dest_ip=1.2.3.4` or
//! `dest_ip=1.2.3.0-1.2.3.255`), kept per address family in a vector
//! sorted by range start once the table is frozen. Lookup is a binary
//! search returning at most one payload; when configured ranges
//! overlap, the one starting latest at or below the address wins.

use std::net::IpAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpRangeError {
    #[error("line {line}: bad IP range {value:?}")]
    Bad { line: u32, value: String },
    #[error("line {line}: IP range {value:?} mixes address families")]
    MixedFamilies { line: u32, value: String },
    #[error("line {line}: IP range {value:?} has low above high")]
    Inverted { line: u32, value: String },
}

/// Inclusive address range, parsed from `lo[-hi]` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub lo: IpAddr,
    pub hi: IpAddr,
}

impl IpRange {
    pub fn parse(value: &str, line: u32) -> Result<Self, IpRangeError> {
        let bad = || IpRangeError::Bad {
            line,
            value: value.to_string(),
        };
        let (lo, hi) = match value.split_once('-') {
            Some((lo, hi)) => (
                lo.trim().parse::<IpAddr>().map_err(|_| bad())?,
                hi.trim().parse::<IpAddr>().map_err(|_| bad())?,
            ),
            None => {
                let ip = value.trim().parse::<IpAddr>().map_err(|_| bad())?;
                (ip, ip)
            }
        };
        match (lo, hi) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                if u32::from(a) > u32::from(b) {
                    return Err(IpRangeError::Inverted {
                        line,
                        value: value.to_string(),
                    });
                }
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                if u128::from(a) > u128::from(b) {
                    return Err(IpRangeError::Inverted {
                        line,
                        value: value.to_string(),
                    });
                }
            }
            _ => {
                return Err(IpRangeError::MixedFamilies {
                    line,
                    value: value.to_string(),
                })
            }
        }
        Ok(IpRange { lo, hi })
    }
}

/// Interval map from IP ranges to payloads.
#[derive(Debug)]
pub struct IpRangeMap<T> {
    v4: Vec<(u32, u32, T)>,
    v6: Vec<(u128, u128, T)>,
    frozen: bool,
}

impl<T> IpRangeMap<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            v4: Vec::with_capacity(capacity),
            v6: Vec::with_capacity(capacity),
            frozen: false,
        }
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    pub fn insert(&mut self, range: IpRange, value: T) {
        debug_assert!(!self.frozen);
        match (range.lo, range.hi) {
            (IpAddr::V4(lo), IpAddr::V4(hi)) => {
                self.v4.push((u32::from(lo), u32::from(hi), value))
            }
            (IpAddr::V6(lo), IpAddr::V6(hi)) => {
                self.v6.push((u128::from(lo), u128::from(hi), value))
            }
            // IpRange::parse rejects mixed families.
            _ => unreachable!("mixed-family range"),
        }
    }

    /// Sort for binary-search lookup. Called once at end of build.
    pub fn freeze(&mut self) {
        self.v4.sort_by_key(|(lo, _, _)| *lo);
        self.v6.sort_by_key(|(lo, _, _)| *lo);
        self.frozen = true;
    }

    /// Payload of the range containing `addr`, if any.
    pub fn lookup(&self, addr: IpAddr) -> Option<&T> {
        match addr {
            IpAddr::V4(ip) => lookup_in(&self.v4, u32::from(ip)),
            IpAddr::V6(ip) => lookup_in(&self.v6, u128::from(ip)),
        }
    }
}

fn lookup_in<K: Ord + Copy, T>(ranges: &[(K, K, T)], key: K) -> Option<&T> {
    let idx = ranges.partition_point(|(lo, _, _)| *lo <= key);
    if idx == 0 {
        return None;
    }
    let (_, hi, value) = &ranges[idx - 1];
    (key <= *hi).then_some(value)
}
