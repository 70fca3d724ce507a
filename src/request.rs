//! Read-only request attribute view consumed by the matching engine.
//!
//! # Responsibilities
//! - Carry the request attributes routing cares about (host, URL,
//!   addresses, ports, scheme, method, start time, tag, origin flag)
//! - Derive URL-dependent attributes (scheme, destination port, path)
//!   once at construction instead of per predicate
//!
//! # Design Decisions
//! - Plain owned struct, built once per request via the builder methods
//! - The engine never mutates it; no synchronization needed
//! - An API-pinned upstream rides along as an override the selection
//!   engine honors before any table lookup

use std::net::IpAddr;

use chrono::{DateTime, Local};
use url::Url;

/// Attributes of one inbound request, as seen by the routing core.
#[derive(Debug, Clone)]
pub struct RequestAttributes {
    /// Destination host (origin server name).
    pub host: String,
    /// Full request URL, when one is available.
    pub url: Option<Url>,
    /// Client (source) address.
    pub client_ip: Option<IpAddr>,
    /// Destination address, when already resolved.
    pub dest_ip: Option<IpAddr>,
    /// Port the request arrived on.
    pub incoming_port: u16,
    /// HTTP method token, uppercased.
    pub method: Option<String>,
    /// Request start time; time-of-day predicates compare against this.
    pub start: DateTime<Local>,
    /// Opaque routing tag supplied by the pipeline or a plugin.
    pub tag: Option<String>,
    /// True when the request originates inside the proxy itself.
    pub internal: bool,
    /// Upstream pinned through the plugin API; bypasses the table.
    pub api_upstream: Option<(String, u16)>,
}

impl RequestAttributes {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            url: None,
            client_ip: None,
            dest_ip: None,
            incoming_port: 80,
            method: None,
            start: Local::now(),
            tag: None,
            internal: false,
            api_upstream: None,
        }
    }

    /// Attach the full request URL. Unparseable URLs are ignored; the
    /// host attribute is authoritative for host matching either way.
    pub fn with_url(mut self, url: &str) -> Self {
        match Url::parse(url) {
            Ok(u) => self.url = Some(u),
            Err(e) => tracing::debug!(url, error = %e, "ignoring unparseable request url"),
        }
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_dest_ip(mut self, ip: IpAddr) -> Self {
        self.dest_ip = Some(ip);
        self
    }

    pub fn with_incoming_port(mut self, port: u16) -> Self {
        self.incoming_port = port;
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_ascii_uppercase());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_api_upstream(mut self, host: impl Into<String>, port: u16) -> Self {
        self.api_upstream = Some((host.into(), port));
        self
    }

    /// Full URL text, used by the exact-URL and URL-regex indices.
    pub fn url_str(&self) -> Option<&str> {
        self.url.as_ref().map(Url::as_str)
    }

    /// Scheme token from the URL ("http", "https", ...).
    pub fn scheme(&self) -> Option<&str> {
        self.url.as_ref().map(Url::scheme)
    }

    /// Destination port: explicit URL port or the scheme default.
    pub fn dest_port(&self) -> Option<u16> {
        self.url.as_ref().and_then(Url::port_or_known_default)
    }

    /// URL path, for prefix and suffix predicates.
    pub fn path(&self) -> Option<&str> {
        self.url.as_ref().map(Url::path)
    }
}
