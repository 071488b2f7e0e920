//! Server configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use calfuse_providers::DEFAULT_MAX_RESULTS;

use crate::error::{ServerError, ServerResult};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind_addr: SocketAddr,

    /// How long an issued `state` stays redeemable.
    pub request_ttl: Duration,

    /// Timeout applied to every outbound provider request.
    pub http_timeout: Duration,

    /// Number of events requested per listing.
    pub default_max_results: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_ttl: Duration::from_secs(600),
            http_timeout: Duration::from_secs(30),
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builder: set the listen address.
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Builder: set the pending request lifetime.
    pub fn with_request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl = ttl;
        self
    }

    /// Builder: set the outbound HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builder: set the number of events requested per listing.
    pub fn with_default_max_results(mut self, max: usize) -> Self {
        self.default_max_results = max;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// | variable                    | default          |
    /// |-----------------------------|------------------|
    /// | `CALFUSE_BIND_ADDR`         | `127.0.0.1:8080` |
    /// | `CALFUSE_REQUEST_TTL_SECS`  | `600`            |
    /// | `CALFUSE_HTTP_TIMEOUT_SECS` | `30`             |
    /// | `CALFUSE_MAX_RESULTS`       | `10`             |
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an explicit lookup.
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("CALFUSE_BIND_ADDR") {
            Some(value) => parse_value("CALFUSE_BIND_ADDR", &value)?,
            None => defaults.bind_addr,
        };
        let request_ttl = match get("CALFUSE_REQUEST_TTL_SECS") {
            Some(value) => Duration::from_secs(positive("CALFUSE_REQUEST_TTL_SECS", &value)?),
            None => defaults.request_ttl,
        };
        let http_timeout = match get("CALFUSE_HTTP_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(positive("CALFUSE_HTTP_TIMEOUT_SECS", &value)?),
            None => defaults.http_timeout,
        };
        let default_max_results = match get("CALFUSE_MAX_RESULTS") {
            Some(value) => positive("CALFUSE_MAX_RESULTS", &value)? as usize,
            None => defaults.default_max_results,
        };

        Ok(Self {
            bind_addr,
            request_ttl,
            http_timeout,
            default_max_results,
        })
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ServerResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::config(format!("{key}: invalid value '{value}'")))
}

fn positive(key: &str, value: &str) -> ServerResult<u64> {
    match parse_value::<u64>(key, value)? {
        0 => Err(ServerError::config(format!("{key}: must be greater than zero"))),
        n => Ok(n),
    }
}
