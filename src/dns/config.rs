//! Resolver configuration.
//!
//! [`CacheConfig`] sizes the pools and drives retry behaviour for every
//! lookup. [`RequestConfig`] overrides the server and retry settings of a
//! single lookup.

use crate::base::dnserror::DnsError;
use crate::cache::addr::AddrFamily;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(DnsError),
}

/// Address families the resolver queries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Families {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl Families {
    pub const BOTH: Families = Families { ipv4: true, ipv6: true };
    pub const IPV4: Families = Families { ipv4: true, ipv6: false };
    pub const IPV6: Families = Families { ipv4: false, ipv6: true };

    pub fn contains(&self, family: AddrFamily) -> bool {
        match family {
            AddrFamily::Ipv4 => self.ipv4,
            AddrFamily::Ipv6 => self.ipv6,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.ipv4 && !self.ipv6
    }
}

impl Default for Families {
    fn default() -> Self {
        Self::BOTH
    }
}

/// What to do when the IPv6 query of a host comes back without answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ipv6Fallback {
    /// Drop what was collected and start over from interface selection,
    /// at most `interface_retry_max` times.
    RetryInterface,
    /// Resolve with whatever the host already holds (the IPv4 answers).
    #[default]
    AcceptPartial,
    /// Fail the host.
    Fail,
}

/// Cache and resolution configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached hosts
    pub cache_entries_max: usize,
    /// Host names longer than this are truncated
    pub host_name_len_max: usize,
    /// IPv4 addresses kept per host
    pub addr_ipv4_max_per_host: usize,
    /// IPv6 addresses kept per host
    pub addr_ipv6_max_per_host: usize,
    /// Enabled address families
    pub families: Families,
    /// Transmit attempts per family before giving up
    pub req_retry_max: u8,
    /// Time to wait for a response before retransmitting
    #[serde(with = "duration_ms")]
    pub req_retry_timeout: Duration,
    /// Policy for an IPv6 query without answers
    pub ipv6_fallback: Ipv6Fallback,
    /// Interface retries allowed by [`Ipv6Fallback::RetryInterface`]
    pub interface_retry_max: u8,
    /// Upper bound on the bytes reserved by the pools
    pub mem_budget: Option<usize>,
    /// Period of the background driver
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// How long a blocking lookup waits for its host
    #[serde(with = "duration_ms")]
    pub block_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_entries_max: 16,
            host_name_len_max: 255,
            addr_ipv4_max_per_host: 2,
            addr_ipv6_max_per_host: 2,
            families: Families::BOTH,
            req_retry_max: 3,
            req_retry_timeout: Duration::from_millis(1000),
            ipv6_fallback: Ipv6Fallback::AcceptPartial,
            interface_retry_max: 1,
            mem_budget: None,
            poll_interval: Duration::from_millis(50),
            block_timeout: Duration::from_millis(5000),
        }
    }
}

impl CacheConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject configurations the cache cannot run with.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.cache_entries_max == 0 || self.host_name_len_max == 0 {
            tracing::warn!(
                entries = self.cache_entries_max,
                name_len = self.host_name_len_max,
                "cache configured without capacity"
            );
            return Err(DnsError::Fault);
        }
        if self.families.is_empty() {
            tracing::warn!("no address family enabled");
            return Err(DnsError::Fault);
        }
        Ok(())
    }

    /// Per-host quota for `family`; zero when the family is disabled.
    pub fn addr_max(&self, family: AddrFamily) -> usize {
        if !self.families.contains(family) {
            return 0;
        }
        match family {
            AddrFamily::Ipv4 => self.addr_ipv4_max_per_host,
            AddrFamily::Ipv6 => self.addr_ipv6_max_per_host,
        }
    }

    /// Address slots a single host may hold across enabled families.
    pub fn addr_max_per_host(&self) -> usize {
        self.addr_max(AddrFamily::Ipv4) + self.addr_max(AddrFamily::Ipv6)
    }

    /// Set the maximum number of cached hosts.
    pub fn cache_entries_max(mut self, max: usize) -> Self {
        self.cache_entries_max = max;
        self
    }

    /// Set the maximum stored host name length.
    pub fn host_name_len_max(mut self, max: usize) -> Self {
        self.host_name_len_max = max;
        self
    }

    /// Set the per-host IPv4 quota.
    pub fn addr_ipv4_max_per_host(mut self, max: usize) -> Self {
        self.addr_ipv4_max_per_host = max;
        self
    }

    /// Set the per-host IPv6 quota.
    pub fn addr_ipv6_max_per_host(mut self, max: usize) -> Self {
        self.addr_ipv6_max_per_host = max;
        self
    }

    /// Set the enabled families.
    pub fn families(mut self, families: Families) -> Self {
        self.families = families;
        self
    }

    /// Set the number of transmit attempts per family.
    pub fn req_retry_max(mut self, max: u8) -> Self {
        self.req_retry_max = max;
        self
    }

    /// Set the retransmit timeout.
    pub fn req_retry_timeout(mut self, timeout: Duration) -> Self {
        self.req_retry_timeout = timeout;
        self
    }

    /// Set the IPv6 fallback policy.
    pub fn ipv6_fallback(mut self, policy: Ipv6Fallback) -> Self {
        self.ipv6_fallback = policy;
        self
    }

    /// Set the number of interface retries.
    pub fn interface_retry_max(mut self, max: u8) -> Self {
        self.interface_retry_max = max;
        self
    }

    /// Cap the memory reserved by the pools.
    pub fn mem_budget(mut self, bytes: usize) -> Self {
        self.mem_budget = Some(bytes);
        self
    }

    /// Set the driver period.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long blocking lookups wait.
    pub fn block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }
}

/// Per-lookup overrides. Unset fields fall back to [`CacheConfig`] and
/// the transport's default server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestConfig {
    pub server: Option<IpAddr>,
    pub port: Option<u16>,
    pub retry_max: Option<u8>,
    pub retry_timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query `server` instead of the default server.
    pub fn server(mut self, server: IpAddr) -> Self {
        self.server = Some(server);
        self
    }

    /// Query the server given as a literal address.
    pub fn with_server_str(self, server: &str) -> Result<Self, DnsError> {
        let addr = server.trim().parse::<IpAddr>().map_err(|_| DnsError::AddrInvalid)?;
        Ok(self.server(addr))
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn retry_max(mut self, max: u8) -> Self {
        self.retry_max = Some(max);
        self
    }

    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = Some(timeout);
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
