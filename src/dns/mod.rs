//! DNS client front end.
//!
//! - [`config`]: cache sizing, retry policy and per-lookup overrides
//! - [`transport`]: the I/O seam the resolution state machine drives
//! - [`client`]: `get_host` and the background driver
//! - [`udp`]: a plain UDP transport (feature `udp`)

pub mod client;
pub mod config;
pub mod flags;
pub mod transport;
#[cfg(feature = "udp")]
pub mod udp;

pub use client::DnsClient;
pub use config::{CacheConfig, ConfigError, Families, Ipv6Fallback, RequestConfig};
pub use flags::LookupFlags;
pub use transport::{Answers, QueryId, ResponseStatus, Transport, TransportHandle};
#[cfg(feature = "udp")]
pub use udp::UdpTransport;
