//! # lwdns
//!
//! A small-footprint DNS client cache.
//!
//! Host records, names and addresses live in fixed-capacity pools sized at
//! startup. Each lookup is a host record walked through a non-blocking
//! state machine (open, select interface, query IPv4, query IPv6) by a
//! driver task or by the caller itself.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lwdns::cache::AddrObj;
//! use lwdns::dns::{CacheConfig, DnsClient, LookupFlags, UdpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lwdns::base::dnserror::DnsError> {
//!     let client = DnsClient::new(CacheConfig::default(), UdpTransport::new())?;
//!     client.set_server_str("1.1.1.1")?;
//!     let _driver = client.spawn_driver();
//!
//!     let mut addrs = [AddrObj::unset(); 4];
//!     let lookup = client.get_host("example.com", LookupFlags::NONE, None, &mut addrs).await?;
//!     println!("{:?}", &addrs[..lookup.count]);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes, status types and IO error mapping
//! - [`mem`] - Fixed-capacity block pools
//! - [`cache`] - Host cache, address lists and the resolution state machine
//! - [`dns`] - Configuration, lookup flags, transports and the client

pub mod base;
pub mod cache;
pub mod dns;
pub mod mem;
