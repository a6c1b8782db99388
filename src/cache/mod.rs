//! Host cache.
//!
//! [`HostCache`] owns every pool the resolver uses and the index of known
//! hosts. It is a plain value: the caller decides where it lives and how it
//! is shared. [`SharedCache`] wraps it behind a lock for use across tasks.
//!
//! # Layout
//!
//! ```text
//! index:  CacheItem -> CacheItem -> CacheItem      (newest first)
//!            |            |            |
//!          Host         Host         Host
//!            |
//!          AddrItem -> AddrItem                    (insertion order)
//!            |            |
//!          AddrObj      AddrObj
//! ```
//!
//! All nodes are blocks of fixed-capacity pools linked by [`BlockId`].

pub mod addr;
pub mod host;
mod index;
mod resolve;
pub mod shared;

pub use addr::{AddrCounts, AddrFamily, AddrId, AddrObj, FamilyFilter};
pub use host::{HostId, HostState, IfId};
pub use shared::SharedCache;

use crate::base::dnserror::DnsError;
use crate::dns::config::CacheConfig;
use crate::dns::transport::Transport;
use crate::mem::{BlockId, Pool, PoolStats};
use addr::AddrPools;
use host::{Host, NameBuf};
use std::sync::Arc;
use tokio::sync::Notify;

/// Index node linking one host into the cache.
#[derive(Debug, Default)]
struct CacheItem {
    host: Option<HostId>,
    next: Option<BlockId>,
}

/// Resolution cache: pools, index and the transport used to resolve.
pub struct HostCache<T: Transport> {
    config: CacheConfig,
    transport: T,
    items: Pool<CacheItem>,
    hosts: Pool<Host>,
    names: Pool<NameBuf>,
    addrs: AddrPools,
    head: Option<BlockId>,
}

impl<T: Transport> HostCache<T> {
    /// Build the cache and reserve every pool.
    ///
    /// Fails with `Fault` on an unusable configuration and with `MemAlloc`
    /// when the pools would not fit in `mem_budget`.
    pub fn new(config: CacheConfig, transport: T) -> Result<Self, DnsError> {
        config.validate()?;

        let entries = config.cache_entries_max;
        let name_len = config.host_name_len_max;
        let cache = Self {
            items: Pool::new("cache items", entries, CacheItem::default),
            hosts: Pool::new("hosts", entries, Host::default),
            names: Pool::new("host names", entries, || NameBuf::with_capacity(name_len)),
            addrs: AddrPools::new(&config),
            head: None,
            transport,
            config,
        };

        let footprint = cache.footprint();
        if let Some(budget) = cache.config.mem_budget {
            if footprint > budget {
                tracing::warn!(footprint, budget, "cache pools exceed memory budget");
                return Err(DnsError::MemAlloc);
            }
        }
        tracing::debug!(entries, footprint, "host cache initialized");
        Ok(cache)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Number of indexed hosts.
    pub fn len(&self) -> usize {
        self.items.in_use()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn host_state(&self, host: HostId) -> Option<HostState> {
        self.hosts.block(host.0).map(|record| record.state)
    }

    /// Stored (possibly truncated) name of a host.
    pub fn host_name(&self, host: HostId) -> Option<&str> {
        let record = self.hosts.block(host.0)?;
        self.names.block(record.name?).map(NameBuf::as_str)
    }

    /// Why a host failed.
    pub fn host_error(&self, host: HostId) -> Option<DnsError> {
        self.hosts.block(host.0).and_then(|record| record.error)
    }

    /// Wake signal posted when the host reaches a terminal state.
    pub fn host_signal(&self, host: HostId) -> Option<Arc<Notify>> {
        self.hosts.block(host.0).and_then(|record| record.signal.clone())
    }

    /// Copy the addresses of a host accepted by `filter` into `out`.
    ///
    /// Returns how many were written. The host state is not checked.
    pub fn host_addresses(&self, host: HostId, filter: FamilyFilter, out: &mut [AddrObj]) -> usize {
        let Some(record) = self.hosts.block(host.0) else {
            return 0;
        };
        let matching = self
            .addrs
            .iter(&record.addrs)
            .filter(|addr| addr.family().is_some_and(|family| filter.accepts(family)));
        let mut written = 0;
        for (slot, addr) in out.iter_mut().zip(matching) {
            *slot = *addr;
            written += 1;
        }
        written
    }

    /// Usage of every pool.
    pub fn pool_stats(&self) -> [PoolStats; 5] {
        let [addr_items, addr_objs] = self.addrs.stats();
        [self.items.stats(), self.hosts.stats(), self.names.stats(), addr_items, addr_objs]
    }

    /// Bytes reserved by the pools, name buffers included.
    pub fn footprint(&self) -> usize {
        self.items.footprint()
            + self.hosts.footprint()
            + self.names.footprint()
            + self.names.capacity() * self.config.host_name_len_max
            + self.addrs.footprint()
    }
}

impl<T: Transport> std::fmt::Debug for HostCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCache")
            .field("len", &self.len())
            .field("hosts", &self.hosts)
            .field("names", &self.names)
            .field("addrs", &self.addrs)
            .finish()
    }
}
