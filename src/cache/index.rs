//! Host index and host lifecycle.

use super::HostCache;
use crate::base::dnserror::DnsError;
use crate::cache::addr::{AddrObj, FamilyFilter};
use crate::cache::host::{truncate, HostId, HostState};
use crate::dns::config::RequestConfig;
use crate::dns::flags::LookupFlags;
use crate::dns::transport::Transport;
use crate::mem::BlockId;
use std::sync::Arc;
use tokio::sync::Notify;

/// Position of a node in the index.
#[derive(Clone, Copy)]
struct Slot {
    prev: Option<BlockId>,
    item: BlockId,
    host: HostId,
}

impl<T: Transport> HostCache<T> {
    /// Walk the index from the newest entry.
    fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        let mut prev = None;
        let mut cursor = self.head;
        std::iter::from_fn(move || loop {
            let item = cursor?;
            let node = self.items.block(item)?;
            cursor = node.next;
            let slot_prev = prev;
            prev = Some(item);
            if let Some(host) = node.host {
                return Some(Slot { prev: slot_prev, item, host });
            }
        })
    }

    fn find_item(&self, host: HostId) -> Option<Slot> {
        self.slots().find(|slot| slot.host == host)
    }

    /// Detach a node from the index and free it.
    fn unlink(&mut self, prev: Option<BlockId>, item: BlockId) {
        let next = self.items.block_mut(item).and_then(|node| {
            node.host = None;
            node.next.take()
        });
        match prev.and_then(|prev| self.items.block_mut(prev)) {
            Some(node) => node.next = next,
            None => self.head = next,
        }
        let _ = self.items.free(item);
    }

    /// Release everything a host holds, keeping the host and name blocks.
    /// Returns the name block.
    fn scrub_host(&mut self, host: HostId) -> Option<BlockId> {
        let record = self.hosts.block_mut(host.0)?;
        self.addrs.clear(&mut record.addrs);
        if let Some(handle) = record.handle.take() {
            self.transport.close(handle);
        }
        record.signal = None;
        record.state = HostState::Free;
        record.name.take()
    }

    fn free_host(&mut self, host: HostId) {
        if let Some(name) = self.scrub_host(host) {
            if let Some(buf) = self.names.block_mut(name) {
                buf.clear();
            }
            let _ = self.names.free(name);
        }
        let _ = self.hosts.free(host.0);
    }

    /// Add an acquired host to the index.
    ///
    /// Inserting a host that is already indexed is a no-op.
    pub fn insert_host(&mut self, host: HostId) -> Result<(), DnsError> {
        if !self.hosts.contains(host.0) {
            return Err(DnsError::CacheHostNotFound);
        }
        if self.find_item(host).is_some() {
            return Ok(());
        }
        let item = self.items.get()?;
        if let Some(node) = self.items.block_mut(item) {
            node.host = Some(host);
            node.next = self.head;
        }
        self.head = Some(item);
        tracing::trace!(host = self.host_name(host).unwrap_or_default(), "host indexed");
        Ok(())
    }

    /// Find a host by name. The query is truncated like stored names.
    pub fn search_by_name(&self, name: &str) -> Option<HostId> {
        self.slots().map(|slot| slot.host).find(|host| {
            self.hosts
                .block(host.0)
                .and_then(|record| record.name)
                .and_then(|name_id| self.names.block(name_id))
                .is_some_and(|buf| buf.matches(name))
        })
    }

    /// Remove an indexed host and free it.
    pub fn remove_host(&mut self, host: HostId) -> Result<(), DnsError> {
        let state = self.host_state(host).ok_or(DnsError::CacheHostNotFound)?;
        if state.is_in_flight() {
            return Err(DnsError::CacheHostPending);
        }
        let slot = self.find_item(host).ok_or(DnsError::CacheHostNotFound)?;
        tracing::debug!(host = self.host_name(host).unwrap_or_default(), ?state, "host removed");
        self.unlink(slot.prev, slot.item);
        self.free_host(host);
        Ok(())
    }

    /// Remove the host cached under `name`.
    pub fn search_and_remove_host(&mut self, name: &str) -> Result<(), DnsError> {
        let host = self.search_by_name(name).ok_or(DnsError::CacheHostNotFound)?;
        self.remove_host(host)
    }

    /// Free an acquired host, indexed or not.
    pub fn release_host(&mut self, host: HostId) -> Result<(), DnsError> {
        let state = self.host_state(host).ok_or(DnsError::CacheHostNotFound)?;
        if state.is_in_flight() {
            return Err(DnsError::CacheHostPending);
        }
        if let Some(slot) = self.find_item(host) {
            self.unlink(slot.prev, slot.item);
        }
        self.free_host(host);
        Ok(())
    }

    /// Drop every host that is done or unused. Hosts still resolving stay.
    ///
    /// Returns how many hosts were released.
    pub fn clear(&mut self) -> usize {
        let mut released = 0;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(item) = cursor {
            let Some(node) = self.items.block(item) else {
                break;
            };
            cursor = node.next;
            let host = node.host;
            let reclaimable = host
                .and_then(|host| self.host_state(host))
                .map_or(true, |state| state.is_reclaimable());
            if reclaimable {
                self.unlink(prev, item);
                if let Some(host) = host {
                    self.free_host(host);
                }
                released += 1;
            } else {
                prev = Some(item);
            }
        }
        tracing::debug!(released, remaining = self.len(), "cache cleared");
        released
    }

    /// Get a host record for `name`, evicting the oldest finished host when
    /// the pools are full.
    ///
    /// The host starts in [`HostState::InitReq`] and is not indexed yet.
    /// Names the transport cannot encode are refused up front.
    pub fn acquire_host(
        &mut self,
        name: &str,
        flags: LookupFlags,
        req_cfg: Option<RequestConfig>,
    ) -> Result<HostId, DnsError> {
        if name.is_empty() {
            return Err(DnsError::Fault);
        }
        self.transport.check_name(truncate(name, self.config.host_name_len_max))?;
        let (host, name_id) = match self.fresh_blocks() {
            Some(blocks) => blocks,
            None => self.reclaim()?,
        };

        let signal = (!flags.contains(LookupFlags::NO_BLOCK)).then(|| Arc::new(Notify::new()));
        if let Some(buf) = self.names.block_mut(name_id) {
            buf.set(name);
        }
        if let Some(record) = self.hosts.block_mut(host) {
            record.reset(name_id, req_cfg, signal);
        }
        tracing::trace!(host = name, "host acquired");
        Ok(HostId(host))
    }

    fn fresh_blocks(&mut self) -> Option<(BlockId, BlockId)> {
        let host = self.hosts.get().ok()?;
        match self.names.get() {
            Ok(name) => Some((host, name)),
            Err(_) => {
                let _ = self.hosts.free(host);
                None
            }
        }
    }

    /// Evict the oldest host that is done or unused and hand back its blocks.
    ///
    /// The host block goes through the pool once so handles to the evicted
    /// host stop resolving.
    fn reclaim(&mut self) -> Result<(BlockId, BlockId), DnsError> {
        let victim = self
            .slots()
            .filter(|slot| self.host_state(slot.host).is_some_and(|state| state.is_reclaimable()))
            .last()
            .ok_or(DnsError::MemAlloc)?;

        tracing::debug!(host = self.host_name(victim.host).unwrap_or_default(), "host evicted");
        self.unlink(victim.prev, victim.item);
        let name = match self.scrub_host(victim.host) {
            Some(name) => name,
            None => self.names.get()?,
        };
        self.hosts.free(victim.host.0)?;
        let host = self.hosts.get()?;
        Ok((host, name))
    }

    /// Look up cached addresses for `name`.
    ///
    /// Copies up to `out.len()` addresses accepted by `filter` and returns
    /// how many were copied. Fails with `CacheHostPending` while the host is
    /// resolving and with `CacheHostNotFound` when it is absent or failed.
    pub fn search(
        &self,
        name: &str,
        filter: FamilyFilter,
        out: &mut [AddrObj],
    ) -> Result<usize, DnsError> {
        let host = self.search_by_name(name).ok_or(DnsError::CacheHostNotFound)?;
        match self.host_state(host) {
            Some(HostState::Resolved) => Ok(self.host_addresses(host, filter, out)),
            Some(HostState::Failed | HostState::Free) | None => Err(DnsError::CacheHostNotFound),
            Some(_) => Err(DnsError::CacheHostPending),
        }
    }
}
