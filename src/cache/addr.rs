//! Address objects and per-host address lists.

use super::HostCache;
use crate::base::dnserror::DnsError;
use crate::cache::host::HostId;
use crate::dns::config::CacheConfig;
use crate::dns::transport::Transport;
use crate::mem::{BlockId, Pool, PoolStats};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const IPV4_ADDR_LEN: usize = 4;
pub const IPV6_ADDR_LEN: usize = 16;

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
}

impl AddrFamily {
    pub fn addr_len(&self) -> usize {
        match self {
            AddrFamily::Ipv4 => IPV4_ADDR_LEN,
            AddrFamily::Ipv6 => IPV6_ADDR_LEN,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            IPV4_ADDR_LEN => Some(AddrFamily::Ipv4),
            IPV6_ADDR_LEN => Some(AddrFamily::Ipv6),
            _ => None,
        }
    }

    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddrFamily::Ipv4,
            IpAddr::V6(_) => AddrFamily::Ipv6,
        }
    }
}

/// Which families a lookup wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyFilter {
    #[default]
    Any,
    Ipv4Only,
    Ipv6Only,
}

impl FamilyFilter {
    pub fn accepts(&self, family: AddrFamily) -> bool {
        match self {
            FamilyFilter::Any => true,
            FamilyFilter::Ipv4Only => family == AddrFamily::Ipv4,
            FamilyFilter::Ipv6Only => family == AddrFamily::Ipv6,
        }
    }
}

/// A resolved address, stored by value.
///
/// The length tag tells the families apart: 4 for IPv4, 16 for IPv6 and 0
/// for an object that has not been set yet.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct AddrObj {
    bytes: [u8; IPV6_ADDR_LEN],
    len: u8,
}

impl AddrObj {
    /// An object with no address in it.
    pub const fn unset() -> Self {
        Self { bytes: [0; IPV6_ADDR_LEN], len: 0 }
    }

    /// Build from raw network-order bytes; only 4 and 16 bytes are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DnsError> {
        if AddrFamily::from_len(bytes.len()).is_none() {
            return Err(DnsError::AddrInvalid);
        }
        let mut addr = Self::unset();
        addr.bytes[..bytes.len()].copy_from_slice(bytes);
        addr.len = bytes.len() as u8;
        Ok(addr)
    }

    /// Parse a literal such as `"192.0.2.1"` or `"2001:db8::1"`.
    pub fn parse(s: &str) -> Result<Self, DnsError> {
        s.trim().parse::<IpAddr>().map(Self::from).map_err(|_| DnsError::AddrInvalid)
    }

    pub fn set_ip(&mut self, ip: IpAddr) {
        *self = Self::from(ip);
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_unset(&self) -> bool {
        self.len == 0
    }

    pub fn family(&self) -> Option<AddrFamily> {
        AddrFamily::from_len(self.len())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len().min(IPV6_ADDR_LEN)]
    }

    pub fn to_ip(&self) -> Option<IpAddr> {
        match self.family()? {
            AddrFamily::Ipv4 => {
                let mut octets = [0u8; IPV4_ADDR_LEN];
                octets.copy_from_slice(&self.bytes[..IPV4_ADDR_LEN]);
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            AddrFamily::Ipv6 => Some(IpAddr::V6(Ipv6Addr::from(self.bytes))),
        }
    }
}

impl From<IpAddr> for AddrObj {
    fn from(ip: IpAddr) -> Self {
        let mut addr = Self::unset();
        match ip {
            IpAddr::V4(v4) => {
                addr.bytes[..IPV4_ADDR_LEN].copy_from_slice(&v4.octets());
                addr.len = IPV4_ADDR_LEN as u8;
            }
            IpAddr::V6(v6) => {
                addr.bytes = v6.octets();
                addr.len = IPV6_ADDR_LEN as u8;
            }
        }
        addr
    }
}

impl From<Ipv4Addr> for AddrObj {
    fn from(ip: Ipv4Addr) -> Self {
        Self::from(IpAddr::V4(ip))
    }
}

impl From<Ipv6Addr> for AddrObj {
    fn from(ip: Ipv6Addr) -> Self {
        Self::from(IpAddr::V6(ip))
    }
}

impl fmt::Debug for AddrObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_ip() {
            Some(ip) => write!(f, "AddrObj({})", ip),
            None => write!(f, "AddrObj(<len {}>)", self.len),
        }
    }
}

impl fmt::Display for AddrObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_ip() {
            Some(ip) => fmt::Display::fmt(&ip, f),
            None => f.write_str("<unset>"),
        }
    }
}

/// Owning handle to a pooled [`AddrObj`].
///
/// Not `Clone`: the handle is the ownership. It goes back to the pool
/// through [`HostCache::release_address`] or moves into a host through
/// [`HostCache::insert_address`].
#[derive(Debug, PartialEq, Eq)]
pub struct AddrId(pub(crate) BlockId);

/// List node linking one address into a host.
#[derive(Debug, Default)]
pub(crate) struct AddrItem {
    addr: Option<BlockId>,
    next: Option<BlockId>,
}

/// Per-family address counters of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrCounts {
    pub total: usize,
    pub ipv4: usize,
    pub ipv6: usize,
}

/// Head/tail of a host's address list plus its counters.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AddrList {
    head: Option<BlockId>,
    tail: Option<BlockId>,
    pub(crate) counts: AddrCounts,
}

impl AddrList {
    fn count_for(&self, family: AddrFamily) -> usize {
        match family {
            AddrFamily::Ipv4 => self.counts.ipv4,
            AddrFamily::Ipv6 => self.counts.ipv6,
        }
    }
}

/// The two address pools: list nodes and the address objects they own.
#[derive(Debug)]
pub(crate) struct AddrPools {
    items: Pool<AddrItem>,
    objs: Pool<AddrObj>,
}

impl AddrPools {
    pub(crate) fn new(config: &CacheConfig) -> Self {
        let items = config.cache_entries_max * config.addr_max_per_host();
        Self {
            items: Pool::new("addr items", items, AddrItem::default),
            // One spare object so a caller can stage an address while every host is full.
            objs: Pool::new("addr objects", items + 1, AddrObj::unset),
        }
    }

    pub(crate) fn acquire(&mut self) -> Result<AddrId, DnsError> {
        let id = self.objs.get()?;
        if let Some(obj) = self.objs.block_mut(id) {
            *obj = AddrObj::unset();
        }
        Ok(AddrId(id))
    }

    pub(crate) fn release(&mut self, addr: AddrId) {
        let _ = self.objs.free(addr.0);
    }

    pub(crate) fn obj(&self, addr: &AddrId) -> Option<&AddrObj> {
        self.objs.block(addr.0)
    }

    pub(crate) fn obj_mut(&mut self, addr: &AddrId) -> Option<&mut AddrObj> {
        self.objs.block_mut(addr.0)
    }

    /// Append `addr` to `list`, taking ownership of it.
    ///
    /// On any failure the object goes back to its pool.
    pub(crate) fn insert(
        &mut self,
        config: &CacheConfig,
        list: &mut AddrList,
        addr: AddrId,
    ) -> Result<(), DnsError> {
        let Some(family) = self.obj(&addr).and_then(AddrObj::family) else {
            self.release(addr);
            return Err(DnsError::Fault);
        };
        if list.count_for(family) >= config.addr_max(family) {
            self.release(addr);
            return Err(DnsError::MemAlloc);
        }
        let item_id = match self.items.get() {
            Ok(id) => id,
            Err(e) => {
                self.release(addr);
                return Err(e);
            }
        };
        if let Some(item) = self.items.block_mut(item_id) {
            item.addr = Some(addr.0);
            item.next = None;
        }

        match list.tail.and_then(|tail| self.items.block_mut(tail)) {
            Some(tail) => tail.next = Some(item_id),
            None => list.head = Some(item_id),
        }
        list.tail = Some(item_id);

        match family {
            AddrFamily::Ipv4 => list.counts.ipv4 += 1,
            AddrFamily::Ipv6 => list.counts.ipv6 += 1,
        }
        list.counts.total += 1;
        Ok(())
    }

    /// Free every node and address of `list` and leave it empty.
    pub(crate) fn clear(&mut self, list: &mut AddrList) {
        let mut cursor = list.head;
        while let Some(item_id) = cursor {
            cursor = match self.items.block_mut(item_id) {
                Some(item) => {
                    if let Some(obj) = item.addr.take() {
                        let _ = self.objs.free(obj);
                    }
                    item.next.take()
                }
                None => None,
            };
            let _ = self.items.free(item_id);
        }
        *list = AddrList::default();
    }

    pub(crate) fn iter<'a>(&'a self, list: &AddrList) -> impl Iterator<Item = &'a AddrObj> + 'a {
        let mut cursor = list.head;
        std::iter::from_fn(move || {
            let item = self.items.block(cursor?)?;
            cursor = item.next;
            item.addr.and_then(|obj| self.objs.block(obj))
        })
    }

    pub(crate) fn contains(&self, list: &AddrList, ip: IpAddr) -> bool {
        self.iter(list).any(|addr| addr.to_ip() == Some(ip))
    }

    pub(crate) fn stats(&self) -> [PoolStats; 2] {
        [self.items.stats(), self.objs.stats()]
    }

    pub(crate) fn footprint(&self) -> usize {
        self.items.footprint() + self.objs.footprint()
    }
}

impl<T: Transport> HostCache<T> {
    /// Take an unset address object from the pool.
    pub fn acquire_address(&mut self) -> Result<AddrId, DnsError> {
        self.addrs.acquire()
    }

    /// Give an address object back without inserting it.
    pub fn release_address(&mut self, addr: AddrId) {
        self.addrs.release(addr);
    }

    /// Read the value of an address object.
    pub fn address(&self, addr: &AddrId) -> Option<AddrObj> {
        self.addrs.obj(addr).copied()
    }

    pub fn set_address(&mut self, addr: &AddrId, ip: IpAddr) -> Result<(), DnsError> {
        let obj = self.addrs.obj_mut(addr).ok_or(DnsError::Fault)?;
        obj.set_ip(ip);
        Ok(())
    }

    /// Fill an address object from a literal; `AddrInvalid` leaves it untouched.
    pub fn set_address_from_str(&mut self, addr: &AddrId, s: &str) -> Result<(), DnsError> {
        let parsed = AddrObj::parse(s)?;
        let obj = self.addrs.obj_mut(addr).ok_or(DnsError::Fault)?;
        *obj = parsed;
        Ok(())
    }

    /// Fill an address object from raw bytes (4 or 16 of them).
    pub fn set_address_bytes(&mut self, addr: &AddrId, bytes: &[u8]) -> Result<(), DnsError> {
        let parsed = AddrObj::from_bytes(bytes)?;
        let obj = self.addrs.obj_mut(addr).ok_or(DnsError::Fault)?;
        *obj = parsed;
        Ok(())
    }

    /// Append an address to a host.
    ///
    /// Fails with `MemAlloc` once the family quota is reached and with
    /// `Fault` for an object that holds no address. Whatever the outcome the
    /// handle is consumed: on failure the object returns to its pool.
    pub fn insert_address(&mut self, host: HostId, addr: AddrId) -> Result<(), DnsError> {
        let Some(record) = self.hosts.block_mut(host.0) else {
            self.addrs.release(addr);
            return Err(DnsError::CacheHostNotFound);
        };
        self.addrs.insert(&self.config, &mut record.addrs, addr)
    }

    pub fn host_addr_counts(&self, host: HostId) -> Option<AddrCounts> {
        self.hosts.block(host.0).map(|record| record.addrs.counts)
    }
}
