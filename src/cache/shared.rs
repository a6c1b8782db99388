//! Cloneable, locked handle over a [`HostCache`].

use super::{AddrId, AddrObj, FamilyFilter, HostCache, HostId};
use crate::base::dnserror::DnsError;
use crate::base::status::Status;
use crate::dns::config::{CacheConfig, RequestConfig};
use crate::dns::flags::LookupFlags;
use crate::dns::transport::Transport;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared host cache.
///
/// Every operation takes the lock for its whole duration, including the
/// transport call of a resolution step. A poisoned lock is reported as
/// [`DnsError::CacheLock`].
pub struct SharedCache<T: Transport> {
    inner: Arc<Mutex<HostCache<T>>>,
}

impl<T: Transport> Clone for SharedCache<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Transport> SharedCache<T> {
    pub fn new(config: CacheConfig, transport: T) -> Result<Self, DnsError> {
        HostCache::new(config, transport).map(Self::from_cache)
    }

    pub fn from_cache(cache: HostCache<T>) -> Self {
        Self { inner: Arc::new(Mutex::new(cache)) }
    }

    /// Lock the cache for a sequence of operations.
    pub fn lock(&self) -> Result<MutexGuard<'_, HostCache<T>>, DnsError> {
        self.inner.lock().map_err(|_| {
            tracing::warn!("host cache lock poisoned");
            DnsError::CacheLock
        })
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut HostCache<T>) -> R) -> Result<R, DnsError> {
        let mut cache = self.lock()?;
        Ok(f(&mut cache))
    }

    pub fn clear(&self) -> Result<usize, DnsError> {
        self.with(|cache| cache.clear())
    }

    pub fn insert_host(&self, host: HostId) -> Result<(), DnsError> {
        self.lock()?.insert_host(host)
    }

    pub fn search_and_remove_host(&self, name: &str) -> Result<(), DnsError> {
        self.lock()?.search_and_remove_host(name)
    }

    pub fn remove_host(&self, host: HostId) -> Result<(), DnsError> {
        self.lock()?.remove_host(host)
    }

    pub fn search(
        &self,
        name: &str,
        filter: FamilyFilter,
        out: &mut [AddrObj],
    ) -> Result<usize, DnsError> {
        self.lock()?.search(name, filter, out)
    }

    pub fn search_by_name(&self, name: &str) -> Result<Option<HostId>, DnsError> {
        self.with(|cache| cache.search_by_name(name))
    }

    pub fn acquire_host(
        &self,
        name: &str,
        flags: LookupFlags,
        req_cfg: Option<RequestConfig>,
    ) -> Result<HostId, DnsError> {
        self.lock()?.acquire_host(name, flags, req_cfg)
    }

    pub fn release_host(&self, host: HostId) -> Result<(), DnsError> {
        self.lock()?.release_host(host)
    }

    pub fn insert_address(&self, host: HostId, addr: AddrId) -> Result<(), DnsError> {
        self.lock()?.insert_address(host, addr)
    }

    pub fn acquire_address(&self) -> Result<AddrId, DnsError> {
        self.lock()?.acquire_address()
    }

    pub fn release_address(&self, addr: AddrId) -> Result<(), DnsError> {
        self.with(|cache| cache.release_address(addr))
    }

    pub fn set_address_from_str(&self, addr: &AddrId, s: &str) -> Result<(), DnsError> {
        self.lock()?.set_address_from_str(addr, s)
    }

    pub fn resolve_host(&self, host: HostId) -> Result<Status, DnsError> {
        self.lock()?.resolve_host(host)
    }

    pub fn resolve_all(&self) -> Result<usize, DnsError> {
        self.with(|cache| cache.resolve_all())
    }
}

impl<T: Transport> std::fmt::Debug for SharedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(cache) => f.debug_tuple("SharedCache").field(&*cache).finish(),
            Err(_) => f.write_str("SharedCache(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::addr::AddrFamily;
    use crate::cache::host::IfId;
    use crate::dns::config::Families;
    use crate::dns::transport::{Answers, QueryId, ResponseStatus, TransportHandle};
    use std::net::IpAddr;

    struct Idle;

    impl Transport for Idle {
        fn open(&mut self, _: Option<IpAddr>, _: Option<u16>) -> Result<TransportHandle, DnsError> {
            Ok(TransportHandle(0))
        }

        fn close(&mut self, _: TransportHandle) {}

        fn select_interface(&mut self, current: IfId, _: TransportHandle) -> Result<IfId, DnsError> {
            Ok(current)
        }

        fn transmit_query(
            &mut self,
            _: &str,
            _: TransportHandle,
            _: Option<QueryId>,
            _: AddrFamily,
        ) -> Result<QueryId, DnsError> {
            Ok(0)
        }

        fn receive_response(
            &mut self,
            _: TransportHandle,
            _: QueryId,
            _: &mut Answers<'_>,
        ) -> Result<ResponseStatus, DnsError> {
            Err(DnsError::Rx)
        }
    }

    #[test]
    fn test_clones_share_state() {
        let cache = SharedCache::new(CacheConfig::default(), Idle).unwrap();
        let other = cache.clone();

        let host = cache.acquire_host("a.com", LookupFlags::NONE, None).unwrap();
        other.insert_host(host).unwrap();
        assert_eq!(cache.search_by_name("a.com").unwrap(), Some(host));
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let cache = SharedCache::new(CacheConfig::default(), Idle).unwrap();
        let poisoner = cache.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert_eq!(cache.clear().unwrap_err(), DnsError::CacheLock);
        assert_eq!(cache.search_by_name("a.com").unwrap_err(), DnsError::CacheLock);
    }

    /// Answers every IPv4 query with one address.
    struct Answering;

    impl Transport for Answering {
        fn open(&mut self, _: Option<IpAddr>, _: Option<u16>) -> Result<TransportHandle, DnsError> {
            Ok(TransportHandle(0))
        }

        fn close(&mut self, _: TransportHandle) {}

        fn select_interface(&mut self, current: IfId, _: TransportHandle) -> Result<IfId, DnsError> {
            Ok(current)
        }

        fn transmit_query(
            &mut self,
            _: &str,
            _: TransportHandle,
            _: Option<QueryId>,
            _: AddrFamily,
        ) -> Result<QueryId, DnsError> {
            Ok(1)
        }

        fn receive_response(
            &mut self,
            _: TransportHandle,
            _: QueryId,
            answers: &mut Answers<'_>,
        ) -> Result<ResponseStatus, DnsError> {
            answers.push(IpAddr::from([192, 0, 2, 4]))?;
            Ok(ResponseStatus::Resolved)
        }
    }

    #[test]
    fn test_step_stores_answers_under_lock() {
        let config = CacheConfig::default().families(Families::IPV4);
        let cache = SharedCache::new(config, Answering).unwrap();
        let host = cache.acquire_host("a.com", LookupFlags::NONE, None).unwrap();
        cache.insert_host(host).unwrap();

        // init, if_sel, tx
        for _ in 0..3 {
            assert_eq!(cache.resolve_host(host), Ok(Status::Pending));
        }
        // The receive step decodes into the pools and finishes in one locked call.
        assert_eq!(cache.resolve_host(host), Ok(Status::Resolved));
        let counts = cache.with(|c| c.host_addr_counts(host)).unwrap().unwrap();
        assert_eq!(counts.ipv4, 1);
    }

    #[test]
    fn test_address_roundtrip_through_lock() {
        let cache = SharedCache::new(CacheConfig::default(), Idle).unwrap();
        let host = cache.acquire_host("a.com", LookupFlags::NONE, None).unwrap();
        let addr = cache.acquire_address().unwrap();
        assert_eq!(cache.set_address_from_str(&addr, "bogus"), Err(DnsError::AddrInvalid));
        cache.set_address_from_str(&addr, "192.0.2.9").unwrap();
        cache.insert_address(host, addr).unwrap();

        let counts = cache.with(|c| c.host_addr_counts(host)).unwrap().unwrap();
        assert_eq!(counts.ipv4, 1);
    }
}
