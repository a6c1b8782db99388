//! Lookup API on top of the host cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use lwdns::dns::{CacheConfig, DnsClient, LookupFlags, UdpTransport};
//! use lwdns::cache::AddrObj;
//!
//! let client = DnsClient::new(CacheConfig::default(), UdpTransport::new())?;
//! client.set_server_str("9.9.9.9")?;
//! let _driver = client.spawn_driver();
//!
//! let mut addrs = [AddrObj::unset(); 4];
//! let lookup = client.get_host("example.com", LookupFlags::NONE, None, &mut addrs).await?;
//! for addr in &addrs[..lookup.count] {
//!     println!("{}", addr);
//! }
//! ```

use crate::base::dnserror::DnsError;
use crate::base::status::Lookup;
use crate::cache::{AddrObj, HostCache, HostId, HostState, SharedCache};
use crate::dns::config::{CacheConfig, RequestConfig};
use crate::dns::flags::LookupFlags;
use crate::dns::transport::Transport;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// DNS client: a shared host cache plus the lookup policy.
pub struct DnsClient<T: Transport> {
    cache: SharedCache<T>,
    config: CacheConfig,
}

impl<T: Transport> Clone for DnsClient<T> {
    fn clone(&self) -> Self {
        Self { cache: self.cache.clone(), config: self.config.clone() }
    }
}

impl<T: Transport + 'static> DnsClient<T> {
    /// Create a client; fails like [`HostCache::new`].
    pub fn new(config: CacheConfig, transport: T) -> Result<Self, DnsError> {
        let cache = SharedCache::new(config.clone(), transport)?;
        Ok(Self { cache, config })
    }

    /// The underlying cache.
    pub fn cache(&self) -> &SharedCache<T> {
        &self.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolve `name` into `out`.
    ///
    /// Address literals are answered directly unless
    /// [`LookupFlags::FORCE_RESOLUTION`] is set. A cached answer is returned
    /// without I/O. Otherwise a host is queued and, unless
    /// [`LookupFlags::NO_BLOCK`] is set, driven until it resolves or
    /// `block_timeout` expires. A lookup still running when the call
    /// returns reports [`Status::Pending`](crate::base::status::Status::Pending).
    pub async fn get_host(
        &self,
        name: &str,
        flags: LookupFlags,
        req_cfg: Option<RequestConfig>,
        out: &mut [AddrObj],
    ) -> Result<Lookup, DnsError> {
        flags.validate()?;
        if out.is_empty() || name.is_empty() {
            return Err(DnsError::Fault);
        }

        if !flags.contains(LookupFlags::FORCE_RESOLUTION) {
            if let Ok(ip) = name.trim().parse::<IpAddr>() {
                out[0] = AddrObj::from(ip);
                return Ok(Lookup::resolved(1));
            }
        }

        let filter = flags.filter();
        if flags.contains(LookupFlags::FORCE_CACHE) {
            return match self.cache.search(name, filter, out) {
                Ok(count) => Ok(Lookup::resolved(count)),
                Err(DnsError::CacheHostPending) => Ok(Lookup::pending()),
                Err(err) => Err(err),
            };
        }

        let (host, signal) = {
            let mut cache = self.cache.lock()?;
            if flags.contains(LookupFlags::FORCE_RENEW) {
                match cache.search_and_remove_host(name) {
                    Ok(()) | Err(DnsError::CacheHostNotFound) => {}
                    Err(DnsError::CacheHostPending) => return Ok(Lookup::pending()),
                    Err(err) => return Err(err),
                }
            } else {
                match cache.search(name, filter, out) {
                    Ok(count) => return Ok(Lookup::resolved(count)),
                    Err(DnsError::CacheHostPending) => return Ok(Lookup::pending()),
                    Err(DnsError::CacheHostNotFound) => drop_failed(&mut cache, name),
                    Err(err) => return Err(err),
                }
            }

            let host = cache.acquire_host(name, flags, req_cfg)?;
            if let Err(err) = cache.insert_host(host) {
                let _ = cache.release_host(host);
                return Err(err);
            }
            tracing::debug!(host = name, "lookup queued");
            (host, cache.host_signal(host))
        };

        if flags.contains(LookupFlags::NO_BLOCK) {
            return Ok(Lookup::pending());
        }
        self.wait_for(name, host, signal, flags, out).await
    }

    /// Drive `host` until it is done or the block timeout expires.
    async fn wait_for(
        &self,
        name: &str,
        host: HostId,
        signal: Option<Arc<Notify>>,
        flags: LookupFlags,
        out: &mut [AddrObj],
    ) -> Result<Lookup, DnsError> {
        let deadline = Instant::now() + self.config.block_timeout;
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);

        loop {
            {
                let mut cache = self.cache.lock()?;
                // Outcome is read back from the host state below.
                let _ = cache.resolve_host(host);
                match cache.host_state(host) {
                    Some(HostState::Resolved) => {
                        let count = cache.host_addresses(host, flags.filter(), out);
                        return Ok(Lookup::resolved(count));
                    }
                    Some(HostState::Failed) => {
                        let err = cache.host_error(host).unwrap_or(DnsError::NoServer);
                        let _ = cache.release_host(host);
                        return Err(err);
                    }
                    Some(_) => {}
                    None => return Err(DnsError::CacheHostNotFound),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(host = name, "lookup still pending at block timeout");
                return Ok(Lookup::pending());
            }
            let wait = period.min(deadline - now);
            match &signal {
                Some(signal) => {
                    let _ = tokio::time::timeout(wait, signal.notified()).await;
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Drop every finished host. Returns how many were released.
    pub fn clear_cache(&self) -> Result<usize, DnsError> {
        self.cache.clear()
    }

    /// Drop the host cached under `name`.
    pub fn clear_host(&self, name: &str) -> Result<(), DnsError> {
        self.cache.search_and_remove_host(name)
    }

    /// Set the default server of the transport.
    pub fn set_server(&self, server: IpAddr) -> Result<(), DnsError> {
        self.cache.with(|cache| cache.transport_mut().set_server(server))?
    }

    /// Set the default server from a literal address.
    pub fn set_server_str(&self, server: &str) -> Result<(), DnsError> {
        let server = server.trim().parse::<IpAddr>().map_err(|_| DnsError::AddrInvalid)?;
        self.set_server(server)
    }

    pub fn server(&self) -> Result<Option<IpAddr>, DnsError> {
        self.cache.with(|cache| cache.transport().server())
    }

    /// Default server formatted as a string.
    pub fn server_string(&self) -> Result<Option<String>, DnsError> {
        Ok(self.server()?.map(|server| server.to_string()))
    }

    /// One resolution pass over every pending host.
    pub fn resolve_pending(&self) -> Result<usize, DnsError> {
        self.cache.resolve_all()
    }

    /// Spawn a task that runs [`resolve_pending`](Self::resolve_pending)
    /// every `poll_interval`.
    ///
    /// The task stops when the cache lock is poisoned; abort the handle to
    /// stop it earlier.
    pub fn spawn_driver(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = cache.resolve_all() {
                    tracing::warn!(error = %err, "resolver driver stopped");
                    break;
                }
            }
        })
    }
}

/// Remove a failed entry for `name` so a new lookup can take its place.
fn drop_failed<T: Transport>(cache: &mut HostCache<T>, name: &str) {
    if let Some(stale) = cache.search_by_name(name) {
        let _ = cache.remove_host(stale);
    }
}

impl<T: Transport> std::fmt::Debug for DnsClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsClient").field("cache", &self.cache).finish()
    }
}
