//! Transport abstraction used by the resolution state machine.
//!
//! The cache never touches sockets or the DNS wire format itself. Each
//! resolution step calls into a [`Transport`], which must return promptly:
//! the call is made with the cache lock held.

use crate::base::dnserror::DnsError;
use crate::cache::addr::{AddrFamily, AddrList, AddrPools};
use crate::cache::host::IfId;
use crate::dns::config::CacheConfig;
use std::net::IpAddr;

/// DNS message identifier.
pub type QueryId = u16;

/// Opaque handle to a transport context (a socket, usually).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u32);

/// What a received response carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Answers for the queried family were found.
    Resolved,
    /// A valid response without usable answers.
    Empty,
}

/// Trait for query I/O.
///
/// # Design Notes
///
/// - Every method is non-blocking. `receive_response` returns
///   `Err(DnsError::Rx)` when nothing has arrived yet.
/// - `transmit_query` returns `Err(DnsError::IfLinkDown)` when the
///   interface went away; the state machine then selects a new one.
///   Other transient errors are retried up to the retry budget; any
///   non-transient error fails the host.
/// - Decoded addresses are pushed into [`Answers`], which applies the
///   per-host quotas.
pub trait Transport: Send {
    /// Open a context for one lookup, optionally against a specific server.
    fn open(&mut self, server: Option<IpAddr>, port: Option<u16>)
        -> Result<TransportHandle, DnsError>;

    /// Release a context opened by [`open`](Transport::open).
    fn close(&mut self, handle: TransportHandle);

    /// Pick (or validate) the interface to query through.
    fn select_interface(&mut self, current: IfId, handle: TransportHandle)
        -> Result<IfId, DnsError>;

    /// Send a query for `family`; returns the id used.
    fn transmit_query(
        &mut self,
        name: &str,
        handle: TransportHandle,
        query_id: Option<QueryId>,
        family: AddrFamily,
    ) -> Result<QueryId, DnsError>;

    /// Poll for the response to `query_id`.
    fn receive_response(
        &mut self,
        handle: TransportHandle,
        query_id: QueryId,
        answers: &mut Answers<'_>,
    ) -> Result<ResponseStatus, DnsError>;

    /// Reject a host name this transport can never put on the wire.
    ///
    /// Called before a host is queued; the default accepts every name.
    fn check_name(&self, name: &str) -> Result<(), DnsError> {
        let _ = name;
        Ok(())
    }

    /// Set the default server.
    fn set_server(&mut self, server: IpAddr) -> Result<(), DnsError> {
        let _ = server;
        Err(DnsError::Fault)
    }

    /// The default server, if one is configured.
    fn server(&self) -> Option<IpAddr> {
        None
    }
}

/// Blanket implementation for boxed transports.
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, server: Option<IpAddr>, port: Option<u16>) -> Result<TransportHandle, DnsError> {
        (**self).open(server, port)
    }

    fn close(&mut self, handle: TransportHandle) {
        (**self).close(handle)
    }

    fn select_interface(&mut self, current: IfId, handle: TransportHandle) -> Result<IfId, DnsError> {
        (**self).select_interface(current, handle)
    }

    fn transmit_query(
        &mut self,
        name: &str,
        handle: TransportHandle,
        query_id: Option<QueryId>,
        family: AddrFamily,
    ) -> Result<QueryId, DnsError> {
        (**self).transmit_query(name, handle, query_id, family)
    }

    fn receive_response(
        &mut self,
        handle: TransportHandle,
        query_id: QueryId,
        answers: &mut Answers<'_>,
    ) -> Result<ResponseStatus, DnsError> {
        (**self).receive_response(handle, query_id, answers)
    }

    fn check_name(&self, name: &str) -> Result<(), DnsError> {
        (**self).check_name(name)
    }

    fn set_server(&mut self, server: IpAddr) -> Result<(), DnsError> {
        (**self).set_server(server)
    }

    fn server(&self) -> Option<IpAddr> {
        (**self).server()
    }
}

/// Sink for the addresses decoded from a response.
///
/// Writes straight into the host's address list, so quotas and pool limits
/// apply as answers arrive.
pub struct Answers<'a> {
    family: AddrFamily,
    config: &'a CacheConfig,
    pools: &'a mut AddrPools,
    list: &'a mut AddrList,
    accepted: usize,
    dropped: usize,
}

impl<'a> Answers<'a> {
    pub(crate) fn new(
        family: AddrFamily,
        config: &'a CacheConfig,
        pools: &'a mut AddrPools,
        list: &'a mut AddrList,
    ) -> Self {
        Self { family, config, pools, list, accepted: 0, dropped: 0 }
    }

    /// Family the outstanding query asked for.
    pub fn family(&self) -> AddrFamily {
        self.family
    }

    /// Record one answer. Duplicates are ignored; answers over quota are
    /// dropped with `MemAlloc`.
    pub fn push(&mut self, ip: IpAddr) -> Result<(), DnsError> {
        if self.pools.contains(self.list, ip) {
            return Ok(());
        }
        let result = match self.pools.acquire() {
            Ok(addr) => {
                if let Some(obj) = self.pools.obj_mut(&addr) {
                    obj.set_ip(ip);
                }
                self.pools.insert(self.config, self.list, addr)
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => self.accepted += 1,
            Err(e) => {
                self.dropped += 1;
                tracing::trace!(addr = %ip, error = %e, "answer dropped");
            }
        }
        result
    }

    /// Answers stored by this response.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Answers rejected by quota or pool limits.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_answers_apply_quota_and_dedup() {
        let config = CacheConfig::default().addr_ipv4_max_per_host(2);
        let mut pools = AddrPools::new(&config);
        let mut list = AddrList::default();
        let mut answers = Answers::new(AddrFamily::Ipv4, &config, &mut pools, &mut list);

        assert_eq!(answers.family(), AddrFamily::Ipv4);
        answers.push(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        answers.push(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))).unwrap();
        answers.push(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))).unwrap();
        assert_eq!(
            answers.push(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 3))),
            Err(DnsError::MemAlloc)
        );

        assert_eq!(answers.accepted(), 2);
        assert_eq!(answers.dropped(), 1);
        assert_eq!(list.counts.total, 2);
    }

    #[test]
    fn test_answers_disabled_family_dropped() {
        let config = CacheConfig::default().families(crate::dns::config::Families::IPV4);
        let mut pools = AddrPools::new(&config);
        let mut list = AddrList::default();
        let mut answers = Answers::new(AddrFamily::Ipv4, &config, &mut pools, &mut list);

        assert_eq!(answers.push(IpAddr::V6(Ipv6Addr::LOCALHOST)), Err(DnsError::MemAlloc));
        assert_eq!(answers.accepted(), 0);
    }
}
