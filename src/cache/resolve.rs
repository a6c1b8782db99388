//! Resolution state machine.
//!
//! Each call to [`HostCache::resolve_host`] advances one host by exactly one
//! state. Steps never block: the transport reports "nothing yet" as
//! `DnsError::Rx` and the step returns `Pending`.

use super::HostCache;
use crate::base::dnserror::DnsError;
use crate::base::status::Status;
use crate::cache::addr::{AddrFamily, AddrPools};
use crate::cache::host::{Host, HostId, HostState, NameBuf};
use crate::dns::config::{CacheConfig, Ipv6Fallback};
use crate::dns::transport::{Answers, ResponseStatus, Transport};
use tokio::time::Instant;

/// What a step decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Nothing changed; poll again later.
    Stay,
    Next(HostState),
    /// Terminal: `None` resolved, `Some(err)` failed.
    Done(Option<DnsError>),
}

impl<T: Transport> HostCache<T> {
    /// Advance one host by one step.
    ///
    /// Returns `Ok(Resolved)` once the host is resolved and `Ok(Pending)`
    /// while work remains. A failed host reports the reason it failed. A
    /// host that was never set up (`Free`) is a `Fault`.
    pub fn resolve_host(&mut self, host: HostId) -> Result<Status, DnsError> {
        let state = self.host_state(host).ok_or(DnsError::CacheHostNotFound)?;
        let step = match state {
            HostState::Free => return Err(DnsError::Fault),
            HostState::Resolved => return Ok(Status::Resolved),
            HostState::Failed => return Err(self.failure(host)),
            HostState::InitReq => self.step_init(host),
            HostState::IfSel => self.step_if_sel(host),
            HostState::TxReq(family) => self.step_tx(host, family),
            HostState::RxResp(family) => self.step_rx(host, family),
        };

        match step {
            Step::Stay => Ok(Status::Pending),
            Step::Next(next) => {
                if let Some(record) = self.hosts.block_mut(host.0) {
                    tracing::trace!(from = ?state, to = ?next, "host state");
                    record.state = next;
                }
                Ok(Status::Pending)
            }
            Step::Done(None) => {
                self.finish(host, None);
                Ok(Status::Resolved)
            }
            Step::Done(Some(err)) => {
                self.finish(host, Some(err));
                Err(err)
            }
        }
    }

    /// Advance every indexed host that is still resolving by one step.
    ///
    /// Returns how many hosts reached a terminal state during this pass.
    pub fn resolve_all(&mut self) -> usize {
        let mut finished = 0;
        let mut cursor = self.head;
        while let Some(item) = cursor {
            let Some(node) = self.items.block(item) else {
                break;
            };
            cursor = node.next;
            let Some(host) = node.host else {
                continue;
            };
            let pending = self.host_state(host).is_some_and(|state| !state.is_terminal());
            if !pending {
                continue;
            }
            // Failures are recorded on the host; the pass carries on.
            let _ = self.resolve_host(host);
            if self.host_state(host).is_some_and(|state| state.is_terminal()) {
                finished += 1;
            }
        }
        if finished > 0 {
            tracing::debug!(finished, "resolve pass");
        }
        finished
    }

    fn failure(&self, host: HostId) -> DnsError {
        self.host_error(host).unwrap_or(DnsError::NoServer)
    }

    /// Enter a terminal state, close the transport and wake the waiter.
    fn finish(&mut self, host: HostId, error: Option<DnsError>) {
        let Some(record) = self.hosts.block_mut(host.0) else {
            return;
        };
        record.state = if error.is_some() { HostState::Failed } else { HostState::Resolved };
        record.error = error;
        if let Some(handle) = record.handle.take() {
            self.transport.close(handle);
        }
        if let Some(signal) = &record.signal {
            signal.notify_one();
        }

        let name = record.name.and_then(|id| self.names.block(id)).map_or("", NameBuf::as_str);
        match error {
            Some(err) => tracing::warn!(host = name, error = %err, "resolution failed"),
            None => {
                tracing::debug!(host = name, addrs = record.addrs.counts.total, "host resolved")
            }
        }
    }

    fn step_init(&mut self, host: HostId) -> Step {
        let Some(record) = self.hosts.block_mut(host.0) else {
            return Step::Stay;
        };
        let (server, port) = record.req_cfg.map_or((None, None), |cfg| (cfg.server, cfg.port));
        match self.transport.open(server, port) {
            Ok(handle) => {
                record.handle = Some(handle);
                record.req_counter = 0;
                Step::Next(HostState::IfSel)
            }
            Err(err) => {
                tracing::debug!(error = %err, "transport open failed");
                Step::Done(Some(err))
            }
        }
    }

    fn step_if_sel(&mut self, host: HostId) -> Step {
        let Some(record) = self.hosts.block_mut(host.0) else {
            return Step::Stay;
        };
        let Some(handle) = record.handle else {
            return Step::Done(Some(DnsError::Fault));
        };
        match self.transport.select_interface(record.interface, handle) {
            Ok(interface) => {
                record.interface = interface;
                let families = self.config.families;
                if families.ipv4 {
                    Step::Next(HostState::TxReq(AddrFamily::Ipv4))
                } else if families.ipv6 {
                    Step::Next(HostState::TxReq(AddrFamily::Ipv6))
                } else {
                    Step::Done(Some(DnsError::Fault))
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "interface selection failed");
                Step::Done(Some(err))
            }
        }
    }

    fn step_tx(&mut self, host: HostId, family: AddrFamily) -> Step {
        let Some(record) = self.hosts.block_mut(host.0) else {
            return Step::Stay;
        };
        let Some(handle) = record.handle else {
            return Step::Done(Some(DnsError::Fault));
        };
        let name = record.name.and_then(|id| self.names.block(id)).map_or("", NameBuf::as_str);
        // Retransmits reuse the previous id.
        let query_id = (record.req_counter > 0).then_some(record.query_id);

        match self.transport.transmit_query(name, handle, query_id, family) {
            Ok(id) => {
                record.query_id = id;
                record.last_tx = Some(Instant::now());
                record.req_counter = record.req_counter.saturating_add(1);
                record.tx_errors = 0;
                tracing::trace!(host = name, ?family, attempt = record.req_counter, "query sent");
                Step::Next(HostState::RxResp(family))
            }
            Err(DnsError::IfLinkDown) => {
                tracing::debug!(host = name, "link down, selecting interface");
                Step::Next(HostState::IfSel)
            }
            Err(err) if err.is_transient() => {
                record.tx_errors = record.tx_errors.saturating_add(1);
                if record.tx_errors >= record.retry_max(&self.config) {
                    tracing::debug!(host = name, error = %err, "transmit attempts exhausted");
                    return Step::Done(Some(err));
                }
                tracing::debug!(host = name, error = %err, "transmit failed");
                Step::Stay
            }
            Err(err) => {
                tracing::debug!(host = name, error = %err, "query rejected by transport");
                Step::Done(Some(err))
            }
        }
    }

    fn step_rx(&mut self, host: HostId, family: AddrFamily) -> Step {
        let Self { config, transport, hosts, addrs, .. } = self;
        let Some(record) = hosts.block_mut(host.0) else {
            return Step::Stay;
        };
        let Some(handle) = record.handle else {
            return Step::Done(Some(DnsError::Fault));
        };
        let query_id = record.query_id;

        let received = {
            let mut answers = Answers::new(family, config, addrs, &mut record.addrs);
            transport.receive_response(handle, query_id, &mut answers)
        };

        let answered = match received {
            Ok(status) => status == ResponseStatus::Resolved,
            Err(err) if err.is_transient() => {
                if err != DnsError::Rx {
                    tracing::debug!(error = %err, "receive failed");
                }
                if record.req_counter >= record.retry_max(config) {
                    // The IPv4 phase already ran; its answers are subject to the fallback.
                    if family == AddrFamily::Ipv6 && config.families.ipv4 {
                        tracing::debug!("IPv6 query unanswered");
                        return ipv6_fallback(config, addrs, record, DnsError::NoServer);
                    }
                    return Step::Done(Some(DnsError::NoServer));
                }
                if record.since_last_tx() >= record.retry_timeout(config) {
                    tracing::trace!(?family, attempt = record.req_counter, "response timed out");
                    return Step::Next(HostState::TxReq(family));
                }
                return Step::Stay;
            }
            Err(err) => {
                tracing::debug!(error = %err, "receive rejected by transport");
                return Step::Done(Some(err));
            }
        };

        match family {
            AddrFamily::Ipv4 if config.families.ipv6 => {
                record.req_counter = 0;
                Step::Next(HostState::TxReq(AddrFamily::Ipv6))
            }
            AddrFamily::Ipv4 => Step::Done(None),
            AddrFamily::Ipv6 if answered => Step::Done(None),
            AddrFamily::Ipv6 => ipv6_fallback(config, addrs, record, DnsError::NotResolved),
        }
    }
}

/// Decide the outcome of an IPv6 phase that produced no answers.
///
/// `failure` is reported when the policy gives up on the host.
fn ipv6_fallback(
    config: &CacheConfig,
    addrs: &mut AddrPools,
    record: &mut Host,
    failure: DnsError,
) -> Step {
    match config.ipv6_fallback {
        Ipv6Fallback::RetryInterface => {
            if record.if_retries >= config.interface_retry_max {
                return Step::Done(Some(DnsError::NoServer));
            }
            record.if_retries += 1;
            record.req_counter = 0;
            addrs.clear(&mut record.addrs);
            tracing::debug!(retry = record.if_retries, "no IPv6 answer, retrying interface");
            Step::Next(HostState::IfSel)
        }
        Ipv6Fallback::AcceptPartial if record.addrs.counts.total > 0 => Step::Done(None),
        Ipv6Fallback::AcceptPartial | Ipv6Fallback::Fail => Step::Done(Some(failure)),
    }
}
