//! Host records.

use crate::base::dnserror::DnsError;
use crate::cache::addr::{AddrFamily, AddrList};
use crate::dns::config::{CacheConfig, RequestConfig};
use crate::dns::transport::{QueryId, TransportHandle};
use crate::mem::BlockId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Resolution state of a host.
///
/// `Free` only exists between pool allocation and first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostState {
    #[default]
    Free,
    /// Waiting for a transport handle.
    InitReq,
    /// Waiting for an interface.
    IfSel,
    /// Query for the family is ready to be sent.
    TxReq(AddrFamily),
    /// Query sent, polling for the response.
    RxResp(AddrFamily),
    Resolved,
    Failed,
}

impl HostState {
    /// No more I/O will happen for this host.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostState::Resolved | HostState::Failed)
    }

    /// A query is outstanding; the transport holds live state for it.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, HostState::TxReq(_) | HostState::RxResp(_))
    }

    /// Safe to evict or clear.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, HostState::Free | HostState::Resolved | HostState::Failed)
    }
}

/// Handle to a host record.
///
/// Handles are generational: once the record is released or reclaimed the
/// old handle stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(pub(crate) BlockId);

/// Network interface chosen for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IfId(pub u8);

impl IfId {
    /// Let the transport pick.
    pub const WILDCARD: IfId = IfId(u8::MAX);
}

impl Default for IfId {
    fn default() -> Self {
        Self::WILDCARD
    }
}

/// Fixed-size host name buffer.
#[derive(Debug)]
pub(crate) struct NameBuf {
    bytes: Box<[u8]>,
    len: usize,
}

impl NameBuf {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { bytes: vec![0u8; capacity].into_boxed_slice(), len: 0 }
    }

    pub(crate) fn set(&mut self, name: &str) {
        let stored = truncate(name, self.bytes.len());
        self.bytes.fill(0);
        self.bytes[..stored.len()].copy_from_slice(stored.as_bytes());
        self.len = stored.len();
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.fill(0);
        self.len = 0;
    }

    pub(crate) fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    /// Compare against `name` the way it would have been stored.
    pub(crate) fn matches(&self, name: &str) -> bool {
        truncate(name, self.bytes.len()) == self.as_str()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

/// Longest prefix of `name` that fits in `max` bytes without splitting a
/// character.
pub(crate) fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Per-hostname resolution state.
#[derive(Debug, Default)]
pub(crate) struct Host {
    pub(crate) name: Option<BlockId>,
    pub(crate) state: HostState,
    pub(crate) interface: IfId,
    pub(crate) handle: Option<TransportHandle>,
    pub(crate) query_id: QueryId,
    /// Transmit attempts for the current family
    pub(crate) req_counter: u8,
    /// Consecutive transmit failures
    pub(crate) tx_errors: u8,
    pub(crate) if_retries: u8,
    pub(crate) last_tx: Option<Instant>,
    /// Copied in at acquisition; the caller keeps its own value
    pub(crate) req_cfg: Option<RequestConfig>,
    pub(crate) addrs: AddrList,
    pub(crate) signal: Option<Arc<Notify>>,
    pub(crate) error: Option<DnsError>,
}

impl Host {
    /// Prepare a record for a new lookup. The address list must already
    /// be empty.
    pub(crate) fn reset(
        &mut self,
        name: BlockId,
        req_cfg: Option<RequestConfig>,
        signal: Option<Arc<Notify>>,
    ) {
        *self = Host {
            name: Some(name),
            state: HostState::InitReq,
            req_cfg,
            signal,
            ..Host::default()
        };
    }

    pub(crate) fn retry_max(&self, config: &CacheConfig) -> u8 {
        self.req_cfg.and_then(|cfg| cfg.retry_max).unwrap_or(config.req_retry_max)
    }

    pub(crate) fn retry_timeout(&self, config: &CacheConfig) -> Duration {
        self.req_cfg.and_then(|cfg| cfg.retry_timeout).unwrap_or(config.req_retry_timeout)
    }

    /// Time since the last transmit; unbounded when nothing was sent yet.
    pub(crate) fn since_last_tx(&self) -> Duration {
        self.last_tx.map_or(Duration::MAX, |ts| ts.elapsed())
    }
}
