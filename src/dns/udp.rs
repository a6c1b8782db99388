//! Non-blocking UDP transport.
//!
//! One connected `std::net::UdpSocket` per lookup, messages built and parsed
//! with the protocol types re-exported by `hickory-resolver`. Only A and
//! AAAA queries are issued.

use crate::base::context::IoResultExt;
use crate::base::dnserror::DnsError;
use crate::cache::addr::AddrFamily;
use crate::cache::host::IfId;
use crate::dns::transport::{Answers, QueryId, ResponseStatus, Transport, TransportHandle};
use hickory_resolver::proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_resolver::proto::rr::{Name, RData, RecordType};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

/// Standard DNS port.
pub const DNS_PORT: u16 = 53;

/// Largest response accepted over plain UDP (EDNS is not negotiated).
const MAX_UDP_RESPONSE: usize = 512;

struct Conn {
    socket: UdpSocket,
    peer: SocketAddr,
}

/// UDP [`Transport`] talking to a single configured server.
pub struct UdpTransport {
    server: Option<IpAddr>,
    conns: HashMap<u32, Conn>,
    next_handle: u32,
    next_query_id: QueryId,
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or_default();
        Self {
            server: None,
            conns: HashMap::new(),
            next_handle: 1,
            next_query_id: (seed ^ (seed >> 16)) as QueryId,
        }
    }

    /// Create a transport with a default server.
    pub fn with_server(server: IpAddr) -> Self {
        let mut transport = Self::new();
        transport.server = Some(server);
        transport
    }

    /// Number of open sockets.
    pub fn open_count(&self) -> usize {
        self.conns.len()
    }

    fn alloc_query_id(&mut self) -> QueryId {
        self.next_query_id = self.next_query_id.wrapping_add(1);
        self.next_query_id
    }
}

impl Transport for UdpTransport {
    fn open(&mut self, server: Option<IpAddr>, port: Option<u16>) -> Result<TransportHandle, DnsError> {
        let server = server.or(self.server).ok_or(DnsError::NoServer)?;
        let peer = SocketAddr::new(server, port.unwrap_or(DNS_PORT));
        let local = match server {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let target = peer.to_string();

        let socket = UdpSocket::bind(local).link_context(&target, DnsError::TransportOpen)?;
        socket.connect(peer).link_context(&target, DnsError::TransportOpen)?;
        socket.set_nonblocking(true).link_context(&target, DnsError::TransportOpen)?;

        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.conns.insert(handle, Conn { socket, peer });
        tracing::trace!(server = %peer, handle, "udp transport opened");
        Ok(TransportHandle(handle))
    }

    fn close(&mut self, handle: TransportHandle) {
        if let Some(conn) = self.conns.remove(&handle.0) {
            tracing::trace!(server = %conn.peer, handle = handle.0, "udp transport closed");
        }
    }

    fn select_interface(&mut self, current: IfId, handle: TransportHandle) -> Result<IfId, DnsError> {
        if !self.conns.contains_key(&handle.0) {
            return Err(DnsError::NoInterface);
        }
        // The OS routes the connected socket; any interface will do.
        Ok(current)
    }

    fn transmit_query(
        &mut self,
        name: &str,
        handle: TransportHandle,
        query_id: Option<QueryId>,
        family: AddrFamily,
    ) -> Result<QueryId, DnsError> {
        let id = match query_id {
            Some(id) => id,
            None => self.alloc_query_id(),
        };
        let conn = self.conns.get(&handle.0).ok_or(DnsError::Fault)?;
        let bytes = encode_query(name, id, family)?;
        conn.socket.send(&bytes).link_context(name, DnsError::Tx)?;
        Ok(id)
    }

    fn receive_response(
        &mut self,
        handle: TransportHandle,
        query_id: QueryId,
        answers: &mut Answers<'_>,
    ) -> Result<ResponseStatus, DnsError> {
        let conn = self.conns.get(&handle.0).ok_or(DnsError::Fault)?;
        let target = conn.peer.to_string();
        let mut buf = [0u8; MAX_UDP_RESPONSE];

        // Drain datagrams until the matching response shows up.
        loop {
            let len = conn.socket.recv(&mut buf).rx_context(&target)?;
            let message = match Message::from_vec(&buf[..len]) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(server = %target, error = %e, "malformed response dropped");
                    continue;
                }
            };
            if message.id() != query_id || message.message_type() != MessageType::Response {
                tracing::trace!(server = %target, id = message.id(), "unexpected message dropped");
                continue;
            }
            return decode_answers(&message, answers);
        }
    }

    fn check_name(&self, name: &str) -> Result<(), DnsError> {
        encode_query(name, 0, AddrFamily::Ipv4).map(|_| ())
    }

    fn set_server(&mut self, server: IpAddr) -> Result<(), DnsError> {
        tracing::debug!(server = %server, "default server set");
        self.server = Some(server);
        Ok(())
    }

    fn server(&self) -> Option<IpAddr> {
        self.server
    }
}

fn record_type(family: AddrFamily) -> RecordType {
    match family {
        AddrFamily::Ipv4 => RecordType::A,
        AddrFamily::Ipv6 => RecordType::AAAA,
    }
}

/// Build a recursive query for `name`.
///
/// A name that cannot be encoded (empty label, label over 63 bytes, ...)
/// is `AddrInvalid`.
pub fn encode_query(name: &str, id: QueryId, family: AddrFamily) -> Result<Vec<u8>, DnsError> {
    let name = Name::from_ascii(name).map_err(|e| {
        tracing::debug!(host = name, error = %e, "invalid host name");
        DnsError::AddrInvalid
    })?;
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, record_type(family)));
    message.to_vec().map_err(|e| {
        tracing::debug!(error = %e, "query encoding failed");
        DnsError::AddrInvalid
    })
}

/// Push the answers matching the queried family into `answers`.
///
/// SERVFAIL is reported as `Rx` so the query is retried like a lost
/// response; other error codes are a definitive empty answer.
fn decode_answers(message: &Message, answers: &mut Answers<'_>) -> Result<ResponseStatus, DnsError> {
    match message.response_code() {
        ResponseCode::NoError => {}
        ResponseCode::ServFail => {
            tracing::debug!(id = message.id(), "server failure, will retry");
            return Err(DnsError::Rx);
        }
        rcode => {
            tracing::debug!(rcode = %rcode, "server returned an error");
            return Ok(ResponseStatus::Empty);
        }
    }
    let family = answers.family();
    let mut found = false;
    for record in message.answers() {
        let ip = match record.data() {
            RData::A(a) if family == AddrFamily::Ipv4 => IpAddr::V4(a.0),
            RData::AAAA(aaaa) if family == AddrFamily::Ipv6 => IpAddr::V6(aaaa.0),
            _ => continue,
        };
        found = true;
        // Answers over quota are dropped by the sink.
        let _ = answers.push(ip);
    }
    Ok(if found { ResponseStatus::Resolved } else { ResponseStatus::Empty })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::addr::{AddrList, AddrPools};
    use crate::dns::config::CacheConfig;
    use hickory_resolver::proto::rr::rdata::{A, AAAA};
    use hickory_resolver::proto::rr::Record;

    #[test]
    fn test_encode_query() {
        let bytes = encode_query("example.com", 0x1234, AddrFamily::Ipv6).unwrap();
        let message = Message::from_vec(&bytes).unwrap();
        assert_eq!(message.id(), 0x1234);
        assert_eq!(message.message_type(), MessageType::Query);
        assert!(message.recursion_desired());
        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].query_type(), RecordType::AAAA);
    }

    #[test]
    fn test_encode_query_rejects_bad_names() {
        assert_eq!(encode_query("a..b", 1, AddrFamily::Ipv4), Err(DnsError::AddrInvalid));
        let long_label = "a".repeat(64);
        assert_eq!(
            encode_query(&format!("{long_label}.com"), 1, AddrFamily::Ipv4),
            Err(DnsError::AddrInvalid)
        );
        let transport = UdpTransport::new();
        assert_eq!(transport.check_name("a..b"), Err(DnsError::AddrInvalid));
        assert_eq!(transport.check_name("example.com"), Ok(()));
    }

    fn response(code: ResponseCode) -> Message {
        let mut message = Message::new();
        message.set_id(7).set_message_type(MessageType::Response).set_response_code(code);
        message
    }

    #[test]
    fn test_decode_servfail_is_retried() {
        let config = CacheConfig::default();
        let mut pools = AddrPools::new(&config);
        let mut list = AddrList::default();
        let mut answers = Answers::new(AddrFamily::Ipv4, &config, &mut pools, &mut list);
        assert_eq!(
            decode_answers(&response(ResponseCode::ServFail), &mut answers),
            Err(DnsError::Rx)
        );
    }

    #[test]
    fn test_decode_nxdomain_is_empty() {
        let config = CacheConfig::default();
        let mut pools = AddrPools::new(&config);
        let mut list = AddrList::default();
        let mut answers = Answers::new(AddrFamily::Ipv4, &config, &mut pools, &mut list);
        assert_eq!(
            decode_answers(&response(ResponseCode::NXDomain), &mut answers),
            Ok(ResponseStatus::Empty)
        );
    }

    #[test]
    fn test_decode_answers_filters_family() {
        let config = CacheConfig::default();
        let mut pools = AddrPools::new(&config);
        let mut list = AddrList::default();
        let name = Name::from_ascii("example.com").unwrap();
        let mut message = response(ResponseCode::NoError);
        message.add_answer(Record::from_rdata(name.clone(), 60, RData::A(A(Ipv4Addr::new(10, 0, 0, 1)))));
        message.add_answer(Record::from_rdata(name, 60, RData::AAAA(AAAA(Ipv6Addr::LOCALHOST))));

        let mut answers = Answers::new(AddrFamily::Ipv4, &config, &mut pools, &mut list);
        assert_eq!(decode_answers(&message, &mut answers), Ok(ResponseStatus::Resolved));
        assert_eq!(list.counts.ipv4, 1);
        assert_eq!(list.counts.ipv6, 0);
    }

    #[test]
    fn test_open_without_server() {
        let mut transport = UdpTransport::new();
        assert_eq!(transport.open(None, None), Err(DnsError::NoServer));
    }

    #[test]
    fn test_open_close_loopback() {
        let mut transport = UdpTransport::with_server(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let handle = transport.open(None, Some(5353)).unwrap();
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.select_interface(IfId::WILDCARD, handle), Ok(IfId::WILDCARD));
        transport.close(handle);
        assert_eq!(transport.open_count(), 0);
        assert_eq!(
            transport.select_interface(IfId::WILDCARD, handle),
            Err(DnsError::NoInterface)
        );
    }

    #[test]
    fn test_query_ids_advance() {
        let mut transport = UdpTransport::new();
        let first = transport.alloc_query_id();
        let second = transport.alloc_query_id();
        assert_eq!(second, first.wrapping_add(1));
    }
}
