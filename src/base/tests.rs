use crate::base::dnserror::DnsError;
use crate::base::status::{Lookup, Status};

#[test]
fn test_dns_error_roundtrip() {
    let original = DnsError::MemAlloc;
    let code = original.as_i32();
    assert_eq!(code, -2);
    let converted = DnsError::from(code);
    assert!(matches!(converted, DnsError::MemAlloc));

    let transport = DnsError::NoServer;
    assert_eq!(DnsError::from(transport.as_i32()), DnsError::NoServer);
}

#[test]
fn test_unknown_error() {
    let err = DnsError::from(-9999);
    assert!(matches!(err, DnsError::Unknown(-9999)));
    assert_eq!(err.as_i32(), -9999);
}

#[test]
fn test_error_classes() {
    assert!(DnsError::IfLinkDown.is_transient());
    assert!(DnsError::Rx.is_transient());
    assert!(!DnsError::NoServer.is_transient());

    assert!(DnsError::CacheHostPending.is_lookup());
    assert!(DnsError::CacheHostNotFound.is_lookup());
    assert!(!DnsError::MemAlloc.is_lookup());
}

#[test]
fn test_error_display() {
    assert_eq!(DnsError::NoServer.to_string(), "No DNS server reachable");
    assert_eq!(DnsError::Unknown(-42).to_string(), "Unknown error: -42");
}

#[test]
fn test_lookup_constructors() {
    assert_eq!(Lookup::pending().status, Status::Pending);
    assert_eq!(Lookup::pending().count, 0);

    let resolved = Lookup::resolved(3);
    assert!(resolved.status.is_resolved());
    assert_eq!(resolved.count, 3);
    assert_eq!(Status::default(), Status::Pending);
}
