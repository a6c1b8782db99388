use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy, Hash)]
pub enum DnsError {
    // Internal invariants
    #[error("Invalid state or configuration")]
    Fault,

    // Resources
    #[error("Memory pool exhausted")]
    MemAlloc,
    #[error("Cache lock unavailable")]
    CacheLock,

    // Lookup
    #[error("Host not found in cache")]
    CacheHostNotFound,
    #[error("Host resolution pending")]
    CacheHostPending,

    // Input validation
    #[error("Address invalid")]
    AddrInvalid,

    // Transport / protocol
    #[error("No DNS server reachable")]
    NoServer,
    #[error("Interface link down")]
    IfLinkDown,
    #[error("Receive failed")]
    Rx,
    #[error("Transmit failed")]
    Tx,
    #[error("Transport open failed")]
    TransportOpen,
    #[error("No usable interface")]
    NoInterface,
    #[error("Name not resolved")]
    NotResolved,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl DnsError {
    pub fn as_i32(&self) -> i32 {
        match self {
            DnsError::Fault => -1,
            DnsError::MemAlloc => -2,
            DnsError::CacheLock => -3,
            DnsError::CacheHostNotFound => -4,
            DnsError::CacheHostPending => -5,
            DnsError::AddrInvalid => -6,

            DnsError::NoServer => -10,
            DnsError::IfLinkDown => -11,
            DnsError::Rx => -12,
            DnsError::Tx => -13,
            DnsError::TransportOpen => -14,
            DnsError::NoInterface => -15,
            DnsError::NotResolved => -16,
            DnsError::Unknown(code) => *code,
        }
    }

    /// Transient transport conditions that the state machine retries on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, DnsError::IfLinkDown | DnsError::Rx | DnsError::Tx)
    }

    /// Lookup outcomes rather than failures of the operation itself.
    pub fn is_lookup(&self) -> bool {
        matches!(self, DnsError::CacheHostNotFound | DnsError::CacheHostPending)
    }
}

impl From<i32> for DnsError {
    fn from(code: i32) -> Self {
        match code {
            -1 => DnsError::Fault,
            -2 => DnsError::MemAlloc,
            -3 => DnsError::CacheLock,
            -4 => DnsError::CacheHostNotFound,
            -5 => DnsError::CacheHostPending,
            -6 => DnsError::AddrInvalid,

            -10 => DnsError::NoServer,
            -11 => DnsError::IfLinkDown,
            -12 => DnsError::Rx,
            -13 => DnsError::Tx,
            -14 => DnsError::TransportOpen,
            -15 => DnsError::NoInterface,
            -16 => DnsError::NotResolved,
            _ => DnsError::Unknown(code),
        }
    }
}
