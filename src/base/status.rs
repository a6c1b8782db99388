/// Outcome of a resolution step or a lookup.
///
/// Failures are reported through `Err(DnsError)`, so a status is either
/// still in progress or done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// The host is still being resolved.
    #[default]
    Pending,

    /// The host has been resolved and its addresses are available.
    Resolved,
}

impl Status {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Status::Resolved)
    }
}

/// Result of a client lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// Whether the addresses are available yet.
    pub status: Status,
    /// Number of addresses written into the caller's buffer.
    pub count: usize,
}

impl Lookup {
    pub fn pending() -> Self {
        Self { status: Status::Pending, count: 0 }
    }

    pub fn resolved(count: usize) -> Self {
        Self { status: Status::Resolved, count }
    }
}
