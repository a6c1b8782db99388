//! Lookup flags for [`DnsClient::get_host`](crate::dns::client::DnsClient::get_host).

use crate::base::dnserror::DnsError;
use crate::cache::addr::FamilyFilter;
use std::ops::{BitOr, BitOrAssign};

/// Options for one lookup, combined with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LookupFlags(u8);

impl LookupFlags {
    pub const NONE: LookupFlags = LookupFlags(0);
    /// Only return IPv4 addresses.
    pub const IPV4_ONLY: LookupFlags = LookupFlags(1 << 0);
    /// Only return IPv6 addresses.
    pub const IPV6_ONLY: LookupFlags = LookupFlags(1 << 1);
    /// Return immediately instead of waiting for the resolution.
    pub const NO_BLOCK: LookupFlags = LookupFlags(1 << 2);
    /// Answer from the cache only, never start a query.
    pub const FORCE_CACHE: LookupFlags = LookupFlags(1 << 3);
    /// Drop any cached entry and query again.
    pub const FORCE_RENEW: LookupFlags = LookupFlags(1 << 4);
    /// Resolve even when the name is an address literal.
    pub const FORCE_RESOLUTION: LookupFlags = LookupFlags(1 << 5);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: LookupFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Reject contradictory combinations.
    pub fn validate(&self) -> Result<(), DnsError> {
        let both_families = self.contains(Self::IPV4_ONLY | Self::IPV6_ONLY);
        let cache_and_renew = self.contains(Self::FORCE_CACHE | Self::FORCE_RENEW);
        if both_families || cache_and_renew {
            return Err(DnsError::Fault);
        }
        Ok(())
    }

    /// Family filter applied to the returned addresses.
    pub fn filter(&self) -> FamilyFilter {
        if self.contains(Self::IPV4_ONLY) {
            FamilyFilter::Ipv4Only
        } else if self.contains(Self::IPV6_ONLY) {
            FamilyFilter::Ipv6Only
        } else {
            FamilyFilter::Any
        }
    }
}

impl BitOr for LookupFlags {
    type Output = LookupFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        LookupFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for LookupFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
