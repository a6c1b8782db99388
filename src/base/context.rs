//! Ergonomic error context helpers.
//!
//! Provides an extension trait for turning socket-level IO results into
//! the `DnsError` kinds the resolution state machine understands.

use crate::base::dnserror::DnsError;
use std::io::{self, ErrorKind};

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Map an IO error raised while opening or transmitting.
    ///
    /// Network-down conditions become [`DnsError::IfLinkDown`] so the
    /// caller goes back to interface selection; anything else becomes
    /// `fallback`.
    ///
    /// # Example
    /// ```ignore
    /// use lwdns::base::context::IoResultExt;
    ///
    /// socket.send(&query).link_context("example.com", DnsError::Tx)?;
    /// ```
    fn link_context(self, host: &str, fallback: DnsError) -> Result<T, DnsError>;

    /// Map an IO error raised while polling for a response.
    ///
    /// Every receive failure is reported as [`DnsError::Rx`]; would-block
    /// is the normal "nothing yet" answer of a non-blocking socket and is
    /// not logged.
    fn rx_context(self, host: &str) -> Result<T, DnsError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn link_context(self, host: &str, fallback: DnsError) -> Result<T, DnsError> {
        self.map_err(|e| match e.kind() {
            ErrorKind::NetworkDown | ErrorKind::NetworkUnreachable => {
                tracing::debug!(host = %host, error = %e, "interface link down");
                DnsError::IfLinkDown
            }
            _ => {
                tracing::debug!(host = %host, error = %e, "socket operation failed");
                fallback
            }
        })
    }

    fn rx_context(self, host: &str) -> Result<T, DnsError> {
        self.map_err(|e| {
            if e.kind() != ErrorKind::WouldBlock {
                tracing::debug!(host = %host, error = %e, "receive failed");
            }
            DnsError::Rx
        })
    }
}
