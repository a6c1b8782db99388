//! Base types and error handling.
//!
//! - [`DnsError`](dnserror::DnsError): error codes shared by the cache, the
//!   state machine and transports
//! - [`Status`](status::Status): progress of a resolution

pub mod context;
pub mod dnserror;
pub mod status;

#[cfg(test)]
mod tests;
