//! Transport seam for the discoverable-device stream link.
//!
//! The engines only ever see a reliable, ordered, connection-oriented byte
//! stream addressed by a 48-bit device address plus a service channel. The
//! shipped implementation bridges that address space onto TCP; a native
//! radio transport plugs in behind the same traits.

pub mod tcp;

pub use tcp::TcpBridge;

use std::io::{Read, Write};
use std::time::Duration;

use crate::core::domain::DeviceAddress;
use crate::core::error::Result;

/// A connected byte stream to one remote peer, owned exclusively by one
/// thread at a time. Dropping it closes the connection.
pub trait LinkStream: Read + Write + Send {}

impl<T: Read + Write + Send> LinkStream for T {}

/// Listening endpoint bound to the service channel.
pub trait LinkListener: Send {
    /// Wait up to `timeout` for an incoming connection. `Ok(None)` means
    /// the wait elapsed with nothing to accept, so the caller can observe
    /// its stop flag and come back.
    fn accept_timeout(&self, timeout: Duration) -> Result<Option<Box<dyn LinkStream>>>;
}

/// Factory for outbound and inbound link endpoints.
pub trait Transport: Send + Sync {
    fn connect(&self, address: DeviceAddress, channel: u8) -> Result<Box<dyn LinkStream>>;

    fn bind(&self, channel: u8) -> Result<Box<dyn LinkListener>>;
}
