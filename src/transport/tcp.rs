use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::domain::DeviceAddress;
use crate::core::error::{Result, TransferError};
use crate::protocol;

use super::{LinkListener, LinkStream, Transport};

/// Granularity of the accept poll; bounds how late a pending connection is
/// noticed within one accept wait.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bridges the 48-bit link address space onto IPv4/TCP: the low 32 address
/// bits select the host and the service channel selects a port offset from
/// `port_base`. The upper 16 bits are ignored, the same way a radio stack
/// ignores the non-significant part of a zero-extended address.
#[derive(Debug, Clone)]
pub struct TcpBridge {
    port_base: u16,
}

impl TcpBridge {
    pub fn new(port_base: u16) -> Self {
        Self { port_base }
    }

    fn port(&self, channel: u8) -> u16 {
        self.port_base.saturating_add(u16::from(channel))
    }
}

impl Default for TcpBridge {
    fn default() -> Self {
        Self::new(protocol::DEFAULT_PORT_BASE)
    }
}

fn host_of(address: DeviceAddress) -> Ipv4Addr {
    let octets = address.octets();
    Ipv4Addr::new(octets[2], octets[3], octets[4], octets[5])
}

impl Transport for TcpBridge {
    fn connect(&self, address: DeviceAddress, channel: u8) -> Result<Box<dyn LinkStream>> {
        let endpoint = SocketAddr::from((host_of(address), self.port(channel)));
        debug!(%address, channel, %endpoint, "connecting over TCP bridge");

        let stream = TcpStream::connect(endpoint)
            .map_err(|e| TransferError::ConnectFailed(e.raw_os_error().unwrap_or(-1)))?;
        let _ = stream.set_nodelay(true);
        Ok(Box::new(stream))
    }

    fn bind(&self, channel: u8) -> Result<Box<dyn LinkListener>> {
        let endpoint = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port(channel)));
        debug!(
            channel,
            %endpoint,
            service = %protocol::SERVICE_UUID,
            "binding TCP bridge listener"
        );

        let listener = TcpListener::bind(endpoint).map_err(|_| TransferError::BindFailed)?;
        // The accept wait is implemented as a non-blocking poll so it can
        // observe a deadline; accepted streams are switched back to
        // blocking mode before they are handed out.
        listener
            .set_nonblocking(true)
            .map_err(|_| TransferError::ListenFailed)?;
        Ok(Box::new(TcpBridgeListener { listener }))
    }
}

struct TcpBridgeListener {
    listener: TcpListener,
}

impl LinkListener for TcpBridgeListener {
    fn accept_timeout(&self, timeout: Duration) -> Result<Option<Box<dyn LinkStream>>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    stream.set_nonblocking(false)?;
                    let _ = stream.set_nodelay(true);
                    return Ok(Some(Box::new(stream)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
