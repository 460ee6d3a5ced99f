use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::domain::{DeviceAddress, TransferEvent};
use crate::core::error::{Result, TransferError};
use crate::core::traits::{DeviceSource, EventSink};
use crate::discovery::DiscoveryEngine;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::events::{Dispatcher, EventQueue};
use crate::protocol::{self, CHUNK_SIZE, HEADER_LEN};
use crate::transport::{LinkStream, Transport};

/// Initiator-side engine: discovers devices, owns at most one outbound
/// connection, and streams a single queued file to the remote service.
///
/// Connect, send and disconnect run synchronously on the caller's thread;
/// `send_file` blocks for the whole transfer. Notifications go through the
/// engine's own dispatch thread, never from the caller's thread directly.
pub struct TransferClient {
    transport: Arc<dyn Transport>,
    channel: u8,
    discovery: DiscoveryEngine,
    events: EventQueue,
    dispatcher: Dispatcher,
    stream: Option<Box<dyn LinkStream>>,
    file_to_send: Option<PathBuf>,
    last_error: String,
}

impl TransferClient {
    pub fn new(
        sink: Arc<dyn EventSink>,
        transport: Arc<dyn Transport>,
        source: Arc<dyn DeviceSource>,
        config: &AppConfig,
    ) -> Self {
        let (events, dispatcher) = Dispatcher::spawn(sink);
        let discovery = DiscoveryEngine::new(
            source,
            events.clone(),
            Duration::from_millis(config.discovery_yield_ms),
        );
        Self {
            transport,
            channel: config.channel,
            discovery,
            events,
            dispatcher,
            stream: None,
            file_to_send: None,
            last_error: String::new(),
        }
    }

    /// Start a device scan; no-op while one is already running.
    pub fn start_discovery(&mut self) {
        self.discovery.start();
    }

    /// Ask a running scan to stop early.
    pub fn stop_discovery(&self) {
        self.discovery.stop();
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_discovering()
    }

    /// Connect to a device by its hex address. Any previous connection is
    /// torn down first, silently.
    pub fn connect_to_device(&mut self, address: &str) -> Result<()> {
        self.stream = None;

        let Some(address) = DeviceAddress::parse(address) else {
            return Err(self.fail(TransferError::InvalidAddress));
        };

        let stream = match self.transport.connect(address, self.channel) {
            Ok(stream) => stream,
            Err(err) => return Err(self.fail(err)),
        };

        self.stream = Some(stream);
        self.events.post(TransferEvent::ClientConnected);
        self.events.post_status("Connected to device");
        info!(%address, channel = self.channel, "connected to device");
        Ok(())
    }

    /// Queue a file for the next `send_file`. No I/O or validation happens
    /// here.
    pub fn set_file_to_send(&mut self, path: impl Into<PathBuf>) {
        self.file_to_send = Some(path.into());
    }

    /// Stream the queued file to the connected device. Blocks until the
    /// transfer completes or fails.
    ///
    /// A mid-stream failure leaves the engine connected; disconnecting is
    /// the caller's decision.
    pub fn send_file(&mut self) -> Result<()> {
        let Some(path) = self.file_to_send.clone() else {
            // Recorded but intentionally not posted as a status event.
            self.last_error = TransferError::NotReady.to_string();
            return Err(TransferError::NotReady);
        };

        // The stream leaves the engine for the duration of the transfer and
        // is always put back: a failed send is failed-but-still-connected.
        let Some(mut stream) = self.stream.take() else {
            self.last_error = TransferError::NotReady.to_string();
            return Err(TransferError::NotReady);
        };
        let result = self.run_send(stream.as_mut(), &path);
        self.stream = Some(stream);
        result
    }

    fn run_send(&mut self, stream: &mut dyn LinkStream, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(self.fail(TransferError::FileNotFound));
        }
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return Err(self.fail(TransferError::FileOpenError)),
        };

        let file_size = match seek_len(&mut file) {
            Ok(len) => len,
            Err(_) => return Err(self.fail(TransferError::FileOpenError)),
        };
        if file_size == 0 {
            return Err(self.fail(TransferError::EmptyFile));
        }

        info!(path = %path.display(), file_size, "sending file");

        // Handshake: the fixed 20-byte size header must be accepted in one
        // call; a short write is fatal and is not retried.
        let header = protocol::encode_size_header(file_size);
        match stream.write(&header) {
            Ok(n) if n == HEADER_LEN => {}
            _ => return Err(self.fail(TransferError::HeaderSendFailed)),
        }

        let mut buf = [0u8; CHUNK_SIZE];
        let mut total_sent: u64 = 0;
        loop {
            let read = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                // A failed read ends the loop; the completion check below
                // reports the short transfer.
                Err(_) => break,
            };

            if stream.write_all(&buf[..read]).is_err() {
                return Err(self.fail(TransferError::StreamSendFailed));
            }

            total_sent += read as u64;
            let percent = (total_sent * 100 / file_size) as u8;
            self.events.post(TransferEvent::ProgressUpdated { percent });
        }

        if total_sent == file_size {
            self.events.post(TransferEvent::FileSent);
            info!(total_sent, "file sent");
            Ok(())
        } else {
            Err(self.fail(TransferError::IncompleteTransfer))
        }
    }

    /// Close the connection. No-op when not connected; safe to call twice.
    pub fn disconnect(&mut self) {
        if self.stream.is_none() {
            return;
        }
        self.stream = None;
        self.events.post(TransferEvent::ClientDisconnected);
        self.events.post_status("Disconnected from device");
        info!("disconnected from device");
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Human-readable description of the most recent failure.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Record a failure both ways: last-error string for the host to query
    /// and a status event through the notification path.
    fn fail(&mut self, err: TransferError) -> TransferError {
        let text = err.to_string();
        warn!(error = %text, "client operation failed");
        self.last_error = text.clone();
        self.events.post_status(text);
        err
    }
}

impl Drop for TransferClient {
    fn drop(&mut self) {
        // Join order matters: the discovery thread first (its events land
        // in the queue), then the dispatch thread (draining everything
        // queued so far), and only then the socket.
        self.discovery.shutdown();
        self.dispatcher.stop();
        self.stream = None;
    }
}

fn seek_len(file: &mut File) -> std::io::Result<u64> {
    let len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(len)
}
