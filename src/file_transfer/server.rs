use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::domain::TransferEvent;
use crate::core::error::TransferError;
use crate::core::traits::EventSink;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::events::{Dispatcher, EventQueue};
use crate::protocol::{self, CHUNK_SIZE, HEADER_LEN};
use crate::transport::{LinkStream, Transport};

/// Receiver-side engine: accepts one client at a time on the well-known
/// service channel, performs the receive half of the size handshake, and
/// persists the stream under a timestamped name in the receive directory.
///
/// The accept loop runs on its own thread; `stop` is cooperative and
/// bounded by the accept-wait timeout plus at most one chunk-read latency.
pub struct TransferServer {
    transport: Arc<dyn Transport>,
    channel: u8,
    receive_dir: PathBuf,
    receive_extension: String,
    accept_timeout: Duration,
    events: EventQueue,
    dispatcher: Dispatcher,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TransferServer {
    pub fn new(sink: Arc<dyn EventSink>, transport: Arc<dyn Transport>, config: &AppConfig) -> Self {
        let (events, dispatcher) = Dispatcher::spawn(sink);
        Self {
            transport,
            channel: config.channel,
            receive_dir: config.receive_dir_path(),
            receive_extension: config.receive_extension.clone(),
            accept_timeout: Duration::from_secs(config.accept_timeout_secs),
            events,
            dispatcher,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Launch the accept loop. A previous run's thread is joined first, so
    /// stop-then-start cycles are safe.
    pub fn start(&mut self) {
        self.stop.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        let worker = AcceptLoop {
            transport: self.transport.clone(),
            channel: self.channel,
            receive_dir: self.receive_dir.clone(),
            receive_extension: self.receive_extension.clone(),
            accept_timeout: self.accept_timeout,
            events: self.events.clone(),
            stop: self.stop.clone(),
        };
        self.thread = Some(thread::spawn(move || worker.run()));
        info!(channel = self.channel, "server started");
    }

    /// Set the stop flag and join the accept loop. Safe to call twice; the
    /// second call is a no-op.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            info!("server stopped");
        }
    }
}

impl Drop for TransferServer {
    fn drop(&mut self) {
        // Accept thread joined before the dispatcher so every event it
        // posted is still drained.
        self.stop();
        self.dispatcher.stop();
    }
}

/// Everything the accept-loop thread owns for its lifetime.
struct AcceptLoop {
    transport: Arc<dyn Transport>,
    channel: u8,
    receive_dir: PathBuf,
    receive_extension: String,
    accept_timeout: Duration,
    events: EventQueue,
    stop: Arc<AtomicBool>,
}

/// How one accepted connection ended, for the disconnect status text.
enum ClientOutcome {
    Done,
    PrematureDisconnect,
}

impl AcceptLoop {
    fn run(self) {
        let listener = match self.transport.bind(self.channel) {
            Ok(listener) => listener,
            Err(err) => {
                warn!(error = %err, channel = self.channel, "server failed to bind");
                self.events.post_status(err.to_string());
                return;
            }
        };

        self.events
            .post_status("Server started, waiting for connections...");

        while !self.stop.load(Ordering::SeqCst) {
            let stream = match listener.accept_timeout(self.accept_timeout) {
                Ok(Some(stream)) => stream,
                // Timeout: come back around and observe the stop flag.
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "accept failed, shutting down");
                    break;
                }
            };
            self.handle_client(stream);
        }

        self.events.post_status("Server stopped");
    }

    fn handle_client(&self, mut stream: Box<dyn LinkStream>) {
        self.events.post(TransferEvent::ClientConnected);
        self.events.post_status("Client connected");

        let outcome = self.receive_file(stream.as_mut());

        // The client socket is always closed and the disconnect pair always
        // emitted, whatever the transfer outcome.
        drop(stream);
        self.events.post(TransferEvent::ClientDisconnected);
        self.events.post_status(match outcome {
            ClientOutcome::Done => "Client disconnected".to_string(),
            ClientOutcome::PrematureDisconnect => TransferError::PrematureDisconnect.to_string(),
        });
    }

    fn receive_file(&self, stream: &mut dyn LinkStream) -> ClientOutcome {
        let raw_header = match self.read_header(stream) {
            HeaderRead::Full(raw) => raw,
            HeaderRead::Stopped => return ClientOutcome::Done,
            HeaderRead::Short => return ClientOutcome::PrematureDisconnect,
        };

        let declared_size = match protocol::parse_size_header(&raw_header) {
            Ok(size) => size,
            Err(err) => {
                warn!(error = %err, "rejecting transfer");
                self.events.post_status(err.to_string());
                return ClientOutcome::Done;
            }
        };

        let path =
            crate::utils::received_file_name(&self.receive_dir, &self.receive_extension);
        let mut out = match fs::create_dir_all(&self.receive_dir)
            .and_then(|_| File::create(&path))
        {
            Ok(file) => file,
            Err(err) => {
                warn!(error = %err, path = %path.display(), "cannot create output file");
                self.events.post_status("Cannot create output file");
                return ClientOutcome::Done;
            }
        };

        info!(path = %path.display(), declared_size, "receiving file");

        let mut remaining = declared_size;
        let mut total: u64 = 0;
        let mut buf = [0u8; CHUNK_SIZE];
        while remaining > 0 && !self.stop.load(Ordering::SeqCst) {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let read = match stream.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            if out.write_all(&buf[..read]).is_err() {
                break;
            }
            remaining -= read as u64;
            total += read as u64;

            // Coarse best-effort notice on decile crossings; duplicates at
            // the same multiple are possible and acceptable.
            let percent = total * 100 / declared_size;
            if percent % 10 == 0 {
                self.events.post_status(format!("Receiving: {percent}%"));
            }
        }
        drop(out);

        if remaining == 0 {
            info!(total, path = %path.display(), "file received");
            self.events.post(TransferEvent::FileReceived { path });
            self.events.post_status("File received successfully");
        } else {
            // Never leave a silently truncated artifact behind.
            warn!(total, declared_size, "short transfer, deleting partial file");
            if let Err(err) = fs::remove_file(&path) {
                warn!(error = %err, "failed to delete partial file");
            }
            self.events.post_status("File transfer incomplete");
        }
        ClientOutcome::Done
    }

    /// Accumulate exactly `HEADER_LEN` bytes, retrying partial reads. The
    /// stop flag is observed once per read.
    fn read_header(&self, stream: &mut dyn LinkStream) -> HeaderRead {
        let mut raw = [0u8; HEADER_LEN];
        let mut received = 0;
        while received < HEADER_LEN {
            if self.stop.load(Ordering::SeqCst) {
                return HeaderRead::Stopped;
            }
            match stream.read(&mut raw[received..]) {
                Ok(0) => return HeaderRead::Short,
                Ok(n) => received += n,
                Err(_) => return HeaderRead::Short,
            }
        }
        HeaderRead::Full(raw)
    }
}

enum HeaderRead {
    Full([u8; HEADER_LEN]),
    Short,
    Stopped,
}
