use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// Added for tracing file logging
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bluedrop::{
    AppConfig, EventSink, RegistryDeviceSource, TcpBridge, TransferClient, TransferServer, utils,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional path to a JSON configuration file
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the receiver: accept one client at a time and persist incoming
    /// files under the receive directory
    Serve,
    /// Scan for nearby devices and list them
    Scan,
    /// Send a file to a device
    Send {
        /// Path to the file to send
        #[arg(short, long)]
        file: PathBuf,

        /// Device address as hex text, e.g. 00007f000001
        #[arg(short, long)]
        address: String,
    },
}

// Function to initialize tracing and file logging
// Returns a WorkerGuard that must be kept alive for logs to be written
fn init_logging(log_file_prefix: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", log_file_prefix);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false); // Don't use ANSI codes in files

    // Console output goes to stderr so scan results stay clean on stdout
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Sink for `serve`: everything goes to the log.
struct ServeSink;

impl EventSink for ServeSink {
    fn on_status_message(&self, text: &str) {
        info!("{text}");
    }

    fn on_client_connected(&self) {
        info!("client connected");
    }

    fn on_client_disconnected(&self) {
        info!("client disconnected");
    }

    fn on_file_received(&self, path: &Path) {
        info!(path = %path.display(), "file received");
    }
}

/// Sink for `scan`: devices to stdout, completion over a channel so the
/// main thread knows when to exit.
struct ScanSink {
    done: crossbeam_channel::Sender<()>,
}

impl EventSink for ScanSink {
    fn on_device_discovered(&self, name: &str, address: &str) {
        println!("{address}  {name}");
    }

    fn on_scan_finished(&self) {
        let _ = self.done.send(());
    }

    fn on_status_message(&self, text: &str) {
        info!("{text}");
    }
}

/// Sink for `send`: progress events drive the bar.
struct SendSink {
    bar: ProgressBar,
}

impl EventSink for SendSink {
    fn on_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn on_status_message(&self, text: &str) {
        info!("{text}");
    }
}

fn main() -> Result<()> {
    // This guard needs to stay in scope, otherwise logs stop writing.
    let _guard = init_logging("bluedrop")?;

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());
    config.validate()?;

    let transport = Arc::new(TcpBridge::new(config.port_base));

    match cli.command {
        Commands::Serve => {
            config.ensure_directories()?;
            let mut server = TransferServer::new(Arc::new(ServeSink), transport, &config);
            server.start();

            println!("Receiving into {}; press Enter to stop", config.receive_directory);
            std::io::stdin().read_line(&mut String::new())?;
            server.stop();
        }
        Commands::Scan => {
            let (done_tx, done_rx) = crossbeam_channel::bounded(1);
            let source = Arc::new(RegistryDeviceSource::from_config(&config.known_devices));
            let mut client = TransferClient::new(
                Arc::new(ScanSink { done: done_tx }),
                transport,
                source,
                &config,
            );

            client.start_discovery();
            done_rx
                .recv_timeout(Duration::from_secs(60))
                .context("scan did not finish")?;
        }
        Commands::Send { file, address } => {
            let size = std::fs::metadata(&file)
                .with_context(|| format!("cannot read {}", file.display()))?
                .len();
            println!(
                "Sending {} ({}) to {address}",
                file.display(),
                utils::format_size(size)
            );

            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% ({eta})")?,
            );

            let source = Arc::new(RegistryDeviceSource::from_config(&config.known_devices));
            let mut client = TransferClient::new(
                Arc::new(SendSink { bar: bar.clone() }),
                transport,
                source,
                &config,
            );

            client
                .connect_to_device(&address)
                .with_context(|| format!("connect to {address} failed"))?;
            client.set_file_to_send(&file);
            let sent = client.send_file();
            client.disconnect();
            sent.context("transfer failed")?;
            bar.finish_with_message("Transfer complete");
        }
    }

    Ok(())
}
