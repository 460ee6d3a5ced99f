pub mod core;
pub mod discovery;
pub mod file_transfer;
pub mod infrastructure;
pub mod protocol;
pub mod transport;
pub mod utils;

// Re-export the host-facing surface for easier access from binaries and
// integration tests.
pub use self::core::{
    DeviceAddress, DeviceRecord, DeviceScan, DeviceSource, EventSink, RawDevice, Result,
    TransferError, TransferEvent,
};
pub use self::discovery::{DiscoveryEngine, RegistryDeviceSource};
pub use self::file_transfer::{TransferClient, TransferServer};
pub use self::infrastructure::{AppConfig, Dispatcher, EventQueue, KnownDevice};
pub use self::transport::{LinkListener, LinkStream, TcpBridge, Transport};
