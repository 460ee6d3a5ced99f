use std::path::Path;

/// Host-facing notification surface.
///
/// One method per event kind, every method a default no-op: a host that
/// leaves a method unimplemented silently discards that kind. Handlers are
/// wired once at engine construction and are invoked only on the engine's
/// dispatch thread, one at a time, in post order.
pub trait EventSink: Send + Sync {
    fn on_device_discovered(&self, _name: &str, _address: &str) {}
    fn on_scan_finished(&self) {}
    fn on_status_message(&self, _text: &str) {}
    fn on_progress(&self, _percent: u8) {}
    fn on_file_received(&self, _path: &Path) {}
    fn on_file_sent(&self) {}
    fn on_client_connected(&self) {}
    fn on_client_disconnected(&self) {}
}

/// A device entry as the platform reports it: raw name bytes in whatever
/// encoding the radio stack uses, plus the 48-bit address.
#[derive(Debug, Clone)]
pub struct RawDevice {
    pub name: Vec<u8>,
    pub address: crate::core::domain::DeviceAddress,
}

/// One in-progress enumeration pass over the nearby-device list.
///
/// `next_device` covers the platform's find-first/find-next pair; dropping
/// the scan is the close. The discovery engine owns conversion of raw
/// entries to canonical text form.
pub trait DeviceScan: Send {
    fn next_device(&mut self) -> Option<RawDevice>;
}

/// Source of nearby-device enumeration passes.
///
/// This is the boundary to the platform radio stack; the engine only ever
/// iterates whatever a scan yields and never interprets entries beyond
/// name/address conversion.
pub trait DeviceSource: Send + Sync {
    fn open_scan(&self) -> Box<dyn DeviceScan>;
}
