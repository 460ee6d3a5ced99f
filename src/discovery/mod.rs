use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::domain::{DeviceAddress, DeviceRecord, TransferEvent};
use crate::core::traits::{DeviceScan, DeviceSource, RawDevice};
use crate::infrastructure::config::KnownDevice;
use crate::infrastructure::events::EventQueue;

/// Device source backed by the remembered-device registry from the
/// configuration. Each scan enumerates every entry; the engine does not
/// deduplicate across passes.
pub struct RegistryDeviceSource {
    devices: Vec<RawDevice>,
}

impl RegistryDeviceSource {
    /// Build from configured entries, skipping ones with unparseable
    /// addresses.
    pub fn from_config(devices: &[KnownDevice]) -> Self {
        let devices = devices
            .iter()
            .filter_map(|device| match DeviceAddress::parse(&device.address) {
                Some(address) => Some(RawDevice {
                    name: device.name.clone().into_bytes(),
                    address,
                }),
                None => {
                    warn!(address = %device.address, "skipping registry entry with bad address");
                    None
                }
            })
            .collect();
        Self { devices }
    }
}

impl DeviceSource for RegistryDeviceSource {
    fn open_scan(&self) -> Box<dyn DeviceScan> {
        Box::new(RegistryScan {
            devices: self.devices.clone(),
            next: 0,
        })
    }
}

struct RegistryScan {
    devices: Vec<RawDevice>,
    next: usize,
}

impl DeviceScan for RegistryScan {
    fn next_device(&mut self) -> Option<RawDevice> {
        let device = self.devices.get(self.next).cloned()?;
        self.next += 1;
        Some(device)
    }
}

/// Runs device enumeration on a dedicated thread and reports results
/// through the owning engine's event queue.
///
/// At most one enumeration thread is alive at a time; a finished thread is
/// joined before the next one is spawned. Exactly one `ScanFinished` is
/// emitted per `start`, whether the scan ran to exhaustion or was stopped.
pub struct DiscoveryEngine {
    source: Arc<dyn DeviceSource>,
    events: EventQueue,
    yield_interval: Duration,
    discovering: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DiscoveryEngine {
    pub fn new(source: Arc<dyn DeviceSource>, events: EventQueue, yield_interval: Duration) -> Self {
        Self {
            source,
            events,
            yield_interval,
            discovering: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Start a scan. No-op if one is already running.
    pub fn start(&mut self) {
        if self.discovering.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);

        self.events.post_status("Scanning for devices...");
        info!("starting device discovery");

        // The previous thread, if any, has already marked itself done;
        // join it so at most one enumeration thread is ever alive.
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }

        let source = self.source.clone();
        let events = self.events.clone();
        let discovering = self.discovering.clone();
        let stop = self.stop.clone();
        let yield_interval = self.yield_interval;
        self.thread = Some(thread::spawn(move || {
            run_discovery(source, events, discovering, stop, yield_interval);
        }));
    }

    /// Request early termination; the scan thread observes the flag once
    /// per entry.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    /// Stop and join the enumeration thread. Called on engine teardown,
    /// before the shared event queue goes away.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_discovery(
    source: Arc<dyn DeviceSource>,
    events: EventQueue,
    discovering: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    yield_interval: Duration,
) {
    let mut scan = source.open_scan();
    while let Some(raw) = scan.next_device() {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let record = DeviceRecord::from_raw(&raw.name, raw.address);
        events.post(TransferEvent::DeviceDiscovered {
            name: record.name,
            address: record.address,
        });

        // Brief pause so enumeration cannot flood the queue faster than
        // the dispatch loop drains it.
        thread::sleep(yield_interval);
    }

    discovering.store(false, Ordering::SeqCst);
    events.post(TransferEvent::ScanFinished);
    info!("device discovery finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::EventSink;
    use crate::infrastructure::events::Dispatcher;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn on_device_discovered(&self, name: &str, address: &str) {
            self.log.lock().unwrap().push(format!("device:{name}:{address}"));
        }

        fn on_scan_finished(&self) {
            self.log.lock().unwrap().push("scan_finished".into());
        }

        fn on_status_message(&self, text: &str) {
            self.log.lock().unwrap().push(format!("status:{text}"));
        }
    }

    fn wait_for(sink: &RecordingSink, predicate: impl Fn(&[String]) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate(&sink.log.lock().unwrap()) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for events: {:?}", sink.log.lock().unwrap());
    }

    fn registry(entries: &[(&str, &str)]) -> Arc<RegistryDeviceSource> {
        let devices: Vec<KnownDevice> = entries
            .iter()
            .map(|(name, address)| KnownDevice {
                name: name.to_string(),
                address: address.to_string(),
            })
            .collect();
        Arc::new(RegistryDeviceSource::from_config(&devices))
    }

    #[test]
    fn emits_one_event_per_device_then_scan_finished() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());
        let source = registry(&[
            ("Headset", "001122334455"),
            ("Speaker", "aabbccddeeff"),
            ("Watch", "00007f000001"),
        ]);

        let mut engine = DiscoveryEngine::new(source, queue, Duration::from_millis(1));
        engine.start();
        wait_for(&sink, |log| log.iter().any(|e| e == "scan_finished"));
        engine.shutdown();
        dispatcher.stop();

        let log = sink.log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "status:Scanning for devices...",
                "device:Headset:001122334455",
                "device:Speaker:aabbccddeeff",
                "device:Watch:00007f000001",
                "scan_finished",
            ]
        );
    }

    #[test]
    fn scan_finished_is_emitted_even_for_an_empty_registry() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());

        let mut engine =
            DiscoveryEngine::new(registry(&[]), queue, Duration::from_millis(1));
        engine.start();
        wait_for(&sink, |log| log.iter().any(|e| e == "scan_finished"));
        engine.shutdown();
        dispatcher.stop();

        let log = sink.log.lock().unwrap();
        assert_eq!(log.iter().filter(|e| *e == "scan_finished").count(), 1);
    }

    #[test]
    fn second_start_is_a_no_op_while_scanning() {
        struct SlowScan {
            remaining: usize,
        }

        impl DeviceScan for SlowScan {
            fn next_device(&mut self) -> Option<RawDevice> {
                if self.remaining == 0 {
                    return None;
                }
                self.remaining -= 1;
                thread::sleep(Duration::from_millis(30));
                Some(RawDevice {
                    name: b"slow".to_vec(),
                    address: DeviceAddress::from_u64(1).unwrap(),
                })
            }
        }

        struct SlowSource;

        impl DeviceSource for SlowSource {
            fn open_scan(&self) -> Box<dyn DeviceScan> {
                Box::new(SlowScan { remaining: 5 })
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());

        let mut engine =
            DiscoveryEngine::new(Arc::new(SlowSource), queue, Duration::from_millis(1));
        engine.start();
        engine.start();
        engine.start();
        wait_for(&sink, |log| log.iter().any(|e| e == "scan_finished"));
        engine.shutdown();
        dispatcher.stop();

        let log = sink.log.lock().unwrap();
        let scans = log
            .iter()
            .filter(|e| *e == "status:Scanning for devices...")
            .count();
        let finishes = log.iter().filter(|e| *e == "scan_finished").count();
        assert_eq!(scans, 1);
        assert_eq!(finishes, 1);
    }

    #[test]
    fn stop_cuts_the_scan_short_but_still_finishes() {
        let entries: Vec<(String, String)> = (0..200)
            .map(|i| (format!("dev{i}"), format!("{i:012x}")))
            .collect();
        let borrowed: Vec<(&str, &str)> = entries
            .iter()
            .map(|(n, a)| (n.as_str(), a.as_str()))
            .collect();

        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());

        let mut engine =
            DiscoveryEngine::new(registry(&borrowed), queue, Duration::from_millis(5));
        engine.start();
        wait_for(&sink, |log| log.iter().any(|e| e.starts_with("device:")));
        engine.stop();
        wait_for(&sink, |log| log.iter().any(|e| e == "scan_finished"));
        engine.shutdown();
        dispatcher.stop();

        let log = sink.log.lock().unwrap();
        let devices = log.iter().filter(|e| e.starts_with("device:")).count();
        assert!(devices < 200, "stop flag was never observed");
        assert_eq!(log.last().unwrap(), "scan_finished");
    }
}
