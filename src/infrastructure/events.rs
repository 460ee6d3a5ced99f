use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::trace;

use crate::core::domain::TransferEvent;
use crate::core::traits::EventSink;

/// What actually travels on the channel: events, plus the shutdown marker
/// `stop` queues at the tail so everything ahead of it still gets delivered.
enum Envelope {
    Event(TransferEvent),
    Shutdown,
}

/// Producer handle to an engine's event queue.
///
/// `post` is non-blocking and safe to call from any thread. Events posted
/// after the dispatch loop has shut down are discarded.
#[derive(Clone)]
pub struct EventQueue {
    tx: Sender<Envelope>,
}

impl EventQueue {
    pub fn post(&self, event: TransferEvent) {
        let _ = self.tx.send(Envelope::Event(event));
    }

    /// Convenience for the most common event kind.
    pub fn post_status(&self, text: impl Into<String>) {
        self.post(TransferEvent::StatusMessage { text: text.into() });
    }
}

/// Owner of the single dispatch thread that drains the queue and invokes
/// the sink. One dispatcher per engine instance; two engines in the same
/// process have fully independent dispatchers.
pub struct Dispatcher {
    tx: Sender<Envelope>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the dispatch thread and hand back the producer side.
    pub fn spawn(sink: Arc<dyn EventSink>) -> (EventQueue, Dispatcher) {
        let (tx, rx) = unbounded();
        let handle = thread::spawn(move || dispatch_loop(rx, sink));
        let queue = EventQueue { tx: tx.clone() };
        let dispatcher = Dispatcher {
            tx,
            handle: Some(handle),
        };
        (queue, dispatcher)
    }

    /// Queue the shutdown marker and join the dispatch thread. Everything
    /// posted before this call is still delivered; safe to call twice.
    pub fn stop(&mut self) {
        let _ = self.tx.send(Envelope::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(rx: Receiver<Envelope>, sink: Arc<dyn EventSink>) {
    // Blocking receive until the shutdown marker arrives or every producer
    // handle is gone. One record at a time, in post order, and the sink is
    // invoked with no lock held.
    for envelope in rx.iter() {
        match envelope {
            Envelope::Event(event) => {
                trace!(?event, "dispatching event");
                deliver(sink.as_ref(), event);
            }
            Envelope::Shutdown => break,
        }
    }
}

fn deliver(sink: &dyn EventSink, event: TransferEvent) {
    match event {
        TransferEvent::DeviceDiscovered { name, address } => {
            sink.on_device_discovered(&name, &address)
        }
        TransferEvent::ScanFinished => sink.on_scan_finished(),
        TransferEvent::ClientConnected => sink.on_client_connected(),
        TransferEvent::ClientDisconnected => sink.on_client_disconnected(),
        TransferEvent::FileReceived { path } => sink.on_file_received(&path),
        TransferEvent::FileSent => sink.on_file_sent(),
        TransferEvent::ProgressUpdated { percent } => sink.on_progress(percent),
        TransferEvent::StatusMessage { text } => sink.on_status_message(&text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn on_status_message(&self, text: &str) {
            self.log.lock().unwrap().push(format!("status:{text}"));
        }

        fn on_progress(&self, percent: u8) {
            self.log.lock().unwrap().push(format!("progress:{percent}"));
        }

        fn on_scan_finished(&self) {
            self.log.lock().unwrap().push("scan_finished".into());
        }
    }

    #[test]
    fn events_are_delivered_in_post_order() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());

        for percent in [10u8, 20, 30] {
            queue.post(TransferEvent::ProgressUpdated { percent });
        }
        queue.post_status("done");
        dispatcher.stop();

        let log = sink.log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["progress:10", "progress:20", "progress:30", "status:done"]
        );
    }

    #[test]
    fn stop_drains_already_queued_events() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());

        // All of these are queued before the shutdown marker, so all of
        // them must be delivered even though stop follows immediately.
        for percent in 0..100u8 {
            queue.post(TransferEvent::ProgressUpdated { percent });
        }
        dispatcher.stop();

        assert_eq!(sink.log.lock().unwrap().len(), 100);
    }

    #[test]
    fn posting_after_stop_is_silently_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());
        dispatcher.stop();

        queue.post(TransferEvent::ScanFinished);
        assert!(sink.log.lock().unwrap().is_empty());
    }

    #[test]
    fn unhandled_kinds_are_discarded() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut dispatcher) = Dispatcher::spawn(sink.clone());

        // RecordingSink has no on_file_sent override; default no-op applies.
        queue.post(TransferEvent::FileSent);
        queue.post_status("after");
        dispatcher.stop();

        assert_eq!(*sink.log.lock().unwrap(), vec!["status:after"]);
    }
}
