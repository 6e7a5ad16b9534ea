//! The scheduled deployment: a dedicated task owns the interface adapter and
//! drains the event queue for the process lifetime.

use std::sync::Arc;
use std::thread;

use ipusb_events::{EventQueue, QueueEventSink};
use ipusb_transport::NcmTransport;

use crate::netif::NcmNetif;
use crate::stack::IpStack;

/// Owns an [`NcmNetif`] plus its event queue and dispatches serialized
/// notifications into it.
///
/// Construction arms the transport's notification callbacks to post onto the
/// queue; from then on any producer context can signal without touching the
/// adapter, and only this worker mutates interface or stack state.
pub struct NetifWorker<T, S> {
    netif: NcmNetif<T, S>,
    events: Arc<EventQueue>,
}

impl<T: NcmTransport, S: IpStack> NetifWorker<T, S> {
    pub fn new(mut netif: NcmNetif<T, S>, events: Arc<EventQueue>) -> Self {
        netif
            .transport_mut()
            .set_event_sink(Arc::new(QueueEventSink::new(events.clone())));
        Self { netif, events }
    }

    pub fn netif(&self) -> &NcmNetif<T, S> {
        &self.netif
    }

    pub fn netif_mut(&mut self) -> &mut NcmNetif<T, S> {
        &mut self.netif
    }

    pub fn events(&self) -> &Arc<EventQueue> {
        &self.events
    }

    /// Dispatch already-queued events without blocking; returns how many were
    /// handled. Useful for harnesses that drive the worker manually.
    pub fn service_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.try_recv() {
            let _ = self.netif.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Block on the queue and dispatch forever. There is no shutdown path;
    /// the worker lives as long as the process (reset-on-restart model).
    pub fn run(mut self) -> ! {
        loop {
            let event = self.events.recv();
            let _ = self.netif.dispatch(event);
        }
    }

    /// Spawn the worker loop on its own named thread.
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>>
    where
        T: Send + 'static,
        S: Send + 'static,
    {
        thread::Builder::new()
            .name("ncm-netif".into())
            .spawn(move || {
                self.run();
            })
    }
}
