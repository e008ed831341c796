//! Native manager that records calls instead of reaching a Bluetooth stack.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::att::IoResult;
use crate::gap::Uuid;
use crate::gatt::Service;

use super::*;

/// Recorded manager call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Call {
    AddService(Uuid),
    StartAdvertising(Advertisement),
    StopAdvertising,
    UpdateValue(Uuid, Vec<u8>),
    Respond(RequestId, Vec<u8>, IoResult),
}

#[derive(Debug)]
pub(crate) struct MockManager {
    calls: Mutex<Vec<Call>>,
    advertising: AtomicBool,
    accept: AtomicBool,
    echo: Mutex<Option<mpsc::UnboundedSender<Event>>>,
}

impl MockManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::default(),
            advertising: AtomicBool::new(false),
            accept: AtomicBool::new(true),
            echo: Mutex::default(),
        })
    }

    /// Returns all calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Sets the result of subsequent value updates.
    pub fn set_accept(&self, v: bool) {
        self.accept.store(v, Ordering::Relaxed);
    }

    /// Confirms subsequent add service and start advertising calls by sending
    /// successful completion events to `tx`.
    pub fn echo(&self, tx: mpsc::UnboundedSender<Event>) {
        *self.echo.lock() = Some(tx);
    }

    fn confirm(&self, evt: Event) {
        if let Some(tx) = self.echo.lock().as_ref() {
            let _ = tx.send(evt);
        }
    }

    fn record(&self, c: Call) {
        self.calls.lock().push(c);
    }
}

impl Manager for MockManager {
    fn add_service(&self, svc: &Service) {
        self.record(Call::AddService(svc.uuid()));
        self.confirm(Event::ServiceAdded {
            service: Service::remote(svc.uuid(), svc.is_primary()),
            error: None,
        });
    }

    fn start_advertising(&self, adv: &Advertisement) {
        self.advertising.store(true, Ordering::Relaxed);
        self.record(Call::StartAdvertising(adv.clone()));
        self.confirm(Event::AdvertisingStarted { error: None });
    }

    fn stop_advertising(&self) {
        self.advertising.store(false, Ordering::Relaxed);
        self.record(Call::StopAdvertising);
    }

    fn is_advertising(&self) -> bool {
        self.advertising.load(Ordering::Relaxed)
    }

    fn update_value(&self, char_uuid: Uuid, value: &[u8], _: Option<&[Central]>) -> bool {
        self.record(Call::UpdateValue(char_uuid, value.to_vec()));
        self.accept.load(Ordering::Relaxed)
    }

    fn respond(&self, id: RequestId, value: &[u8], r: IoResult) {
        self.record(Call::Respond(id, value.to_vec(), r));
    }
}

/// Returns a mock manager and a native event channel.
pub(crate) fn channel() -> (
    Arc<MockManager>,
    mpsc::UnboundedSender<Event>,
    mpsc::UnboundedReceiver<Event>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MockManager::new(), tx, rx)
}
