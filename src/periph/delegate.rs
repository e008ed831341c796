use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::att::ErrorCode;
use crate::gap::Uuid;
use crate::gatt::{Db, Service};
use crate::util::Condvar;
use crate::{Error, Result};

use super::*;

/// Asynchronous native operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Op {
    AddService(Uuid),
    StartAdvertising,
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::AddService(u) => write!(f, "add service {u}"),
            Self::StartAdvertising => f.write_str("start advertising"),
        }
    }
}

/// Completion state of an asynchronous native operation.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Completion {
    Pending,
    Succeeded,
    Failed(NativeError),
}

impl Completion {
    /// Converts a terminal state into an operation result. Returns `None`
    /// while the operation is pending.
    fn result(&self, op: Op) -> Option<Result<()>> {
        match self {
            Self::Pending => None,
            Self::Succeeded => Some(Ok(())),
            Self::Failed(err) => Some(Err(Error::NativeOperation {
                op,
                err: err.clone(),
            })),
        }
    }
}

/// State shared between operation waiters and the event pump.
#[derive(Debug, Default)]
struct State {
    power: PowerState,
    svcs: HashMap<Uuid, Completion>,
    adv: Option<Completion>,
    closed: bool,
}

impl State {
    /// Returns the result of a tracked operation, or `None` if it has not
    /// completed yet.
    fn poll(&self, op: Op) -> Option<Result<()>> {
        let c = match op {
            Op::AddService(u) => self.svcs.get(&u),
            Op::StartAdvertising => self.adv.as_ref(),
        };
        match c.and_then(|c| c.result(op)) {
            None if self.closed => Some(Err(Error::Closed)),
            r => r,
        }
    }

    /// Marks an operation as pending. Fails if the previous operation with
    /// the same key has not completed.
    fn begin(&mut self, op: Op) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        let c = match op {
            Op::AddService(u) => self.svcs.entry(u).or_insert(Completion::Succeeded),
            Op::StartAdvertising => self.adv.get_or_insert(Completion::Succeeded),
        };
        if *c == Completion::Pending {
            return Err(Error::OperationPending(op));
        }
        *c = Completion::Pending;
        Ok(())
    }

    /// Clears the slot of an operation that is still pending. Returns whether
    /// the slot was cleared.
    fn abandon(&mut self, op: Op) -> bool {
        match op {
            Op::AddService(u) => {
                if self.svcs.get(&u) == Some(&Completion::Pending) {
                    self.svcs.remove(&u);
                    return true;
                }
            }
            Op::StartAdvertising => {
                if self.adv == Some(Completion::Pending) {
                    self.adv = None;
                    return true;
                }
            }
        }
        false
    }
}

/// Clears a pending operation slot if the waiting future is dropped before
/// the native stack responds. A late completion for the abandoned operation
/// is then ignored.
struct Abandon<'a> {
    st: &'a Condvar<State>,
    op: Op,
}

impl Drop for Abandon<'_> {
    fn drop(&mut self) {
        if self.st.lock().abandon(self.op) {
            debug!("Abandoned {}", self.op);
        }
    }
}

/// Bridge between the callback-driven native stack and async callers.
///
/// Operations submit a request to the native [`Manager`] and await the
/// matching [`Event`], which the event pump delivers via
/// [`Delegate::handle`]. Completion is tracked per operation key, so results
/// may arrive in any order. Read and write requests are dispatched to the
/// registered handlers against the shared attribute database.
#[derive(Debug)]
pub struct Delegate<M> {
    mgr: Arc<M>,
    db: Arc<Mutex<Db>>,
    st: Condvar<State>,
    subs: Mutex<Subscriptions>,
    io: Mutex<Handlers>,
    settle: Duration,
}

impl<M: Manager> Delegate<M> {
    /// Creates a delegate for the specified manager and attribute database.
    /// `settle` is the delay after stopping advertising.
    #[must_use]
    pub fn new(mgr: Arc<M>, db: Arc<Mutex<Db>>, settle: Duration) -> Self {
        Self {
            mgr,
            db,
            st: Condvar::default(),
            subs: Mutex::default(),
            io: Mutex::default(),
            settle,
        }
    }

    /// Returns the native manager.
    #[inline(always)]
    pub fn manager(&self) -> &Arc<M> {
        &self.mgr
    }

    /// Returns whether the native stack is powered on.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.st.lock().power.is_ready()
    }

    /// Returns the last reported power state.
    #[inline]
    #[must_use]
    pub fn power_state(&self) -> PowerState {
        self.st.lock().power
    }

    /// Waits until the native stack is powered on.
    pub async fn ready(&self) -> Result<()> {
        (self.st).wait(|st| {
            if st.power.is_ready() {
                Some(Ok(()))
            } else if st.closed {
                Some(Err(Error::Closed))
            } else {
                None
            }
        })
        .await
    }

    /// Publishes a service and waits for the native stack to confirm it.
    pub async fn add_service(&self, svc: &Service) -> Result<()> {
        let op = Op::AddService(svc.uuid());
        self.st.lock().begin(op)?;
        let _g = Abandon { st: &self.st, op };
        debug!("Adding service {}", svc.uuid());
        self.mgr.add_service(svc);
        self.st.wait(|st| st.poll(op)).await
    }

    /// Starts advertising and waits for the native stack to confirm it.
    pub async fn start_advertising(&self, adv: &Advertisement) -> Result<()> {
        let op = Op::StartAdvertising;
        self.st.lock().begin(op)?;
        let _g = Abandon { st: &self.st, op };
        debug!("Starting advertising as {:?}", adv.local_name);
        self.mgr.start_advertising(adv);
        self.st.wait(|st| st.poll(op)).await
    }

    /// Stops advertising and waits for the settle delay. The native stack
    /// does not confirm this operation.
    pub async fn stop_advertising(&self) {
        debug!("Stopping advertising");
        self.mgr.stop_advertising();
        tokio::time::sleep(self.settle).await;
    }

    /// Returns whether the native stack is advertising.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.mgr.is_advertising()
    }

    /// Sends the current value of a characteristic to all subscribers.
    /// Returns whether the native stack accepted the update.
    pub fn update_value(&self, char_uuid: Uuid) -> bool {
        let v = match self.db.lock().get_characteristic(char_uuid) {
            Some(c) => c.value().to_vec(),
            None => {
                warn!("Characteristic {char_uuid} not found for value update");
                return false;
            }
        };
        let ok = self.mgr.update_value(char_uuid, &v, None);
        if !ok {
            debug!("Value update for {char_uuid} was not accepted");
        }
        ok
    }

    /// Returns whether any central has subscribed to a characteristic.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.subs.lock().is_empty()
    }

    /// Returns a snapshot of the subscription table.
    #[inline]
    #[must_use]
    pub fn subscriptions(&self) -> Subscriptions {
        self.subs.lock().clone()
    }

    /// Returns whether both request handlers are registered.
    #[inline]
    pub(crate) fn has_handlers(&self) -> bool {
        self.io.lock().is_complete()
    }

    /// Sets the read request handler.
    #[inline]
    pub fn set_read_handler(&self, f: ReadFn) {
        self.io.lock().read = Some(f);
    }

    /// Sets the write request handler.
    #[inline]
    pub fn set_write_handler(&self, f: WriteFn) {
        self.io.lock().write = Some(f);
    }

    /// Receives native events until the channel is closed or `stop` is
    /// cancelled. Any waiters fail with [`Error::Closed`] afterwards.
    pub async fn serve(&self, mut events: UnboundedReceiver<Event>, stop: CancellationToken) {
        debug!("Event pump started");
        loop {
            let evt = tokio::select! {
                evt = events.recv() => evt,
                _ = stop.cancelled() => None,
            };
            let Some(evt) = evt else { break };
            self.handle(evt);
        }
        debug!("Event pump terminating");
        self.close();
    }

    /// Wakes all waiters and fails any further operations.
    pub(crate) fn close(&self) {
        let mut st = self.st.lock();
        st.closed = true;
        st.notify_all();
    }

    /// Handles a native event.
    pub fn handle(&self, evt: Event) {
        trace!("{evt:?}");
        match evt {
            Event::StateChanged(s) => {
                let mut st = self.st.lock();
                if st.power != s {
                    debug!("Power state changed: {:?} -> {s:?}", st.power);
                    st.power = s;
                    st.notify_all();
                }
            }
            Event::ServiceAdded { service, error } => self.service_added(&service, error),
            Event::AdvertisingStarted { error } => self.advertising_started(error),
            Event::Subscribed { central, char_uuid } => {
                self.subs.lock().subscribe(central, char_uuid);
            }
            Event::Unsubscribed { central, char_uuid } => {
                self.subs.lock().unsubscribe(central, char_uuid);
            }
            Event::Disconnected { central } => {
                debug!("Central {central} disconnected");
                self.subs.lock().remove_central(central);
            }
            Event::ReadyToUpdateSubscribers => debug!("Ready to update subscribers"),
            Event::ReadRequest(r) => self.read(&r),
            Event::WriteRequests(w) => self.write(&w),
        }
    }

    /// Completes an add service operation.
    fn service_added(&self, svc: &Service, err: Option<NativeError>) {
        let uuid = svc.uuid();
        let mut st = self.st.lock();
        let Some(c) = st.svcs.get_mut(&uuid) else {
            warn!("Unexpected service added event for {uuid}");
            return;
        };
        *c = match err {
            None => {
                info!("Service {uuid} added");
                for ch in svc.characteristics() {
                    debug!(
                        "|__ Characteristic <{}> [{}]",
                        ch.uuid(),
                        ch.props().labels().join(", ")
                    );
                }
                Completion::Succeeded
            }
            Some(e) => {
                error!("Failed to add service {uuid}: {e}");
                Completion::Failed(e)
            }
        };
        st.notify_all();
    }

    /// Completes a start advertising operation.
    fn advertising_started(&self, err: Option<NativeError>) {
        let mut st = self.st.lock();
        if st.adv.is_none() {
            warn!("Unexpected advertising started event");
            return;
        }
        st.adv = Some(match err {
            None => {
                info!("Advertising started");
                Completion::Succeeded
            }
            Some(e) => {
                error!("Failed to start advertising: {e}");
                Completion::Failed(e)
            }
        });
        st.notify_all();
    }

    /// Returns a handler context for the current subscription table.
    fn context(&self) -> Context {
        Context::new(self.subscriptions())
    }

    /// Sends value updates scheduled by a handler.
    fn flush(&self, cx: Context) {
        for u in cx.into_updates() {
            self.update_value(u);
        }
    }

    /// Responds to a read request.
    fn read(&self, r: &ReadReq) {
        let mut cx = self.context();
        match self.exec_read(r, &mut cx) {
            Ok(v) => self.mgr.respond(r.id, &v, Ok(())),
            Err(e) => self.mgr.respond(r.id, &[], Err(e)),
        }
        self.flush(cx);
    }

    /// Executes a read request, returning the value starting at the request
    /// offset.
    fn exec_read(
        &self,
        r: &ReadReq,
        cx: &mut Context,
    ) -> std::result::Result<Vec<u8>, ErrorCode> {
        let db = self.db.lock();
        let Some(c) = db.get_characteristic(r.char_uuid) else {
            warn!("Read from unknown characteristic {}", r.char_uuid);
            return Err(ErrorCode::AttributeNotFound);
        };
        let Some(read) = self.io.lock().read.clone() else {
            warn!("No read handler for {}", r.char_uuid);
            return Err(ErrorCode::RequestNotSupported);
        };
        let mut v = read.call(c, cx);
        if r.offset > v.len() {
            warn!(
                "Read offset {} past the end of {} ({} bytes)",
                r.offset,
                r.char_uuid,
                v.len()
            );
            return Err(ErrorCode::InvalidOffset);
        }
        v.drain(..r.offset);
        Ok(v)
    }

    /// Applies a batch of write requests and sends a single response for the
    /// first request.
    fn write(&self, reqs: &[WriteReq]) {
        let Some(first) = reqs.first() else {
            warn!("Empty write request batch");
            return;
        };
        let Some(write) = self.io.lock().write.clone() else {
            warn!("No write handler for {}", first.char_uuid);
            self.mgr.respond(first.id, &[], Err(ErrorCode::RequestNotSupported));
            return;
        };
        let mut cx = self.context();
        {
            let mut db = self.db.lock();
            for w in reqs {
                let Some(c) = db.get_characteristic_mut(w.char_uuid) else {
                    warn!("Write to unknown characteristic {}", w.char_uuid);
                    continue;
                };
                write.call(c, &w.value, &mut cx);
            }
        }
        // TODO: Report the first failed request instead of always succeeding
        self.mgr.respond(first.id, &[], Ok(()));
        self.flush(cx);
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;
    use tokio::time::timeout;

    use crate::gatt::{Characteristic, Perm, Prop};

    use crate::periph::mock::{self, Call, MockManager};
    use super::*;

    const SVC: Uuid = Uuid::from_u16(0x180F);
    const LVL: Uuid = Uuid::from_u16(0x2A19);
    const NAME: Uuid = Uuid::from_u16(0x2A00);
    const A: Central = Central(Uuid::from_u16(0xFFF1));
    const TICK: Duration = Duration::from_millis(50);

    fn delegate() -> (Delegate<MockManager>, Arc<MockManager>) {
        let mgr = MockManager::new();
        let mut db = Db::new();
        db.add_service(Service::new(SVC).with_characteristic(
            Characteristic::new(LVL, Prop::READ | Prop::NOTIFY, Perm::READ_WRITE)
                .with_value(b"hello".as_slice()),
        ))
        .unwrap();
        let d = Delegate::new(
            Arc::clone(&mgr),
            Arc::new(Mutex::new(db)),
            Duration::ZERO,
        );
        (d, mgr)
    }

    fn with_handlers(d: &Delegate<MockManager>) {
        d.set_read_handler(ReadFn::from(|c: &Characteristic, _: &mut Context| {
            c.value().to_vec()
        }));
        d.set_write_handler(WriteFn::from(
            |c: &mut Characteristic, v: &[u8], _: &mut Context| {
                c.set_value(v).unwrap();
            },
        ));
    }

    fn read(id: u64, char_uuid: Uuid, offset: usize) -> Event {
        Event::ReadRequest(ReadReq {
            id: RequestId(id),
            central: A,
            char_uuid,
            offset,
        })
    }

    fn write(id: u64, char_uuid: Uuid, v: &[u8]) -> WriteReq {
        WriteReq {
            id: RequestId(id),
            central: A,
            char_uuid,
            value: v.to_vec(),
        }
    }

    #[tokio::test]
    async fn readiness() {
        let (d, _) = delegate();
        assert!(!d.is_ready());
        d.handle(Event::StateChanged(PowerState::Unsupported));
        assert!(!d.is_ready());
        let (r, _) = tokio::join!(d.ready(), async {
            tokio::task::yield_now().await;
            d.handle(Event::StateChanged(PowerState::PoweredOn));
        });
        r.unwrap();
        assert!(d.is_ready());
        d.handle(Event::StateChanged(PowerState::PoweredOff));
        assert!(!d.is_ready());
        assert_eq!(d.power_state(), PowerState::PoweredOff);
    }

    #[tokio::test]
    async fn add_service() {
        let (d, mgr) = delegate();
        let svc = Service::new(SVC);
        let (r, _) = tokio::join!(d.add_service(&svc), async {
            tokio::task::yield_now().await;
            assert_matches!(
                d.add_service(&svc).await,
                Err(Error::OperationPending(Op::AddService(u))) if u == SVC
            );
            let reported = Service::remote(SVC, true).with_characteristic(
                Characteristic::remote(LVL, Prop::READ, Perm::READABLE, None),
            );
            d.handle(Event::ServiceAdded {
                service: reported,
                error: None,
            });
        });
        r.unwrap();
        assert_eq!(mgr.calls(), [Call::AddService(SVC)]);
    }

    #[tokio::test]
    async fn add_service_error() {
        let (d, _) = delegate();
        let svc = Service::new(SVC);
        let (r, _) = tokio::join!(d.add_service(&svc), async {
            tokio::task::yield_now().await;
            d.handle(Event::ServiceAdded {
                service: Service::remote(SVC, true),
                error: Some(NativeError::new(3, "busy")),
            });
        });
        assert_matches!(
            r,
            Err(Error::NativeOperation { op: Op::AddService(u), ref err })
                if u == SVC && err.code == 3
        );

        // Unrelated completions are ignored and a failed slot may be retried
        d.handle(Event::ServiceAdded {
            service: Service::remote(NAME, true),
            error: None,
        });
        let (r, _) = tokio::join!(d.add_service(&svc), async {
            tokio::task::yield_now().await;
            d.handle(Event::ServiceAdded {
                service: Service::remote(SVC, true),
                error: None,
            });
        });
        r.unwrap();
    }

    #[tokio::test]
    async fn start_advertising() {
        let (d, mgr) = delegate();
        let adv = Advertisement {
            local_name: "Test".to_owned(),
            service_uuids: vec![SVC],
        };
        let (r, _) = tokio::join!(d.start_advertising(&adv), async {
            tokio::task::yield_now().await;
            assert_matches!(
                d.start_advertising(&adv).await,
                Err(Error::OperationPending(Op::StartAdvertising))
            );
            d.handle(Event::AdvertisingStarted {
                error: Some(NativeError::new(1, "unsupported")),
            });
        });
        assert_matches!(
            r,
            Err(Error::NativeOperation {
                op: Op::StartAdvertising,
                ..
            })
        );
        assert_eq!(mgr.calls(), [Call::StartAdvertising(adv)]);

        d.stop_advertising().await;
        assert!(!d.is_advertising());
        assert_eq!(mgr.calls().last(), Some(&Call::StopAdvertising));
    }

    #[tokio::test]
    async fn closed() {
        let (d, _) = delegate();
        let svc = Service::new(SVC);
        let (a, b, _) = tokio::join!(d.ready(), d.add_service(&svc), async {
            tokio::task::yield_now().await;
            d.close();
        });
        assert_matches!(a, Err(Error::Closed));
        assert_matches!(b, Err(Error::Closed));
        assert_matches!(d.add_service(&svc).await, Err(Error::Closed));
    }

    #[tokio::test]
    async fn serve() {
        let (mgr, tx, rx) = mock::channel();
        let d = Arc::new(Delegate::new(mgr, Arc::default(), Duration::ZERO));
        let pump = tokio::spawn({
            let d = Arc::clone(&d);
            async move { d.serve(rx, CancellationToken::new()).await }
        });
        tx.send(Event::StateChanged(PowerState::PoweredOn)).unwrap();
        d.ready().await.unwrap();
        drop(tx);
        pump.await.unwrap();
        assert_matches!(
            d.start_advertising(&Advertisement::default()).await,
            Err(Error::Closed)
        );
    }

    #[test]
    fn read_request() {
        let (d, mgr) = delegate();
        d.handle(read(1, LVL, 0));
        with_handlers(&d);
        d.handle(read(2, LVL, 0));
        d.handle(read(3, LVL, 2));
        d.handle(read(4, LVL, 5));
        d.handle(read(5, LVL, 6));
        d.handle(read(6, NAME, 0));
        assert_eq!(
            mgr.calls(),
            [
                Call::Respond(RequestId(1), vec![], Err(ErrorCode::RequestNotSupported)),
                Call::Respond(RequestId(2), b"hello".to_vec(), Ok(())),
                Call::Respond(RequestId(3), b"llo".to_vec(), Ok(())),
                Call::Respond(RequestId(4), vec![], Ok(())),
                Call::Respond(RequestId(5), vec![], Err(ErrorCode::InvalidOffset)),
                Call::Respond(RequestId(6), vec![], Err(ErrorCode::AttributeNotFound)),
            ]
        );
    }

    #[test]
    fn write_requests() {
        let (d, mgr) = delegate();
        d.handle(Event::WriteRequests(vec![write(6, LVL, b"z")]));
        with_handlers(&d);
        d.handle(Event::WriteRequests(vec![
            write(7, NAME, b"x"),
            write(8, LVL, b"a"),
            write(9, LVL, b"bc"),
        ]));
        d.handle(Event::WriteRequests(Vec::new()));
        assert_eq!(
            mgr.calls(),
            [
                Call::Respond(RequestId(6), vec![], Err(ErrorCode::RequestNotSupported)),
                Call::Respond(RequestId(7), vec![], Ok(())),
            ]
        );
        assert_eq!(d.db.lock().get_characteristic(LVL).unwrap().value(), b"bc");
    }

    #[test]
    fn write_notifies() {
        let (d, mgr) = delegate();
        d.set_read_handler(ReadFn::from(|c: &Characteristic, cx: &mut Context| {
            if cx.is_connected() {
                cx.update_value(c.uuid());
            }
            c.value().to_vec()
        }));
        d.set_write_handler(WriteFn::from(
            |c: &mut Characteristic, v: &[u8], cx: &mut Context| {
                c.set_value(v).unwrap();
                if !cx.subscribers(c.uuid()).is_empty() {
                    cx.update_value(c.uuid());
                }
            },
        ));
        d.handle(Event::WriteRequests(vec![write(1, LVL, b"a")]));
        d.handle(read(2, LVL, 0));
        d.handle(Event::Subscribed {
            central: A,
            char_uuid: LVL,
        });
        d.handle(Event::WriteRequests(vec![write(3, LVL, b"b"), write(4, LVL, b"c")]));
        d.handle(read(5, LVL, 0));
        assert_eq!(
            mgr.calls(),
            [
                Call::Respond(RequestId(1), vec![], Ok(())),
                Call::Respond(RequestId(2), b"a".to_vec(), Ok(())),
                Call::Respond(RequestId(3), vec![], Ok(())),
                Call::UpdateValue(LVL, b"c".to_vec()),
                Call::Respond(RequestId(5), b"c".to_vec(), Ok(())),
                Call::UpdateValue(LVL, b"c".to_vec()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_operations() {
        let (d, mgr) = delegate();
        let svc = Service::new(SVC);
        let adv = Advertisement::default();
        assert!(timeout(TICK, d.add_service(&svc)).await.is_err());
        assert!(timeout(TICK, d.start_advertising(&adv)).await.is_err());

        // Late completions of abandoned operations are ignored
        d.handle(Event::AdvertisingStarted {
            error: Some(NativeError::new(1, "late")),
        });
        let (a, b, _) = tokio::join!(d.add_service(&svc), d.start_advertising(&adv), async {
            tokio::task::yield_now().await;
            d.handle(Event::ServiceAdded {
                service: Service::remote(SVC, true),
                error: None,
            });
            d.handle(Event::AdvertisingStarted { error: None });
        });
        a.unwrap();
        b.unwrap();
        assert_eq!(
            mgr.calls(),
            [
                Call::AddService(SVC),
                Call::StartAdvertising(adv.clone()),
                Call::AddService(SVC),
                Call::StartAdvertising(adv),
            ]
        );
    }

    #[test]
    fn subscriptions() {
        let (d, mgr) = delegate();
        assert!(!d.is_connected());
        d.handle(Event::Subscribed {
            central: A,
            char_uuid: LVL,
        });
        d.handle(Event::Unsubscribed {
            central: A,
            char_uuid: LVL,
        });
        assert!(d.is_connected());
        assert_eq!(d.subscriptions().subscriptions(A), Some(&[] as &[Uuid]));
        d.handle(Event::Disconnected { central: A });
        assert!(!d.is_connected());

        assert!(d.update_value(LVL));
        mgr.set_accept(false);
        assert!(!d.update_value(LVL));
        assert!(!d.update_value(NAME));
        assert_eq!(
            mgr.calls(),
            [
                Call::UpdateValue(LVL, b"hello".to_vec()),
                Call::UpdateValue(LVL, b"hello".to_vec()),
            ]
        );
    }
}
