use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::gap::Uuid;
use crate::gatt::{Characteristic, Db, Service};
use crate::periph::{Advertisement, Context, Delegate, Event, Manager, ReadFn, WriteFn};
use crate::{Error, Result};

/// Server configuration.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// Advertised local name.
    pub name: String,
    /// Delay after stopping advertising before the native stack is assumed to
    /// have stopped.
    pub settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            settle: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Creates a default configuration with the specified advertised name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the stop advertising settle delay.
    #[inline]
    #[must_use]
    pub fn with_settle(mut self, d: Duration) -> Self {
        self.settle = d;
        self
    }
}

/// GATT server running in the peripheral role.
///
/// Services are registered locally and published to the native stack by
/// [`Server::start`], which then starts advertising. Native events are
/// received by a background task that is spawned on the first start and
/// stopped when the server is dropped.
#[derive(Debug)]
pub struct Server<M: Manager> {
    cfg: Config,
    db: Arc<Mutex<Db>>,
    dlg: Arc<Delegate<M>>,
    events: Option<UnboundedReceiver<Event>>,
    pump: Option<EventPump>,
    published: HashSet<Uuid>,
}

impl<M: Manager> Server<M> {
    /// Creates a server for the specified native manager and its event
    /// channel.
    #[must_use]
    pub fn new(cfg: Config, mgr: Arc<M>, events: UnboundedReceiver<Event>) -> Self {
        let db = Arc::new(Mutex::new(Db::new()));
        let dlg = Arc::new(Delegate::new(mgr, Arc::clone(&db), cfg.settle));
        Self {
            cfg,
            db,
            dlg,
            events: Some(events),
            pump: None,
            published: HashSet::new(),
        }
    }

    /// Returns the server configuration.
    #[inline(always)]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the advertised local name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    /// Returns the delegate that bridges the native stack.
    #[inline(always)]
    #[must_use]
    pub const fn delegate(&self) -> &Arc<Delegate<M>> {
        &self.dlg
    }

    /// Registers a service. Services registered after [`Server::start`] are
    /// published by the next call to `start`.
    pub fn add_service(&self, svc: Service) -> Result<()> {
        self.db.lock().add_service(svc)
    }

    /// Adds a characteristic to a registered service that has not been
    /// published yet.
    pub fn add_characteristic(&self, svc: Uuid, c: Characteristic) -> Result<()> {
        if self.published.contains(&svc) {
            warn!("Cannot add {} to published service {svc}", c.uuid());
            return Err(Error::Published(svc));
        }
        self.db.lock().add_characteristic(svc, c)
    }

    /// Sets the read request handler. The handler returns the full value of
    /// the characteristic. It runs on the event task while the attribute
    /// database is locked, so it reaches the server only through the
    /// [`Context`].
    pub fn read_request_handler(
        &self,
        f: impl Fn(&Characteristic, &mut Context) -> Vec<u8> + Send + Sync + 'static,
    ) {
        self.dlg.set_read_handler(ReadFn::from(f));
    }

    /// Sets the write request handler. The handler receives the stored
    /// characteristic and the written value, and may schedule a value update
    /// via [`Context::update_value`]. It runs under the same constraints as
    /// the read handler.
    pub fn write_request_handler(
        &self,
        f: impl Fn(&mut Characteristic, &[u8], &mut Context) + Send + Sync + 'static,
    ) {
        self.dlg.set_write_handler(WriteFn::from(f));
    }

    /// Publishes all unpublished services and starts advertising. Both
    /// request handlers must be set. Waits for the native stack to become
    /// ready first.
    pub async fn start(&mut self) -> Result<()> {
        if !self.dlg.has_handlers() {
            return Err(Error::Configuration(
                "read and write request handlers must be set",
            ));
        }
        self.spawn_pump();
        self.dlg.ready().await?;
        let svcs: Vec<Service> = (self.db.lock().services())
            .filter(|s| !self.published.contains(&s.uuid()))
            .cloned()
            .collect();
        for s in svcs {
            self.dlg.add_service(&s).await?;
            self.published.insert(s.uuid());
        }
        let adv = Advertisement {
            local_name: self.cfg.name.clone(),
            service_uuids: self.db.lock().service_uuids(),
        };
        self.dlg.start_advertising(&adv).await?;
        info!("Server {:?} started", self.cfg.name);
        Ok(())
    }

    /// Stops advertising. Published services remain registered with the
    /// native stack.
    pub async fn stop(&self) {
        self.dlg.stop_advertising().await;
        info!("Server {:?} stopped", self.cfg.name);
    }

    /// Stops advertising and the event task.
    pub async fn shutdown(mut self) {
        if self.dlg.is_advertising() {
            self.stop().await;
        }
        if let Some(p) = self.pump.take() {
            p.stop().await;
        }
    }

    /// Returns whether the native stack is powered on.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.dlg.is_ready()
    }

    /// Returns whether any central has subscribed to a characteristic.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.dlg.is_connected()
    }

    /// Returns whether the native stack is advertising.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.dlg.is_advertising()
    }

    /// Sets the value of a local characteristic without notifying
    /// subscribers.
    pub fn set_value(&self, char_uuid: Uuid, v: impl Into<Vec<u8>>) -> Result<()> {
        let mut db = self.db.lock();
        let c = (db.get_characteristic_mut(char_uuid))
            .ok_or(Error::CharacteristicNotFound(char_uuid))?;
        c.set_value(v)
    }

    /// Returns a copy of the characteristic value.
    #[must_use]
    pub fn value(&self, char_uuid: Uuid) -> Option<Vec<u8>> {
        (self.db.lock().get_characteristic(char_uuid)).map(|c| c.value().to_vec())
    }

    /// Calls `f` with the locked attribute database.
    pub fn with_db<R>(&self, f: impl FnOnce(&Db) -> R) -> R {
        f(&*self.db.lock())
    }

    /// Sends the current characteristic value to subscribed centrals. Returns
    /// `false` if the characteristic does not belong to the service or if the
    /// native stack did not accept the update.
    pub fn update_value(&self, svc: Uuid, char_uuid: Uuid) -> bool {
        let owner = (self.db.lock().service_of(char_uuid)).map(Service::uuid);
        if owner != Some(svc) {
            warn!("Characteristic {char_uuid} not found in service {svc}");
            return false;
        }
        self.dlg.update_value(char_uuid)
    }

    /// Spawns the event task if it is not running.
    fn spawn_pump(&mut self) {
        let Some(rx) = self.events.take() else { return };
        debug!("Spawning event task");
        self.pump = Some(EventPump::new(Arc::clone(&self.dlg), rx));
    }
}

/// Task that delivers native events to the delegate. The task is cancelled
/// when this handle is dropped.
#[derive(Debug)]
struct EventPump {
    h: tokio::task::JoinHandle<()>,
    c: CancellationToken,
    _g: tokio_util::sync::DropGuard,
}

impl EventPump {
    fn new<M: Manager>(dlg: Arc<Delegate<M>>, rx: UnboundedReceiver<Event>) -> Self {
        let c = CancellationToken::new();
        let stop = c.clone();
        Self {
            h: tokio::spawn(async move { dlg.serve(rx, stop).await }),
            c: c.clone(),
            _g: c.drop_guard(),
        }
    }

    /// Stops event processing.
    async fn stop(self) {
        self.c.cancel();
        if let Err(e) = self.h.await {
            error!("Event task failed: {e}");
        }
    }
}
