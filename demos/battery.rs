#![allow(unused_crate_dependencies)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use ble_peripheral::att::IoResult;
use ble_peripheral::gap::Uuid;
use ble_peripheral::gatt::{Characteristic, Descriptor, Perm, Prop, Service};
use ble_peripheral::periph::{
    Advertisement, Central, Event, Manager, PowerState, ReadReq, RequestId, WriteReq,
};
use ble_peripheral::{Config, Server};

const BATTERY_SERVICE: Uuid = Uuid::from_u16(0x180F);
const BATTERY_LEVEL: Uuid = Uuid::from_u16(0x2A19);
const USER_DESCRIPTION: Uuid = Uuid::from_u16(0x2901);

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// Advertised local name.
    #[arg(short, long, default_value = "Battery")]
    name: String,

    /// Number of battery level notifications to send.
    #[arg(short, long, default_value_t = 5)]
    count: u8,

    /// Delay between notifications in milliseconds.
    #[arg(short, long, default_value_t = 200)]
    interval: u64,
}

/// In-process stack that confirms every operation and logs outgoing traffic.
#[derive(Debug)]
struct Loopback {
    tx: mpsc::UnboundedSender<Event>,
    advertising: AtomicBool,
}

impl Loopback {
    fn send(&self, evt: Event) {
        let _ = self.tx.send(evt);
    }
}

impl Manager for Loopback {
    fn add_service(&self, svc: &Service) {
        let mut remote = Service::remote(svc.uuid(), svc.is_primary());
        for c in svc.characteristics() {
            let rc = Characteristic::remote(c.uuid(), c.props(), c.perms(), None);
            remote.add_characteristic(rc);
        }
        self.send(Event::ServiceAdded {
            service: remote,
            error: None,
        });
    }

    fn start_advertising(&self, adv: &Advertisement) {
        info!("Advertising {:?} with {:?}", adv.local_name, adv.service_uuids);
        self.advertising.store(true, Ordering::Relaxed);
        self.send(Event::AdvertisingStarted { error: None });
    }

    fn stop_advertising(&self) {
        self.advertising.store(false, Ordering::Relaxed);
    }

    fn is_advertising(&self) -> bool {
        self.advertising.load(Ordering::Relaxed)
    }

    fn update_value(&self, char_uuid: Uuid, value: &[u8], _: Option<&[Central]>) -> bool {
        info!("Notify {char_uuid}: {value:02X?}");
        true
    }

    fn respond(&self, id: RequestId, value: &[u8], r: IoResult) {
        info!("Respond {id:?}: {value:02X?} {r:?}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let (tx, rx) = mpsc::unbounded_channel();
    let stack = Arc::new(Loopback {
        tx: tx.clone(),
        advertising: AtomicBool::new(false),
    });
    let mut srv = Server::new(Config::new(args.name), stack, rx);
    srv.add_service(
        Service::new(BATTERY_SERVICE).with_characteristic(
            Characteristic::new(BATTERY_LEVEL, Prop::READ | Prop::NOTIFY, Perm::READABLE)
                .with_value(vec![100])
                .with_descriptor(Descriptor::new(
                    USER_DESCRIPTION,
                    Some(b"Battery Level".to_vec()),
                )),
        ),
    )?;
    srv.with_db(|db| db.dump());
    srv.read_request_handler(|c, _| c.value().to_vec());
    srv.write_request_handler(|c, v, cx| match c.set_value(v) {
        Ok(()) => cx.update_value(c.uuid()),
        Err(e) => tracing::warn!("{e}"),
    });

    tx.send(Event::StateChanged(PowerState::PoweredOn))?;
    srv.start().await?;

    // Simulated central
    let central = Central("6E400001-B5A3-F393-E0A9-E50E24DCCA9E".parse()?);
    tx.send(Event::Subscribed {
        central,
        char_uuid: BATTERY_LEVEL,
    })?;
    tx.send(Event::ReadRequest(ReadReq {
        id: RequestId(1),
        central,
        char_uuid: BATTERY_LEVEL,
        offset: 0,
    }))?;
    tx.send(Event::WriteRequests(vec![WriteReq {
        id: RequestId(2),
        central,
        char_uuid: BATTERY_LEVEL,
        value: vec![99],
    }]))?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    info!("Connected: {}", srv.is_connected());

    let mut level = (srv.value(BATTERY_LEVEL))
        .and_then(|v| v.first().copied())
        .unwrap_or(100);
    for _ in 0..args.count {
        level = level.saturating_sub(1);
        srv.set_value(BATTERY_LEVEL, vec![level])?;
        srv.update_value(BATTERY_SERVICE, BATTERY_LEVEL);
        tokio::time::sleep(Duration::from_millis(args.interval)).await;
    }
    srv.shutdown().await;
    Ok(())
}
