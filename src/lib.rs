//! Bluetooth LE peripheral GATT server.
//!
//! Exposes the peripheral role (a local GATT server advertising its services
//! to remote centrals) as an async API on top of a native Bluetooth stack that
//! reports every result through callbacks. The native stack is reached via the
//! [`periph::Manager`] trait and its callbacks are delivered as
//! [`periph::Event`]s.

use gap::Uuid;
use periph::{NativeError, Op};

pub use server::*;

pub mod att;
pub mod gap;
pub mod gatt;
pub mod periph;
mod server;
mod util;

/// Error type returned by the server and the attribute database.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("service {0} is already registered")]
    DuplicateService(Uuid),
    #[error("characteristic {0} is already registered")]
    DuplicateCharacteristic(Uuid),
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("service {0} is already published")]
    Published(Uuid),
    #[error("{op} failed: {err}")]
    NativeOperation {
        op: Op,
        #[source]
        err: NativeError,
    },
    #[error("configuration error: {0}")]
    Configuration(&'static str),
    #[error("{0} is already in progress")]
    OperationPending(Op),
    #[error("invalid UUID {0:?}")]
    InvalidUuid(String),
    #[error("attribute {0} is immutable")]
    Immutable(Uuid),
    #[error("native event channel closed")]
    Closed,
}

/// Common result type.
pub type Result<T> = std::result::Result<T, Error>;
