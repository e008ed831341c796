use std::fmt::{Display, Formatter};

use crate::att::IoResult;
use crate::gap::Uuid;
use crate::gatt::Service;

/// Native peripheral manager.
///
/// Calls into the platform Bluetooth stack. Every method must return without
/// waiting for the stack. Results of asynchronous operations are delivered
/// later as [`Event`]s, typically from the platform run loop through an
/// unbounded channel.
pub trait Manager: Send + Sync + 'static {
    /// Publishes a service. Completion is reported by
    /// [`Event::ServiceAdded`].
    fn add_service(&self, svc: &Service);

    /// Starts advertising. Completion is reported by
    /// [`Event::AdvertisingStarted`].
    fn start_advertising(&self, adv: &Advertisement);

    /// Stops advertising. There is no completion event.
    fn stop_advertising(&self);

    /// Returns whether the stack is currently advertising.
    fn is_advertising(&self) -> bool;

    /// Sends a characteristic value to subscribed centrals, or only to
    /// `centrals` if specified. Returns whether the update was accepted for
    /// delivery, which does not guarantee that any central received it.
    fn update_value(&self, char_uuid: Uuid, value: &[u8], centrals: Option<&[Central]>) -> bool;

    /// Completes a read or write request. `value` is empty for writes and
    /// failed reads.
    fn respond(&self, id: RequestId, value: &[u8], r: IoResult);
}

/// Power state of the native stack.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum PowerState {
    Unknown = 0,
    Resetting = 1,
    Unsupported = 2,
    Unauthorized = 3,
    PoweredOff = 4,
    PoweredOn = 5,
}

impl PowerState {
    /// Returns whether the stack can accept requests.
    #[inline(always)]
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::PoweredOn)
    }
}

impl Default for PowerState {
    #[inline]
    fn default() -> Self {
        Self::Unknown
    }
}

/// Remote central identifier assigned by the native stack.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Central(pub Uuid);

impl Display for Central {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Opaque native request handle used to complete a read or write request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct RequestId(pub u64);

/// Advertisement parameters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Advertisement {
    /// Advertised local name.
    pub local_name: String,
    /// Advertised service UUIDs.
    pub service_uuids: Vec<Uuid>,
}

/// Error reported by the native stack.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("native error {code}: {message}")]
pub struct NativeError {
    pub code: i64,
    pub message: String,
}

impl NativeError {
    #[inline]
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Inbound read request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadReq {
    pub id: RequestId,
    pub central: Central,
    pub char_uuid: Uuid,
    /// Value offset for long reads.
    pub offset: usize,
}

/// One inbound write request from a batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteReq {
    pub id: RequestId,
    pub central: Central,
    pub char_uuid: Uuid,
    pub value: Vec<u8>,
}

/// Native stack event.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// Power state changed.
    StateChanged(PowerState),
    /// Service publishing completed. `service` is the stack's view of the
    /// published service.
    ServiceAdded {
        service: Service,
        error: Option<NativeError>,
    },
    /// Advertising start completed.
    AdvertisingStarted { error: Option<NativeError> },
    /// Central subscribed to characteristic notifications or indications.
    Subscribed { central: Central, char_uuid: Uuid },
    /// Central unsubscribed from a characteristic.
    Unsubscribed { central: Central, char_uuid: Uuid },
    /// Central disconnected. Not all stacks report this.
    Disconnected { central: Central },
    /// Transmit queue has space for more value updates.
    ReadyToUpdateSubscribers,
    /// Characteristic read request.
    ReadRequest(ReadReq),
    /// Batch of characteristic write requests that must be completed with a
    /// single response.
    WriteRequests(Vec<WriteReq>),
}
