use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::gap::Uuid;
use crate::gatt::Characteristic;
use crate::util::name_of;

use super::{Central, Subscriptions};

/// Server state available to request handlers.
///
/// Handlers run on the event task while the attribute database is locked.
/// Value updates requested through the context are sent to subscribers after
/// the handler returns and the request has been answered.
#[derive(Debug)]
pub struct Context {
    subs: Subscriptions,
    updates: SmallVec<[Uuid; 2]>,
}

impl Context {
    #[inline]
    pub(crate) fn new(subs: Subscriptions) -> Self {
        Self {
            subs,
            updates: SmallVec::new(),
        }
    }

    /// Returns whether any central has subscribed to a characteristic.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.subs.is_empty()
    }

    /// Returns the subscription table as of the start of the request.
    #[inline(always)]
    #[must_use]
    pub const fn subscriptions(&self) -> &Subscriptions {
        &self.subs
    }

    /// Returns the centrals subscribed to a characteristic.
    #[inline]
    #[must_use]
    pub fn subscribers(&self, char_uuid: Uuid) -> Vec<Central> {
        self.subs.subscribers(char_uuid)
    }

    /// Schedules the stored value of a characteristic to be sent to its
    /// subscribers once the handler returns.
    pub fn update_value(&mut self, char_uuid: Uuid) {
        if !self.updates.contains(&char_uuid) {
            self.updates.push(char_uuid);
        }
    }

    /// Returns the scheduled value updates.
    #[inline]
    pub(crate) fn into_updates(self) -> SmallVec<[Uuid; 2]> {
        self.updates
    }
}

/// Characteristic read callback. Returns the full characteristic value; the
/// request offset is applied by the caller.
#[derive(Clone)]
#[repr(transparent)]
pub struct ReadFn(Arc<dyn Fn(&Characteristic, &mut Context) -> Vec<u8> + Send + Sync>);

impl ReadFn {
    #[inline(always)]
    pub(crate) fn call(&self, c: &Characteristic, cx: &mut Context) -> Vec<u8> {
        (self.0)(c, cx)
    }
}

impl Debug for ReadFn {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple(name_of!(ReadFn)).field(&Arc::as_ptr(&self.0))).finish()
    }
}

impl<T> From<T> for ReadFn
where
    T: Fn(&Characteristic, &mut Context) -> Vec<u8> + Send + Sync + 'static,
{
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Characteristic write callback. Receives mutable access to the stored
/// characteristic and the written value.
#[derive(Clone)]
#[repr(transparent)]
pub struct WriteFn(Arc<dyn Fn(&mut Characteristic, &[u8], &mut Context) + Send + Sync>);

impl WriteFn {
    #[inline(always)]
    pub(crate) fn call(&self, c: &mut Characteristic, v: &[u8], cx: &mut Context) {
        (self.0)(c, v, cx);
    }
}

impl Debug for WriteFn {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple(name_of!(WriteFn)).field(&Arc::as_ptr(&self.0))).finish()
    }
}

impl<T> From<T> for WriteFn
where
    T: Fn(&mut Characteristic, &[u8], &mut Context) + Send + Sync + 'static,
{
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Registered request handlers.
#[derive(Clone, Debug, Default)]
pub(crate) struct Handlers {
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
}

impl Handlers {
    /// Returns whether both handlers are set.
    #[inline]
    pub const fn is_complete(&self) -> bool {
        self.read.is_some() && self.write.is_some()
    }
}
