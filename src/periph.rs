//! Peripheral role bridge to a callback-driven native Bluetooth stack.
//!
//! The native stack is reached through the [`Manager`] trait and reports
//! results and requests as [`Event`]s. [`Delegate`] turns those events into
//! awaitable operation results and dispatches attribute requests.

pub use {delegate::*, io::*, native::*, subs::*};

mod delegate;
mod io;
#[cfg(test)]
pub(crate) mod mock;
mod native;
mod subs;
