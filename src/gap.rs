//! Generic Access Profile types shared by the attribute model and the native
//! stack interface.

pub use uuid::*;

mod uuid;
