//! Generic Attribute Profile ([Vol 3] Part G) data model.
//!
//! Services, characteristics, and descriptors are built by the application
//! and registered in a [`Db`] before the server starts. Once published, their
//! identity is fixed, but characteristic values remain mutable.

pub use {characteristic::*, consts::*, db::*, service::*};

mod characteristic;
mod consts;
mod db;
mod service;
