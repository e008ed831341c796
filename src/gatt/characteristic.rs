use tracing::warn;

use crate::gap::Uuid;
use crate::{Error, Result};

use super::*;

/// Attribute ownership. Local attributes are created by the application and
/// have mutable values. Remote attributes are snapshots reported by the native
/// stack and are never modified.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Origin {
    #[default]
    Local,
    Remote,
}

impl Origin {
    /// Returns whether attribute values with this origin may be changed.
    #[inline(always)]
    #[must_use]
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Characteristic descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Descriptor {
    uuid: Uuid,
    value: Option<Vec<u8>>,
    origin: Origin,
}

impl Descriptor {
    /// Creates a local descriptor.
    #[inline]
    #[must_use]
    pub fn new(uuid: Uuid, value: Option<Vec<u8>>) -> Self {
        Self {
            uuid,
            value,
            origin: Origin::Local,
        }
    }

    /// Creates a descriptor as reported by the native stack.
    #[inline]
    #[must_use]
    pub fn remote(uuid: Uuid, value: Option<Vec<u8>>) -> Self {
        Self {
            uuid,
            value,
            origin: Origin::Remote,
        }
    }

    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the descriptor value, which is empty if unset.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.value.as_deref().unwrap_or_default()
    }

    #[inline(always)]
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }
}

/// GATT characteristic. Identity (UUID, properties, and permissions) is fixed
/// at construction; the value of a local characteristic remains mutable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Characteristic {
    uuid: Uuid,
    props: Prop,
    perms: Perm,
    value: Option<Vec<u8>>,
    descs: Vec<Descriptor>,
    origin: Origin,
}

impl Characteristic {
    /// Creates a local characteristic without a value.
    #[inline]
    #[must_use]
    pub fn new(uuid: Uuid, props: Prop, perms: Perm) -> Self {
        Self {
            uuid,
            props,
            perms,
            value: None,
            descs: Vec::new(),
            origin: Origin::Local,
        }
    }

    /// Creates a characteristic as reported by the native stack.
    #[inline]
    #[must_use]
    pub fn remote(uuid: Uuid, props: Prop, perms: Perm, value: Option<Vec<u8>>) -> Self {
        Self {
            value,
            origin: Origin::Remote,
            ..Self::new(uuid, props, perms)
        }
    }

    /// Sets the initial value.
    #[inline]
    #[must_use]
    pub fn with_value(mut self, v: impl Into<Vec<u8>>) -> Self {
        self.value = Some(v.into());
        self
    }

    /// Adds a descriptor.
    #[inline]
    #[must_use]
    pub fn with_descriptor(mut self, d: Descriptor) -> Self {
        self.add_descriptor(d);
        self
    }

    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[inline(always)]
    #[must_use]
    pub const fn props(&self) -> Prop {
        self.props
    }

    #[inline(always)]
    #[must_use]
    pub const fn perms(&self) -> Perm {
        self.perms
    }

    #[inline(always)]
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Returns the current value, which is empty if unset.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &[u8] {
        self.value.as_deref().unwrap_or_default()
    }

    /// Returns whether a value was ever set.
    #[inline]
    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Replaces the value of a local characteristic.
    pub fn set_value(&mut self, v: impl Into<Vec<u8>>) -> Result<()> {
        if !self.origin.is_mutable() {
            return Err(Error::Immutable(self.uuid));
        }
        self.value = Some(v.into());
        Ok(())
    }

    /// Returns descriptors in insertion order.
    #[inline]
    #[must_use]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descs
    }

    /// Returns the descriptor with the specified UUID.
    #[must_use]
    pub fn get_descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descs.iter().find(|d| d.uuid == uuid)
    }

    /// Adds a descriptor. Returns `false` without modifying the characteristic
    /// if a descriptor with the same UUID is already present.
    pub fn add_descriptor(&mut self, d: Descriptor) -> bool {
        if self.get_descriptor(d.uuid).is_some() {
            warn!("Descriptor {} already added to {}", d.uuid, self.uuid);
            return false;
        }
        self.descs.push(d);
        true
    }
}
