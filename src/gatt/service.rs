use tracing::warn;

use crate::gap::Uuid;

use super::*;

/// GATT service containing characteristics in insertion order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Service {
    uuid: Uuid,
    primary: bool,
    chars: Vec<Characteristic>,
    origin: Origin,
}

impl Service {
    /// Creates a local primary service.
    #[inline]
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            primary: true,
            chars: Vec::new(),
            origin: Origin::Local,
        }
    }

    /// Creates a local secondary service.
    #[inline]
    #[must_use]
    pub fn secondary(uuid: Uuid) -> Self {
        Self {
            primary: false,
            ..Self::new(uuid)
        }
    }

    /// Creates a service as reported by the native stack.
    #[inline]
    #[must_use]
    pub fn remote(uuid: Uuid, primary: bool) -> Self {
        Self {
            uuid,
            primary,
            chars: Vec::new(),
            origin: Origin::Remote,
        }
    }

    /// Adds a characteristic.
    #[inline]
    #[must_use]
    pub fn with_characteristic(mut self, c: Characteristic) -> Self {
        self.add_characteristic(c);
        self
    }

    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.primary
    }

    #[inline(always)]
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Returns characteristics in insertion order.
    #[inline]
    #[must_use]
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.chars
    }

    /// Returns the characteristic with the specified UUID.
    #[must_use]
    pub fn get_characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.chars.iter().find(|c| c.uuid() == uuid)
    }

    /// Adds a characteristic. Adding a characteristic whose UUID is already
    /// present is a no-op that returns `false`.
    pub fn add_characteristic(&mut self, c: Characteristic) -> bool {
        if self.get_characteristic(c.uuid()).is_some() {
            warn!(
                "Characteristic {} already added to service {}",
                c.uuid(),
                self.uuid
            );
            return false;
        }
        if !self.origin.is_mutable() {
            warn!(
                "Adding characteristic {} to remote service {} only updates the local view",
                c.uuid(),
                self.uuid
            );
        }
        self.chars.push(c);
        true
    }

    /// Returns mutable access to characteristic values. The slice length
    /// cannot change, which keeps database indices valid.
    #[inline]
    pub(super) fn characteristics_mut(&mut self) -> &mut [Characteristic] {
        &mut self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVC: Uuid = Uuid::from_u16(0x180F);
    const LVL: Uuid = Uuid::from_u16(0x2A19);

    #[test]
    fn duplicate_add_is_noop() {
        let c = Characteristic::new(LVL, Prop::READ | Prop::NOTIFY, Perm::READABLE);
        let mut s = Service::new(SVC);
        assert!(s.is_primary());
        assert!(s.add_characteristic(c.clone()));
        assert!(!s.add_characteristic(c.clone().with_value(vec![1])));
        assert_eq!(s.characteristics(), [c]);
        assert!(s.get_characteristic(LVL).is_some());
        assert!(s.get_characteristic(SVC).is_none());
    }

    #[test]
    fn kinds() {
        assert!(!Service::secondary(SVC).is_primary());
        let r = Service::remote(SVC, true)
            .with_characteristic(Characteristic::new(LVL, Prop::READ, Perm::READABLE));
        assert_eq!(r.origin(), Origin::Remote);
        assert_eq!(r.characteristics().len(), 1);
    }
}
