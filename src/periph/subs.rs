use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::gap::Uuid;

use super::Central;

/// Characteristic UUIDs subscribed to by one central.
type CharSet = SmallVec<[Uuid; 4]>;

/// Per-central characteristic subscriptions.
///
/// An entry for a central is created on its first subscription and survives
/// unsubscribing from every characteristic, so the table tracks centrals that
/// have interacted with the server rather than active subscriptions.
#[derive(Clone, Debug, Default)]
pub struct Subscriptions(HashMap<Central, CharSet>);

impl Subscriptions {
    /// Creates an empty subscription table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription. Returns `false` if the central was already
    /// subscribed to the characteristic.
    pub fn subscribe(&mut self, central: Central, char_uuid: Uuid) -> bool {
        let set = self.0.entry(central).or_default();
        if set.contains(&char_uuid) {
            warn!("Central {central} is already subscribed to {char_uuid}");
            return false;
        }
        debug!("Central {central} subscribed to {char_uuid}");
        set.push(char_uuid);
        true
    }

    /// Removes a subscription. The central entry is kept even if no
    /// subscriptions remain. Unknown centrals and characteristics are ignored.
    pub fn unsubscribe(&mut self, central: Central, char_uuid: Uuid) -> bool {
        let Some(set) = self.0.get_mut(&central) else {
            return false;
        };
        let Some(i) = set.iter().position(|&u| u == char_uuid) else {
            return false;
        };
        debug!("Central {central} unsubscribed from {char_uuid}");
        set.remove(i);
        true
    }

    /// Removes the central entry along with all of its subscriptions.
    pub fn remove_central(&mut self, central: Central) -> bool {
        let removed = self.0.remove(&central).is_some();
        if removed {
            debug!("Removed subscriptions of central {central}");
        }
        removed
    }

    /// Returns whether the table has no central entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of central entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the characteristics that the central is subscribed to or
    /// `None` if the central has no entry.
    #[inline]
    #[must_use]
    pub fn subscriptions(&self, central: Central) -> Option<&[Uuid]> {
        self.0.get(&central).map(SmallVec::as_slice)
    }

    /// Returns the centrals subscribed to the characteristic.
    #[must_use]
    pub fn subscribers(&self, char_uuid: Uuid) -> Vec<Central> {
        let mut v: Vec<_> = (self.0.iter())
            .filter(|(_, set)| set.contains(&char_uuid))
            .map(|(&c, _)| c)
            .collect();
        v.sort_unstable();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Central = Central(Uuid::from_u16(0xFFF1));
    const B: Central = Central(Uuid::from_u16(0xFFF2));
    const X: Uuid = Uuid::from_u16(0x2A19);
    const Y: Uuid = Uuid::from_u16(0x2A37);

    #[test]
    fn subscribe_unsubscribe() {
        let mut s = Subscriptions::new();
        assert!(s.is_empty());
        assert!(s.subscribe(A, X));
        assert!(!s.subscribe(A, X));
        assert_eq!(s.subscriptions(A), Some([X].as_slice()));

        assert!(s.unsubscribe(A, X));
        assert_eq!(s.subscriptions(A), Some(&[] as &[Uuid]));
        assert!(!s.is_empty());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn unknown_unsubscribe() {
        let mut s = Subscriptions::new();
        assert!(!s.unsubscribe(A, X));
        assert!(s.is_empty());
        s.subscribe(A, X);
        assert!(!s.unsubscribe(A, Y));
        assert!(!s.unsubscribe(B, X));
        assert_eq!(s.subscriptions(A), Some([X].as_slice()));
        assert_eq!(s.subscriptions(B), None);
    }

    #[test]
    fn subscribers() {
        let mut s = Subscriptions::new();
        s.subscribe(B, X);
        s.subscribe(A, X);
        s.subscribe(A, Y);
        assert_eq!(s.subscribers(X), [A, B]);
        assert_eq!(s.subscribers(Y), [A]);
        assert!(s.remove_central(A));
        assert!(!s.remove_central(A));
        assert_eq!(s.subscribers(X), [B]);
        assert!(s.subscribers(Y).is_empty());
    }
}
