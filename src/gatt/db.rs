use std::collections::HashMap;

use tracing::{info, warn};

use crate::gap::Uuid;
use crate::{Error, Result};

use super::*;

/// Database index type for a characteristic: service index and position
/// within that service.
type CharIdx = (usize, usize);

/// GATT attribute database.
///
/// Services are kept in insertion order. Characteristics are owned by their
/// service and additionally indexed by UUID, so every characteristic reachable
/// through a service is also reachable through [`Db::get_characteristic`] and
/// vice versa. Nothing is ever removed, so indices remain valid for the
/// lifetime of the database.
#[derive(Clone, Debug, Default)]
pub struct Db {
    svcs: Vec<Service>,
    svc_idx: HashMap<Uuid, usize>,
    char_idx: HashMap<Uuid, CharIdx>,
}

impl Db {
    /// Creates an empty database.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service along with any characteristics already attached to
    /// it. The database is unchanged on error.
    pub fn add_service(&mut self, svc: Service) -> Result<()> {
        let uuid = svc.uuid();
        if self.svc_idx.contains_key(&uuid) {
            warn!("Service {uuid} is already registered");
            return Err(Error::DuplicateService(uuid));
        }
        if let Some(c) = (svc.characteristics().iter()).find(|c| self.char_idx.contains_key(&c.uuid())) {
            warn!("Characteristic {} of service {uuid} is already registered", c.uuid());
            return Err(Error::DuplicateCharacteristic(c.uuid()));
        }
        let i = self.svcs.len();
        for (j, c) in svc.characteristics().iter().enumerate() {
            self.char_idx.insert(c.uuid(), (i, j));
        }
        self.svc_idx.insert(uuid, i);
        self.svcs.push(svc);
        Ok(())
    }

    /// Adds a characteristic to a registered service. Fails if the service
    /// does not exist or if the characteristic UUID is already registered
    /// anywhere in the database. The database is unchanged on error.
    pub fn add_characteristic(&mut self, svc: Uuid, c: Characteristic) -> Result<()> {
        let Some(&i) = self.svc_idx.get(&svc) else {
            warn!("Service {svc} not found for characteristic {}", c.uuid());
            return Err(Error::ServiceNotFound(svc));
        };
        let uuid = c.uuid();
        if self.char_idx.contains_key(&uuid) {
            warn!("Characteristic {uuid} is already registered");
            return Err(Error::DuplicateCharacteristic(uuid));
        }
        let s = &mut self.svcs[i];
        let j = s.characteristics().len();
        // The UUID is not indexed, so it can't be present in the service
        let added = s.add_characteristic(c);
        debug_assert!(added);
        self.char_idx.insert(uuid, (i, j));
        Ok(())
    }

    /// Returns the service with the specified UUID.
    #[inline]
    #[must_use]
    pub fn get_service(&self, uuid: Uuid) -> Option<&Service> {
        (self.svc_idx.get(&uuid)).and_then(|&i| self.svcs.get(i))
    }

    /// Returns the characteristic with the specified UUID.
    #[inline]
    #[must_use]
    pub fn get_characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        let &(i, j) = self.char_idx.get(&uuid)?;
        self.svcs.get(i)?.characteristics().get(j)
    }

    /// Returns mutable access to the characteristic with the specified UUID.
    #[inline]
    #[must_use]
    pub fn get_characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut Characteristic> {
        let &(i, j) = self.char_idx.get(&uuid)?;
        self.svcs.get_mut(i)?.characteristics_mut().get_mut(j)
    }

    /// Returns the service that owns the specified characteristic.
    #[inline]
    #[must_use]
    pub fn service_of(&self, char_uuid: Uuid) -> Option<&Service> {
        let &(i, _) = self.char_idx.get(&char_uuid)?;
        self.svcs.get(i)
    }

    /// Returns an iterator over services in insertion order.
    #[inline]
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.svcs.iter()
    }

    /// Returns service UUIDs in insertion order.
    #[must_use]
    pub fn service_uuids(&self) -> Vec<Uuid> {
        self.svcs.iter().map(Service::uuid).collect()
    }

    /// Returns an iterator over all characteristics in service order.
    #[inline]
    pub fn characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.svcs.iter().flat_map(Service::characteristics)
    }

    /// Returns the number of registered services.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.svcs.len()
    }

    /// Returns whether the database has no services.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.svcs.is_empty()
    }

    /// Logs database contents.
    pub fn dump(&self) {
        info!("GATT database:");
        for s in &self.svcs {
            let sec = (!s.is_primary()).then_some("(Secondary) ").unwrap_or_default();
            info!("{sec}Service <{}>", s.uuid());
            let n = s.characteristics().len();
            for (j, c) in s.characteristics().iter().enumerate() {
                let cont = if j + 1 < n { '|' } else { ' ' };
                info!(
                    "|__ Characteristic <{}> [{}] ({})",
                    c.uuid(),
                    c.props().labels().join(", "),
                    c.perms().labels().join(", ")
                );
                for d in c.descriptors() {
                    info!("{cont}   |__ Descriptor <{}>", d.uuid());
                }
            }
        }
    }
}
