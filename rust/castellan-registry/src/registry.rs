use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::checkable::Checkable;
use crate::dependency::DependencyGraph;
use crate::endpoint::{Endpoint, Zone};
use crate::error::{RegistryError, RegistryResult};
use crate::object::{Lifecycle, ObjectId, ObjectKind};
use crate::timeperiod::TimePeriod;

/// Process-wide table of live objects.
///
/// Each typed map is independent (hosts/services share one map, keyed by
/// [`ObjectId`] rather than bare name, since a host and a service may legitimately
/// share a name). Lifecycle is tracked separately from storage so that objects
/// outside this crate's typed maps -- notification objects, in particular, which
/// `castellan-notify` owns -- can still participate in the same activation protocol.
#[derive(Default)]
pub struct Registry {
    checkables: DashMap<ObjectId, Arc<Checkable>>,
    timeperiods: DashMap<String, Arc<TimePeriod>>,
    endpoints: DashMap<String, Arc<Endpoint>>,
    zones: DashMap<String, Arc<Zone>>,
    lifecycle: DashMap<ObjectId, Lifecycle>,
    pub dependencies: DependencyGraph,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_lifecycle(&self, id: ObjectId, next: Lifecycle) -> RegistryResult<()> {
        match self.lifecycle.get(&id).map(|l| *l) {
            Some(current) if !current.can_transition_to(next) => {
                Err(RegistryError::InvalidLifecycle(id))
            }
            _ => {
                self.lifecycle.insert(id, next);
                Ok(())
            }
        }
    }

    pub fn lifecycle_of(&self, id: &ObjectId) -> Option<Lifecycle> {
        self.lifecycle.get(id).map(|l| *l)
    }

    /// Register a checkable and move it `Start -> Active`. Fails if an object with
    /// the same identity already exists.
    pub fn activate_checkable(&self, checkable: Arc<Checkable>) -> RegistryResult<()> {
        let kind = match checkable.config.kind {
            crate::checkable::CheckableKind::Host => ObjectKind::Host,
            crate::checkable::CheckableKind::Service => ObjectKind::Service,
        };
        let id = ObjectId::new(kind, checkable.name());
        if self.checkables.contains_key(&id) {
            return Err(RegistryError::AlreadyExists(id));
        }
        self.lifecycle.insert(id.clone(), Lifecycle::Start);
        self.set_lifecycle(id.clone(), Lifecycle::Active)?;
        debug!(object = %id, "checkable activated");
        self.checkables.insert(id, checkable);
        Ok(())
    }

    pub fn activate_timeperiod(&self, tp: Arc<TimePeriod>) -> RegistryResult<()> {
        let id = ObjectId::new(ObjectKind::TimePeriod, tp.name.clone());
        if self.timeperiods.contains_key(&tp.name) {
            return Err(RegistryError::AlreadyExists(id));
        }
        self.lifecycle.insert(id.clone(), Lifecycle::Active);
        self.timeperiods.insert(tp.name.clone(), tp);
        Ok(())
    }

    pub fn activate_endpoint(&self, endpoint: Arc<Endpoint>) -> RegistryResult<()> {
        let id = ObjectId::new(ObjectKind::Endpoint, endpoint.name.clone());
        if self.endpoints.contains_key(&endpoint.name) {
            return Err(RegistryError::AlreadyExists(id));
        }
        self.lifecycle.insert(id.clone(), Lifecycle::Active);
        self.endpoints.insert(endpoint.name.clone(), endpoint);
        Ok(())
    }

    pub fn activate_zone(&self, zone: Arc<Zone>) -> RegistryResult<()> {
        let id = ObjectId::new(ObjectKind::Zone, zone.name.clone());
        if self.zones.contains_key(&zone.name) {
            return Err(RegistryError::AlreadyExists(id));
        }
        self.lifecycle.insert(id.clone(), Lifecycle::Active);
        self.zones.insert(zone.name.clone(), zone);
        Ok(())
    }

    /// Pause an active object; paused checkables are skipped by the scheduler but
    /// remain in the registry and keep their state.
    pub fn pause(&self, id: &ObjectId) -> RegistryResult<()> {
        self.set_lifecycle(id.clone(), Lifecycle::Paused)
    }

    pub fn resume(&self, id: &ObjectId) -> RegistryResult<()> {
        self.set_lifecycle(id.clone(), Lifecycle::Active)
    }

    /// Tear down an object, removing it from whichever typed map it lives in and
    /// dropping its dependency edges.
    pub fn deactivate(&self, id: &ObjectId) -> RegistryResult<()> {
        self.set_lifecycle(id.clone(), Lifecycle::Stop)?;
        match id.kind {
            ObjectKind::Host | ObjectKind::Service => {
                self.checkables.remove(id);
            }
            ObjectKind::TimePeriod => {
                self.timeperiods.remove(&id.name);
            }
            ObjectKind::Endpoint => {
                self.endpoints.remove(&id.name);
            }
            ObjectKind::Zone => {
                self.zones.remove(&id.name);
            }
            ObjectKind::Notification => {}
        }
        self.dependencies.remove_object(id);
        self.lifecycle.remove(id);
        Ok(())
    }

    pub fn checkable(&self, id: &ObjectId) -> Option<Arc<Checkable>> {
        self.checkables.get(id).map(|r| r.clone())
    }

    pub fn checkable_by_name(&self, kind: ObjectKind, name: &str) -> Option<Arc<Checkable>> {
        self.checkable(&ObjectId::new(kind, name))
    }

    pub fn all_checkables(&self) -> Vec<Arc<Checkable>> {
        self.checkables.iter().map(|r| r.value().clone()).collect()
    }

    pub fn timeperiod(&self, name: &str) -> Option<Arc<TimePeriod>> {
        self.timeperiods.get(name).map(|r| r.clone())
    }

    pub fn endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.get(name).map(|r| r.clone())
    }

    pub fn zone(&self, name: &str) -> Option<Arc<Zone>> {
        self.zones.get(name).map(|r| r.clone())
    }

    pub fn all_endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.iter().map(|r| r.value().clone()).collect()
    }

    /// Called once per config object as it is parsed; currently only logs, kept as
    /// an explicit extension point the way config loading hooks are elsewhere in this
    /// codebase rather than scattering ad-hoc callbacks through the parser.
    pub fn on_config_loaded(&self, id: &ObjectId) {
        debug!(object = %id, "config object loaded");
    }

    /// Called once after every object in a config generation has been activated;
    /// a natural point to validate cross-object references such as dependency
    /// parents that must already exist.
    pub fn on_all_config_loaded(&self) {
        let now = Utc::now();
        let _ = now;
        for entry in self.checkables.iter() {
            let id = ObjectId::new(
                match entry.config.kind {
                    crate::checkable::CheckableKind::Host => ObjectKind::Host,
                    crate::checkable::CheckableKind::Service => ObjectKind::Service,
                },
                entry.name(),
            );
            for edge in self.dependencies.parents(&id) {
                if self.lifecycle_of(&edge.parent).is_none() {
                    warn!(child = %id, parent = %edge.parent, "dependency parent not found in registry");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkable::{CheckableConfig, CheckableKind};

    #[test]
    fn activating_same_checkable_twice_fails() {
        let reg = Registry::new();
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let c = Checkable::new(cfg.clone(), Utc::now());
        reg.activate_checkable(c).unwrap();
        let c2 = Checkable::new(cfg, Utc::now());
        let err = reg.activate_checkable(c2).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn deactivate_then_lookup_returns_none() {
        let reg = Registry::new();
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        reg.activate_checkable(Checkable::new(cfg, Utc::now())).unwrap();
        let id = ObjectId::new(ObjectKind::Host, "web1");
        reg.deactivate(&id).unwrap();
        assert!(reg.checkable(&id).is_none());
    }

    #[test]
    fn pause_then_resume_round_trips() {
        let reg = Registry::new();
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        reg.activate_checkable(Checkable::new(cfg, Utc::now())).unwrap();
        let id = ObjectId::new(ObjectKind::Host, "web1");
        reg.pause(&id).unwrap();
        assert_eq!(reg.lifecycle_of(&id), Some(Lifecycle::Paused));
        reg.resume(&id).unwrap();
        assert_eq!(reg.lifecycle_of(&id), Some(Lifecycle::Active));
    }
}
