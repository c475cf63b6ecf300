use dashmap::DashMap;

use crate::checkable::CheckState;
use crate::error::{RegistryError, RegistryResult};
use crate::object::ObjectId;

/// Bitmask of [`CheckState`] values a parent may be in while still satisfying a
/// dependency. The dependency is unsatisfied -- the child is unreachable -- when the
/// parent's current hard state is not in this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateFilter(u8);

impl StateFilter {
    pub const OK: Self = Self(0b0001);
    pub const WARNING: Self = Self(0b0010);
    pub const CRITICAL: Self = Self(0b0100);
    pub const UNKNOWN: Self = Self(0b1000);

    /// The conventional default: a dependency is satisfied as long as the parent is
    /// not hard-down (`Ok` or `Warning`).
    pub fn default_up() -> Self {
        Self(Self::OK.0 | Self::WARNING.0)
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, state: CheckState) -> bool {
        let bit = match state {
            CheckState::Ok => Self::OK.0,
            CheckState::Warning => Self::WARNING.0,
            CheckState::Critical => Self::CRITICAL.0,
            CheckState::Unknown => Self::UNKNOWN.0,
        };
        self.0 & bit != 0
    }
}

/// A single `child depends on parent` edge.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub parent: ObjectId,
    pub child: ObjectId,
    pub state_filter: StateFilter,
    pub disables_checks: bool,
    pub disables_notifications: bool,
    /// Dependency only applies while this timeperiod is open; `None` means always.
    pub period: Option<String>,
}

/// Directed graph of checkable dependencies, keyed both ways so that reachability
/// checks (child -> parents) and cascade invalidation (parent -> children) are both
/// O(1) lookups rather than a full scan.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    parents_of: DashMap<ObjectId, Vec<DependencyEdge>>,
    children_of: DashMap<ObjectId, Vec<ObjectId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge, rejecting it if it would create a cycle in the parent chain.
    pub fn add_edge(&self, edge: DependencyEdge) -> RegistryResult<()> {
        if edge.parent == edge.child {
            return Err(RegistryError::DependencyCycle(edge.child));
        }
        if self.reaches(&edge.parent, &edge.child) {
            return Err(RegistryError::DependencyCycle(edge.child.clone()));
        }
        self.children_of
            .entry(edge.parent.clone())
            .or_default()
            .push(edge.child.clone());
        self.parents_of.entry(edge.child.clone()).or_default().push(edge);
        Ok(())
    }

    /// True if `from` can reach `target` by walking up the parent chain -- used to
    /// detect that adding `target depends on from` would close a cycle.
    fn reaches(&self, from: &ObjectId, target: &ObjectId) -> bool {
        if from == target {
            return true;
        }
        if let Some(parents) = self.parents_of.get(from) {
            for edge in parents.iter() {
                if self.reaches(&edge.parent, target) {
                    return true;
                }
            }
        }
        false
    }

    pub fn parents(&self, child: &ObjectId) -> Vec<DependencyEdge> {
        self.parents_of
            .get(child)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn children(&self, parent: &ObjectId) -> Vec<ObjectId> {
        self.children_of.get(parent).map(|v| v.clone()).unwrap_or_default()
    }

    /// Whether `child` is reachable right now, given a way to look up a parent's
    /// current hard state and whether its dependency timeperiod (if any) is open.
    ///
    /// A child is unreachable for checks/notifications if any `disables_checks` /
    /// `disables_notifications` edge's parent is outside `state_filter` while its
    /// period (if set) is open.
    pub fn is_reachable(
        &self,
        child: &ObjectId,
        for_notifications: bool,
        mut parent_state: impl FnMut(&ObjectId) -> Option<CheckState>,
        mut period_open: impl FnMut(&str) -> bool,
    ) -> bool {
        for edge in self.parents(child) {
            let gates = if for_notifications {
                edge.disables_notifications
            } else {
                edge.disables_checks
            };
            if !gates {
                continue;
            }
            if let Some(period) = &edge.period {
                if !period_open(period) {
                    continue;
                }
            }
            match parent_state(&edge.parent) {
                Some(state) if !edge.state_filter.contains(state) => return false,
                _ => {}
            }
        }
        true
    }

    pub fn remove_object(&self, id: &ObjectId) {
        self.parents_of.remove(id);
        self.children_of.remove(id);
        for mut entry in self.parents_of.iter_mut() {
            entry.retain(|e| &e.parent != id);
        }
        for mut entry in self.children_of.iter_mut() {
            entry.retain(|c| c != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;

    fn id(name: &str) -> ObjectId {
        ObjectId::new(ObjectKind::Host, name)
    }

    #[test]
    fn rejects_self_dependency() {
        let g = DependencyGraph::new();
        let err = g
            .add_edge(DependencyEdge {
                parent: id("a"),
                child: id("a"),
                state_filter: StateFilter::default_up(),
                disables_checks: false,
                disables_notifications: true,
                period: None,
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DependencyCycle(_)));
    }

    #[test]
    fn rejects_transitive_cycle() {
        let g = DependencyGraph::new();
        g.add_edge(DependencyEdge {
            parent: id("a"),
            child: id("b"),
            state_filter: StateFilter::default_up(),
            disables_checks: false,
            disables_notifications: true,
            period: None,
        })
        .unwrap();
        g.add_edge(DependencyEdge {
            parent: id("b"),
            child: id("c"),
            state_filter: StateFilter::default_up(),
            disables_checks: false,
            disables_notifications: true,
            period: None,
        })
        .unwrap();
        let err = g
            .add_edge(DependencyEdge {
                parent: id("c"),
                child: id("a"),
                state_filter: StateFilter::default_up(),
                disables_checks: false,
                disables_notifications: true,
                period: None,
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DependencyCycle(_)));
    }

    #[test]
    fn unreachable_when_parent_outside_filter() {
        let g = DependencyGraph::new();
        g.add_edge(DependencyEdge {
            parent: id("gateway"),
            child: id("web1"),
            state_filter: StateFilter::default_up(),
            disables_checks: false,
            disables_notifications: true,
            period: None,
        })
        .unwrap();
        let reachable = g.is_reachable(&id("web1"), true, |_| Some(CheckState::Critical), |_| true);
        assert!(!reachable);
        let reachable_ok = g.is_reachable(&id("web1"), true, |_| Some(CheckState::Ok), |_| true);
        assert!(reachable_ok);
    }
}
