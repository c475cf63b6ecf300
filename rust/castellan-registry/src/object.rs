use std::fmt;

/// The concrete type of a registry object. Mirrors the config type system one level up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Host,
    Service,
    TimePeriod,
    Endpoint,
    Zone,
    Notification,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Host => "Host",
            ObjectKind::Service => "Service",
            ObjectKind::TimePeriod => "TimePeriod",
            ObjectKind::Endpoint => "Endpoint",
            ObjectKind::Zone => "Zone",
            ObjectKind::Notification => "Notification",
        };
        f.write_str(s)
    }
}

/// `(type, name)` identity, used as the registry's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectId {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.kind, self.name)
    }
}

/// Activation lifecycle every registry object passes through exactly once (plus an
/// optional `Paused` detour) on its way from config activation to teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Active,
    Paused,
    Stop,
}

impl Lifecycle {
    /// Whether a transition to `next` is legal from this state.
    pub fn can_transition_to(self, next: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (self, next),
            (Start, Active)
                | (Active, Paused)
                | (Active, Stop)
                | (Paused, Active)
                | (Paused, Stop)
        )
    }
}
