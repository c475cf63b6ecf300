//! Typed, named, live objects with parent/child links and an activation lifecycle.
//!
//! The registry is the process-wide source of truth for configuration objects: hosts,
//! services, time periods, endpoints, zones and notifications. It never parses
//! configuration text itself -- it is handed already-built objects by a config
//! collaborator through [`Registry::activate`] and only tracks their lifecycle and
//! relationships from that point on.

pub mod checkable;
pub mod dependency;
pub mod endpoint;
pub mod error;
pub mod object;
pub mod registry;
pub mod timeperiod;

pub use checkable::{
    Acknowledgement, CheckResult, CheckState, Checkable, CheckableConfig, CheckableKind,
    CheckableSnapshot, CheckableState, Downtime, PerfdataValue, StateType,
};
pub use dependency::{DependencyEdge, DependencyGraph, StateFilter};
pub use endpoint::{Endpoint, EndpointState, Zone};
pub use error::{RegistryError, RegistryResult};
pub use object::{Lifecycle, ObjectId, ObjectKind};
pub use registry::Registry;
pub use timeperiod::{TimePeriod, TimeRange, Weekday};
