//! Process-level settings, loaded in three layers: built-in defaults, an optional
//! config file, then environment variables. The object graph the core actually
//! schedules (checkables, dependencies, notifications) never passes through
//! here -- it is handed directly to `castellan_registry::Registry` by a config
//! collaborator outside this crate's scope.

pub mod error;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{
    ClusterSettings, HttpSinkSettings, LineSinkSettings, LogFormat, LoggingSettings, NotifySettings,
    OtlpSinkSettings, PerfdataSettings, SchedulerSettings, Settings,
};
