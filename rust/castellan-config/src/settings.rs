//! The typed shape every process-level setting is validated into. Everything the
//! core itself decides (checkable config, dependencies, notifications) comes from
//! the registry via the config collaborator's `on_config_loaded` callbacks instead
//! -- this struct only covers what the daemon needs before any of that exists:
//! listen addresses, TLS material, intervals, sink endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub listen_addr: String,
    pub cert_file: String,
    pub key_file: String,
    pub ca_file: String,
    pub heartbeat_interval_secs: u64,
    pub authenticated_liveness_timeout_secs: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5665".to_string(),
            cert_file: "/etc/castellan/pki/cert.pem".to_string(),
            key_file: "/etc/castellan/pki/key.pem".to_string(),
            ca_file: "/etc/castellan/pki/ca.pem".to_string(),
            heartbeat_interval_secs: 10,
            authenticated_liveness_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
    pub max_in_flight: usize,
    pub cpu_concurrency: usize,
    pub postpone_slack_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            max_in_flight: 256,
            cpu_concurrency: 0,
            postpone_slack_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub sweep_interval_secs: u64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self { sweep_interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LineSinkSettings {
    pub enabled: bool,
    pub addr: String,
    pub tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HttpSinkSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OtlpSinkSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PerfdataSettings {
    pub line: LineSinkSettings,
    pub http: HttpSinkSettings,
    pub otlp: OtlpSinkSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Fmt,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Fmt
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Fmt,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub state_file: String,
    pub cluster: ClusterSettings,
    pub scheduler: SchedulerSettings,
    pub notify: NotifySettings,
    pub perfdata: PerfdataSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_file: "/var/lib/castellan/state.sled".to_string(),
            cluster: ClusterSettings::default(),
            scheduler: SchedulerSettings::default(),
            notify: NotifySettings::default(),
            perfdata: PerfdataSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// `defaults -> file (if present) -> env (CASTELLAN__section__key)`, matching
    /// the layered precedence a `config::Config` builder gives for free.
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("/etc/castellan/castellan").required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CASTELLAN")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder.build()?;
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.cluster.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "cluster.listen_addr is not a valid socket address: {}",
                self.cluster.listen_addr
            )));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Validation("scheduler.tick_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.cluster.heartbeat_interval_secs)
    }

    pub fn authenticated_liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster.authenticated_liveness_timeout_secs)
    }

    pub fn notify_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.notify.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate_cleanly() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn file_values_override_defaults_and_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "state_file = \"/tmp/castellan-test.sled\"").unwrap();
        writeln!(file, "[cluster]\nlisten_addr = \"127.0.0.1:7000\"").unwrap();
        file.flush().unwrap();

        let path = file.path().with_extension("");
        std::env::set_var("CASTELLAN__CLUSTER__HEARTBEAT_INTERVAL_SECS", "5");

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.cluster.listen_addr, "127.0.0.1:7000");
        assert_eq!(settings.cluster.heartbeat_interval_secs, 5);

        std::env::remove_var("CASTELLAN__CLUSTER__HEARTBEAT_INTERVAL_SECS");
    }

    #[test]
    fn rejects_invalid_listen_addr() {
        let mut settings = Settings::default();
        settings.cluster.listen_addr = "not-an-addr".to_string();
        assert!(settings.validate().is_err());
    }
}
