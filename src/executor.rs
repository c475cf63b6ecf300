//! The concrete boundary implementations plugged into the scheduler and
//! notification engine's executor traits: running `check_command`/notification
//! commands as subprocesses. Plugin protocol semantics (argument parsing, exit
//! code conventions) are deliberately narrow here -- this is the integration
//! point, not a plugin framework.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use castellan_registry::{CheckResult, CheckState, Checkable};
use castellan_io::IoEngine;
use castellan_notify::{NotificationExecutor, NotificationType, NotifyError, NotifyResult};
use castellan_scheduler::CheckExecutor;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs `command` under a shell, mapping the standard plugin exit-code
/// convention (0 ok, 1 warning, 2 critical, anything else unknown) and stdout
/// into a `CheckResult`. Shared by local check execution and the cluster's
/// remote `event::ExecuteCommand` handler.
pub async fn run_check_command(command: &str, timeout: Duration) -> CheckResult {
    let scheduled_start = Utc::now();
    let execution_start = scheduled_start;

    let spawn = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let (state, output) = match tokio::time::timeout(timeout, spawn).await {
        Ok(Ok(out)) => {
            let state = match out.status.code() {
                Some(0) => CheckState::Ok,
                Some(1) => CheckState::Warning,
                Some(2) => CheckState::Critical,
                _ => CheckState::Unknown,
            };
            let mut text = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if text.is_empty() {
                text = String::from_utf8_lossy(&out.stderr).trim().to_string();
            }
            (state, text)
        }
        Ok(Err(e)) => {
            warn!(command, error = %e, "failed to spawn check command");
            (CheckState::Unknown, format!("exec error: {e}"))
        }
        Err(_) => {
            debug!(command, "check command timed out");
            (CheckState::Unknown, "check timed out".to_string())
        }
    };

    let execution_end = Utc::now();
    CheckResult {
        scheduled_start,
        scheduled_end: scheduled_start + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(0)),
        execution_start,
        execution_end,
        state,
        output,
        perfdata: Vec::new(),
        active: true,
        origin: None,
    }
}

pub struct ProcessCheckExecutor;

impl CheckExecutor for ProcessCheckExecutor {
    fn execute<'a>(
        &'a self,
        checkable: &'a Checkable,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = CheckResult> + Send + 'a>> {
        Box::pin(async move { run_check_command(&checkable.config.check_command, timeout).await })
    }
}

/// Renders a notification command from a fixed shell template and runs it
/// through the same CPU-bound admission gate as check plugin execution, so a
/// hung notification script cannot starve the scheduler.
pub struct CommandNotificationExecutor {
    pub command_template: String,
    pub io_engine: std::sync::Arc<IoEngine>,
    pub timeout: Duration,
}

impl CommandNotificationExecutor {
    pub fn new(command_template: impl Into<String>, io_engine: std::sync::Arc<IoEngine>, timeout: Duration) -> Self {
        Self { command_template: command_template.into(), io_engine, timeout }
    }
}

#[async_trait]
impl NotificationExecutor for CommandNotificationExecutor {
    async fn send(&self, user: &str, checkable: &Checkable, ntype: NotificationType, result: &CheckResult) -> NotifyResult<()> {
        let command = self
            .command_template
            .replace("{user}", user)
            .replace("{checkable}", checkable.name())
            .replace("{type}", ntype.label())
            .replace("{output}", &result.output);

        let _cpu = self.io_engine.enter_cpu_bound().await;
        let spawn = Command::new("/bin/sh").arg("-c").arg(&command).kill_on_drop(true).status();
        match tokio::time::timeout(self.timeout, spawn).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(NotifyError::CommandFailed {
                user: user.to_string(),
                reason: format!("exited with {status}"),
            }),
            Ok(Err(e)) => Err(NotifyError::CommandFailed { user: user.to_string(), reason: e.to_string() }),
            Err(_) => Err(NotifyError::Timeout { user: user.to_string() }),
        }
    }
}
