// Desktop notifications for finished or failed runs
use crate::config::NotifyConfig;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Run-completion notifier. Failures are logged, never returned.
#[derive(Debug, Clone)]
pub struct Notifier {
    config: NotifyConfig,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn success_text(&self, rounds: u32) -> (String, String) {
        (
            format!("{} - run complete", self.config.app_name),
            format!("Routine finished successfully.\nRounds completed: {}", rounds),
        )
    }

    pub fn failure_text(&self, reason: &str) -> (String, String) {
        (
            format!("{} - run failed", self.config.app_name),
            format!("Routine stopped with an error.\nReason: {}", reason),
        )
    }

    pub async fn send_success(&self, rounds: u32) {
        let (title, message) = self.success_text(rounds);
        self.send(&title, &message).await;
    }

    pub async fn send_failure(&self, reason: &str) {
        let (title, message) = self.failure_text(reason);
        self.send(&title, &message).await;
    }

    /// Runs the notification command to completion, bounded by
    /// [`NOTIFY_TIMEOUT`].
    pub async fn send(&self, title: &str, message: &str) {
        log::info!("🔔 {}: {}", title, message.replace('\n', " "));
        if !self.config.enabled {
            return;
        }
        let program = &self.config.command;
        let mut cmd = Command::new(program);
        cmd.arg(title)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match tokio::time::timeout(NOTIFY_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                log::debug!("Notification sent via {}", program);
            }
            Ok(Ok(output)) => log::warn!(
                "Notification command {} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(Err(e)) => log::warn!("Failed to run notification command {}: {}", program, e),
            Err(_) => log::warn!("Notification command {} timed out", program),
        }
    }
}
