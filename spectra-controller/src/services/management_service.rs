use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::Span;

use crate::configs::settings::Management;
use crate::services::endpoint_service::Endpoint;

/// Exit status the `ssh` client reserves for its own failures.
const SSH_FAILURE: i32 = 255;

/// Out-of-band control over the device host, independent of the broker.
#[async_trait]
pub trait ManagementChannel: Send + Sync {
    async fn is_reachable(&self) -> bool;

    async fn is_control_process_running(&self) -> bool;

    async fn start_control_process(&self) -> bool;

    async fn stop_control_process(&self) -> bool;

    async fn is_broker_running(&self) -> bool;

    async fn start_broker(&self) -> bool;

    /// Fire and forget; the host drops the connection while going down.
    async fn reboot(&self) -> bool;
}

/// Runs remote commands through the system `ssh` client in batch mode.
pub struct SshChannel {
    settings: Management,
    endpoint: Arc<Endpoint>,
    span: Span,
}

impl SshChannel {
    pub fn new(settings: Management, endpoint: Arc<Endpoint>, span: Span) -> Self {
        Self { settings, endpoint, span }
    }

    fn command(&self, host: &str, remote: &str) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.settings.connect_timeout_secs))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-p")
            .arg(self.settings.port.to_string());
        if let Some(identity) = &self.settings.identity_file {
            command.arg("-i").arg(identity);
        }
        command
            .arg(format!("{}@{host}", self.settings.user))
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }

    async fn execute(&self, remote: &str) -> Option<Output> {
        let host = self.endpoint.current();
        let deadline = Duration::from_secs(self.settings.connect_timeout_secs.saturating_mul(2).max(1));

        tracing::debug!(parent: &self.span, "running `{remote}` on {host}");

        match tokio::time::timeout(deadline, self.command(&host, remote).output()).await {
            Ok(Ok(output)) if output.status.code() == Some(SSH_FAILURE) => {
                tracing::warn!(
                    parent: &self.span,
                    "ssh to {host} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                tracing::error!(parent: &self.span, "cannot spawn ssh: {e}");
                None
            }
            Err(_) => {
                tracing::warn!(parent: &self.span, "`{remote}` on {host} timed out");
                None
            }
        }
    }

    async fn delivered(&self, remote: &str) -> bool {
        self.execute(remote).await.is_some()
    }
}

#[async_trait]
impl ManagementChannel for SshChannel {
    async fn is_reachable(&self) -> bool {
        let reachable = self
            .execute("true")
            .await
            .is_some_and(|output| output.status.success());

        if reachable {
            tracing::info!(parent: &self.span, "SSH connection established");
        } else {
            tracing::error!(parent: &self.span, "SSH connection failed");
        }
        reachable
    }

    async fn is_control_process_running(&self) -> bool {
        match self.execute(&self.settings.commands.process_check).await {
            Some(output) => output.status.success() && !output.stdout.trim_ascii().is_empty(),
            None => false,
        }
    }

    async fn start_control_process(&self) -> bool {
        tracing::info!(parent: &self.span, "starting control process on device");
        self.delivered(&self.settings.commands.process_start).await
    }

    async fn stop_control_process(&self) -> bool {
        tracing::info!(parent: &self.span, "stopping control process on device");
        self.delivered(&self.settings.commands.process_stop).await
    }

    async fn is_broker_running(&self) -> bool {
        let marker = &self.settings.commands.broker_running_marker;

        self.execute(&self.settings.commands.broker_status)
            .await
            .is_some_and(|output| String::from_utf8_lossy(&output.stdout).contains(marker.as_str()))
    }

    async fn start_broker(&self) -> bool {
        self.delivered(&self.settings.commands.broker_start).await
    }

    async fn reboot(&self) -> bool {
        tracing::warn!(parent: &self.span, "rebooting device");
        // The session usually dies with the host, so no status is expected.
        let _ = self.execute(&self.settings.commands.reboot).await;
        true
    }
}
