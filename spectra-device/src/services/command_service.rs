use std::sync::Arc;

use spectra_api::message::CommandError;
use spectra_api::{ControllerCommand, DeviceReport, ErrorCode, Message};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::Span;

use crate::services::actuator_service::ActuatorHub;
use crate::services::publisher::Publisher;
use crate::services::scheduler_service::SchedulerService;

/// Executes commands arriving from the controller.
pub struct CommandService {
    publisher: Arc<dyn Publisher>,
    topic: String,
    scheduler: Arc<SchedulerService>,
    actuators: Arc<ActuatorHub>,
    span: Span,
}

impl CommandService {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        topic: &str,
        scheduler: Arc<SchedulerService>,
        actuators: Arc<ActuatorHub>,
        span: Span,
    ) -> Self {
        Self {
            publisher,
            topic: topic.to_string(),
            scheduler,
            actuators,
            span,
        }
    }

    /// Handles raw payloads in arrival order until the sender is dropped.
    pub async fn run(&self, mut receiver: UnboundedReceiver<String>) {
        while let Some(raw) = receiver.recv().await {
            self.handle(&raw).await;
        }
    }

    pub async fn handle(&self, raw: &str) {
        self.report(DeviceReport::Echo(raw.to_string())).await;

        let message = match Message::decode(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(parent: &self.span, "{e}, rejected: {raw}");
                self.report(DeviceReport::Error(ErrorCode::ChecksumMismatch)).await;
                return;
            }
        };

        let command = match ControllerCommand::try_from(&message) {
            Ok(command) => command,
            Err(CommandError::UnknownKeyword(keyword)) => {
                tracing::warn!(parent: &self.span, "no order matches {keyword}");
                self.report(DeviceReport::Error(ErrorCode::UnknownCommand)).await;
                return;
            }
            Err(e) => {
                tracing::debug!(parent: &self.span, "ignored {message}: {e}");
                return;
            }
        };

        let channel = command.channel();
        if !self.scheduler.contains(channel) {
            tracing::debug!(parent: &self.span, "ignored {message}: no channel {channel}");
            return;
        }

        match command {
            ControllerCommand::Status { channel } => self.actuators.get(channel),
            ControllerCommand::Set { channel, levels } => {
                self.scheduler.set_output(channel, levels);
                self.actuators.set(channel, levels);
            }
            ControllerCommand::Activate { channel, entries } => {
                self.scheduler.activate(channel, &entries);
            }
            ControllerCommand::Deactivate { channel } => {
                self.scheduler.deactivate(channel);
            }
        }
    }

    async fn report(&self, report: DeviceReport) {
        if let Err(e) = self.publisher.publish(&self.topic, report.to_fields()).await {
            tracing::debug!(parent: &self.span, "cannot report {:?}: {e}", report.keyword());
        }
    }
}
