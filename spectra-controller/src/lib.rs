use std::sync::Arc;
use std::time::Duration;

use spectra_api::transport::Session;
use tokio::sync::broadcast;

use crate::configs::settings::Settings;
use crate::errors::RecoveryError;
use crate::services::endpoint_service::Endpoint;
use crate::services::event::ControllerEvent;
use crate::services::heartbeat_service::HeartbeatMonitor;
use crate::services::link::Link;
use crate::services::management_service::{ManagementChannel, SshChannel};
use crate::services::panel_service::PanelService;
use crate::services::recovery_service::{LinkState, RecoveryOrchestrator};

pub mod configs;
pub mod errors;
pub mod services;

pub async fn run(settings: &Arc<Settings>) -> Result<(), RecoveryError> {
    let (sender, _) = broadcast::channel::<ControllerEvent>(64);
    let monitor = Arc::new(HeartbeatMonitor::new());

    let session = Arc::new(Session::new(
        settings.broker.session_options(),
        tracing::info_span!("session", side = "controller"),
    ));
    let link: Arc<dyn Link> = session.clone();

    let endpoint = Arc::new(Endpoint::new(&settings.device, tracing::info_span!("endpoint")));
    let management: Arc<dyn ManagementChannel> = Arc::new(SshChannel::new(
        settings.device.management.clone(),
        Arc::clone(&endpoint),
        tracing::info_span!("management"),
    ));

    let panels = Arc::new(PanelService::new(
        Arc::clone(&link),
        &settings.broker.topic.command,
        settings.device.channels,
        Arc::clone(&monitor),
        sender.clone(),
        tracing::info_span!("panel"),
    ));
    panels.load_schedules(&settings.schedules);

    if let Err(e) = session
        .subscribe(&settings.broker.topic.report, panels.inbound_handler())
        .await
    {
        tracing::error!("cannot register report handler: {e}");
    }

    tokio::spawn(dispatch_events(Arc::clone(&panels), sender.subscribe()));

    if let Some(secs) = settings.status_poll_secs.filter(|secs| *secs > 0) {
        tokio::spawn(poll_status(Arc::clone(&panels), Arc::clone(&link), Duration::from_secs(secs)));
    }

    let orchestrator = RecoveryOrchestrator::new(
        link,
        management,
        endpoint,
        monitor,
        &settings.heartbeat,
        settings.recovery.clone(),
        sender,
        tracing::info_span!("recovery"),
    );

    let result = tokio::select! {
        result = orchestrator.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    session.disconnect().await;

    result
}

async fn dispatch_events(panels: Arc<PanelService>, mut receiver: broadcast::Receiver<ControllerEvent>) {
    loop {
        match receiver.recv().await {
            Ok(ControllerEvent::StateChanged(LinkState::Live)) => panels.on_live().await,
            Ok(ControllerEvent::ScheduleStateLost) => {
                panels.forget_activations();
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("event dispatcher skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn poll_status(panels: Arc<PanelService>, link: Arc<dyn Link>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if !link.is_connected() {
            continue;
        }

        for channel in panels.channels() {
            if let Err(e) = panels.request_status(channel).await {
                tracing::debug!("status request for channel {channel} failed: {e}");
            }
        }
    }
}
