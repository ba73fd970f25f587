use std::sync::Arc;

use spectra_api::transport::Session;
use tokio::sync::mpsc;

use crate::configs::settings::Settings;
use crate::errors::DeviceError;
use crate::services::actuator_service::{ActuatorHub, ActuatorLink, SerialLink, discover_ports, forward_reports};
use crate::services::command_service::CommandService;
use crate::services::heartbeat_service::HeartbeatService;
use crate::services::link_service::LinkService;
use crate::services::publisher::Publisher;
use crate::services::scheduler_service::{Clock, SchedulerService};

pub mod configs;
pub mod errors;
pub mod services;

pub async fn run(settings: &Arc<Settings>, clock: Arc<dyn Clock>) -> Result<(), DeviceError> {
    let ports = discover_ports(&settings.actuator)?;
    if ports.len() != settings.actuator.expected_links {
        return Err(DeviceError::MissingLinks {
            expected: settings.actuator.expected_links,
            found: ports.len(),
        });
    }

    let (report_sender, report_receiver) = mpsc::unbounded_channel();
    let mut links: Vec<Arc<dyn ActuatorLink>> = Vec::with_capacity(ports.len());
    for path in &ports {
        let link = SerialLink::open(path, &settings.actuator)?;
        link.spawn_reader(report_sender.clone(), tracing::info_span!("actuator", port = %path))?;
        links.push(Arc::new(link));
    }
    drop(report_sender);

    let actuators = Arc::new(ActuatorHub::new(links, tracing::info_span!("actuators")));

    let session = Arc::new(Session::new(
        settings.broker.session_options(),
        tracing::info_span!("session", side = "device"),
    ));
    let publisher: Arc<dyn Publisher> = session.clone();

    let scheduler = Arc::new(SchedulerService::new(
        settings.scheduler.channels,
        clock,
        Arc::clone(&actuators),
        tracing::info_span!("scheduler"),
    ));

    let commands = CommandService::new(
        Arc::clone(&publisher),
        &settings.broker.topic.report,
        Arc::clone(&scheduler),
        actuators,
        tracing::info_span!("commands"),
    );

    let (command_sender, command_receiver) = mpsc::unbounded_channel::<String>();
    session
        .subscribe(
            &settings.broker.topic.command,
            Arc::new(move |raw: &str| {
                let _ = command_sender.send(raw.to_string());
            }),
        )
        .await?;

    tokio::spawn(async move { commands.run(command_receiver).await });
    tokio::spawn(Arc::clone(&scheduler).run(settings.scheduler.poll()));
    tokio::spawn(forward_reports(
        report_receiver,
        Arc::clone(&publisher),
        settings.broker.topic.report.clone(),
        tracing::info_span!("reports"),
    ));

    let heartbeat = HeartbeatService::new(
        publisher,
        &settings.broker.topic.report,
        settings.heartbeat.interval(),
        tracing::info_span!("heartbeat"),
    );
    tokio::spawn(async move { heartbeat.run().await });

    let link = LinkService::new(
        Arc::clone(&session),
        &settings.broker.host,
        settings.broker.retry(),
        tracing::info_span!("link"),
    );

    tokio::select! {
        _ = link.run() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    session.disconnect().await;

    Ok(())
}
