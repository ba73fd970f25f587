use std::sync::Arc;

use spectra_api::transport::SessionError;
use spectra_api::{ChannelId, ErrorCode, Levels, Message};
use spectra_controller::configs::settings::{Schedule, Window};
use spectra_controller::errors::PanelError;
use spectra_controller::services::event::ControllerEvent;

mod common;
use common::mock_app::MockApp;

fn channel(id: u8) -> ChannelId {
    ChannelId::new(id).unwrap()
}

#[test]
fn test_schedule_authoring() {
    let app = MockApp::new();
    let panels = app.panels();

    let first = panels.add_window(channel(2), 540, 600, [20, 20, 20, 20]).unwrap();
    panels.add_window_at(channel(2), "10:00", "11:00", [40, 40, 40, 40]).unwrap();

    assert!(matches!(
        panels.add_window(channel(2), 550, 560, [1, 1, 1, 1]),
        Err(PanelError::Schedule(_))
    ));
    assert!(matches!(
        panels.add_window_at(channel(2), "25:00", "26:00", [1, 1, 1, 1]),
        Err(PanelError::InvalidTime(_))
    ));
    assert!(matches!(panels.channel(9), Err(PanelError::UnknownChannel(9))));

    assert_eq!(
        panels.schedule(channel(2)).unwrap().serialize(),
        "540;600;20;20;20;20,600;660;40;40;40;40,"
    );

    assert!(panels.remove_window(channel(2), &first).unwrap());
    assert!(!panels.remove_window(channel(2), &first).unwrap());
    assert_eq!(panels.schedule(channel(2)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_commands_need_a_live_link() {
    let app = MockApp::new();
    let panels = app.panels();
    panels.add_window(channel(1), 60, 120, [10, 10, 10, 10]).unwrap();

    let result = panels.activate(channel(1)).await;

    assert!(matches!(result, Err(PanelError::Link(SessionError::NotConnected))));
    assert!(!panels.is_active(channel(1)).unwrap());
    assert!(app.link.published().is_empty());
}

#[tokio::test]
async fn test_activate_and_deactivate() {
    let app = MockApp::new();
    app.link.set_connected(true);
    let panels = app.panels();
    panels.add_window(channel(2), 540, 600, [20, 20, 20, 20]).unwrap();
    panels.add_window(channel(2), 600, 660, [40, 40, 40, 40]).unwrap();

    panels.activate(channel(2)).await.unwrap();
    assert!(panels.is_active(channel(2)).unwrap());

    panels.deactivate(channel(2)).await.unwrap();
    assert!(!panels.is_active(channel(2)).unwrap());

    let published = app.link.published();
    assert_eq!(published.len(), 2);
    assert_eq!(
        published[0].fields(),
        &["on", "2", "540;600;20;20;20;20", "600;660;40;40;40;40"]
    );
    assert_eq!(published[1].fields(), &["off", "2"]);
}

#[tokio::test]
async fn test_status_and_levels_commands() {
    let app = MockApp::new();
    app.link.set_connected(true);
    let panels = app.panels();

    panels.request_status(channel(3)).await.unwrap();
    panels.set_levels(channel(3), Levels([5, 10, 15, 20])).await.unwrap();

    let published = app.link.published();
    assert_eq!(published[0].to_wire().split(',').take(2).collect::<Vec<_>>(), ["status", "3"]);
    assert_eq!(published[1].fields(), &["set", "3", "5", "10", "15", "20"]);
}

#[test]
fn test_status_report_updates_telemetry() {
    let app = MockApp::new();
    let panels = app.panels();
    let mut events = app.sender.subscribe();
    app.monitor.tick();
    app.monitor.tick();

    let report = Message::encode(["status", "1", "10", "20", "30", "40", "25", "26", "27"]);
    panels.handle_inbound(&report.to_wire());

    assert_eq!(app.monitor.ticks(), 0);
    let telemetry = panels.telemetry(channel(1)).unwrap();
    assert_eq!(telemetry.levels, Levels([10, 20, 30, 40]));
    assert_eq!(telemetry.temperatures.0, [25, 26, 27]);
    assert!(matches!(events.try_recv(), Ok(ControllerEvent::Telemetry(_))));
}

#[test]
fn test_corrupted_message_is_dropped() {
    let app = MockApp::new();
    let panels = app.panels();
    app.monitor.tick();

    let wire = Message::encode(["status", "1", "10", "20", "30", "40", "25", "26", "27"]).to_wire();
    panels.handle_inbound(&wire.replacen("10", "90", 1));

    assert_eq!(app.monitor.ticks(), 1);
    assert!(panels.telemetry(channel(1)).is_none());
}

#[test]
fn test_any_valid_message_resets_heartbeat() {
    let app = MockApp::new();
    let panels = app.panels();
    let mut events = app.sender.subscribe();

    for fields in [vec!["check"], vec!["echo", "status", "1", "abc"], vec!["error", "1"]] {
        app.monitor.tick();
        panels.handle_inbound(&Message::encode(fields).to_wire());
        assert_eq!(app.monitor.ticks(), 0);
    }

    assert_eq!(
        events.try_recv().unwrap(),
        ControllerEvent::DeviceError(ErrorCode::ChecksumMismatch)
    );
}

#[test]
fn test_default_channels_match_device() {
    let app = MockApp::new();
    let panels = app.panels();

    assert_eq!(panels.channels(), vec![channel(1), channel(2), channel(3)]);
    assert!(matches!(panels.channel(4), Err(PanelError::UnknownChannel(4))));
}

#[tokio::test]
async fn test_configured_schedules_autostart_only_once() {
    let app = MockApp::new();
    app.link.set_connected(true);
    let panels = app.panels();
    panels.load_schedules(&[Schedule {
        channel: 1,
        activate: true,
        windows: vec![Window {
            start: String::from("08:00"),
            end: String::from("12:00"),
            levels: [20, 20, 20, 20],
        }],
    }]);

    panels.on_live().await;
    panels.on_live().await;
    assert_eq!(app.link.published().len(), 1);
    assert!(panels.is_active(channel(1)).unwrap());

    // Device rebooted after 08:00 already fired; the window must not come back.
    assert_eq!(panels.forget_activations(), vec![channel(1)]);
    assert!(!panels.is_active(channel(1)).unwrap());

    panels.on_live().await;
    assert_eq!(app.link.published().len(), 1);
    assert!(!panels.is_active(channel(1)).unwrap());
    assert_eq!(panels.schedule(channel(1)).unwrap().len(), 1);
}

#[test]
fn test_inbound_handler_does_not_keep_service_alive() {
    let app = MockApp::new();
    let panels = Arc::new(app.panels());
    let handler = panels.inbound_handler();
    assert_eq!(Arc::strong_count(&panels), 1);

    app.monitor.tick();
    handler(&Message::encode(["check"]).to_wire());
    assert_eq!(app.monitor.ticks(), 0);

    drop(panels);
    app.monitor.tick();
    handler(&Message::encode(["check"]).to_wire());
    assert_eq!(app.monitor.ticks(), 1);
}
