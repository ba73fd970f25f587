use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serialport::{SerialPort, available_ports};
use spectra_api::{ChannelId, DeviceReport, Levels, Temperatures};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::Span;

use crate::configs::settings::Actuator;
use crate::errors::DeviceError;
use crate::services::publisher::Publisher;

/// One actuator board taking `<...>` framed command lines.
pub trait ActuatorLink: Send + Sync {
    fn name(&self) -> &str;

    fn write_line(&self, line: &str) -> Result<(), DeviceError>;
}

pub fn set_line(channel: ChannelId, levels: Levels) -> String {
    let [far, near, visible, uv] = levels.0;
    format!("<set,{channel},{far},{near},{visible},{uv}>")
}

pub fn get_line(channel: ChannelId) -> String {
    format!("<get,{channel}>")
}

/// Parses `<status,ch,f,n,v,u,t1,t2,t3>`. Board notices containing `NO`
/// and anything else unexpected yield `None`.
pub fn parse_report(line: &str) -> Option<DeviceReport> {
    let line = line.trim();
    if line.is_empty() || line.contains("NO") {
        return None;
    }

    let body = line.trim_start_matches('<').trim_end_matches('>');
    let fields: Vec<&str> = body
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect();

    let (keyword, args) = fields.split_first()?;
    if !keyword.eq_ignore_ascii_case("status") || args.len() != 8 {
        return None;
    }

    Some(DeviceReport::Status {
        channel: args[0].parse().ok()?,
        levels: Levels::parse(&args[1..5])?,
        temperatures: Temperatures::parse(&args[5..8])?,
    })
}

/// Lists the serial ports to drive: the configured ones, or every port
/// whose name contains the filter.
pub fn discover_ports(actuator: &Actuator) -> Result<Vec<String>, DeviceError> {
    if let Some(paths) = &actuator.port_paths {
        return Ok(paths.clone());
    }

    let mut ports: Vec<String> = available_ports()?
        .into_iter()
        .map(|port| port.port_name)
        .filter(|name| name.contains(actuator.port_filter.as_str()))
        .collect();
    ports.sort();

    Ok(ports)
}

pub struct SerialLink {
    name: String,
    port: Mutex<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn open(path: &str, actuator: &Actuator) -> Result<Self, DeviceError> {
        tracing::debug!("Connect to port: {}", path);

        let port = serialport::new(path, actuator.baud_rate)
            .timeout(Duration::from_millis(actuator.read_timeout_ms))
            .open()?;

        Ok(Self {
            name: path.to_string(),
            port: Mutex::new(port),
        })
    }

    /// Reads status lines on a dedicated thread and hands the parsed reports
    /// to `sender` until the port fails or the receiver is gone.
    pub fn spawn_reader(&self, sender: UnboundedSender<DeviceReport>, span: Span) -> Result<thread::JoinHandle<()>, DeviceError> {
        let port = self.port.lock().unwrap_or_else(|e| e.into_inner()).try_clone()?;
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("reader {name}"))
            .spawn(move || read_reports(port, &name, sender, span))?;

        Ok(handle)
    }
}

impl ActuatorLink for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_line(&self, line: &str) -> Result<(), DeviceError> {
        let bytes_written = self
            .port
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .write(line.as_bytes())?;

        if bytes_written != line.len() {
            Err(DeviceError::IncompleteWrite(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

fn read_reports(port: Box<dyn SerialPort>, name: &str, sender: UnboundedSender<DeviceReport>, span: Span) {
    let mut reader = BufReader::new(port);
    let mut buffer = Vec::new();

    loop {
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => {
                tracing::warn!(parent: &span, "{name} closed");
                return;
            }
            Ok(_) if buffer.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&buffer).trim().to_string();
                buffer.clear();

                tracing::debug!(parent: &span, "{name}: {line}");
                if let Some(report) = parse_report(&line) {
                    if sender.send(report).is_err() {
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
            Err(e) => {
                tracing::error!(parent: &span, "reading {name} failed: {e}");
                return;
            }
        }
    }
}

/// Fans command lines out to every actuator board.
pub struct ActuatorHub {
    links: Vec<Arc<dyn ActuatorLink>>,
    span: Span,
}

impl ActuatorHub {
    pub fn new(links: Vec<Arc<dyn ActuatorLink>>, span: Span) -> Self {
        Self { links, span }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn broadcast(&self, line: &str) {
        for link in &self.links {
            if let Err(e) = link.write_line(line) {
                tracing::error!(parent: &self.span, "cannot write {line} to {}: {e}", link.name());
            }
        }
    }

    pub fn set(&self, channel: ChannelId, levels: Levels) {
        self.broadcast(&set_line(channel, levels));
    }

    pub fn get(&self, channel: ChannelId) {
        self.broadcast(&get_line(channel));
    }
}

/// Publishes reports read from the boards until every reader has stopped.
pub async fn forward_reports(
    mut receiver: UnboundedReceiver<DeviceReport>,
    publisher: Arc<dyn Publisher>,
    topic: String,
    span: Span,
) {
    while let Some(report) = receiver.recv().await {
        if let Err(e) = publisher.publish(&topic, report.to_fields()).await {
            tracing::warn!(parent: &span, "dropped report {:?}: {e}", report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u8) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    struct RecordingLink(Mutex<Vec<String>>);

    impl ActuatorLink for RecordingLink {
        fn name(&self) -> &str {
            "recording"
        }

        fn write_line(&self, line: &str) -> Result<(), DeviceError> {
            self.0.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(set_line(channel(2), Levels([10, 20, 30, 40])), "<set,2,10,20,30,40>");
        assert_eq!(get_line(channel(3)), "<get,3>");
    }

    #[test]
    fn test_parse_report() {
        let report = parse_report("<status,1,10,20,30,40,25,26,27>\r").unwrap();
        assert_eq!(
            report,
            DeviceReport::Status {
                channel: channel(1),
                levels: Levels([10, 20, 30, 40]),
                temperatures: Temperatures([25, 26, 27]),
            }
        );
        assert_eq!(parse_report("<status,1,10,20,30,40,25,26,27,>"), Some(report));
    }

    #[test]
    fn test_parse_report_rejects_noise() {
        assert_eq!(parse_report(""), None);
        assert_eq!(parse_report("NO SENSOR"), None);
        assert_eq!(parse_report("<status,1,10,20,30,40,25,26>"), None);
        assert_eq!(parse_report("<status,1,10,20,300,40,25,26,27>"), None);
        assert_eq!(parse_report("<ready>"), None);
    }

    #[test]
    fn test_hub_broadcasts_to_every_link() {
        let first = Arc::new(RecordingLink(Mutex::new(Vec::new())));
        let second = Arc::new(RecordingLink(Mutex::new(Vec::new())));
        let hub = ActuatorHub::new(vec![first.clone() as Arc<dyn ActuatorLink>, second.clone()], Span::none());

        hub.set(channel(1), Levels([1, 2, 3, 4]));
        hub.get(channel(1));

        for link in [first, second] {
            assert_eq!(*link.0.lock().unwrap(), vec!["<set,1,1,2,3,4>", "<get,1>"]);
        }
    }
}
