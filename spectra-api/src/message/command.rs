use core::fmt;
use core::str::FromStr;

use crate::message::Message;
use crate::models::{ChannelId, Levels, Temperatures};
use crate::schedule::ScheduleStore;

/// Command keyword, the first field of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Status,
    Set,
    On,
    Off,
    Check,
    Echo,
    Error,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Status => "status",
            Keyword::Set => "set",
            Keyword::On => "on",
            Keyword::Off => "off",
            Keyword::Check => "check",
            Keyword::Echo => "echo",
            Keyword::Error => "error",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Keyword {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Keyword::Status,
            Keyword::Set,
            Keyword::On,
            Keyword::Off,
            Keyword::Check,
            Keyword::Echo,
            Keyword::Error,
        ]
        .into_iter()
        .find(|keyword| keyword.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| CommandError::UnknownKeyword(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Keyword not understood by this end
    UnknownKeyword(String),
    /// Keyword valid here but arguments missing or not numeric
    InvalidArguments(Keyword),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKeyword(keyword) => write!(f, "Unknown keyword: {:?}", keyword),
            Self::InvalidArguments(keyword) => write!(f, "Invalid arguments for {}", keyword),
        }
    }
}

impl std::error::Error for CommandError {}

/// Numeric codes carried by `error` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// An inbound command failed its checksum
    ChecksumMismatch,
    /// An inbound command was valid but not understood
    UnknownCommand,
    Other(u16),
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        match self {
            ErrorCode::ChecksumMismatch => 1,
            ErrorCode::UnknownCommand => 2,
            ErrorCode::Other(code) => *code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            1 => ErrorCode::ChecksumMismatch,
            2 => ErrorCode::UnknownCommand,
            other => ErrorCode::Other(other),
        }
    }
}

/// Commands sent from the controller to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCommand {
    Status { channel: ChannelId },
    Set { channel: ChannelId, levels: Levels },
    /// Replaces the device-side schedule of a channel. Entries stay in their
    /// `start;end;v0;v1;v2;v3` form so the device can skip bad ones
    /// individually.
    Activate { channel: ChannelId, entries: Vec<String> },
    Deactivate { channel: ChannelId },
}

impl ControllerCommand {
    pub fn activate(channel: ChannelId, store: &ScheduleStore) -> Self {
        Self::Activate {
            channel,
            entries: store.entries(),
        }
    }

    pub fn channel(&self) -> ChannelId {
        match self {
            Self::Status { channel }
            | Self::Set { channel, .. }
            | Self::Activate { channel, .. }
            | Self::Deactivate { channel } => *channel,
        }
    }

    pub fn keyword(&self) -> Keyword {
        match self {
            Self::Status { .. } => Keyword::Status,
            Self::Set { .. } => Keyword::Set,
            Self::Activate { .. } => Keyword::On,
            Self::Deactivate { .. } => Keyword::Off,
        }
    }

    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![self.keyword().to_string(), self.channel().to_string()];
        match self {
            Self::Set { levels, .. } => fields.extend(levels.to_fields()),
            Self::Activate { entries, .. } => fields.extend(entries.iter().cloned()),
            Self::Status { .. } | Self::Deactivate { .. } => {}
        }
        fields
    }

    pub fn to_message(&self) -> Message {
        Message::encode(self.to_fields())
    }
}

impl TryFrom<&Message> for ControllerCommand {
    type Error = CommandError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        let keyword: Keyword = message.keyword().unwrap_or_default().parse()?;
        let args = message.args();
        let invalid = || CommandError::InvalidArguments(keyword);

        let channel = args
            .first()
            .and_then(|field| field.parse::<ChannelId>().ok());

        match keyword {
            Keyword::Status => Ok(Self::Status {
                channel: channel.ok_or_else(invalid)?,
            }),
            Keyword::Set => Ok(Self::Set {
                channel: channel.ok_or_else(invalid)?,
                levels: Levels::parse(&args[1..]).ok_or_else(invalid)?,
            }),
            Keyword::On => Ok(Self::Activate {
                channel: channel.ok_or_else(invalid)?,
                entries: args[1..]
                    .iter()
                    .filter(|entry| !entry.trim().is_empty())
                    .cloned()
                    .collect(),
            }),
            Keyword::Off => Ok(Self::Deactivate {
                channel: channel.ok_or_else(invalid)?,
            }),
            other => Err(CommandError::UnknownKeyword(other.to_string())),
        }
    }
}

/// Reports sent from the device to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReport {
    Status {
        channel: ChannelId,
        levels: Levels,
        temperatures: Temperatures,
    },
    /// Periodic liveness ping
    Check,
    /// Reflection of a raw inbound command, valid or not
    Echo(String),
    Error(ErrorCode),
}

impl DeviceReport {
    pub fn keyword(&self) -> Keyword {
        match self {
            Self::Status { .. } => Keyword::Status,
            Self::Check => Keyword::Check,
            Self::Echo(_) => Keyword::Echo,
            Self::Error(_) => Keyword::Error,
        }
    }

    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![self.keyword().to_string()];
        match self {
            Self::Status {
                channel,
                levels,
                temperatures,
            } => {
                fields.push(channel.to_string());
                fields.extend(levels.to_fields());
                fields.extend(temperatures.to_fields());
            }
            Self::Check => {}
            Self::Echo(raw) => fields.push(raw.clone()),
            Self::Error(code) => fields.push(code.code().to_string()),
        }
        fields
    }

    pub fn to_message(&self) -> Message {
        Message::encode(self.to_fields())
    }
}

impl TryFrom<&Message> for DeviceReport {
    type Error = CommandError;

    fn try_from(message: &Message) -> Result<Self, CommandError> {
        let keyword: Keyword = message.keyword().unwrap_or_default().parse()?;
        let args = message.args();
        let invalid = || CommandError::InvalidArguments(keyword);

        match keyword {
            Keyword::Status => {
                if args.len() != 8 {
                    return Err(invalid());
                }
                Ok(Self::Status {
                    channel: args[0].parse().map_err(|_| invalid())?,
                    levels: Levels::parse(&args[1..5]).ok_or_else(invalid)?,
                    temperatures: Temperatures::parse(&args[5..8]).ok_or_else(invalid)?,
                })
            }
            Keyword::Check => Ok(Self::Check),
            // The reflected payload contains separators of its own.
            Keyword::Echo => Ok(Self::Echo(args.join(","))),
            Keyword::Error => {
                let code = args
                    .first()
                    .and_then(|field| field.trim().parse::<u16>().ok())
                    .ok_or_else(invalid)?;
                Ok(DeviceReport::Error(ErrorCode::from_code(code)))
            }
            other => Err(CommandError::UnknownKeyword(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u8) -> ChannelId {
        ChannelId::new(id).unwrap()
    }

    #[test]
    fn test_keyword_parse() {
        assert_eq!("set".parse::<Keyword>().unwrap(), Keyword::Set);
        assert_eq!("ON".parse::<Keyword>().unwrap(), Keyword::On);
        assert!(matches!(
            "reboot".parse::<Keyword>(),
            Err(CommandError::UnknownKeyword(_))
        ));
    }

    #[test]
    fn test_set_command_fields() {
        let command = ControllerCommand::Set {
            channel: channel(1),
            levels: Levels([10, 20, 30, 40]),
        };
        assert_eq!(command.to_fields(), vec!["set", "1", "10", "20", "30", "40"]);

        let decoded = Message::decode(&command.to_message().to_wire()).unwrap();
        assert_eq!(ControllerCommand::try_from(&decoded).unwrap(), command);
    }

    #[test]
    fn test_activate_carries_one_field_per_window() {
        let mut store = ScheduleStore::new();
        store.add_window(540, 600, [20, 20, 20, 20]).unwrap();
        store.add_window(600, 660, [40, 40, 40, 40]).unwrap();

        let command = ControllerCommand::activate(channel(2), &store);
        let wire = command.to_message().to_wire();
        assert!(wire.starts_with("on,2,540;600;20;20;20;20,600;660;40;40;40;40,"));

        let decoded = Message::decode(&wire).unwrap();
        match ControllerCommand::try_from(&decoded).unwrap() {
            ControllerCommand::Activate { channel, entries } => {
                assert_eq!(channel.get(), 2);
                assert_eq!(entries, store.entries());
            }
            other => panic!("Expected Activate, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_controller_commands() {
        let missing_channel = Message::encode(["status"]);
        assert_eq!(
            ControllerCommand::try_from(&missing_channel),
            Err(CommandError::InvalidArguments(Keyword::Status))
        );

        let bad_level = Message::encode(["set", "1", "10", "x", "30", "40"]);
        assert_eq!(
            ControllerCommand::try_from(&bad_level),
            Err(CommandError::InvalidArguments(Keyword::Set))
        );

        let report_keyword = Message::encode(["check"]);
        assert!(matches!(
            ControllerCommand::try_from(&report_keyword),
            Err(CommandError::UnknownKeyword(_))
        ));
    }

    #[test]
    fn test_status_report_roundtrip() {
        let report = DeviceReport::Status {
            channel: channel(3),
            levels: Levels([1, 2, 3, 4]),
            temperatures: Temperatures([20, 21, 22]),
        };
        let decoded = Message::decode(&report.to_message().to_wire()).unwrap();

        assert_eq!(DeviceReport::try_from(&decoded).unwrap(), report);
    }

    #[test]
    fn test_echo_reflects_raw_payload() {
        let raw = ControllerCommand::Status { channel: channel(1) }
            .to_message()
            .to_wire();
        let echo = DeviceReport::Echo(raw.clone()).to_message();
        let decoded = Message::decode(&echo.to_wire()).unwrap();

        assert_eq!(DeviceReport::try_from(&decoded).unwrap(), DeviceReport::Echo(raw));
    }

    #[test]
    fn test_error_report_codes() {
        let decoded = Message::decode(&DeviceReport::Error(ErrorCode::ChecksumMismatch).to_message().to_wire()).unwrap();
        assert_eq!(decoded.fields(), ["error", "1"]);
        assert_eq!(
            DeviceReport::try_from(&decoded).unwrap(),
            DeviceReport::Error(ErrorCode::ChecksumMismatch)
        );
        assert_eq!(ErrorCode::from_code(7), ErrorCode::Other(7));
    }
}
