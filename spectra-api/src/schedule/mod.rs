//! Time windows of pre-programmed panel output.
//!
//! The controller authors a [`ScheduleStore`] per channel and ships it in an
//! `on` command; the device keeps its own copy and consumes each window the
//! first time the wall clock falls inside it.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Levels;

/// Last minute of a day.
pub const LAST_MINUTE: u16 = 24 * 60 - 1;

const ENTRY_SEPARATOR: char = ';';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A band value above 100
    ValueOutOfRange,
    /// Start not before end, or end past the last minute of the day
    OutOfRange { start: u16, end: u16 },
    /// Intersects an existing window or repeats one of its endpoints
    Overlap { existing: ScheduleWindow },
    /// Entry text is not `start;end;v0;v1;v2;v3`
    InvalidEntry(String),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueOutOfRange => write!(f, "Value out of range (0-100)"),
            Self::OutOfRange { start, end } => {
                write!(f, "Invalid interval {}-{}", format_minute(*start), format_minute(*end))
            }
            Self::Overlap { existing } => write!(f, "Overlaps window {}", existing),
            Self::InvalidEntry(entry) => write!(f, "Invalid schedule entry: {:?}", entry),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Minutes since midnight for a wall clock time.
pub fn minute_of_day(hour: u8, minute: u8) -> u16 {
    u16::from(hour) * 60 + u16::from(minute)
}

/// Parses `HH:MM` into a minute of day.
pub fn parse_minute(text: &str) -> Option<u16> {
    let (hour, minute) = text.trim().split_once(':')?;
    let hour: u8 = hour.parse().ok()?;
    let minute: u8 = minute.parse().ok()?;

    (hour < 24 && minute < 60).then(|| minute_of_day(hour, minute))
}

/// Renders a minute of day as `HH:MM`.
pub fn format_minute(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: u16,
    pub end: u16,
    pub levels: Levels,
}

impl ScheduleWindow {
    pub fn new(start: u16, end: u16, values: [u8; 4]) -> Result<Self, ScheduleError> {
        let levels = Levels::new(values).ok_or(ScheduleError::ValueOutOfRange)?;

        if start >= end || end > LAST_MINUTE {
            return Err(ScheduleError::OutOfRange { start, end });
        }

        Ok(Self { start, end, levels })
    }

    /// Inclusive on both ends.
    pub fn contains(&self, minute: u16) -> bool {
        self.start <= minute && minute <= self.end
    }

    /// Windows conflict when they repeat a start or an end, or when their
    /// interiors intersect. Back-to-back windows (`a.end == b.start`) do not.
    pub fn conflicts_with(&self, other: &ScheduleWindow) -> bool {
        self.start == other.start
            || self.end == other.end
            || (self.start < other.end && other.start < self.end)
    }

    /// Wire form of one window: `start;end;v0;v1;v2;v3`.
    pub fn to_entry(&self) -> String {
        let [v0, v1, v2, v3] = self.levels.0;
        format!("{};{};{v0};{v1};{v2};{v3}", self.start, self.end)
    }

    pub fn parse_entry(entry: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidEntry(entry.to_string());

        let parts: Vec<&str> = entry.trim().split(ENTRY_SEPARATOR).collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let start = parts[0].parse::<u16>().map_err(|_| invalid())?;
        let end = parts[1].parse::<u16>().map_err(|_| invalid())?;

        let mut values = [0u8; 4];
        for (slot, part) in values.iter_mut().zip(&parts[2..]) {
            *slot = part.parse::<u8>().map_err(|_| ScheduleError::ValueOutOfRange)?;
        }

        Self::new(start, end, values)
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {}",
            format_minute(self.start),
            format_minute(self.end),
            self.levels
        )
    }
}

/// Ordered, non-overlapping windows of one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStore {
    windows: Vec<ScheduleWindow>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and inserts a window, keeping the store sorted by start.
    pub fn add_window(&mut self, start: u16, end: u16, values: [u8; 4]) -> Result<ScheduleWindow, ScheduleError> {
        let window = ScheduleWindow::new(start, end, values)?;
        self.insert(window)?;
        Ok(window)
    }

    pub fn insert(&mut self, window: ScheduleWindow) -> Result<(), ScheduleError> {
        if let Some(existing) = self.windows.iter().find(|w| w.conflicts_with(&window)) {
            return Err(ScheduleError::Overlap { existing: *existing });
        }

        self.windows.push(window);
        self.windows.sort_by_key(|w| w.start);

        Ok(())
    }

    /// Removes an exactly matching window, returning whether one was found.
    pub fn remove_window(&mut self, window: &ScheduleWindow) -> bool {
        match self.windows.iter().position(|w| w == window) {
            Some(index) => {
                self.windows.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes and returns every window containing `minute`.
    pub fn take_due(&mut self, minute: u16) -> Vec<ScheduleWindow> {
        let (due, pending) = self.windows.iter().partition(|w| w.contains(minute));
        self.windows = pending;
        due
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleWindow> {
        self.windows.iter()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// One `start;end;v0;v1;v2;v3` entry per window, in order.
    pub fn entries(&self) -> Vec<String> {
        self.windows.iter().map(ScheduleWindow::to_entry).collect()
    }

    /// Flattened form: every entry followed by a comma.
    pub fn serialize(&self) -> String {
        self.windows
            .iter()
            .map(|w| format!("{},", w.to_entry()))
            .collect()
    }
}
