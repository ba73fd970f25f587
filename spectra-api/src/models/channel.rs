use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Highest intensity a band accepts, in percent.
pub const MAX_LEVEL: u8 = 100;

/// 1-based panel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(u8);

impl ChannelId {
    pub fn new(id: u8) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based position for table lookups.
    pub fn index(&self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u8>().ok().and_then(Self::new).ok_or(())
    }
}

/// Output bands of a panel, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    FarInfrared,
    NearInfrared,
    Visible,
    Ultraviolet,
}

impl Band {
    pub const ALL: [Band; 4] = [
        Band::FarInfrared,
        Band::NearInfrared,
        Band::Visible,
        Band::Ultraviolet,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Band::FarInfrared => "F-IR",
            Band::NearInfrared => "N-IR",
            Band::Visible => "VIS",
            Band::Ultraviolet => "UV",
        }
    }
}

/// Intensity per band, 0-100 percent each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Levels(pub [u8; 4]);

impl Levels {
    pub const OFF: Levels = Levels([0; 4]);

    /// Builds levels, rejecting any band above [`MAX_LEVEL`].
    pub fn new(values: [u8; 4]) -> Option<Self> {
        values
            .iter()
            .all(|value| *value <= MAX_LEVEL)
            .then_some(Self(values))
    }

    pub fn get(&self, band: Band) -> u8 {
        self.0[band as usize]
    }

    /// Parses four decimal fields; `None` on a bad count, a non-number or
    /// a value out of range.
    pub fn parse<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        if fields.len() != 4 {
            return None;
        }

        let mut values = [0u8; 4];
        for (slot, field) in values.iter_mut().zip(fields) {
            *slot = field.as_ref().trim().parse().ok()?;
        }

        Self::new(values)
    }

    pub fn to_fields(&self) -> [String; 4] {
        self.0.map(|value| value.to_string())
    }
}

impl fmt::Display for Levels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [far, near, visible, uv] = self.0;
        write!(f, "[{far}, {near}, {visible}, {uv}]")
    }
}

/// Up to three temperature probes per panel, in degrees Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperatures(pub [i32; 3]);

impl Temperatures {
    pub fn parse<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        if fields.len() != 3 {
            return None;
        }

        let mut values = [0i32; 3];
        for (slot, field) in values.iter_mut().zip(fields) {
            *slot = field.as_ref().trim().parse().ok()?;
        }

        Some(Self(values))
    }

    pub fn to_fields(&self) -> [String; 3] {
        self.0.map(|value| value.to_string())
    }
}
