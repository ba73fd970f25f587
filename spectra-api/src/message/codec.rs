use core::fmt;

use sha2::{Digest, Sha256};

/// Field separator on the wire.
pub const SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer than a keyword and a checksum
    Malformed,
    /// Checksum field does not match the preceding fields
    ChecksumMismatch,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Malformed message"),
            Self::ChecksumMismatch => write!(f, "Checksum mismatch"),
        }
    }
}

impl std::error::Error for CodecError {}

/// A framed text message: ordered fields followed by a SHA-256 checksum.
///
/// The checksum covers every field followed by the separator, so
/// `["check"]` hashes `"check,"` and travels as `check,<hex digest>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    fields: Vec<String>,
    checksum: String,
}

impl Message {
    /// Frames the fields and computes their checksum.
    ///
    /// Fields must not contain the separator themselves; a field holding a
    /// comma comes back from [`Message::decode`] split in two.
    pub fn encode<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let checksum = checksum(&preimage(&fields));

        Self { fields, checksum }
    }

    /// Parses a raw payload and verifies its checksum.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let mut parts: Vec<&str> = raw.split(SEPARATOR).collect();
        if parts.len() < 2 {
            return Err(CodecError::Malformed);
        }

        let received = parts.pop().unwrap_or_default();
        let fields: Vec<String> = parts.into_iter().map(String::from).collect();

        if checksum(&preimage(&fields)) != received {
            return Err(CodecError::ChecksumMismatch);
        }

        Ok(Self {
            fields,
            checksum: received.to_string(),
        })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// First field, the command keyword.
    pub fn keyword(&self) -> Option<&str> {
        self.fields.first().map(String::as_str)
    }

    /// Fields after the keyword.
    pub fn args(&self) -> &[String] {
        self.fields.get(1..).unwrap_or_default()
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Renders the payload exactly as it is published.
    pub fn to_wire(&self) -> String {
        let mut wire = preimage(&self.fields);
        wire.push_str(&self.checksum);
        wire
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

fn preimage<S: AsRef<str>>(fields: &[S]) -> String {
    let mut joined = String::new();
    for field in fields {
        joined.push_str(field.as_ref());
        joined.push(SEPARATOR);
    }
    joined
}

/// Hex encoded SHA-256 of the given text.
pub fn checksum(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
