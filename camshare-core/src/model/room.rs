use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Characters a room code may contain. I, O, 0 and 1 are left out because they
/// are easy to misread when a code is copied by hand.
pub const ROOM_ID_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const ROOM_ID_SEGMENTS: usize = 4;

pub const ROOM_ID_SEGMENT_LENGTH: usize = 3;

pub const ROOM_ID_SEPARATOR: char = '-';

/// Example shown to users whenever a code is rejected.
pub const ROOM_ID_EXAMPLE: &str = "ABC-DEF-GHJ-KLM";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomIdError {
    #[error("room ID is empty")]
    Empty,

    #[error("room ID must have {ROOM_ID_SEGMENTS} segments, found {found}")]
    SegmentCount { found: usize },

    #[error("segment '{segment}' must be {ROOM_ID_SEGMENT_LENGTH} characters long")]
    SegmentLength { segment: String },

    #[error("'{ch}' is not allowed in a room ID")]
    InvalidCharacter { ch: char },
}

impl RoomIdError {
    /// Message suitable for showing next to the input field.
    pub fn hint(&self) -> String {
        format!("Invalid room ID format (example: {ROOM_ID_EXAMPLE})")
    }
}

/// Human-shareable address of a camera: `XXX-XXX-XXX-XXX`.
///
/// A value of this type is always in canonical form (trimmed, upper-case,
/// four segments of three characters from [`ROOM_ID_ALPHABET`]).
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Draws a fresh code uniformly from the alphabet.
    ///
    /// Room codes are discovery addresses, not secrets, so the thread-local
    /// generator is sufficient.
    pub fn generate() -> Self {
        let alphabet = ROOM_ID_ALPHABET.as_bytes();
        let mut rng = rand::rng();

        let segments: Vec<String> = (0..ROOM_ID_SEGMENTS)
            .map(|_| {
                (0..ROOM_ID_SEGMENT_LENGTH)
                    .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
                    .collect()
            })
            .collect();

        Self(segments.join(&ROOM_ID_SEPARATOR.to_string()))
    }

    /// Normalizes `input` and validates the result.
    pub fn parse(input: &str) -> Result<Self, RoomIdError> {
        let normalized = normalize(input);
        check(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first two segments, e.g. `ABC-DEF`.
    pub fn short_label(&self) -> &str {
        let end = ROOM_ID_SEGMENT_LENGTH * 2 + 1;
        &self.0[..end]
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

/// Trims surrounding whitespace and upper-cases.
pub fn normalize(input: &str) -> String {
    input.trim().to_uppercase()
}

/// True when `code` is already a canonical room ID. Lower-case or padded
/// input is rejected; run it through [`normalize`] (or use [`RoomId::parse`])
/// first.
pub fn is_valid(code: &str) -> bool {
    check(code).is_ok()
}

fn check(code: &str) -> Result<(), RoomIdError> {
    if code.is_empty() {
        return Err(RoomIdError::Empty);
    }

    let segments: Vec<&str> = code.split(ROOM_ID_SEPARATOR).collect();
    if segments.len() != ROOM_ID_SEGMENTS {
        return Err(RoomIdError::SegmentCount {
            found: segments.len(),
        });
    }

    for segment in segments {
        if segment.chars().count() != ROOM_ID_SEGMENT_LENGTH {
            return Err(RoomIdError::SegmentLength {
                segment: segment.to_owned(),
            });
        }
        if let Some(ch) = segment.chars().find(|c| !ROOM_ID_ALPHABET.contains(*c)) {
            return Err(RoomIdError::InvalidCharacter { ch });
        }
    }

    Ok(())
}
