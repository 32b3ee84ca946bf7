//! Closed variant sets used by journal events, as the single source of truth
//! for their storage and wire strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Kind of care activity an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Sleep,
    Feed,
    Nappy,
}

impl EventType {
    /// String representation for storage and the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Feed => "feed",
            Self::Nappy => "nappy",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sleep" => Ok(Self::Sleep),
            "feed" => Ok(Self::Feed),
            "nappy" | "diaper" => Ok(Self::Nappy),
            _ => Err(ValidationError::UnknownVariant {
                field: "event type",
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How a feed was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Breast,
    Bottle,
    Solids,
}

impl FeedMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Breast => "breast",
            Self::Bottle => "bottle",
            Self::Solids => "solids",
        }
    }

    /// Maps the free-form `details` strings written by older servers.
    pub fn from_legacy_details(details: &str) -> Option<Self> {
        if details.contains("L&R") {
            Some(Self::Breast)
        } else if details.contains("Bottle") {
            Some(Self::Bottle)
        } else if details.contains("Solids") {
            Some(Self::Solids)
        } else {
            None
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breast" => Ok(Self::Breast),
            "bottle" => Ok(Self::Bottle),
            "solids" => Ok(Self::Solids),
            _ => Err(ValidationError::UnknownVariant {
                field: "feed mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Breast side of a feed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreastSide {
    Left,
    Right,
}

impl BreastSide {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    #[must_use]
    pub const fn other(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for BreastSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BreastSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            _ => Err(ValidationError::UnknownVariant {
                field: "breast side",
                value: s.to_string(),
            }),
        }
    }
}
