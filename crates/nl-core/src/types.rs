//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An enum string did not match any known variant.
    #[error("invalid {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },

    /// Neither a `start_ts` nor a `ts` was present.
    #[error("event {event_id} has no temporal anchor")]
    MissingAnchor { event_id: String },

    /// An edit targeted the wrong anchor shape (e.g. `ts` on a sleep).
    #[error("event {event_id} does not have that kind of timestamp")]
    AnchorMismatch { event_id: String },

    /// An interval would end before it starts.
    #[error("interval ends before it starts: {start}..{end}")]
    InvalidSpan { start: i64, end: i64 },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Globally unique, immutable identifier of a journal event.
    EventId,
    "event_id"
);

define_string_id!(
    /// Identifier of the device that created or last mutated a record.
    DeviceId,
    "device_id"
);

impl EventId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_empty_and_whitespace() {
        assert_eq!(
            EventId::new(""),
            Err(ValidationError::Empty { field: "event_id" })
        );
        assert_eq!(
            DeviceId::new("  "),
            Err(ValidationError::Empty { field: "device_id" })
        );
    }

    #[test]
    fn generated_event_ids_are_uuids_and_distinct() {
        let a = EventId::generate();
        let b = EventId::generate();
        assert_ne!(a, b);
        Uuid::parse_str(a.as_str()).unwrap();
    }

    #[test]
    fn ids_deserialize_with_validation() {
        let parsed: DeviceId = serde_json::from_str("\"phone-1\"").unwrap();
        assert_eq!(parsed.as_str(), "phone-1");
        assert!(serde_json::from_str::<EventId>("\"\"").is_err());
    }
}
