//! Error types for LoRa coverage mapping

use std::{error::Error as StdError, fmt};

/// Main error type shared by the coverage crates
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Configuration {
        /// Error message
        message: String,
    },

    /// Validation error
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Database error
    Database(String),

    /// The observation is already stored under the same
    /// `(gateway, device, time, payload)` key
    DuplicateObservation {
        /// Gateway MAC address
        gateway: String,
        /// Device address
        device: String,
        /// Reception time
        time: String,
    },

    /// A MAC address did not decode to exactly eight bytes
    MacAddressSize {
        /// Number of bytes actually decoded
        actual: usize,
    },

    /// Text was not valid hexadecimal
    InvalidHex {
        /// The offending input
        input: String,
        /// Decoder message
        message: String,
    },

    /// A timestamp did not match the compact time format
    TimeFormat {
        /// The offending input
        input: String,
        /// Parser message
        message: String,
    },

    /// A data rate tag was empty or malformed
    InvalidDataRate {
        /// The offending input
        input: String,
    },

    /// A session key was not 16 bytes of hex
    InvalidKey {
        /// Reason the key was rejected
        message: String,
    },

    /// Serialization error
    Serialization(serde_json::Error),

    /// Other error
    Other(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is the non-fatal duplicate insert condition
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateObservation { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            Self::Validation { field, message } => {
                write!(f, "Validation error: {field} - {message}")
            }
            Self::Database(msg) => write!(f, "Database error: {msg}"),
            Self::DuplicateObservation {
                gateway,
                device,
                time,
            } => write!(
                f,
                "Duplicate observation: gateway {gateway}, device {device} at {time}"
            ),
            Self::MacAddressSize { actual } => {
                write!(f, "Wrong mac address size: {actual} bytes (expected 8)")
            }
            Self::InvalidHex { input, message } => {
                write!(f, "Invalid hex '{input}': {message}")
            }
            Self::TimeFormat { input, message } => {
                write!(f, "Invalid time '{input}': {message}")
            }
            Self::InvalidDataRate { input } => write!(f, "Invalid data rate: '{input}'"),
            Self::InvalidKey { message } => write!(f, "Invalid session key: {message}"),
            Self::Serialization(err) => write!(f, "Serialization error: {err}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// From implementations for automatic conversions
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let app_error = Error::from(io_error);

        assert!(matches!(app_error, Error::Io(_)));
        assert!(format!("{}", app_error).contains("I/O error"));
        assert!(app_error.source().is_some());
    }

    #[test]
    fn test_duplicate_observation_display() {
        let error = Error::DuplicateObservation {
            gateway: "0080000000000001".to_string(),
            device: "26011bda".to_string(),
            time: "2018-03-02T10:21:17.589871Z".to_string(),
        };

        assert!(error.is_duplicate());
        assert_eq!(
            error.to_string(),
            "Duplicate observation: gateway 0080000000000001, device 26011bda at 2018-03-02T10:21:17.589871Z"
        );
    }

    #[test]
    fn test_mac_address_size_display() {
        let error = Error::MacAddressSize { actual: 6 };
        assert_eq!(
            error.to_string(),
            "Wrong mac address size: 6 bytes (expected 8)"
        );
        assert!(!error.is_duplicate());
    }

    #[test]
    fn test_serialization_error_source() {
        let json_error = serde_json::from_str::<serde_json::Value>("{oops}").unwrap_err();
        let app_error = Error::from(json_error);

        assert!(matches!(app_error, Error::Serialization(_)));
        assert!(app_error.source().is_some());
    }

    #[test]
    fn test_error_source_for_message_variants() {
        let errors = vec![
            Error::Configuration {
                message: "missing".to_string(),
            },
            Error::Database("locked".to_string()),
            Error::TimeFormat {
                input: "yesterday".to_string(),
                message: "input contains invalid characters".to_string(),
            },
            Error::InvalidDataRate {
                input: String::new(),
            },
        ];

        for error in errors {
            assert!(error.source().is_none(), "{error} should have no source");
        }
    }
}
