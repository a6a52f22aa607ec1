//! Error taxonomy for frame decryption and line classification

use crate::frame::MType;
use lora_coverage_core::MacAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failures reported by a [`FrameDecryptor`](crate::FrameDecryptor)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The wire text or frame layout is malformed
    #[error("Frame parse error: {message}")]
    Parse {
        /// What was wrong with the frame
        message: String,
    },

    /// The message integrity code does not match the network session key
    #[error("MIC validation failed for device {device}")]
    MicValidation {
        /// Device address claimed by the frame
        device: String,
    },

    /// The frame payload could not be decrypted
    #[error("Decryption failed: {message}")]
    Decryption {
        /// Failure reason
        message: String,
    },

    /// The MAC payload is not a data frame
    #[error("Unexpected MAC payload: {mtype}")]
    UnexpectedMacPayload {
        /// Message type found in the MHDR
        mtype: MType,
    },

    /// The data frame carries no application payload
    #[error("Unexpected frame payload: {reason}")]
    UnexpectedFramePayload {
        /// What was found instead
        reason: String,
    },
}

impl FrameError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a decryption error
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Create an unexpected frame payload error
    pub fn unexpected_frame_payload(reason: impl Into<String>) -> Self {
        Self::UnexpectedFramePayload {
            reason: reason.into(),
        }
    }

    /// The countable kind of this failure
    #[must_use]
    pub const fn kind(&self) -> RejectKind {
        match self {
            Self::Parse { .. } => RejectKind::FrameParse,
            Self::MicValidation { .. } => RejectKind::MicValidation,
            Self::Decryption { .. } => RejectKind::Decryption,
            Self::UnexpectedMacPayload { .. } => RejectKind::UnexpectedMacPayload,
            Self::UnexpectedFramePayload { .. } => RejectKind::UnexpectedFramePayload,
        }
    }
}

/// Per-line classification failures
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The line is not a JSON log event
    #[error("Unparseable log line: {0}")]
    LineParse(#[source] serde_json::Error),

    /// The uplink event's fields do not form a reception record
    #[error("Invalid uplink record: {0}")]
    InvalidRecord(#[source] serde_json::Error),

    /// The concentrator reported a failed CRC
    #[error("Invalid CRC ({crc}) from gateway {gateway}")]
    InvalidCrc {
        /// Receiving gateway
        gateway: MacAddress,
        /// Reported CRC status
        crc: i8,
    },

    /// Frame parsing, authentication or decryption failed
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The decrypted payload is not a 6 or 7 byte geolocation
    #[error("Invalid payload length: {length} bytes (expected 6 or 7)")]
    InvalidPayloadLength {
        /// Actual payload length
        length: usize,
    },
}

impl ClassifyError {
    /// The countable kind of this failure
    #[must_use]
    pub const fn kind(&self) -> RejectKind {
        match self {
            Self::LineParse(_) => RejectKind::LineParse,
            Self::InvalidRecord(_) => RejectKind::InvalidRecord,
            Self::InvalidCrc { .. } => RejectKind::InvalidCrc,
            Self::Frame(err) => err.kind(),
            Self::InvalidPayloadLength { .. } => RejectKind::InvalidPayloadLength,
        }
    }
}

/// Closed set of failure kinds, one per distinguishable condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    /// Line is not JSON
    LineParse,
    /// Uplink fields are malformed
    InvalidRecord,
    /// Negative CRC status
    InvalidCrc,
    /// Malformed frame
    FrameParse,
    /// MIC mismatch
    MicValidation,
    /// Payload decryption failed
    Decryption,
    /// Not a data frame
    UnexpectedMacPayload,
    /// No application payload
    UnexpectedFramePayload,
    /// Geolocation payload of the wrong length
    InvalidPayloadLength,
}

impl RejectKind {
    /// Every kind, in evaluation order
    pub const ALL: [Self; 9] = [
        Self::LineParse,
        Self::InvalidRecord,
        Self::InvalidCrc,
        Self::FrameParse,
        Self::MicValidation,
        Self::Decryption,
        Self::UnexpectedMacPayload,
        Self::UnexpectedFramePayload,
        Self::InvalidPayloadLength,
    ];

    /// Stable snake case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LineParse => "line_parse",
            Self::InvalidRecord => "invalid_record",
            Self::InvalidCrc => "invalid_crc",
            Self::FrameParse => "frame_parse",
            Self::MicValidation => "mic_validation",
            Self::Decryption => "decryption",
            Self::UnexpectedMacPayload => "unexpected_mac_payload",
            Self::UnexpectedFramePayload => "unexpected_frame_payload",
            Self::InvalidPayloadLength => "invalid_payload_length",
        }
    }
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
