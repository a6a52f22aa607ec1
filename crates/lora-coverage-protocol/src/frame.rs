//! LoRaWAN frame layout and the decryptor contract
//!
//! A PHY payload is `MHDR | MACPayload | MIC`. For data frames the MAC payload
//! is `FHDR | FPort | FRMPayload` with `FHDR = DevAddr | FCtrl | FCnt | FOpts`.
//! Multi-byte fields are little-endian on the air.

use crate::error::FrameError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use lora_coverage_core::{DevAddr, SessionKeys};
use serde::Serialize;
use std::fmt;

/// Largest PHY payload a LoRa radio can carry
pub const MAX_PHY_PAYLOAD: usize = 255;

/// `MHDR(1) + FHDR(7) + MIC(4)`
pub const MIN_DATA_FRAME: usize = 12;

/// Authenticates and decrypts one wire-encoded frame
///
/// Implementations must run the stages in order (parse, MIC check, payload
/// decryption, payload kind check) and stop at the first failure.
pub trait FrameDecryptor: Send + Sync {
    /// Decrypt `wire` with the given session keys
    ///
    /// # Errors
    ///
    /// Returns the [`FrameError`] of the first failing stage.
    fn decrypt(&self, wire: &str, keys: &SessionKeys) -> Result<DecryptedFrame, FrameError>;
}

/// Plaintext application payload of an authenticated data frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecryptedFrame {
    /// Originating device
    pub dev_addr: DevAddr,
    /// Message type
    pub mtype: MType,
    /// Transmitted frame counter
    pub fcnt: u16,
    /// Application port
    pub fport: u8,
    /// Decrypted FRMPayload
    pub payload: Vec<u8>,
}

/// Message type carried in the top three MHDR bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MType {
    /// Join request
    JoinRequest,
    /// Join accept
    JoinAccept,
    /// Unconfirmed data up
    UnconfirmedDataUp,
    /// Unconfirmed data down
    UnconfirmedDataDown,
    /// Confirmed data up
    ConfirmedDataUp,
    /// Confirmed data down
    ConfirmedDataDown,
    /// Rejoin request
    RejoinRequest,
    /// Proprietary
    Proprietary,
}

impl MType {
    /// Decode the message type of an MHDR byte
    #[must_use]
    pub const fn from_mhdr(mhdr: u8) -> Self {
        match mhdr >> 5 {
            0 => Self::JoinRequest,
            1 => Self::JoinAccept,
            2 => Self::UnconfirmedDataUp,
            3 => Self::UnconfirmedDataDown,
            4 => Self::ConfirmedDataUp,
            5 => Self::ConfirmedDataDown,
            6 => Self::RejoinRequest,
            _ => Self::Proprietary,
        }
    }

    /// MHDR byte for this type with LoRaWAN major version R1
    #[must_use]
    pub const fn to_mhdr(self) -> u8 {
        let bits: u8 = match self {
            Self::JoinRequest => 0,
            Self::JoinAccept => 1,
            Self::UnconfirmedDataUp => 2,
            Self::UnconfirmedDataDown => 3,
            Self::ConfirmedDataUp => 4,
            Self::ConfirmedDataDown => 5,
            Self::RejoinRequest => 6,
            Self::Proprietary => 7,
        };
        bits << 5
    }

    /// Whether frames of this type carry a MAC payload with FHDR
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            Self::UnconfirmedDataUp
                | Self::UnconfirmedDataDown
                | Self::ConfirmedDataUp
                | Self::ConfirmedDataDown
        )
    }

    /// Direction of a data frame
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::UnconfirmedDataDown | Self::ConfirmedDataDown | Self::JoinAccept => {
                Direction::Downlink
            }
            _ => Direction::Uplink,
        }
    }
}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::JoinRequest => "JoinRequest",
            Self::JoinAccept => "JoinAccept",
            Self::UnconfirmedDataUp => "UnconfirmedDataUp",
            Self::UnconfirmedDataDown => "UnconfirmedDataDown",
            Self::ConfirmedDataUp => "ConfirmedDataUp",
            Self::ConfirmedDataDown => "ConfirmedDataDown",
            Self::RejoinRequest => "RejoinRequest",
            Self::Proprietary => "Proprietary",
        };
        f.write_str(name)
    }
}

/// Frame direction, as used in the crypto blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to network
    Uplink,
    /// Network to device
    Downlink,
}

impl Direction {
    /// The `Dir` byte of the B0 and A blocks
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Uplink => 0,
            Self::Downlink => 1,
        }
    }
}

/// `MHDR(1) + MIC(4)`
pub const MIN_FRAME: usize = 5;

/// A parsed PHY payload
///
/// Only data frames carry an application payload. Every other message type
/// is still authenticated before it is reported as unexpected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhyFrame<'a> {
    /// Data up or data down
    Data(DataFrame<'a>),
    /// Join, rejoin or proprietary frame
    Control(ControlFrame<'a>),
}

impl<'a> PhyFrame<'a> {
    /// Parse a PHY payload
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Parse`] for malformed frames.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() > MAX_PHY_PAYLOAD {
            return Err(FrameError::parse(format!(
                "frame of {} bytes exceeds {MAX_PHY_PAYLOAD}",
                bytes.len()
            )));
        }

        let (&mhdr, _) = bytes
            .split_first()
            .ok_or_else(|| FrameError::parse("empty frame"))?;

        if mhdr & 0x03 != 0 {
            return Err(FrameError::parse(format!(
                "unsupported LoRaWAN major version {}",
                mhdr & 0x03
            )));
        }

        let mtype = MType::from_mhdr(mhdr);
        if mtype.is_data() {
            return DataFrame::parse(mtype, bytes).map(Self::Data);
        }

        if bytes.len() < MIN_FRAME {
            return Err(FrameError::parse(format!(
                "{mtype} frame of {} bytes is shorter than {MIN_FRAME}",
                bytes.len()
            )));
        }

        let (signed, mic) = bytes
            .split_last_chunk::<4>()
            .ok_or_else(|| FrameError::parse("missing MIC"))?;

        Ok(Self::Control(ControlFrame {
            mtype,
            signed,
            mic: *mic,
        }))
    }
}

/// Borrowed view of a non-data frame
///
/// Its MIC is a CMAC over `MHDR | MACPayload` without a B0 block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame<'a> {
    /// Message type
    pub mtype: MType,
    /// Bytes covered by the MIC, `MHDR | MACPayload`
    pub signed: &'a [u8],
    /// Transmitted MIC
    pub mic: [u8; 4],
}

impl ControlFrame<'_> {
    /// Device the frame claims to come from
    ///
    /// Join requests carry a DevEUI after the JoinEUI; other control frames
    /// are reported as `unknown`.
    #[must_use]
    pub fn device(&self) -> String {
        match (self.mtype, self.signed.get(9..17)) {
            (MType::JoinRequest, Some(dev_eui)) => {
                let mut dev_eui = dev_eui.to_vec();
                dev_eui.reverse();
                hex::encode_upper(dev_eui)
            }
            _ => "unknown".to_string(),
        }
    }
}

/// Borrowed view of a parsed data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame<'a> {
    /// Message type
    pub mtype: MType,
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame control byte
    pub fctrl: u8,
    /// Transmitted 16-bit frame counter
    pub fcnt: u16,
    /// Piggybacked MAC commands
    pub fopts: &'a [u8],
    /// Port, absent when the frame has no FRMPayload
    pub fport: Option<u8>,
    /// Encrypted application payload
    pub frm_payload: &'a [u8],
    /// Bytes covered by the MIC, `MHDR | MACPayload`
    pub signed: &'a [u8],
    /// Transmitted MIC
    pub mic: [u8; 4],
}

impl<'a> DataFrame<'a> {
    fn parse(mtype: MType, bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_DATA_FRAME {
            return Err(FrameError::parse(format!(
                "data frame of {} bytes is shorter than {MIN_DATA_FRAME}",
                bytes.len()
            )));
        }

        let (signed, mic) = bytes
            .split_last_chunk::<4>()
            .ok_or_else(|| FrameError::parse("missing MIC"))?;
        let mac_payload = signed.get(1..).unwrap_or_default();

        let (dev_addr, rest) = mac_payload
            .split_first_chunk::<4>()
            .ok_or_else(|| FrameError::parse("truncated DevAddr"))?;
        let (&fctrl, rest) = rest
            .split_first()
            .ok_or_else(|| FrameError::parse("truncated FCtrl"))?;
        let (fcnt, rest) = rest
            .split_first_chunk::<2>()
            .ok_or_else(|| FrameError::parse("truncated FCnt"))?;

        let fopts_len = usize::from(fctrl & 0x0F);
        if rest.len() < fopts_len {
            return Err(FrameError::parse(format!(
                "FOpts length {fopts_len} overruns the frame"
            )));
        }
        let (fopts, rest) = rest.split_at(fopts_len);

        let (fport, frm_payload) = match rest.split_first() {
            Some((&port, payload)) => (Some(port), payload),
            None => (None, rest),
        };

        Ok(Self {
            mtype,
            dev_addr: DevAddr::from_le_bytes(*dev_addr),
            fctrl,
            fcnt: u16::from_le_bytes(*fcnt),
            fopts,
            fport,
            frm_payload,
            signed,
            mic: *mic,
        })
    }

    /// Direction derived from the message type
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.mtype.direction()
    }
}

/// Decode the base64 text the packet forwarder puts in `data`
///
/// # Errors
///
/// Returns [`FrameError::Parse`] if the text is not standard base64.
pub fn decode_wire(wire: &str) -> Result<Vec<u8>, FrameError> {
    STANDARD
        .decode(wire.trim())
        .map_err(|e| FrameError::parse(format!("invalid base64: {e}")))
}

/// Encode a PHY payload as packet forwarder text
#[must_use]
pub fn encode_wire(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    // Unconfirmed data up, DevAddr 26011bda, FCtrl 0, FCnt 1, FPort 1
    const FRAME: [u8; 17] = [
        0x40, 0xDA, 0x1B, 0x01, 0x26, 0x00, 0x01, 0x00, 0x01, 0xAA, 0xBB, 0xCC, 0xDD, 0x11, 0x22,
        0x33, 0x44,
    ];

    fn data(bytes: &[u8]) -> DataFrame<'_> {
        match PhyFrame::parse(bytes).unwrap() {
            PhyFrame::Data(frame) => frame,
            PhyFrame::Control(frame) => panic!("expected a data frame, got {}", frame.mtype),
        }
    }

    #[test]
    fn test_parse_data_up() {
        let frame = data(&FRAME);

        assert_eq!(frame.mtype, MType::UnconfirmedDataUp);
        assert_eq!(frame.dev_addr.to_string(), "26011bda");
        assert_eq!(frame.fcnt, 1);
        assert_eq!(frame.fport, Some(1));
        assert_eq!(frame.frm_payload, &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(frame.mic, [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(frame.signed.len(), FRAME.len() - 4);
        assert_eq!(frame.direction(), Direction::Uplink);
    }

    #[test]
    fn test_parse_fopts_and_no_port() {
        let mut bytes = vec![0x80, 0x01, 0x02, 0x03, 0x04, 0x02, 0x10, 0x00, 0x06, 0x07];
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let frame = data(&bytes);
        assert_eq!(frame.mtype, MType::ConfirmedDataUp);
        assert_eq!(frame.fopts, &[0x06, 0x07]);
        assert_eq!(frame.fcnt, 16);
        assert_eq!(frame.fport, None);
        assert!(frame.frm_payload.is_empty());
    }

    #[rstest]
    #[case(0x00, MType::JoinRequest)]
    #[case(0x20, MType::JoinAccept)]
    #[case(0xC0, MType::RejoinRequest)]
    #[case(0xE0, MType::Proprietary)]
    fn test_parse_non_data_frames(#[case] mhdr: u8, #[case] expected: MType) {
        let mut bytes = FRAME.to_vec();
        bytes[0] = mhdr;

        let PhyFrame::Control(frame) = PhyFrame::parse(&bytes).unwrap() else {
            panic!("expected a control frame");
        };
        assert_eq!(frame.mtype, expected);
        assert_eq!(frame.signed, &bytes[..bytes.len() - 4]);
        assert_eq!(frame.mic, [0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_join_request_device() {
        // MHDR | JoinEUI | DevEUI | DevNonce | MIC
        let mut bytes = vec![0x00];
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        bytes.extend_from_slice(&[0xAB, 0xCD, 0, 0, 0, 0]);

        let PhyFrame::Control(frame) = PhyFrame::parse(&bytes).unwrap() else {
            panic!("expected a control frame");
        };
        assert_eq!(frame.device(), "0102030405060708");

        let mut short = FRAME.to_vec();
        short[0] = 0xE0;
        let PhyFrame::Control(frame) = PhyFrame::parse(&short).unwrap() else {
            panic!("expected a control frame");
        };
        assert_eq!(frame.device(), "unknown");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(PhyFrame::parse(&[]), Err(FrameError::Parse { .. })));
        assert!(matches!(
            PhyFrame::parse(&FRAME[..11]),
            Err(FrameError::Parse { .. })
        ));
        assert!(matches!(
            PhyFrame::parse(&[0x40; 256]),
            Err(FrameError::Parse { .. })
        ));
        assert!(matches!(
            PhyFrame::parse(&[0x00, 1, 2, 3]),
            Err(FrameError::Parse { .. })
        ));

        // FOptsLen 15 with only a few bytes left
        let mut overrun = FRAME.to_vec();
        overrun[5] = 0x0F;
        assert!(matches!(
            PhyFrame::parse(&overrun),
            Err(FrameError::Parse { .. })
        ));

        let mut major = FRAME.to_vec();
        major[0] = 0x41;
        assert!(matches!(
            PhyFrame::parse(&major),
            Err(FrameError::Parse { .. })
        ));

        major[0] = 0x02;
        assert!(matches!(
            PhyFrame::parse(&major),
            Err(FrameError::Parse { .. })
        ));
    }

    #[test]
    fn test_mtype_mhdr_roundtrip() {
        for mhdr in (0u8..8).map(|bits| bits << 5) {
            assert_eq!(MType::from_mhdr(mhdr).to_mhdr(), mhdr);
        }
        assert_eq!(MType::ConfirmedDataDown.direction(), Direction::Downlink);
    }

    #[test]
    fn test_wire_text() {
        let wire = encode_wire(&FRAME);
        assert_eq!(decode_wire(&wire).unwrap(), FRAME.to_vec());
        assert!(matches!(
            decode_wire("not base64!"),
            Err(FrameError::Parse { .. })
        ));
    }
}
