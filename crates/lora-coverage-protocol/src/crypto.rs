//! LoRaWAN 1.0 frame authentication and payload encryption

use crate::error::FrameError;
use crate::frame::{
    DecryptedFrame, Direction, FrameDecryptor, MAX_PHY_PAYLOAD, MType, PhyFrame, decode_wire,
    encode_wire,
};
use aes::{
    Aes128, Block,
    cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray},
};
use cmac::{Cmac, Mac};
use lora_coverage_core::{AesKey, DevAddr, SessionKeys};

/// Compute the 4-byte MIC of `MHDR | MACPayload`
///
/// # Errors
///
/// Returns [`FrameError::Parse`] if the message is longer than a frame can be.
pub fn compute_mic(
    key: &AesKey,
    direction: Direction,
    dev_addr: DevAddr,
    fcnt: u32,
    message: &[u8],
) -> Result<[u8; 4], FrameError> {
    let length = u8::try_from(message.len())
        .map_err(|_| FrameError::parse(format!("message of {} bytes", message.len())))?;
    let [a0, a1, a2, a3] = dev_addr.to_le_bytes();
    let [f0, f1, f2, f3] = fcnt.to_le_bytes();

    let b0 = [
        0x49,
        0,
        0,
        0,
        0,
        direction.as_byte(),
        a0,
        a1,
        a2,
        a3,
        f0,
        f1,
        f2,
        f3,
        0,
        length,
    ];

    truncated_cmac(key, &[&b0, message])
}

/// Compute the 4-byte MIC of a join or rejoin frame, `MHDR | MACPayload`
///
/// # Errors
///
/// Never fails for a 128-bit key; the result mirrors [`compute_mic`].
pub fn compute_join_mic(key: &AesKey, message: &[u8]) -> Result<[u8; 4], FrameError> {
    truncated_cmac(key, &[message])
}

fn truncated_cmac(key: &AesKey, parts: &[&[u8]]) -> Result<[u8; 4], FrameError> {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(key.as_bytes()));
    for part in parts {
        mac.update(part);
    }
    let tag = mac.finalize().into_bytes();

    match tag.as_slice() {
        [m0, m1, m2, m3, ..] => Ok([*m0, *m1, *m2, *m3]),
        _ => Err(FrameError::decryption("CMAC produced a short tag")),
    }
}

/// Apply the FRMPayload keystream
///
/// Encryption and decryption are the same operation.
#[must_use]
pub fn crypt_frm_payload(
    key: &AesKey,
    direction: Direction,
    dev_addr: DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let [a0, a1, a2, a3] = dev_addr.to_le_bytes();
    let [f0, f1, f2, f3] = fcnt.to_le_bytes();

    payload
        .chunks(16)
        .zip(1u8..)
        .flat_map(|(chunk, counter)| {
            let mut block = Block::clone_from_slice(&[
                0x01,
                0,
                0,
                0,
                0,
                direction.as_byte(),
                a0,
                a1,
                a2,
                a3,
                f0,
                f1,
                f2,
                f3,
                0,
                counter,
            ]);
            cipher.encrypt_block(&mut block);
            chunk
                .iter()
                .zip(block)
                .map(|(byte, key_byte)| byte ^ key_byte)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// [`FrameDecryptor`] for LoRaWAN 1.0 data frames in base64 wire text
///
/// Non-data frames are checked against the network session key as join
/// frames are signed, and only reported as unexpected once that check passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoRaWanDecryptor;

impl FrameDecryptor for LoRaWanDecryptor {
    fn decrypt(&self, wire: &str, keys: &SessionKeys) -> Result<DecryptedFrame, FrameError> {
        let bytes = decode_wire(wire)?;
        let frame = match PhyFrame::parse(&bytes)? {
            PhyFrame::Data(frame) => frame,
            PhyFrame::Control(frame) => {
                if compute_join_mic(&keys.nwk_s_key, frame.signed)? != frame.mic {
                    return Err(FrameError::MicValidation {
                        device: frame.device(),
                    });
                }
                return Err(FrameError::UnexpectedMacPayload { mtype: frame.mtype });
            }
        };
        let direction = frame.direction();
        let fcnt = u32::from(frame.fcnt);

        let expected = compute_mic(
            &keys.nwk_s_key,
            direction,
            frame.dev_addr,
            fcnt,
            frame.signed,
        )?;
        if expected != frame.mic {
            return Err(FrameError::MicValidation {
                device: frame.dev_addr.to_string(),
            });
        }

        let Some(fport) = frame.fport else {
            return Err(FrameError::unexpected_frame_payload("frame has no FRMPayload"));
        };

        if fport == 0 && !frame.fopts.is_empty() {
            return Err(FrameError::decryption(
                "MAC commands in both FOpts and FRMPayload",
            ));
        }

        let key = if fport == 0 {
            &keys.nwk_s_key
        } else {
            &keys.app_s_key
        };
        let payload = crypt_frm_payload(key, direction, frame.dev_addr, fcnt, frame.frm_payload);

        if fport == 0 {
            return Err(FrameError::unexpected_frame_payload(
                "FRMPayload holds MAC commands (port 0)",
            ));
        }

        Ok(DecryptedFrame {
            dev_addr: frame.dev_addr,
            mtype: frame.mtype,
            fcnt: frame.fcnt,
            fport,
            payload,
        })
    }
}

/// Builds encrypted, signed data-up frames
///
/// ```
/// use lora_coverage_core::{DevAddr, SessionKeys};
/// use lora_coverage_protocol::{FrameDecryptor, LoRaWanDecryptor, UplinkBuilder};
///
/// let keys = SessionKeys {
///     nwk_s_key: "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap(),
///     app_s_key: "000102030405060708090A0B0C0D0E0F".parse().unwrap(),
/// };
/// let device = DevAddr::new([0x26, 0x01, 0x1B, 0xDA]);
///
/// let wire = UplinkBuilder::new(keys, device).fcnt(7).build_wire(&[1, 2, 3]).unwrap();
/// let frame = LoRaWanDecryptor.decrypt(&wire, &keys).unwrap();
/// assert_eq!(frame.payload, vec![1, 2, 3]);
/// assert_eq!(frame.fcnt, 7);
/// ```
#[derive(Debug, Clone)]
pub struct UplinkBuilder {
    keys: SessionKeys,
    dev_addr: DevAddr,
    fcnt: u16,
    fport: u8,
    confirmed: bool,
    fopts: Vec<u8>,
}

impl UplinkBuilder {
    /// Unconfirmed frames on port 1 starting at counter 0
    #[must_use]
    pub const fn new(keys: SessionKeys, dev_addr: DevAddr) -> Self {
        Self {
            keys,
            dev_addr,
            fcnt: 0,
            fport: 1,
            confirmed: false,
            fopts: Vec::new(),
        }
    }

    /// Set the frame counter
    #[must_use]
    pub const fn fcnt(mut self, fcnt: u16) -> Self {
        self.fcnt = fcnt;
        self
    }

    /// Set the application port
    #[must_use]
    pub const fn fport(mut self, fport: u8) -> Self {
        self.fport = fport;
        self
    }

    /// Send as confirmed data up
    #[must_use]
    pub const fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    /// Piggyback MAC commands in FOpts
    #[must_use]
    pub fn fopts(mut self, fopts: Vec<u8>) -> Self {
        self.fopts = fopts;
        self
    }

    /// Encrypt and sign `plaintext`
    ///
    /// An empty plaintext produces a frame without FPort and FRMPayload.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Parse`] if FOpts exceed 15 bytes or the frame
    /// would exceed the PHY payload limit.
    pub fn build(&self, plaintext: &[u8]) -> Result<Vec<u8>, FrameError> {
        let fopts_len = u8::try_from(self.fopts.len())
            .ok()
            .filter(|len| *len <= 0x0F)
            .ok_or_else(|| FrameError::parse("FOpts longer than 15 bytes"))?;

        let mtype = if self.confirmed {
            MType::ConfirmedDataUp
        } else {
            MType::UnconfirmedDataUp
        };
        let direction = mtype.direction();
        let fcnt = u32::from(self.fcnt);

        let mut frame = Vec::with_capacity(13 + self.fopts.len() + plaintext.len());
        frame.push(mtype.to_mhdr());
        frame.extend_from_slice(&self.dev_addr.to_le_bytes());
        frame.push(fopts_len);
        frame.extend_from_slice(&self.fcnt.to_le_bytes());
        frame.extend_from_slice(&self.fopts);

        if !plaintext.is_empty() {
            let key = if self.fport == 0 {
                &self.keys.nwk_s_key
            } else {
                &self.keys.app_s_key
            };
            frame.push(self.fport);
            frame.extend(crypt_frm_payload(
                key,
                direction,
                self.dev_addr,
                fcnt,
                plaintext,
            ));
        }

        if frame.len() + 4 > MAX_PHY_PAYLOAD {
            return Err(FrameError::parse(format!(
                "frame of {} bytes exceeds {MAX_PHY_PAYLOAD}",
                frame.len() + 4
            )));
        }

        let mic = compute_mic(&self.keys.nwk_s_key, direction, self.dev_addr, fcnt, &frame)?;
        frame.extend_from_slice(&mic);
        Ok(frame)
    }

    /// [`build`](Self::build) and encode as base64 wire text
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_wire(&self, plaintext: &[u8]) -> Result<String, FrameError> {
        self.build(plaintext).map(|frame| encode_wire(&frame))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn keys() -> SessionKeys {
        SessionKeys {
            nwk_s_key: "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap(),
            app_s_key: "000102030405060708090A0B0C0D0E0F".parse().unwrap(),
        }
    }

    fn device() -> DevAddr {
        DevAddr::new([0x26, 0x01, 0x1B, 0xDA])
    }

    #[test]
    fn test_cmac_matches_rfc4493_vector() {
        // RFC 4493, example 2
        let key: AesKey = "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap();
        let mut mac = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(key.as_bytes()));
        mac.update(&hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap());
        let tag = mac.finalize().into_bytes();

        assert_eq!(hex::encode(tag), "070a16b46b4d4144f79bdd9dd04a287c");
    }

    #[test]
    fn test_keystream_is_involution() {
        let key = keys().app_s_key;
        let plaintext: Vec<u8> = (0u8..40).collect();

        let ciphertext = crypt_frm_payload(&key, Direction::Uplink, device(), 9, &plaintext);
        assert_ne!(ciphertext, plaintext);
        assert_eq!(
            crypt_frm_payload(&key, Direction::Uplink, device(), 9, &ciphertext),
            plaintext
        );
    }

    #[test]
    fn test_keystream_depends_on_direction_and_counter() {
        let key = keys().app_s_key;
        let plaintext = [0u8; 8];

        let up = crypt_frm_payload(&key, Direction::Uplink, device(), 1, &plaintext);
        let down = crypt_frm_payload(&key, Direction::Downlink, device(), 1, &plaintext);
        let next = crypt_frm_payload(&key, Direction::Uplink, device(), 2, &plaintext);

        assert_ne!(up, down);
        assert_ne!(up, next);
    }

    #[test]
    fn test_decrypt_built_uplink() {
        let payload = [0x00, 0x00, 0x64, 0x00, 0x00, 0xC8, 0x05];
        let wire = UplinkBuilder::new(keys(), device())
            .fcnt(42)
            .fport(2)
            .confirmed(true)
            .build_wire(&payload)
            .unwrap();

        let frame = LoRaWanDecryptor.decrypt(&wire, &keys()).unwrap();

        assert_eq!(frame.dev_addr, device());
        assert_eq!(frame.mtype, MType::ConfirmedDataUp);
        assert_eq!(frame.fcnt, 42);
        assert_eq!(frame.fport, 2);
        assert_eq!(frame.payload, payload.to_vec());
    }

    #[test]
    fn test_decrypt_wrong_network_key() {
        let wire = UplinkBuilder::new(keys(), device())
            .build_wire(&[1, 2, 3, 4, 5, 6])
            .unwrap();
        let mut wrong = keys();
        wrong.nwk_s_key = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".parse().unwrap();

        assert_eq!(
            LoRaWanDecryptor.decrypt(&wire, &wrong).unwrap_err(),
            FrameError::MicValidation {
                device: "26011bda".to_string()
            }
        );
    }

    #[test]
    fn test_decrypt_tampered_payload() {
        let mut frame = UplinkBuilder::new(keys(), device())
            .build(&[1, 2, 3, 4, 5, 6])
            .unwrap();
        frame[10] ^= 0x01;

        assert!(matches!(
            LoRaWanDecryptor.decrypt(&encode_wire(&frame), &keys()),
            Err(FrameError::MicValidation { .. })
        ));
    }

    #[test]
    fn test_decrypt_wrong_app_key_gives_other_plaintext() {
        let wire = UplinkBuilder::new(keys(), device())
            .build_wire(&[1, 2, 3, 4, 5, 6])
            .unwrap();
        let mut wrong = keys();
        wrong.app_s_key = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".parse().unwrap();

        let frame = LoRaWanDecryptor.decrypt(&wire, &wrong).unwrap();
        assert_ne!(frame.payload, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_decrypt_frame_without_payload() {
        let wire = UplinkBuilder::new(keys(), device()).build_wire(&[]).unwrap();

        assert!(matches!(
            LoRaWanDecryptor.decrypt(&wire, &keys()),
            Err(FrameError::UnexpectedFramePayload { .. })
        ));
    }

    #[test]
    fn test_decrypt_mac_command_port() {
        let wire = UplinkBuilder::new(keys(), device())
            .fport(0)
            .build_wire(&[0x02])
            .unwrap();
        assert!(matches!(
            LoRaWanDecryptor.decrypt(&wire, &keys()),
            Err(FrameError::UnexpectedFramePayload { .. })
        ));

        let wire = UplinkBuilder::new(keys(), device())
            .fport(0)
            .fopts(vec![0x02])
            .build_wire(&[0x02])
            .unwrap();
        assert!(matches!(
            LoRaWanDecryptor.decrypt(&wire, &keys()),
            Err(FrameError::Decryption { .. })
        ));
    }

    fn join_request(key: &AesKey) -> Vec<u8> {
        let mut join = vec![MType::JoinRequest.to_mhdr()];
        join.extend_from_slice(&[0u8; 8]);
        join.extend_from_slice(&[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        join.extend_from_slice(&[0x34, 0x12]);
        let mic = compute_join_mic(key, &join).unwrap();
        join.extend_from_slice(&mic);
        join
    }

    #[test]
    fn test_decrypt_forged_join_request() {
        let mut zeros = vec![0x00];
        zeros.extend_from_slice(&[0u8; 22]);
        assert!(matches!(
            LoRaWanDecryptor.decrypt(&encode_wire(&zeros), &keys()),
            Err(FrameError::MicValidation { .. })
        ));

        let other: AesKey = "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".parse().unwrap();
        assert_eq!(
            LoRaWanDecryptor
                .decrypt(&encode_wire(&join_request(&other)), &keys())
                .unwrap_err(),
            FrameError::MicValidation {
                device: "0102030405060708".to_string()
            }
        );
    }

    #[test]
    fn test_decrypt_signed_join_request() {
        let join = join_request(&keys().nwk_s_key);

        assert_eq!(
            LoRaWanDecryptor
                .decrypt(&encode_wire(&join), &keys())
                .unwrap_err(),
            FrameError::UnexpectedMacPayload {
                mtype: MType::JoinRequest
            }
        );
    }

    #[test]
    fn test_decrypt_rewritten_message_type() {
        let mut frame = UplinkBuilder::new(keys(), device())
            .build(&[1, 2, 3, 4, 5, 6])
            .unwrap();
        frame[0] = MType::JoinRequest.to_mhdr();

        assert!(matches!(
            LoRaWanDecryptor.decrypt(&encode_wire(&frame), &keys()),
            Err(FrameError::MicValidation { .. })
        ));

        frame[0] = MType::Proprietary.to_mhdr();
        assert!(matches!(
            LoRaWanDecryptor.decrypt(&encode_wire(&frame), &keys()),
            Err(FrameError::MicValidation { .. })
        ));
    }

    #[test]
    fn test_decrypt_known_answer_frame() {
        // Data up from DevAddr 01020304, FCnt 1, FPort 1, carrying "hello"
        let keys = SessionKeys {
            nwk_s_key: AesKey::new([2; 16]),
            app_s_key: AesKey::new([1; 16]),
        };

        let frame = LoRaWanDecryptor
            .decrypt("QAQDAgGAAQABppRkJhXWw7WC", &keys)
            .unwrap();

        assert_eq!(frame.dev_addr.to_string(), "01020304");
        assert_eq!(frame.mtype, MType::UnconfirmedDataUp);
        assert_eq!(frame.fcnt, 1);
        assert_eq!(frame.fport, 1);
        assert_eq!(frame.payload, b"hello".to_vec());

        // FCtrl carries the ADR bit, so compare the pieces rather than a rebuilt frame
        let bytes = decode_wire("QAQDAgGAAQABppRkJhXWw7WC").unwrap();
        assert_eq!(
            crypt_frm_payload(&keys.app_s_key, Direction::Uplink, frame.dev_addr, 1, b"hello"),
            bytes[9..14].to_vec()
        );
        assert_eq!(
            compute_mic(&keys.nwk_s_key, Direction::Uplink, frame.dev_addr, 1, &bytes[..14]).unwrap(),
            [bytes[14], bytes[15], bytes[16], bytes[17]]
        );
    }

    #[test]
    fn test_builder_limits() {
        assert!(UplinkBuilder::new(keys(), device())
            .fopts(vec![0; 16])
            .build(&[1])
            .is_err());
        assert!(UplinkBuilder::new(keys(), device())
            .build(&[0; 250])
            .is_err());
    }

    proptest! {
        #[test]
        fn test_builder_decryptor_agree(
            payload in proptest::collection::vec(any::<u8>(), 1..200),
            fcnt in any::<u16>(),
            fport in 1u8..=223,
        ) {
            let wire = UplinkBuilder::new(keys(), device())
                .fcnt(fcnt)
                .fport(fport)
                .build_wire(&payload)
                .unwrap();
            let frame = LoRaWanDecryptor.decrypt(&wire, &keys()).unwrap();

            prop_assert_eq!(frame.payload, payload);
            prop_assert_eq!(frame.fcnt, fcnt);
            prop_assert_eq!(frame.fport, fport);
        }
    }
}
