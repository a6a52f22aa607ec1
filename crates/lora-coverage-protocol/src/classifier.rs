//! Per-line classification of gateway bridge logs

use crate::crypto::LoRaWanDecryptor;
use crate::error::ClassifyError;
use crate::frame::FrameDecryptor;
use crate::payload::GeoPosition;
use lora_coverage_core::{Config, GeoObservation, LogEvent, SessionKeys, config::IngestConfig};
use tracing::debug;

/// Outcome of classifying one log line
#[derive(Debug)]
pub enum Classification {
    /// Not an uplink event
    Ignored,
    /// Fully decoded observation
    Accepted(GeoObservation),
    /// Radio-level observation kept without geodata
    Salvaged {
        /// Observation with power and coordinates absent
        observation: GeoObservation,
        /// Why the geodata is missing
        reason: ClassifyError,
    },
    /// Dropped line
    Rejected(ClassifyError),
}

impl Classification {
    /// The observation to persist, if any
    #[must_use]
    pub const fn observation(&self) -> Option<&GeoObservation> {
        match self {
            Self::Accepted(observation) | Self::Salvaged { observation, .. } => Some(observation),
            Self::Ignored | Self::Rejected(_) => None,
        }
    }
}

/// Turns log lines into observations
///
/// Holds the session keys and salvage policy for one run.
#[derive(Debug, Clone)]
pub struct UplinkClassifier<D = LoRaWanDecryptor> {
    decryptor: D,
    keys: SessionKeys,
    uplink_message: String,
    salvage_invalid_payload_length: bool,
}

impl UplinkClassifier<LoRaWanDecryptor> {
    /// Classifier with the built-in LoRaWAN decryptor
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the session keys are not configured.
    pub fn new(config: &Config) -> lora_coverage_core::Result<Self> {
        Ok(Self::with_decryptor(
            LoRaWanDecryptor,
            config.session_keys()?,
            &config.ingest,
        ))
    }
}

impl<D: FrameDecryptor> UplinkClassifier<D> {
    /// Classifier with a custom decryptor
    pub fn with_decryptor(decryptor: D, keys: SessionKeys, ingest: &IngestConfig) -> Self {
        Self {
            decryptor,
            keys,
            uplink_message: ingest.uplink_message.clone(),
            salvage_invalid_payload_length: ingest.salvage_invalid_payload_length,
        }
    }

    /// Whether invalid payload lengths are salvaged
    #[must_use]
    pub const fn salvages_invalid_payload_length(&self) -> bool {
        self.salvage_invalid_payload_length
    }

    /// Classify one log line
    ///
    /// Checks run in a fixed order and the first failing one decides the
    /// outcome: JSON shape, uplink marker, record fields, CRC, frame
    /// decryption, then the geolocation payload.
    pub fn classify(&self, line: &str) -> Classification {
        let event: LogEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => return Classification::Rejected(ClassifyError::LineParse(e)),
        };

        if !event.is_uplink(&self.uplink_message) {
            return Classification::Ignored;
        }

        let record = match event.uplink_record() {
            Ok(record) => record,
            Err(e) => return Classification::Rejected(ClassifyError::InvalidRecord(e)),
        };

        if record.has_invalid_crc() {
            debug!(gateway = %record.gateway_mac, crc = record.crc, "Dropping uplink with invalid CRC");
            return Classification::Rejected(ClassifyError::InvalidCrc {
                gateway: record.gateway_mac,
                crc: record.crc,
            });
        }

        let frame = match self.decryptor.decrypt(&record.data, &self.keys) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(gateway = %record.gateway_mac, kind = %e.kind(), error = %e, "Dropping undecryptable uplink");
                return Classification::Rejected(e.into());
            }
        };

        let observation = GeoObservation::from_uplink(&record, frame.dev_addr, &frame.payload);

        match GeoPosition::decode(&frame.payload) {
            Ok(position) => Classification::Accepted(observation.with_position(
                position.latitude,
                position.longitude,
                position.power,
            )),
            Err(reason) if self.salvage_invalid_payload_length => Classification::Salvaged {
                observation,
                reason,
            },
            Err(reason) => Classification::Rejected(reason),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::float_cmp,
    clippy::needless_pass_by_value
)]
mod tests {
    use super::*;
    use crate::crypto::UplinkBuilder;
    use crate::error::{FrameError, RejectKind};
    use crate::frame::{DecryptedFrame, MType};
    use lora_coverage_core::{DataRate, DevAddr};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn keys() -> SessionKeys {
        SessionKeys {
            nwk_s_key: "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap(),
            app_s_key: "000102030405060708090A0B0C0D0E0F".parse().unwrap(),
        }
    }

    fn device() -> DevAddr {
        DevAddr::new([0x26, 0x01, 0x1B, 0xDA])
    }

    fn uplink_line(data: &str, crc: i8) -> String {
        json!({
            "fields": {
                "gateway mac": "ABCDEF0011223344",
                "time": "2018-03-02T10:21:17.589871Z",
                "frequency": 868.1,
                "IF channel": 0,
                "RF chain": 1,
                "crc": crc,
                "modulation": "LORA",
                "data rate": "SF7BW125",
                "coding rate": "4/5",
                "rssi": -80,
                "snr": 7.5,
                "size": 20,
                "data": data
            },
            "level": "info",
            "timestamp": "2018-03-02T10:21:17Z",
            "message": "PUSH_DATA: RXPK"
        })
        .to_string()
    }

    fn wire(payload: &[u8]) -> String {
        UplinkBuilder::new(keys(), device())
            .fcnt(3)
            .build_wire(payload)
            .unwrap()
    }

    fn classifier() -> UplinkClassifier {
        UplinkClassifier::with_decryptor(LoRaWanDecryptor, keys(), &IngestConfig::default())
    }

    /// Returns a fixed outcome regardless of the frame
    struct MockDecryptor(Result<DecryptedFrame, FrameError>);

    impl FrameDecryptor for MockDecryptor {
        fn decrypt(&self, _wire: &str, _keys: &SessionKeys) -> Result<DecryptedFrame, FrameError> {
            self.0.clone()
        }
    }

    fn mock(outcome: Result<DecryptedFrame, FrameError>) -> UplinkClassifier<MockDecryptor> {
        UplinkClassifier::with_decryptor(MockDecryptor(outcome), keys(), &IngestConfig::default())
    }

    #[test]
    fn test_accepts_full_geolocation() {
        let line = uplink_line(&wire(&[0x00, 0x00, 0x64, 0x00, 0x00, 0xC8, 0x05]), 1);

        let Classification::Accepted(observation) = classifier().classify(&line) else {
            panic!("expected an accepted observation");
        };

        assert_eq!(observation.gateway.to_string(), "ABCDEF0011223344");
        assert_eq!(observation.device, device());
        assert_eq!(observation.data_rate, DataRate::Lora("SF7BW125".to_string()));
        assert_eq!(observation.latitude, Some(0.01));
        assert_eq!(observation.longitude, Some(0.02));
        assert_eq!(observation.power, Some(5));
        assert_eq!(observation.payload, "0000640000c805");
        assert_eq!(observation.rssi, -80);
    }

    #[test]
    fn test_accepts_without_power() {
        let line = uplink_line(&wire(&[0x00, 0x00, 0x64, 0x00, 0x00, 0xC8]), 1);
        let classification = classifier().classify(&line);
        let observation = classification.observation().unwrap();

        assert!(observation.has_position());
        assert_eq!(observation.power, None);
    }

    #[rstest]
    #[case(vec![1, 2, 3, 4, 5])]
    #[case(vec![1, 2, 3, 4, 5, 6, 7, 8])]
    fn test_salvages_invalid_payload_length(#[case] payload: Vec<u8>) {
        let line = uplink_line(&wire(&payload), 1);

        let Classification::Salvaged {
            observation,
            reason,
        } = classifier().classify(&line)
        else {
            panic!("expected a salvaged observation");
        };

        assert_eq!(reason.kind(), RejectKind::InvalidPayloadLength);
        assert_eq!(observation.payload, hex::encode(&payload));
        assert_eq!(observation.rssi, -80);
        assert_eq!(observation.snr, 7.5);
        assert_eq!(observation.size, 20);
        assert_eq!(observation.latitude, None);
        assert_eq!(observation.longitude, None);
        assert_eq!(observation.power, None);
    }

    #[test]
    fn test_salvage_can_be_disabled() {
        let ingest = IngestConfig {
            salvage_invalid_payload_length: false,
            ..IngestConfig::default()
        };
        let classifier = UplinkClassifier::with_decryptor(LoRaWanDecryptor, keys(), &ingest);
        assert!(!classifier.salvages_invalid_payload_length());

        let line = uplink_line(&wire(&[1, 2, 3, 4, 5]), 1);
        assert!(matches!(
            classifier.classify(&line),
            Classification::Rejected(ClassifyError::InvalidPayloadLength { length: 5 })
        ));
    }

    #[rstest]
    #[case(-1)]
    #[case(-128)]
    fn test_rejects_negative_crc(#[case] crc: i8) {
        let line = uplink_line(&wire(&[0x00, 0x00, 0x64, 0x00, 0x00, 0xC8]), crc);

        let classification = classifier().classify(&line);
        assert!(classification.observation().is_none());
        let Classification::Rejected(err) = classification else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), RejectKind::InvalidCrc);
    }

    #[test]
    fn test_zero_crc_is_not_rejected() {
        let line = uplink_line(&wire(&[0x00, 0x00, 0x64, 0x00, 0x00, 0xC8]), 0);
        assert!(matches!(classifier().classify(&line), Classification::Accepted(_)));
    }

    #[test]
    fn test_ignores_other_messages() {
        let line = json!({
            "fields": {"addr": "10.0.0.1:1700"},
            "level": "info",
            "timestamp": "2018-03-02T10:21:17Z",
            "message": "PULL_DATA"
        })
        .to_string();

        assert!(matches!(classifier().classify(&line), Classification::Ignored));
    }

    #[rstest]
    #[case("")]
    #[case("not json")]
    #[case("{\"fields\": ")]
    fn test_rejects_unparseable_lines(#[case] line: &str) {
        let Classification::Rejected(err) = classifier().classify(line) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), RejectKind::LineParse);
    }

    #[test]
    fn test_rejects_malformed_record() {
        let mut value: serde_json::Value =
            serde_json::from_str(&uplink_line(&wire(&[1, 2, 3, 4, 5, 6]), 1)).unwrap();
        value["fields"]["gateway mac"] = json!("ABCDEF00");

        let Classification::Rejected(err) = classifier().classify(&value.to_string()) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), RejectKind::InvalidRecord);
    }

    #[test]
    fn test_rejects_mic_mismatch() {
        let other_keys = SessionKeys {
            nwk_s_key: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF".parse().unwrap(),
            ..keys()
        };
        let forged = UplinkBuilder::new(other_keys, device())
            .build_wire(&[1, 2, 3, 4, 5, 6])
            .unwrap();

        let Classification::Rejected(err) = classifier().classify(&uplink_line(&forged, 1)) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), RejectKind::MicValidation);
    }

    #[test]
    fn test_join_frames_are_authenticated_first() {
        let mut join = vec![MType::JoinRequest.to_mhdr()];
        join.extend_from_slice(&[0u8; 18]);

        let forged = crate::frame::encode_wire(&[join.as_slice(), &[0u8; 4][..]].concat());
        let Classification::Rejected(err) = classifier().classify(&uplink_line(&forged, 1)) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), RejectKind::MicValidation);

        let mic = crate::crypto::compute_join_mic(&keys().nwk_s_key, &join).unwrap();
        let signed = crate::frame::encode_wire(&[join.as_slice(), &mic[..]].concat());
        let Classification::Rejected(err) = classifier().classify(&uplink_line(&signed, 1)) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), RejectKind::UnexpectedMacPayload);
    }

    #[rstest]
    #[case(FrameError::parse("bad"), RejectKind::FrameParse)]
    #[case(FrameError::MicValidation { device: "26011bda".to_string() }, RejectKind::MicValidation)]
    #[case(FrameError::decryption("bad"), RejectKind::Decryption)]
    #[case(FrameError::UnexpectedMacPayload { mtype: MType::JoinAccept }, RejectKind::UnexpectedMacPayload)]
    #[case(FrameError::unexpected_frame_payload("none"), RejectKind::UnexpectedFramePayload)]
    fn test_frame_failures_drop_the_line(#[case] error: FrameError, #[case] expected: RejectKind) {
        let classifier = mock(Err(error));

        let Classification::Rejected(err) = classifier.classify(&uplink_line("AAAA", 1)) else {
            panic!("expected a rejection");
        };
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn test_mock_decryptor_feeds_geo_decoder() {
        let classifier = mock(Ok(DecryptedFrame {
            dev_addr: device(),
            mtype: MType::UnconfirmedDataUp,
            fcnt: 1,
            fport: 1,
            payload: vec![0x07, 0xA1, 0x20, 0x00, 0x8B, 0xD8],
        }));

        let classification = classifier.classify(&uplink_line("ignored", 1));
        let observation = classification.observation().unwrap();
        assert_eq!(observation.latitude, Some(50.0));
        assert_eq!(observation.longitude, Some(3.58));
    }

    #[test]
    fn test_new_requires_session_keys() {
        assert!(UplinkClassifier::new(&Config::default()).is_err());
    }
}
