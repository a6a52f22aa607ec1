//! Core data types for LoRa coverage mapping
//!
//! The codec types ([`CompactTime`], [`DataRate`], [`MacAddress`]) carry the
//! packet forwarder's textual encodings in both directions: `Display`/`FromStr`
//! for plain text and `Serialize`/`Deserialize` for the JSON log records.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, str::FromStr};

/// Reception timestamp as reported by the gateway
///
/// The canonical text is RFC 3339 in UTC with up to nanosecond precision and
/// trailing fractional zeros trimmed, e.g. `2018-03-02T10:21:17.589871Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompactTime(DateTime<Utc>);

impl CompactTime {
    /// Wrap a UTC timestamp
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self(time)
    }

    /// Normalize a timestamp from any zone to UTC
    #[must_use]
    pub fn from_datetime<Tz: TimeZone>(time: &DateTime<Tz>) -> Self {
        Self(time.with_timezone(&Utc))
    }

    /// The wrapped UTC timestamp
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for CompactTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.0.to_rfc3339_opts(SecondsFormat::Secs, true);
        let base = seconds.trim_end_matches('Z');
        let nanos = self.0.timestamp_subsec_nanos() % 1_000_000_000;

        if nanos == 0 {
            return write!(f, "{base}Z");
        }

        let fraction = format!("{nanos:09}");
        write!(f, "{base}.{}Z", fraction.trim_end_matches('0'))
    }
}

impl FromStr for CompactTime {
    type Err = Error;

    /// Accepts RFC 3339 with an uppercase `T` separator and `Z` designator only.
    fn from_str(s: &str) -> Result<Self> {
        let time_format = |message: &str| Error::TimeFormat {
            input: s.to_string(),
            message: message.to_string(),
        };

        if s.as_bytes().get(10) != Some(&b'T') {
            return Err(time_format("date and time must be separated by 'T'"));
        }
        if s.ends_with('z') {
            return Err(time_format("UTC designator must be 'Z'"));
        }

        DateTime::parse_from_rfc3339(s)
            .map(|time| Self::from_datetime(&time))
            .map_err(|e| time_format(&e.to_string()))
    }
}

impl Serialize for CompactTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompactTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Data rate of a reception
///
/// LoRa receptions carry a spreading factor / bandwidth label such as
/// `SF7BW125`, FSK receptions carry a bit rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataRate {
    /// LoRa spreading factor and bandwidth label
    Lora(String),
    /// FSK bit rate in bits per second
    Fsk(u32),
}

impl DataRate {
    /// Build a LoRa label that reads back unchanged from its text form
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDataRate`] if the label is empty, numeric, or
    /// has surrounding whitespace or quotes.
    pub fn lora<S: Into<String>>(label: S) -> Result<Self> {
        let label = label.into();
        match label.parse::<Self>()? {
            Self::Lora(normalized) if normalized == label => Ok(Self::Lora(label)),
            _ => Err(Error::InvalidDataRate { input: label }),
        }
    }

    /// Whether this is a LoRa label
    #[must_use]
    pub const fn is_lora(&self) -> bool {
        matches!(self, Self::Lora(_))
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lora(label) => f.write_str(label),
            Self::Fsk(bit_rate) => write!(f, "{bit_rate}"),
        }
    }
}

impl FromStr for DataRate {
    type Err = Error;

    /// Numeric text always wins over the label interpretation.
    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().trim_matches('"').trim();

        if let Ok(bit_rate) = text.parse::<u32>() {
            return Ok(Self::Fsk(bit_rate));
        }

        if text.is_empty() {
            return Err(Error::InvalidDataRate {
                input: s.to_string(),
            });
        }

        Ok(Self::Lora(text.to_string()))
    }
}

impl Serialize for DataRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Lora(label) => serializer.serialize_str(label),
            Self::Fsk(bit_rate) => serializer.serialize_u32(*bit_rate),
        }
    }
}

impl<'de> Deserialize<'de> for DataRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DataRateVisitor;

        impl de::Visitor<'_> for DataRateVisitor {
            type Value = DataRate;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a data rate label or an unsigned bit rate")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<DataRate, E> {
                u32::try_from(value)
                    .map(DataRate::Fsk)
                    .map_err(|_| E::custom(format!("bit rate {value} out of range")))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<DataRate, E> {
                u32::try_from(value)
                    .map(DataRate::Fsk)
                    .map_err(|_| E::custom(format!("bit rate {value} out of range")))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<DataRate, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DataRateVisitor)
    }
}

/// 8-byte gateway identifier
///
/// Canonical text is uppercase hex without separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress([u8; 8]);

impl MacAddress {
    /// Wrap raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHex {
            input: s.to_string(),
            message: e.to_string(),
        })?;

        let actual = bytes.len();
        <[u8; 8]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::MacAddressSize { actual })
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// 32-bit device address, most significant byte first
///
/// Frames carry the address little-endian; use [`DevAddr::from_le_bytes`]
/// when reading it off the air. Text form is lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Wrap big-endian bytes
    #[must_use]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Build from the little-endian wire order
    #[must_use]
    pub const fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self([bytes[3], bytes[2], bytes[1], bytes[0]])
    }

    /// Address in little-endian wire order
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 4] {
        [self.0[3], self.0[2], self.0[1], self.0[0]]
    }

    /// Big-endian bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for DevAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHex {
            input: s.to_string(),
            message: e.to_string(),
        })?;

        let actual = bytes.len();
        <[u8; 4]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::Validation {
                field: "device".to_string(),
                message: format!("expected 4 bytes, got {actual}"),
            })
    }
}

impl Serialize for DevAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DevAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// AES-128 session key
///
/// `Debug` never prints the key material.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AesKey([u8; 16]);

impl AesKey {
    /// Wrap raw key bytes
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(**redacted**)")
    }
}

impl FromStr for AesKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| Error::InvalidKey {
            message: e.to_string(),
        })?;

        let actual = bytes.len();
        <[u8; 16]>::try_from(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidKey {
                message: format!("expected 16 bytes, got {actual}"),
            })
    }
}

impl Serialize for AesKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(self.0))
    }
}

impl<'de> Deserialize<'de> for AesKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// The network/application session key pair used for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeys {
    /// Network session key, authenticates frames
    pub nwk_s_key: AesKey,
    /// Application session key, decrypts application payloads
    pub app_s_key: AesKey,
}

/// One line of the gateway bridge log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Free-form structured fields of the event
    #[serde(default)]
    pub fields: serde_json::Value,

    /// Severity level
    #[serde(default)]
    pub level: String,

    /// Time the bridge logged the event
    #[serde(default)]
    pub timestamp: String,

    /// Event tag, e.g. `PUSH_DATA: RXPK`
    #[serde(default)]
    pub message: String,
}

impl LogEvent {
    /// Whether the event carries an uplink reception
    #[must_use]
    pub fn is_uplink(&self, marker: &str) -> bool {
        self.message == marker
    }

    /// Decode the embedded reception record
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the fields do not form an [`RxPacket`].
    pub fn uplink_record(&self) -> serde_json::Result<RxPacket> {
        RxPacket::deserialize(&self.fields)
    }
}

/// Gateway-reported envelope of one radio reception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxPacket {
    /// Receiving gateway
    #[serde(rename = "gateway mac")]
    pub gateway_mac: MacAddress,

    /// Reception time
    pub time: CompactTime,

    /// Center frequency in MHz
    pub frequency: f64,

    /// Concentrator IF channel
    #[serde(rename = "IF channel", default)]
    pub if_channel: u8,

    /// Concentrator RF chain
    #[serde(rename = "RF chain", default)]
    pub rf_chain: u8,

    /// CRC status: 1 ok, 0 absent, negative failed
    pub crc: i8,

    /// Modulation, `LORA` or `FSK`
    #[serde(default)]
    pub modulation: String,

    /// Data rate tag
    #[serde(rename = "data rate")]
    pub data_rate: DataRate,

    /// LoRa coding rate, e.g. `4/5`
    #[serde(rename = "coding rate", default)]
    pub coding_rate: String,

    /// Received signal strength in dBm
    pub rssi: i16,

    /// Signal to noise ratio in dB
    pub snr: f64,

    /// PHY payload size in bytes
    pub size: u16,

    /// Base64 PHY payload
    pub data: String,
}

impl RxPacket {
    /// Whether the concentrator reported a failed CRC
    #[must_use]
    pub const fn has_invalid_crc(&self) -> bool {
        self.crc < 0
    }
}

/// The persisted unit: one reception with optional geolocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoObservation {
    /// Receiving gateway
    pub gateway: MacAddress,

    /// Transmitting device
    pub device: DevAddr,

    /// Reception time
    pub time: CompactTime,

    /// Center frequency in MHz
    pub frequency: f64,

    /// Data rate tag
    pub data_rate: DataRate,

    /// Reported transmit power, if the device sent one
    pub power: Option<i8>,

    /// Received signal strength in dBm
    pub rssi: i16,

    /// Signal to noise ratio in dB
    pub snr: f64,

    /// PHY payload size in bytes
    pub size: u16,

    /// Decrypted application payload, lowercase hex
    pub payload: String,

    /// Latitude in degrees
    pub latitude: Option<f64>,

    /// Longitude in degrees
    pub longitude: Option<f64>,
}

impl GeoObservation {
    /// Radio-level observation without geodata
    #[must_use]
    pub fn from_uplink(record: &RxPacket, device: DevAddr, payload: &[u8]) -> Self {
        Self {
            gateway: record.gateway_mac,
            device,
            time: record.time,
            frequency: record.frequency,
            data_rate: record.data_rate.clone(),
            power: None,
            rssi: record.rssi,
            snr: record.snr,
            size: record.size,
            payload: hex::encode(payload),
            latitude: None,
            longitude: None,
        }
    }

    /// Attach a decoded position and optional transmit power
    #[must_use]
    pub const fn with_position(mut self, latitude: f64, longitude: f64, power: Option<i8>) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.power = power;
        self
    }

    /// Whether both coordinates are present
    #[must_use]
    pub const fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// One located reception as read back for mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoveragePoint {
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::unreadable_literal,
    clippy::missing_panics_doc,
    clippy::float_cmp,
    clippy::uninlined_format_args
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn sample_fields() -> serde_json::Value {
        json!({
            "gateway mac": "0080000000000B88",
            "time": "2018-03-02T10:21:17.589871Z",
            "frequency": 868.1,
            "IF channel": 2,
            "RF chain": 1,
            "crc": 1,
            "modulation": "LORA",
            "data rate": "SF7BW125",
            "coding rate": "4/5",
            "rssi": -57,
            "snr": 9.5,
            "size": 20,
            "data": "QNobASYAAQABtGTmbHO4EPs="
        })
    }

    #[test]
    fn test_compact_time_display_trims_fraction() {
        let time: CompactTime = "2018-03-02T10:21:17.589870Z".parse().unwrap();
        assert_eq!(time.to_string(), "2018-03-02T10:21:17.58987Z");

        let whole: CompactTime = "2018-03-02T10:21:17Z".parse().unwrap();
        assert_eq!(whole.to_string(), "2018-03-02T10:21:17Z");
    }

    #[test]
    fn test_compact_time_normalizes_to_utc() {
        let time: CompactTime = "2018-03-02T12:21:17.5+02:00".parse().unwrap();
        assert_eq!(time.to_string(), "2018-03-02T10:21:17.5Z");
        assert_eq!(time.as_datetime().timestamp_subsec_millis(), 500);
    }

    #[rstest]
    #[case("")]
    #[case("2018-03-02")]
    #[case("10:21:17")]
    #[case("2018-03-02T10:21:17")]
    #[case("yesterday")]
    #[case("2018-03-02 10:21:17Z")]
    #[case("2018-03-02t10:21:17Z")]
    #[case("2018-03-02T10:21:17z")]
    #[case("2018-03-02T10:21:17.5z")]
    fn test_compact_time_rejects_bad_format(#[case] input: &str) {
        let err = input.parse::<CompactTime>().unwrap_err();
        assert!(matches!(err, Error::TimeFormat { .. }), "{input}: {err}");
    }

    #[test]
    fn test_compact_time_json() {
        let time: CompactTime = serde_json::from_str("\"2018-03-02T10:21:17.589871Z\"").unwrap();
        assert_eq!(
            serde_json::to_string(&time).unwrap(),
            "\"2018-03-02T10:21:17.589871Z\""
        );
    }

    #[test]
    fn test_data_rate_numeric_wins() {
        assert_eq!("50000".parse::<DataRate>().unwrap(), DataRate::Fsk(50000));
        assert_eq!("\"50000\"".parse::<DataRate>().unwrap(), DataRate::Fsk(50000));
        assert_eq!(
            " \"SF7BW125\" ".parse::<DataRate>().unwrap(),
            DataRate::Lora("SF7BW125".to_string())
        );
        assert!(matches!(
            "\"\"".parse::<DataRate>(),
            Err(Error::InvalidDataRate { .. })
        ));
    }

    #[test]
    fn test_data_rate_json_variants() {
        let lora: DataRate = serde_json::from_str("\"SF12BW125\"").unwrap();
        let fsk: DataRate = serde_json::from_str("50000").unwrap();
        let quoted_fsk: DataRate = serde_json::from_str("\"50000\"").unwrap();

        assert_eq!(lora, DataRate::Lora("SF12BW125".to_string()));
        assert_eq!(fsk, DataRate::Fsk(50000));
        assert_eq!(quoted_fsk, DataRate::Fsk(50000));

        assert_eq!(serde_json::to_string(&lora).unwrap(), "\"SF12BW125\"");
        assert_eq!(serde_json::to_string(&fsk).unwrap(), "50000");
        assert_eq!(fsk.to_string(), "50000");
        assert!(serde_json::from_str::<DataRate>("-1").is_err());
    }

    #[test]
    fn test_data_rate_lora_constructor() {
        assert!(DataRate::lora("SF7BW125").unwrap().is_lora());
        assert!(DataRate::lora("125").is_err());
        assert!(DataRate::lora("").is_err());
        assert!(DataRate::lora(" SF7BW125").is_err());
        assert!(DataRate::lora("\"SF7BW125\"").is_err());
        assert!(DataRate::lora("SF7BW125\"").is_err());
        assert!(DataRate::lora("\" SF7BW125").is_err());
        assert!(DataRate::lora("SF7 BW125").unwrap().is_lora());
    }

    #[test]
    fn test_mac_address_text() {
        let mac: MacAddress = "0080000000000b88".parse().unwrap();
        assert_eq!(mac.to_string(), "0080000000000B88");
        assert_eq!(mac.as_bytes(), &[0x00, 0x80, 0, 0, 0, 0, 0x0B, 0x88]);
    }

    #[rstest]
    #[case("", 0)]
    #[case("00800000000B88", 7)]
    #[case("008000000000000B88", 9)]
    fn test_mac_address_size_mismatch(#[case] input: &str, #[case] actual: usize) {
        let err = input.parse::<MacAddress>().unwrap_err();
        assert!(
            matches!(err, Error::MacAddressSize { actual: a } if a == actual),
            "{input}: {err}"
        );
    }

    #[test]
    fn test_mac_address_invalid_hex() {
        assert!(matches!(
            "00800000000B88Z".parse::<MacAddress>(),
            Err(Error::InvalidHex { .. })
        ));
        assert!(serde_json::from_str::<MacAddress>("\"0102\"").is_err());
    }

    #[test]
    fn test_dev_addr_byte_order() {
        let addr = DevAddr::from_le_bytes([0xDA, 0x1B, 0x01, 0x26]);
        assert_eq!(addr.to_string(), "26011bda");
        assert_eq!(addr.to_le_bytes(), [0xDA, 0x1B, 0x01, 0x26]);
        assert_eq!("26011BDA".parse::<DevAddr>().unwrap(), addr);
    }

    #[test]
    fn test_aes_key_parse_and_redaction() {
        let key: AesKey = "0102030405060708090A0B0C0D0E0F11".parse().unwrap();
        assert_eq!(key.as_bytes()[15], 0x11);
        assert_eq!(format!("{key:?}"), "AesKey(**redacted**)");
        assert!(matches!(
            "0102".parse::<AesKey>(),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_rx_packet_from_log_event() {
        let event = LogEvent {
            fields: sample_fields(),
            level: "info".to_string(),
            timestamp: "2018-03-02T10:21:17Z".to_string(),
            message: "PUSH_DATA: RXPK".to_string(),
        };

        assert!(event.is_uplink("PUSH_DATA: RXPK"));
        let packet = event.uplink_record().unwrap();

        assert_eq!(packet.gateway_mac.to_string(), "0080000000000B88");
        assert_eq!(packet.time.to_string(), "2018-03-02T10:21:17.589871Z");
        assert_eq!(packet.data_rate, DataRate::Lora("SF7BW125".to_string()));
        assert_eq!(packet.rssi, -57);
        assert_eq!(packet.size, 20);
        assert!(!packet.has_invalid_crc());
    }

    #[test]
    fn test_rx_packet_optional_radio_fields() {
        let mut fields = sample_fields();
        let object = fields.as_object_mut().unwrap();
        object.remove("coding rate");
        object.remove("IF channel");
        object.insert("data rate".to_string(), json!(50000));
        object.insert("crc".to_string(), json!(-1));

        let packet: RxPacket = serde_json::from_value(fields).unwrap();
        assert_eq!(packet.coding_rate, "");
        assert_eq!(packet.data_rate, DataRate::Fsk(50000));
        assert!(packet.has_invalid_crc());
    }

    #[test]
    fn test_rx_packet_rejects_short_gateway_mac() {
        let mut fields = sample_fields();
        fields["gateway mac"] = json!("0080000000");

        let err = serde_json::from_value::<RxPacket>(fields).unwrap_err();
        assert!(err.to_string().contains("mac address size"));
    }

    #[test]
    fn test_observation_from_uplink() {
        let packet: RxPacket = serde_json::from_value(sample_fields()).unwrap();
        let device = DevAddr::new([0x26, 0x01, 0x1B, 0xDA]);

        let observation = GeoObservation::from_uplink(&packet, device, &[0x00, 0x00, 0x64]);
        assert_eq!(observation.payload, "000064");
        assert!(!observation.has_position());
        assert!(observation.power.is_none());

        let located = observation.with_position(0.01, 0.02, Some(5));
        assert!(located.has_position());
        assert_eq!(located.latitude, Some(0.01));
        assert_eq!(located.power, Some(5));
    }

    proptest! {
        #[test]
        fn test_mac_address_roundtrip(bytes in proptest::array::uniform8(any::<u8>())) {
            let mac = MacAddress::new(bytes);
            let decoded: MacAddress = mac.to_string().parse().unwrap();
            prop_assert_eq!(decoded, mac);

            let json = serde_json::to_string(&mac).unwrap();
            let from_json: MacAddress = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(from_json, mac);
        }

        #[test]
        fn test_mac_address_any_eight_byte_hex(text in "[0-9a-fA-F]{16}") {
            prop_assert!(text.parse::<MacAddress>().is_ok());
        }

        #[test]
        fn test_mac_address_wrong_length(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
            prop_assume!(bytes.len() != 8);
            let text = hex::encode(&bytes);
            let is_size_mismatch = matches!(
                text.parse::<MacAddress>(),
                Err(Error::MacAddressSize { actual }) if actual == bytes.len()
            );
            prop_assert!(is_size_mismatch);
        }

        #[test]
        fn test_data_rate_label_roundtrip(label in "SF(7|8|9|10|11|12)BW(125|250|500)") {
            let rate = DataRate::lora(label).unwrap();
            let decoded: DataRate = rate.to_string().parse().unwrap();
            prop_assert_eq!(&decoded, &rate);

            let from_json: DataRate = serde_json::from_str(&serde_json::to_string(&rate).unwrap()).unwrap();
            prop_assert_eq!(from_json, rate);
        }

        #[test]
        fn test_data_rate_any_accepted_label_roundtrips(label in "[ \"]{0,2}[A-Za-z0-9 \"/._+-]{0,12}[ \"]{0,2}") {
            if let Ok(rate) = DataRate::lora(label.as_str()) {
                prop_assert_eq!(rate.to_string(), label);
                let decoded: DataRate = rate.to_string().parse().unwrap();
                prop_assert_eq!(&decoded, &rate);

                let from_json: DataRate = serde_json::from_str(&serde_json::to_string(&rate).unwrap()).unwrap();
                prop_assert_eq!(from_json, rate);
            }
        }

        #[test]
        fn test_data_rate_numeral_roundtrip(bit_rate in any::<u32>()) {
            let rate = DataRate::Fsk(bit_rate);
            let decoded: DataRate = rate.to_string().parse().unwrap();
            prop_assert_eq!(&decoded, &rate);

            let from_json: DataRate = serde_json::from_str(&serde_json::to_string(&rate).unwrap()).unwrap();
            prop_assert_eq!(from_json, rate);
        }

        #[test]
        fn test_compact_time_roundtrip(secs in 0i64..4_102_444_800i64, nanos in 0u32..1_000_000_000u32) {
            let time = CompactTime::new(DateTime::from_timestamp(secs, nanos).unwrap());
            let text = time.to_string();
            let decoded: CompactTime = text.parse().unwrap();
            prop_assert_eq!(decoded, time);
            prop_assert_eq!(decoded.to_string(), text);
        }
    }
}
