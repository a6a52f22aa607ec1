//! Database models for the coverage table

use chrono::NaiveDateTime;
use lora_coverage_core::{CoveragePoint, Error, GeoObservation, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored coverage row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CoverageRowDb {
    /// Gateway MAC, uppercase hex
    pub gateway: String,

    /// Device address, lowercase hex
    pub device: String,

    /// Reception time, compact RFC 3339
    pub time: String,

    /// Frequency in MHz
    pub frequency: f64,

    /// Data rate label or bit rate
    pub datarate: String,

    /// Transmit power
    pub power: Option<i64>,

    /// Received signal strength in dBm
    pub rssi: i64,

    /// Signal to noise ratio in dB
    pub snr: f64,

    /// PHY payload size in bytes
    pub size: i64,

    /// Decrypted payload, lowercase hex
    pub payload: String,

    /// Latitude in degrees
    pub lat: Option<f64>,

    /// Longitude in degrees
    pub lon: Option<f64>,

    /// Insert timestamp set by the database, UTC
    pub create_time: Option<NaiveDateTime>,
}

impl TryFrom<CoverageRowDb> for GeoObservation {
    type Error = Error;

    fn try_from(row: CoverageRowDb) -> Result<Self> {
        Ok(Self {
            gateway: row.gateway.parse()?,
            device: row.device.parse()?,
            time: row.time.parse()?,
            frequency: row.frequency,
            data_rate: row.datarate.parse()?,
            power: row.power.map(|p| narrow("power", p)).transpose()?,
            rssi: narrow("rssi", row.rssi)?,
            snr: row.snr,
            size: narrow("size", row.size)?,
            payload: row.payload,
            latitude: row.lat,
            longitude: row.lon,
        })
    }
}

/// RSSI and position of one located row
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct CoveragePointDb {
    /// Received signal strength in dBm
    pub rssi: i64,
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl TryFrom<CoveragePointDb> for CoveragePoint {
    type Error = Error;

    fn try_from(row: CoveragePointDb) -> Result<Self> {
        Ok(Self {
            rssi: narrow("rssi", row.rssi)?,
            latitude: row.lat,
            longitude: row.lon,
        })
    }
}

fn narrow<T: TryFrom<i64>>(column: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| Error::Database(format!("Column {column} out of range: {value}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc, clippy::float_cmp)]
mod tests {
    use super::*;
    use lora_coverage_core::DataRate;
    use pretty_assertions::assert_eq;

    fn row() -> CoverageRowDb {
        CoverageRowDb {
            gateway: "ABCDEF0011223344".to_string(),
            device: "26011bda".to_string(),
            time: "2018-03-02T10:21:17.589871Z".to_string(),
            frequency: 868.1,
            datarate: "SF7BW125".to_string(),
            power: Some(-2),
            rssi: -80,
            snr: 7.5,
            size: 20,
            payload: "07a120008bd8fe".to_string(),
            lat: Some(50.0),
            lon: Some(3.58),
            create_time: chrono::NaiveDate::from_ymd_opt(2018, 3, 2)
                .and_then(|d| d.and_hms_opt(10, 21, 18)),
        }
    }

    #[test]
    fn test_row_to_observation() {
        let observation = GeoObservation::try_from(row()).unwrap();

        assert_eq!(observation.gateway.to_string(), "ABCDEF0011223344");
        assert_eq!(observation.device.to_string(), "26011bda");
        assert_eq!(observation.data_rate, DataRate::Lora("SF7BW125".to_string()));
        assert_eq!(observation.power, Some(-2));
        assert_eq!(observation.rssi, -80);
        assert_eq!(observation.latitude, Some(50.0));
    }

    #[test]
    fn test_row_with_absent_geodata() {
        let row = CoverageRowDb {
            power: None,
            lat: None,
            lon: None,
            datarate: "50000".to_string(),
            ..row()
        };

        let observation = GeoObservation::try_from(row).unwrap();
        assert_eq!(observation.power, None);
        assert!(!observation.has_position());
        assert_eq!(observation.data_rate, DataRate::Fsk(50000));
    }

    #[test]
    fn test_row_out_of_range() {
        let row = CoverageRowDb {
            power: Some(300),
            ..row()
        };
        assert!(matches!(GeoObservation::try_from(row), Err(Error::Database(_))));

        let point = CoveragePointDb {
            rssi: 70_000,
            lat: 0.0,
            lon: 0.0,
        };
        assert!(CoveragePoint::try_from(point).is_err());
    }
}
