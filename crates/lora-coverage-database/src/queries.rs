//! Database query operations for the coverage table

use crate::models::{CoveragePointDb, CoverageRowDb};
use lora_coverage_core::{CoveragePoint, DataRate, Error, GeoObservation, MacAddress, Result};
use sqlx::SqlitePool;

/// Coverage table operations
#[derive(Debug)]
pub struct CoverageQueries;

impl CoverageQueries {
    /// Insert one observation
    ///
    /// The uniqueness check and the insert are a single statement, so two
    /// writers racing on the same observation cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateObservation`] if a row with the same
    /// gateway, device, time and payload exists, [`Error::Database`] for any
    /// other failure.
    pub async fn insert(pool: &SqlitePool, observation: &GeoObservation) -> Result<()> {
        let query = r"
            INSERT INTO coverage (
                gateway, device, time, frequency, datarate, power,
                rssi, snr, size, payload, lat, lon
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ";

        sqlx::query(query)
            .bind(observation.gateway.to_string())
            .bind(observation.device.to_string())
            .bind(observation.time.to_string())
            .bind(observation.frequency)
            .bind(observation.data_rate.to_string())
            .bind(observation.power.map(i64::from))
            .bind(i64::from(observation.rssi))
            .bind(observation.snr)
            .bind(i64::from(observation.size))
            .bind(&observation.payload)
            .bind(observation.latitude)
            .bind(observation.longitude)
            .execute(pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    Error::DuplicateObservation {
                        gateway: observation.gateway.to_string(),
                        device: observation.device.to_string(),
                        time: observation.time.to_string(),
                    }
                }
                _ => Error::Database(e.to_string()),
            })?;

        Ok(())
    }

    /// RSSI and position of every located row for a gateway and data rate
    ///
    /// Rows without coordinates are left out. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_points(
        pool: &SqlitePool,
        gateway: &MacAddress,
        data_rate: &DataRate,
    ) -> Result<Vec<CoveragePoint>> {
        let query = r"
            SELECT rssi, lat, lon FROM coverage
            WHERE gateway = ? AND datarate = ?
              AND lat IS NOT NULL AND lon IS NOT NULL
        ";

        sqlx::query_as::<_, CoveragePointDb>(query)
            .bind(gateway.to_string())
            .bind(data_rate.to_string())
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?
            .into_iter()
            .map(CoveragePoint::try_from)
            .collect()
    }

    /// All rows received by a gateway, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_gateway(
        pool: &SqlitePool,
        gateway: &MacAddress,
    ) -> Result<Vec<CoverageRowDb>> {
        let query = r"
            SELECT * FROM coverage
            WHERE gateway = ?
            ORDER BY time ASC
        ";

        sqlx::query_as::<_, CoverageRowDb>(query)
            .bind(gateway.to_string())
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Total number of stored rows
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let query = "SELECT COUNT(*) FROM coverage";

        let (count,): (i64,) = sqlx::query_as(query)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count)
    }
}
