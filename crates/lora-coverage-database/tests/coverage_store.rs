//! Coverage store tests against a temporary SQLite file

#![allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use lora_coverage_core::{Config, DataRate, DevAddr, Error, GeoObservation, MacAddress};
use lora_coverage_database::{CoverageQueries, Database};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

async fn open_store() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.path().join("coverage.db").display());

    let database = Database::open(&config).await.unwrap();
    (dir, database)
}

fn gateway() -> MacAddress {
    "ABCDEF0011223344".parse().unwrap()
}

fn observation(time: &str, rssi: i16, position: Option<(f64, f64)>) -> GeoObservation {
    let observation = GeoObservation {
        gateway: gateway(),
        device: DevAddr::new([0x26, 0x01, 0x1B, 0xDA]),
        time: time.parse().unwrap(),
        frequency: 868.1,
        data_rate: DataRate::Lora("SF7BW125".to_string()),
        power: None,
        rssi,
        snr: 7.5,
        size: 20,
        payload: "0000640000c8".to_string(),
        latitude: None,
        longitude: None,
    };

    match position {
        Some((lat, lon)) => observation.with_position(lat, lon, Some(14)),
        None => observation,
    }
}

#[tokio::test]
async fn test_insert_and_read_back() {
    let (_dir, database) = open_store().await;
    let stored = observation("2018-03-02T10:21:17.589871Z", -80, Some((0.01, 0.02)));

    CoverageQueries::insert(database.pool(), &stored).await.unwrap();

    let rows = CoverageQueries::find_by_gateway(database.pool(), &gateway())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].create_time.is_some());

    let read_back = GeoObservation::try_from(rows[0].clone()).unwrap();
    assert_eq!(read_back, stored);
}

#[tokio::test]
async fn test_duplicate_insert_is_reported() {
    let (_dir, database) = open_store().await;
    let stored = observation("2018-03-02T10:21:17.589871Z", -80, Some((0.01, 0.02)));

    CoverageQueries::insert(database.pool(), &stored).await.unwrap();
    let err = CoverageQueries::insert(database.pool(), &stored)
        .await
        .unwrap_err();

    assert!(err.is_duplicate(), "{err}");
    assert!(matches!(
        err,
        Error::DuplicateObservation { ref gateway, ref device, .. }
            if gateway == "ABCDEF0011223344" && device == "26011bda"
    ));
    assert_eq!(CoverageQueries::count(database.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_key_with_other_payload_is_distinct() {
    let (_dir, database) = open_store().await;
    let first = observation("2018-03-02T10:21:17Z", -80, None);
    let mut second = first.clone();
    second.payload = "0102030405".to_string();

    CoverageQueries::insert(database.pool(), &first).await.unwrap();
    CoverageQueries::insert(database.pool(), &second).await.unwrap();

    assert_eq!(CoverageQueries::count(database.pool()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_absent_fields_are_stored_as_null() {
    let (_dir, database) = open_store().await;
    CoverageQueries::insert(
        database.pool(),
        &observation("2018-03-02T10:21:17Z", -101, None),
    )
    .await
    .unwrap();

    let (power, lat, lon): (Option<i64>, Option<f64>, Option<f64>) =
        sqlx::query_as("SELECT power, lat, lon FROM coverage")
            .fetch_one(database.pool())
            .await
            .unwrap();

    assert_eq!(power, None);
    assert_eq!(lat, None);
    assert_eq!(lon, None);
}

#[tokio::test]
async fn test_find_points_filters_and_skips_unlocated() {
    let (_dir, database) = open_store().await;
    let pool = database.pool();

    CoverageQueries::insert(pool, &observation("2018-03-02T10:00:00Z", -80, Some((50.85, 4.35))))
        .await
        .unwrap();
    CoverageQueries::insert(pool, &observation("2018-03-02T10:01:00Z", -95, Some((51.22, 4.4))))
        .await
        .unwrap();
    CoverageQueries::insert(pool, &observation("2018-03-02T10:02:00Z", -110, None))
        .await
        .unwrap();

    let mut other_rate = observation("2018-03-02T10:03:00Z", -70, Some((50.0, 4.0)));
    other_rate.data_rate = DataRate::Lora("SF12BW125".to_string());
    CoverageQueries::insert(pool, &other_rate).await.unwrap();

    let mut other_gateway = observation("2018-03-02T10:04:00Z", -60, Some((50.0, 4.0)));
    other_gateway.gateway = "0080000000000B88".parse().unwrap();
    CoverageQueries::insert(pool, &other_gateway).await.unwrap();

    let mut points = CoverageQueries::find_points(
        pool,
        &gateway(),
        &DataRate::Lora("SF7BW125".to_string()),
    )
    .await
    .unwrap();
    points.sort_by_key(|p| p.rssi);

    assert_eq!(points.len(), 2);
    assert_eq!(points[0].rssi, -95);
    assert_eq!(points[0].latitude, 51.22);
    assert_eq!(points[1].rssi, -80);
    assert_eq!(points[1].longitude, 4.35);
}

#[tokio::test]
async fn test_fsk_rate_query() {
    let (_dir, database) = open_store().await;
    let mut fsk = observation("2018-03-02T10:00:00Z", -90, Some((1.0, 2.0)));
    fsk.data_rate = DataRate::Fsk(50000);
    CoverageQueries::insert(database.pool(), &fsk).await.unwrap();

    let points = CoverageQueries::find_points(database.pool(), &gateway(), &"50000".parse().unwrap())
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
}

#[tokio::test]
async fn test_reopen_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.path().join("coverage.db").display());

    let database = Database::open(&config).await.unwrap();
    CoverageQueries::insert(
        database.pool(),
        &observation("2018-03-02T10:00:00Z", -90, None),
    )
    .await
    .unwrap();
    database.close().await;

    let reopened = Database::open(&config).await.unwrap();
    assert_eq!(CoverageQueries::count(reopened.pool()).await.unwrap(), 1);
}
