//! End to end ingestion and export against temporary SQLite stores

#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::float_cmp,
    clippy::indexing_slicing
)]

use lora_coverage_core::{Config, DataRate, DevAddr, MacAddress, SessionKeys, config::LoraConfig};
use lora_coverage_database::{CoverageQueries, Database};
use lora_coverage_ingest::{IngestError, export, ingest_file};
use lora_coverage_protocol::{FeatureCollection, GeoPosition, RejectKind, UplinkBuilder};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

const NWK_S_KEY: &str = "2B7E151628AED2A6ABF7158809CF4F3C";
const APP_S_KEY: &str = "000102030405060708090A0B0C0D0E0F";

fn keys() -> SessionKeys {
    SessionKeys {
        nwk_s_key: NWK_S_KEY.parse().unwrap(),
        app_s_key: APP_S_KEY.parse().unwrap(),
    }
}

fn config_in(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.url = format!("sqlite://{}", dir.path().join("coverage.db").display());
    config.lora = Some(LoraConfig {
        nwk_s_key: Some(NWK_S_KEY.parse().unwrap()),
        app_s_key: Some(APP_S_KEY.parse().unwrap()),
    });
    config
}

fn located(latitude: f64, longitude: f64) -> Vec<u8> {
    GeoPosition {
        latitude,
        longitude,
        power: Some(14),
    }
    .encode()
}

fn uplink_line(time: &str, rssi: i16, crc: i8, fcnt: u16, payload: &[u8]) -> String {
    let data = UplinkBuilder::new(keys(), DevAddr::new([0x26, 0x01, 0x1B, 0xDA]))
        .fcnt(fcnt)
        .build_wire(payload)
        .unwrap();

    json!({
        "fields": {
            "gateway mac": "ABCDEF0011223344",
            "time": time,
            "frequency": 868.1,
            "IF channel": 0,
            "RF chain": 1,
            "crc": crc,
            "modulation": "LORA",
            "data rate": "SF7BW125",
            "coding rate": "4/5",
            "rssi": rssi,
            "snr": 7.5,
            "size": 20,
            "data": data
        },
        "level": "info",
        "timestamp": time,
        "message": "PUSH_DATA: RXPK"
    })
    .to_string()
}

async fn write_log(dir: &TempDir) -> PathBuf {
    let lines = [
        uplink_line("2018-03-02T10:21:17.589871Z", -80, 1, 1, &located(50.8503, 4.3517)),
        uplink_line("2018-03-02T10:22:17Z", -95, 1, 2, &located(51.2194, 4.4025)),
        r#"{"fields": {}, "level": "info", "timestamp": "2018-03-02T10:22:30Z", "message": "PUSH_DATA: STAT"}"#.to_string(),
        uplink_line("2018-03-02T10:23:17Z", -101, -1, 3, &located(50.0, 4.0)),
        uplink_line("2018-03-02T10:24:17Z", -110, 1, 4, &[0x01, 0x02, 0x03, 0x04, 0x05]),
        "PUSH_DATA: RXPK not json".to_string(),
    ];

    let path = dir.path().join("gateway.log");
    tokio::fs::write(&path, lines.join("\n")).await.unwrap();
    path
}

fn strip_callback<'a>(body: &'a str, callback: &str) -> &'a str {
    body.strip_prefix(callback)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(");"))
        .unwrap()
}

#[tokio::test]
async fn test_ingest_counts_every_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let log = write_log(&dir).await;

    let summary = ingest_file(&config, &log).await.unwrap();

    assert_eq!(summary.lines, 6);
    assert_eq!(summary.persisted, 3);
    assert_eq!(summary.salvaged, 1);
    assert_eq!(summary.ignored, 1);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(summary.rejected_of(RejectKind::InvalidCrc), 1);
    assert_eq!(summary.rejected_of(RejectKind::LineParse), 1);
    assert_eq!(summary.rejected_total(), 2);
}

#[tokio::test]
async fn test_salvaged_row_keeps_radio_fields() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let log = write_log(&dir).await;
    ingest_file(&config, &log).await.unwrap();

    let database = Database::open(&config).await.unwrap();
    let gateway: MacAddress = "ABCDEF0011223344".parse().unwrap();
    let rows = CoverageQueries::find_by_gateway(database.pool(), &gateway)
        .await
        .unwrap();

    let salvaged = rows.iter().find(|row| row.rssi == -110).unwrap();
    assert_eq!(salvaged.payload, "0102030405");
    assert_eq!(salvaged.snr, 7.5);
    assert_eq!(salvaged.size, 20);
    assert_eq!(salvaged.power, None);
    assert_eq!(salvaged.lat, None);
    assert_eq!(salvaged.lon, None);

    let located = rows.iter().find(|row| row.rssi == -80).unwrap();
    assert_eq!(located.power, Some(14));
    assert_eq!(located.lat, Some(50.8503));
    assert_eq!(located.lon, Some(4.3517));

    assert!(rows.iter().all(|row| row.rssi != -101));
}

#[tokio::test]
async fn test_reingest_adds_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let log = write_log(&dir).await;

    ingest_file(&config, &log).await.unwrap();
    let again = ingest_file(&config, &log).await.unwrap();

    assert_eq!(again.persisted, 0);
    assert_eq!(again.duplicates, 3);

    let database = Database::open(&config).await.unwrap();
    assert_eq!(CoverageQueries::count(database.pool()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_salvage_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.ingest.salvage_invalid_payload_length = false;
    let log = write_log(&dir).await;

    let summary = ingest_file(&config, &log).await.unwrap();

    assert_eq!(summary.persisted, 2);
    assert_eq!(summary.salvaged, 0);
    assert_eq!(summary.rejected_of(RejectKind::InvalidPayloadLength), 1);
}

#[tokio::test]
async fn test_export_writes_jsonp() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let log = write_log(&dir).await;
    ingest_file(&config, &log).await.unwrap();

    let output = dir.path().join("data_geo.json");
    let gateway: MacAddress = "abcdef0011223344".parse().unwrap();
    let data_rate: DataRate = "SF7BW125".parse().unwrap();
    let report = export(&config, &gateway, &data_rate, None, Some(&output))
        .await
        .unwrap();

    assert_eq!(report.features, 2);
    assert_eq!(report.path, output);

    let body = tokio::fs::read_to_string(&output).await.unwrap();
    assert!(body.starts_with("eqfeed_callback({\"type\":\"FeatureCollection\""));

    let collection: FeatureCollection =
        serde_json::from_str(strip_callback(&body, "eqfeed_callback")).unwrap();
    let mut features = collection.features;
    features.sort_by_key(|f| f.properties.rssi);

    assert_eq!(features.len(), 2);
    assert_eq!(features[0].properties.rssi, -95);
    assert_eq!(features[1].properties.rssi, -80);

    let [lat, lon] = features[1].geometry.coordinates;
    assert!((lon - 4.3517).abs() < 1e-9);
    assert!((lat - 50.8503).abs() < 1e-9);
}

#[tokio::test]
async fn test_export_custom_callback_and_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let output = dir.path().join("sf12.js");
    let gateway: MacAddress = "ABCDEF0011223344".parse().unwrap();

    let report = export(
        &config,
        &gateway,
        &"SF12BW125".parse().unwrap(),
        Some("coverage.sf12"),
        Some(&output),
    )
    .await
    .unwrap();

    assert_eq!(report.features, 0);
    assert_eq!(
        tokio::fs::read_to_string(&output).await.unwrap(),
        r#"coverage.sf12({"type":"FeatureCollection","features":[]});"#
    );
}

#[tokio::test]
async fn test_failed_export_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data_geo.json");
    let gateway: MacAddress = "ABCDEF0011223344".parse().unwrap();
    let data_rate: DataRate = "SF7BW125".parse().unwrap();

    let mut unreachable = config_in(&dir);
    unreachable.database.url = format!(
        "sqlite://{}",
        dir.path().join("missing").join("coverage.db").display()
    );
    unreachable.database.connect_timeout = 1;
    let result = export(&unreachable, &gateway, &data_rate, None, Some(&output)).await;
    assert!(matches!(result, Err(IngestError::Store(_))));
    assert!(!output.exists());

    let result = export(
        &config_in(&dir),
        &gateway,
        &data_rate,
        Some("alert(1)//"),
        Some(&output),
    )
    .await;
    assert!(matches!(result, Err(IngestError::Configuration { .. })));
    assert!(!output.exists());
}
