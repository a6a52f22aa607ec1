//! Benchmarks for frame decryption and log line classification

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation, missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lora_coverage_core::{DevAddr, SessionKeys, config::IngestConfig};
use lora_coverage_protocol::{
    FrameDecryptor, GeoPosition, LoRaWanDecryptor, UplinkBuilder, UplinkClassifier,
};
use std::hint::black_box;

fn keys() -> SessionKeys {
    SessionKeys {
        nwk_s_key: "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap(),
        app_s_key: "000102030405060708090A0B0C0D0E0F".parse().unwrap(),
    }
}

fn uplink_line(data: &str, crc: i8, rssi: i16) -> String {
    serde_json::json!({
        "fields": {
            "gateway mac": "0080000000000B88",
            "time": "2018-03-02T10:21:17.589871Z",
            "frequency": 868.1,
            "IF channel": 2,
            "RF chain": 1,
            "crc": crc,
            "modulation": "LORA",
            "data rate": "SF7BW125",
            "coding rate": "4/5",
            "rssi": rssi,
            "snr": 9.5,
            "size": 20,
            "data": data
        },
        "level": "info",
        "timestamp": "2018-03-02T10:21:17Z",
        "message": "PUSH_DATA: RXPK"
    })
    .to_string()
}

/// Benchmark MIC check and payload decryption for several payload sizes
fn bench_decrypt(c: &mut Criterion) {
    let mut group = c.benchmark_group("decrypt");
    let keys = keys();
    let builder = UplinkBuilder::new(keys, DevAddr::new([0x26, 0x01, 0x1B, 0xDA])).fcnt(42);

    for size in [7usize, 51, 222] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let wire = builder.build_wire(&payload).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("lorawan", size), &wire, |b, wire| {
            b.iter(|| LoRaWanDecryptor.decrypt(black_box(wire), &keys));
        });
    }

    group.finish();
}

/// Benchmark geolocation decoding
fn bench_geo_decode(c: &mut Criterion) {
    let payload = [0x07, 0xA1, 0x20, 0x00, 0x8B, 0xD8, 0x05];
    c.bench_function("geo_decode", |b| {
        b.iter(|| GeoPosition::decode(black_box(&payload)));
    });
}

/// Benchmark classifying a realistic mix of log lines
fn bench_classify_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let classifier =
        UplinkClassifier::with_decryptor(LoRaWanDecryptor, keys(), &IngestConfig::default());
    let device = DevAddr::new([0x26, 0x01, 0x1B, 0xDA]);

    let mut lines = Vec::new();
    for fcnt in 0..200u16 {
        let wire = UplinkBuilder::new(keys(), device)
            .fcnt(fcnt)
            .build_wire(&[0x07, 0xA1, 0x20, 0x00, 0x8B, 0xD8, 0x05])
            .unwrap();
        lines.push(uplink_line(&wire, 1, -60 - i16::try_from(fcnt % 60).unwrap()));
    }
    lines.push(uplink_line("QNobASYAAQABtGTmbHO4EPs=", -1, -120));
    lines.push(r#"{"fields":{},"level":"info","timestamp":"","message":"PULL_DATA"}"#.to_string());
    lines.push("garbage".to_string());

    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("mixed_log", |b| {
        b.iter(|| {
            lines
                .iter()
                .filter(|line| classifier.classify(line).observation().is_some())
                .count()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decrypt, bench_geo_decode, bench_classify_mix);

criterion_main!(benches);
