//! LoRaWAN frame handling and log classification for coverage mapping
//!
//! Everything here is synchronous and free of I/O: the frame decryptor
//! contract and its LoRaWAN implementation, the geolocation payload decoder,
//! the per-line ingestion classifier and the GeoJSON projector.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod classifier;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod payload;
pub mod projector;

pub use classifier::{Classification, UplinkClassifier};
pub use crypto::{LoRaWanDecryptor, UplinkBuilder};
pub use error::{ClassifyError, FrameError, RejectKind};
pub use frame::{DecryptedFrame, FrameDecryptor, MType};
pub use payload::GeoPosition;
pub use projector::{FeatureCollection, project};
