//! Geolocation payload decoding
//!
//! Layout, big-endian: `lat(3) | lon(3) | [power(1)]`. Coordinates are
//! unsigned 24-bit fixed point in units of 1/10000 degree.

use crate::error::ClassifyError;
use serde::Serialize;

/// Fixed-point scale of the coordinate fields
pub const COORDINATE_SCALE: f64 = 10_000.0;

/// A decoded device position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPosition {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Reported transmit power, absent in 6-byte payloads
    pub power: Option<i8>,
}

impl GeoPosition {
    /// Decode a 6 or 7 byte payload
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidPayloadLength`] for any other length.
    pub fn decode(payload: &[u8]) -> Result<Self, ClassifyError> {
        let (lat, lon, power) = match payload {
            [a0, a1, a2, o0, o1, o2] => ([*a0, *a1, *a2], [*o0, *o1, *o2], None),
            [a0, a1, a2, o0, o1, o2, p] => ([*a0, *a1, *a2], [*o0, *o1, *o2], Some(*p)),
            _ => {
                return Err(ClassifyError::InvalidPayloadLength {
                    length: payload.len(),
                });
            }
        };

        Ok(Self {
            latitude: coordinate(lat),
            longitude: coordinate(lon),
            power: power.map(|p| i8::from_be_bytes([p])),
        })
    }

    /// Encode back to the payload layout, rounding to the fixed-point grid
    ///
    /// Coordinates outside `0..=1677.7215` are clamped.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(7);
        payload.extend_from_slice(&fixed_point(self.latitude));
        payload.extend_from_slice(&fixed_point(self.longitude));
        if let Some(power) = self.power {
            payload.extend_from_slice(&power.to_be_bytes());
        }
        payload
    }
}

fn coordinate([b0, b1, b2]: [u8; 3]) -> f64 {
    f64::from(u32::from_be_bytes([0, b0, b1, b2])) / COORDINATE_SCALE
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fixed_point(degrees: f64) -> [u8; 3] {
    let units = (degrees * COORDINATE_SCALE).round().clamp(0.0, f64::from(0x00FF_FFFF_u32)) as u32;
    let [_, b0, b1, b2] = units.to_be_bytes();
    [b0, b1, b2]
}
