//! GeoJSON projection of stored coverage points

use lora_coverage_core::CoveragePoint;
use serde::{Deserialize, Serialize};

/// A GeoJSON `FeatureCollection`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    /// Point features, one per reception
    pub features: Vec<Feature>,
}

/// A GeoJSON `Feature` carrying the signal strength of one reception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    /// Where the device was
    pub geometry: Point,
    /// What the gateway heard
    pub properties: SignalProperties,
}

/// A GeoJSON `Point`
///
/// Coordinates are ordered `[latitude, longitude]`, the order the coverage
/// map pages read them in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Point")]
pub struct Point {
    /// `[latitude, longitude]` in degrees
    pub coordinates: [f64; 2],
}

/// Feature properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalProperties {
    /// Received signal strength in dBm
    pub rssi: i16,
}

impl From<&CoveragePoint> for Feature {
    fn from(point: &CoveragePoint) -> Self {
        Self {
            geometry: Point {
                coordinates: [point.latitude, point.longitude],
            },
            properties: SignalProperties { rssi: point.rssi },
        }
    }
}

/// Build one point feature per coverage point, in input order
#[must_use]
pub fn project(points: &[CoveragePoint]) -> FeatureCollection {
    FeatureCollection {
        features: points.iter().map(Feature::from).collect(),
    }
}

impl FeatureCollection {
    /// Wrap the collection as `<callback>(<json>);` for script inclusion
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a coordinate is not finite, since JSON would
    /// otherwise carry it as `null`.
    pub fn to_jsonp(&self, callback: &str) -> serde_json::Result<String> {
        if let Some(feature) = self
            .features
            .iter()
            .find(|feature| feature.geometry.coordinates.iter().any(|c| !c.is_finite()))
        {
            return Err(serde::ser::Error::custom(format!(
                "non-finite coordinates {:?} (rssi {})",
                feature.geometry.coordinates, feature.properties.rssi
            )));
        }

        Ok(format!("{callback}({});", serde_json::to_string(self)?))
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
    use serde_json::json;

    fn points() -> Vec<CoveragePoint> {
        vec![
            CoveragePoint {
                rssi: -80,
                latitude: 50.8503,
                longitude: 4.3517,
            },
            CoveragePoint {
                rssi: -95,
                latitude: 51.2194,
                longitude: 4.4025,
            },
        ]
    }

    #[test]
    fn test_project_shape() {
        let collection = project(&points());
        let value = serde_json::to_value(&collection).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": {"type": "Point", "coordinates": [50.8503, 4.3517]},
                        "properties": {"rssi": -80}
                    },
                    {
                        "type": "Feature",
                        "geometry": {"type": "Point", "coordinates": [51.2194, 4.4025]},
                        "properties": {"rssi": -95}
                    }
                ]
            })
        );
    }

    #[test]
    fn test_project_empty() {
        let collection = project(&[]);
        assert_eq!(
            collection.to_jsonp("cb").unwrap(),
            r#"cb({"type":"FeatureCollection","features":[]});"#
        );
    }

    #[test]
    fn test_jsonp_rejects_non_finite_coordinates() {
        let mut points = points();
        points[1].longitude = f64::NAN;

        let err = project(&points).to_jsonp("cb").unwrap_err();
        assert!(err.to_string().contains("rssi -95"), "{err}");

        points[1].longitude = f64::INFINITY;
        assert!(project(&points).to_jsonp("cb").is_err());
    }

    #[test]
    fn test_jsonp_wrapping() {
        let jsonp = project(&points()).to_jsonp("eqfeed_callback").unwrap();

        assert!(jsonp.starts_with("eqfeed_callback({"));
        assert!(jsonp.ends_with("});"));

        let body = jsonp
            .strip_prefix("eqfeed_callback(")
            .and_then(|rest| rest.strip_suffix(");"))
            .unwrap();
        assert_eq!(body, serde_json::to_string(&project(&points())).unwrap());

        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["features"][1]["properties"]["rssi"], json!(-95));
    }
}
