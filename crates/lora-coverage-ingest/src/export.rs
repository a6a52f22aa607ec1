//! Coverage map export as a GeoJSON-P script

use crate::{IngestError, Result};
use lora_coverage_core::{DataRate, MacAddress, config::is_callback_name};
use lora_coverage_database::{CoverageQueries, SqlitePool};
use lora_coverage_protocol::project;
use serde::Serialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Result of a finished export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// File that was written
    pub path: PathBuf,

    /// Number of points in the collection
    pub features: usize,
}

/// Write the coverage of one gateway and data rate to `output`
///
/// The file is replaced in one step, so a failed export leaves any previous
/// output untouched and never produces a partial file.
///
/// # Errors
///
/// Returns an error if the callback is not a valid identifier, the query
/// fails, or the output cannot be written.
#[instrument(skip_all, fields(gateway = %gateway, data_rate = %data_rate))]
pub async fn export_geojson(
    pool: &SqlitePool,
    gateway: &MacAddress,
    data_rate: &DataRate,
    callback: &str,
    output: &Path,
) -> Result<ExportReport> {
    if !is_callback_name(callback) {
        return Err(IngestError::configuration(format!(
            "'{callback}' is not a valid JSONP callback name"
        )));
    }

    let points = CoverageQueries::find_points(pool, gateway, data_rate).await?;
    if points.is_empty() {
        warn!("No located observations for this gateway and data rate");
    }

    let body = project(&points)
        .to_jsonp(callback)
        .map_err(|e| IngestError::export(output, e.to_string()))?;
    write_replacing(output, body.as_bytes()).await?;

    info!(
        path = %output.display(),
        features = points.len(),
        "Coverage exported"
    );

    Ok(ExportReport {
        path: output.to_path_buf(),
        features: points.len(),
    })
}

/// Write to a sibling temp file, then rename over `path`
async fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| IngestError::export(path, "output path has no file name"))?;

    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let replaced = match tokio::fs::write(&temp_path, contents).await {
        Ok(()) => tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(format!("cannot write {}: {e}", temp_path.display())),
    };

    if let Err(message) = replaced {
        // Leave no temp file behind, whichever step failed
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(IngestError::export(path, message));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_write_replacing_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_geo.json");
        tokio::fs::write(&path, b"old").await.unwrap();

        write_replacing(&path, b"new").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new");
        assert!(!dir.path().join(".data_geo.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_replacing_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("data_geo.json");

        let result = write_replacing(&path, b"{}").await;

        assert!(matches!(result, Err(IngestError::Export { .. })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_write_replacing_failure_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_geo.json");
        tokio::fs::create_dir(&path).await.unwrap();
        tokio::fs::write(path.join("occupied"), b"x").await.unwrap();

        let result = write_replacing(&path, b"{}").await;

        assert!(matches!(result, Err(IngestError::Export { .. })));
        assert!(!dir.path().join(".data_geo.json.tmp").exists());
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_write_replacing_overwrites_stale_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_geo.json");
        tokio::fs::write(dir.path().join(".data_geo.json.tmp"), b"partial")
            .await
            .unwrap();

        write_replacing(&path, b"complete").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"complete");
        assert!(!dir.path().join(".data_geo.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_replacing_rejects_directory_path() {
        let result = write_replacing(Path::new("/"), b"{}").await;
        assert!(matches!(result, Err(IngestError::Export { ref message, .. }) if message.contains("no file name")));
    }
}
