//! Shapefile / GeoJSON conversion.
//!
//! Shapefiles are never read or written in-process. They are converted to
//! and from GeoJSON by an external converter at the edges of a run.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConversionFailure(pub String);

/// Converts between the packaged shapefile format and GeoJSON.
pub trait FormatConverter {
    /// Writes the vector data at `source` as a GeoJSON document at `destination`.
    fn to_geojson(&self, source: &Path, destination: &Path) -> Result<(), ConversionFailure>;

    /// Writes the GeoJSON document at `source` as a shapefile set whose
    /// `.shp` member is `destination`.
    fn to_shapefile(&self, source: &Path, destination: &Path) -> Result<(), ConversionFailure>;
}

/// Conversion through GDAL's `ogr2ogr` program.
#[derive(Debug, Clone)]
pub struct Ogr2Ogr {
    program: PathBuf,
}

impl Ogr2Ogr {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn convert(
        &self,
        driver: &str,
        source: &Path,
        destination: &Path,
    ) -> Result<(), ConversionFailure> {
        debug!(
            "{} -f \"{driver}\" {} {}",
            self.program.display(),
            destination.display(),
            source.display()
        );
        let output = Command::new(&self.program)
            .arg("-f")
            .arg(driver)
            .arg(destination)
            .arg(source)
            .output()
            .map_err(|e| {
                ConversionFailure(format!("failed to run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(ConversionFailure(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl FormatConverter for Ogr2Ogr {
    fn to_geojson(&self, source: &Path, destination: &Path) -> Result<(), ConversionFailure> {
        self.convert("GeoJSON", source, destination)
    }

    fn to_shapefile(&self, source: &Path, destination: &Path) -> Result<(), ConversionFailure> {
        self.convert("ESRI Shapefile", source, destination)
    }
}
