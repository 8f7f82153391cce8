//! Error taxonomy for a task run.
//!
//! Every failure is fatal. The categories only exist so the process can
//! report what kind of thing went wrong and pick a matching exit status.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Root error returned by every component.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl Error {
    /// Process exit status for this error, following `sysexits.h`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 78,
            Error::Input(_) => 66,
            Error::Data(_) => 65,
            Error::Engine(_) => 70,
            Error::Output(_) => 73,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Input(_) => "input",
            Error::Data(_) => "data",
            Error::Engine(_) => "engine",
            Error::Output(_) => "output",
        }
    }
}

/// Missing or invalid parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be set")]
    Missing { name: &'static str },

    #[error("{name} is invalid, got '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("filter column '{column}' is not a field of layer '{layer}'")]
    UnknownColumn { column: String, layer: String },
}

/// The input file could not be used as given.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input file '{path}' must be a .zip, .json or .geojson")]
    UnsupportedExtension { path: PathBuf },

    #[error("failed to read input '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive member '{member}' in '{path}' escapes the extraction directory")]
    UnsafeMember { path: PathBuf, member: String },

    #[error("archive '{path}' must contain exactly one .{extension} file, found {found}")]
    MemberCount {
        path: PathBuf,
        extension: &'static str,
        found: usize,
    },

    #[error("malformed vector document '{path}': {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("failed to import '{path}': {message}")]
    Conversion { path: PathBuf, message: String },
}

/// The input is readable but its content cannot support the task.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("dataset '{path}' has no layers")]
    NoLayers { path: PathBuf },

    #[error("layer '{layer}' has no spatial reference")]
    MissingSpatialRef { layer: String },

    #[error("cannot build transform from {source_crs} to EPSG:{target}: {message}")]
    UnresolvableEpsg {
        source_crs: String,
        target: u32,
        message: String,
    },

    #[error("feature {fid} has no geometry")]
    MissingGeometry { fid: u64 },

    #[error("cannot compute an envelope for a geometry with {children} parts")]
    EmptyEnvelope { children: usize },

    #[error("geometry decomposition exceeded {limit} of {max} (geometry has {children} parts)")]
    DecompositionLimit {
        limit: &'static str,
        max: usize,
        children: usize,
    },
}

fn on_feature(fid: &Option<u64>) -> String {
    fid.map(|f| format!(" on feature {f}")).unwrap_or_default()
}

/// A call into the dataset or geometry engine failed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} failed{}: {message}", on_feature(.fid))]
    Operation {
        operation: &'static str,
        fid: Option<u64>,
        message: String,
    },

    #[error("layer '{layer}' has no feature {fid}")]
    NoSuchFeature { layer: String, fid: u64 },

    #[error("layer '{layer}' already has a field named '{field}'")]
    DuplicateField { layer: String, field: String },

    #[error("feature has {found} values but layer '{layer}' has {expected} fields")]
    SchemaMismatch {
        layer: String,
        expected: usize,
        found: usize,
    },

    #[error("dataset '{path}' is read-only")]
    ReadOnly { path: PathBuf },

    #[error("dataset '{path}' already holds a layer")]
    LayerLimit { path: PathBuf },
}

/// Output artifacts could not be created.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to export '{path}': {message}")]
    Conversion { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_categories() {
        let config: Error = ConfigError::Missing {
            name: "GEOCLOUD_INPUT_FILE",
        }
        .into();
        let data: Error = DataError::MissingGeometry { fid: 3 }.into();
        let engine: Error = EngineError::Operation {
            operation: "transform",
            fid: Some(2),
            message: "boom".into(),
        }
        .into();

        assert_eq!(config.exit_code(), 78);
        assert_eq!(data.exit_code(), 65);
        assert_eq!(engine.exit_code(), 70);
        assert_eq!(engine.to_string(), "transform failed on feature 2: boom");
        assert_eq!(config.to_string(), "GEOCLOUD_INPUT_FILE must be set");
    }
}
