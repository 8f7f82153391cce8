//! Run configuration.
//!
//! The command line and the environment are collected into [`RawArgs`] as
//! plain strings. [`RawArgs::into_config`] validates them once and yields
//! the immutable [`RunConfig`] every component reads from.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use geo::{Geometry, Point, Polygon};
use wkt::TryFromWkt;

use crate::decompose::SplitLimits;
use crate::error::{ConfigError, Result};

pub const INPUT_FILE: &str = "GEOCLOUD_INPUT_FILE";
pub const OUTPUT_DIR: &str = "GEOCLOUD_OUTPUT_DIR";
pub const WORK_DIR: &str = "GEOCLOUD_WORK_DIR";
pub const BUFFER_DISTANCE: &str = "ROTOTILLER_BUFFER_DISTANCE";
pub const QUADRANT_SEGMENT_COUNT: &str = "ROTOTILLER_QUADRANT_SEGMENT_COUNT";
pub const FILTER_COLUMN: &str = "ROTOTILLER_FILTER_COLUMN";
pub const FILTER_VALUE: &str = "ROTOTILLER_FILTER_VALUE";
pub const ATTRIBUTES: &str = "ROTOTILLER_ATTRIBUTES";
pub const POLYGON: &str = "ROTOTILLER_POLYGON";
pub const LONGITUDE: &str = "GEOCLOUD_LONGITUDE";
pub const LATITUDE: &str = "GEOCLOUD_LATITUDE";
pub const LOOKUP_MODE: &str = "ROTOTILLER_LOOKUP_MODE";
pub const TARGET_PROJECTION: &str = "ROTOTILLER_TARGET_PROJECTION";
pub const SPLIT_THRESHOLD: &str = "ROTOTILLER_SPLIT_THRESHOLD";
pub const MAX_SPLIT_DEPTH: &str = "ROTOTILLER_MAX_SPLIT_DEPTH";
pub const MAX_SPLIT_PIECES: &str = "ROTOTILLER_MAX_SPLIT_PIECES";
pub const OGR2OGR: &str = "OGR2OGR";

/// Which task the run performs, before its parameters are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Buffer,
    Filter,
    Lookup,
    Reproject,
    RemoveInvalid,
    Validate,
}

impl FromStr for TaskKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buffer" => Ok(TaskKind::Buffer),
            "filter" => Ok(TaskKind::Filter),
            "lookup" => Ok(TaskKind::Lookup),
            "reproject" => Ok(TaskKind::Reproject),
            "remove-invalid" => Ok(TaskKind::RemoveInvalid),
            "validate" => Ok(TaskKind::Validate),
            other => Err(ConfigError::Invalid {
                name: "task",
                value: other.to_owned(),
                reason: "unknown task".to_owned(),
            }),
        }
    }
}

/// Unvalidated parameters as they arrive from the command line or the
/// environment.
#[derive(Debug, Clone)]
pub struct RawArgs {
    pub task: TaskKind,
    pub input: Option<String>,
    pub output_dir: Option<String>,
    pub work_dir: Option<String>,
    pub distance: Option<String>,
    pub quadrant_segments: Option<String>,
    pub column: Option<String>,
    pub value: Option<String>,
    pub attributes: Option<String>,
    pub polygon: Option<String>,
    pub longitude: Option<String>,
    pub latitude: Option<String>,
    pub mode: Option<String>,
    pub target_projection: Option<String>,
    pub split_threshold: Option<String>,
    pub max_split_depth: Option<String>,
    pub max_split_pieces: Option<String>,
    pub ogr2ogr: Option<String>,
}

/// Geometry a lookup is tested against.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryGeometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
}

impl QueryGeometry {
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            QueryGeometry::Point(p) => Geometry::Point(*p),
            QueryGeometry::Polygon(p) => Geometry::Polygon(p.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    /// Write the requested attributes of matching features as a JSON report.
    #[default]
    Report,
    /// Keep only the matching features.
    Extract,
}

impl fmt::Display for LookupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupMode::Report => f.write_str("report"),
            LookupMode::Extract => f.write_str("extract"),
        }
    }
}

/// A validated task with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Buffer {
        distance: f64,
        quadrant_segments: u32,
    },
    AttributeFilter {
        column: String,
        value: String,
    },
    Lookup {
        query: QueryGeometry,
        mode: LookupMode,
        attributes: Vec<String>,
    },
    Reproject {
        target_epsg: u32,
    },
    RemoveInvalidGeometry,
    Validate,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Buffer { .. } => "buffer",
            Task::AttributeFilter { .. } => "filter",
            Task::Lookup { .. } => "lookup",
            Task::Reproject { .. } => "reproject",
            Task::RemoveInvalidGeometry => "remove-invalid",
            Task::Validate => "validate",
        }
    }
}

/// Everything a run needs, validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub work_dir: Option<PathBuf>,
    pub task: Task,
    pub limits: SplitLimits,
    pub ogr2ogr: PathBuf,
}

impl RawArgs {
    pub fn new(task: TaskKind) -> Self {
        Self {
            task,
            input: None,
            output_dir: None,
            work_dir: None,
            distance: None,
            quadrant_segments: None,
            column: None,
            value: None,
            attributes: None,
            polygon: None,
            longitude: None,
            latitude: None,
            mode: None,
            target_projection: None,
            split_threshold: None,
            max_split_depth: None,
            max_split_pieces: None,
            ogr2ogr: None,
        }
    }

    pub fn into_config(self) -> Result<RunConfig> {
        let input = PathBuf::from(required(INPUT_FILE, self.input.as_deref())?);
        let output_dir = match self.task {
            TaskKind::Validate => self.output_dir.as_deref().map(PathBuf::from).unwrap_or_default(),
            _ => PathBuf::from(required(OUTPUT_DIR, self.output_dir.as_deref())?),
        };

        let task = match self.task {
            TaskKind::Buffer => {
                let distance: f64 = parse(BUFFER_DISTANCE, self.distance.as_deref())?;
                if !distance.is_finite() || distance <= 0.0 {
                    return Err(invalid(BUFFER_DISTANCE, distance, "must be a positive number"));
                }
                Task::Buffer {
                    distance,
                    quadrant_segments: positive(
                        QUADRANT_SEGMENT_COUNT,
                        self.quadrant_segments.as_deref(),
                    )?,
                }
            }
            TaskKind::Filter => Task::AttributeFilter {
                column: required(FILTER_COLUMN, self.column.as_deref())?.to_owned(),
                value: required(FILTER_VALUE, self.value.as_deref())?.to_owned(),
            },
            TaskKind::Lookup => Task::Lookup {
                query: self.query()?,
                mode: match self.mode.as_deref().map(str::trim) {
                    None | Some("report") => LookupMode::Report,
                    Some("extract") => LookupMode::Extract,
                    Some(other) => {
                        return Err(invalid(LOOKUP_MODE, other, "expected 'report' or 'extract'"))
                    }
                },
                attributes: attribute_list(self.attributes.as_deref())?,
            },
            TaskKind::Reproject => Task::Reproject {
                target_epsg: positive(TARGET_PROJECTION, self.target_projection.as_deref())?,
            },
            TaskKind::RemoveInvalid => Task::RemoveInvalidGeometry,
            TaskKind::Validate => Task::Validate,
        };

        let defaults = SplitLimits::default();
        let limits = SplitLimits {
            threshold: optional_positive(SPLIT_THRESHOLD, self.split_threshold.as_deref())?
                .unwrap_or(defaults.threshold),
            max_depth: optional_positive(MAX_SPLIT_DEPTH, self.max_split_depth.as_deref())?
                .unwrap_or(defaults.max_depth),
            max_pieces: optional_positive(MAX_SPLIT_PIECES, self.max_split_pieces.as_deref())?
                .unwrap_or(defaults.max_pieces),
        };

        Ok(RunConfig {
            input,
            output_dir,
            work_dir: self.work_dir.filter(|d| !d.is_empty()).map(PathBuf::from),
            task,
            limits,
            ogr2ogr: PathBuf::from(
                self.ogr2ogr
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "ogr2ogr".to_owned()),
            ),
        })
    }

    /// Exactly one of a WKT polygon or a longitude/latitude pair.
    fn query(&self) -> Result<QueryGeometry> {
        let polygon = self.polygon.as_deref().filter(|s| !s.trim().is_empty());
        let has_point = self.longitude.is_some() || self.latitude.is_some();

        match (polygon, has_point) {
            (Some(_), true) => Err(invalid(
                POLYGON,
                polygon.unwrap_or_default(),
                "give either a polygon or a longitude/latitude pair, not both",
            )),
            (Some(wkt), false) => Polygon::<f64>::try_from_wkt_str(wkt)
                .map(QueryGeometry::Polygon)
                .map_err(|e| invalid(POLYGON, wkt, e)),
            (None, true) => {
                let lon: f64 = parse(LONGITUDE, self.longitude.as_deref())?;
                let lat: f64 = parse(LATITUDE, self.latitude.as_deref())?;
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(invalid(LONGITUDE, lon, "must be within [-180, 180]"));
                }
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(invalid(LATITUDE, lat, "must be within [-90, 90]"));
                }
                Ok(QueryGeometry::Point(Point::new(lon, lat)))
            }
            (None, false) => Err(ConfigError::Missing {
                name: "ROTOTILLER_POLYGON or GEOCLOUD_LONGITUDE/GEOCLOUD_LATITUDE",
            }
            .into()),
        }
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing { name }.into())
}

fn parse<T>(name: &'static str, value: Option<&str>) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = required(name, value)?.trim();
    raw.parse::<T>().map_err(|e| invalid(name, raw, e))
}

fn positive<T>(name: &'static str, value: Option<&str>) -> Result<T>
where
    T: FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let parsed: T = parse(name, value)?;
    if parsed <= T::default() {
        return Err(invalid(name, parsed, "must be greater than zero"));
    }
    Ok(parsed)
}

fn optional_positive(name: &'static str, value: Option<&str>) -> Result<Option<usize>> {
    match value.filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(v) => positive(name, Some(v)).map(Some),
    }
}

fn attribute_list(value: Option<&str>) -> Result<Vec<String>> {
    let raw = required(ATTRIBUTES, value)?;
    let names: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    if names.is_empty() {
        return Err(invalid(ATTRIBUTES, raw, "no attribute names given"));
    }
    Ok(names)
}

fn invalid(
    name: &'static str,
    value: impl fmt::Display,
    reason: impl fmt::Display,
) -> crate::error::Error {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
