//! Point and polygon lookups.
//!
//! A report collects the requested attributes of every feature that
//! intersects the query into `{"results": [...]}`. An extract keeps the
//! intersecting features and deletes the rest.

use std::path::Path;

use geo::{Geometry, Intersects};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{Progress, TaskOutcome, TaskOutput};
use crate::config::QueryGeometry;
use crate::engine::{Access, Feature};
use crate::error::Result;
use crate::pipeline::Pipeline;

fn hits(feature: &Feature, query: &Geometry<f64>) -> bool {
    feature
        .geometry()
        .is_some_and(|geometry| geometry.intersects(query))
}

/// Collects `attributes` of the intersecting features into a report.
/// Attribute names missing from the schema are skipped.
pub fn report(source: &Path, query: &QueryGeometry, attributes: &[String]) -> Result<TaskOutcome> {
    let mut pipeline = Pipeline::open(source, Access::ReadOnly)?;
    let layer = pipeline.source_mut()?;

    let mut columns = Vec::with_capacity(attributes.len());
    for name in attributes {
        match layer.field_index(name) {
            Some(index) => columns.push((name.as_str(), index)),
            None => warn!(
                "Attribute '{name}' is not a field of layer '{}', skipping",
                layer.name()
            ),
        }
    }

    let query = query.to_geometry();
    let read = layer.feature_count();
    let mut progress = Progress::new("Searched", read);
    let mut results = Vec::new();

    while let Some(feature) = layer.next_feature() {
        if hits(&feature, &query) {
            let entry: Map<String, Value> = columns
                .iter()
                .map(|(name, index)| {
                    let value = feature.field_as_string(*index).unwrap_or_default();
                    ((*name).to_owned(), Value::from(value))
                })
                .collect();
            results.push(Value::Object(entry));
        }
        progress.tick();
    }
    pipeline.commit()?;

    info!("{} of {read} features intersect the query", results.len());
    Ok(TaskOutcome {
        read,
        kept: results.len(),
        output: TaskOutput::Report(json!({ "results": results })),
    })
}

/// Deletes every feature that does not intersect the query. For point
/// queries the geometry of each kept feature is replaced by the point.
pub fn extract(source: &Path, query: &QueryGeometry) -> Result<TaskOutcome> {
    let mut pipeline = Pipeline::open(source, Access::Update)?;
    let layer = pipeline.source_mut()?;

    let geometry = query.to_geometry();
    let read = layer.feature_count();
    let mut progress = Progress::new("Searched", read);

    while let Some(mut feature) = layer.next_feature() {
        if !hits(&feature, &geometry) {
            layer.delete_feature(feature.fid())?;
        } else if let QueryGeometry::Point(point) = query {
            feature.set_geometry(Geometry::Point(*point));
            layer.set_feature(feature)?;
        }
        progress.tick();
    }

    let kept = layer.feature_count();
    pipeline.commit()?;
    info!("Kept {kept} of {read} features intersecting the query");

    Ok(TaskOutcome {
        read,
        kept,
        output: TaskOutput::Dataset(source.to_path_buf()),
    })
}
