use std::path::Path;

use tracing::info;

use super::{Progress, TaskOutcome, TaskOutput};
use crate::engine::{Access, CoordTransform, SpatialRef};
use crate::error::{DataError, Result};
use crate::pipeline::Pipeline;

/// Transforms every geometry in place to `target_epsg` and records the new
/// spatial reference on the layer. Features without geometry pass through.
pub fn run(source: &Path, target_epsg: u32) -> Result<TaskOutcome> {
    let mut pipeline = Pipeline::open(source, Access::Update)?;
    let layer = pipeline.source_mut()?;

    let from = layer
        .spatial_ref()
        .ok_or_else(|| DataError::MissingSpatialRef {
            layer: layer.name().to_owned(),
        })?;
    let target = SpatialRef::from_epsg(target_epsg);
    let transform = CoordTransform::new(from, target)?;
    info!("Reprojecting from {} to {}", transform.source(), transform.target());

    let read = layer.feature_count();
    let mut progress = Progress::new("Reprojected", read);
    while let Some(mut feature) = layer.next_feature() {
        let fid = feature.fid();
        if let Some(mut geometry) = feature.steal_geometry() {
            transform.transform(&mut geometry, fid)?;
            feature.set_geometry(geometry);
            layer.set_feature(feature)?;
        }
        progress.tick();
    }
    layer.set_spatial_ref(Some(target));

    let kept = layer.feature_count();
    pipeline.commit()?;

    Ok(TaskOutcome {
        read,
        kept,
        output: TaskOutput::Dataset(source.to_path_buf()),
    })
}
