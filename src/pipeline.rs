//! Dataset pipeline controller.
//!
//! Stages the resolved input as a working GeoJSON document, opens it and,
//! for tasks that build a fresh result, creates an output layer whose
//! schema is an in-order copy of the source's.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::convert::FormatConverter;
use crate::engine::{Access, Feature, GeometryType, Layer, SpatialRef, VectorDataset};
use crate::error::{DataError, EngineError, InputError, Result};
use crate::resolver::ResolvedInput;
use crate::workspace::Workspace;

/// Copies or converts the resolved input into the workspace and returns
/// the path of the working document. The user's input is never opened for
/// writing.
pub fn stage_source(
    input: &ResolvedInput,
    workspace: &Workspace,
    converter: &dyn FormatConverter,
) -> Result<PathBuf> {
    let stem = input
        .source_path()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
    let working = workspace.file(&format!("{stem}.json"));

    match input {
        ResolvedInput::Archived(set) => {
            converter
                .to_geojson(&set.shp, &working)
                .map_err(|e| InputError::Conversion {
                    path: set.shp.clone(),
                    message: e.to_string(),
                })?;
        }
        ResolvedInput::Plain(doc) => {
            fs::copy(&doc.path, &working).map_err(|source| InputError::Unreadable {
                path: doc.path.clone(),
                source,
            })?;
        }
    }
    debug!("Working copy: {}", working.display());
    Ok(working)
}

pub fn first_layer(dataset: &VectorDataset) -> Result<&Layer> {
    dataset.layer(0).ok_or_else(|| {
        DataError::NoLayers {
            path: dataset.path().to_path_buf(),
        }
        .into()
    })
}

pub fn first_layer_mut(dataset: &mut VectorDataset) -> Result<&mut Layer> {
    let path = dataset.path().to_path_buf();
    dataset
        .layer_mut(0)
        .ok_or_else(|| DataError::NoLayers { path }.into())
}

/// Datasets held open for one task.
///
/// Fields drop in declaration order, so an uncommitted sink is released
/// before the source it was built from.
#[derive(Debug)]
pub struct Pipeline {
    sink: Option<VectorDataset>,
    source: VectorDataset,
}

impl Pipeline {
    /// Opens `path` and rewinds its first layer.
    pub fn open(path: &Path, access: Access) -> Result<Self> {
        let mut source = VectorDataset::open(path, access)?;
        let layer = first_layer_mut(&mut source)?;
        layer.reset_reading();
        info!(
            "Layer '{}': {} features, geometry type {}, spatial reference {}",
            layer.name(),
            layer.feature_count(),
            layer.geometry_type(),
            layer
                .spatial_ref()
                .map_or_else(|| "none".to_string(), |s| s.to_string())
        );
        Ok(Self { sink: None, source })
    }

    /// Creates the output dataset at `path` with one layer named after the
    /// source layer and carrying a copy of its fields, in order.
    pub fn create_output(
        &mut self,
        path: &Path,
        geometry_type: GeometryType,
        spatial_ref: Option<SpatialRef>,
    ) -> Result<()> {
        let template = first_layer(&self.source)?;
        let mut sink = VectorDataset::create(path)?;
        let layer = sink.create_layer(template.name(), geometry_type, spatial_ref)?;
        for defn in template.fields() {
            layer.create_field(defn.clone())?;
        }
        debug!(
            "Created output layer '{}' ({geometry_type}) with {} fields",
            layer.name(),
            layer.fields().len()
        );
        self.sink = Some(sink);
        Ok(())
    }

    pub fn source(&self) -> Result<&Layer> {
        first_layer(&self.source)
    }

    pub fn source_mut(&mut self) -> Result<&mut Layer> {
        first_layer_mut(&mut self.source)
    }

    /// Source layer and output layer, for tasks that copy between them.
    pub fn layers_mut(&mut self) -> Result<(&mut Layer, &mut Layer)> {
        let sink = self.sink.as_mut().ok_or(EngineError::Operation {
            operation: "open output layer",
            fid: None,
            message: "no output dataset has been created".to_owned(),
        })?;
        Ok((first_layer_mut(&mut self.source)?, first_layer_mut(sink)?))
    }

    /// Commits the output, then the source.
    pub fn commit(self) -> Result<()> {
        let Pipeline { sink, source } = self;
        if let Some(sink) = sink {
            sink.close()?;
        }
        source.close()
    }
}

/// A fresh feature for a schema of `field_count` fields carrying the
/// attributes of `source` at matching indices.
pub fn rebuild_feature(source: &Feature, field_count: usize) -> Feature {
    let mut feature = Feature::new(field_count);
    for index in 0..field_count {
        feature.set_field_value(index, source.field(index).cloned());
    }
    feature.set_id(source.id().cloned());
    feature
}
