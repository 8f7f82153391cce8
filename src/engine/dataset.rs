use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use geo::Geometry;
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::{debug, warn};

use super::feature::{Feature, FieldDefn, FieldType, FieldValue, GeometryType};
use super::layer::Layer;
use super::srs::SpatialRef;
use crate::error::{EngineError, InputError, OutputError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    Update,
}

/// A GeoJSON document opened as a vector dataset.
///
/// Changes live in memory until [`VectorDataset::close`] commits them to
/// disk. A dataset dropped without being closed discards its changes, so a
/// failed run never leaves a half-written document behind.
#[derive(Debug)]
pub struct VectorDataset {
    path: PathBuf,
    access: Access,
    layers: Vec<Layer>,
    created: bool,
    closed: bool,
}

impl VectorDataset {
    pub fn open(path: &Path, access: Access) -> Result<Self> {
        let file = File::open(path).map_err(|source| InputError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let geojson =
            GeoJson::from_reader(BufReader::new(file)).map_err(|e| InputError::Malformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let layer = read_layer(path, geojson)?;
        debug!(
            "Opened {} with layer '{}' ({} features)",
            path.display(),
            layer.name(),
            layer.feature_count()
        );
        Ok(Self {
            path: path.to_path_buf(),
            access,
            layers: vec![layer],
            created: false,
            closed: false,
        })
    }

    /// Creates an empty dataset that will be written to `path` on close.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(OutputError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "dataset already exists",
                ),
            }
            .into());
        }
        Ok(Self {
            path: path.to_path_buf(),
            access: Access::Update,
            layers: Vec::new(),
            created: true,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Adds the dataset's single layer.
    pub fn create_layer(
        &mut self,
        name: &str,
        geometry_type: GeometryType,
        spatial_ref: Option<SpatialRef>,
    ) -> Result<&mut Layer> {
        if self.access == Access::ReadOnly {
            return Err(EngineError::ReadOnly {
                path: self.path.clone(),
            }
            .into());
        }
        if !self.layers.is_empty() {
            return Err(EngineError::LayerLimit {
                path: self.path.clone(),
            }
            .into());
        }
        self.layers
            .push(Layer::new(name, geometry_type, spatial_ref));
        let index = self.layers.len() - 1;
        Ok(&mut self.layers[index])
    }

    /// Commits pending changes and releases the dataset.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let modified = self.created || self.layers.iter().any(Layer::is_dirty);
        if !modified {
            return Ok(());
        }
        if self.access == Access::ReadOnly {
            return Err(EngineError::ReadOnly {
                path: self.path.clone(),
            }
            .into());
        }
        let Some(layer) = self.layers.first() else {
            debug!("Dataset {} has no layers, nothing to write", self.path.display());
            return Ok(());
        };
        write_layer(&self.path, layer)
    }
}

impl Drop for VectorDataset {
    fn drop(&mut self) {
        if !self.closed && self.layers.iter().any(Layer::is_dirty) {
            debug!(
                "Discarding uncommitted changes to {}",
                self.path.display()
            );
        }
    }
}

fn read_layer(path: &Path, geojson: GeoJson) -> Result<Layer> {
    let (features, foreign_members) = match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(geometry) => (
            vec![geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            None,
        ),
    };
    let members = foreign_members.unwrap_or_default();

    let name = members
        .get("name")
        .and_then(JsonValue::as_str)
        .map(str::to_owned)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "layer".to_string());
    let spatial_ref = read_spatial_ref(path, members.get("crs"));

    // Schema in first-appearance order across all features.
    let mut fields: Vec<FieldDefn> = Vec::new();
    for feature in &features {
        for (key, value) in feature.properties.iter().flatten() {
            let field_type = FieldType::of(value);
            match fields.iter_mut().find(|f| f.name() == key) {
                Some(defn) => {
                    if let Some(t) = field_type {
                        defn.widen_to(t);
                    }
                }
                None => fields.push(FieldDefn::new(key, field_type.unwrap_or(FieldType::String))),
            }
        }
    }

    let mut geometry_type: Option<GeometryType> = None;
    let mut layer_features = Vec::with_capacity(features.len());
    for (fid, feature) in features.into_iter().enumerate() {
        let geometry = match feature.geometry {
            Some(g) => {
                let geometry =
                    Geometry::<f64>::try_from(g.value).map_err(|e| InputError::Malformed {
                        path: path.to_path_buf(),
                        message: format!("feature {fid}: {e}"),
                    })?;
                let t = GeometryType::of(&geometry);
                geometry_type = Some(geometry_type.map_or(t, |current| current.merge(t)));
                Some(geometry)
            }
            None => None,
        };

        let properties = feature.properties.unwrap_or_default();
        let values = fields
            .iter()
            .map(|defn| {
                properties
                    .get(defn.name())
                    .cloned()
                    .and_then(FieldValue::from_json)
            })
            .collect();

        layer_features.push(Feature::from_parts(fid as u64, feature.id, values, geometry));
    }

    Ok(Layer::from_parts(
        name,
        geometry_type.unwrap_or(GeometryType::Unknown),
        spatial_ref,
        fields,
        layer_features,
    ))
}

fn read_spatial_ref(path: &Path, crs: Option<&JsonValue>) -> Option<SpatialRef> {
    match crs {
        None => Some(SpatialRef::WGS84),
        Some(JsonValue::Null) => None,
        Some(crs) => {
            let name = crs
                .get("properties")
                .and_then(|p| p.get("name"))
                .and_then(JsonValue::as_str);
            let parsed = name.and_then(SpatialRef::from_crs_name);
            if parsed.is_none() {
                warn!("Unrecognised crs member in {}: {crs}", path.display());
            }
            parsed
        }
    }
}

/// Converts a value set as text to the JSON scalar its field type calls for.
fn typed_value(text: &str, field_type: FieldType) -> JsonValue {
    let parsed = match field_type {
        FieldType::Integer => text.parse::<i64>().ok().map(JsonValue::from),
        FieldType::Real => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number),
        FieldType::Boolean => text.parse::<bool>().ok().map(JsonValue::Bool),
        FieldType::String => None,
    };
    parsed.unwrap_or_else(|| JsonValue::String(text.to_owned()))
}

fn write_layer(path: &Path, layer: &Layer) -> Result<()> {
    let features = layer
        .features()
        .map(|feature| {
            let mut properties = JsonObject::new();
            for (defn, value) in layer.fields().iter().zip(feature.fields()) {
                let value = match value {
                    Some(v) => v
                        .json()
                        .cloned()
                        .unwrap_or_else(|| typed_value(v.as_str(), defn.field_type())),
                    None => JsonValue::Null,
                };
                properties.insert(defn.name().to_owned(), value);
            }
            geojson::Feature {
                bbox: None,
                geometry: feature
                    .geometry()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: feature.id().cloned(),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut members = JsonObject::new();
    members.insert("name".to_owned(), JsonValue::from(layer.name()));
    match layer.spatial_ref() {
        Some(srs) if srs == SpatialRef::WGS84 => {}
        Some(srs) => {
            members.insert(
                "crs".to_owned(),
                serde_json::json!({ "type": "name", "properties": { "name": srs.urn() } }),
            );
        }
        None => {
            members.insert("crs".to_owned(), JsonValue::Null);
        }
    }

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(members),
    };

    let file = File::create(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection).map_err(|source| OutputError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        "Wrote {} features to {}",
        layer.feature_count(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "name": "roads",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3857" } },
        "features": [
            { "type": "Feature", "id": 7, "properties": { "type": "road", "lanes": 2 },
              "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] } },
            { "type": "Feature", "properties": { "lanes": 2.5, "type": "river", "note": null },
              "geometry": { "type": "MultiLineString", "coordinates": [[[0, 0], [2, 2]]] } },
            { "type": "Feature", "properties": { "type": "road" }, "geometry": null }
        ]
    }"#;

    #[test]
    fn opens_a_feature_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        fs::write(&path, ROADS).unwrap();

        let dataset = VectorDataset::open(&path, Access::ReadOnly).unwrap();
        assert_eq!(dataset.layer_count(), 1);

        let layer = dataset.layer(0).unwrap();
        assert_eq!(layer.name(), "roads");
        assert_eq!(layer.spatial_ref(), Some(SpatialRef::from_epsg(3857)));
        assert_eq!(layer.geometry_type(), GeometryType::MultiLineString);

        let names: Vec<&str> = layer.fields().iter().map(FieldDefn::name).collect();
        assert_eq!(names, vec!["type", "lanes", "note"]);
        assert_eq!(layer.fields()[1].field_type(), FieldType::Real);

        let features: Vec<&Feature> = layer.features().collect();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].field_as_string(1), Some("2"));
        assert_eq!(features[1].field_as_string(2), None);
        assert!(features[2].geometry().is_none());
    }

    #[test]
    fn changes_are_committed_only_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        fs::write(&path, ROADS).unwrap();

        {
            let mut dataset = VectorDataset::open(&path, Access::Update).unwrap();
            dataset.layer_mut(0).unwrap().delete_feature(0).unwrap();
        }
        let reopened = VectorDataset::open(&path, Access::ReadOnly).unwrap();
        assert_eq!(reopened.layer(0).unwrap().feature_count(), 3);

        let mut dataset = VectorDataset::open(&path, Access::Update).unwrap();
        dataset.layer_mut(0).unwrap().delete_feature(0).unwrap();
        dataset.close().unwrap();

        let reopened = VectorDataset::open(&path, Access::ReadOnly).unwrap();
        let layer = reopened.layer(0).unwrap();
        assert_eq!(layer.feature_count(), 2);
        assert_eq!(layer.name(), "roads");
        assert_eq!(layer.spatial_ref(), Some(SpatialRef::from_epsg(3857)));
    }

    #[test]
    fn written_values_keep_their_field_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        let mut dataset = VectorDataset::create(&path).unwrap();
        let layer = dataset
            .create_layer("out", GeometryType::Point, None)
            .unwrap();
        layer
            .create_field(FieldDefn::new("count", FieldType::Integer))
            .unwrap();
        layer
            .create_field(FieldDefn::new("label", FieldType::String))
            .unwrap();
        let mut feature = Feature::new(2);
        feature.set_field(0, Some("12"));
        feature.set_field(1, Some("12"));
        layer.create_feature(feature).unwrap();
        dataset.close().unwrap();

        let written: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let properties = &written["features"][0]["properties"];
        assert_eq!(properties["count"], serde_json::json!(12));
        assert_eq!(properties["label"], serde_json::json!("12"));
        assert_eq!(written["crs"], JsonValue::Null);
    }

    #[test]
    fn rewriting_keeps_property_values_as_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"n":2,"tags":{"k":"v"},"refs":[1,"a"]},"geometry":null},
                {"type":"Feature","properties":{"n":2.5,"tags":null,"refs":null},"geometry":null},
                {"type":"Feature","properties":{"n":3},"geometry":null}
            ]}"#,
        )
        .unwrap();

        let mut dataset = VectorDataset::open(&path, Access::Update).unwrap();
        assert_eq!(dataset.layer(0).unwrap().fields()[0].field_type(), FieldType::Real);
        dataset.layer_mut(0).unwrap().delete_feature(2).unwrap();
        dataset.close().unwrap();

        let written: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let features = written["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(
            features[0]["properties"],
            serde_json::json!({ "n": 2, "tags": { "k": "v" }, "refs": [1, "a"] })
        );
        assert_eq!(features[1]["properties"]["n"], serde_json::json!(2.5));
        assert!(features[0]["properties"]["n"].is_i64());
    }

    #[test]
    fn read_only_datasets_reject_new_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        fs::write(&path, ROADS).unwrap();

        let mut dataset = VectorDataset::open(&path, Access::ReadOnly).unwrap();
        assert!(dataset
            .create_layer("more", GeometryType::Point, None)
            .is_err());
    }

    #[test]
    fn malformed_documents_are_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = VectorDataset::open(&path, Access::ReadOnly).unwrap_err();
        assert_eq!(err.exit_code(), 66);
    }
}
