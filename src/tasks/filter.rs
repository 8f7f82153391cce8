use std::path::Path;

use tracing::info;

use super::{Progress, TaskOutcome, TaskOutput};
use crate::engine::{Access, AttributeFilter};
use crate::error::{ConfigError, Result};
use crate::pipeline::Pipeline;

/// Keeps only the features whose `column` equals `value`.
///
/// Works in place: every feature the inequality filter yields is deleted.
/// Features with a null `column` are deleted as well.
pub fn run(source: &Path, column: &str, value: &str) -> Result<TaskOutcome> {
    info!("Filter: {column} = '{value}'");

    let mut pipeline = Pipeline::open(source, Access::Update)?;
    let layer = pipeline.source_mut()?;
    let field = layer
        .field_index(column)
        .ok_or_else(|| ConfigError::UnknownColumn {
            column: column.to_owned(),
            layer: layer.name().to_owned(),
        })?;
    let read = layer.feature_count();

    layer.set_attribute_filter(Some(AttributeFilter::NotEquals {
        field,
        value: value.to_owned(),
    }));
    let mut progress = Progress::new("Filtered", read);
    while let Some(feature) = layer.next_feature() {
        layer.delete_feature(feature.fid())?;
        progress.tick();
    }
    layer.set_attribute_filter(None);

    let kept = layer.feature_count();
    pipeline.commit()?;
    info!("Kept {kept} of {read} features, deleted {}", progress.done());

    Ok(TaskOutcome {
        read,
        kept,
        output: TaskOutput::Dataset(source.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VectorDataset;
    use serde_json::json;
    use std::fs;

    fn point(properties: serde_json::Value, x: f64) -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": properties,
            "geometry": { "type": "Point", "coordinates": [x, 0.0] }
        })
    }

    fn collection(features: Vec<serde_json::Value>) -> String {
        json!({ "type": "FeatureCollection", "features": features }).to_string()
    }

    fn roads() -> String {
        collection(vec![
            point(json!({ "type": "road", "n": 1 }), 0.0),
            point(json!({ "type": "river", "n": 2 }), 1.0),
            point(json!({ "type": null, "n": 3 }), 2.0),
            point(json!({ "type": "road", "n": 4 }), 3.0),
        ])
    }

    fn kept_ids(path: &Path) -> Vec<String> {
        let dataset = VectorDataset::open(path, Access::ReadOnly).unwrap();
        dataset
            .layer(0)
            .unwrap()
            .features()
            .map(|f| f.field_as_string(1).unwrap_or_default().to_owned())
            .collect()
    }

    #[test]
    fn keeps_exactly_the_matching_features() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.json");
        fs::write(&path, roads()).unwrap();

        let outcome = run(&path, "type", "road").unwrap();
        assert_eq!((outcome.read, outcome.kept), (4, 2));
        assert_eq!(kept_ids(&path), vec!["1", "4"]);

        // running again changes nothing
        let again = run(&path, "type", "road").unwrap();
        assert_eq!((again.read, again.kept), (2, 2));
        assert_eq!(kept_ids(&path), vec!["1", "4"]);
    }

    #[test]
    fn unknown_column_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.json");
        fs::write(&path, roads()).unwrap();

        let err = run(&path, "kind", "road").unwrap_err();
        assert_eq!(err.exit_code(), 78);
        assert_eq!(fs::read_to_string(&path).unwrap(), roads());
    }

    #[test]
    fn mixed_numeric_columns_filter_the_same_way_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("levels.json");
        fs::write(
            &path,
            collection(vec![
                point(json!({ "level": 2 }), 0.0),
                point(json!({ "level": 2.5 }), 1.0),
                point(json!({ "level": 2 }), 2.0),
            ]),
        )
        .unwrap();

        let first = run(&path, "level", "2").unwrap();
        assert_eq!((first.read, first.kept), (3, 2));
        let again = run(&path, "level", "2").unwrap();
        assert_eq!((again.read, again.kept), (2, 2));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let levels: Vec<_> = written["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["properties"]["level"].clone())
            .collect();
        assert_eq!(levels, vec![json!(2), json!(2)]);
        assert!(levels.iter().all(serde_json::Value::is_i64));
    }
}
