use std::path::Path;

use geo::Validation;
use tracing::{debug, info};

use super::{Progress, TaskOutcome, TaskOutput};
use crate::engine::Access;
use crate::error::Result;
use crate::pipeline::Pipeline;

/// Deletes every feature whose geometry is missing or invalid.
pub fn run(source: &Path) -> Result<TaskOutcome> {
    let mut pipeline = Pipeline::open(source, Access::Update)?;
    let layer = pipeline.source_mut()?;

    let read = layer.feature_count();
    let mut progress = Progress::new("Validated", read);
    while let Some(feature) = layer.next_feature() {
        let valid = feature.geometry().is_some_and(|g| g.is_valid());
        if !valid {
            debug!("Removing feature {} with invalid geometry", feature.fid());
            layer.delete_feature(feature.fid())?;
        }
        progress.tick();
    }

    let kept = layer.feature_count();
    pipeline.commit()?;
    info!("Removed {} invalid features, {kept} remain", read - kept);

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
    use std::fs;

    #[test]
    fn bowties_and_empty_features_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapes.json");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"name":"square"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
                {"type":"Feature","properties":{"name":"bowtie"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,2],[2,0],[0,2],[0,0]]]}},
                {"type":"Feature","properties":{"name":"nothing"},"geometry":null}
            ]}"#,
        )
        .unwrap();

        let outcome = run(&path).unwrap();
        assert_eq!((outcome.read, outcome.kept), (3, 1));

        let dataset = VectorDataset::open(&path, Access::ReadOnly).unwrap();
        let names: Vec<_> = dataset
            .layer(0)
            .unwrap()
            .features()
            .map(|f| f.field_as_string(0).unwrap_or_default().to_owned())
            .collect();
        assert_eq!(names, vec!["square"]);
    }

    #[test]
    fn kept_features_keep_their_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged.json");
        fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"tags":{"k":"v"},"n":2},
                 "geometry":{"type":"Point","coordinates":[0,0]}},
                {"type":"Feature","properties":{"tags":null,"n":2.5},"geometry":null}
            ]}"#,
        )
        .unwrap();

        let outcome = run(&path).unwrap();
        assert_eq!(outcome.kept, 1);

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let properties = &written["features"][0]["properties"];
        assert_eq!(properties, &serde_json::json!({ "tags": { "k": "v" }, "n": 2 }));
        assert!(properties["tags"].is_object());
        assert!(properties["n"].is_i64());
    }
}
