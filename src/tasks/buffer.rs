use std::f64::consts::FRAC_PI_2;
use std::path::Path;

use geo::algorithm::buffer::{BufferStyle, LineCap, LineJoin};
use geo::{BooleanOps, Buffer, Geometry, MultiPolygon};
use tracing::{debug, info};

use super::{Progress, TaskOutcome, TaskOutput};
use crate::decompose::{decompose, SplitLimits};
use crate::engine::{Access, GeometryType};
use crate::error::{DataError, Result};
use crate::pipeline::{rebuild_feature, Pipeline};

/// Round joins and caps approximating each quarter circle with
/// `quadrant_segments` segments.
fn round_style(distance: f64, quadrant_segments: u32) -> BufferStyle<f64> {
    let step = FRAC_PI_2 / f64::from(quadrant_segments.max(1));
    BufferStyle::new(distance)
        .line_join(LineJoin::Round(step))
        .line_cap(LineCap::Round(step))
}

/// Buffers `geometry` piece by piece and unions the buffered pieces.
pub fn buffer_geometry(
    geometry: Geometry<f64>,
    distance: f64,
    quadrant_segments: u32,
    limits: &SplitLimits,
) -> Result<MultiPolygon<f64>> {
    let pieces = decompose(geometry, limits)?;
    if pieces.len() > 1 {
        debug!("Buffering {} pieces", pieces.len());
    }

    let mut buffered = pieces
        .iter()
        .map(|piece| piece.buffer_with_style(round_style(distance, quadrant_segments)));
    let first = buffered.next().unwrap_or_else(|| MultiPolygon::new(Vec::new()));
    Ok(buffered.fold(first, |merged, next| merged.union(&next)))
}

/// Writes a buffered copy of every feature to a fresh multipolygon layer
/// at `output`.
pub fn run(
    source: &Path,
    output: &Path,
    distance: f64,
    quadrant_segments: u32,
    limits: &SplitLimits,
) -> Result<TaskOutcome> {
    info!("Buffer distance {distance}, {quadrant_segments} segments per quadrant");

    let mut pipeline = Pipeline::open(source, Access::ReadOnly)?;
    let spatial_ref = pipeline.source()?.spatial_ref();
    pipeline.create_output(output, GeometryType::MultiPolygon, spatial_ref)?;

    let (layer, sink) = pipeline.layers_mut()?;
    let field_count = sink.fields().len();
    let mut progress = Progress::new("Buffered", layer.feature_count());

    while let Some(mut feature) = layer.next_feature() {
        let fid = feature.fid();
        let geometry = feature
            .steal_geometry()
            .ok_or(DataError::MissingGeometry { fid })?;
        let buffered = buffer_geometry(geometry, distance, quadrant_segments, limits)?;

        let mut rebuilt = rebuild_feature(&feature, field_count);
        rebuilt.set_geometry(Geometry::MultiPolygon(buffered));
        sink.create_feature(rebuilt)?;
        progress.tick();
    }

    let outcome = TaskOutcome {
        read: progress.done(),
        kept: sink.feature_count(),
        output: TaskOutput::Dataset(output.to_path_buf()),
    };
    pipeline.commit()?;
    info!("Buffered {} features", outcome.kept);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Coord, Polygon, Rect};
    use std::fs;

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        Rect::new(Coord { x, y }, Coord { x: x + size, y: y + size }).to_polygon()
    }

    #[test]
    fn square_grows_by_a_uniform_margin() {
        let input = square(0.0, 0.0, 100.0);
        let buffered =
            buffer_geometry(Geometry::Polygon(input.clone()), 10.0, 8, &SplitLimits::default())
                .unwrap();

        // 100^2 + 4 * 100 * 10 + a 32-gon of radius 10
        let expected = 10_000.0 + 4_000.0 + 16.0 * 100.0 * (std::f64::consts::PI / 16.0).sin();
        assert_eq!(buffered.0.len(), 1);
        assert!((buffered.unsigned_area() - expected).abs() < 5.0);
        assert!(buffered.contains(&input));
    }

    #[test]
    fn decomposed_buffer_matches_the_whole_buffer() {
        let mut squares = Vec::new();
        for row in 0..10 {
            for col in 0..10 {
                squares.push(square(col as f64 * 10.0, row as f64 * 10.0, 5.0));
            }
        }
        let grid = MultiPolygon::new(squares);

        let whole = grid.buffer_with_style(round_style(1.0, 8));
        let pieces =
            buffer_geometry(Geometry::MultiPolygon(grid.clone()), 1.0, 8, &SplitLimits::default())
                .unwrap();

        assert_eq!(pieces.0.len(), 100);
        assert!((pieces.unsigned_area() - whole.unsigned_area()).abs() < 1e-3);
        assert!(pieces.contains(&grid));
    }

    #[test]
    fn features_without_geometry_are_data_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.json");
        fs::write(
            &source,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"k":1},"geometry":null}]}"#,
        )
        .unwrap();

        let err = run(
            &source,
            &dir.path().join("out.json"),
            1.0,
            8,
            &SplitLimits::default(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 65);
        assert!(!dir.path().join("out.json").exists());
    }
}
