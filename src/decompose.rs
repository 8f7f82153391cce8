//! Quadrant decomposition of complex geometries.
//!
//! Buffering a geometry with many parts is slow and fragile, so before a
//! buffer the geometry is cut into the four quadrants of its envelope,
//! again and again, until every piece has fewer parts than the threshold.

use geo::{
    BooleanOps, BoundingRect, Coord, Geometry, GeometryCollection, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Polygon, Rect,
};
use tracing::debug;

use crate::error::{DataError, Result};

pub const SPLIT_THRESHOLD: usize = 50;
pub const MAX_SPLIT_DEPTH: usize = 24;
pub const MAX_SPLIT_PIECES: usize = 4096;

/// Bounds on the decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitLimits {
    /// Geometries with fewer immediate parts than this are left whole.
    pub threshold: usize,
    pub max_depth: usize,
    pub max_pieces: usize,
}

impl Default for SplitLimits {
    fn default() -> Self {
        Self {
            threshold: SPLIT_THRESHOLD,
            max_depth: MAX_SPLIT_DEPTH,
            max_pieces: MAX_SPLIT_PIECES,
        }
    }
}

/// Number of immediate sub-geometries: rings of a polygon, members of a
/// multi-geometry or collection, zero for atomic geometries.
pub fn part_count(geometry: &Geometry<f64>) -> usize {
    match geometry {
        Geometry::Point(_) | Geometry::Line(_) | Geometry::LineString(_) => 0,
        Geometry::Polygon(p) => {
            if p.exterior().0.is_empty() {
                0
            } else {
                1 + p.interiors().len()
            }
        }
        Geometry::Rect(_) | Geometry::Triangle(_) => 1,
        Geometry::MultiPoint(mp) => mp.0.len(),
        Geometry::MultiLineString(mls) => mls.0.len(),
        Geometry::MultiPolygon(mp) => mp.0.len(),
        Geometry::GeometryCollection(gc) => gc.0.len(),
    }
}

/// The four quadrants of `envelope` in split order: top-left, top-right,
/// bottom-right, bottom-left. Adjacent quadrants share their edges.
pub fn quadrants(envelope: &Rect<f64>) -> [Rect<f64>; 4] {
    let (min, max) = (envelope.min(), envelope.max());
    let mid = Coord {
        x: max.x - (max.x - min.x) / 2.0,
        y: max.y - (max.y - min.y) / 2.0,
    };
    [
        Rect::new(Coord { x: min.x, y: mid.y }, Coord { x: mid.x, y: max.y }),
        Rect::new(mid, max),
        Rect::new(Coord { x: mid.x, y: min.y }, Coord { x: max.x, y: mid.y }),
        Rect::new(min, mid),
    ]
}

/// Splits `geometry` into pieces that each have fewer than
/// `limits.threshold` parts.
///
/// Pieces come out in depth-first order, quadrants visited top-left,
/// top-right, bottom-right, bottom-left. Pieces that end up empty are
/// dropped. Exceeding the depth or piece ceiling is an error.
pub fn decompose(geometry: Geometry<f64>, limits: &SplitLimits) -> Result<Vec<Geometry<f64>>> {
    let mut pieces = Vec::new();
    let mut stack = vec![(geometry, 0usize)];

    while let Some((geometry, depth)) = stack.pop() {
        let parts = part_count(&geometry);
        if parts < limits.threshold {
            if is_empty(&geometry) {
                continue;
            }
            if pieces.len() == limits.max_pieces {
                return Err(DataError::DecompositionLimit {
                    limit: "piece count",
                    max: limits.max_pieces,
                    children: parts,
                }
                .into());
            }
            pieces.push(geometry);
            continue;
        }

        if depth == limits.max_depth {
            return Err(DataError::DecompositionLimit {
                limit: "split depth",
                max: limits.max_depth,
                children: parts,
            }
            .into());
        }

        let envelope = geometry
            .bounding_rect()
            .ok_or(DataError::EmptyEnvelope { children: parts })?;
        debug!("Splitting geometry with {parts} parts at depth {depth}");

        // Reversed so the top-left quadrant is popped first.
        for quadrant in quadrants(&envelope).iter().rev() {
            stack.push((intersect(&geometry, quadrant), depth + 1));
        }
    }

    Ok(pieces)
}

/// Intersection of `geometry` with the closed rectangle `quadrant`.
fn intersect(geometry: &Geometry<f64>, quadrant: &Rect<f64>) -> Geometry<f64> {
    let clip = MultiPolygon::new(vec![quadrant.to_polygon()]);
    match geometry {
        Geometry::Point(p) => {
            if covers(quadrant, p.0) {
                Geometry::Point(*p)
            } else {
                Geometry::MultiPoint(MultiPoint::new(vec![]))
            }
        }
        Geometry::MultiPoint(mp) => Geometry::MultiPoint(MultiPoint::new(
            mp.iter().filter(|p| covers(quadrant, p.0)).copied().collect(),
        )),
        Geometry::Line(line) => clip_lines(&clip, vec![LineString::from(*line)]),
        Geometry::LineString(ls) => clip_lines(&clip, vec![ls.clone()]),
        Geometry::MultiLineString(mls) => clip_lines(&clip, mls.0.clone()),
        Geometry::Polygon(p) => clip_polygons(&clip, vec![p.clone()]),
        Geometry::Rect(r) => clip_polygons(&clip, vec![r.to_polygon()]),
        Geometry::Triangle(t) => clip_polygons(&clip, vec![t.to_polygon()]),
        Geometry::MultiPolygon(mp) => clip_polygons(&clip, mp.0.clone()),
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(GeometryCollection(
            gc.iter()
                .map(|member| intersect(member, quadrant))
                .filter(|member| !is_empty(member))
                .collect(),
        )),
    }
}

/// Closed-rectangle test, so points on a seam land in both quadrants.
fn covers(rect: &Rect<f64>, coord: Coord<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    coord.x >= min.x && coord.x <= max.x && coord.y >= min.y && coord.y <= max.y
}

fn clip_lines(clip: &MultiPolygon<f64>, lines: Vec<LineString<f64>>) -> Geometry<f64> {
    Geometry::MultiLineString(clip.clip(&MultiLineString::new(lines), false))
}

fn clip_polygons(clip: &MultiPolygon<f64>, polygons: Vec<Polygon<f64>>) -> Geometry<f64> {
    Geometry::MultiPolygon(clip.intersection(&MultiPolygon::new(polygons)))
}

fn is_empty(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Point(_) | Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => false,
        Geometry::LineString(ls) => ls.0.is_empty(),
        Geometry::Polygon(p) => p.exterior().0.is_empty(),
        Geometry::MultiPoint(mp) => mp.0.is_empty(),
        Geometry::MultiLineString(mls) => mls.0.iter().all(|ls| ls.0.is_empty()),
        Geometry::MultiPolygon(mp) => mp.0.iter().all(|p| p.exterior().0.is_empty()),
        Geometry::GeometryCollection(gc) => gc.0.iter().all(is_empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Area};

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        Rect::new(Coord { x, y }, Coord { x: x + size, y: y + size }).to_polygon()
    }

    /// 10 x 10 grid of 5-unit squares spaced 10 apart; no square touches a midline.
    fn grid() -> MultiPolygon<f64> {
        let mut squares = Vec::new();
        for row in 0..10 {
            for col in 0..10 {
                squares.push(square(col as f64 * 10.0, row as f64 * 10.0, 5.0));
            }
        }
        MultiPolygon::new(squares)
    }

    #[test]
    fn simple_geometries_are_left_whole() {
        let polygon = Geometry::Polygon(square(0.0, 0.0, 10.0));
        let pieces = decompose(polygon.clone(), &SplitLimits::default()).unwrap();
        assert_eq!(pieces, vec![polygon]);
    }

    #[test]
    fn complex_geometries_split_into_quadrants() {
        let grid = grid();
        let pieces =
            decompose(Geometry::MultiPolygon(grid.clone()), &SplitLimits::default()).unwrap();

        assert_eq!(pieces.len(), 4);
        for piece in &pieces {
            assert_eq!(part_count(piece), 25);
        }

        let total: f64 = pieces.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - grid.unsigned_area()).abs() < 1e-6);

        // top-left first, bottom-left last
        let first = pieces[0].bounding_rect().unwrap();
        let last = pieces[3].bounding_rect().unwrap();
        assert!(first.min().x < 1.0 && first.min().y > 45.0);
        assert!(last.min().x < 1.0 && last.max().y < 50.0);
    }

    #[test]
    fn pieces_straddling_seams_keep_the_whole_area() {
        // A large square with 60 holes placed on both sides of the midlines.
        let mut holes = Vec::new();
        for i in 0..60 {
            let x = 2.0 + (i % 10) as f64 * 9.5;
            let y = 2.0 + (i / 10) as f64 * 15.0;
            holes.push(square(x, y, 3.0).exterior().clone());
        }
        let outer = square(0.0, 0.0, 100.0).exterior().clone();
        let polygon = Polygon::new(outer, holes);

        let pieces =
            decompose(Geometry::Polygon(polygon.clone()), &SplitLimits::default()).unwrap();
        assert!(pieces.len() >= 4);
        assert!(pieces.iter().all(|p| part_count(p) < SPLIT_THRESHOLD));

        let total: f64 = pieces.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - polygon.unsigned_area()).abs() < 1e-6);
    }

    #[test]
    fn coincident_parts_hit_the_depth_ceiling() {
        let points = MultiPoint::new(vec![point!(x: 1.0, y: 1.0); 60]);
        let limits = SplitLimits {
            max_depth: 8,
            ..SplitLimits::default()
        };

        let err = decompose(Geometry::MultiPoint(points), &limits).unwrap_err();
        assert!(err.to_string().contains("split depth of 8"));
    }

    #[test]
    fn piece_ceiling_is_enforced() {
        let limits = SplitLimits {
            max_pieces: 3,
            ..SplitLimits::default()
        };
        let err = decompose(Geometry::MultiPolygon(grid()), &limits).unwrap_err();
        assert!(err.to_string().contains("piece count of 3"));
    }

    #[test]
    fn quadrants_meet_at_the_envelope_midpoint() {
        let envelope = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 2.0 });
        let [top_left, top_right, bottom_right, bottom_left] = quadrants(&envelope);

        assert_eq!(top_left.max(), Coord { x: 2.0, y: 2.0 });
        assert_eq!(top_right.min(), Coord { x: 2.0, y: 1.0 });
        assert_eq!(bottom_right.max(), Coord { x: 4.0, y: 1.0 });
        assert_eq!(bottom_left.min(), Coord { x: 0.0, y: 0.0 });
    }
}
