use std::fmt;

use geo::{Coord, Geometry, MapCoords};
use proj::Proj;

use crate::error::{DataError, EngineError, Result};

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialRef {
    epsg: u32,
}

impl SpatialRef {
    pub const WGS84: SpatialRef = SpatialRef { epsg: 4326 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Parses the `name` of a GeoJSON `crs` member.
    ///
    /// Accepts `urn:ogc:def:crs:EPSG::3857`, `EPSG:3857` and the CRS84
    /// aliases for lon/lat WGS 84.
    pub fn from_crs_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Self::WGS84);
        }
        if !upper.contains("EPSG") {
            return None;
        }
        upper
            .rsplit(':')
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .filter(|code| *code > 0)
            .map(Self::from_epsg)
    }

    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg)
    }
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Point-wise transform between two spatial references.
pub struct CoordTransform {
    proj: Proj,
    source: SpatialRef,
    target: SpatialRef,
}

impl CoordTransform {
    pub fn new(source: SpatialRef, target: SpatialRef) -> Result<Self> {
        let proj = Proj::new_known_crs(&source.to_string(), &target.to_string(), None)
            .map_err(|e| DataError::UnresolvableEpsg {
                source_crs: source.to_string(),
                target: target.epsg(),
                message: e.to_string(),
            })?;
        Ok(Self {
            proj,
            source,
            target,
        })
    }

    pub fn source(&self) -> SpatialRef {
        self.source
    }

    pub fn target(&self) -> SpatialRef {
        self.target
    }

    /// Transforms every coordinate of `geometry`, replacing it on success.
    pub fn transform(&self, geometry: &mut Geometry<f64>, fid: u64) -> Result<()> {
        let proj = &self.proj;
        let transformed = geometry
            .try_map_coords(|coord: Coord<f64>| {
                proj.convert((coord.x, coord.y))
                    .map(|(x, y)| Coord { x, y })
            })
            .map_err(|e| EngineError::Operation {
                operation: "transform",
                fid: Some(fid),
                message: e.to_string(),
            })?;
        *geometry = transformed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Point};

    #[test]
    fn parses_common_crs_names() {
        assert_eq!(
            SpatialRef::from_crs_name("urn:ogc:def:crs:EPSG::3857"),
            Some(SpatialRef::from_epsg(3857))
        );
        assert_eq!(
            SpatialRef::from_crs_name("EPSG:32633"),
            Some(SpatialRef::from_epsg(32633))
        );
        assert_eq!(
            SpatialRef::from_crs_name("urn:ogc:def:crs:OGC:1.3:CRS84"),
            Some(SpatialRef::WGS84)
        );
        assert_eq!(SpatialRef::from_crs_name("LOCAL_CS[\"x\"]"), None);
    }

    #[test]
    fn reprojecting_there_and_back_is_lossless() {
        let forward =
            CoordTransform::new(SpatialRef::WGS84, SpatialRef::from_epsg(3857)).unwrap();
        let back = CoordTransform::new(SpatialRef::from_epsg(3857), SpatialRef::WGS84).unwrap();

        let original: Point<f64> = point!(x: 10.0, y: 20.0);
        let mut geometry = Geometry::Point(original);
        forward.transform(&mut geometry, 0).unwrap();

        let Geometry::Point(projected) = &geometry else {
            panic!("transform changed the geometry type");
        };
        assert!((projected.x() - 1_113_194.9).abs() < 1.0);

        back.transform(&mut geometry, 0).unwrap();
        let Geometry::Point(round_trip) = &geometry else {
            panic!("transform changed the geometry type");
        };
        assert!((round_trip.x() - original.x()).abs() < 1e-9);
        assert!((round_trip.y() - original.y()).abs() < 1e-9);
    }

    #[test]
    fn unknown_epsg_code_is_a_data_error() {
        let err = CoordTransform::new(SpatialRef::WGS84, SpatialRef::from_epsg(999_999))
            .err()
            .unwrap();
        assert_eq!(err.exit_code(), 65);
    }
}
