//! Dataset and geometry engine.
//!
//! Vector data is held as GeoJSON documents behind a dataset / layer /
//! feature model. Geometry work is done with `geo`, coordinate transforms
//! with `proj`.

pub mod dataset;
pub mod feature;
pub mod layer;
pub mod srs;

pub use dataset::{Access, VectorDataset};
pub use feature::{Feature, FieldDefn, FieldType, FieldValue, GeometryType};
pub use layer::{AttributeFilter, Layer};
pub use srs::{CoordTransform, SpatialRef};
