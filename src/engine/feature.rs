use std::fmt;

use geo::Geometry;
use geojson::feature::Id;
use serde_json::Value as JsonValue;

/// Geometry type of a layer, as declared when the layer is created or
/// inferred from the features of an opened document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Line(_) | Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryType::Polygon
            }
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    fn promoted(self) -> Self {
        match self {
            GeometryType::Point => GeometryType::MultiPoint,
            GeometryType::LineString => GeometryType::MultiLineString,
            GeometryType::Polygon => GeometryType::MultiPolygon,
            other => other,
        }
    }

    /// The type of a layer holding geometries of both `self` and `other`.
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else if self.promoted() == other.promoted() {
            self.promoted()
        } else {
            GeometryType::Unknown
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Real,
    Boolean,
    String,
}

impl FieldType {
    pub fn of(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(_) => Some(FieldType::Boolean),
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Some(FieldType::Integer),
            JsonValue::Number(_) => Some(FieldType::Real),
            _ => Some(FieldType::String),
        }
    }

    /// Narrowest type that can hold values of both `self` and `other`.
    pub fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldType::Integer, FieldType::Real) | (FieldType::Real, FieldType::Integer) => {
                FieldType::Real
            }
            _ => FieldType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefn {
    name: String,
    field_type: FieldType,
}

impl FieldDefn {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub(crate) fn widen_to(&mut self, other: FieldType) {
        self.field_type = self.field_type.widen(other);
    }
}

/// An attribute value.
///
/// Values read from a document keep the JSON value they came from, so they
/// are written back exactly as read. The text rendering is what filters
/// compare and reports print.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    text: String,
    json: Option<JsonValue>,
}

impl FieldValue {
    /// A value known only by its text; written with its field's type.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            json: None,
        }
    }

    /// A value read from a document. JSON null is no value at all.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        let text = match &value {
            JsonValue::Null => return None,
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(Self {
            text,
            json: Some(value),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The JSON value this was read from, if any.
    pub fn json(&self) -> Option<&JsonValue> {
        self.json.as_ref()
    }
}

/// One record of a layer. Attribute values are aligned by index with the
/// owning layer's field definitions.
#[derive(Debug, Clone)]
pub struct Feature {
    fid: u64,
    id: Option<Id>,
    fields: Vec<Option<FieldValue>>,
    geometry: Option<Geometry<f64>>,
}

impl Feature {
    /// A blank feature for a schema of `field_count` fields.
    pub fn new(field_count: usize) -> Self {
        Self {
            fid: 0,
            id: None,
            fields: vec![None; field_count],
            geometry: None,
        }
    }

    pub(crate) fn from_parts(
        fid: u64,
        id: Option<Id>,
        fields: Vec<Option<FieldValue>>,
        geometry: Option<Geometry<f64>>,
    ) -> Self {
        Self {
            fid,
            id,
            fields,
            geometry,
        }
    }

    pub fn fid(&self) -> u64 {
        self.fid
    }

    pub(crate) fn set_fid(&mut self, fid: u64) {
        self.fid = fid;
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn set_id(&mut self, id: Option<Id>) {
        self.id = id;
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Value of field `index` rendered as text; `None` when null or out of range.
    pub fn field_as_string(&self, index: usize) -> Option<&str> {
        self.field(index).map(FieldValue::as_str)
    }

    pub fn field(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    pub fn set_field(&mut self, index: usize, value: Option<&str>) {
        self.set_field_value(index, value.map(FieldValue::from_text));
    }

    /// Out-of-range indices are ignored.
    pub fn set_field_value(&mut self, index: usize, value: Option<FieldValue>) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = value;
        }
    }

    pub(crate) fn push_null_field(&mut self) {
        self.fields.push(None);
    }

    pub(crate) fn fields(&self) -> &[Option<FieldValue>] {
        &self.fields
    }

    pub fn geometry(&self) -> Option<&Geometry<f64>> {
        self.geometry.as_ref()
    }

    pub fn set_geometry(&mut self, geometry: Geometry<f64>) {
        self.geometry = Some(geometry);
    }

    /// Takes ownership of the geometry, leaving the feature without one.
    pub fn steal_geometry(&mut self) -> Option<Geometry<f64>> {
        self.geometry.take()
    }
}
