use super::feature::{Feature, FieldDefn, GeometryType};
use super::srs::SpatialRef;
use crate::error::{EngineError, Result};

/// Attribute predicate installed on a layer's read cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeFilter {
    /// Yields features whose field differs from `value`, including nulls.
    NotEquals { field: usize, value: String },
}

impl AttributeFilter {
    fn accepts(&self, feature: &Feature) -> bool {
        match self {
            AttributeFilter::NotEquals { field, value } => {
                feature.field_as_string(*field) != Some(value.as_str())
            }
        }
    }
}

/// An ordered collection of features sharing one schema and spatial reference.
///
/// Features are addressed by a positional FID. Deleting a feature leaves a
/// hole so the FIDs of the remaining features never shift while a cursor
/// walks the layer.
#[derive(Debug)]
pub struct Layer {
    name: String,
    geometry_type: GeometryType,
    spatial_ref: Option<SpatialRef>,
    fields: Vec<FieldDefn>,
    features: Vec<Option<Feature>>,
    cursor: usize,
    filter: Option<AttributeFilter>,
    dirty: bool,
}

impl Layer {
    pub(crate) fn new(
        name: impl Into<String>,
        geometry_type: GeometryType,
        spatial_ref: Option<SpatialRef>,
    ) -> Self {
        Self {
            name: name.into(),
            geometry_type,
            spatial_ref,
            fields: Vec::new(),
            features: Vec::new(),
            cursor: 0,
            filter: None,
            dirty: false,
        }
    }

    /// Builds a layer from already-parsed parts without marking it modified.
    pub(crate) fn from_parts(
        name: String,
        geometry_type: GeometryType,
        spatial_ref: Option<SpatialRef>,
        fields: Vec<FieldDefn>,
        features: Vec<Feature>,
    ) -> Self {
        let mut layer = Self::new(name, geometry_type, spatial_ref);
        layer.fields = fields;
        layer.features = features.into_iter().map(Some).collect();
        layer
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn spatial_ref(&self) -> Option<SpatialRef> {
        self.spatial_ref
    }

    pub fn set_spatial_ref(&mut self, spatial_ref: Option<SpatialRef>) {
        self.spatial_ref = spatial_ref;
        self.dirty = true;
    }

    pub fn fields(&self) -> &[FieldDefn] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    pub fn feature_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_some()).count()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Live features in FID order, ignoring the cursor and attribute filter.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter().flatten()
    }

    /// Appends a field to the schema. Existing features get a null value.
    pub fn create_field(&mut self, defn: FieldDefn) -> Result<()> {
        if self.field_index(defn.name()).is_some() {
            return Err(EngineError::DuplicateField {
                layer: self.name.clone(),
                field: defn.name().to_owned(),
            }
            .into());
        }
        self.fields.push(defn);
        for feature in self.features.iter_mut().flatten() {
            feature.push_null_field();
        }
        self.dirty = true;
        Ok(())
    }

    pub fn set_attribute_filter(&mut self, filter: Option<AttributeFilter>) {
        self.filter = filter;
        self.cursor = 0;
    }

    /// Rewinds the read cursor to the first feature.
    pub fn reset_reading(&mut self) {
        self.cursor = 0;
    }

    /// Returns a copy of the next live feature accepted by the attribute filter.
    pub fn next_feature(&mut self) -> Option<Feature> {
        while self.cursor < self.features.len() {
            let slot = &self.features[self.cursor];
            self.cursor += 1;
            if let Some(feature) = slot {
                if self.filter.as_ref().map_or(true, |f| f.accepts(feature)) {
                    return Some(feature.clone());
                }
            }
        }
        None
    }

    /// Replaces the stored feature that has the same FID.
    pub fn set_feature(&mut self, feature: Feature) -> Result<()> {
        self.check_schema(&feature)?;
        let fid = feature.fid();
        match self.slot_mut(fid) {
            Some(slot) => {
                *slot = Some(feature);
                self.dirty = true;
                Ok(())
            }
            None => Err(self.no_such_feature(fid)),
        }
    }

    pub fn delete_feature(&mut self, fid: u64) -> Result<()> {
        match self.slot_mut(fid) {
            Some(slot) => {
                *slot = None;
                self.dirty = true;
                Ok(())
            }
            None => Err(self.no_such_feature(fid)),
        }
    }

    /// Appends a feature, assigning it the next FID.
    pub fn create_feature(&mut self, mut feature: Feature) -> Result<u64> {
        self.check_schema(&feature)?;
        let fid = self.features.len() as u64;
        feature.set_fid(fid);
        self.features.push(Some(feature));
        self.dirty = true;
        Ok(fid)
    }

    fn slot_mut(&mut self, fid: u64) -> Option<&mut Option<Feature>> {
        usize::try_from(fid)
            .ok()
            .and_then(|idx| self.features.get_mut(idx))
            .filter(|slot| slot.is_some())
    }

    fn no_such_feature(&self, fid: u64) -> crate::error::Error {
        EngineError::NoSuchFeature {
            layer: self.name.clone(),
            fid,
        }
        .into()
    }

    fn check_schema(&self, feature: &Feature) -> Result<()> {
        if feature.field_count() != self.fields.len() {
            return Err(EngineError::SchemaMismatch {
                layer: self.name.clone(),
                expected: self.fields.len(),
                found: feature.field_count(),
            }
            .into());
        }
        Ok(())
    }
}
