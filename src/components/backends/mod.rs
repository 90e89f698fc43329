//! Driver capability consumed by the layers.
//!
//! A backend opens a store and hands out [NativeRaster] and [NativeLayer]
//! implementations. Layers never talk to a concrete driver directly.

pub mod gdal_backend;
pub mod memory;

use geo::Rect;
use std::{fmt::Debug, path::Path};

use crate::{
    components::{
        transforms::GeoTransformArray,
        vector::record::{FeatureId, FeatureRecord},
    },
    errors::Result,
};

/// Storage class of raster samples, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Byte,
    Integer,
    Float,
    Unknown,
}

pub trait NativeDataset: Debug {
    fn raster_layer_names(&self) -> Vec<String>;
    fn feature_layer_names(&self) -> Vec<String>;
    fn raster(&self, name: &str) -> Result<Box<dyn NativeRaster>>;
    fn layer(&self, name: &str) -> Result<Box<dyn NativeLayer>>;
}

pub trait NativeRaster: Debug {
    /// (columns, rows)
    fn size(&self) -> (usize, usize);
    fn band_count(&self) -> usize;
    fn sample_type(&self) -> SampleType;
    fn geo_transform(&self) -> Result<GeoTransformArray>;
    fn no_data_value(&self) -> Option<f64>;
    /// Row-major samples of the `window_size` block at `offset` of the
    /// zero-based `band`, decimated to `buffer_size`.
    fn read_window(
        &self,
        band: usize,
        offset: (usize, usize),
        window_size: (usize, usize),
        buffer_size: (usize, usize),
    ) -> Result<Vec<f64>>;
    fn write_window(
        &mut self,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
        data: &[f64],
    ) -> Result<()>;
}

/// Staged modifications handed to a driver on save.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet {
    pub created: Vec<FeatureRecord>,
    pub updated: Vec<FeatureRecord>,
    pub deleted: Vec<FeatureId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

pub trait NativeLayer: Debug {
    fn records(&self) -> Result<Vec<FeatureRecord>>;
    fn record(&self, id: FeatureId) -> Result<Option<FeatureRecord>>;
    /// Records whose geometry envelope intersects `rect`.
    fn records_in_rect(&self, rect: Rect) -> Result<Vec<FeatureRecord>>;
    /// One past the largest stored id, 0 for an empty layer.
    fn allocate_id(&self) -> Result<FeatureId>;
    fn apply(&mut self, changes: &ChangeSet) -> Result<()>;
    fn write_copy(&self, path: &Path, records: &[FeatureRecord]) -> Result<()>;
}
