//! In-process backend. Holds rasters and feature layers in memory.
//!
//! Raster clones always land here, and hosts can build datasets from
//! synthesized data without touching the filesystem.

use geo::{BoundingRect, Intersects, Rect};
use log::debug;
use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    components::{
        backends::{ChangeSet, NativeDataset, NativeLayer, NativeRaster, SampleType},
        transforms::GeoTransformArray,
        vector::record::{FeatureId, FeatureRecord},
    },
    errors::{GeodataError, Result},
};

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    size: (usize, usize),
    sample_type: SampleType,
    transform: GeoTransformArray,
    no_data: Option<f64>,
    /// Row-major samples per band.
    bands: Vec<Vec<f64>>,
}

impl MemoryRaster {
    pub fn new(
        size: (usize, usize),
        transform: GeoTransformArray,
        sample_type: SampleType,
        bands: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if let Some(band) = bands.iter().find(|band| band.len() != size.0 * size.1) {
            return Err(GeodataError::InvalidWindow(format!(
                "band holds {} samples, expected {}x{}",
                band.len(),
                size.0,
                size.1
            )));
        }
        Ok(Self {
            size,
            sample_type,
            transform,
            no_data: None,
            bands,
        })
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    /// Full copy of every band of `source`.
    pub fn snapshot(source: &dyn NativeRaster) -> Result<Self> {
        let size = source.size();
        let bands = (0..source.band_count())
            .map(|band| source.read_window(band, (0, 0), size, size))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(size, source.geo_transform()?, source.sample_type(), bands)?
            .with_no_data(source.no_data_value()))
    }

    fn check_window(
        &self,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> Result<()> {
        if band >= self.bands.len()
            || offset.0 + size.0 > self.size.0
            || offset.1 + size.1 > self.size.1
        {
            return Err(GeodataError::InvalidWindow(format!(
                "band {band} window {offset:?}+{size:?} outside raster {:?}",
                self.size
            )));
        }
        Ok(())
    }
}

impl NativeRaster for MemoryRaster {
    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn geo_transform(&self) -> Result<GeoTransformArray> {
        Ok(self.transform)
    }

    fn no_data_value(&self) -> Option<f64> {
        self.no_data
    }

    fn read_window(
        &self,
        band: usize,
        offset: (usize, usize),
        window_size: (usize, usize),
        buffer_size: (usize, usize),
    ) -> Result<Vec<f64>> {
        self.check_window(band, offset, window_size)?;
        let data = &self.bands[band];
        let (buffer_width, buffer_height) = buffer_size;
        let step_x = window_size.0 as f64 / buffer_width as f64;
        let step_y = window_size.1 as f64 / buffer_height as f64;
        let mut buffer = Vec::with_capacity(buffer_width * buffer_height);
        for row in 0..buffer_height {
            let src_row =
                offset.1 + (((row as f64 + 0.5) * step_y) as usize).min(window_size.1 - 1);
            for col in 0..buffer_width {
                let src_col =
                    offset.0 + (((col as f64 + 0.5) * step_x) as usize).min(window_size.0 - 1);
                buffer.push(data[src_row * self.size.0 + src_col]);
            }
        }
        Ok(buffer)
    }

    fn write_window(
        &mut self,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
        data: &[f64],
    ) -> Result<()> {
        self.check_window(band, offset, size)?;
        let width = self.size.0;
        for (row, chunk) in data.chunks_exact(size.0).take(size.1).enumerate() {
            let start = (offset.1 + row) * width + offset.0;
            self.bands[band][start..start + size.0].copy_from_slice(chunk);
        }
        Ok(())
    }
}

/// Raster owned by a [MemoryDataset]. Writes are visible to every handle.
#[derive(Debug, Clone)]
struct SharedMemoryRaster(Rc<RefCell<MemoryRaster>>);

impl NativeRaster for SharedMemoryRaster {
    fn size(&self) -> (usize, usize) {
        self.0.borrow().size()
    }

    fn band_count(&self) -> usize {
        self.0.borrow().band_count()
    }

    fn sample_type(&self) -> SampleType {
        self.0.borrow().sample_type()
    }

    fn geo_transform(&self) -> Result<GeoTransformArray> {
        self.0.borrow().geo_transform()
    }

    fn no_data_value(&self) -> Option<f64> {
        self.0.borrow().no_data_value()
    }

    fn read_window(
        &self,
        band: usize,
        offset: (usize, usize),
        window_size: (usize, usize),
        buffer_size: (usize, usize),
    ) -> Result<Vec<f64>> {
        self.0
            .borrow()
            .read_window(band, offset, window_size, buffer_size)
    }

    fn write_window(
        &mut self,
        band: usize,
        offset: (usize, usize),
        size: (usize, usize),
        data: &[f64],
    ) -> Result<()> {
        self.0.borrow_mut().write_window(band, offset, size, data)
    }
}

type RecordStore = Rc<RefCell<BTreeMap<FeatureId, FeatureRecord>>>;
type Exports = Rc<RefCell<BTreeMap<PathBuf, Vec<FeatureRecord>>>>;

/// Cloning shares the underlying stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    rasters: BTreeMap<String, Rc<RefCell<MemoryRaster>>>,
    layers: BTreeMap<String, RecordStore>,
    exports: Exports,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raster(mut self, name: &str, raster: MemoryRaster) -> Self {
        self.rasters
            .insert(name.to_string(), Rc::new(RefCell::new(raster)));
        self
    }

    pub fn with_layer(
        mut self,
        name: &str,
        records: impl IntoIterator<Item = FeatureRecord>,
    ) -> Self {
        let store = records.into_iter().map(|record| (record.id, record)).collect();
        self.layers
            .insert(name.to_string(), Rc::new(RefCell::new(store)));
        self
    }

    /// Records currently stored in layer `name`.
    pub fn stored_records(&self, name: &str) -> Option<Vec<FeatureRecord>> {
        self.layers
            .get(name)
            .map(|store| store.borrow().values().cloned().collect())
    }

    /// Records written by `save_new` to `path`.
    pub fn exported_records<P: AsRef<Path>>(&self, path: P) -> Option<Vec<FeatureRecord>> {
        self.exports.borrow().get(path.as_ref()).cloned()
    }

    /// Current content of raster `name`.
    pub fn raster_snapshot(&self, name: &str) -> Option<MemoryRaster> {
        self.rasters.get(name).map(|raster| raster.borrow().clone())
    }
}

impl NativeDataset for MemoryDataset {
    fn raster_layer_names(&self) -> Vec<String> {
        self.rasters.keys().cloned().collect()
    }

    fn feature_layer_names(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }

    fn raster(&self, name: &str) -> Result<Box<dyn NativeRaster>> {
        self.rasters
            .get(name)
            .map(|raster| Box::new(SharedMemoryRaster(Rc::clone(raster))) as Box<dyn NativeRaster>)
            .ok_or_else(|| GeodataError::LayerNotFound(name.to_string()))
    }

    fn layer(&self, name: &str) -> Result<Box<dyn NativeLayer>> {
        self.layers
            .get(name)
            .map(|store| {
                Box::new(MemoryLayer {
                    store: Rc::clone(store),
                    exports: Rc::clone(&self.exports),
                }) as Box<dyn NativeLayer>
            })
            .ok_or_else(|| GeodataError::LayerNotFound(name.to_string()))
    }
}

#[derive(Debug)]
struct MemoryLayer {
    store: RecordStore,
    exports: Exports,
}

impl NativeLayer for MemoryLayer {
    fn records(&self) -> Result<Vec<FeatureRecord>> {
        Ok(self.store.borrow().values().cloned().collect())
    }

    fn record(&self, id: FeatureId) -> Result<Option<FeatureRecord>> {
        Ok(self.store.borrow().get(&id).cloned())
    }

    fn records_in_rect(&self, rect: Rect) -> Result<Vec<FeatureRecord>> {
        Ok(self
            .store
            .borrow()
            .values()
            .filter(|record| {
                record
                    .geometry
                    .as_ref()
                    .and_then(|geometry| geometry.bounding_rect())
                    .is_some_and(|envelope| envelope.intersects(&rect))
            })
            .cloned()
            .collect())
    }

    fn allocate_id(&self) -> Result<FeatureId> {
        Ok(self
            .store
            .borrow()
            .keys()
            .next_back()
            .map_or(0, |last| last + 1))
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        let mut store = self.store.borrow_mut();
        for id in &changes.deleted {
            store.remove(id);
        }
        for record in changes.created.iter().chain(&changes.updated) {
            store.insert(record.id, record.clone());
        }
        debug!("applied {} changes to memory layer", store.len());
        Ok(())
    }

    fn write_copy(&self, path: &Path, records: &[FeatureRecord]) -> Result<()> {
        self.exports
            .borrow_mut()
            .insert(path.to_path_buf(), records.to_vec());
        Ok(())
    }
}
