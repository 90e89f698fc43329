use log::{info, warn};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    components::{
        backends::{gdal_backend, NativeDataset},
        raster::RasterLayer,
        vector::FeatureLayer,
    },
    errors::GeodataError,
    options::Options,
};

#[derive(Debug)]
struct DatasetInner {
    path: PathBuf,
    write_access: bool,
    options: Options,
    native: Option<Box<dyn NativeDataset>>,
}

/// Shared handle over an opened store.
///
/// Layers keep a clone of the handle, so the store stays open for as long as
/// any layer bound from it.
#[derive(Debug, Clone)]
pub struct Dataset(Rc<DatasetInner>);

impl Dataset {
    /// Opens `path` with the GDAL backend. Failure gives an invalid dataset.
    pub fn open<P: AsRef<Path>>(path: P, write_access: bool) -> Self {
        Self::open_with_options(path, write_access, Options::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        write_access: bool,
        options: Options,
    ) -> Self {
        let path = path.as_ref();
        let native = match gdal_backend::open(path, write_access) {
            Ok(store) => Some(Box::new(store) as Box<dyn NativeDataset>),
            Err(error) => {
                warn!("Could not open dataset '{}': {error}", path.display());
                None
            }
        };
        Self::init(path, write_access, options, native)
    }

    /// Binds an already opened store.
    pub fn from_native<P: AsRef<Path>>(
        path: P,
        write_access: bool,
        native: Box<dyn NativeDataset>,
    ) -> Self {
        Self::init(path.as_ref(), write_access, Options::default(), Some(native))
    }

    fn init(
        path: &Path,
        write_access: bool,
        options: Options,
        native: Option<Box<dyn NativeDataset>>,
    ) -> Self {
        let dataset = Self(Rc::new(DatasetInner {
            path: path.to_path_buf(),
            write_access,
            options,
            native,
        }));
        if dataset.is_valid() {
            info!(
                "opened dataset '{}' (write access: {write_access})",
                path.display()
            );
        }
        dataset
    }

    pub fn with_options(self, options: Options) -> Self {
        match Rc::try_unwrap(self.0) {
            Ok(mut inner) => {
                inner.options = options;
                Self(Rc::new(inner))
            }
            Err(shared) => {
                warn!(
                    "Options of dataset '{}' are fixed once layers are bound",
                    shared.path.display()
                );
                Self(shared)
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.0.native.is_some()
    }

    pub fn write_access(&self) -> bool {
        self.0.write_access
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    pub fn options(&self) -> &Options {
        &self.0.options
    }

    pub fn raster_layer_names(&self) -> Vec<String> {
        self.0
            .native
            .as_ref()
            .map(|native| native.raster_layer_names())
            .unwrap_or_default()
    }

    pub fn feature_layer_names(&self) -> Vec<String> {
        self.0
            .native
            .as_ref()
            .map(|native| native.feature_layer_names())
            .unwrap_or_default()
    }

    fn invalid_error(&self) -> GeodataError {
        GeodataError::InvalidDataset(self.0.path.display().to_string())
    }

    /// Always returns a layer; check [RasterLayer::is_valid].
    pub fn get_raster_layer(&self, name: &str) -> RasterLayer {
        let native = match self.0.native.as_ref() {
            Some(native) => native.raster(name),
            None => Err(self.invalid_error()),
        };
        RasterLayer::bind(name, self.clone(), native)
    }

    /// Always returns a layer; check [FeatureLayer::is_valid].
    pub fn get_feature_layer(&self, name: &str) -> FeatureLayer {
        let native = match self.0.native.as_ref() {
            Some(native) => native.layer(name),
            None => Err(self.invalid_error()),
        };
        FeatureLayer::bind(name, self.clone(), native)
    }

    pub fn get_raster_layers(&self) -> Vec<RasterLayer> {
        self.raster_layer_names()
            .iter()
            .map(|name| self.get_raster_layer(name))
            .collect()
    }

    pub fn get_feature_layers(&self) -> Vec<FeatureLayer> {
        self.feature_layer_names()
            .iter()
            .map(|name| self.get_feature_layer(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        backends::{
            memory::{MemoryDataset, MemoryRaster},
            SampleType,
        },
        raster::Interpolation,
        vector::record::FeatureRecord,
    };

    fn store() -> MemoryDataset {
        let raster = MemoryRaster::new(
            (2, 2),
            [0.0, 1.0, 0.0, 2.0, 0.0, -1.0],
            SampleType::Float,
            vec![vec![1.0, 2.0, 3.0, 4.0]],
        )
        .unwrap();
        MemoryDataset::new()
            .with_raster("dem", raster.clone())
            .with_raster("slope", raster)
            .with_layer("roads", [FeatureRecord::new(0, None)])
    }

    #[test_log::test]
    fn missing_file_gives_invalid_dataset() {
        let dataset = Dataset::open("/definitely/not/here.tif", true);
        assert!(!dataset.is_valid());
        assert!(dataset.write_access());
        assert!(dataset.raster_layer_names().is_empty());
        assert!(dataset.feature_layer_names().is_empty());
        assert!(!dataset.get_raster_layer("anything").is_valid());
        assert!(!dataset.get_feature_layer("anything").is_valid());
        assert!(!RasterLayer::open("/definitely/not/here.tif", false).is_valid());
    }

    #[test_log::test]
    fn enumerates_layers() {
        let dataset = Dataset::from_native("store.mem", false, Box::new(store()));
        assert!(dataset.is_valid());
        assert_eq!(dataset.raster_layer_names(), vec!["dem", "slope"]);
        assert_eq!(dataset.feature_layer_names(), vec!["roads"]);

        let rasters = dataset.get_raster_layers();
        assert_eq!(rasters.len(), 2);
        assert!(rasters.iter().all(RasterLayer::is_valid));
        let layers = dataset.get_feature_layers();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].get_all_features().len(), 1);
        assert_eq!(layers[0].dataset().path(), Path::new("store.mem"));
    }

    #[test_log::test]
    fn layers_keep_the_store_alive() {
        let layer =
            Dataset::from_native("store.mem", false, Box::new(store())).get_raster_layer("dem");
        assert!(layer.dataset().is_valid());
        assert_eq!(layer.get_value_at_position(1.5, 0.5), 4.0);
        let image = layer.get_image(0.0, 2.0, 2.0, 2, Interpolation::Nearest);
        assert_eq!(image.value_at(1, 0), Some(2.0));
    }

    #[test_log::test]
    fn options_apply_before_binding() {
        let options = Options {
            point_sample_size: 0.5,
            ..Options::default()
        };
        let dataset = Dataset::from_native("store.mem", false, Box::new(store()))
            .with_options(options.clone());
        assert_eq!(dataset.options(), &options);

        let _layer = dataset.get_raster_layer("dem");
        let unchanged = dataset.with_options(Options::default());
        assert_eq!(unchanged.options(), &options);
    }
}
