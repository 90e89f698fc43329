pub mod format;
mod grid;
pub mod image;

use geo::{Coord, Rect};
use log::{debug, error, info};
use std::{fmt::Debug, path::Path};

pub use format::{Interpolation, RasterFormat};
pub use image::{Image, PixelData};

use crate::{
    components::{
        backends::{memory::MemoryRaster, NativeRaster},
        bounds::Extent,
        dataset::Dataset,
        extractor::{TileExtractor, TileRequest},
    },
    errors::{GeodataError, Result},
};

use grid::PixelGrid;

/// Returned by point sampling when no float value is available.
pub const VALUE_SENTINEL: f32 = -1.0;

/// Named view over one raster of a [Dataset].
pub struct RasterLayer {
    name: String,
    native: Option<Box<dyn NativeRaster>>,
    origin: Dataset,
    write_access: bool,
    /// Cached when the raster is bound.
    extent: Extent,
    format: Option<RasterFormat>,
}

impl Debug for RasterLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterLayer")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .field("write_access", &self.write_access)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .finish()
    }
}

impl RasterLayer {
    fn init(
        name: &str,
        origin: Dataset,
        native: Box<dyn NativeRaster>,
        write_access: bool,
    ) -> Result<Self> {
        let (extent, format) = {
            let extractor = TileExtractor::new(name, native.as_ref(), origin.options());
            (extractor.get_extent_data()?, extractor.format())
        };
        let layer = Self {
            name: name.to_string(),
            native: Some(native),
            origin,
            write_access,
            extent,
            format: Some(format),
        };
        info!("new {layer:?}");
        Ok(layer)
    }

    fn invalid(name: &str, origin: Dataset) -> Self {
        Self {
            name: name.to_string(),
            native: None,
            write_access: origin.write_access(),
            origin,
            extent: Extent::default(),
            format: None,
        }
    }

    /// Binds `native` as layer `name` of `origin`. A failed binding yields an
    /// invalid layer.
    pub(crate) fn bind(name: &str, origin: Dataset, native: Result<Box<dyn NativeRaster>>) -> Self {
        let write_access = origin.write_access();
        match native.and_then(|native| Self::init(name, origin.clone(), native, write_access)) {
            Ok(layer) => layer,
            Err(error) => {
                error!("Raster layer '{name}' could not be bound: {error}");
                Self::invalid(name, origin)
            }
        }
    }

    /// Loads the first raster of the file at `path` on its own.
    pub fn open<P: AsRef<Path>>(path: P, write_access: bool) -> Self {
        let path = path.as_ref();
        let dataset = Dataset::open(path, write_access);
        let layer = match dataset.raster_layer_names().first() {
            Some(name) => dataset.get_raster_layer(name),
            None => {
                let name = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Self::invalid(&name, dataset.clone())
            }
        };
        if !layer.is_valid() {
            error!("Could not load raster layer from path '{}'", path.display());
        }
        layer
    }

    pub fn is_valid(&self) -> bool {
        self.native.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset(&self) -> &Dataset {
        &self.origin
    }

    pub fn write_access(&self) -> bool {
        self.write_access
    }

    pub fn format(&self) -> Option<RasterFormat> {
        self.format
    }

    fn invalid_error(&self) -> GeodataError {
        GeodataError::InvalidDataset(self.name.clone())
    }

    fn no_data_error(name: &str) -> GeodataError {
        GeodataError::NoDataAvailable {
            layer: name.to_string(),
        }
    }

    fn extractor(&self) -> Result<TileExtractor<'_>> {
        let native = self.native.as_deref().ok_or_else(|| self.invalid_error())?;
        Ok(TileExtractor::new(&self.name, native, self.origin.options()))
    }

    /// Write access is checked before the binding.
    fn writable(&mut self) -> Result<&mut (dyn NativeRaster + 'static)> {
        if !self.write_access {
            return Err(GeodataError::WriteAccessViolation {
                layer: self.name.clone(),
            });
        }
        let name = &self.name;
        self.native
            .as_deref_mut()
            .ok_or_else(|| GeodataError::InvalidDataset(name.clone()))
    }

    /// Tile of `size_meters` with its top left corner at (`top_left_x`,
    /// `top_left_y`), resampled to `img_size²` pixels.
    ///
    /// Returns an invalid [Image] when nothing could be extracted.
    pub fn get_image(
        &self,
        top_left_x: f64,
        top_left_y: f64,
        size_meters: f64,
        img_size: usize,
        interpolation: Interpolation,
    ) -> Image {
        let request = TileRequest {
            top_left_x,
            top_left_y,
            size_meters,
            img_size,
            interpolation,
        };
        match self
            .extractor()
            .and_then(|extractor| extractor.get_tile(&request))
        {
            Ok(image) => image,
            Err(error) => {
                error!("No image from raster layer '{}': {error}", self.name);
                Image::invalid()
            }
        }
    }

    pub fn get_value_at_position(&self, x: f64, y: f64) -> f32 {
        self.get_value_at_position_with_resolution(x, y, self.origin.options().point_sample_size)
    }

    /// Single nearest sample over a `pixel_size` window. Only single channel
    /// float rasters yield values; everything else gives [VALUE_SENTINEL].
    pub fn get_value_at_position_with_resolution(&self, x: f64, y: f64, pixel_size: f64) -> f32 {
        let (top_left_x, top_left_y, size_meters) = self.sample_window(x, y, pixel_size);
        let request = TileRequest {
            top_left_x,
            top_left_y,
            size_meters,
            img_size: 1,
            interpolation: Interpolation::Nearest,
        };
        match self
            .extractor()
            .and_then(|extractor| extractor.get_tile(&request))
        {
            Ok(image) if image.format() == Some(RasterFormat::RF) => {
                image.value_at(0, 0).unwrap_or(VALUE_SENTINEL)
            }
            Ok(_) => VALUE_SENTINEL,
            Err(error) => {
                debug!("No value in raster layer '{}' at ({x}, {y}): {error}", self.name);
                VALUE_SENTINEL
            }
        }
    }

    /// Point sample window starting at (`x`, `y`). For points on the closed
    /// extent, the window is shifted back inside so the right and south edges
    /// still hit the last column and row.
    fn sample_window(&self, x: f64, y: f64, pixel_size: f64) -> (f64, f64, f64) {
        let extent = &self.extent;
        if !extent.contains_projected(x, y) {
            return (x, y, pixel_size);
        }
        let size = pixel_size.min(extent.width()).min(extent.height());
        let (north, south) = (-extent.top, -extent.bottom);
        let x = x.min(extent.right - size).max(extent.left);
        let y = y.max(south + size).min(north);
        (x, y, size)
    }

    /// Sets the pixel holding (`x`, `y`) to `value` on every band.
    pub fn set_value_at_position(&mut self, x: f64, y: f64, value: f64) -> Result<()> {
        let name = self.name.clone();
        let raster = self.writable()?;
        let grid = PixelGrid::of(raster)?;
        let pixel = grid
            .containing(x, y)
            .ok_or_else(|| Self::no_data_error(&name))?;
        for band in 0..raster.band_count() {
            raster.write_window(band, pixel, (1, 1), &[value])?;
        }
        Ok(())
    }

    /// Adds `summand`, fading linearly to zero at `radius` meters, to every
    /// pixel centred within `radius` of (`x`, `y`). No-data pixels are kept.
    pub fn smooth_add_value_at_position(
        &mut self,
        x: f64,
        y: f64,
        summand: f64,
        radius: f64,
    ) -> Result<()> {
        let name = self.name.clone();
        let raster = self.writable()?;
        if !(radius.is_finite() && radius > 0.0) {
            return Err(GeodataError::InvalidWindow(format!(
                "radius must be a positive number of meters, got {radius}"
            )));
        }
        let grid = PixelGrid::of(raster)?;
        grid.containing(x, y)
            .ok_or_else(|| Self::no_data_error(&name))?;
        let area = Rect::new(
            Coord {
                x: x - radius,
                y: y - radius,
            },
            Coord {
                x: x + radius,
                y: y + radius,
            },
        );
        let (offset, size) = grid
            .window(area)
            .ok_or_else(|| Self::no_data_error(&name))?;
        let invalid = raster.no_data_value();
        let position = Coord { x, y };

        for band in 0..raster.band_count() {
            let mut block = raster.read_window(band, offset, size, size)?;
            for (index, value) in block.iter_mut().enumerate() {
                if value.is_nan() || invalid == Some(*value) {
                    continue;
                }
                let center = grid.center(offset.0 + index % size.0, offset.1 + index / size.0);
                let delta = center - position;
                let distance = delta.x.hypot(delta.y);
                if distance <= radius {
                    *value += summand * (1.0 - distance / radius);
                }
            }
            raster.write_window(band, offset, size, &block)?;
        }
        Ok(())
    }

    /// Stamps `image` onto the raster with its top left corner at (`x`, `y`),
    /// each image pixel covering `scale` meters. Image channels map to bands
    /// in order; NaN samples leave the raster untouched.
    pub fn overlay_image_at_position(
        &mut self,
        x: f64,
        y: f64,
        image: &Image,
        scale: f64,
    ) -> Result<()> {
        let name = self.name.clone();
        let raster = self.writable()?;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(GeodataError::InvalidWindow(format!(
                "scale must be a positive number of meters, got {scale}"
            )));
        }
        let data = image
            .data()
            .ok_or_else(|| GeodataError::InvalidWindow("overlay image holds no data".to_string()))?;
        let (cols, rows) = data.shape();
        let footprint = Rect::new(
            Coord {
                x,
                y: y - rows as f64 * scale,
            },
            Coord {
                x: x + cols as f64 * scale,
                y,
            },
        );
        let grid = PixelGrid::of(raster)?;
        let (offset, size) = grid
            .window(footprint)
            .ok_or_else(|| Self::no_data_error(&name))?;

        for band in 0..data.channels().min(raster.band_count()) {
            let mut block = raster.read_window(band, offset, size, size)?;
            for (index, value) in block.iter_mut().enumerate() {
                let center = grid.center(offset.0 + index % size.0, offset.1 + index / size.0);
                let col = (center.x - x) / scale;
                let row = (y - center.y) / scale;
                if col < 0.0 || row < 0.0 {
                    continue;
                }
                if let Some(sample) = data
                    .sample(band, col.floor() as usize, row.floor() as usize)
                    .filter(|sample| !sample.is_nan())
                {
                    *value = sample as f64;
                }
            }
            raster.write_window(band, offset, size, &block)?;
        }
        Ok(())
    }

    pub fn get_extent(&self) -> Extent {
        self.extent
    }

    /// Center of the extent, vertical axis down-positive.
    pub fn get_center(&self) -> Coord {
        self.extent.center()
    }

    pub fn get_min(&self) -> Result<f32> {
        self.extractor()?.get_min()
    }

    pub fn get_max(&self) -> Result<f32> {
        self.extractor()?.get_max()
    }
}

/// Detached in-memory copy. The copy is writable and shares the origin
/// dataset handle.
impl Clone for RasterLayer {
    fn clone(&self) -> Self {
        let copy = self
            .native
            .as_deref()
            .ok_or_else(|| self.invalid_error())
            .and_then(|native| MemoryRaster::snapshot(native))
            .and_then(|raster| Self::init(&self.name, self.origin.clone(), Box::new(raster), true));
        match copy {
            Ok(layer) => layer,
            Err(error) => {
                error!("Could not clone raster layer '{}': {error}", self.name);
                Self::invalid(&self.name, self.origin.clone())
            }
        }
    }
}
