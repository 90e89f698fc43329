use ndarray::{Array2, Array3, ArrayView2};

use crate::components::raster::format::{Interpolation, RasterFormat};

/// Decoded samples of an extracted tile.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// (rows, columns), no-data as NaN.
    Float(Array2<f32>),
    /// (channels, rows, columns), no-data as 0.
    Byte(Array3<u8>),
}

impl PixelData {
    /// (columns, rows)
    pub fn shape(&self) -> (usize, usize) {
        match self {
            PixelData::Float(array) => (array.ncols(), array.nrows()),
            PixelData::Byte(array) => (array.shape()[2], array.shape()[1]),
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PixelData::Float(_) => 1,
            PixelData::Byte(array) => array.shape()[0],
        }
    }

    /// Sample of `channel` at (`col`, `row`) widened to f32.
    pub fn sample(&self, channel: usize, col: usize, row: usize) -> Option<f32> {
        match self {
            PixelData::Float(array) if channel == 0 => array.get((row, col)).copied(),
            PixelData::Float(_) => None,
            PixelData::Byte(array) => array.get((channel, row, col)).map(|value| *value as f32),
        }
    }
}

/// Raster tile detached from its source.
///
/// An image without data is the "no data" result of an extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Option<PixelData>,
    format: Option<RasterFormat>,
    interpolation: Interpolation,
}

impl Image {
    pub fn new(data: PixelData, format: RasterFormat, interpolation: Interpolation) -> Self {
        Self {
            data: Some(data),
            format: Some(format),
            interpolation,
        }
    }

    pub fn invalid() -> Self {
        Self {
            data: None,
            format: None,
            interpolation: Interpolation::default(),
        }
    }

    /// Single channel float image, e.g. a stamp for
    /// [overlay_image_at_position](crate::RasterLayer::overlay_image_at_position).
    pub fn from_float(array: Array2<f32>) -> Self {
        Self::new(PixelData::Float(array), RasterFormat::RF, Interpolation::Nearest)
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&PixelData> {
        self.data.as_ref()
    }

    pub fn format(&self) -> Option<RasterFormat> {
        self.format
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// (columns, rows), `(0, 0)` when invalid.
    pub fn size(&self) -> (usize, usize) {
        self.data.as_ref().map_or((0, 0), PixelData::shape)
    }

    /// First channel sample at (`col`, `row`).
    pub fn value_at(&self, col: usize, row: usize) -> Option<f32> {
        self.data.as_ref()?.sample(0, col, row)
    }

    pub fn as_float(&self) -> Option<ArrayView2<'_, f32>> {
        match self.data.as_ref()? {
            PixelData::Float(array) => Some(array.view()),
            PixelData::Byte(_) => None,
        }
    }
}
