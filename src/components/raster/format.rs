use serde::{Deserialize, Serialize};

use crate::components::backends::SampleType;

/// Numeric layout of decoded raster values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RasterFormat {
    /// Single channel, decoded as 32-bit float.
    RF,
    /// Single channel, 8 bit.
    Byte,
    Rgb,
    Rgba,
    /// Any band layout without a defined decoding.
    Mixed,
}

impl RasterFormat {
    pub fn detect(band_count: usize, sample_type: SampleType) -> Self {
        match (band_count, sample_type) {
            (1, SampleType::Byte) => RasterFormat::Byte,
            (1, SampleType::Integer | SampleType::Float) => RasterFormat::RF,
            (3, SampleType::Byte) => RasterFormat::Rgb,
            (4, SampleType::Byte) => RasterFormat::Rgba,
            _ => RasterFormat::Mixed,
        }
    }

    /// Number of decoded channels, `None` when the format can not be decoded.
    pub fn channels(&self) -> Option<usize> {
        match self {
            RasterFormat::RF | RasterFormat::Byte => Some(1),
            RasterFormat::Rgb => Some(3),
            RasterFormat::Rgba => Some(4),
            RasterFormat::Mixed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

impl TryFrom<i32> for Interpolation {
    type Error = crate::errors::GeodataError;

    /// Host integer codes, matching GDAL's resampling ordinals.
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Interpolation::Nearest),
            1 => Ok(Interpolation::Bilinear),
            other => Err(crate::errors::GeodataError::InvalidWindow(format!(
                "unknown interpolation code {other}"
            ))),
        }
    }
}
