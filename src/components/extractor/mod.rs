//! Cuts metrically sized tiles out of a raster and derives its statistics.

mod resample;

use geo::{Coord, Rect};
use itertools::{Itertools, MinMaxResult};
use log::debug;
use ndarray::{Array2, Array3};

use crate::{
    components::{
        backends::NativeRaster,
        bounds::Extent,
        raster::{Image, Interpolation, PixelData, RasterFormat},
        transforms::PixelGeoTransform,
    },
    errors::{GeodataError, Result},
    intersection::Intersection,
    options::Options,
};

use resample::{BandSampler, OutputGrid, ReadWindow};

/// Rows scanned per read while computing statistics.
const STATISTICS_BLOCK_ROWS: usize = 256;

/// Geo window to extract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    pub top_left_x: f64,
    pub top_left_y: f64,
    pub size_meters: f64,
    pub img_size: usize,
    pub interpolation: Interpolation,
}

impl TileRequest {
    fn validate(&self) -> Result<()> {
        if !(self.size_meters.is_finite() && self.size_meters > 0.0) {
            return Err(GeodataError::InvalidWindow(format!(
                "size must be a positive number of meters, got {}",
                self.size_meters
            )));
        }
        if self.img_size == 0 {
            return Err(GeodataError::InvalidWindow(
                "image size must be at least one pixel".to_string(),
            ));
        }
        if !(self.top_left_x.is_finite() && self.top_left_y.is_finite()) {
            return Err(GeodataError::InvalidWindow(
                "top left corner is not finite".to_string(),
            ));
        }
        Ok(())
    }

    fn grid(&self) -> OutputGrid {
        OutputGrid {
            top_left: Coord {
                x: self.top_left_x,
                y: self.top_left_y,
            },
            pixel_size: self.size_meters / self.img_size as f64,
            img_size: self.img_size,
        }
    }
}

/// Extraction and statistics over one named raster.
pub struct TileExtractor<'a> {
    name: &'a str,
    raster: &'a dyn NativeRaster,
    options: &'a Options,
}

impl<'a> TileExtractor<'a> {
    pub fn new(name: &'a str, raster: &'a dyn NativeRaster, options: &'a Options) -> Self {
        Self {
            name,
            raster,
            options,
        }
    }

    fn no_data_error(&self) -> GeodataError {
        GeodataError::NoDataAvailable {
            layer: self.name.to_string(),
        }
    }

    pub fn format(&self) -> RasterFormat {
        RasterFormat::detect(self.raster.band_count(), self.raster.sample_type())
    }

    pub fn get_extent_data(&self) -> Result<Extent> {
        let transform = PixelGeoTransform::from_gdal(self.raster.geo_transform()?);
        Ok(Extent::from_transform(&transform, self.raster.size()))
    }

    /// Resamples the requested geo window into an `img_size²` [Image].
    ///
    /// Fails with [GeodataError::NoDataAvailable] when no output pixel received
    /// a valid source sample.
    pub fn get_tile(&self, request: &TileRequest) -> Result<Image> {
        request.validate()?;
        let format = self.format();
        let channels = format
            .channels()
            .ok_or(GeodataError::UnsupportedFormat(format))?;

        let transform = PixelGeoTransform::from_gdal(self.raster.geo_transform()?);
        let geo_to_pixel = transform.inverse()?;
        let grid = request.grid();
        let corners = grid.corners().map(|corner| geo_to_pixel.geo_to_pixel(corner));
        let (min_x, max_x) = corners
            .iter()
            .map(|corner| corner.x)
            .minmax()
            .into_option()
            .unwrap_or_default();
        let (min_y, max_y) = corners
            .iter()
            .map(|corner| corner.y)
            .minmax()
            .into_option()
            .unwrap_or_default();
        // One pixel of padding keeps the bilinear neighbours of edge samples.
        let requested = Rect::new(
            Coord {
                x: min_x - 1.0,
                y: min_y - 1.0,
            },
            Coord {
                x: max_x + 1.0,
                y: max_y + 1.0,
            },
        );
        let (width, height) = self.raster.size();
        let raster_bounds = Rect::new(
            Coord { x: 0.0, y: 0.0 },
            Coord {
                x: width as f64,
                y: height as f64,
            },
        );
        let source = requested
            .intersection(&raster_bounds)
            .map_err(|_| self.no_data_error())?;

        let (source_width, source_height) = transform.pixel_size();
        let output_ratio = grid.pixel_size / source_width.min(source_height);
        let read_scale = (self.options.read_oversampling.max(1) as f64 / output_ratio).min(1.0);
        let window = ReadWindow::covering(&source, read_scale);
        debug!(
            "tile of '{}' reads {:?} px into {:?}",
            self.name, window.size, window.buffer_size
        );

        let no_data = self.raster.no_data_value();
        let bands = (0..channels)
            .map(|band| {
                let buffer =
                    self.raster
                        .read_window(band, window.offset, window.size, window.buffer_size)?;
                let sampler = BandSampler {
                    buffer: &buffer,
                    window,
                    raster_size: (width, height),
                    no_data,
                    geo_to_pixel,
                };
                Ok(sampler.resample(&grid, request.interpolation))
            })
            .collect::<Result<Vec<_>>>()?;

        if bands[0].iter().all(|value| value.is_nan()) {
            return Err(self.no_data_error());
        }

        let shape = (request.img_size, request.img_size);
        let data = match format {
            RasterFormat::RF => PixelData::Float(Array2::from_shape_vec(
                shape,
                bands[0].iter().map(|value| *value as f32).collect(),
            )?),
            _ => PixelData::Byte(Array3::from_shape_vec(
                (channels, shape.0, shape.1),
                bands
                    .iter()
                    .flatten()
                    .map(|value| {
                        if value.is_nan() {
                            0
                        } else {
                            num_traits::clamp(value.round(), 0.0, 255.0) as u8
                        }
                    })
                    .collect(),
            )?),
        };
        Ok(Image::new(data, format, request.interpolation))
    }

    /// Smallest and largest valid value of the first band.
    pub fn get_min_max(&self) -> Result<(f32, f32)> {
        let (width, height) = self.raster.size();
        let no_data = self.raster.no_data_value();
        let mut range: Option<(f64, f64)> = None;
        for row in (0..height).step_by(STATISTICS_BLOCK_ROWS) {
            let rows = STATISTICS_BLOCK_ROWS.min(height - row);
            let block = self
                .raster
                .read_window(0, (0, row), (width, rows), (width, rows))?;
            let block_range = match block
                .into_iter()
                .filter(|value| !value.is_nan() && no_data != Some(*value))
                .minmax()
            {
                MinMaxResult::NoElements => continue,
                MinMaxResult::OneElement(value) => (value, value),
                MinMaxResult::MinMax(min, max) => (min, max),
            };
            range = Some(match range {
                None => block_range,
                Some((min, max)) => (min.min(block_range.0), max.max(block_range.1)),
            });
        }
        range
            .map(|(min, max)| (min as f32, max as f32))
            .ok_or_else(|| self.no_data_error())
    }

    pub fn get_min(&self) -> Result<f32> {
        self.get_min_max().map(|(min, _)| min)
    }

    pub fn get_max(&self) -> Result<f32> {
        self.get_min_max().map(|(_, max)| max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::backends::{memory::MemoryRaster, SampleType};
    use rstest::{fixture, rstest};

    /// 4x4 raster, 10 m pixels, top left at (1000, 2000), value = row * 4 + col.
    #[fixture]
    fn ramp() -> MemoryRaster {
        MemoryRaster::new(
            (4, 4),
            [1000.0, 10.0, 0.0, 2000.0, 0.0, -10.0],
            SampleType::Float,
            vec![(0..16).map(|value| value as f64).collect()],
        )
        .unwrap()
    }

    fn request(
        x: f64,
        y: f64,
        size: f64,
        img_size: usize,
        interpolation: Interpolation,
    ) -> TileRequest {
        TileRequest {
            top_left_x: x,
            top_left_y: y,
            size_meters: size,
            img_size,
            interpolation,
        }
    }

    #[rstest]
    fn full_window_at_native_resolution(ramp: MemoryRaster) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        let image = extractor
            .get_tile(&request(1000.0, 2000.0, 40.0, 4, Interpolation::Nearest))
            .unwrap();
        let values = image.as_float().unwrap();
        assert_eq!(values.shape(), &[4, 4]);
        assert_eq!(values[[0, 0]], 0.0);
        assert_eq!(values[[1, 2]], 6.0);
        assert_eq!(values[[3, 3]], 15.0);
    }

    #[rstest]
    fn downsampled_window(ramp: MemoryRaster) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        let image = extractor
            .get_tile(&request(1000.0, 2000.0, 40.0, 2, Interpolation::Nearest))
            .unwrap();
        let values = image.as_float().unwrap();
        assert_eq!(values[[0, 0]], 5.0);
        assert_eq!(values[[1, 1]], 15.0);
    }

    #[rstest]
    fn bilinear_blends_pixel_centers(ramp: MemoryRaster) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        // One output pixel centred on the corner shared by pixels 0, 1, 4, 5.
        let image = extractor
            .get_tile(&request(1005.0, 1995.0, 10.0, 1, Interpolation::Bilinear))
            .unwrap();
        assert_eq!(image.value_at(0, 0), Some(2.5));
        assert_eq!(image.interpolation(), Interpolation::Bilinear);
    }

    #[rstest]
    fn partial_overlap_marks_outside_as_no_data(ramp: MemoryRaster) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        let image = extractor
            .get_tile(&request(980.0, 2000.0, 40.0, 4, Interpolation::Nearest))
            .unwrap();
        let values = image.as_float().unwrap();
        assert!(values[[0, 0]].is_nan());
        assert!(values[[0, 1]].is_nan());
        assert_eq!(values[[0, 2]], 0.0);
        assert_eq!(values[[0, 3]], 1.0);
    }

    #[rstest]
    #[case::left(900.0, 2000.0)]
    #[case::below(1000.0, 1900.0)]
    #[case::touching_edge(1040.0, 2000.0)]
    fn window_outside_has_no_data(ramp: MemoryRaster, #[case] x: f64, #[case] y: f64) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        let result = extractor.get_tile(&request(x, y, 40.0, 4, Interpolation::Nearest));
        assert!(matches!(
            result,
            Err(GeodataError::NoDataAvailable { layer }) if layer == "ramp"
        ));
    }

    #[rstest]
    #[case::zero_size(0.0, 4)]
    #[case::negative_size(-1.0, 4)]
    #[case::nan_size(f64::NAN, 4)]
    #[case::zero_pixels(10.0, 0)]
    fn rejects_degenerate_requests(ramp: MemoryRaster, #[case] size: f64, #[case] img_size: usize) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        let tile = request(1000.0, 2000.0, size, img_size, Interpolation::Nearest);
        let result = extractor.get_tile(&tile);
        assert!(matches!(result, Err(GeodataError::InvalidWindow(_))));
    }

    #[test_log::test]
    fn no_data_only_window_fails() {
        let raster = MemoryRaster::new(
            (2, 2),
            [0.0, 1.0, 0.0, 2.0, 0.0, -1.0],
            SampleType::Float,
            vec![vec![-9999.0; 4]],
        )
        .unwrap()
        .with_no_data(Some(-9999.0));
        let options = Options::default();
        let extractor = TileExtractor::new("void", &raster, &options);
        let result = extractor.get_tile(&request(0.0, 2.0, 2.0, 2, Interpolation::Bilinear));
        assert!(matches!(result, Err(GeodataError::NoDataAvailable { .. })));
        assert!(matches!(
            extractor.get_min_max(),
            Err(GeodataError::NoDataAvailable { .. })
        ));
    }

    #[test_log::test]
    fn mixed_format_is_unsupported() {
        let raster = MemoryRaster::new(
            (1, 1),
            [0.0, 1.0, 0.0, 1.0, 0.0, -1.0],
            SampleType::Float,
            vec![vec![1.0], vec![2.0]],
        )
        .unwrap();
        let options = Options::default();
        let extractor = TileExtractor::new("pair", &raster, &options);
        assert_eq!(extractor.format(), RasterFormat::Mixed);
        let result = extractor.get_tile(&request(0.0, 1.0, 1.0, 1, Interpolation::Nearest));
        assert!(matches!(
            result,
            Err(GeodataError::UnsupportedFormat(RasterFormat::Mixed))
        ));
    }

    #[test_log::test]
    fn rgb_tiles_decode_to_bytes() {
        let raster = MemoryRaster::new(
            (1, 1),
            [0.0, 1.0, 0.0, 1.0, 0.0, -1.0],
            SampleType::Byte,
            vec![vec![10.0], vec![20.0], vec![300.0]],
        )
        .unwrap();
        let options = Options::default();
        let extractor = TileExtractor::new("rgb", &raster, &options);
        let image = extractor
            .get_tile(&request(0.0, 1.0, 1.0, 2, Interpolation::Nearest))
            .unwrap();
        assert_eq!(image.format(), Some(RasterFormat::Rgb));
        let Some(PixelData::Byte(data)) = image.data() else {
            panic!("expected byte data");
        };
        assert_eq!(data.shape(), &[3, 2, 2]);
        assert_eq!(data[[0, 1, 1]], 10);
        assert_eq!(data[[1, 0, 0]], 20);
        assert_eq!(data[[2, 0, 1]], 255);
    }

    #[rstest]
    fn statistics_skip_no_data() {
        let raster = MemoryRaster::new(
            (3, 1),
            [0.0, 1.0, 0.0, 1.0, 0.0, -1.0],
            SampleType::Float,
            vec![vec![-9999.0, 4.0, -2.5]],
        )
        .unwrap()
        .with_no_data(Some(-9999.0));
        let options = Options::default();
        let extractor = TileExtractor::new("stats", &raster, &options);
        assert_eq!(extractor.get_min().unwrap(), -2.5);
        assert_eq!(extractor.get_max().unwrap(), 4.0);
    }

    #[rstest]
    fn extent_from_transform(ramp: MemoryRaster) {
        let options = Options::default();
        let extractor = TileExtractor::new("ramp", &ramp, &options);
        let extent = extractor.get_extent_data().unwrap();
        assert_eq!(
            extent,
            Extent {
                left: 1000.0,
                top: -2000.0,
                right: 1040.0,
                bottom: -1960.0
            }
        );
    }

    /// Reference tile of a synthetic elevation model, 5 m pixels.
    #[test_log::test]
    fn reference_elevation_tile() {
        let size = (2000, 2000);
        let elevation = |col: usize, row: usize| 200.0 + col as f64 * 0.5 - row as f64 * 0.25;
        let data = (0..size.1)
            .flat_map(|row| (0..size.0).map(move |col| elevation(col, row)))
            .collect();
        let raster = MemoryRaster::new(
            size,
            [1540000.0, 5.0, 0.0, 5925000.0, 0.0, -5.0],
            SampleType::Float,
            vec![data],
        )
        .unwrap();
        let options = Options::default();
        let extractor = TileExtractor::new("dem", &raster, &options);
        let image = extractor
            .get_tile(&request(1546670.0, 5918250.0, 50000.0, 256, Interpolation::Nearest))
            .unwrap();
        assert_eq!(image.size(), (256, 256));
        // The window is 39 source pixels per output pixel, read decimated.
        assert_eq!(image.value_at(0, 0), Some(elevation(1361, 1377) as f32));
        let (min, max) = extractor.get_min_max().unwrap();
        let first = image.value_at(0, 0).unwrap();
        assert!(min <= first && first <= max);
    }
}
