use geo::{Coord, Rect};
use rayon::prelude::*;

use crate::components::{raster::Interpolation, transforms::GeoPixelTransform};

/// Block of source pixels that was read, and the buffer it was read into.
#[derive(Debug, Clone, Copy)]
pub struct ReadWindow {
    pub offset: (usize, usize),
    pub size: (usize, usize),
    pub buffer_size: (usize, usize),
}

impl ReadWindow {
    /// Integer window covering the fractional pixel `bounds`, read at `scale`
    /// (at most 1) of its native resolution.
    pub fn covering(bounds: &Rect, scale: f64) -> Self {
        let offset = (bounds.min().x.floor() as usize, bounds.min().y.floor() as usize);
        let end = (bounds.max().x.ceil() as usize, bounds.max().y.ceil() as usize);
        let size = ((end.0 - offset.0).max(1), (end.1 - offset.1).max(1));
        let scaled = |len: usize| ((len as f64 * scale).ceil() as usize).clamp(1, len);
        let buffer_size = (scaled(size.0), scaled(size.1));
        Self {
            offset,
            size,
            buffer_size,
        }
    }

    /// Source pixel coordinate to read buffer coordinate.
    fn to_buffer(&self, pixel: Coord) -> Coord {
        Coord {
            x: (pixel.x - self.offset.0 as f64) * self.buffer_size.0 as f64 / self.size.0 as f64,
            y: (pixel.y - self.offset.1 as f64) * self.buffer_size.1 as f64 / self.size.1 as f64,
        }
    }
}

/// Placement of the output grid in geo space.
#[derive(Debug, Clone, Copy)]
pub struct OutputGrid {
    pub top_left: Coord,
    pub pixel_size: f64,
    pub img_size: usize,
}

impl OutputGrid {
    /// Geo coordinate of the center of output pixel (`col`, `row`).
    fn pixel_center(&self, col: usize, row: usize) -> Coord {
        Coord {
            x: self.top_left.x + (col as f64 + 0.5) * self.pixel_size,
            y: self.top_left.y - (row as f64 + 0.5) * self.pixel_size,
        }
    }

    /// Geo corners of the whole grid.
    pub fn corners(&self) -> [Coord; 4] {
        let size = self.pixel_size * self.img_size as f64;
        let (x, y) = self.top_left.x_y();
        [
            Coord { x, y },
            Coord { x: x + size, y },
            Coord { x, y: y - size },
            Coord {
                x: x + size,
                y: y - size,
            },
        ]
    }
}

/// Resamples one band of a [ReadWindow] buffer onto an [OutputGrid].
pub struct BandSampler<'a> {
    pub buffer: &'a [f64],
    pub window: ReadWindow,
    pub raster_size: (usize, usize),
    pub no_data: Option<f64>,
    pub geo_to_pixel: GeoPixelTransform,
}

impl BandSampler<'_> {
    fn is_no_data(&self, value: f64) -> bool {
        value.is_nan() || self.no_data == Some(value)
    }

    fn at(&self, x: usize, y: usize) -> Option<f64> {
        let value = self.buffer[y * self.window.buffer_size.0 + x];
        (!self.is_no_data(value)).then_some(value)
    }

    fn nearest(&self, buffer: Coord) -> Option<f64> {
        let (width, height) = self.window.buffer_size;
        let x = (buffer.x.floor().max(0.0) as usize).min(width - 1);
        let y = (buffer.y.floor().max(0.0) as usize).min(height - 1);
        self.at(x, y)
    }

    /// Blend of the four surrounding pixel centers. No-data neighbours are left
    /// out and the remaining weights renormalised.
    fn bilinear(&self, buffer: Coord) -> Option<f64> {
        let (width, height) = self.window.buffer_size;
        let fx = buffer.x - 0.5;
        let fy = buffer.y - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let clamp = |value: f64, len: usize| (value.max(0.0) as usize).min(len - 1);

        let neighbours = [
            (x0, y0, (1.0 - tx) * (1.0 - ty)),
            (x0 + 1.0, y0, tx * (1.0 - ty)),
            (x0, y0 + 1.0, (1.0 - tx) * ty),
            (x0 + 1.0, y0 + 1.0, tx * ty),
        ];
        let (sum, weight) = neighbours
            .iter()
            .filter(|(_, _, weight)| *weight > 0.0)
            .filter_map(|&(x, y, weight)| {
                self.at(clamp(x, width), clamp(y, height))
                    .map(|value| (value * weight, weight))
            })
            .fold((0.0, 0.0), |acc, item| (acc.0 + item.0, acc.1 + item.1));
        (weight > 0.0).then(|| sum / weight)
    }

    fn sample(&self, geo: Coord, interpolation: Interpolation) -> Option<f64> {
        let pixel = self.geo_to_pixel.geo_to_pixel(geo);
        let (width, height) = self.raster_size;
        if pixel.x < 0.0 || pixel.y < 0.0 || pixel.x >= width as f64 || pixel.y >= height as f64 {
            return None;
        }
        let buffer = self.window.to_buffer(pixel);
        match interpolation {
            Interpolation::Nearest => self.nearest(buffer),
            Interpolation::Bilinear => self.bilinear(buffer),
        }
    }

    /// Row-major `img_size²` samples, NaN where there is no data.
    pub fn resample(&self, grid: &OutputGrid, interpolation: Interpolation) -> Vec<f64> {
        let mut output = vec![f64::NAN; grid.img_size * grid.img_size];
        output
            .par_chunks_mut(grid.img_size)
            .enumerate()
            .for_each(|(row, row_buffer)| {
                for (col, value) in row_buffer.iter_mut().enumerate() {
                    if let Some(sample) = self.sample(grid.pixel_center(col, row), interpolation) {
                        *value = sample;
                    }
                }
            });
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::transforms::PixelGeoTransform;
    use rstest::rstest;

    fn sampler(buffer: &[f64], size: (usize, usize), no_data: Option<f64>) -> BandSampler<'_> {
        BandSampler {
            buffer,
            window: ReadWindow {
                offset: (0, 0),
                size,
                buffer_size: size,
            },
            raster_size: size,
            no_data,
            geo_to_pixel: PixelGeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
                .inverse()
                .unwrap(),
        }
    }

    #[test]
    fn covering_window_rounds_outwards() {
        let bounds = Rect::new(Coord { x: 1.2, y: 3.7 }, Coord { x: 4.1, y: 5.0 });
        let window = ReadWindow::covering(&bounds, 1.0);
        assert_eq!(window.offset, (1, 3));
        assert_eq!(window.size, (4, 2));
        assert_eq!(window.buffer_size, (4, 2));
    }

    #[test]
    fn covering_window_caps_buffer() {
        let bounds = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1000.0, y: 10.0 });
        let window = ReadWindow::covering(&bounds, 0.064);
        assert_eq!(window.buffer_size, (64, 1));
        let buffer = window.to_buffer(Coord { x: 500.0, y: 5.0 });
        assert_eq!(buffer, Coord { x: 32.0, y: 0.5 });
    }

    #[rstest]
    #[case(Interpolation::Nearest, 0.5, 0.5, Some(0.0))]
    #[case(Interpolation::Nearest, 1.9, 0.1, Some(1.0))]
    #[case(Interpolation::Bilinear, 1.0, 0.5, Some(0.5))]
    #[case(Interpolation::Bilinear, 1.0, 1.0, Some(1.5))]
    #[case(Interpolation::Nearest, 2.5, 0.5, None)]
    fn samples_buffer(
        #[case] interpolation: Interpolation,
        #[case] x: f64,
        #[case] y: f64,
        #[case] expected: Option<f64>,
    ) {
        let buffer = [0.0, 1.0, 2.0, 3.0];
        let sampler = sampler(&buffer, (2, 2), None);
        assert_eq!(sampler.sample(Coord { x, y: -y }, interpolation), expected);
    }

    #[test]
    fn bilinear_skips_no_data() {
        let buffer = [-9999.0, 2.0, 2.0, 2.0];
        let sampler = sampler(&buffer, (2, 2), Some(-9999.0));
        assert_eq!(
            sampler.sample(Coord { x: 1.0, y: -1.0 }, Interpolation::Bilinear),
            Some(2.0)
        );
        assert_eq!(
            sampler.sample(Coord { x: 0.5, y: -0.5 }, Interpolation::Nearest),
            None
        );
    }

    #[test]
    fn resample_fills_grid_rows() {
        let buffer = [0.0, 1.0, 2.0, 3.0];
        let sampler = sampler(&buffer, (2, 2), None);
        let grid = OutputGrid {
            top_left: Coord { x: 0.0, y: 0.0 },
            pixel_size: 1.0,
            img_size: 2,
        };
        assert_eq!(
            sampler.resample(&grid, Interpolation::Nearest),
            vec![0.0, 1.0, 2.0, 3.0]
        );
    }
}
