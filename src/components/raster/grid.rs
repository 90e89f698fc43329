use geo::{Coord, Rect};
use itertools::Itertools;

use crate::{
    components::{
        backends::NativeRaster,
        transforms::{GeoPixelTransform, PixelGeoTransform},
    },
    errors::Result,
    intersection::Intersection,
};

/// Pixel addressing of a bound raster, used by the write operations.
#[derive(Debug, Clone, Copy)]
pub struct PixelGrid {
    to_geo: PixelGeoTransform,
    to_pixel: GeoPixelTransform,
    size: (usize, usize),
}

/// Integer block of pixels, `(offset, size)`.
pub type PixelWindow = ((usize, usize), (usize, usize));

impl PixelGrid {
    pub fn of(raster: &dyn NativeRaster) -> Result<Self> {
        let to_geo = PixelGeoTransform::from_gdal(raster.geo_transform()?);
        Ok(Self {
            to_geo,
            to_pixel: to_geo.inverse()?,
            size: raster.size(),
        })
    }

    /// Pixel holding the projected point (`x`, `y`).
    pub fn containing(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let pixel = self.to_pixel.geo_to_pixel(Coord { x, y });
        let inside = pixel.x >= 0.0
            && pixel.y >= 0.0
            && pixel.x < self.size.0 as f64
            && pixel.y < self.size.1 as f64;
        inside.then(|| (pixel.x.floor() as usize, pixel.y.floor() as usize))
    }

    pub fn center(&self, col: usize, row: usize) -> Coord {
        self.to_geo.pixel_to_geo(Coord {
            x: col as f64 + 0.5,
            y: row as f64 + 0.5,
        })
    }

    /// Pixels touched by the projected `rect`, clipped to the raster.
    pub fn window(&self, rect: Rect) -> Option<PixelWindow> {
        let corners = [
            rect.min(),
            rect.max(),
            Coord {
                x: rect.min().x,
                y: rect.max().y,
            },
            Coord {
                x: rect.max().x,
                y: rect.min().y,
            },
        ]
        .map(|corner| self.to_pixel.geo_to_pixel(corner));
        let (min_x, max_x) = corners.iter().map(|corner| corner.x).minmax().into_option()?;
        let (min_y, max_y) = corners.iter().map(|corner| corner.y).minmax().into_option()?;
        let bounds = Rect::new(
            Coord { x: 0.0, y: 0.0 },
            Coord {
                x: self.size.0 as f64,
                y: self.size.1 as f64,
            },
        );
        let pixels = Rect::new(
            Coord {
                x: min_x.floor(),
                y: min_y.floor(),
            },
            Coord {
                x: max_x.ceil(),
                y: max_y.ceil(),
            },
        )
        .intersection(&bounds)
        .ok()?;
        let offset = (pixels.min().x as usize, pixels.min().y as usize);
        let size = (
            pixels.max().x as usize - offset.0,
            pixels.max().y as usize - offset.1,
        );
        Some((offset, size))
    }
}
