use geo::{AffineTransform, Coord};

use crate::errors::{GeodataError, Result};

/// GDAL ordered geo transform `[xoff, a, b, yoff, d, e]`.
pub type GeoTransformArray = [f64; 6];

/// Maps raster pixel coordinates to projected geo coordinates.
#[derive(Shrinkwrap, Debug, Clone, Copy)]
pub struct PixelGeoTransform(AffineTransform);

impl PixelGeoTransform {
    pub fn new(a: f64, b: f64, xoff: f64, d: f64, e: f64, yoff: f64) -> Self {
        Self(AffineTransform::new(a, b, xoff, d, e, yoff))
    }

    pub fn from_gdal(gdal_transform: GeoTransformArray) -> Self {
        Self::new(
            gdal_transform[1],
            gdal_transform[2],
            gdal_transform[0],
            gdal_transform[4],
            gdal_transform[5],
            gdal_transform[3],
        )
    }

    pub fn to_gdal(&self) -> GeoTransformArray {
        [
            self.xoff(),
            self.a(),
            self.b(),
            self.yoff(),
            self.d(),
            self.e(),
        ]
    }

    pub fn inverse(&self) -> Result<GeoPixelTransform> {
        self.0
            .inverse()
            .map(GeoPixelTransform)
            .ok_or(GeodataError::NotInvertible)
    }

    pub fn pixel_to_geo(&self, pixel: Coord) -> Coord {
        self.0.apply(pixel)
    }

    /// Pixel footprint in meters, `(width, height)`, ignoring rotation terms.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.a().abs(), self.e().abs())
    }
}

/// Maps projected geo coordinates to fractional raster pixel coordinates.
#[derive(Shrinkwrap, Debug, Clone, Copy)]
pub struct GeoPixelTransform(AffineTransform);

impl GeoPixelTransform {
    pub fn geo_to_pixel(&self, geo: Coord) -> Coord {
        self.0.apply(geo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gdal_order_round_trips() {
        let gdal_transform = [1546670.0, 5.0, 0.0, 5918250.0, 0.0, -5.0];
        let transform = PixelGeoTransform::from_gdal(gdal_transform);
        assert_eq!(transform.to_gdal(), gdal_transform);
        assert_eq!(transform.pixel_size(), (5.0, 5.0));
    }

    #[test]
    fn inverse_maps_back_to_pixels() {
        let transform = PixelGeoTransform::from_gdal([100.0, 2.0, 0.0, 50.0, 0.0, -2.0]);
        let geo = transform.pixel_to_geo(Coord { x: 3.0, y: 4.0 });
        assert_eq!(geo, Coord { x: 106.0, y: 42.0 });

        let pixel = transform.inverse().unwrap().geo_to_pixel(geo);
        assert!((pixel.x - 3.0).abs() < 1e-12);
        assert!((pixel.y - 4.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_transform_is_not_invertible() {
        let transform = PixelGeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            transform.inverse(),
            Err(GeodataError::NotInvertible)
        ));
    }
}
