use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::components::transforms::PixelGeoTransform;

/// Bounding box of a raster in projected meters.
///
/// The vertical axis is down-positive: `top` is the negated northern edge and
/// `bottom` the negated southern edge, so `right >= left` and
/// `bottom >= top` hold for every raster regardless of its pixel orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Extent {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Extent {
    /// Extent covered by a `size` (columns, rows) pixel grid.
    pub fn from_transform(transform: &PixelGeoTransform, size: (usize, usize)) -> Self {
        let (width, height) = (size.0 as f64, size.1 as f64);
        let corners = [(0., 0.), (width, 0.), (0., height), (width, height)]
            .map(|(x, y)| transform.pixel_to_geo(Coord { x, y }));
        let rect = corners[1..].iter().fold(
            Rect::new(corners[0], corners[0]),
            |rect, corner| {
                Rect::new(
                    Coord {
                        x: rect.min().x.min(corner.x),
                        y: rect.min().y.min(corner.y),
                    },
                    Coord {
                        x: rect.max().x.max(corner.x),
                        y: rect.max().y.max(corner.y),
                    },
                )
            },
        );
        Self::from_projected_rect(rect)
    }

    pub fn from_projected_rect(rect: Rect) -> Self {
        Self {
            left: rect.min().x,
            top: -rect.max().y,
            right: rect.max().x,
            bottom: -rect.min().y,
        }
    }

    /// North-up rect in projected coordinates.
    pub fn to_projected_rect(&self) -> Rect {
        Rect::new(
            Coord {
                x: self.left,
                y: -self.bottom,
            },
            Coord {
                x: self.right,
                y: -self.top,
            },
        )
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    /// Center in the same down-positive convention as the extent.
    pub fn center(&self) -> Coord {
        Coord {
            x: self.left + self.width() / 2.0,
            y: self.top + self.height() / 2.0,
        }
    }

    /// Whether the projected point (`y` as northing) lies inside the extent.
    pub fn contains_projected(&self, x: f64, y: f64) -> bool {
        (self.left..=self.right).contains(&x) && (self.top..=self.bottom).contains(&-y)
    }
}
