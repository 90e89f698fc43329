use geo::{Coord, CoordNum, Rect};

use crate::errors::{GeodataError, Result};

pub trait Intersection {
    type Output;
    fn intersection(&self, rhs: &Self) -> Result<Self::Output>;
}

impl<T: CoordNum> Intersection for Rect<T> {
    type Output = Rect<T>;
    /// Rects that only touch along an edge have no intersection.
    fn intersection(&self, rhs: &Self) -> Result<Rect<T>> {
        let lhs_min = self.min();
        let lhs_max = self.max();
        let rhs_min = rhs.min();
        let rhs_max = rhs.max();
        if (lhs_max.x <= rhs_min.x) | (lhs_max.y <= rhs_min.y) {
            return Err(GeodataError::NoIntersection);
        }
        if (lhs_min.x >= rhs_max.x) | (lhs_min.y >= rhs_max.y) {
            return Err(GeodataError::NoIntersection);
        }

        let pick = |a: T, b: T, larger: bool| if (a > b) == larger { a } else { b };
        let min = Coord {
            x: pick(lhs_min.x, rhs_min.x, true),
            y: pick(lhs_min.y, rhs_min.y, true),
        };
        let max = Coord {
            x: pick(lhs_max.x, rhs_max.x, false),
            y: pick(lhs_max.y, rhs_max.y, false),
        };

        Ok(Self::new(min, max))
    }
}
