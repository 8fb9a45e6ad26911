use geo::{Coord, CoordNum, Rect};

/// Closed-set intersection.
///
/// Shapes that only touch still intersect, the result is then degenerate
/// (zero width or height).
pub trait Intersection {
    type Output;
    fn intersection(&self, rhs: &Self) -> Option<Self::Output>;

    fn intersects(&self, rhs: &Self) -> bool {
        self.intersection(rhs).is_some()
    }
}

fn partial_max<T: PartialOrd>(lhs: T, rhs: T) -> T {
    if lhs > rhs {
        lhs
    } else {
        rhs
    }
}

fn partial_min<T: PartialOrd>(lhs: T, rhs: T) -> T {
    if lhs < rhs {
        lhs
    } else {
        rhs
    }
}

impl<T: CoordNum> Intersection for Rect<T> {
    type Output = Rect<T>;
    fn intersection(&self, rhs: &Self) -> Option<Rect<T>> {
        let (lhs_min, lhs_max) = (self.min(), self.max());
        let (rhs_min, rhs_max) = (rhs.min(), rhs.max());
        if (lhs_max.x < rhs_min.x) | (lhs_max.y < rhs_min.y) {
            return None;
        }
        if (lhs_min.x > rhs_max.x) | (lhs_min.y > rhs_max.y) {
            return None;
        }

        let min = Coord {
            x: partial_max(lhs_min.x, rhs_min.x),
            y: partial_max(lhs_min.y, rhs_min.y),
        };
        let max = Coord {
            x: partial_min(lhs_max.x, rhs_max.x),
            y: partial_min(lhs_max.y, rhs_max.y),
        };
        Some(Rect::new(min, max))
    }
}
