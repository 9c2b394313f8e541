use std::{borrow::Borrow, ops::Sub};

use nalgebra::{ClosedAddAssign, ClosedDivAssign, Point, Scalar};
use num_traits::One;

use super::{Axis, FloatType, Triangle, WorldBox, WorldPoint, WorldVector};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar + ClosedAddAssign + ClosedDivAssign + One, const D: usize> AABB<Point<T, D>> {
    pub fn center(&self) -> Point<T, D> {
        let two = T::one() + T::one();
        let avg_coords = (&self.min.coords + &self.max.coords) / two;
        Point::from(avg_coords)
    }
}

impl WorldBox {
    /// Box that contains nothing. Min corner is +inf, max corner is -inf, so
    /// extending it by any point yields a box containing exactly that point.
    pub fn empty() -> WorldBox {
        AABB {
            min: WorldPoint::from(WorldVector::repeat(FloatType::INFINITY)),
            max: WorldPoint::from(WorldVector::repeat(FloatType::NEG_INFINITY)),
        }
    }

    /// Returns bounding box of the points, or None if the iterator is empty.
    pub fn from_points(points: impl IntoIterator<Item = impl Borrow<WorldPoint>>) -> Option<WorldBox> {
        let mut b = WorldBox::empty();
        for p in points {
            b.extend_point(p.borrow());
        }
        if b.is_empty() { None } else { Some(b) }
    }

    pub fn is_empty(&self) -> bool {
        self.min.iter().zip(self.max.iter()).any(|(min, max)| min > max)
    }

    pub fn extend_point(&mut self, p: &WorldPoint) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn extend_triangle(&mut self, triangle: &Triangle<WorldPoint>) {
        for p in triangle.iter() {
            self.extend_point(p);
        }
    }

    pub fn union(&self, other: &WorldBox) -> WorldBox {
        AABB {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Surface area of the box, zero for empty and flat boxes.
    pub fn surface_area(&self) -> FloatType {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    /// Axis along which the box is the largest.
    /// Ties prefer X, then Y, then Z.
    pub fn longest_axis(&self) -> Axis {
        let d = self.size();
        if d.x >= d.y && d.x >= d.z {
            Axis::X
        } else if d.y >= d.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    pub fn contains_point(&self, p: &WorldPoint, tolerance: FloatType) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] - tolerance && p[i] <= self.max[i] + tolerance)
    }

    /// Componentwise comparison of the corners with tolerance
    pub fn approx_eq(&self, other: &WorldBox, tolerance: FloatType) -> bool {
        let close = |a: &WorldPoint, b: &WorldPoint| {
            a.iter()
                .zip(b.iter())
                .all(|(a, b)| a == b || (a - b).abs() <= tolerance * (1.0 + a.abs().max(b.abs())))
        };
        close(&self.min, &other.min) && close(&self.max, &other.max)
    }
}
