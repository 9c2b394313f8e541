mod aabb;
mod ray_box_intersection;
mod ray_triangle_intersection;
mod triangle;
pub mod wireframe;

pub use aabb::AABB;
pub use ray_box_intersection::RayIntersectionExt;
pub use triangle::Triangle;

use assert2::debug_assert;

pub type FloatType = f32;
pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;

/// Rays closer to parallel with a triangle's plane than this never hit it.
pub const PARALLEL_EPSILON: FloatType = 1e-5;

/// Triangle hits closer to the ray origin than this are discarded.
pub const MIN_HIT_DISTANCE: FloatType = 5e-4;

/// Boxes are grown by this fraction of the largest coordinate magnitude in the slab test
/// before tree traversal tests them, so that hits lying exactly on a box surface
/// (shared edges and vertices, flat boxes) are not culled by rounding.
pub const BOX_PADDING: FloatType = 1e-5;

/// Triangles whose unnormalized normal is shorter than this are degenerate.
pub const DEGENERATE_EPSILON: FloatType = 1e-12;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in the order used for tie breaking.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    pub origin: WorldPoint,
    /// Normalized direction of the ray
    pub direction: WorldVector,

    /// Componentwise inverse of the ray direction
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero
    pub inv_direction: WorldVector,
}

impl Ray {
    /// Creates a new ray, normalizing the direction. Direction must be non-zero.
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        debug_assert!(direction.norm_squared() > 0.0);
        let direction = direction.normalize();
        let inv_direction = direction.map(|x| if x == 0.0 { FloatType::INFINITY } else { 1.0 / x });

        Ray {
            origin,
            direction,
            inv_direction,
        }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }
}
