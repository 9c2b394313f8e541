use super::{
    DEGENERATE_EPSILON, FloatType, MIN_HIT_DISTANCE, PARALLEL_EPSILON, Ray, Triangle, WorldPoint,
    WorldVector,
};

impl Triangle<WorldPoint> {
    /// Calculates ray intersection with the (two sided) triangle.
    /// Returns distance along the ray and unit geometric normal turned towards the ray origin.
    ///
    /// Intersects the ray with the triangle's plane first, then checks that the plane hit
    /// lies on the same side of all three edges.
    /// Degenerate triangles, rays parallel to the plane and hits closer than
    /// `MIN_HIT_DISTANCE` are all reported as misses.
    pub fn intersect(&self, ray: &Ray) -> Option<(FloatType, WorldVector)> {
        let normal = self.normal().try_normalize(DEGENERATE_EPSILON)?;
        let normal = if normal.dot(&ray.direction) > 0.0 {
            -normal
        } else {
            normal
        };

        let n_dot_d = normal.dot(&ray.direction);
        if n_dot_d.abs() < PARALLEL_EPSILON {
            return None;
        }

        let t = (normal.dot(&self[0].coords) - ray.origin.coords.dot(&normal)) / n_dot_d;
        if t.is_nan() || t < MIN_HIT_DISTANCE {
            return None;
        }

        let p = ray.point_at(t);
        let side = self
            .edge_endpoints()
            .map(|(a, b)| (b - a).cross(&(p - a)).dot(&normal));

        if side.iter().all(|s| *s >= 0.0) || side.iter().all(|s| *s <= 0.0) {
            Some((t, normal))
        } else {
            None
        }
    }
}
