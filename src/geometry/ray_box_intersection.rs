use super::{BOX_PADDING, FloatType, Ray, WorldBox, WorldVector};

pub trait RayIntersectionExt {
    /// Calculate first and last ray intersection with the box
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType);

    /// Part of the ray that lies inside the box, clamped to start at the ray origin.
    /// None if the ray misses the box or the box is behind the ray.
    fn hit_interval(&self, ray: &Ray) -> Option<(FloatType, FloatType)> {
        let (t1, t2) = self.intersect(ray);
        if t2 < t1 || t2 <= 0.0 {
            None
        } else {
            Some((t1.max(0.0), t2))
        }
    }

    /// Distance along the ray to the box.
    /// This is the entry distance if the box is in front of the ray origin,
    /// or the exit distance if the origin is inside the box.
    /// None if the ray misses the box or the box is behind the ray.
    fn hit_distance(&self, ray: &Ray) -> Option<FloatType> {
        let (t1, t2) = self.intersect(ray);
        if t2 < t1 {
            return None;
        }
        let distance = if t1 > 0.0 { t1 } else { t2 };
        if distance > 0.0 { Some(distance) } else { None }
    }
}

impl RayIntersectionExt for WorldBox {
    /// Returns minimum and maximum distance along the ray, ray intersects if min <= max.
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        if self.is_empty() {
            return (FloatType::INFINITY, FloatType::NEG_INFINITY);
        }

        // Componentwise distances along the ray to the box's min and max corners
        // The multiplication is NAN if the ray is starting inside the slab bounding plane
        // and is parallel to it. In this case we blend to +-infinity, so that the range becomes infinite
        let to_box_min = (self.min - ray.origin)
            .component_mul(&ray.inv_direction)
            .map(|x| if x.is_nan() { FloatType::NEG_INFINITY } else { x });
        let to_box_max = (self.max - ray.origin)
            .component_mul(&ray.inv_direction)
            .map(|x| if x.is_nan() { FloatType::INFINITY } else { x });

        // Correctly ordered (min_t <= max_t)
        let componentwise_min_t = to_box_min.zip_map(&to_box_max, FloatType::min);
        let componentwise_max_t = to_box_min.zip_map(&to_box_max, FloatType::max);

        let min_t = componentwise_min_t
            .x
            .max(componentwise_min_t.y.max(componentwise_min_t.z));
        let max_t = componentwise_max_t
            .x
            .min(componentwise_max_t.y.min(componentwise_max_t.z));

        (min_t, max_t)
    }
}

impl WorldBox {
    /// Box grown on all sides by `BOX_PADDING` times the largest coordinate magnitude of
    /// the box and the ray origin.
    /// Slab test of the padded box never rejects a ray whose computed hit point lies
    /// on the surface of the original box. Empty boxes stay empty.
    pub fn padded_for(&self, ray: &Ray) -> WorldBox {
        if self.is_empty() {
            return *self;
        }

        let magnitude = self
            .min
            .coords
            .amax()
            .max(self.max.coords.amax())
            .max(ray.origin.coords.amax());
        let padding = WorldVector::repeat(BOX_PADDING * (1.0 + magnitude));

        WorldBox::new(self.min - padding, self.max + padding)
    }
}
