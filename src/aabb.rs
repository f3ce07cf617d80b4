use nalgebra::{Point3, Vector3};

/// Axis-aligned bounding box, used both for the raycasting/physics-adjacent
/// helpers elsewhere in this crate's lineage and, here, for column/frustum
/// culling math.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Aabb { min, max }
    }

    pub fn from_min_size(min: Point3<f32>, size: Vector3<f32>) -> Self {
        Aabb {
            min,
            max: min + size,
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn contains_point(&self, p: Point3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// The eight corners, in no particular winding order; used by the frustum
    /// test's "positive vertex" trick via [`Aabb::positive_vertex`] instead in
    /// the hot path, but kept around for tests and debug visualization.
    pub fn corners(&self) -> [Point3<f32>; 8] {
        [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// The corner most in the direction of `normal` — the "positive vertex"
    /// used by the Gribb-Hartmann plane test in `render::frustum`.
    pub fn positive_vertex(&self, normal: Vector3<f32>) -> Point3<f32> {
        Point3::new(
            if normal.x >= 0.0 { self.max.x } else { self.min.x },
            if normal.y >= 0.0 { self.max.y } else { self.min.y },
            if normal.z >= 0.0 { self.max.z } else { self.min.z },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;

    #[test]
    fn union_grows_to_cover_both() {
        let a = Aabb::new(point![0.0, 0.0, 0.0], point![1.0, 1.0, 1.0]);
        let b = Aabb::new(point![0.5, -1.0, 2.0], point![2.0, 0.5, 3.0]);
        let u = a.union(&b);
        assert_eq!(u.min, point![0.0, -1.0, 0.0]);
        assert_eq!(u.max, point![2.0, 1.0, 3.0]);
    }

    #[test]
    fn intersects_detects_separation() {
        let a = Aabb::new(point![0.0, 0.0, 0.0], point![1.0, 1.0, 1.0]);
        let b = Aabb::new(point![2.0, 2.0, 2.0], point![3.0, 3.0, 3.0]);
        assert!(!a.intersects(&b));
        let c = Aabb::new(point![0.5, 0.5, 0.5], point![1.5, 1.5, 1.5]);
        assert!(a.intersects(&c));
    }
}
