//! The Frustum Culler: extracts six clip-space planes from a
//! projection*view matrix via the standard Gribb-Hartmann construction, and
//! tests a column's AABB against them. An AABB is excluded only if all eight
//! corners lie outside one single plane; materializing the six [`Plane`]
//! equations explicitly (rather than an inline per-corner test) lets a
//! caller or test exercise the frustum on its own (DESIGN.md).

use nalgebra::{Matrix4, Vector3};

use crate::aabb::Aabb;

/// A plane `a*x + b*y + c*z + d = 0`; "inside" is `a*x + b*y + c*z + d >= 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Plane {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl Plane {
    fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        let len = (a * a + b * b + c * c).sqrt();
        if len == 0.0 {
            return Plane { a, b, c, d };
        }
        Plane {
            a: a / len,
            b: b / len,
            c: c / len,
            d: d / len,
        }
    }

    pub fn normal(self) -> Vector3<f32> {
        Vector3::new(self.a, self.b, self.c)
    }

    pub fn signed_distance(self, x: f32, y: f32, z: f32) -> f32 {
        self.a * x + self.b * y + self.c * z + self.d
    }
}

/// The six frustum planes, in this fixed order.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    pub left: Plane,
    pub right: Plane,
    pub bottom: Plane,
    pub top: Plane,
    pub near: Plane,
    pub far: Plane,
}

impl Frustum {
    pub fn planes(&self) -> [Plane; 6] {
        [self.left, self.right, self.bottom, self.top, self.near, self.far]
    }
}

/// Extracts the six frustum planes from `clip = projection * view`, via the
/// standard Gribb-Hartmann construction: plane `i` (for a column-vector
/// convention, `clip_pos = clip * world_pos`) is built from a signed
/// combination of the matrix's row 4 (the `w` row) with rows 1-3.
pub fn extract_planes(clip: &Matrix4<f32>) -> Frustum {
    let row = |i: usize| (clip[(i, 0)], clip[(i, 1)], clip[(i, 2)], clip[(i, 3)]);
    let (r0a, r0b, r0c, r0d) = row(0);
    let (r1a, r1b, r1c, r1d) = row(1);
    let (r2a, r2b, r2c, r2d) = row(2);
    let (r3a, r3b, r3c, r3d) = row(3);

    Frustum {
        left: Plane::new(r3a + r0a, r3b + r0b, r3c + r0c, r3d + r0d),
        right: Plane::new(r3a - r0a, r3b - r0b, r3c - r0c, r3d - r0d),
        bottom: Plane::new(r3a + r1a, r3b + r1b, r3c + r1c, r3d + r1d),
        top: Plane::new(r3a - r1a, r3b - r1b, r3c - r1c, r3d - r1d),
        near: Plane::new(r3a + r2a, r3b + r2b, r3c + r2c, r3d + r2d),
        far: Plane::new(r3a - r2a, r3b - r2b, r3c - r2c, r3d - r2d),
    }
}

/// Tests `aabb` against every plane by forming its "positive vertex" (the
/// corner furthest along each plane's normal); if that vertex is outside
/// any single plane, the whole box is outside. Otherwise the box is either
/// fully inside or straddling the frustum, both of which count as visible.
pub fn intersects_aabb(aabb: &Aabb, frustum: &Frustum) -> bool {
    for plane in frustum.planes() {
        let p = aabb.positive_vertex(plane.normal());
        if plane.signed_distance(p.x, p.y, p.z) < 0.0 {
            return false;
        }
    }
    true
}
