use bevy::prelude::*;

pub const EPSILON: f32 = 1e-5;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A ray with an unconstrained direction. Callers are expected to pass a
/// normalized direction when they care about `t` being a distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ray {
    pub position: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(position: Vec3, direction: Vec3) -> Self {
        Self { position, direction }
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        self.position + self.direction * t
    }

    /// Transform the ray into another space. Direction length is preserved
    /// relative to the matrix scale, so `t` values stay comparable after
    /// transforming back.
    pub fn transformed(&self, mat: Mat4) -> Self {
        Self {
            position: mat.transform_point3(self.position),
            direction: mat.transform_vector3(self.direction),
        }
    }
}

/// Plane in `dot(normal, p) == d` form.
#[derive(Clone, Copy, Debug, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self { normal, d: normal.dot(point) }
    }

    /// Plane through three counter-clockwise points.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let normal = (b - a).cross(c - a).normalize();
        Self { normal, d: normal.dot(a) }
    }
}

/// Axis-aligned box used for coarse hit testing.
#[derive(Clone, Copy, Debug)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            Vec3::new(mn.x, mn.y, mn.z),
            Vec3::new(mx.x, mn.y, mn.z),
            Vec3::new(mx.x, mx.y, mn.z),
            Vec3::new(mn.x, mx.y, mn.z),
            Vec3::new(mn.x, mn.y, mx.z),
            Vec3::new(mx.x, mn.y, mx.z),
            Vec3::new(mx.x, mx.y, mx.z),
            Vec3::new(mn.x, mx.y, mx.z),
        ]
    }

    /// World-space box enclosing this box under an affine transform.
    pub fn transformed(&self, mat: Mat4) -> Self {
        let mut min = Vec3::INFINITY;
        let mut max = Vec3::NEG_INFINITY;
        for corner in self.corners() {
            let p = mat.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self { min: Vec3::splat(-0.5), max: Vec3::splat(0.5) }
    }
}

/// Six inward-facing planes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Build a frustum from eight corners laid out as:
    /// 0..3 near plane (top-left, top-right, bottom-right, bottom-left),
    /// 4..7 far plane in the same winding.
    pub fn from_corners(c: [Vec3; 8]) -> Self {
        // Fixed corner triples; each yields an inward normal.
        let planes = [
            Plane::from_points(c[0], c[7], c[4]), // left
            Plane::from_points(c[5], c[6], c[1]), // right
            Plane::from_points(c[4], c[5], c[0]), // top
            Plane::from_points(c[3], c[6], c[7]), // bottom
            Plane::from_points(c[0], c[1], c[3]), // near
            Plane::from_points(c[7], c[5], c[4]), // far
        ];
        Self { planes }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntersectResult {
    Inside,
    Intersect,
    Outside,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Slab-method ray vs AABB. Returns the entry distance, 0 when the ray
/// starts inside. `None` when the ray misses or the box is fully behind.
pub fn ray_box_intersection(ray: &Ray, bb: &BoundingBox) -> Option<f32> {
    let inv = ray.direction.recip();
    let t0 = (bb.min - ray.position) * inv;
    let t1 = (bb.max - ray.position) * inv;
    let tmin = t0.min(t1).max_element();
    let tmax = t0.max(t1).min_element();
    if tmax < 0.0 || tmin > tmax {
        return None;
    }
    Some(tmin.max(0.0))
}

/// Nearest intersection of a ray with a sphere, if any in front of the ray.
pub fn ray_sphere_intersection(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.position - center;
    let a = ray.direction.dot(ray.direction);
    let b = 2.0 * oc.dot(ray.direction);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / (2.0 * a);
    (t >= 0.0).then_some(t)
}

/// Intersection of the infinite line carrying `ray` with a plane.
/// Negative `t` is a valid answer; `None` only when the line is parallel.
pub fn line_plane_intersection(ray: &Ray, plane: &Plane) -> Option<f32> {
    let denom = plane.normal.dot(ray.direction);
    if denom.abs() < EPSILON {
        return None;
    }
    Some(-(plane.normal.dot(ray.position) - plane.d) / denom)
}

/// Ray vs plane restricted to front-facing hits at `t >= 0`.
pub fn ray_plane_intersection(ray: &Ray, plane: &Plane) -> Option<f32> {
    let denom = plane.normal.dot(ray.direction);
    if denom >= -EPSILON {
        return None;
    }
    let t = -(plane.normal.dot(ray.position) - plane.d) / denom;
    (t >= 0.0).then_some(t)
}

/// Classify an AABB against a frustum via the p-vertex / n-vertex test.
/// Conservative: boxes near an edge may report `Intersect` on a miss.
pub fn frustum_box_intersection(frustum: &Frustum, bb: &BoundingBox) -> IntersectResult {
    let mut result = IntersectResult::Inside;
    for plane in &frustum.planes {
        let p = Vec3::new(
            if plane.normal.x >= 0.0 { bb.max.x } else { bb.min.x },
            if plane.normal.y >= 0.0 { bb.max.y } else { bb.min.y },
            if plane.normal.z >= 0.0 { bb.max.z } else { bb.min.z },
        );
        if plane.normal.dot(p) - plane.d < 0.0 {
            return IntersectResult::Outside;
        }
        let n = Vec3::new(
            if plane.normal.x >= 0.0 { bb.min.x } else { bb.max.x },
            if plane.normal.y >= 0.0 { bb.min.y } else { bb.max.y },
            if plane.normal.z >= 0.0 { bb.min.z } else { bb.max.z },
        );
        if plane.normal.dot(n) - plane.d < 0.0 {
            result = IntersectResult::Intersect;
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
