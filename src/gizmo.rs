use bevy::prelude::*;
use mallet_geometry::{BoundingBox, Ray, ray_box_intersection, ray_sphere_intersection};

/// Handles within 5 degrees of the view direction are unusable and lock.
pub const AXIS_LOCK_COS: f32 = 0.996_194_7; // cos(5°)
pub const PLANE_LOCK_SIN: f32 = 0.087_155_74; // sin(5°)

const SHAFT_LENGTH: f32 = 1.15;
const SHAFT_HALF: f32 = 0.08;
const QUAD_NEAR: f32 = 0.25;
const QUAD_FAR: f32 = 0.65;
const QUAD_HALF: f32 = 0.03;
const RING_RADIUS: f32 = 1.0;
const RING_SEGMENTS: usize = 36;
const RING_HALF: f32 = 0.05;
const MASK_SPHERE_RADIUS: f32 = 0.95;

// ---------------------------------------------------------------------------
// Axis labels
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisLabel {
    X,
    Y,
    Z,
    XY,
    YZ,
    ZX,
}

impl AxisLabel {
    pub const AXES: [AxisLabel; 3] = [AxisLabel::X, AxisLabel::Y, AxisLabel::Z];
    pub const PLANES: [AxisLabel; 3] = [AxisLabel::XY, AxisLabel::YZ, AxisLabel::ZX];

    pub fn is_plane(self) -> bool {
        matches!(self, AxisLabel::XY | AxisLabel::YZ | AxisLabel::ZX)
    }

    /// Frame index of a single axis, or of a plane's normal.
    pub fn normal_index(self) -> usize {
        match self {
            AxisLabel::X | AxisLabel::YZ => 0,
            AxisLabel::Y | AxisLabel::ZX => 1,
            AxisLabel::Z | AxisLabel::XY => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GizmoKind {
    Translate,
    Rotate,
    Scale,
}

/// Frame the gizmo aligns to. Scale gestures always use the local frame.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransformSpace {
    #[default]
    Global,
    Parent,
    Local,
}

// ---------------------------------------------------------------------------
// Gizmo
// ---------------------------------------------------------------------------

/// The manipulation gizmo of the active transform mode: a posed orthonormal
/// frame plus hover/grab/lock state. Hit testing is analytic; rendering the
/// handles is the host's job.
#[derive(Resource, Clone, Debug)]
pub struct TransformGizmo {
    pub kind: GizmoKind,
    pub origin: Vec3,
    pub axes: [Vec3; 3],
    pub hovered: Option<AxisLabel>,
    pub grabbed: Option<AxisLabel>,
    locked: Vec<AxisLabel>,
}

impl TransformGizmo {
    pub fn new(kind: GizmoKind) -> Self {
        Self {
            kind,
            origin: Vec3::ZERO,
            axes: [Vec3::X, Vec3::Y, Vec3::Z],
            hovered: None,
            grabbed: None,
            locked: Vec::new(),
        }
    }

    /// World direction of a single-axis handle, or a plane handle's normal.
    pub fn axis(&self, label: AxisLabel) -> Vec3 {
        self.axes[label.normal_index()]
    }

    pub fn is_locked(&self, label: AxisLabel) -> bool {
        self.locked.contains(&label)
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed.is_some()
    }

    /// Recompute the locked set for a view direction: single axes lock when
    /// nearly parallel to the view, planes when nearly edge-on.
    pub fn update_locks(&mut self, view_dir: Vec3) {
        self.locked.clear();
        for label in AxisLabel::AXES {
            if view_dir.dot(self.axis(label)).abs() > AXIS_LOCK_COS {
                self.locked.push(label);
            }
        }
        for label in AxisLabel::PLANES {
            if view_dir.dot(self.axis(label)).abs() < PLANE_LOCK_SIN {
                self.locked.push(label);
            }
        }
    }

    fn to_local(&self) -> Mat4 {
        Mat4::from_cols(
            self.axes[0].extend(0.0),
            self.axes[1].extend(0.0),
            self.axes[2].extend(0.0),
            self.origin.extend(1.0),
        )
        .inverse()
    }

    /// Nearest unlocked handle under the ray.
    pub fn hit_test(&self, ray: &Ray) -> Option<AxisLabel> {
        let local_ray = ray.transformed(self.to_local());
        let mut best: Option<(f32, AxisLabel)> = None;
        let mut consider = |t: f32, label: AxisLabel| {
            if best.is_none_or(|(bt, _)| t < bt) {
                best = Some((t, label));
            }
        };

        match self.kind {
            GizmoKind::Translate | GizmoKind::Scale => {
                for label in AxisLabel::AXES {
                    if self.is_locked(label) {
                        continue;
                    }
                    if let Some(t) = ray_box_intersection(&local_ray, &shaft_box(label)) {
                        consider(t, label);
                    }
                }
                if self.kind == GizmoKind::Translate {
                    for label in AxisLabel::PLANES {
                        if self.is_locked(label) {
                            continue;
                        }
                        if let Some(t) = ray_box_intersection(&local_ray, &quad_box(label)) {
                            consider(t, label);
                        }
                    }
                }
            }
            GizmoKind::Rotate => {
                // Segment hits beyond the masking sphere lie on the far side
                // of the ring and are ignored.
                let mask = ray_sphere_intersection(&local_ray, Vec3::ZERO, MASK_SPHERE_RADIUS);
                for label in AxisLabel::AXES {
                    if self.is_locked(label) {
                        continue;
                    }
                    for center in ring_points(label) {
                        let bb = BoundingBox::new(
                            center - Vec3::splat(RING_HALF),
                            center + Vec3::splat(RING_HALF),
                        );
                        if let Some(t) = ray_box_intersection(&local_ray, &bb) {
                            if mask.is_some_and(|ts| t > ts) {
                                continue;
                            }
                            consider(t, label);
                        }
                    }
                }
            }
        }
        best.map(|(_, label)| label)
    }

    /// Tangent of the grabbed ring at a world point, used to convert drag
    /// deltas into angles.
    pub fn ring_tangent(&self, label: AxisLabel, at: Vec3) -> Vec3 {
        let radial = (at - self.origin).normalize_or_zero();
        self.axis(label).cross(radial).normalize_or_zero()
    }
}

fn shaft_box(label: AxisLabel) -> BoundingBox {
    let mut min = Vec3::splat(-SHAFT_HALF);
    let mut max = Vec3::splat(SHAFT_HALF);
    let i = label.normal_index();
    min[i] = SHAFT_HALF;
    max[i] = SHAFT_LENGTH;
    BoundingBox::new(min, max)
}

fn quad_box(label: AxisLabel) -> BoundingBox {
    let normal = label.normal_index();
    let mut min = Vec3::splat(QUAD_NEAR);
    let mut max = Vec3::splat(QUAD_FAR);
    min[normal] = -QUAD_HALF;
    max[normal] = QUAD_HALF;
    BoundingBox::new(min, max)
}

fn ring_points(label: AxisLabel) -> impl Iterator<Item = Vec3> {
    let normal = label.normal_index();
    let u = (normal + 1) % 3;
    let v = (normal + 2) % 3;
    (0..RING_SEGMENTS).map(move |i| {
        let theta = i as f32 / RING_SEGMENTS as f32 * std::f32::consts::TAU;
        let mut p = Vec3::ZERO;
        p[u] = theta.cos() * RING_RADIUS;
        p[v] = theta.sin() * RING_RADIUS;
        p
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
