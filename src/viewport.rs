use bevy::prelude::*;
use mallet_geometry::Ray;

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 1000.0;

/// Which half of the scene a viewport manipulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportKind {
    /// Regular 3D view.
    World,
    /// 2D canvas view; picks only canvas elements.
    Canvas,
}

#[derive(Clone, Copy, Debug)]
pub enum ViewportProjection {
    Perspective { fov_y: f32 },
    Orthographic { height: f32 },
}

/// Camera state of the active viewport, kept as plain math so rays and
/// screen projections work without a render camera.
#[derive(Resource, Clone, Debug)]
pub struct EditorViewport {
    pub size: Vec2,
    pub camera: Transform,
    pub projection: ViewportProjection,
    pub kind: ViewportKind,
    pub focused: bool,
    /// Last known cursor position in viewport pixels, y down.
    pub cursor: Vec2,
}

impl Default for EditorViewport {
    fn default() -> Self {
        Self {
            size: Vec2::new(1280.0, 720.0),
            camera: Transform::from_xyz(0.0, 5.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
            projection: ViewportProjection::Perspective { fov_y: 45.0_f32.to_radians() },
            kind: ViewportKind::World,
            focused: true,
            cursor: Vec2::ZERO,
        }
    }
}

impl EditorViewport {
    pub fn aspect(&self) -> f32 {
        self.size.x / self.size.y.max(1.0)
    }

    fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            ViewportProjection::Perspective { fov_y } => {
                Mat4::perspective_rh(fov_y, self.aspect(), NEAR_PLANE, FAR_PLANE)
            }
            ViewportProjection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * self.aspect();
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, NEAR_PLANE, FAR_PLANE)
            }
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.camera.to_matrix().inverse()
    }

    /// Unproject a viewport pixel into a world-space ray.
    pub fn ray_from_screen(&self, point: Vec2) -> Ray {
        let ndc = Vec2::new(
            point.x / self.size.x * 2.0 - 1.0,
            1.0 - point.y / self.size.y * 2.0,
        );
        let inv = self.view_projection().inverse();
        let near = inv.project_point3(ndc.extend(0.0));
        let mid = inv.project_point3(ndc.extend(0.6));
        Ray::new(near, (mid - near).normalize())
    }

    pub fn ray_at_cursor(&self) -> Ray {
        self.ray_from_screen(self.cursor)
    }

    /// Project a world point to viewport pixels. `None` behind the camera.
    pub fn world_to_screen(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.view_projection() * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.size.x,
            (1.0 - ndc.y) * 0.5 * self.size.y,
        ))
    }

    pub fn center(&self) -> Vec2 {
        self.size * 0.5
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
