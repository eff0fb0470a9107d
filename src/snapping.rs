use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGrid, InfiniteGridSettings};
use serde::{Deserialize, Serialize};

use crate::scene::{GridEntity, SceneBounds, register_entity};

// ---------------------------------------------------------------------------
// Snap settings
// ---------------------------------------------------------------------------

#[derive(Resource, Clone, Copy, Serialize, Deserialize)]
pub struct SnapSettings {
    pub translate_snap: bool,
    pub translate_increment: f32,
    pub rotate_snap: bool,
    pub rotate_increment: f32,
    pub scale_snap: bool,
    pub scale_increment: f32,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            translate_snap: false,
            translate_increment: 0.25,
            rotate_snap: false,
            rotate_increment: 15.0_f32.to_radians(),
            scale_snap: false,
            scale_increment: 0.1,
        }
    }
}

impl SnapSettings {
    /// Check if translate snapping should be active (Ctrl held = toggle snap).
    pub fn translate_active(&self, ctrl_held: bool) -> bool {
        self.translate_snap ^ ctrl_held
    }

    pub fn rotate_active(&self, ctrl_held: bool) -> bool {
        self.rotate_snap ^ ctrl_held
    }

    pub fn scale_active(&self, ctrl_held: bool) -> bool {
        self.scale_snap ^ ctrl_held
    }

    /// Conditionally snap a translation vector based on Ctrl state.
    pub fn snap_translate_vec3_if(&self, v: Vec3, ctrl_held: bool) -> Vec3 {
        if self.translate_active(ctrl_held) && self.translate_increment > 0.0 {
            snap_vec3(v, self.translate_increment)
        } else {
            v
        }
    }

    /// Conditionally snap a rotation angle based on Ctrl state.
    pub fn snap_rotate_if(&self, angle: f32, ctrl_held: bool) -> f32 {
        if self.rotate_active(ctrl_held) && self.rotate_increment > 0.0 {
            snap_value(angle, self.rotate_increment)
        } else {
            angle
        }
    }

    /// Conditionally snap a scale vector based on Ctrl state.
    pub fn snap_scale_vec3_if(&self, v: Vec3, ctrl_held: bool) -> Vec3 {
        if self.scale_active(ctrl_held) && self.scale_increment > 0.0 {
            snap_vec3(v, self.scale_increment)
        } else {
            v
        }
    }
}

pub fn snap_value(value: f32, increment: f32) -> f32 {
    (value / increment).round() * increment
}

pub fn snap_vec3(v: Vec3, increment: f32) -> Vec3 {
    Vec3::new(
        snap_value(v.x, increment),
        snap_value(v.y, increment),
        snap_value(v.z, increment),
    )
}

/// Accumulate sub-increment deltas and release whole increments. Keeps slow
/// drags responsive under snapping without losing movement.
pub fn release_increments(accum: &mut f32, delta: f32, increment: f32) -> f32 {
    *accum += delta;
    if increment <= 0.0 {
        return std::mem::take(accum);
    }
    let steps = (*accum / increment).trunc();
    *accum -= steps * increment;
    steps * increment
}

// ---------------------------------------------------------------------------
// Reference grid
// ---------------------------------------------------------------------------

#[derive(Resource)]
pub struct GridSettings {
    pub visible: bool,
    pub scale: f32,
    pub major_line_color: Color,
    pub minor_line_color: Color,
    pub fadeout_distance: f32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            visible: true,
            scale: 1.0,
            major_line_color: Color::srgb(0.25, 0.25, 0.25),
            minor_line_color: Color::srgb(0.1, 0.1, 0.1),
            fadeout_distance: 100.0,
        }
    }
}

/// Spawn the infinite reference grid. It carries bounds and an id so the
/// pickers can list it for ignoring, like any other scene entity.
pub fn spawn_reference_grid(world: &mut World) {
    let entity = world
        .spawn((
            InfiniteGrid,
            GridEntity,
            Transform::default(),
            SceneBounds {
                min: Vec3::new(-500.0, -0.01, -500.0),
                max: Vec3::new(500.0, 0.01, 500.0),
            },
        ))
        .id();
    register_entity(world, entity);
}

pub fn sync_grid_settings(
    grid: Res<GridSettings>,
    mut grids: Query<(&mut InfiniteGridSettings, &mut Visibility), With<InfiniteGrid>>,
) {
    if !grid.is_changed() {
        return;
    }
    for (mut settings, mut visibility) in &mut grids {
        settings.scale = grid.scale;
        settings.major_line_color = grid.major_line_color;
        settings.minor_line_color = grid.minor_line_color;
        settings.fadeout_distance = grid.fadeout_distance;
        *visibility = if grid.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
