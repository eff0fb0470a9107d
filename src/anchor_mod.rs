use std::collections::HashMap;

use bevy::prelude::*;
use mallet_geometry::{Plane, line_plane_intersection};
use serde::{Deserialize, Serialize};

use crate::fsm::{EditorState, GestureData, StateCtx, StateKey, StateMachine};
use crate::history::{ActionHistory, EditorAction};
use crate::modes::{EditorMode, ModeId, consume_pick_results};
use crate::picking::{
    BEGIN_PICK, StateBeginBoxPick, StateBeginPick, StateDeletePick, StateDuplicate, StateEndPick,
    rest_links,
};
use crate::scene::{SceneId, resolve, world_bounds, world_transform};
use crate::selection::Selection;
use crate::signals::{EditorSignal, InputModifiers};
use crate::snapping::{SnapSettings, release_increments};
use crate::viewport::EditorViewport;

pub const ANCHOR_BEGIN: StateKey = "AnchorBegin";
pub const ANCHOR_TO: StateKey = "AnchorTo";
pub const ANCHOR_END: StateKey = "AnchorEnd";

const LEFT: usize = 0;
const RIGHT: usize = 1;
const TOP: usize = 2;
const BOTTOM: usize = 3;

/// Pick radius of an anchor handle, as a fraction of the canvas's larger
/// dimension.
const HANDLE_RADIUS_FRACTION: f32 = 0.025;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// 2D layout anchors of a surface inside its canvas. Ratios measure inward
/// from each canvas edge, so an opposing pair never sums past one.
#[derive(Component, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// left, right, top, bottom in [0, 1].
    pub ratios: [f32; 4],
    /// World-unit offsets of the surface rect from its anchor lines.
    pub offsets: [f32; 4],
}

impl Default for Anchor {
    fn default() -> Self {
        Self { ratios: [0.0; 4], offsets: [0.0; 4] }
    }
}

/// 2D canvas; anchored surfaces are its children.
#[derive(Component, Clone, Copy, Debug)]
pub struct Canvas {
    pub size: Vec2,
}

/// The nine draggable anchor handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorHandle {
    Center,
    NW,
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
}

impl AnchorHandle {
    pub const ALL: [AnchorHandle; 9] = [
        AnchorHandle::Center,
        AnchorHandle::NW,
        AnchorHandle::N,
        AnchorHandle::NE,
        AnchorHandle::E,
        AnchorHandle::SE,
        AnchorHandle::S,
        AnchorHandle::SW,
        AnchorHandle::W,
    ];

    fn moves_west(self) -> bool {
        matches!(self, AnchorHandle::W | AnchorHandle::NW | AnchorHandle::SW)
    }

    fn moves_east(self) -> bool {
        matches!(self, AnchorHandle::E | AnchorHandle::NE | AnchorHandle::SE)
    }

    fn moves_north(self) -> bool {
        matches!(self, AnchorHandle::N | AnchorHandle::NW | AnchorHandle::NE)
    }

    fn moves_south(self) -> bool {
        matches!(self, AnchorHandle::S | AnchorHandle::SW | AnchorHandle::SE)
    }
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Apply a ratio-space drag to the anchors. Each side clamps to [0, 1] and
/// yields to its opposite so a pair never crosses. The center handle moves
/// both pairs rigidly.
pub fn apply_anchor_delta(anchor: &mut Anchor, handle: AnchorHandle, dx: f32, dy: f32) {
    let r = &mut anchor.ratios;
    if handle == AnchorHandle::Center {
        r[LEFT] = clamp01(r[LEFT] + dx);
        r[RIGHT] = 1.0 - r[LEFT];
        r[TOP] = clamp01(r[TOP] - dy);
        r[BOTTOM] = 1.0 - r[TOP];
        return;
    }
    if handle.moves_west() {
        r[LEFT] = clamp01(r[LEFT] + dx);
        if r[LEFT] + r[RIGHT] > 1.0 {
            r[LEFT] = 1.0 - r[RIGHT];
        }
    }
    if handle.moves_east() {
        r[RIGHT] = clamp01(r[RIGHT] - dx);
        if r[LEFT] + r[RIGHT] > 1.0 {
            r[RIGHT] = 1.0 - r[LEFT];
        }
    }
    if handle.moves_north() {
        r[TOP] = clamp01(r[TOP] - dy);
        if r[TOP] + r[BOTTOM] > 1.0 {
            r[TOP] = 1.0 - r[BOTTOM];
        }
    }
    if handle.moves_south() {
        r[BOTTOM] = clamp01(r[BOTTOM] + dy);
        if r[TOP] + r[BOTTOM] > 1.0 {
            r[BOTTOM] = 1.0 - r[TOP];
        }
    }
}

// ---------------------------------------------------------------------------
// Anchor gizmo
// ---------------------------------------------------------------------------

/// Handle layout over the canvas of the primary anchored surface.
#[derive(Resource, Clone, Debug)]
pub struct AnchorGizmo {
    pub canvas_origin: Vec3,
    /// World-space right and up of the canvas plane.
    pub canvas_axes: [Vec3; 2],
    pub canvas_size: Vec2,
    pub hovered: Option<AnchorHandle>,
    pub grabbed: Option<AnchorHandle>,
}

impl Default for AnchorGizmo {
    fn default() -> Self {
        Self {
            canvas_origin: Vec3::ZERO,
            canvas_axes: [Vec3::X, Vec3::Y],
            canvas_size: Vec2::ONE,
            hovered: None,
            grabbed: None,
        }
    }
}

impl AnchorGizmo {
    pub fn plane(&self) -> Plane {
        let normal = self.canvas_axes[0].cross(self.canvas_axes[1]);
        Plane::from_point_normal(self.canvas_origin, normal)
    }

    /// Anchor line positions in canvas coordinates (origin at the canvas
    /// center, x right, y up).
    fn anchor_lines(&self, anchor: &Anchor) -> (f32, f32, f32, f32) {
        let half = self.canvas_size * 0.5;
        let left = -half.x + anchor.ratios[LEFT] * self.canvas_size.x;
        let right = half.x - anchor.ratios[RIGHT] * self.canvas_size.x;
        let top = half.y - anchor.ratios[TOP] * self.canvas_size.y;
        let bottom = -half.y + anchor.ratios[BOTTOM] * self.canvas_size.y;
        (left, right, top, bottom)
    }

    fn handle_local(&self, handle: AnchorHandle, anchor: &Anchor) -> Vec2 {
        let (l, r, t, b) = self.anchor_lines(anchor);
        match handle {
            AnchorHandle::Center => Vec2::new((l + r) * 0.5, (t + b) * 0.5),
            AnchorHandle::NW => Vec2::new(l, t),
            AnchorHandle::N => Vec2::new((l + r) * 0.5, t),
            AnchorHandle::NE => Vec2::new(r, t),
            AnchorHandle::E => Vec2::new(r, (t + b) * 0.5),
            AnchorHandle::SE => Vec2::new(r, b),
            AnchorHandle::S => Vec2::new((l + r) * 0.5, b),
            AnchorHandle::SW => Vec2::new(l, b),
            AnchorHandle::W => Vec2::new(l, (t + b) * 0.5),
        }
    }

    pub fn handle_position(&self, handle: AnchorHandle, anchor: &Anchor) -> Vec3 {
        let local = self.handle_local(handle, anchor);
        self.canvas_origin + self.canvas_axes[0] * local.x + self.canvas_axes[1] * local.y
    }

    /// Nearest handle under the ray, within the pick radius.
    pub fn hit_test(&self, ray: &mallet_geometry::Ray, anchor: &Anchor) -> Option<AnchorHandle> {
        let t = line_plane_intersection(ray, &self.plane())?;
        let point = ray.point_at(t);
        let radius = self.canvas_size.max_element() * HANDLE_RADIUS_FRACTION;
        let mut best: Option<(f32, AnchorHandle)> = None;
        for handle in AnchorHandle::ALL {
            let d = self.handle_position(handle, anchor).distance(point);
            if d <= radius && best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, handle));
            }
        }
        best.map(|(_, handle)| handle)
    }
}

/// Pose the anchor gizmo on the primary selection's canvas. Returns the
/// surface id when the selection is an anchored canvas child.
fn update_anchor_gizmo(world: &mut World) -> Option<SceneId> {
    let primary = world.resource::<Selection>().primary()?;
    let entity = resolve(world, primary)?;
    world.get::<Anchor>(entity)?;
    let canvas_entity = world.get::<ChildOf>(entity).map(|p| p.0)?;
    let canvas = *world.get::<Canvas>(canvas_entity)?;
    let (_, rotation, translation) =
        world_transform(world, canvas_entity).to_scale_rotation_translation();

    let mut gizmo = world.resource_mut::<AnchorGizmo>();
    gizmo.canvas_origin = translation;
    gizmo.canvas_axes = [rotation * Vec3::X, rotation * Vec3::Y];
    gizmo.canvas_size = canvas.size;
    Some(primary)
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

pub struct StateAnchorBegin {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateAnchorBegin {
    pub fn new() -> Self {
        Self { links: rest_links(ANCHOR_BEGIN) }
    }
}

impl Default for StateAnchorBegin {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState for StateAnchorBegin {
    fn key(&self) -> StateKey {
        ANCHOR_BEGIN
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn update(&mut self, _dt: f32, ctx: &mut StateCtx) -> Option<EditorSignal> {
        let Some(surface) = update_anchor_gizmo(ctx.world) else {
            return None;
        };
        let Some(anchor) = surface_anchor(ctx.world, surface) else {
            return None;
        };
        let ray = ctx.world.resource::<EditorViewport>().ray_at_cursor();
        let hit = ctx.world.resource::<AnchorGizmo>().hit_test(&ray, &anchor);
        ctx.world.resource_mut::<AnchorGizmo>().hovered = hit;
        None
    }

    fn signaled(&mut self, signal: EditorSignal, ctx: &mut StateCtx) -> Option<StateKey> {
        match signal {
            EditorSignal::LeftMouseDown => {
                let cursor = ctx.world.resource::<EditorViewport>().cursor;
                ctx.gesture.mouse_down = true;
                ctx.gesture.mouse_data[0] = cursor;
                let Some(surface) = update_anchor_gizmo(ctx.world) else {
                    return Some(BEGIN_PICK);
                };
                let Some(anchor) = surface_anchor(ctx.world, surface) else {
                    return Some(BEGIN_PICK);
                };
                let ray = ctx.world.resource::<EditorViewport>().ray_at_cursor();
                let gizmo = ctx.world.resource::<AnchorGizmo>().clone();
                let Some(grabbed) = gizmo.hit_test(&ray, &anchor) else {
                    return Some(BEGIN_PICK);
                };
                ctx.gesture.anchor_grab = Some(grabbed);
                ctx.gesture.start_anchor = Some((surface, anchor));
                ctx.gesture.intersection_plane = gizmo.plane();
                ctx.world.resource_mut::<AnchorGizmo>().grabbed = Some(grabbed);
                None
            }
            EditorSignal::LeftMouseDrag => {
                if ctx.gesture.anchor_grab.is_some() {
                    Some(ANCHOR_TO)
                } else {
                    None
                }
            }
            EditorSignal::LeftMouseUp => {
                ctx.gesture.mouse_down = false;
                ctx.gesture.anchor_grab = None;
                ctx.world.resource_mut::<AnchorGizmo>().grabbed = None;
                None
            }
            _ => None,
        }
    }
}

fn surface_anchor(world: &World, id: SceneId) -> Option<Anchor> {
    let entity = resolve(world, id)?;
    world.get::<Anchor>(entity).copied()
}

pub struct StateAnchorTo {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateAnchorTo {
    pub fn new() -> Self {
        let mut links = HashMap::new();
        links.insert(EditorSignal::BackToStart, ANCHOR_BEGIN);
        Self { links }
    }
}

impl Default for StateAnchorTo {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState for StateAnchorTo {
    fn key(&self) -> StateKey {
        ANCHOR_TO
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        ctx.gesture.mouse_data[1] = ctx.gesture.mouse_data[0];
        ctx.gesture.accum = Vec3::ZERO;
        let Some((surface, _)) = ctx.gesture.start_anchor else {
            return;
        };
        ctx.world.resource_scope(|world, mut history: Mut<ActionHistory>| {
            if let Some(action) = EditorAction::set_anchor(world, surface) {
                history.add(action);
            }
        });
    }

    fn signaled(&mut self, signal: EditorSignal, ctx: &mut StateCtx) -> Option<StateKey> {
        match signal {
            EditorSignal::LeftMouseDrag => {
                ctx.gesture.mouse_data[1] = ctx.world.resource::<EditorViewport>().cursor;
                drag_anchor(ctx);
                ctx.gesture.mouse_data[0] = ctx.gesture.mouse_data[1];
                None
            }
            EditorSignal::LeftMouseUp => Some(ANCHOR_END),
            _ => None,
        }
    }
}

fn drag_anchor(ctx: &mut StateCtx) {
    let Some(grabbed) = ctx.gesture.anchor_grab else {
        return;
    };
    let Some((surface, _)) = ctx.gesture.start_anchor else {
        return;
    };
    let vp = ctx.world.resource::<EditorViewport>().clone();
    let gizmo = ctx.world.resource::<AnchorGizmo>().clone();
    let plane = ctx.gesture.intersection_plane;
    let prev_ray = vp.ray_from_screen(ctx.gesture.mouse_data[0]);
    let cur_ray = vp.ray_from_screen(ctx.gesture.mouse_data[1]);
    let delta = match (
        line_plane_intersection(&prev_ray, &plane),
        line_plane_intersection(&cur_ray, &plane),
    ) {
        (Some(t0), Some(t1)) => cur_ray.point_at(t1) - prev_ray.point_at(t0),
        _ => {
            warn!("anchor drag ray missed the canvas plane");
            Vec3::ZERO
        }
    };

    // World-unit movement along the canvas axes, snapped by accumulation so
    // slow drags under snapping still land.
    let mut dx = delta.dot(gizmo.canvas_axes[0]);
    let mut dy = delta.dot(gizmo.canvas_axes[1]);
    let snap = *ctx.world.resource::<SnapSettings>();
    let ctrl = ctx.world.resource::<InputModifiers>().ctrl;
    if snap.translate_active(ctrl) {
        dx = release_increments(&mut ctx.gesture.accum.x, dx, snap.translate_increment);
        dy = release_increments(&mut ctx.gesture.accum.y, dy, snap.translate_increment);
    }

    let Some(entity) = resolve(ctx.world, surface) else {
        return;
    };
    if let Some(mut anchor) = ctx.world.get_mut::<Anchor>(entity) {
        apply_anchor_delta(
            &mut anchor,
            grabbed,
            dx / gizmo.canvas_size.x,
            dy / gizmo.canvas_size.y,
        );
    }
    recompute_offsets(ctx.world, &gizmo, entity);
}

/// Dragging anchors re-references the surface, it does not move it: offsets
/// are recomputed so the surface rect stays where it is under the new anchor
/// lines.
fn recompute_offsets(world: &mut World, gizmo: &AnchorGizmo, entity: Entity) {
    let Some(bounds) = world_bounds(world, entity) else {
        return;
    };
    // Surface extents in canvas coordinates.
    let mut surf_min = Vec2::splat(f32::MAX);
    let mut surf_max = Vec2::splat(f32::MIN);
    for corner in bounds.corners() {
        let rel = corner - gizmo.canvas_origin;
        let p = Vec2::new(rel.dot(gizmo.canvas_axes[0]), rel.dot(gizmo.canvas_axes[1]));
        surf_min = surf_min.min(p);
        surf_max = surf_max.max(p);
    }
    let Some(mut anchor) = world.get_mut::<Anchor>(entity) else {
        return;
    };
    let (l, r, t, b) = gizmo.anchor_lines(&anchor);
    anchor.offsets = [surf_min.x - l, r - surf_max.x, t - surf_max.y, surf_min.y - b];
}

pub struct StateAnchorEnd {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateAnchorEnd {
    pub fn new() -> Self {
        let mut links = HashMap::new();
        links.insert(EditorSignal::BackToStart, ANCHOR_BEGIN);
        Self { links }
    }
}

impl Default for StateAnchorEnd {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState for StateAnchorEnd {
    fn key(&self) -> StateKey {
        ANCHOR_END
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_out(&mut self, next: Option<StateKey>, ctx: &mut StateCtx) {
        if next == Some(ANCHOR_BEGIN) {
            ctx.world.resource_mut::<AnchorGizmo>().grabbed = None;
            ctx.gesture.reset_mouse();
            ctx.gesture.anchor_grab = None;
            ctx.gesture.start_anchor = None;
            ctx.gesture.accum = Vec3::ZERO;
        }
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

pub struct AnchorMode {
    machine: StateMachine,
    gesture: GestureData,
}

impl AnchorMode {
    pub fn new() -> Self {
        Self { machine: StateMachine::default(), gesture: GestureData::default() }
    }
}

impl Default for AnchorMode {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorMode for AnchorMode {
    fn id(&self) -> ModeId {
        ModeId::Anchor
    }

    fn init(&mut self, world: &mut World) {
        world.init_resource::<AnchorGizmo>();
        self.machine.push_state(Box::new(StateAnchorBegin::new()));
        self.machine.push_state(Box::new(StateAnchorTo::new()));
        self.machine.push_state(Box::new(StateAnchorEnd::new()));
        self.machine.push_state(Box::new(StateBeginPick::new(ANCHOR_BEGIN)));
        self.machine.push_state(Box::new(StateBeginBoxPick::new(ANCHOR_BEGIN)));
        self.machine.push_state(Box::new(StateEndPick::new(ANCHOR_BEGIN)));
        self.machine.push_state(Box::new(StateDeletePick::new(ANCHOR_BEGIN)));
        self.machine.push_state(Box::new(StateDuplicate::new(ANCHOR_BEGIN)));
        self.machine.start_at(ANCHOR_BEGIN);
    }

    fn uninit(&mut self, world: &mut World) {
        world.remove_resource::<AnchorGizmo>();
    }

    fn update(&mut self, dt: f32, world: &mut World) {
        let mut ctx = StateCtx { world: &mut *world, gesture: &mut self.gesture };
        self.machine.update(dt, &mut ctx);
        consume_pick_results(&mut self.machine, &mut self.gesture, world);
        if self.machine.current_key() == Some(ANCHOR_END) {
            let mut ctx = StateCtx { world: &mut *world, gesture: &mut self.gesture };
            self.machine.signal(EditorSignal::BackToStart, &mut ctx);
        }
    }

    fn signal(&mut self, signal: EditorSignal, world: &mut World) {
        let mut ctx = StateCtx { world, gesture: &mut self.gesture };
        self.machine.signal(signal, &mut ctx);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
