use std::collections::HashMap;

use bevy::prelude::*;
use mallet_geometry::{Plane, line_plane_intersection};

use crate::fsm::{EditorState, GestureData, StateCtx, StateKey, StateMachine};
use crate::gizmo::{AxisLabel, GizmoKind, TransformGizmo, TransformSpace};
use crate::history::{ActionHistory, EditorAction};
use crate::modes::{EditorMode, ModeId, consume_pick_results};
use crate::picking::{
    BEGIN_PICK, StateBeginBoxPick, StateBeginPick, StateDeletePick, StateDuplicate, StateEndPick,
    rest_links,
};
use crate::scene::{SceneId, TransformLocked, resolve, world_transform};
use crate::selection::{Selection, selection_roots};
use crate::signals::{EditorSignal, InputModifiers};
use crate::snapping::SnapSettings;
use crate::viewport::EditorViewport;
use crate::visual_aids::{VisualAids, clear_visual_aids};

pub const TRANSFORM_BEGIN: StateKey = "TransformBegin";
pub const TRANSFORM_TO: StateKey = "TransformTo";
pub const TRANSFORM_END: StateKey = "TransformEnd";

const GUIDE_LINE_HALF_LENGTH: f32 = 100.0;

// ---------------------------------------------------------------------------
// Gizmo posing
// ---------------------------------------------------------------------------

/// Pose the gizmo on the primary selection and refresh its axis locks.
/// Returns false when there is nothing to manipulate.
fn update_gizmo_pose(world: &mut World) -> bool {
    let Some(primary) = world.resource::<Selection>().primary() else {
        return false;
    };
    let Some(entity) = resolve(world, primary) else {
        return false;
    };
    let (_, rotation, translation) = world_transform(world, entity).to_scale_rotation_translation();
    let parent_rotation = match world.get::<ChildOf>(entity) {
        Some(parent) => world_transform(world, parent.0)
            .to_scale_rotation_translation()
            .1,
        None => Quat::IDENTITY,
    };
    let space = *world.resource::<TransformSpace>();
    let cam_pos = world.resource::<EditorViewport>().camera.translation;

    let mut gizmo = world.resource_mut::<TransformGizmo>();
    gizmo.origin = translation;
    // Scale handles only make sense on the entity's own frame.
    let frame = if gizmo.kind == GizmoKind::Scale {
        rotation
    } else {
        match space {
            TransformSpace::Global => Quat::IDENTITY,
            TransformSpace::Parent => parent_rotation,
            TransformSpace::Local => rotation,
        }
    };
    gizmo.axes = [frame * Vec3::X, frame * Vec3::Y, frame * Vec3::Z];
    let view_dir = (translation - cam_pos).normalize_or_zero();
    gizmo.update_locks(view_dir);
    true
}

/// Constraint plane for a grab. Plane handles drag in their own plane; a
/// single axis drags in the plane containing the axis that faces the camera
/// most directly.
fn constraint_plane(gizmo: &TransformGizmo, grabbed: AxisLabel, cam_pos: Vec3) -> Plane {
    if grabbed.is_plane() {
        return Plane::from_point_normal(gizmo.origin, gizmo.axis(grabbed));
    }
    let px = gizmo.axis(grabbed);
    let dir = (cam_pos - gizmo.origin).normalize_or_zero();
    let py = px.cross(dir).normalize_or_zero();
    let pz = py.cross(px).normalize_or_zero();
    Plane::from_point_normal(gizmo.origin, pz)
}

/// World-space vector expressed in the entity's parent frame, so world
/// deltas apply correctly to local transforms.
fn to_parent_vector(world: &World, entity: Entity, v: Vec3) -> Vec3 {
    match world.get::<ChildOf>(entity) {
        Some(parent) => world_transform(world, parent.0).inverse().transform_vector3(v),
        None => v,
    }
}

// ---------------------------------------------------------------------------
// Begin
// ---------------------------------------------------------------------------

pub struct StateTransformBegin {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateTransformBegin {
    pub fn new() -> Self {
        Self { links: rest_links(TRANSFORM_BEGIN) }
    }
}

impl Default for StateTransformBegin {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState for StateTransformBegin {
    fn key(&self) -> StateKey {
        TRANSFORM_BEGIN
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn update(&mut self, _dt: f32, ctx: &mut StateCtx) -> Option<EditorSignal> {
        if !update_gizmo_pose(ctx.world) {
            return None;
        }
        let ray = ctx.world.resource::<EditorViewport>().ray_at_cursor();
        let hit = ctx.world.resource::<TransformGizmo>().hit_test(&ray);
        ctx.world.resource_mut::<TransformGizmo>().hovered = hit;
        None
    }

    fn signaled(&mut self, signal: EditorSignal, ctx: &mut StateCtx) -> Option<StateKey> {
        match signal {
            EditorSignal::LeftMouseDown => {
                let cursor = ctx.world.resource::<EditorViewport>().cursor;
                ctx.gesture.mouse_down = true;
                ctx.gesture.mouse_data[0] = cursor;
                if !update_gizmo_pose(ctx.world) {
                    return Some(BEGIN_PICK);
                }
                let vp = ctx.world.resource::<EditorViewport>().clone();
                let ray = vp.ray_at_cursor();
                let gizmo = ctx.world.resource::<TransformGizmo>().clone();
                let Some(grabbed) = gizmo.hit_test(&ray) else {
                    // Click-through: hand the event chain to the pickers.
                    return Some(BEGIN_PICK);
                };
                let plane = constraint_plane(&gizmo, grabbed, vp.camera.translation);
                ctx.gesture.intersection_plane = plane;
                ctx.gesture.grab_point = match line_plane_intersection(&ray, &plane) {
                    Some(t) => ray.point_at(t),
                    None => gizmo.origin,
                };
                ctx.world.resource_mut::<TransformGizmo>().grabbed = Some(grabbed);
                None
            }
            EditorSignal::LeftMouseDrag => {
                if ctx.world.resource::<TransformGizmo>().is_grabbed() {
                    Some(TRANSFORM_TO)
                } else {
                    None
                }
            }
            EditorSignal::LeftMouseUp => {
                ctx.gesture.mouse_down = false;
                ctx.world.resource_mut::<TransformGizmo>().grabbed = None;
                None
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// To
// ---------------------------------------------------------------------------

pub struct StateTransformTo {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateTransformTo {
    pub fn new() -> Self {
        let mut links = HashMap::new();
        links.insert(EditorSignal::BackToStart, TRANSFORM_BEGIN);
        Self { links }
    }
}

impl Default for StateTransformTo {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState for StateTransformTo {
    fn key(&self) -> StateKey {
        TRANSFORM_TO
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        ctx.gesture.mouse_data[1] = ctx.gesture.mouse_data[0];
        ctx.gesture.accum = Vec3::ZERO;
        ctx.gesture.angle_accum = 0.0;

        // One swap action per manipulated root, grouped so the whole gesture
        // undoes as a unit.
        let roots: Vec<SceneId> = {
            let selection = ctx.world.resource::<Selection>();
            selection_roots(ctx.world, selection)
        }
        .into_iter()
        .filter(|&id| {
            resolve(ctx.world, id)
                .is_some_and(|entity| ctx.world.get::<TransformLocked>(entity).is_none())
        })
        .collect();

        ctx.gesture.start_transforms.clear();
        for &id in &roots {
            if let Some(entity) = resolve(ctx.world, id)
                && let Some(transform) = ctx.world.get::<Transform>(entity)
            {
                ctx.gesture.start_transforms.push((id, *transform));
            }
        }
        if !ctx.gesture.start_transforms.is_empty() {
            ctx.world.resource_scope(|world, mut history: Mut<ActionHistory>| {
                history.begin_group();
                let mut count = 0;
                for (id, _) in &ctx.gesture.start_transforms {
                    if let Some(action) = EditorAction::set_transform(world, *id) {
                        history.add(action);
                        count += 1;
                    }
                }
                if let Err(err) = history.group_last(count) {
                    warn!("transform grouping failed: {err}");
                }
            });
        }

        let gizmo = ctx.world.resource::<TransformGizmo>().clone();
        if let Some(grabbed) = gizmo.grabbed
            && !grabbed.is_plane()
        {
            let axis = gizmo.axis(grabbed);
            ctx.world.resource_scope(|world, mut aids: Mut<VisualAids>| {
                aids.spawn_guide_line(
                    world,
                    gizmo.origin - axis * GUIDE_LINE_HALF_LENGTH,
                    gizmo.origin + axis * GUIDE_LINE_HALF_LENGTH,
                );
            });
        }
    }

    fn transition_out(&mut self, _next: Option<StateKey>, ctx: &mut StateCtx) {
        clear_visual_aids(ctx.world);
    }

    fn signaled(&mut self, signal: EditorSignal, ctx: &mut StateCtx) -> Option<StateKey> {
        match signal {
            EditorSignal::LeftMouseDrag => {
                ctx.gesture.mouse_data[1] = ctx.world.resource::<EditorViewport>().cursor;
                let delta = gesture_plane_delta(ctx);
                let gizmo = ctx.world.resource::<TransformGizmo>().clone();
                if let Some(grabbed) = gizmo.grabbed {
                    match gizmo.kind {
                        GizmoKind::Translate => apply_translate(ctx, &gizmo, grabbed, delta),
                        GizmoKind::Rotate => apply_rotate(ctx, &gizmo, grabbed, delta),
                        GizmoKind::Scale => apply_scale(ctx, &gizmo, grabbed, delta),
                    }
                }
                ctx.gesture.mouse_data[0] = ctx.gesture.mouse_data[1];
                None
            }
            EditorSignal::LeftMouseUp => Some(TRANSFORM_END),
            _ => None,
        }
    }
}

/// Movement of the cursor between the previous and current gesture points,
/// measured on the constraint plane.
fn gesture_plane_delta(ctx: &mut StateCtx) -> Vec3 {
    let vp = ctx.world.resource::<EditorViewport>().clone();
    let prev_ray = vp.ray_from_screen(ctx.gesture.mouse_data[0]);
    let cur_ray = vp.ray_from_screen(ctx.gesture.mouse_data[1]);
    let plane = ctx.gesture.intersection_plane;
    match (
        line_plane_intersection(&prev_ray, &plane),
        line_plane_intersection(&cur_ray, &plane),
    ) {
        (Some(t0), Some(t1)) => cur_ray.point_at(t1) - prev_ray.point_at(t0),
        _ => {
            warn!("gesture ray missed the constraint plane");
            Vec3::ZERO
        }
    }
}

fn apply_translate(ctx: &mut StateCtx, gizmo: &TransformGizmo, grabbed: AxisLabel, delta: Vec3) {
    let delta = if grabbed.is_plane() {
        delta
    } else {
        let axis = gizmo.axis(grabbed);
        axis * axis.dot(delta)
    };
    ctx.gesture.accum += delta;

    let snap = *ctx.world.resource::<SnapSettings>();
    let ctrl = ctx.world.resource::<InputModifiers>().ctrl;
    let offset = snap.snap_translate_vec3_if(ctx.gesture.accum, ctrl);

    for (id, start) in ctx.gesture.start_transforms.clone() {
        let Some(entity) = resolve(ctx.world, id) else {
            continue;
        };
        let local_offset = to_parent_vector(ctx.world, entity, offset);
        if let Some(mut transform) = ctx.world.get_mut::<Transform>(entity) {
            transform.translation = start.translation + local_offset;
        }
    }
}

fn apply_rotate(ctx: &mut StateCtx, gizmo: &TransformGizmo, grabbed: AxisLabel, delta: Vec3) {
    let tangent = gizmo.ring_tangent(grabbed, ctx.gesture.grab_point);
    ctx.gesture.angle_accum += tangent.dot(delta);

    let snap = *ctx.world.resource::<SnapSettings>();
    let ctrl = ctx.world.resource::<InputModifiers>().ctrl;
    let angle = snap.snap_rotate_if(ctx.gesture.angle_accum, ctrl);
    let axis = gizmo.axis(grabbed);

    for (id, start) in ctx.gesture.start_transforms.clone() {
        let Some(entity) = resolve(ctx.world, id) else {
            continue;
        };
        let local_axis = to_parent_vector(ctx.world, entity, axis).normalize_or_zero();
        if local_axis == Vec3::ZERO {
            continue;
        }
        if let Some(mut transform) = ctx.world.get_mut::<Transform>(entity) {
            transform.rotation = Quat::from_axis_angle(local_axis, angle) * start.rotation;
        }
    }
}

fn apply_scale(ctx: &mut StateCtx, gizmo: &TransformGizmo, grabbed: AxisLabel, delta: Vec3) {
    let axis = gizmo.axis(grabbed);
    ctx.gesture.accum[grabbed.normal_index()] += axis.dot(delta);

    let snap = *ctx.world.resource::<SnapSettings>();
    let ctrl = ctx.world.resource::<InputModifiers>().ctrl;
    // Delta means 1 + delta: dragging one unit along a handle doubles that
    // axis, accumulated around the gesture-start scale.
    let factors = Vec3::ONE + snap.snap_scale_vec3_if(ctx.gesture.accum, ctrl);

    for (id, start) in ctx.gesture.start_transforms.clone() {
        let Some(entity) = resolve(ctx.world, id) else {
            continue;
        };
        if let Some(mut transform) = ctx.world.get_mut::<Transform>(entity) {
            transform.scale = start.scale * factors;
        }
    }
}

// ---------------------------------------------------------------------------
// End
// ---------------------------------------------------------------------------

pub struct StateTransformEnd {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateTransformEnd {
    pub fn new() -> Self {
        let mut links = HashMap::new();
        links.insert(EditorSignal::BackToStart, TRANSFORM_BEGIN);
        Self { links }
    }
}

impl Default for StateTransformEnd {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorState for StateTransformEnd {
    fn key(&self) -> StateKey {
        TRANSFORM_END
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        // A gesture that ends exactly where it started pushed a no-op entry;
        // drop it.
        if ctx.gesture.start_transforms.is_empty() {
            return;
        }
        let unchanged = ctx.gesture.start_transforms.iter().all(|(id, start)| {
            resolve(ctx.world, *id)
                .and_then(|entity| ctx.world.get::<Transform>(entity))
                .is_some_and(|current| *current == *start)
        });
        if unchanged {
            ctx.world.resource_mut::<ActionHistory>().remove_last();
        }
    }

    fn transition_out(&mut self, next: Option<StateKey>, ctx: &mut StateCtx) {
        if next == Some(TRANSFORM_BEGIN) {
            let mut gizmo = ctx.world.resource_mut::<TransformGizmo>();
            gizmo.grabbed = None;
            gizmo.hovered = None;
            ctx.gesture.reset_mouse();
            ctx.gesture.start_transforms.clear();
            ctx.gesture.accum = Vec3::ZERO;
            ctx.gesture.angle_accum = 0.0;
        }
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Move, Rotate, and Scale share one mode body; the gizmo kind decides the
/// drag math.
pub struct TransformMode {
    id: ModeId,
    kind: GizmoKind,
    machine: StateMachine,
    gesture: GestureData,
}

impl TransformMode {
    pub fn translate() -> Self {
        Self::with_kind(ModeId::Move, GizmoKind::Translate)
    }

    pub fn rotate() -> Self {
        Self::with_kind(ModeId::Rotate, GizmoKind::Rotate)
    }

    pub fn scale() -> Self {
        Self::with_kind(ModeId::Scale, GizmoKind::Scale)
    }

    fn with_kind(id: ModeId, kind: GizmoKind) -> Self {
        Self { id, kind, machine: StateMachine::default(), gesture: GestureData::default() }
    }
}

impl EditorMode for TransformMode {
    fn id(&self) -> ModeId {
        self.id
    }

    fn init(&mut self, world: &mut World) {
        world.insert_resource(TransformGizmo::new(self.kind));
        self.machine.push_state(Box::new(StateTransformBegin::new()));
        self.machine.push_state(Box::new(StateTransformTo::new()));
        self.machine.push_state(Box::new(StateTransformEnd::new()));
        self.machine.push_state(Box::new(StateBeginPick::new(TRANSFORM_BEGIN)));
        self.machine.push_state(Box::new(StateBeginBoxPick::new(TRANSFORM_BEGIN)));
        self.machine.push_state(Box::new(StateEndPick::new(TRANSFORM_BEGIN)));
        self.machine.push_state(Box::new(StateDeletePick::new(TRANSFORM_BEGIN)));
        self.machine.push_state(Box::new(StateDuplicate::new(TRANSFORM_BEGIN)));
        self.machine.start_at(TRANSFORM_BEGIN);
    }

    fn uninit(&mut self, world: &mut World) {
        world.remove_resource::<TransformGizmo>();
        clear_visual_aids(world);
    }

    fn update(&mut self, dt: f32, world: &mut World) {
        let mut ctx = StateCtx { world: &mut *world, gesture: &mut self.gesture };
        self.machine.update(dt, &mut ctx);
        consume_pick_results(&mut self.machine, &mut self.gesture, world);
        if self.machine.current_key() == Some(TRANSFORM_END) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneBounds, SceneIdRegistry, register_entity};
    use crate::visual_aids::GuideLine;

    fn gesture_world() -> World {
        let mut world = World::new();
        world.init_resource::<SceneIdRegistry>();
        world.init_resource::<Selection>();
        world.init_resource::<ActionHistory>();
        world.init_resource::<SnapSettings>();
        world.init_resource::<InputModifiers>();
        world.init_resource::<VisualAids>();
        world.init_resource::<TransformSpace>();
        // Default camera at (0, 5, 10): clicks on the X axis approach it
        // from above and cannot graze the ZX plane handle on the way in.
        world.init_resource::<EditorViewport>();
        world
    }

    fn spawn_selected(world: &mut World, pos: Vec3) -> SceneId {
        let entity = world
            .spawn((Transform::from_translation(pos), SceneBounds::default()))
            .id();
        let id = register_entity(world, entity);
        world.resource_mut::<Selection>().add(&[id], false);
        id
    }

    fn set_cursor_at_world(world: &mut World, point: Vec3) {
        let screen = world
            .resource::<EditorViewport>()
            .world_to_screen(point)
            .unwrap();
        world.resource_mut::<EditorViewport>().cursor = screen;
    }

    fn translation_of(world: &World, id: SceneId) -> Vec3 {
        let entity = resolve(world, id).unwrap();
        world.get::<Transform>(entity).unwrap().translation
    }

    /// Full drag on the X handle. The constraint plane for an X grab
    /// contains the whole X axis, so cursor targets on that line unproject
    /// exactly.
    fn drag_x_handle(mode: &mut TransformMode, world: &mut World, to: Vec3) {
        set_cursor_at_world(world, Vec3::new(0.6, 0.0, 0.0));
        mode.signal(EditorSignal::LeftMouseDown, world);
        mode.signal(EditorSignal::LeftMouseDrag, world);
        set_cursor_at_world(world, to + Vec3::new(0.6, 0.0, 0.0));
        mode.signal(EditorSignal::LeftMouseDrag, world);
        mode.signal(EditorSignal::LeftMouseUp, world);
        mode.update(1.0 / 60.0, world);
    }

    #[test]
    fn axis_drag_moves_along_that_axis_only() {
        let mut world = gesture_world();
        let id = spawn_selected(&mut world, Vec3::ZERO);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        drag_x_handle(&mut mode, &mut world, Vec3::new(2.0, 0.0, 0.0));
        assert!((translation_of(&world, id) - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-3);
        assert_eq!(mode.machine.current_key(), Some(TRANSFORM_BEGIN));
    }

    #[test]
    fn gesture_records_one_undo_unit() {
        let mut world = gesture_world();
        let id = spawn_selected(&mut world, Vec3::ZERO);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        drag_x_handle(&mut mode, &mut world, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(world.resource::<ActionHistory>().len(), 1);

        world.resource_scope(|world, mut history: Mut<ActionHistory>| {
            history.undo(world);
        });
        assert!(translation_of(&world, id).length() < 1e-3);
        world.resource_scope(|world, mut history: Mut<ActionHistory>| {
            history.redo(world);
        });
        assert!((translation_of(&world, id) - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn zero_delta_gesture_leaves_no_undo_entry() {
        let mut world = gesture_world();
        let id = spawn_selected(&mut world, Vec3::ZERO);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        // A twitchy click: grab, a drag event with no cursor movement,
        // release. Nothing moved, so nothing should be undoable.
        set_cursor_at_world(&mut world, Vec3::new(0.6, 0.0, 0.0));
        mode.signal(EditorSignal::LeftMouseDown, &mut world);
        mode.signal(EditorSignal::LeftMouseDrag, &mut world);
        mode.signal(EditorSignal::LeftMouseUp, &mut world);
        mode.update(1.0 / 60.0, &mut world);

        assert!(translation_of(&world, id).length() < 1e-6);
        assert!(world.resource::<ActionHistory>().is_empty());
        assert_eq!(mode.machine.current_key(), Some(TRANSFORM_BEGIN));
    }

    #[test]
    fn snapped_drag_quantizes_the_accumulated_offset() {
        let mut world = gesture_world();
        let id = spawn_selected(&mut world, Vec3::ZERO);
        world.resource_mut::<SnapSettings>().translate_snap = true;
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        // 0.3 along X snaps down to one 0.25 step.
        drag_x_handle(&mut mode, &mut world, Vec3::new(0.3, 0.0, 0.0));
        assert!((translation_of(&world, id) - Vec3::new(0.25, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn locked_entities_do_not_move() {
        let mut world = gesture_world();
        let id = spawn_selected(&mut world, Vec3::ZERO);
        let entity = resolve(&world, id).unwrap();
        world.entity_mut(entity).insert(TransformLocked);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        drag_x_handle(&mut mode, &mut world, Vec3::new(2.0, 0.0, 0.0));
        assert!(translation_of(&world, id).length() < 1e-3);
        assert!(world.resource::<ActionHistory>().is_empty());
    }

    #[test]
    fn child_translation_lands_in_parent_frame() {
        let mut world = gesture_world();
        // Parent rotated a quarter turn around Y: world +X is local +Z.
        let parent = world
            .spawn(Transform::from_rotation(Quat::from_rotation_y(
                std::f32::consts::FRAC_PI_2,
            )))
            .id();
        let child_entity = world
            .spawn((Transform::default(), SceneBounds::default(), ChildOf(parent)))
            .id();
        let child = register_entity(&mut world, child_entity);
        world.resource_mut::<Selection>().add(&[child], false);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        drag_x_handle(&mut mode, &mut world, Vec3::new(2.0, 0.0, 0.0));
        let local = translation_of(&world, child);
        assert!((local - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-3);
    }

    #[test]
    fn transform_space_picks_the_gizmo_frame() {
        let mut world = gesture_world();
        // Parent rotated a quarter turn around Y; the child carries its own
        // roll so the three frames come apart.
        let parent = world
            .spawn(Transform::from_rotation(Quat::from_rotation_y(
                std::f32::consts::FRAC_PI_2,
            )))
            .id();
        let child_entity = world
            .spawn((
                Transform::from_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
                SceneBounds::default(),
                ChildOf(parent),
            ))
            .id();
        let child = register_entity(&mut world, child_entity);
        world.resource_mut::<Selection>().add(&[child], false);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        world.insert_resource(TransformSpace::Parent);
        mode.update(1.0 / 60.0, &mut world);
        let axes = world.resource::<TransformGizmo>().axes;
        assert!((axes[0] - Vec3::NEG_Z).length() < 1e-5);

        world.insert_resource(TransformSpace::Local);
        mode.update(1.0 / 60.0, &mut world);
        let axes = world.resource::<TransformGizmo>().axes;
        // Parent yaw then child roll carries local +X onto world +Y.
        assert!((axes[0] - Vec3::Y).length() < 1e-5);

        world.insert_resource(TransformSpace::Global);
        mode.update(1.0 / 60.0, &mut world);
        let axes = world.resource::<TransformGizmo>().axes;
        assert!((axes[0] - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn scale_drag_multiplies_start_scale() {
        let mut world = gesture_world();
        let id = spawn_selected(&mut world, Vec3::ZERO);
        let mut mode = TransformMode::scale();
        mode.init(&mut world);

        drag_x_handle(&mut mode, &mut world, Vec3::new(1.0, 0.0, 0.0));
        let entity = resolve(&world, id).unwrap();
        let scale = world.get::<Transform>(entity).unwrap().scale;
        assert!((scale - Vec3::new(2.0, 1.0, 1.0)).length() < 1e-3);
    }

    #[test]
    fn axis_drag_shows_a_guide_line() {
        let mut world = gesture_world();
        spawn_selected(&mut world, Vec3::ZERO);
        let mut mode = TransformMode::translate();
        mode.init(&mut world);

        set_cursor_at_world(&mut world, Vec3::new(0.6, 0.0, 0.0));
        mode.signal(EditorSignal::LeftMouseDown, &mut world);
        mode.signal(EditorSignal::LeftMouseDrag, &mut world);
        assert_eq!(mode.machine.current_key(), Some(TRANSFORM_TO));
        {
            let mut lines = world.query::<&GuideLine>();
            assert_eq!(lines.iter(&world).count(), 1);
        }

        mode.signal(EditorSignal::LeftMouseUp, &mut world);
        mode.update(1.0 / 60.0, &mut world);
        let mut lines = world.query::<&GuideLine>();
        assert_eq!(lines.iter(&world).count(), 0);
    }

    #[test]
    fn miss_click_falls_through_to_picking() {
        let mut world = gesture_world();
        let far = spawn_selected(&mut world, Vec3::new(3.0, 0.0, 0.0));
        // Primary is at x=3; click empty space near the origin, well off the
        // gizmo, and expect a pick cycle instead of a grab.
        set_cursor_at_world(&mut world, Vec3::new(-3.0, 3.0, 0.0));
        let mut mode = TransformMode::translate();
        mode.init(&mut world);
        mode.signal(EditorSignal::LeftMouseDown, &mut world);
        assert_eq!(mode.machine.current_key(), Some(BEGIN_PICK));
        mode.signal(EditorSignal::LeftMouseUp, &mut world);
        mode.update(1.0 / 60.0, &mut world);
        // The empty click cleared the selection.
        assert!(!world.resource::<Selection>().is_selected(far));
        assert_eq!(mode.machine.current_key(), Some(TRANSFORM_BEGIN));
    }
}
