use std::collections::HashMap;

use bevy::prelude::*;
use mallet_geometry::Frustum;

use crate::fsm::{EditorState, StateCtx, StateKey};
use crate::history::{ActionHistory, EditorAction};
use crate::scene::{
    EntitySnapshot, Prefab, SceneId, SceneIdRegistry, grid_ignore_list, pick_frustum, pick_ray,
    resolve,
};
use crate::selection::{Selection, selection_roots, sync_selected_markers};
use crate::signals::EditorSignal;
use crate::viewport::EditorViewport;
use crate::visual_aids::{SelectRect, VisualAids, clear_visual_aids};

pub const BEGIN_PICK: StateKey = "BeginPick";
pub const BEGIN_BOX_PICK: StateKey = "BeginBoxPick";
pub const END_PICK: StateKey = "EndPick";
pub const DELETE_PICK: StateKey = "DeletePick";
pub const DUPLICATE: StateKey = "Duplicate";

/// Drags under this rectangle size fall back to a single ray pick.
const MIN_BOX_PICK_EXTENT: f32 = 2.0;
/// Depth of the pick frustum behind the near-plane rectangle.
const BOX_PICK_DEPTH: f32 = 1000.0;

/// Links every state of a mode carries back to its rest state, plus the
/// editing entry points available from rest.
pub fn rest_links(back_to: StateKey) -> HashMap<EditorSignal, StateKey> {
    let mut links = HashMap::new();
    links.insert(EditorSignal::BackToStart, back_to);
    links.insert(EditorSignal::Delete, DELETE_PICK);
    links.insert(EditorSignal::Duplicate, DUPLICATE);
    links
}

pub fn back_link(back_to: StateKey) -> HashMap<EditorSignal, StateKey> {
    let mut links = HashMap::new();
    links.insert(EditorSignal::BackToStart, back_to);
    links
}

// ---------------------------------------------------------------------------
// Single ray pick
// ---------------------------------------------------------------------------

pub struct StateBeginPick {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateBeginPick {
    pub fn new(back_to: StateKey) -> Self {
        Self { links: rest_links(back_to) }
    }
}

impl EditorState for StateBeginPick {
    fn key(&self) -> StateKey {
        BEGIN_PICK
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        ctx.gesture.ignore_list = grid_ignore_list(ctx.world);
    }

    fn signaled(&mut self, signal: EditorSignal, ctx: &mut StateCtx) -> Option<StateKey> {
        match signal {
            EditorSignal::LeftMouseDown => {
                let cursor = ctx.world.resource::<EditorViewport>().cursor;
                ctx.gesture.mouse_down = true;
                ctx.gesture.mouse_data[0] = cursor;
                // Rebuilt here as well; the machine may start resting in this
                // state without having transitioned into it.
                ctx.gesture.ignore_list = grid_ignore_list(ctx.world);
                None
            }
            EditorSignal::LeftMouseDrag if ctx.gesture.mouse_down => Some(BEGIN_BOX_PICK),
            EditorSignal::LeftMouseUp => {
                ctx.gesture.mouse_down = false;
                let vp = ctx.world.resource::<EditorViewport>().clone();
                let ray = vp.ray_at_cursor();
                let pd = pick_ray(ctx.world, &ray, vp.kind, &ctx.gesture.ignore_list);
                ctx.gesture.pick_data.push(pd);
                Some(END_PICK)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Box pick
// ---------------------------------------------------------------------------

pub struct StateBeginBoxPick {
    links: HashMap<EditorSignal, StateKey>,
    rect: Option<Entity>,
}

impl StateBeginBoxPick {
    pub fn new(back_to: StateKey) -> Self {
        Self { links: back_link(back_to), rect: None }
    }

    fn rect_bounds(&self, gesture_points: [Vec2; 2]) -> (Vec2, Vec2) {
        let [a, b] = gesture_points;
        (a.min(b), a.max(b))
    }
}

impl EditorState for StateBeginBoxPick {
    fn key(&self) -> StateKey {
        BEGIN_BOX_PICK
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        let start = ctx.gesture.mouse_data[0];
        ctx.gesture.mouse_data[1] = ctx.world.resource::<EditorViewport>().cursor;
        self.rect = Some(ctx.world.resource_scope(|world, mut aids: Mut<VisualAids>| {
            aids.spawn_select_rect(world, start, start)
        }));
    }

    fn transition_out(&mut self, _next: Option<StateKey>, ctx: &mut StateCtx) {
        self.rect = None;
        ctx.gesture.mouse_down = false;
        clear_visual_aids(ctx.world);
    }

    fn signaled(&mut self, signal: EditorSignal, ctx: &mut StateCtx) -> Option<StateKey> {
        match signal {
            EditorSignal::LeftMouseDrag => {
                ctx.gesture.mouse_data[1] = ctx.world.resource::<EditorViewport>().cursor;
                let (min, max) = self.rect_bounds(ctx.gesture.mouse_data);
                if let Some(entity) = self.rect
                    && let Some(mut rect) = ctx.world.get_mut::<SelectRect>(entity)
                {
                    *rect = SelectRect { min, max };
                }
                None
            }
            EditorSignal::LeftMouseUp => {
                let vp = ctx.world.resource::<EditorViewport>().clone();
                let (min, max) = self.rect_bounds(ctx.gesture.mouse_data);
                let extent = max - min;
                if extent.x < MIN_BOX_PICK_EXTENT || extent.y < MIN_BOX_PICK_EXTENT {
                    let ray = vp.ray_at_cursor();
                    let pd = pick_ray(ctx.world, &ray, vp.kind, &ctx.gesture.ignore_list);
                    ctx.gesture.pick_data.push(pd);
                    return Some(END_PICK);
                }
                // Screen y grows downward, so min.y is the top edge. Near
                // corners sit on the unprojected rectangle; far corners are
                // the same rays extruded to depth.
                let screen = [
                    Vec2::new(min.x, min.y),
                    Vec2::new(max.x, min.y),
                    Vec2::new(max.x, max.y),
                    Vec2::new(min.x, max.y),
                ];
                let rays = screen.map(|p| vp.ray_from_screen(p));
                let mut corners = [Vec3::ZERO; 8];
                for (i, ray) in rays.iter().enumerate() {
                    corners[i] = ray.position;
                    corners[i + 4] = ray.point_at(BOX_PICK_DEPTH);
                }
                let frustum = Frustum::from_corners(corners);
                let picks = pick_frustum(ctx.world, &frustum, vp.kind, &ctx.gesture.ignore_list);
                ctx.gesture.pick_data.extend(picks);
                Some(END_PICK)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// End pick
// ---------------------------------------------------------------------------

/// Rest stop after a pick. The owning mode consumes `pick_data` while the
/// machine sits here, then routes `BackToStart`.
pub struct StateEndPick {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateEndPick {
    pub fn new(back_to: StateKey) -> Self {
        Self { links: back_link(back_to) }
    }
}

impl EditorState for StateEndPick {
    fn key(&self) -> StateKey {
        END_PICK
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }
}

// ---------------------------------------------------------------------------
// Delete pick
// ---------------------------------------------------------------------------

pub struct StateDeletePick {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateDeletePick {
    pub fn new(back_to: StateKey) -> Self {
        Self { links: back_link(back_to) }
    }
}

/// Subtree ids parent-first. Prefabs manage their own children, so the walk
/// stops at them; their subtree rides along inside the prefab's snapshot.
fn gather_delete_list(world: &World, id: SceneId, out: &mut Vec<SceneId>) {
    out.push(id);
    let Some(entity) = resolve(world, id) else {
        return;
    };
    if world.get::<Prefab>(entity).is_some() {
        return;
    }
    if let Some(children) = world.get::<Children>(entity) {
        let child_ids: Vec<SceneId> = children
            .iter()
            .filter_map(|child| world.get::<SceneId>(child).copied())
            .collect();
        for child in child_ids {
            gather_delete_list(world, child, out);
        }
    }
}

impl EditorState for StateDeletePick {
    fn key(&self) -> StateKey {
        DELETE_PICK
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        let roots = {
            let selection = ctx.world.resource::<Selection>();
            selection_roots(ctx.world, selection)
        };
        let mut delete_list = Vec::new();
        for root in roots {
            gather_delete_list(ctx.world, root, &mut delete_list);
        }
        // Children are recorded before their parents, so group undo brings
        // parents back first and linkage re-resolves.
        delete_list.reverse();
        if delete_list.is_empty() {
            return;
        }
        info!("deleting {} entities", delete_list.len());
        ctx.world.resource_scope(|world, mut history: Mut<ActionHistory>| {
            history.begin_group();
            let mut count = 0;
            for id in delete_list {
                if let Some(action) = EditorAction::despawn(world, id) {
                    history.add(action);
                    count += 1;
                }
            }
            if let Err(err) = history.group_last(count) {
                warn!("delete grouping failed: {err}");
            }
        });
        ctx.world.resource_mut::<Selection>().clear();
        sync_selected_markers(ctx.world);
    }
}

// ---------------------------------------------------------------------------
// Duplicate
// ---------------------------------------------------------------------------

pub struct StateDuplicate {
    links: HashMap<EditorSignal, StateKey>,
}

impl StateDuplicate {
    pub fn new(back_to: StateKey) -> Self {
        Self { links: back_link(back_to) }
    }
}

impl EditorState for StateDuplicate {
    fn key(&self) -> StateKey {
        DUPLICATE
    }

    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        &self.links
    }

    fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
        let roots = {
            let selection = ctx.world.resource::<Selection>();
            selection_roots(ctx.world, selection)
        };
        if roots.is_empty() {
            return;
        }
        let mut copies = Vec::new();
        ctx.world.resource_scope(|world, mut history: Mut<ActionHistory>| {
            history.begin_group();
            let mut count = 0;
            for root in &roots {
                let Some(snapshot) = EntitySnapshot::capture(world, *root) else {
                    continue;
                };
                let copy = world.resource_scope(|_, mut registry: Mut<SceneIdRegistry>| {
                    snapshot.with_new_ids(&mut registry)
                });
                copies.push(copy.id);
                history.add(EditorAction::spawn(world, copy));
                count += 1;
            }
            if let Err(err) = history.group_last(count) {
                warn!("duplicate grouping failed: {err}");
            }
        });
        info!("duplicated {} entities", copies.len());
        ctx.world.resource_mut::<Selection>().add(&copies, false);
        sync_selected_markers(ctx.world);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
