use bevy::prelude::*;

use crate::anchor_mod::AnchorMode;
use crate::fsm::{GestureData, StateCtx, StateMachine};
use crate::gizmo::GizmoKind;
use crate::picking::{
    BEGIN_PICK, DELETE_PICK, DUPLICATE, END_PICK, StateBeginBoxPick, StateBeginPick,
    StateDeletePick, StateDuplicate, StateEndPick,
};
use crate::selection::{Selection, sync_selected_markers};
use crate::signals::{EditorSignal, InputModifiers, SignalQueue};
use crate::transform_mod::TransformMode;
use crate::viewport::EditorViewport;
use crate::visual_aids::clear_visual_aids;

// ---------------------------------------------------------------------------
// Mode trait and stack
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeId {
    Base,
    Select,
    Cursor,
    Move,
    Rotate,
    Scale,
    Anchor,
}

/// An editor interaction mode. Exactly one non-base mode sits on top of the
/// stack at a time and receives input signals and per-frame updates.
pub trait EditorMode: Send + Sync + 'static {
    fn id(&self) -> ModeId;
    fn init(&mut self, world: &mut World);
    fn uninit(&mut self, world: &mut World);
    fn update(&mut self, dt: f32, world: &mut World);
    fn signal(&mut self, signal: EditorSignal, world: &mut World);
}

/// Inert floor of the mode stack; swallows everything.
pub struct BaseMode;

impl EditorMode for BaseMode {
    fn id(&self) -> ModeId {
        ModeId::Base
    }

    fn init(&mut self, _world: &mut World) {}

    fn uninit(&mut self, _world: &mut World) {}

    fn update(&mut self, _dt: f32, _world: &mut World) {}

    fn signal(&mut self, _signal: EditorSignal, _world: &mut World) {}
}

#[derive(Resource)]
pub struct ModeStack {
    modes: Vec<Box<dyn EditorMode>>,
}

impl Default for ModeStack {
    fn default() -> Self {
        Self { modes: vec![Box::new(BaseMode)] }
    }
}

impl ModeStack {
    pub fn current_id(&self) -> ModeId {
        self.modes.last().map(|m| m.id()).unwrap_or(ModeId::Base)
    }

    fn top(&mut self) -> &mut Box<dyn EditorMode> {
        self.modes.last_mut().expect("mode stack never empties below BaseMode")
    }
}

fn make_mode(id: ModeId) -> Option<Box<dyn EditorMode>> {
    match id {
        ModeId::Base => None,
        ModeId::Select => Some(Box::new(SelectMode::new())),
        ModeId::Cursor => Some(Box::new(CursorMode::new())),
        ModeId::Move => Some(Box::new(TransformMode::translate())),
        ModeId::Rotate => Some(Box::new(TransformMode::rotate())),
        ModeId::Scale => Some(Box::new(TransformMode::scale())),
        ModeId::Anchor => Some(Box::new(AnchorMode::new())),
    }
}

/// Replace the active mode. The outgoing mode is torn down first; leftover
/// guide lines and rects from it are swept regardless.
pub fn set_mode(world: &mut World, id: ModeId) {
    world.resource_scope(|world, mut stack: Mut<ModeStack>| {
        if stack.current_id() == id {
            return;
        }
        if stack.modes.len() > 1
            && let Some(mut old) = stack.modes.pop()
        {
            old.uninit(world);
        }
        clear_visual_aids(world);
        if let Some(mut mode) = make_mode(id) {
            info!("entering {:?} mode", id);
            mode.init(world);
            stack.modes.push(mode);
        }
    });
}

// ---------------------------------------------------------------------------
// Pick result consumption
// ---------------------------------------------------------------------------

/// Fold finished pick-cycle results back into editor state. Every mode that
/// embeds the pick states calls this after driving its machine.
pub(crate) fn consume_pick_results(
    machine: &mut StateMachine,
    gesture: &mut GestureData,
    world: &mut World,
) {
    match machine.current_key() {
        Some(END_PICK) => {
            let picked = std::mem::take(&mut gesture.pick_data);
            let ids: Vec<_> = picked.iter().filter_map(|pd| pd.entity).collect();
            let additive = world.resource::<InputModifiers>().shift;
            world.resource_mut::<Selection>().add(&ids, additive);
            sync_selected_markers(world);
            let mut ctx = StateCtx { world: &mut *world, gesture };
            machine.signal(EditorSignal::BackToStart, &mut ctx);
        }
        Some(DELETE_PICK) | Some(DUPLICATE) => {
            let mut ctx = StateCtx { world: &mut *world, gesture };
            machine.signal(EditorSignal::BackToStart, &mut ctx);
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Select mode
// ---------------------------------------------------------------------------

pub struct SelectMode {
    machine: StateMachine,
    gesture: GestureData,
}

impl SelectMode {
    pub fn new() -> Self {
        Self { machine: StateMachine::default(), gesture: GestureData::default() }
    }
}

impl Default for SelectMode {
    fn default() -> Self {
        Self::new()
    }
}

fn push_pick_states(machine: &mut StateMachine) {
    machine.push_state(Box::new(StateBeginPick::new(BEGIN_PICK)));
    machine.push_state(Box::new(StateBeginBoxPick::new(BEGIN_PICK)));
    machine.push_state(Box::new(StateEndPick::new(BEGIN_PICK)));
    machine.push_state(Box::new(StateDeletePick::new(BEGIN_PICK)));
    machine.push_state(Box::new(StateDuplicate::new(BEGIN_PICK)));
}

impl EditorMode for SelectMode {
    fn id(&self) -> ModeId {
        ModeId::Select
    }

    fn init(&mut self, _world: &mut World) {
        push_pick_states(&mut self.machine);
        self.machine.start_at(BEGIN_PICK);
    }

    fn uninit(&mut self, world: &mut World) {
        clear_visual_aids(world);
    }

    fn update(&mut self, dt: f32, world: &mut World) {
        let mut ctx = StateCtx { world: &mut *world, gesture: &mut self.gesture };
        self.machine.update(dt, &mut ctx);
        consume_pick_results(&mut self.machine, &mut self.gesture, world);
    }

    fn signal(&mut self, signal: EditorSignal, world: &mut World) {
        let mut ctx = StateCtx { world, gesture: &mut self.gesture };
        self.machine.signal(signal, &mut ctx);
    }
}

// ---------------------------------------------------------------------------
// Cursor mode
// ---------------------------------------------------------------------------

/// The 3D placement cursor. Spawning and pasting happen at this point.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct Cursor3d {
    pub position: Vec3,
}

pub struct CursorMode {
    machine: StateMachine,
    gesture: GestureData,
}

impl CursorMode {
    pub fn new() -> Self {
        Self { machine: StateMachine::default(), gesture: GestureData::default() }
    }
}

impl Default for CursorMode {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorMode for CursorMode {
    fn id(&self) -> ModeId {
        ModeId::Cursor
    }

    fn init(&mut self, _world: &mut World) {
        push_pick_states(&mut self.machine);
        self.machine.start_at(BEGIN_PICK);
    }

    fn uninit(&mut self, world: &mut World) {
        clear_visual_aids(world);
    }

    fn update(&mut self, dt: f32, world: &mut World) {
        let mut ctx = StateCtx { world: &mut *world, gesture: &mut self.gesture };
        self.machine.update(dt, &mut ctx);
        // Picks move the cursor instead of the selection. A miss still lands
        // on the fallback point along the ray.
        if self.machine.current_key() == Some(END_PICK) {
            if let Some(pd) = self.gesture.pick_data.first() {
                world.resource_mut::<Cursor3d>().position = pd.pick_pos;
            }
            self.gesture.pick_data.clear();
            let mut ctx = StateCtx { world: &mut *world, gesture: &mut self.gesture };
            self.machine.signal(EditorSignal::BackToStart, &mut ctx);
        } else {
            consume_pick_results(&mut self.machine, &mut self.gesture, world);
        }
    }

    fn signal(&mut self, signal: EditorSignal, world: &mut World) {
        let mut ctx = StateCtx { world, gesture: &mut self.gesture };
        self.machine.signal(signal, &mut ctx);
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Drain the frame's input signals into the active mode, then tick it.
pub fn drive_modes(world: &mut World) {
    let dt = world
        .get_resource::<Time>()
        .map(|t| t.delta_secs())
        .unwrap_or(1.0 / 60.0);
    let signals = world.resource_mut::<SignalQueue>().drain();
    world.resource_scope(|world, mut stack: Mut<ModeStack>| {
        for signal in signals {
            stack.top().signal(signal, world);
        }
        stack.top().update(dt, world);
    });
}

/// Mode hotkeys, active while the viewport has focus.
pub fn handle_mode_keys(world: &mut World) {
    if !world.resource::<EditorViewport>().focused {
        return;
    }
    let keys = world.resource::<ButtonInput<KeyCode>>();
    let target = if keys.just_pressed(KeyCode::KeyQ) {
        Some(ModeId::Select)
    } else if keys.just_pressed(KeyCode::KeyW) {
        Some(ModeId::Move)
    } else if keys.just_pressed(KeyCode::KeyE) {
        Some(ModeId::Rotate)
    } else if keys.just_pressed(KeyCode::KeyR) {
        Some(ModeId::Scale)
    } else if keys.just_pressed(KeyCode::KeyT) {
        Some(ModeId::Anchor)
    } else if keys.just_pressed(KeyCode::KeyC) {
        Some(ModeId::Cursor)
    } else {
        None
    };
    if let Some(id) = target {
        set_mode(world, id);
    }
}

/// Gizmo kind for the current mode, if it shows one.
pub fn mode_gizmo_kind(id: ModeId) -> Option<GizmoKind> {
    match id {
        ModeId::Move => Some(GizmoKind::Translate),
        ModeId::Rotate => Some(GizmoKind::Rotate),
        ModeId::Scale => Some(GizmoKind::Scale),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
