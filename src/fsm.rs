use std::collections::HashMap;

use bevy::prelude::*;
use mallet_geometry::Plane;

use crate::anchor_mod::{Anchor, AnchorHandle};
use crate::scene::{PickData, SceneId};
use crate::signals::EditorSignal;

// ---------------------------------------------------------------------------
// Gesture payload
// ---------------------------------------------------------------------------

/// Mutable payload shared by every state of a mode's machine. Owned by the
/// mode and threaded through all state calls, so states hand data to each
/// other without knowing each other's types.
#[derive(Default)]
pub struct GestureData {
    pub mouse_down: bool,
    /// Previous and current gesture screen points.
    pub mouse_data: [Vec2; 2],
    /// Pick results waiting to be consumed by the owning mode.
    pub pick_data: Vec<PickData>,
    /// Entities the pickers must skip (reference grid and friends).
    pub ignore_list: Vec<SceneId>,
    /// Constraint plane of the active drag.
    pub intersection_plane: Plane,
    /// World point where the gesture took hold of the gizmo.
    pub grab_point: Vec3,
    /// Accumulated unsnapped translation / per-axis scale delta.
    pub accum: Vec3,
    /// Accumulated unsnapped rotation angle.
    pub angle_accum: f32,
    /// Gesture-start transforms of the manipulated roots.
    pub start_transforms: Vec<(SceneId, Transform)>,
    /// Gesture-start anchor of the manipulated surface.
    pub start_anchor: Option<(SceneId, Anchor)>,
    /// Anchor handle held by the active drag.
    pub anchor_grab: Option<AnchorHandle>,
}

impl GestureData {
    pub fn reset_mouse(&mut self) {
        self.mouse_down = false;
        self.mouse_data = [Vec2::ZERO; 2];
    }
}

/// Borrowed context handed to every state call.
pub struct StateCtx<'w, 'g> {
    pub world: &'w mut World,
    pub gesture: &'g mut GestureData,
}

// ---------------------------------------------------------------------------
// State trait
// ---------------------------------------------------------------------------

pub type StateKey = &'static str;

pub trait EditorState: Send + Sync + 'static {
    fn key(&self) -> StateKey;

    fn transition_in(&mut self, _prev: Option<StateKey>, _ctx: &mut StateCtx) {}
    fn transition_out(&mut self, _next: Option<StateKey>, _ctx: &mut StateCtx) {}

    /// Per-frame work. A returned signal is fed straight back into the
    /// machine (self-signaling).
    fn update(&mut self, _dt: f32, _ctx: &mut StateCtx) -> Option<EditorSignal> {
        None
    }

    /// React to a signal. Returning a key requests a transition.
    fn signaled(&mut self, _signal: EditorSignal, _ctx: &mut StateCtx) -> Option<StateKey> {
        None
    }

    /// Static signal-to-state links, consulted before `signaled`.
    fn links(&self) -> &HashMap<EditorSignal, StateKey> {
        static EMPTY: std::sync::OnceLock<HashMap<EditorSignal, StateKey>> =
            std::sync::OnceLock::new();
        EMPTY.get_or_init(HashMap::default)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// A flat machine over boxed states. States are few per mode, so lookup is
/// a linear scan in insertion order.
#[derive(Default)]
pub struct StateMachine {
    states: Vec<Box<dyn EditorState>>,
    current: Option<usize>,
}

impl StateMachine {
    pub fn push_state(&mut self, state: Box<dyn EditorState>) {
        if self.index_of(state.key()).is_some() {
            warn!("duplicate state {:?} ignored", state.key());
            return;
        }
        self.states.push(state);
    }

    /// Select the initial state without running transitions.
    pub fn start_at(&mut self, key: StateKey) {
        self.current = self.index_of(key);
        debug_assert!(self.current.is_some(), "unknown start state {key:?}");
    }

    pub fn current_key(&self) -> Option<StateKey> {
        self.current.map(|i| self.states[i].key())
    }

    pub fn query_state(&self, key: StateKey) -> bool {
        self.index_of(key).is_some()
    }

    fn index_of(&self, key: StateKey) -> Option<usize> {
        self.states.iter().position(|s| s.key() == key)
    }

    /// Route a signal to the current state. The state's link table wins;
    /// `signaled` is the fallback. `None` from both means no transition.
    pub fn signal(&mut self, signal: EditorSignal, ctx: &mut StateCtx) {
        let Some(cur) = self.current else {
            return;
        };
        let dest = match self.states[cur].links().get(&signal) {
            Some(&key) => Some(key),
            None => self.states[cur].signaled(signal, ctx),
        };
        let Some(dest) = dest else {
            return;
        };
        let Some(next) = self.index_of(dest) else {
            warn!("state {:?} requested unknown state {dest:?}", self.states[cur].key());
            return;
        };
        // A destination naming the current state means stay put.
        if next == cur {
            return;
        }
        let prev_key = self.states[cur].key();
        debug!("state transition {prev_key:?} -> {dest:?}");
        self.states[cur].transition_out(Some(dest), ctx);
        self.states[next].transition_in(Some(prev_key), ctx);
        self.current = Some(next);
    }

    /// Update the current state, feeding any self-signal back in.
    pub fn update(&mut self, dt: f32, ctx: &mut StateCtx) {
        let Some(cur) = self.current else {
            return;
        };
        if let Some(signal) = self.states[cur].update(dt, ctx) {
            self.signal(signal, ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        key: StateKey,
        links: HashMap<EditorSignal, StateKey>,
    }

    impl Counting {
        fn new(key: StateKey) -> Self {
            Self { key, links: HashMap::default() }
        }

        fn linked(key: StateKey, signal: EditorSignal, to: StateKey) -> Self {
            let mut s = Self::new(key);
            s.links.insert(signal, to);
            s
        }
    }

    impl EditorState for Counting {
        fn key(&self) -> StateKey {
            self.key
        }

        fn signaled(&mut self, signal: EditorSignal, _ctx: &mut StateCtx) -> Option<StateKey> {
            (signal == EditorSignal::LeftMouseUp).then_some("b")
        }

        fn links(&self) -> &HashMap<EditorSignal, StateKey> {
            &self.links
        }
    }

    fn ctx_world() -> World {
        World::new()
    }

    #[test]
    fn links_take_precedence_over_signaled() {
        let mut machine = StateMachine::default();
        machine.push_state(Box::new(Counting::linked("a", EditorSignal::LeftMouseUp, "c")));
        machine.push_state(Box::new(Counting::new("b")));
        machine.push_state(Box::new(Counting::new("c")));
        machine.start_at("a");

        let mut world = ctx_world();
        let mut gesture = GestureData::default();
        let mut ctx = StateCtx { world: &mut world, gesture: &mut gesture };
        machine.signal(EditorSignal::LeftMouseUp, &mut ctx);
        assert_eq!(machine.current_key(), Some("c"));
    }

    #[test]
    fn signaled_fallback_and_transition_order() {
        let mut machine = StateMachine::default();
        machine.push_state(Box::new(Counting::new("a")));
        machine.push_state(Box::new(Counting::new("b")));
        machine.start_at("a");

        let mut world = ctx_world();
        let mut gesture = GestureData::default();
        let mut ctx = StateCtx { world: &mut world, gesture: &mut gesture };

        // Unhandled signal: no transition.
        machine.signal(EditorSignal::Delete, &mut ctx);
        assert_eq!(machine.current_key(), Some("a"));

        machine.signal(EditorSignal::LeftMouseUp, &mut ctx);
        assert_eq!(machine.current_key(), Some("b"));
    }

    #[test]
    fn self_targeted_signal_does_not_transition() {
        #[derive(Resource, Default)]
        struct Transitions(u32);

        struct SelfLinked {
            links: HashMap<EditorSignal, StateKey>,
        }

        impl EditorState for SelfLinked {
            fn key(&self) -> StateKey {
                "a"
            }

            fn transition_in(&mut self, _prev: Option<StateKey>, ctx: &mut StateCtx) {
                ctx.world.resource_mut::<Transitions>().0 += 1;
            }

            fn transition_out(&mut self, _next: Option<StateKey>, ctx: &mut StateCtx) {
                ctx.world.resource_mut::<Transitions>().0 += 1;
            }

            fn links(&self) -> &HashMap<EditorSignal, StateKey> {
                &self.links
            }
        }

        let mut links = HashMap::new();
        links.insert(EditorSignal::BackToStart, "a");
        let mut machine = StateMachine::default();
        machine.push_state(Box::new(SelfLinked { links }));
        machine.start_at("a");

        let mut world = ctx_world();
        world.init_resource::<Transitions>();
        let mut gesture = GestureData::default();
        let mut ctx = StateCtx { world: &mut world, gesture: &mut gesture };
        machine.signal(EditorSignal::BackToStart, &mut ctx);

        assert_eq!(machine.current_key(), Some("a"));
        assert_eq!(world.resource::<Transitions>().0, 0);
    }

    #[test]
    fn duplicate_state_keys_rejected() {
        let mut machine = StateMachine::default();
        machine.push_state(Box::new(Counting::new("a")));
        machine.push_state(Box::new(Counting::new("a")));
        machine.push_state(Box::new(Counting::new("b")));
        machine.start_at("b");
        assert!(machine.query_state("a"));
        assert_eq!(machine.current_key(), Some("b"));
    }
}
