use bevy::prelude::*;
use thiserror::Error;

use crate::anchor_mod::Anchor;
use crate::scene::{EntitySnapshot, SceneId, resolve};

pub const HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("cannot group {requested} entries, only {available} ungrouped available")]
    GroupTooLarge { requested: usize, available: usize },
    #[error("group_last called without begin_group")]
    GroupNotOpen,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One undoable edit. Constructors perform the forward step (or capture the
/// starting value for swap-style edits), so an action is live the moment it
/// is pushed.
#[derive(Debug)]
pub enum EditorAction {
    /// Swap-style: `stored` always holds the transform the entity does not
    /// currently have, so undo and redo are the same exchange.
    SetTransform { id: SceneId, stored: Transform },
    /// Swap-style, same contract as `SetTransform`.
    SetAnchor { id: SceneId, stored: Anchor },
    Despawn { snapshot: EntitySnapshot },
    Spawn { snapshot: EntitySnapshot },
}

impl EditorAction {
    /// Capture the entity's current transform as the swap partner. Push this
    /// at gesture start; the live entity accumulates the edit.
    pub fn set_transform(world: &World, id: SceneId) -> Option<Self> {
        let entity = resolve(world, id)?;
        let stored = *world.get::<Transform>(entity)?;
        Some(Self::SetTransform { id, stored })
    }

    pub fn set_anchor(world: &World, id: SceneId) -> Option<Self> {
        let entity = resolve(world, id)?;
        let stored = *world.get::<Anchor>(entity)?;
        Some(Self::SetAnchor { id, stored })
    }

    /// Snapshot the subtree and despawn it.
    pub fn despawn(world: &mut World, id: SceneId) -> Option<Self> {
        let snapshot = EntitySnapshot::capture(world, id)?;
        snapshot.despawn(world);
        Some(Self::Despawn { snapshot })
    }

    /// Spawn the snapshot's subtree.
    pub fn spawn(world: &mut World, snapshot: EntitySnapshot) -> Self {
        snapshot.respawn(world);
        Self::Spawn { snapshot }
    }

    pub fn undo(&mut self, world: &mut World) {
        match self {
            Self::SetTransform { id, stored } => swap_transform(world, *id, stored),
            Self::SetAnchor { id, stored } => swap_anchor(world, *id, stored),
            Self::Despawn { snapshot } => snapshot.respawn(world),
            Self::Spawn { snapshot } => snapshot.despawn(world),
        }
    }

    pub fn redo(&mut self, world: &mut World) {
        match self {
            Self::SetTransform { id, stored } => swap_transform(world, *id, stored),
            Self::SetAnchor { id, stored } => swap_anchor(world, *id, stored),
            Self::Despawn { snapshot } => snapshot.despawn(world),
            Self::Spawn { snapshot } => snapshot.respawn(world),
        }
    }
}

fn swap_transform(world: &mut World, id: SceneId, stored: &mut Transform) {
    let Some(entity) = resolve(world, id) else {
        warn!("transform history entry refers to missing entity {id:?}");
        return;
    };
    if let Some(mut transform) = world.get_mut::<Transform>(entity) {
        std::mem::swap(&mut *transform, stored);
    }
}

fn swap_anchor(world: &mut World, id: SceneId, stored: &mut Anchor) {
    let Some(entity) = resolve(world, id) else {
        warn!("anchor history entry refers to missing entity {id:?}");
        return;
    };
    if let Some(mut anchor) = world.get_mut::<Anchor>(entity) {
        std::mem::swap(&mut *anchor, stored);
    }
}

/// A stack entry: a root action plus grouped follow-up actions that undo and
/// redo with it as one unit.
#[derive(Debug)]
pub struct ActionEntry {
    pub root: EditorAction,
    pub group: Vec<EditorAction>,
}

impl ActionEntry {
    fn undo(&mut self, world: &mut World) {
        for child in self.group.iter_mut().rev() {
            child.undo(world);
        }
        self.root.undo(world);
    }

    fn redo(&mut self, world: &mut World) {
        self.root.redo(world);
        for child in self.group.iter_mut() {
            child.redo(world);
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Bounded, branch-truncating undo stack. One stack with a pointer: entries
/// above the pointer are redoable, pushing while below the top drops them.
#[derive(Resource)]
pub struct ActionHistory {
    stack: Vec<ActionEntry>,
    /// `None` is the bottom sentinel: everything on the stack is redoable.
    pointer: Option<usize>,
    capacity: usize,
    grouping: bool,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl ActionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { stack: Vec::new(), pointer: None, capacity, grouping: false }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn pointer(&self) -> Option<usize> {
        self.pointer
    }

    pub fn can_undo(&self) -> bool {
        self.pointer.is_some()
    }

    pub fn can_redo(&self) -> bool {
        match self.pointer {
            None => !self.stack.is_empty(),
            Some(p) => p + 1 < self.stack.len(),
        }
    }

    /// Push an already-applied action. Redoable entries above the pointer
    /// are dropped first; at the bottom sentinel the whole stack goes.
    pub fn add(&mut self, action: EditorAction) {
        match self.pointer {
            Some(p) if p + 1 < self.stack.len() => self.stack.truncate(p + 1),
            None if !self.stack.is_empty() => self.stack.clear(),
            _ => {}
        }
        self.stack.push(ActionEntry { root: action, group: Vec::new() });
        self.pointer = Some(self.stack.len() - 1);
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        if self.grouping {
            return;
        }
        while self.stack.len() > self.capacity {
            warn!("undo history full, dropping oldest entry");
            self.stack.remove(0);
        }
        if !self.stack.is_empty() {
            self.pointer = Some(self.stack.len() - 1);
        }
    }

    pub fn undo(&mut self, world: &mut World) {
        let Some(p) = self.pointer else {
            return;
        };
        self.stack[p].undo(world);
        self.pointer = p.checked_sub(1);
    }

    pub fn redo(&mut self, world: &mut World) {
        let next = match self.pointer {
            None => 0,
            Some(p) => p + 1,
        };
        if next >= self.stack.len() {
            return;
        }
        self.stack[next].redo(world);
        self.pointer = Some(next);
    }

    /// Open a group: capacity eviction is held off until `group_last`.
    pub fn begin_group(&mut self) {
        self.grouping = true;
    }

    /// Collapse the last `n` pushed entries into one: the earliest becomes
    /// the root, the rest its group.
    pub fn group_last(&mut self, n: usize) -> Result<(), HistoryError> {
        if !self.grouping {
            return Err(HistoryError::GroupNotOpen);
        }
        self.grouping = false;
        if n > 1 {
            let available = self
                .stack
                .iter()
                .rev()
                .take_while(|entry| entry.group.is_empty())
                .count();
            if n > available {
                self.grouping = false;
                return Err(HistoryError::GroupTooLarge { requested: n, available });
            }
            let base = self.stack.len() - n;
            let tail = self.stack.split_off(base + 1);
            let root = &mut self.stack[base];
            root.group.extend(tail.into_iter().map(|entry| entry.root));
            self.pointer = Some(self.stack.len() - 1);
        }
        self.enforce_capacity();
        Ok(())
    }

    /// Drop the entry at the top of the stack without undoing it. Cancel
    /// path for gestures that pushed an entry and then did nothing.
    pub fn remove_last(&mut self) {
        if self.pointer == Some(self.stack.len().wrapping_sub(1)) && !self.stack.is_empty() {
            self.stack.pop();
            self.pointer = self.stack.len().checked_sub(1);
        }
    }

    /// Drop everything and return to the bottom sentinel.
    pub fn clear(&mut self) {
        self.stack.clear();
        self.pointer = None;
        self.grouping = false;
    }
}

// ---------------------------------------------------------------------------
// Keyboard entry points
// ---------------------------------------------------------------------------

/// Ctrl+Z / Ctrl+Y (or Ctrl+Shift+Z). Exclusive so actions can edit the
/// world directly.
pub fn handle_undo_redo_keys(world: &mut World) {
    let keys = world.resource::<ButtonInput<KeyCode>>();
    let ctrl = keys.pressed(KeyCode::ControlLeft) || keys.pressed(KeyCode::ControlRight);
    let shift = keys.pressed(KeyCode::ShiftLeft) || keys.pressed(KeyCode::ShiftRight);
    let undo = ctrl && !shift && keys.just_pressed(KeyCode::KeyZ);
    let redo =
        ctrl && (keys.just_pressed(KeyCode::KeyY) || (shift && keys.just_pressed(KeyCode::KeyZ)));
    if !undo && !redo {
        return;
    }
    world.resource_scope(|world, mut history: Mut<ActionHistory>| {
        if undo {
            history.undo(world);
        } else {
            history.redo(world);
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneBounds, SceneIdRegistry, register_entity};

    fn test_world() -> World {
        let mut world = World::new();
        world.init_resource::<SceneIdRegistry>();
        world
    }

    fn spawn_at(world: &mut World, x: f32) -> SceneId {
        let entity = world
            .spawn((Transform::from_xyz(x, 0.0, 0.0), SceneBounds::default()))
            .id();
        register_entity(world, entity)
    }

    fn translation_x(world: &World, id: SceneId) -> f32 {
        let entity = resolve(world, id).unwrap();
        world.get::<Transform>(entity).unwrap().translation.x
    }

    fn move_to(world: &mut World, id: SceneId, x: f32) {
        let entity = resolve(world, id).unwrap();
        world.get_mut::<Transform>(entity).unwrap().translation.x = x;
    }

    /// Push a swap action capturing the current transform, then apply an
    /// edit, the way a drag gesture does.
    fn push_move(world: &mut World, history: &mut ActionHistory, id: SceneId, x: f32) {
        history.add(EditorAction::set_transform(world, id).unwrap());
        move_to(world, id, x);
    }

    #[test]
    fn undo_redo_are_inverse() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let id = spawn_at(&mut world, 0.0);

        push_move(&mut world, &mut history, id, 3.0);
        assert_eq!(translation_x(&world, id), 3.0);

        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 0.0);
        history.redo(&mut world);
        assert_eq!(translation_x(&world, id), 3.0);

        // No-ops at the ends.
        history.redo(&mut world);
        assert_eq!(translation_x(&world, id), 3.0);
        history.undo(&mut world);
        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 0.0);
    }

    #[test]
    fn push_after_undo_truncates_branch() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let id = spawn_at(&mut world, 0.0);

        push_move(&mut world, &mut history, id, 1.0);
        push_move(&mut world, &mut history, id, 2.0);
        push_move(&mut world, &mut history, id, 3.0);
        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 2.0);

        push_move(&mut world, &mut history, id, 9.0);
        assert_eq!(history.len(), 3);

        // The dropped branch is unreachable: redo past the new top is a no-op.
        history.redo(&mut world);
        assert_eq!(translation_x(&world, id), 9.0);
        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 2.0);
    }

    #[test]
    fn push_at_bottom_sentinel_clears_stack() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let id = spawn_at(&mut world, 0.0);

        push_move(&mut world, &mut history, id, 1.0);
        push_move(&mut world, &mut history, id, 2.0);
        history.undo(&mut world);
        history.undo(&mut world);
        assert!(!history.can_undo());

        push_move(&mut world, &mut history, id, 5.0);
        assert_eq!(history.len(), 1);
        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 0.0);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut world = test_world();
        let mut history = ActionHistory::with_capacity(3);
        let id = spawn_at(&mut world, 0.0);

        for x in 1..=5 {
            push_move(&mut world, &mut history, id, x as f32);
        }
        assert_eq!(history.len(), 3);

        // Undo all the way: only the last three edits are reachable.
        history.undo(&mut world);
        history.undo(&mut world);
        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 2.0);
        assert!(!history.can_undo());
    }

    #[test]
    fn grouping_defers_eviction() {
        let mut world = test_world();
        let mut history = ActionHistory::with_capacity(2);
        let ids: Vec<_> = (0..4).map(|i| spawn_at(&mut world, i as f32)).collect();

        history.begin_group();
        for &id in &ids {
            push_move(&mut world, &mut history, id, 100.0);
        }
        // More entries than capacity while the group is open.
        assert_eq!(history.len(), 4);
        history.group_last(4).unwrap();
        assert_eq!(history.len(), 1);

        history.undo(&mut world);
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(translation_x(&world, id), i as f32);
        }
        history.redo(&mut world);
        for &id in &ids {
            assert_eq!(translation_x(&world, id), 100.0);
        }
    }

    #[test]
    fn group_errors() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let id = spawn_at(&mut world, 0.0);

        assert_eq!(history.group_last(1), Err(HistoryError::GroupNotOpen));

        history.begin_group();
        push_move(&mut world, &mut history, id, 1.0);
        assert_eq!(
            history.group_last(2),
            Err(HistoryError::GroupTooLarge { requested: 2, available: 1 })
        );
    }

    #[test]
    fn remove_last_drops_without_undoing() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let id = spawn_at(&mut world, 0.0);

        push_move(&mut world, &mut history, id, 1.0);
        push_move(&mut world, &mut history, id, 2.0);
        history.remove_last();
        assert_eq!(history.len(), 1);
        assert_eq!(translation_x(&world, id), 2.0);

        history.undo(&mut world);
        assert_eq!(translation_x(&world, id), 0.0);
    }

    #[test]
    fn despawn_action_restores_subtree() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let parent = spawn_at(&mut world, 1.0);
        let parent_entity = resolve(&world, parent).unwrap();
        let child_entity = world
            .spawn((Transform::from_xyz(0.0, 1.0, 0.0), ChildOf(parent_entity)))
            .id();
        let child = register_entity(&mut world, child_entity);

        history.add(EditorAction::despawn(&mut world, parent).unwrap());
        assert!(resolve(&world, parent).is_none());
        assert!(resolve(&world, child).is_none());

        history.undo(&mut world);
        let parent_entity = resolve(&world, parent).unwrap();
        let child_entity = resolve(&world, child).unwrap();
        assert_eq!(world.get::<ChildOf>(child_entity).map(|p| p.0), Some(parent_entity));

        history.redo(&mut world);
        assert!(resolve(&world, parent).is_none());
    }

    #[test]
    fn clear_returns_to_sentinel() {
        let mut world = test_world();
        let mut history = ActionHistory::default();
        let id = spawn_at(&mut world, 0.0);
        push_move(&mut world, &mut history, id, 1.0);

        history.clear();
        assert!(history.is_empty());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
