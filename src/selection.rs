use bevy::prelude::*;

use crate::scene::{SceneId, resolve};

/// Marker component placed on selected entities. Multiple entities can have this.
#[derive(Component)]
pub struct Selected;

/// Resource tracking the full selection state.
#[derive(Resource, Default)]
pub struct Selection {
    /// Ordered list of selected ids. The last id is the primary selection.
    entities: Vec<SceneId>,
}

impl Selection {
    /// Fold pick results into the selection. Non-additive picks replace it.
    /// An additive re-click of the primary deselects it; re-clicking any
    /// other selected entity promotes it to primary instead. Additive
    /// multi-picks only ever extend.
    pub fn add(&mut self, ids: &[SceneId], additive: bool) {
        if !additive {
            self.entities.clear();
        }
        if additive
            && let [id] = *ids
            && self.is_selected(id)
        {
            if self.primary() == Some(id) {
                self.remove(id);
            } else {
                self.make_current(id);
            }
            return;
        }
        for &id in ids {
            if !self.is_selected(id) {
                self.entities.push(id);
            }
        }
    }

    /// Promote an id to primary, inserting it first when not yet selected.
    pub fn make_current(&mut self, id: SceneId) {
        self.remove(id);
        self.entities.push(id);
    }

    pub fn remove(&mut self, id: SceneId) {
        self.entities.retain(|&e| e != id);
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Get the primary (last) selected id.
    pub fn primary(&self) -> Option<SceneId> {
        self.entities.last().copied()
    }

    pub fn is_selected(&self, id: SceneId) -> bool {
        self.entities.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = SceneId> + '_ {
        self.entities.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Mirror the `Selected` marker onto entities after the resource changed.
pub fn sync_selected_markers(world: &mut World) {
    let selected: Vec<SceneId> = world.resource::<Selection>().iter().collect();
    let mut stale = Vec::new();
    let mut query = world.query_filtered::<(Entity, &SceneId), With<Selected>>();
    for (entity, id) in query.iter(world) {
        if !selected.contains(id) {
            stale.push(entity);
        }
    }
    for entity in stale {
        world.entity_mut(entity).remove::<Selected>();
    }
    for id in selected {
        if let Some(entity) = resolve(world, id) {
            world.entity_mut(entity).insert(Selected);
        }
    }
}

/// Reduce the selection to hierarchy roots: ids whose selected ancestor
/// would already carry them through a transform or delete.
pub fn selection_roots(world: &World, selection: &Selection) -> Vec<SceneId> {
    selection
        .iter()
        .filter(|&id| {
            let Some(entity) = resolve(world, id) else {
                return false;
            };
            let mut cur = entity;
            while let Some(parent) = world.get::<ChildOf>(cur) {
                cur = parent.0;
                if let Some(pid) = world.get::<SceneId>(cur)
                    && selection.is_selected(*pid)
                {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Clean up the Selection resource when a Selected component is removed
/// (e.g., entity despawned).
pub fn on_selected_removed(
    trigger: On<Remove, Selected>,
    ids: Query<&SceneId>,
    mut selection: ResMut<Selection>,
) {
    let entity = trigger.event_target();
    if let Ok(&id) = ids.get(entity) {
        selection.remove(id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_reclick_of_primary_deselects() {
        let mut sel = Selection::default();
        sel.add(&[SceneId(1)], false);
        sel.add(&[SceneId(2)], true);
        assert_eq!(sel.len(), 2);
        assert_eq!(sel.primary(), Some(SceneId(2)));

        sel.add(&[SceneId(2)], true);
        assert!(!sel.is_selected(SceneId(2)));
        assert_eq!(sel.primary(), Some(SceneId(1)));

        // The sole remaining entity is the primary, so it toggles off too.
        sel.add(&[SceneId(1)], true);
        assert!(sel.is_empty());
    }

    #[test]
    fn additive_reclick_of_secondary_promotes() {
        let mut sel = Selection::default();
        sel.add(&[SceneId(1)], false);
        sel.add(&[SceneId(2)], true);

        sel.add(&[SceneId(1)], true);
        assert!(sel.is_selected(SceneId(1)));
        assert!(sel.is_selected(SceneId(2)));
        assert_eq!(sel.primary(), Some(SceneId(1)));
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn additive_multi_pick_never_deselects() {
        let mut sel = Selection::default();
        sel.add(&[SceneId(1), SceneId(2)], false);

        // Box pick sweeping up already-selected entities extends only.
        sel.add(&[SceneId(1), SceneId(2), SceneId(3)], true);
        assert!(sel.is_selected(SceneId(1)));
        assert!(sel.is_selected(SceneId(2)));
        assert!(sel.is_selected(SceneId(3)));
        assert_eq!(sel.len(), 3);
        assert_eq!(sel.primary(), Some(SceneId(3)));
    }

    #[test]
    fn non_additive_pick_replaces() {
        let mut sel = Selection::default();
        sel.add(&[SceneId(1), SceneId(2)], false);
        sel.add(&[SceneId(3)], false);
        assert_eq!(sel.len(), 1);
        assert_eq!(sel.primary(), Some(SceneId(3)));
    }

    #[test]
    fn make_current_moves_to_back() {
        let mut sel = Selection::default();
        sel.add(&[SceneId(1), SceneId(2), SceneId(3)], false);
        sel.make_current(SceneId(1));
        assert_eq!(sel.primary(), Some(SceneId(1)));
        assert_eq!(sel.len(), 3);

        // Unselected ids are inserted and promoted.
        sel.make_current(SceneId(9));
        assert_eq!(sel.primary(), Some(SceneId(9)));
        assert_eq!(sel.len(), 4);
    }

    #[test]
    fn roots_drop_selected_descendants() {
        use crate::scene::{SceneIdRegistry, register_entity};

        let mut world = World::new();
        world.init_resource::<SceneIdRegistry>();
        let parent_entity = world.spawn(Transform::default()).id();
        let parent = register_entity(&mut world, parent_entity);
        let child_entity = world
            .spawn((Transform::default(), ChildOf(parent_entity)))
            .id();
        let child = register_entity(&mut world, child_entity);

        let mut sel = Selection::default();
        sel.add(&[parent, child], false);
        assert_eq!(selection_roots(&world, &sel), vec![parent]);
    }
}
