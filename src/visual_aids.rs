use bevy::prelude::*;

use crate::EditorEntity;

/// Transient guide line, drawn by the host renderer.
#[derive(Component, Clone, Copy, Debug)]
pub struct GuideLine {
    pub start: Vec3,
    pub end: Vec3,
}

/// Screen-space box-select rectangle.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct SelectRect {
    pub min: Vec2,
    pub max: Vec2,
}

/// Pool of short-lived editor visuals. Modes spawn into it during gestures;
/// mode switches and gesture ends clear it, so nothing leaks into the scene.
#[derive(Resource, Default)]
pub struct VisualAids {
    entities: Vec<Entity>,
}

impl VisualAids {
    pub fn spawn_guide_line(&mut self, world: &mut World, start: Vec3, end: Vec3) -> Entity {
        let entity = world.spawn((EditorEntity, GuideLine { start, end })).id();
        self.entities.push(entity);
        entity
    }

    pub fn spawn_select_rect(&mut self, world: &mut World, min: Vec2, max: Vec2) -> Entity {
        let entity = world.spawn((EditorEntity, SelectRect { min, max })).id();
        self.entities.push(entity);
        entity
    }

    pub fn clear(&mut self, world: &mut World) {
        for entity in self.entities.drain(..) {
            if let Ok(entity) = world.get_entity_mut(entity) {
                entity.despawn();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Convenience for call sites that only hold a `&mut World`.
pub fn clear_visual_aids(world: &mut World) {
    world.resource_scope(|world, mut aids: Mut<VisualAids>| aids.clear(world));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_despawns_pool() {
        let mut world = World::new();
        world.init_resource::<VisualAids>();
        world.resource_scope(|world, mut aids: Mut<VisualAids>| {
            aids.spawn_guide_line(world, Vec3::ZERO, Vec3::X);
            aids.spawn_select_rect(world, Vec2::ZERO, Vec2::ONE);
            assert_eq!(aids.len(), 2);
        });
        clear_visual_aids(&mut world);
        assert!(world.resource::<VisualAids>().is_empty());
        let mut query = world.query::<&GuideLine>();
        assert_eq!(query.iter(&world).count(), 0);
    }
}
