use std::collections::HashMap;

use bevy::prelude::*;
use mallet_geometry::{
    BoundingBox, Frustum, IntersectResult, Ray, frustum_box_intersection, ray_box_intersection,
};
use serde::{Deserialize, Serialize};

use crate::EditorEntity;
use crate::anchor_mod::Anchor;
use crate::viewport::ViewportKind;

/// Distance along the ray used for the pick position when nothing is hit.
pub const MISS_PICK_DISTANCE: f32 = 5.0;

// ---------------------------------------------------------------------------
// Stable entity identity
// ---------------------------------------------------------------------------

/// Stable identifier for editor-managed entities. Survives despawn/respawn
/// across undo, unlike `Entity`, so history entries never hold `Entity`.
#[derive(
    Component, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SceneId(pub u64);

#[derive(Resource, Default)]
pub struct SceneIdRegistry {
    next: u64,
    map: HashMap<SceneId, Entity>,
}

impl SceneIdRegistry {
    pub fn allocate(&mut self) -> SceneId {
        self.next += 1;
        SceneId(self.next)
    }

    pub fn register(&mut self, id: SceneId, entity: Entity) {
        self.map.insert(id, entity);
    }

    pub fn unregister(&mut self, id: SceneId) {
        self.map.remove(&id);
    }

    pub fn entity_of(&self, id: SceneId) -> Option<Entity> {
        self.map.get(&id).copied()
    }
}

/// Allocate an id for `entity`, tag it, and map it.
pub fn register_entity(world: &mut World, entity: Entity) -> SceneId {
    let id = world.resource_mut::<SceneIdRegistry>().allocate();
    world.entity_mut(entity).insert(id);
    world.resource_mut::<SceneIdRegistry>().register(id, entity);
    id
}

pub fn resolve(world: &World, id: SceneId) -> Option<Entity> {
    world.resource::<SceneIdRegistry>().entity_of(id)
}

// ---------------------------------------------------------------------------
// Scene components
// ---------------------------------------------------------------------------

/// Local-space AABB used for all coarse picking.
#[derive(Component, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SceneBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl SceneBounds {
    pub fn to_box(&self) -> BoundingBox {
        BoundingBox::new(self.min, self.max)
    }
}

impl Default for SceneBounds {
    fn default() -> Self {
        Self { min: Vec3::splat(-0.5), max: Vec3::splat(0.5) }
    }
}

/// Reference grid; pickers skip it via the ignore list.
#[derive(Component, Default)]
pub struct GridEntity;

/// 2D surface living under a canvas. Only canvas viewports pick these.
#[derive(Component, Default)]
pub struct CanvasElement;

/// Excluded from transform gestures.
#[derive(Component, Default)]
pub struct TransformLocked;

/// Manages its own children; grouped delete does not descend into it.
#[derive(Component, Default)]
pub struct Prefab;

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// World matrix by walking `ChildOf` over local `Transform`s. Works in
/// headless worlds where `GlobalTransform` is never propagated.
pub fn world_transform(world: &World, entity: Entity) -> Mat4 {
    let mut mat = world
        .get::<Transform>(entity)
        .map(|t| t.to_matrix())
        .unwrap_or(Mat4::IDENTITY);
    let mut cur = entity;
    while let Some(parent) = world.get::<ChildOf>(cur) {
        cur = parent.0;
        if let Some(t) = world.get::<Transform>(cur) {
            mat = t.to_matrix() * mat;
        }
    }
    mat
}

pub fn world_translation(world: &World, entity: Entity) -> Vec3 {
    world_transform(world, entity).to_scale_rotation_translation().2
}

/// World-space bounds of an entity, if it carries any.
pub fn world_bounds(world: &World, entity: Entity) -> Option<BoundingBox> {
    let bounds = world.get::<SceneBounds>(entity)?;
    Some(bounds.to_box().transformed(world_transform(world, entity)))
}

// ---------------------------------------------------------------------------
// Picking
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct PickData {
    pub entity: Option<SceneId>,
    pub distance: f32,
    pub pick_pos: Vec3,
}

impl Default for PickData {
    fn default() -> Self {
        Self { entity: None, distance: f32::MAX, pick_pos: Vec3::ZERO }
    }
}

fn pickable(world: &World, entity: Entity, kind: ViewportKind) -> bool {
    if world.get::<EditorEntity>(entity).is_some() {
        return false;
    }
    let canvas = world.get::<CanvasElement>(entity).is_some();
    match kind {
        ViewportKind::World => !canvas,
        ViewportKind::Canvas => canvas,
    }
}

fn candidates(world: &mut World, kind: ViewportKind, ignore: &[SceneId]) -> Vec<(Entity, SceneId)> {
    let mut query = world.query::<(Entity, &SceneId, &SceneBounds)>();
    let mut out: Vec<(Entity, SceneId)> = query
        .iter(world)
        .filter(|(_, id, _)| !ignore.contains(id))
        .map(|(entity, id, _)| (entity, *id))
        .collect();
    out.retain(|&(entity, _)| pickable(world, entity, kind));
    // Stable result ordering regardless of storage iteration.
    out.sort_by_key(|&(_, id)| id);
    out
}

/// Nearest entity under a world-space ray. The ray is taken into each
/// candidate's object space, so rotated and scaled bounds test exactly.
/// Misses still produce a usable point a short way down the ray.
pub fn pick_ray(
    world: &mut World,
    ray: &Ray,
    kind: ViewportKind,
    ignore: &[SceneId],
) -> PickData {
    let mut pd = PickData {
        pick_pos: ray.point_at(MISS_PICK_DISTANCE),
        ..Default::default()
    };
    for (entity, id) in candidates(world, kind, ignore) {
        let Some(bounds) = world.get::<SceneBounds>(entity) else {
            continue;
        };
        let local = bounds.to_box();
        let to_object = world_transform(world, entity).inverse();
        let object_ray = ray.transformed(to_object);
        if let Some(t) = ray_box_intersection(&object_ray, &local)
            && t < pd.distance
        {
            pd.entity = Some(id);
            pd.distance = t;
            pd.pick_pos = ray.point_at(t);
        }
    }
    pd
}

/// Every entity whose world bounds touch the frustum, in `SceneId` order.
pub fn pick_frustum(
    world: &mut World,
    frustum: &Frustum,
    kind: ViewportKind,
    ignore: &[SceneId],
) -> Vec<PickData> {
    let mut out = Vec::new();
    for (entity, id) in candidates(world, kind, ignore) {
        let Some(bounds) = world_bounds(world, entity) else {
            continue;
        };
        if frustum_box_intersection(frustum, &bounds) != IntersectResult::Outside {
            out.push(PickData {
                entity: Some(id),
                distance: 0.0,
                pick_pos: bounds.center(),
            });
        }
    }
    out
}

/// Ids the pickers should always skip: the reference grid.
pub fn grid_ignore_list(world: &mut World) -> Vec<SceneId> {
    let mut query = world.query_filtered::<&SceneId, With<GridEntity>>();
    query.iter(world).copied().collect()
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Everything needed to rebuild an entity subtree with its original ids and
/// linkage. Captured before a despawn, replayed by undo.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: SceneId,
    pub name: String,
    pub transform: Transform,
    pub bounds: Option<SceneBounds>,
    pub anchor: Option<Anchor>,
    pub canvas: bool,
    pub locked: bool,
    pub prefab: bool,
    pub parent: Option<SceneId>,
    pub children: Vec<EntitySnapshot>,
}

impl EntitySnapshot {
    pub fn capture(world: &World, id: SceneId) -> Option<Self> {
        let entity = resolve(world, id)?;
        let parent = world
            .get::<ChildOf>(entity)
            .and_then(|p| world.get::<SceneId>(p.0))
            .copied();
        Self::capture_inner(world, entity, id, parent)
    }

    fn capture_inner(
        world: &World,
        entity: Entity,
        id: SceneId,
        parent: Option<SceneId>,
    ) -> Option<Self> {
        let mut children = Vec::new();
        if let Some(kids) = world.get::<Children>(entity) {
            for child in kids.iter() {
                if let Some(&child_id) = world.get::<SceneId>(child) {
                    children.extend(Self::capture_inner(world, child, child_id, Some(id)));
                }
            }
        }
        Some(Self {
            id,
            name: world
                .get::<Name>(entity)
                .map(|n| n.as_str().to_owned())
                .unwrap_or_default(),
            transform: world.get::<Transform>(entity).copied().unwrap_or_default(),
            bounds: world.get::<SceneBounds>(entity).copied(),
            anchor: world.get::<Anchor>(entity).copied(),
            canvas: world.get::<CanvasElement>(entity).is_some(),
            locked: world.get::<TransformLocked>(entity).is_some(),
            prefab: world.get::<Prefab>(entity).is_some(),
            parent,
            children,
        })
    }

    /// Rebuild the subtree, re-registering the recorded ids.
    pub fn respawn(&self, world: &mut World) {
        let mut entity = world.spawn((Name::new(self.name.clone()), self.transform, self.id));
        if let Some(bounds) = self.bounds {
            entity.insert(bounds);
        }
        if let Some(anchor) = self.anchor {
            entity.insert(anchor);
        }
        if self.canvas {
            entity.insert(CanvasElement);
        }
        if self.locked {
            entity.insert(TransformLocked);
        }
        if self.prefab {
            entity.insert(Prefab);
        }
        let entity = entity.id();
        if let Some(parent) = self.parent
            && let Some(parent_entity) = resolve(world, parent)
        {
            world.entity_mut(entity).insert(ChildOf(parent_entity));
        }
        world.resource_mut::<SceneIdRegistry>().register(self.id, entity);
        for child in &self.children {
            child.respawn(world);
        }
    }

    /// Despawn the recorded subtree and drop its id mappings.
    pub fn despawn(&self, world: &mut World) {
        self.unregister_ids(world);
        if let Some(entity) = resolve(world, self.id) {
            // Despawn takes descendants with it.
            world.despawn(entity);
        }
        world.resource_mut::<SceneIdRegistry>().unregister(self.id);
    }

    fn unregister_ids(&self, world: &mut World) {
        for child in &self.children {
            child.unregister_ids(world);
            world.resource_mut::<SceneIdRegistry>().unregister(child.id);
        }
    }

    /// Deep copy with freshly allocated ids; used by duplicate.
    pub fn with_new_ids(&self, registry: &mut SceneIdRegistry) -> Self {
        let mut copy = self.clone();
        copy.assign_new_ids(registry, self.parent);
        copy
    }

    fn assign_new_ids(&mut self, registry: &mut SceneIdRegistry, parent: Option<SceneId>) {
        self.id = registry.allocate();
        self.parent = parent;
        for child in &mut self.children {
            child.assign_new_ids(registry, Some(self.id));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::ViewportKind;

    fn test_world() -> World {
        let mut world = World::new();
        world.init_resource::<SceneIdRegistry>();
        world
    }

    fn spawn_box(world: &mut World, pos: Vec3) -> SceneId {
        let entity = world
            .spawn((Transform::from_translation(pos), SceneBounds::default()))
            .id();
        register_entity(world, entity)
    }

    #[test]
    fn ids_are_unique_and_resolvable() {
        let mut world = test_world();
        let a = spawn_box(&mut world, Vec3::ZERO);
        let b = spawn_box(&mut world, Vec3::X);
        assert_ne!(a, b);
        assert!(resolve(&world, a).is_some());
        assert!(resolve(&world, b).is_some());
    }

    #[test]
    fn world_transform_walks_parents() {
        let mut world = test_world();
        let parent = world.spawn(Transform::from_xyz(1.0, 0.0, 0.0)).id();
        let child = world
            .spawn((Transform::from_xyz(0.0, 2.0, 0.0), ChildOf(parent)))
            .id();
        let pos = world_translation(&world, child);
        assert!((pos - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn pick_ray_hits_nearest() {
        let mut world = test_world();
        let near = spawn_box(&mut world, Vec3::new(0.0, 0.0, -2.0));
        let _far = spawn_box(&mut world, Vec3::new(0.0, 0.0, -8.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let pd = pick_ray(&mut world, &ray, ViewportKind::World, &[]);
        assert_eq!(pd.entity, Some(near));
        assert!((pd.distance - 1.5).abs() < 1e-4);
    }

    #[test]
    fn pick_ray_miss_uses_default_distance() {
        let mut world = test_world();
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let pd = pick_ray(&mut world, &ray, ViewportKind::World, &[]);
        assert_eq!(pd.entity, None);
        assert!((pd.pick_pos - Vec3::new(0.0, 0.0, -MISS_PICK_DISTANCE)).length() < 1e-5);
    }

    #[test]
    fn pick_ray_honors_ignore_list_and_viewport_kind() {
        let mut world = test_world();
        let id = spawn_box(&mut world, Vec3::new(0.0, 0.0, -2.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);

        let pd = pick_ray(&mut world, &ray, ViewportKind::World, &[id]);
        assert_eq!(pd.entity, None);

        // Canvas viewports only see canvas elements.
        let pd = pick_ray(&mut world, &ray, ViewportKind::Canvas, &[]);
        assert_eq!(pd.entity, None);
    }

    #[test]
    fn pick_ray_respects_rotated_bounds() {
        let mut world = test_world();
        // A long thin box rotated 90 degrees around Y: its world footprint
        // along X comes from the local Z extent.
        let entity = world
            .spawn((
                Transform::from_translation(Vec3::new(0.0, 0.0, -5.0))
                    .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
                SceneBounds { min: Vec3::new(-0.1, -0.1, -3.0), max: Vec3::new(0.1, 0.1, 3.0) },
            ))
            .id();
        let id = register_entity(&mut world, entity);
        let ray = Ray::new(Vec3::new(2.0, 0.0, 0.0), Vec3::NEG_Z);
        let pd = pick_ray(&mut world, &ray, ViewportKind::World, &[]);
        assert_eq!(pd.entity, Some(id));
    }

    #[test]
    fn pick_frustum_orders_by_id() {
        let mut world = test_world();
        let b = spawn_box(&mut world, Vec3::new(1.0, 0.0, -5.0));
        let a = spawn_box(&mut world, Vec3::new(-1.0, 0.0, -5.0));
        let frustum = Frustum::from_corners([
            Vec3::new(-2.0, 2.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(2.0, -2.0, 0.0),
            Vec3::new(-2.0, -2.0, 0.0),
            Vec3::new(-2.0, 2.0, -10.0),
            Vec3::new(2.0, 2.0, -10.0),
            Vec3::new(2.0, -2.0, -10.0),
            Vec3::new(-2.0, -2.0, -10.0),
        ]);
        let picks = pick_frustum(&mut world, &frustum, ViewportKind::World, &[]);
        let ids: Vec<_> = picks.iter().filter_map(|p| p.entity).collect();
        assert_eq!(ids, vec![b.min(a), b.max(a)]);
    }

    #[test]
    fn snapshot_roundtrip_preserves_ids_and_linkage() {
        let mut world = test_world();
        let parent = spawn_box(&mut world, Vec3::ZERO);
        let parent_entity = resolve(&world, parent).unwrap();
        let child_entity = world
            .spawn((
                Transform::from_xyz(0.0, 1.0, 0.0),
                SceneBounds::default(),
                ChildOf(parent_entity),
            ))
            .id();
        let child = register_entity(&mut world, child_entity);

        let snapshot = EntitySnapshot::capture(&world, parent).unwrap();
        snapshot.despawn(&mut world);
        assert!(resolve(&world, parent).is_none());
        assert!(resolve(&world, child).is_none());

        snapshot.respawn(&mut world);
        let new_parent = resolve(&world, parent).unwrap();
        let new_child = resolve(&world, child).unwrap();
        assert_eq!(world.get::<ChildOf>(new_child).map(|p| p.0), Some(new_parent));
        let pos = world_translation(&world, new_child);
        assert!((pos - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }
}
