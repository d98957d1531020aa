//! Generic entity pool.
//!
//! [`PoolRegistry`] owns every reusable entity, grouped by [`Template`].
//! Instances are handed out with [`PoolRegistry::get`] and taken back with
//! [`PoolRegistry::return_to_pool`]; an instance that is not in use carries
//! the [`Disabled`] component and is parented to its pool's holder entity.
//!
//! Every instance the registry creates lives in exactly one of its entry's
//! `available` queue or `in_use` set until [`PoolRegistry::clear_all_pools`].

mod commands;
mod template;

use std::collections::{HashMap, HashSet, VecDeque};

use bevy::ecs::entity_disabling::Disabled;
use bevy::prelude::*;
pub use commands::{
  ClearAllPools, InitializePool, PooledLifetime, ReturnAllToPool, ReturnToPool,
  expire_pooled_lifetimes,
};
pub use template::{Spawnable, Template, TemplateId, TemplateLibrary};

/// Marks an entity created by the pool.
///
/// `returned` is the per-instance release flag: it is set by the first
/// [`PoolRegistry::return_to_pool`] of an activation and cleared by the next
/// [`PoolRegistry::get`], so repeated returns are harmless no matter who
/// issues them.
#[derive(Component, Debug, Clone, Copy)]
pub struct Pooled {
  pub template: TemplateId,
  returned: bool,
}

impl Pooled {
  /// Whether this instance has been returned since it was last handed out.
  pub fn is_returned(&self) -> bool {
    self.returned
  }
}

/// Snapshot of one pool's occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStatus {
  pub available: usize,
  pub in_use: usize,
}

impl PoolStatus {
  pub fn total(&self) -> usize {
    self.available + self.in_use
  }

  /// `(available, in_use)`.
  pub fn as_tuple(&self) -> (usize, usize) {
    (self.available, self.in_use)
  }
}

/// What [`PoolRegistry::return_to_pool`] did with an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnOutcome {
  /// Deactivated and queued as available.
  Returned,
  /// Already released during this activation; nothing changed.
  AlreadyReturned,
  /// Not issued by the registry, so it was despawned instead.
  Destroyed,
  /// The entity no longer exists.
  Ignored,
}

/// Per-template pool storage.
struct PoolEntry {
  template: Template,
  /// Parent of every inactive instance.
  holder: Entity,
  /// Inactive instances, oldest first.
  available: VecDeque<Entity>,
  in_use: HashSet<Entity>,
}

/// Registry of all entity pools.
#[derive(Resource, Default)]
pub struct PoolRegistry {
  pools: HashMap<TemplateId, PoolEntry>,
  /// Maps every live instance to the pool that created it.
  owners: HashMap<Entity, TemplateId>,
  /// Parent of all holder entities, spawned with the first pool.
  root: Option<Entity>,
}

impl PoolRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Pre-creates `count` inactive instances of `template`.
  ///
  /// Additive: calling it twice with 3 leaves 6 available instances.
  pub fn initialize_pool(&mut self, world: &mut World, template: &Template, count: usize) {
    self.ensure_pool(world, template);

    for _ in 0..count {
      let entity = self.create_instance(world, template);
      if let Some(pool) = self.pools.get_mut(&template.id()) {
        pool.available.push_back(entity);
      }
    }

    info!("Pool '{}' initialized with {} instances", template.name(), count);
  }

  /// Hands out an instance of `template` at the given transform.
  ///
  /// Reuses the oldest available instance when there is one, otherwise spawns
  /// a new one. With `parent` set the instance is attached to it; without, it
  /// becomes a root entity.
  pub fn get(
    &mut self,
    world: &mut World,
    template: &Template,
    position: Vec3,
    rotation: Quat,
    parent: Option<Entity>,
  ) -> Option<Entity> {
    self.ensure_pool(world, template);

    let reused = self.pools.get_mut(&template.id())?.available.pop_front();
    let (entity, is_reuse) = match reused {
      Some(entity) if world.get::<Pooled>(entity).is_some() => (entity, true),
      Some(stale) => {
        // Destroyed behind our back; forget it and build a fresh one.
        debug!("Pool '{}' dropped stale instance {:?}", template.name(), stale);
        self.owners.remove(&stale);
        (self.create_instance(world, template), false)
      }
      None => (self.create_instance(world, template), false),
    };

    let mut entity_mut = world.get_entity_mut(entity).ok()?;
    entity_mut.insert(Transform::from_translation(position).with_rotation(rotation));
    match parent {
      Some(parent) => {
        entity_mut.insert(ChildOf(parent));
      }
      None => {
        entity_mut.remove::<ChildOf>();
      }
    }
    if let Some(mut pooled) = entity_mut.get_mut::<Pooled>() {
      pooled.returned = false;
    }
    if let Some(mut lifetime) = entity_mut.get_mut::<PooledLifetime>() {
      lifetime.reset();
    }
    if is_reuse {
      template.reuse(&mut entity_mut);
    }
    set_tree_disabled(world, entity, false);

    if let Some(pool) = self.pools.get_mut(&template.id()) {
      pool.in_use.insert(entity);
    }
    debug!("Pool '{}' -> {:?}", template.name(), entity);
    Some(entity)
  }

  /// Takes an instance back.
  ///
  /// Entities the registry never issued are despawned. Returning the same
  /// instance twice leaves the registry exactly as after the first return.
  pub fn return_to_pool(&mut self, world: &mut World, entity: Entity) -> ReturnOutcome {
    if world.get_entity(entity).is_err() {
      return ReturnOutcome::Ignored;
    }

    let Some(template_id) = self.owners.get(&entity).copied() else {
      debug!("Despawning {:?}: not issued by any pool", entity);
      world.despawn(entity);
      return ReturnOutcome::Destroyed;
    };
    let Some(pool) = self.pools.get_mut(&template_id) else {
      self.owners.remove(&entity);
      world.despawn(entity);
      return ReturnOutcome::Destroyed;
    };

    let already_returned = world.get::<Pooled>(entity).is_none_or(|p| p.returned);
    if already_returned || !pool.in_use.remove(&entity) {
      debug!("Pool '{}' ignored repeat return of {:?}", pool.template.name(), entity);
      return ReturnOutcome::AlreadyReturned;
    }

    let holder = pool.holder;
    if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
      if let Some(mut pooled) = entity_mut.get_mut::<Pooled>() {
        pooled.returned = true;
      }
      entity_mut.insert(ChildOf(holder));
    }
    set_tree_disabled(world, entity, true);
    pool.available.push_back(entity);
    debug!("Pool '{}' <- {:?}", pool.template.name(), entity);
    ReturnOutcome::Returned
  }

  /// Returns every in-use instance of a template.
  pub fn return_all(&mut self, world: &mut World, template: TemplateId) {
    let Some(pool) = self.pools.get(&template) else {
      return;
    };

    // Snapshot first: return_to_pool mutates in_use.
    let in_use: Vec<Entity> = pool.in_use.iter().copied().collect();
    for entity in in_use {
      self.return_to_pool(world, entity);
    }
  }

  /// Despawns every instance and holder and forgets all pools.
  pub fn clear_all_pools(&mut self, world: &mut World) {
    for (_, pool) in self.pools.drain() {
      for entity in pool.in_use.into_iter().chain(pool.available) {
        despawn_if_alive(world, entity);
      }
      despawn_if_alive(world, pool.holder);
    }
    if let Some(root) = self.root.take() {
      despawn_if_alive(world, root);
    }
    self.owners.clear();
    info!("All pools cleared");
  }

  /// Occupancy of a template's pool; `(0, 0)` for unknown templates.
  pub fn pool_status(&self, template: TemplateId) -> PoolStatus {
    self
      .pools
      .get(&template)
      .map(|pool| PoolStatus {
        available: pool.available.len(),
        in_use: pool.in_use.len(),
      })
      .unwrap_or_default()
  }

  /// Whether `entity` was created by this registry and is still tracked.
  pub fn owns(&self, entity: Entity) -> bool {
    self.owners.contains_key(&entity)
  }

  /// Whether `entity` is currently handed out.
  pub fn is_in_use(&self, entity: Entity) -> bool {
    self
      .owners
      .get(&entity)
      .and_then(|id| self.pools.get(id))
      .is_some_and(|pool| pool.in_use.contains(&entity))
  }

  /// Ids of every template that has a pool.
  pub fn templates(&self) -> impl Iterator<Item = TemplateId> + '_ {
    self.pools.keys().copied()
  }

  fn ensure_pool(&mut self, world: &mut World, template: &Template) {
    if self.pools.contains_key(&template.id()) {
      return;
    }

    let root = match self.root {
      Some(root) if world.get_entity(root).is_ok() => root,
      _ => {
        let root = world
          .spawn((Name::new("ObjectPool"), Transform::default()))
          .id();
        self.root = Some(root);
        root
      }
    };
    let holder = world
      .spawn((
        Name::new(format!("Pool_{}", template.name())),
        Transform::default(),
        ChildOf(root),
      ))
      .id();

    self.pools.insert(
      template.id(),
      PoolEntry {
        template: template.clone(),
        holder,
        available: VecDeque::new(),
        in_use: HashSet::new(),
      },
    );
  }

  /// Spawns an inactive instance parented to the template's holder.
  fn create_instance(&mut self, world: &mut World, template: &Template) -> Entity {
    let holder = self.pools.get(&template.id()).map(|pool| pool.holder);

    let mut entity = world.spawn((
      Name::new(template.name().to_string()),
      Transform::default(),
      Pooled {
        template: template.id(),
        returned: true,
      },
      Disabled,
    ));
    if let Some(holder) = holder {
      entity.insert(ChildOf(holder));
    }
    template.build(&mut entity);

    let id = entity.id();
    set_tree_disabled(world, id, true);
    self.owners.insert(id, template.id());
    id
  }
}

/// Inserts or removes `Disabled` on `root` and all of its descendants.
/// Disabling does not propagate through `Children` on its own.
fn set_tree_disabled(world: &mut World, root: Entity, disabled: bool) {
  let mut stack = vec![root];
  while let Some(entity) = stack.pop() {
    if let Some(children) = world.get::<Children>(entity) {
      stack.extend_from_slice(children);
    }
    let Ok(mut entity_mut) = world.get_entity_mut(entity) else {
      continue;
    };
    if disabled {
      entity_mut.insert(Disabled);
    } else {
      entity_mut.remove::<Disabled>();
    }
  }
}

fn despawn_if_alive(world: &mut World, entity: Entity) {
  if world.get_entity(entity).is_ok() {
    world.despawn(entity);
  }
}
