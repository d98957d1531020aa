//! Deferred pool access and timed auto-return.

use bevy::prelude::*;

use super::{PoolRegistry, Template, TemplateId};

/// Command that pre-creates instances of a template.
pub struct InitializePool {
  pub template: Template,
  pub count: usize,
}

impl bevy::ecs::system::Command for InitializePool {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
      pool.initialize_pool(world, &self.template, self.count);
    });
  }
}

/// Command that hands an instance back to its pool.
///
/// Safe to queue more than once for the same entity.
///
/// # Example
/// ```ignore
/// fn on_hit(mut commands: Commands, projectile: Entity) {
///     commands.queue(ReturnToPool(projectile));
/// }
/// ```
pub struct ReturnToPool(pub Entity);

impl bevy::ecs::system::Command for ReturnToPool {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
      pool.return_to_pool(world, self.0);
    });
  }
}

/// Command that returns every in-use instance of a template.
pub struct ReturnAllToPool(pub TemplateId);

impl bevy::ecs::system::Command for ReturnAllToPool {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
      pool.return_all(world, self.0);
    });
  }
}

/// Command that destroys every pooled instance.
pub struct ClearAllPools;

impl bevy::ecs::system::Command for ClearAllPools {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
      pool.clear_all_pools(world);
    });
  }
}

/// Returns the entity to its pool once `duration` seconds of activity pass.
///
/// The countdown restarts every time the pool hands the entity out.
#[derive(Component, Debug, Clone, Copy)]
pub struct PooledLifetime {
  pub duration: f32,
  remaining: f32,
}

impl PooledLifetime {
  pub fn new(duration: f32) -> Self {
    Self {
      duration,
      remaining: duration,
    }
  }

  pub fn remaining(&self) -> f32 {
    self.remaining
  }

  pub(crate) fn reset(&mut self) {
    self.remaining = self.duration;
  }

  /// Advances the countdown, returning true once it has run out.
  fn tick(&mut self, delta: f32) -> bool {
    self.remaining -= delta;
    self.remaining <= 0.0
  }
}

/// System: counts down [`PooledLifetime`]s and returns expired entities.
///
/// Inactive (disabled) instances are skipped by the query, so only handed-out
/// entities age.
pub fn expire_pooled_lifetimes(world: &mut World) {
  let delta = world
    .get_resource::<Time>()
    .map(|t| t.delta_secs())
    .unwrap_or_default();
  if delta <= 0.0 {
    return;
  }

  let mut query = world.query::<(Entity, &mut PooledLifetime)>();
  let expired: Vec<Entity> = query
    .iter_mut(world)
    .filter_map(|(entity, mut lifetime)| lifetime.tick(delta).then_some(entity))
    .collect();
  if expired.is_empty() {
    return;
  }

  world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
    for entity in expired {
      pool.return_to_pool(world, entity);
    }
  });
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::pool::{PoolStatus, TemplateLibrary};

  fn app_with_pool() -> (App, Template) {
    let mut app = App::new();
    app
      .add_plugins(MinimalPlugins)
      .init_resource::<PoolRegistry>()
      .insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(
        Duration::from_millis(100),
      ))
      .add_systems(Update, expire_pooled_lifetimes);

    let mut library = TemplateLibrary::default();
    let template = library.register("flash", |e: &mut EntityWorldMut| {
      e.insert(PooledLifetime::new(0.5));
    });
    (app, template)
  }

  fn get(app: &mut App, template: &Template) -> Entity {
    app
      .world_mut()
      .resource_scope(|world, mut pool: Mut<PoolRegistry>| {
        pool.get(world, template, Vec3::ZERO, Quat::IDENTITY, None)
      })
      .unwrap()
  }

  fn status(app: &App, template: &Template) -> PoolStatus {
    app.world().resource::<PoolRegistry>().pool_status(template.id())
  }

  #[test]
  fn lifetime_returns_entity_after_duration() {
    let (mut app, template) = app_with_pool();
    app.update();
    let entity = get(&mut app, &template);

    for _ in 0..3 {
      app.update();
    }
    assert_eq!(status(&app, &template).in_use, 1);

    for _ in 0..5 {
      app.update();
    }
    assert_eq!(status(&app, &template), PoolStatus { available: 1, in_use: 0 });

    // Handing it out again restarts the countdown.
    let again = get(&mut app, &template);
    assert_eq!(again, entity);
    let lifetime = app.world().get::<PooledLifetime>(entity).unwrap();
    assert_eq!(lifetime.remaining(), lifetime.duration);
  }

  #[test]
  fn queued_returns_are_idempotent() {
    let (mut app, template) = app_with_pool();
    app.update();
    let entity = get(&mut app, &template);

    app.world_mut().commands().queue(ReturnToPool(entity));
    app.world_mut().commands().queue(ReturnToPool(entity));
    app.world_mut().flush();

    assert_eq!(status(&app, &template), PoolStatus { available: 1, in_use: 0 });
  }

  #[test]
  fn return_all_and_clear_commands() {
    let (mut app, template) = app_with_pool();
    app.world_mut().commands().queue(InitializePool {
      template: template.clone(),
      count: 2,
    });
    app.world_mut().flush();
    get(&mut app, &template);
    get(&mut app, &template);
    get(&mut app, &template);
    assert_eq!(status(&app, &template), PoolStatus { available: 0, in_use: 3 });

    app.world_mut().commands().queue(ReturnAllToPool(template.id()));
    app.world_mut().flush();
    assert_eq!(status(&app, &template), PoolStatus { available: 3, in_use: 0 });

    app.world_mut().commands().queue(ClearAllPools);
    app.world_mut().flush();
    assert_eq!(status(&app, &template), PoolStatus::default());
  }
}
