//! Bevy glue for the chunk streamer.

use bevy::prelude::*;

use super::{ChunkStreamer, FloorTick, PatternId, ViewportEdges};
use crate::config::{FloorConfig, FloorSettings};
use crate::pool::{PoolRegistry, TemplateLibrary};
use crate::speed::ScrollSpeed;

/// Marker component for the camera the floor streams around.
#[derive(Component)]
pub struct StreamingCamera;

/// Visible horizontal extent used to place the recycle and spawn lines.
///
/// Refreshed every frame from the [`StreamingCamera`] when one exists;
/// otherwise whatever the host writes is used as-is. `None` selects the
/// fallback bounds.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct StreamingViewport(pub Option<ViewportEdges>);

/// System: derives the viewport from the streaming camera's projection.
///
/// Reads the camera's local `Transform`, so moves made earlier in the frame
/// count without waiting for transform propagation. The camera is expected
/// to be a root entity.
pub fn update_streaming_viewport(
  camera_query: Query<(&Transform, &Projection), With<StreamingCamera>>,
  mut viewport: ResMut<StreamingViewport>,
) {
  let Ok((transform, projection)) = camera_query.single() else {
    return;
  };
  if let Some(edges) = camera_edges(transform, projection) {
    viewport.0 = Some(edges);
  }
}

/// Horizontal edges seen by an orthographic camera.
fn camera_edges(transform: &Transform, projection: &Projection) -> Option<ViewportEdges> {
  let Projection::Orthographic(ortho) = projection else {
    return None;
  };

  let half_width = (ortho.area.max.x - ortho.area.min.x) / 2.0;
  // Area is zero until the projection is first updated.
  if half_width <= 0.0 {
    return None;
  }

  let center = transform.translation.x;
  Some(ViewportEdges {
    left: center - half_width,
    right: center + half_width,
  })
}

/// Exclusive system: builds the streamer from settings and fills the window.
///
/// Runs after `Startup` so the host can register templates first.
pub fn start_floor(world: &mut World) {
  let config = world
    .get_resource::<FloorSettings>()
    .map(|settings| settings.0.clone())
    .unwrap_or_default();

  let mut streamer = match world.get_resource::<TemplateLibrary>() {
    Some(library) => ChunkStreamer::from_config(&config, library),
    None => ChunkStreamer::from_config(&config, &TemplateLibrary::default()),
  };
  // The PreUpdate refresh has not run yet; read the camera directly.
  let mut cameras = world.query_filtered::<(&Transform, &Projection), With<StreamingCamera>>();
  let from_camera = cameras
    .single(world)
    .ok()
    .and_then(|(transform, projection)| camera_edges(transform, projection));
  if let Some(edges) = from_camera {
    world.insert_resource(StreamingViewport(Some(edges)));
  }
  streamer.viewport = world.get_resource::<StreamingViewport>().and_then(|v| v.0);

  if let Some(mut speed) = world.get_resource_mut::<ScrollSpeed>() {
    speed.set(config.speed.base_scroll_speed);
  }

  world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
    // Failure is logged and leaves the streamer disabled.
    let _ = streamer.start(world, &mut *pool);
  });
  world.insert_resource(streamer);
}

/// Exclusive system: advances the floor by the frame's delta.
pub fn advance_floor(world: &mut World) {
  let delta_secs = world
    .get_resource::<Time>()
    .map(|t| t.delta_secs())
    .unwrap_or_default();
  let scroll_speed = world
    .get_resource::<ScrollSpeed>()
    .map(ScrollSpeed::current)
    .unwrap_or_default();
  let viewport = world.get_resource::<StreamingViewport>().and_then(|v| v.0);

  with_floor(world, |world, streamer, pool| {
    streamer.tick(
      world,
      pool,
      FloorTick {
        delta_secs,
        scroll_speed,
        viewport,
      },
    );
  });
}

/// Runs `f` with the streamer and pool taken out of the world.
pub(crate) fn with_floor<R>(
  world: &mut World,
  f: impl FnOnce(&mut World, &mut ChunkStreamer, &mut PoolRegistry) -> R,
) -> Option<R> {
  world
    .try_resource_scope(|world, mut streamer: Mut<ChunkStreamer>| {
      world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
        f(world, &mut *streamer, &mut *pool)
      })
    })
    .flatten()
}

/// Command that releases every chunk and restarts the floor at difficulty 0.
pub struct ResetFloor;

impl bevy::ecs::system::Command for ResetFloor {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    with_floor(world, |world, streamer, pool| {
      // Failure is logged by the streamer.
      let _ = streamer.reset_floor(world, pool);
    });
  }
}

/// Command that appends a chunk of a specific pattern, e.g. for a set piece.
pub struct ForceSpawnPattern(pub PatternId);

impl bevy::ecs::system::Command for ForceSpawnPattern {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    world.try_resource_scope(|world, mut streamer: Mut<ChunkStreamer>| {
      if let Err(err) = streamer.force_spawn_pattern(world, self.0) {
        warn!("Force spawn of pattern {} failed: {}", self.0.0, err);
      }
    });
  }
}

/// Command that sets the floor's speed multiplier (clamped to config range).
pub struct SetSpeedMultiplier(pub f32);

impl bevy::ecs::system::Command for SetSpeedMultiplier {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    if let Some(mut streamer) = world.get_resource_mut::<ChunkStreamer>() {
      streamer.set_speed_multiplier(self.0);
    }
  }
}

pub struct SetPaused(pub bool);

impl bevy::ecs::system::Command for SetPaused {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    if let Some(mut streamer) = world.get_resource_mut::<ChunkStreamer>() {
      streamer.set_paused(self.0);
    }
  }
}

/// System: forwards replaced [`FloorSettings`] to the running streamer.
pub fn apply_floor_settings(mut commands: Commands, settings: Option<Res<FloorSettings>>) {
  let Some(settings) = settings else {
    return;
  };
  if settings.is_changed() && !settings.is_added() {
    commands.queue(ApplyFloorSettings(settings.0.clone()));
  }
}

/// Command that pushes new settings into a running streamer, resetting the
/// floor when the window layout changed.
pub struct ApplyFloorSettings(pub FloorConfig);

impl bevy::ecs::system::Command for ApplyFloorSettings {
  fn apply(self, world: &mut bevy::ecs::world::World) {
    world.try_resource_scope(|world, library: Mut<TemplateLibrary>| {
      with_floor(world, |world, streamer, pool| {
        if streamer.apply_config(&self.0, &library) {
          info!("Floor layout changed, resetting");
          let _ = streamer.reset_floor(world, pool);
        }
      });
    });
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::FloorPlugin;
  use crate::floor::FloorChunk;

  fn floor_config(active_chunk_count: usize) -> FloorConfig {
    FloorConfig::from_toml_str(&format!(
      r#"
        [streaming]
        active_chunk_count = {active_chunk_count}
        seed = 1

        [[patterns]]
        template = "flat"
      "#
    ))
    .unwrap()
  }

  fn app_with_floor(config: FloorConfig) -> App {
    let mut app = App::new();
    app
      .add_plugins((MinimalPlugins, FloorPlugin))
      .insert_resource(FloorSettings::new(config))
      .insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(
        Duration::from_millis(100),
      ));
    app
      .world_mut()
      .resource_mut::<TemplateLibrary>()
      .register("flat", |_: &mut EntityWorldMut| {});
    app
  }

  #[test]
  fn startup_builds_streamer_from_settings() {
    let mut app = app_with_floor(floor_config(4));
    app.update();

    let streamer = app.world().resource::<ChunkStreamer>();
    assert!(streamer.is_running());
    assert_eq!(streamer.window().len(), 4);

    let mut chunks = app.world_mut().query::<&FloorChunk>();
    assert_eq!(chunks.iter(app.world()).count(), 4);
  }

  #[test]
  fn replaced_settings_reach_the_streamer() {
    let mut app = app_with_floor(floor_config(3));
    app.update();
    assert_eq!(app.world().resource::<ChunkStreamer>().window().len(), 3);

    app.insert_resource(FloorSettings::new(floor_config(5)));
    app.update();

    let streamer = app.world().resource::<ChunkStreamer>();
    assert_eq!(streamer.settings().active_chunk_count, 5);
    assert_eq!(streamer.window().len(), 5);
  }

  #[test]
  fn commands_drive_the_streamer() {
    let mut app = app_with_floor(floor_config(3));
    app.update();

    app.world_mut().commands().queue(SetPaused(true));
    app.world_mut().commands().queue(SetSpeedMultiplier(99.0));
    app.world_mut().commands().queue(ForceSpawnPattern(PatternId(0)));
    app.world_mut().flush();

    let streamer = app.world().resource::<ChunkStreamer>();
    assert!(streamer.is_paused());
    assert_eq!(streamer.speed_multiplier(), 3.0);
    assert_eq!(streamer.window().len(), 4);

    let before: Vec<f32> = streamer.window().iter().map(|c| c.x).collect();
    app.update();
    let after: Vec<f32> = app
      .world()
      .resource::<ChunkStreamer>()
      .window()
      .iter()
      .map(|c| c.x)
      .collect();
    assert_eq!(before, after);

    app.world_mut().commands().queue(ResetFloor);
    app.world_mut().flush();
    assert_eq!(app.world().resource::<ChunkStreamer>().window().len(), 3);
  }

  #[test]
  fn viewport_follows_streaming_camera() {
    let mut app = App::new();
    app
      .init_resource::<StreamingViewport>()
      .add_systems(Update, update_streaming_viewport);

    let mut ortho = OrthographicProjection::default_2d();
    ortho.area = Rect::new(-16.0, -9.0, 16.0, 9.0);
    app.world_mut().spawn((
      StreamingCamera,
      Projection::Orthographic(ortho),
      Transform::from_xyz(100.0, 0.0, 0.0),
    ));
    app.update();

    assert_eq!(
      app.world().resource::<StreamingViewport>().0,
      Some(ViewportEdges {
        left: 84.0,
        right: 116.0,
      })
    );
  }
}
