//! Headless floor driver.
//!
//! Runs the streamer without a window at a fixed tick rate and logs what
//! it does. Handy for soak-testing pattern catalogs and config changes.

use std::path::PathBuf;
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use clap::Parser;
use endless_floor::config::DEFAULT_CONFIG_PATH;
use endless_floor::floor::advance_floor;
use endless_floor::prelude::*;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(name = "endless_floor", about = "Run the endless floor headless")]
struct Args {
  /// Simulated seconds to run
  #[arg(long, default_value_t = 60.0)]
  seconds: f32,
  /// Fixed RNG seed, overriding the config
  #[arg(long)]
  seed: Option<u64>,
  /// Floor config file
  #[arg(long)]
  config: Option<PathBuf>,
  /// Base scroll speed, overriding the config
  #[arg(long)]
  speed: Option<f32>,
  /// Visible width in world units, centred on x = 0
  #[arg(long, default_value_t = 32.0)]
  view_width: f32,
  /// Simulated tick length in milliseconds
  #[arg(long, default_value_t = 16)]
  tick_ms: u64,
}

/// Collectables on a chunk. Restored every time the chunk is reused.
#[derive(Component, Debug)]
struct Pickups {
  remaining: u32,
  total: u32,
}

struct PickupChunk {
  count: u32,
}

impl Spawnable for PickupChunk {
  fn spawn(&self, entity: &mut EntityWorldMut) {
    entity.insert(Pickups {
      remaining: self.count,
      total: self.count,
    });
  }

  fn on_reuse(&self, entity: &mut EntityWorldMut) {
    if let Some(mut pickups) = entity.get_mut::<Pickups>() {
      pickups.remaining = pickups.total;
    }
  }
}

/// Short-lived effect spawned on every collected pickup.
#[derive(Component)]
struct Sparkle;

#[derive(Resource)]
struct RunLimit {
  seconds: f32,
}

fn main() -> AppExit {
  let args = Args::parse();

  let path = args
    .config
    .clone()
    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
  let mut config = match FloorConfig::load(&path) {
    Ok(config) => config,
    Err(err) => {
      eprintln!("Failed to load {}: {}", path.display(), err);
      return AppExit::error();
    }
  };
  if args.seed.is_some() {
    config.streaming.seed = args.seed;
  }
  if let Some(speed) = args.speed {
    config.speed.base_scroll_speed = speed;
  }

  let half_width = args.view_width / 2.0;
  let mut app = App::new();
  app.add_plugins((
    MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)),
    LogPlugin::default(),
    FloorPlugin,
  ));

  // The shipped config is watched for edits; explicit files are read once.
  if args.config.is_none() {
    app.add_plugins((AssetPlugin::default(), FloorConfigPlugin::default()));
  }

  app
    .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(
      args.tick_ms,
    )))
    .insert_resource(FloorSettings::new(config))
    .insert_resource(StreamingViewport(Some(ViewportEdges {
      left: -half_width,
      right: half_width,
    })))
    .insert_resource(RunLimit {
      seconds: args.seconds,
    })
    .add_systems(Startup, register_templates)
    .add_systems(
      Update,
      (collect_pickups, log_status, stop_after_limit).after(advance_floor),
    );
  app.run()
}

fn register_templates(mut library: ResMut<TemplateLibrary>) {
  library.register("flat", |_: &mut EntityWorldMut| {});
  library.register("stairs", |_: &mut EntityWorldMut| {});
  library.register("pit", |_: &mut EntityWorldMut| {});
  library.register("spikes", |_: &mut EntityWorldMut| {});
  library.register("pickups", PickupChunk { count: 3 });
  library.register("sparkle", |entity: &mut EntityWorldMut| {
    entity.insert((Sparkle, PooledLifetime::new(0.4)));
  });
}

/// Collects one pickup from each chunk passing x = 0, occasionally boosting
/// the scroll speed.
fn collect_pickups(world: &mut World) {
  let mut query = world.query::<(&Transform, &mut Pickups)>();
  let mut collected = Vec::new();
  for (transform, mut pickups) in query.iter_mut(world) {
    if pickups.remaining > 0 && transform.translation.x < 0.0 {
      pickups.remaining -= 1;
      collected.push(transform.translation);
    }
  }
  if collected.is_empty() {
    return;
  }

  let sparkle = world
    .get_resource::<TemplateLibrary>()
    .and_then(|library| library.get("sparkle").cloned());
  if let Some(sparkle) = sparkle {
    world.try_resource_scope(|world, mut pool: Mut<PoolRegistry>| {
      for position in &collected {
        pool.get(world, &sparkle, *position, Quat::IDENTITY, None);
      }
    });
  }

  if rand::rng().random_bool(0.2) {
    if let Some(mut speed) = world.get_resource_mut::<ScrollSpeed>() {
      speed.boost(1.5, 3.0);
    }
  }
}

fn log_status(
  time: Res<Time>,
  mut since_last: Local<f32>,
  streamer: Option<Res<ChunkStreamer>>,
  pool: Res<PoolRegistry>,
  library: Res<TemplateLibrary>,
  speed: Res<ScrollSpeed>,
  chunks: Query<&FloorChunk>,
) {
  *since_last += time.delta_secs();
  if *since_last < 5.0 {
    return;
  }
  *since_last = 0.0;

  let Some(streamer) = streamer else {
    return;
  };
  if let Some(err) = streamer.disabled_reason() {
    warn!("Floor disabled: {}", err);
    return;
  }

  let labels: Vec<&str> = streamer
    .window()
    .iter()
    .filter_map(|chunk| streamer.catalog().get(chunk.pattern))
    .map(|pattern| pattern.label.as_str())
    .collect();
  info!(
    "t={:.1}s level={} speed={:.2} chunks={} window={:?}",
    time.elapsed_secs(),
    streamer.difficulty_level(),
    speed.current() * streamer.speed_multiplier(),
    chunks.iter().count(),
    labels
  );
  for id in pool.templates() {
    let status = pool.pool_status(id);
    let name = library.by_id(id).map(|t| t.name()).unwrap_or("?");
    debug!(
      "  pool '{}': available={} in_use={}",
      name, status.available, status.in_use
    );
  }
}

fn stop_after_limit(time: Res<Time>, limit: Res<RunLimit>, mut exit: MessageWriter<AppExit>) {
  if time.elapsed_secs() >= limit.seconds {
    info!("Ran for {:.1}s, exiting", time.elapsed_secs());
    exit.write(AppExit::Success);
  }
}
