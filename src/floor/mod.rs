//! Endless scrolling floor.
//!
//! [`ChunkStreamer`] keeps a fixed-length window of chunks alive around the
//! viewport. Every tick it scrolls the window left, recycles chunks that have
//! left the view and respawns new ones, chosen by the [`PatternSelector`], at
//! the right end.
//!
//! # Window invariants
//!
//! - Outside of a forced spawn, the window holds exactly
//!   `active_chunk_count` chunks once startup succeeded.
//! - Chunks are ordered left to right; each starts where its left neighbour
//!   ends, minus `chunk_overlap`.
//! - Each tick examines only the chunks present when its recycle pass began.

mod catalog;
mod difficulty;
mod selector;
mod systems;

use std::fmt;

use bevy::prelude::*;
pub use catalog::{ChunkPattern, PatternCatalog, PatternId};
pub use difficulty::DifficultyClock;
use rand::SeedableRng;
use rand::rngs::StdRng;
pub use selector::{PatternHistory, PatternSelector};
pub use systems::{
  ApplyFloorSettings, ForceSpawnPattern, ResetFloor, SetPaused, SetSpeedMultiplier,
  StreamingCamera, StreamingViewport, advance_floor, apply_floor_settings, start_floor,
  update_streaming_viewport,
};

use crate::config::FloorConfig;
use crate::pool::{PoolRegistry, TemplateLibrary};

/// Parent entity of every chunk.
#[derive(Component, Debug)]
pub struct FloorRoot;

/// Tags a live chunk with the pattern it was built from.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorChunk {
  pub pattern: PatternId,
}

/// One chunk in the active window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkInstance {
  pub entity: Entity,
  pub pattern: PatternId,
  /// Left edge on the scroll axis.
  pub x: f32,
  /// Spawned through [`ChunkStreamer::force_spawn_pattern`]; never pooled.
  pub forced: bool,
}

/// World-space horizontal extent of the visible area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportEdges {
  pub left: f32,
  pub right: f32,
}

/// Recycle and spawn lines, recomputed every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StreamingBounds {
  /// A chunk whose left edge is at or past this line is recycled.
  pub left: f32,
  pub right: f32,
}

impl StreamingBounds {
  fn compute(viewport: Option<ViewportEdges>, settings: &StreamerSettings) -> Self {
    match viewport {
      Some(view) => Self {
        left: view.left - settings.chunk_width - settings.recycle_offset,
        right: view.right + settings.recycle_offset,
      },
      None => Self {
        left: -2.0 * settings.chunk_width,
        right: settings.chunk_width,
      },
    }
  }
}

/// Inputs sampled once per tick.
#[derive(Clone, Copy, Debug)]
pub struct FloorTick {
  pub delta_secs: f32,
  /// External scroll speed in world units per second. Zero freezes the floor.
  pub scroll_speed: f32,
  pub viewport: Option<ViewportEdges>,
}

/// Sizing and behaviour constants of the streamer.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamerSettings {
  pub chunk_width: f32,
  pub active_chunk_count: usize,
  pub spawn_y: f32,
  pub recycle_offset: f32,
  pub chunk_overlap: f32,
  pub min_speed_multiplier: f32,
  pub max_speed_multiplier: f32,
  pub use_object_pooling: bool,
  pub preload_per_template: usize,
}

impl StreamerSettings {
  pub fn from_config(config: &FloorConfig) -> Self {
    Self {
      chunk_width: config.streaming.chunk_width,
      active_chunk_count: config.streaming.active_chunk_count,
      spawn_y: config.streaming.spawn_y,
      recycle_offset: config.streaming.recycle_offset,
      chunk_overlap: config.streaming.chunk_overlap,
      min_speed_multiplier: config.speed.min_multiplier,
      max_speed_multiplier: config.speed.max_multiplier,
      use_object_pooling: config.pooling.enabled,
      preload_per_template: config.pooling.preload_per_template,
    }
  }

  /// Whether switching from `self` to `other` changes the window layout.
  fn layout_differs(&self, other: &Self) -> bool {
    self.chunk_width != other.chunk_width
      || self.active_chunk_count != other.active_chunk_count
      || self.spawn_y != other.spawn_y
      || self.use_object_pooling != other.use_object_pooling
  }
}

impl Default for StreamerSettings {
  fn default() -> Self {
    Self::from_config(&FloorConfig::default())
  }
}

/// Error raised by the floor streamer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorError {
  /// The catalog has no patterns at all.
  EmptyCatalog,
  /// Every pattern has an unresolved template or zero weight.
  NoUsablePatterns,
  /// No usable pattern is unlocked at this difficulty level.
  NoEligiblePattern { level: u32 },
  UnknownPattern(PatternId),
  /// The pool could not produce an instance.
  SpawnFailed(PatternId),
  /// Streaming was disabled by a failed startup.
  Disabled,
}

impl fmt::Display for FloorError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::EmptyCatalog => write!(f, "pattern catalog is empty"),
      Self::NoUsablePatterns => write!(f, "pattern catalog has no usable patterns"),
      Self::NoEligiblePattern { level } => {
        write!(f, "no pattern eligible at difficulty {}", level)
      }
      Self::UnknownPattern(id) => write!(f, "unknown pattern {}", id.0),
      Self::SpawnFailed(id) => write!(f, "failed to spawn pattern {}", id.0),
      Self::Disabled => write!(f, "floor streaming is disabled"),
    }
  }
}

impl std::error::Error for FloorError {}

#[derive(Clone, Debug, PartialEq)]
enum StreamerState {
  Idle,
  Running,
  Disabled(FloorError),
}

/// Streams floor chunks past the viewport.
#[derive(Resource)]
pub struct ChunkStreamer {
  settings: StreamerSettings,
  catalog: PatternCatalog,
  selector: PatternSelector,
  clock: DifficultyClock,
  window: Vec<ChunkInstance>,
  bounds: StreamingBounds,
  viewport: Option<ViewportEdges>,
  state: StreamerState,
  paused: bool,
  speed_multiplier: f32,
  rng: StdRng,
  root: Option<Entity>,
  pool_preloaded: bool,
}

impl ChunkStreamer {
  pub fn new(
    settings: StreamerSettings,
    catalog: PatternCatalog,
    selector: PatternSelector,
    clock: DifficultyClock,
    rng: StdRng,
  ) -> Self {
    Self {
      bounds: StreamingBounds::compute(None, &settings),
      settings,
      catalog,
      selector,
      clock,
      window: Vec::new(),
      viewport: None,
      state: StreamerState::Idle,
      paused: false,
      speed_multiplier: 1.0,
      rng,
      root: None,
      pool_preloaded: false,
    }
  }

  /// Builds a streamer from config, resolving patterns against `library`.
  pub fn from_config(config: &FloorConfig, library: &TemplateLibrary) -> Self {
    let config = config.clone().sanitized();
    let rng = match config.streaming.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_os_rng(),
    };

    let mut streamer = Self::new(
      StreamerSettings::from_config(&config),
      PatternCatalog::resolve(&config.patterns, library),
      PatternSelector::new(
        config.streaming.prevent_repeat,
        config.streaming.repeat_prevent_count,
      ),
      DifficultyClock::new(config.difficulty.interval_secs, config.difficulty.enabled),
      rng,
    );
    streamer.set_speed_multiplier(config.speed.speed_multiplier);
    streamer
  }

  /// Fills the window for the first time.
  ///
  /// Fails, and disables streaming, when the catalog has nothing usable.
  /// Chunks already in the window are released first.
  pub fn start(&mut self, world: &mut World, pool: &mut PoolRegistry) -> Result<(), FloorError> {
    self.release_all(world, pool);

    if self.catalog.is_empty() {
      return self.disable(FloorError::EmptyCatalog);
    }
    if !self.catalog.has_usable() {
      return self.disable(FloorError::NoUsablePatterns);
    }

    self.ensure_root(world);
    if self.settings.use_object_pooling && !self.pool_preloaded {
      for template in self.catalog.usable_templates() {
        pool.initialize_pool(world, &template, self.settings.preload_per_template);
      }
      self.pool_preloaded = true;
    }

    self.state = StreamerState::Running;
    self.bounds = StreamingBounds::compute(self.viewport, &self.settings);

    let mut x = self.bounds.left + self.settings.chunk_width;
    for _ in 0..self.settings.active_chunk_count {
      if let Err(err) = self.spawn_selected(world, pool, x) {
        warn!("Startup chunk skipped: {}", err);
      }
      x += self.settings.chunk_width;
    }

    info!(
      "Floor started with {} chunks ({} patterns)",
      self.window.len(),
      self.catalog.len()
    );
    Ok(())
  }

  /// Advances the floor by one tick.
  pub fn tick(&mut self, world: &mut World, pool: &mut PoolRegistry, tick: FloorTick) {
    if self.paused || self.state != StreamerState::Running {
      return;
    }
    self.viewport = tick.viewport;
    self.prune_missing(world, pool);

    if let Some(level) = self.clock.advance(tick.delta_secs) {
      info!("Difficulty level {}", level);
    }

    let speed = tick.scroll_speed * self.speed_multiplier;
    let dx = -speed * tick.delta_secs;
    if dx != 0.0 {
      for chunk in &mut self.window {
        chunk.x += dx;
      }
      self.sync_transforms(world);
    }

    self.bounds = StreamingBounds::compute(self.viewport, &self.settings);
    self.recycle(world, pool);
    self.top_up(world, pool);
  }

  /// Releases every chunk, forgets history and difficulty, and starts over.
  pub fn reset_floor(
    &mut self,
    world: &mut World,
    pool: &mut PoolRegistry,
  ) -> Result<(), FloorError> {
    self.release_all(world, pool);
    self.selector.history_mut().clear();
    self.clock.reset();
    info!("Floor reset");
    self.start(world, pool)
  }

  /// Appends a chunk of pattern `id` at the right end, bypassing the selector
  /// and the pool.
  ///
  /// The window grows by one until the next recycle absorbs it.
  pub fn force_spawn_pattern(
    &mut self,
    world: &mut World,
    id: PatternId,
  ) -> Result<Entity, FloorError> {
    if matches!(self.state, StreamerState::Disabled(_)) {
      return Err(FloorError::Disabled);
    }
    let pattern = self.catalog.get(id).ok_or(FloorError::UnknownPattern(id))?;
    let template = pattern
      .template
      .clone()
      .ok_or(FloorError::UnknownPattern(id))?;
    let label = pattern.label.clone();

    let root = self.ensure_root(world);
    let x = self
      .rightmost_x()
      .map(|max_x| max_x + self.settings.chunk_width)
      .unwrap_or(self.bounds.left + self.settings.chunk_width);
    let entity = template.instantiate(
      world,
      Transform::from_xyz(x, self.settings.spawn_y, 0.0),
      Some(root),
    );
    world.entity_mut(entity).insert(FloorChunk { pattern: id });

    self.window.push(ChunkInstance {
      entity,
      pattern: id,
      x,
      forced: true,
    });
    info!("Forced chunk '{}' at x={:.1}", label, x);
    Ok(entity)
  }

  /// Sets the speed multiplier, clamped to the configured range. Returns the
  /// applied value.
  pub fn set_speed_multiplier(&mut self, value: f32) -> f32 {
    self.speed_multiplier = value.clamp(
      self.settings.min_speed_multiplier,
      self.settings.max_speed_multiplier,
    );
    self.speed_multiplier
  }

  pub fn set_paused(&mut self, paused: bool) {
    if self.paused != paused {
      debug!("Floor {}", if paused { "paused" } else { "resumed" });
    }
    self.paused = paused;
  }

  /// Applies a reloaded config.
  ///
  /// Tunables take effect immediately. Returns true when the window layout
  /// changed and the floor needs a reset to pick it up.
  pub fn apply_config(&mut self, config: &FloorConfig, library: &TemplateLibrary) -> bool {
    let config = config.clone().sanitized();
    let settings = StreamerSettings::from_config(&config);
    let needs_reset = self.settings.layout_differs(&settings)
      || matches!(self.state, StreamerState::Disabled(_));

    self.settings = settings;
    self.catalog = PatternCatalog::resolve(&config.patterns, library);
    self.selector.prevent_repeat = config.streaming.prevent_repeat;
    self
      .selector
      .history_mut()
      .set_cap(config.streaming.repeat_prevent_count);
    self.clock.running = config.difficulty.enabled;
    self.clock.set_interval(config.difficulty.interval_secs);
    self.set_speed_multiplier(config.speed.speed_multiplier);

    needs_reset
  }

  pub fn window(&self) -> &[ChunkInstance] {
    &self.window
  }

  pub fn settings(&self) -> &StreamerSettings {
    &self.settings
  }

  pub fn catalog(&self) -> &PatternCatalog {
    &self.catalog
  }

  pub fn history(&self) -> &PatternHistory {
    self.selector.history()
  }

  pub fn difficulty(&self) -> &DifficultyClock {
    &self.clock
  }

  pub fn difficulty_level(&self) -> u32 {
    self.clock.level()
  }

  pub fn bounds(&self) -> StreamingBounds {
    self.bounds
  }

  pub fn speed_multiplier(&self) -> f32 {
    self.speed_multiplier
  }

  pub fn is_paused(&self) -> bool {
    self.paused
  }

  pub fn is_running(&self) -> bool {
    self.state == StreamerState::Running
  }

  /// Why streaming stopped, if it did.
  pub fn disabled_reason(&self) -> Option<&FloorError> {
    match &self.state {
      StreamerState::Disabled(err) => Some(err),
      _ => None,
    }
  }

  pub fn root(&self) -> Option<Entity> {
    self.root
  }

  /// Releases crossed chunks oldest first, respawning each immediately off
  /// the updated right end.
  fn recycle(&mut self, world: &mut World, pool: &mut PoolRegistry) {
    let present = self.window.len();
    let mut index = 0;

    for _ in 0..present {
      if self.window[index].x > self.bounds.left {
        index += 1;
        continue;
      }

      let chunk = self.window.remove(index);
      self.release(world, pool, chunk);

      if self.window.len() < self.settings.active_chunk_count {
        let x = self.respawn_x();
        if let Err(err) = self.spawn_selected(world, pool, x) {
          warn!("Recycle skipped: {}", err);
        }
      }
    }
  }

  /// Refills a window left short by earlier selection failures.
  fn top_up(&mut self, world: &mut World, pool: &mut PoolRegistry) {
    while self.window.len() < self.settings.active_chunk_count {
      let x = self.respawn_x();
      if let Err(err) = self.spawn_selected(world, pool, x) {
        debug!("Window short by {}: {}", self.settings.active_chunk_count - self.window.len(), err);
        break;
      }
    }
  }

  fn spawn_selected(
    &mut self,
    world: &mut World,
    pool: &mut PoolRegistry,
    x: f32,
  ) -> Result<Entity, FloorError> {
    let level = self.clock.level();
    let id = self
      .selector
      .select(&self.catalog, level, &mut self.rng)
      .ok_or(FloorError::NoEligiblePattern { level })?;
    let template = self
      .catalog
      .get(id)
      .and_then(|pattern| pattern.template.clone())
      .ok_or(FloorError::UnknownPattern(id))?;

    let root = self.ensure_root(world);
    let position = Vec3::new(x, self.settings.spawn_y, 0.0);
    let entity = if self.settings.use_object_pooling {
      pool
        .get(world, &template, position, Quat::IDENTITY, Some(root))
        .ok_or(FloorError::SpawnFailed(id))?
    } else {
      template.instantiate(world, Transform::from_translation(position), Some(root))
    };
    if let Ok(mut entity_mut) = world.get_entity_mut(entity) {
      entity_mut.insert(FloorChunk { pattern: id });
    }

    self.window.push(ChunkInstance {
      entity,
      pattern: id,
      x,
      forced: false,
    });
    Ok(entity)
  }

  /// Drops window entries whose entity was despawned or taken back by the
  /// pool outside the streamer. `top_up` refills the gap.
  fn prune_missing(&mut self, world: &World, pool: &PoolRegistry) {
    let before = self.window.len();
    self.window.retain(|chunk| {
      world.get_entity(chunk.entity).is_ok()
        && (!pool.owns(chunk.entity) || pool.is_in_use(chunk.entity))
    });
    let dropped = before - self.window.len();
    if dropped > 0 {
      warn!("Dropped {} floor chunks removed outside the streamer", dropped);
    }
  }

  /// Pool-issued chunks go back to their pool whatever the current pooling
  /// setting; everything else (forced or unpooled chunks) is despawned.
  fn release(&self, world: &mut World, pool: &mut PoolRegistry, chunk: ChunkInstance) {
    pool.return_to_pool(world, chunk.entity);
  }

  fn release_all(&mut self, world: &mut World, pool: &mut PoolRegistry) {
    for chunk in std::mem::take(&mut self.window) {
      self.release(world, pool, chunk);
    }
  }

  fn disable(&mut self, err: FloorError) -> Result<(), FloorError> {
    error!("Floor streaming disabled: {}", err);
    self.state = StreamerState::Disabled(err.clone());
    Err(err)
  }

  fn rightmost_x(&self) -> Option<f32> {
    self.window.iter().map(|chunk| chunk.x).reduce(f32::max)
  }

  fn respawn_x(&self) -> f32 {
    match self.rightmost_x() {
      Some(max_x) => max_x + self.settings.chunk_width - self.settings.chunk_overlap,
      None => self.bounds.left + self.settings.chunk_width,
    }
  }

  fn sync_transforms(&self, world: &mut World) {
    for chunk in &self.window {
      if let Some(mut transform) = world.get_mut::<Transform>(chunk.entity) {
        transform.translation.x = chunk.x;
      }
    }
  }

  fn ensure_root(&mut self, world: &mut World) -> Entity {
    match self.root {
      Some(root) if world.get_entity(root).is_ok() => root,
      _ => {
        let root = world
          .spawn((Name::new("Floor"), FloorRoot, Transform::default()))
          .id();
        self.root = Some(root);
        root
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use rand::Rng;

  use super::*;
  use crate::config::PatternConfig;
  use crate::pool::{PoolStatus, Pooled};

  const VIEW: Option<ViewportEdges> = Some(ViewportEdges {
    left: -10.0,
    right: 10.0,
  });

  struct Harness {
    world: World,
    pool: PoolRegistry,
    library: TemplateLibrary,
    streamer: ChunkStreamer,
  }

  impl Harness {
    fn new(config: FloorConfig) -> Self {
      let mut library = TemplateLibrary::default();
      for name in ["flat", "pit", "stairs", "spikes"] {
        library.register(name, |_: &mut EntityWorldMut| {});
      }
      let mut streamer = ChunkStreamer::from_config(&config, &library);
      streamer.viewport = VIEW;
      Self {
        world: World::new(),
        pool: PoolRegistry::new(),
        library,
        streamer,
      }
    }

    fn start(&mut self) -> Result<(), FloorError> {
      self.streamer.start(&mut self.world, &mut self.pool)
    }

    fn tick(&mut self, delta_secs: f32, scroll_speed: f32) {
      self.streamer.tick(
        &mut self.world,
        &mut self.pool,
        FloorTick {
          delta_secs,
          scroll_speed,
          viewport: VIEW,
        },
      );
    }

    fn xs(&self) -> Vec<f32> {
      self.streamer.window().iter().map(|c| c.x).collect()
    }
  }

  fn pattern(template: &str, weight: u32, min_difficulty: u32) -> PatternConfig {
    PatternConfig {
      template: template.to_string(),
      weight,
      min_difficulty,
      label: String::new(),
    }
  }

  fn config(patterns: Vec<PatternConfig>) -> FloorConfig {
    let mut config = FloorConfig::default();
    config.streaming.seed = Some(42);
    config.patterns = patterns;
    config
  }

  fn default_patterns() -> Vec<PatternConfig> {
    vec![
      pattern("flat", 5, 0),
      pattern("pit", 3, 0),
      pattern("stairs", 2, 0),
      pattern("spikes", 4, 0),
    ]
  }

  #[test]
  fn startup_fills_window_contiguously() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();

    // left = -10 - 18 - 2 = -30; first chunk at left + width.
    assert_eq!(h.xs(), vec![-12.0, 6.0, 24.0]);
    assert_eq!(h.streamer.bounds(), StreamingBounds { left: -30.0, right: 12.0 });
    for chunk in h.streamer.window() {
      let transform = h.world.get::<Transform>(chunk.entity).unwrap();
      assert_eq!(transform.translation.x, chunk.x);
      assert_eq!(
        h.world.get::<ChildOf>(chunk.entity).map(ChildOf::parent),
        h.streamer.root()
      );
    }
  }

  #[test]
  fn missing_viewport_uses_fallback_bounds() {
    let mut h = Harness::new(config(default_patterns()));
    h.streamer.viewport = None;
    h.start().unwrap();
    assert_eq!(h.streamer.bounds(), StreamingBounds { left: -36.0, right: 18.0 });
  }

  #[test]
  fn simultaneous_crossings_reanchor_off_updated_right_edge() {
    let mut cfg = config(default_patterns());
    cfg.streaming.active_chunk_count = 4;
    let mut h = Harness::new(cfg);
    h.start().unwrap();
    assert_eq!(h.xs(), vec![-12.0, 6.0, 24.0, 42.0]);

    // Moves to -52, -34, -16, 2: the first two cross -30.
    h.tick(1.0, 40.0);
    assert_eq!(h.xs(), vec![-16.0, 2.0, 20.0, 38.0]);
  }

  #[test]
  fn window_stays_full_and_gapless_under_random_ticks() {
    let mut cfg = config(default_patterns());
    cfg.streaming.chunk_overlap = 0.5;
    cfg.streaming.active_chunk_count = 5;
    let mut h = Harness::new(cfg);
    h.start().unwrap();

    let width = h.streamer.settings().chunk_width;
    let overlap = h.streamer.settings().chunk_overlap;
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..5_000 {
      let delta = rng.random_range(0.0..0.1);
      let speed = rng.random_range(0.0..60.0);
      h.tick(delta, speed);

      assert_eq!(h.streamer.window().len(), 5);
      for pair in h.streamer.window().windows(2) {
        let step = pair[1].x - pair[0].x;
        assert!(step > 0.0, "chunks out of order: {pair:?}");
        assert!(step <= width + 1e-3, "gap between chunks: {step}");
        assert!(step >= width - overlap - 1e-3, "chunks overlap too much: {step}");
      }
    }
  }

  #[test]
  fn zero_speed_freezes_the_window() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();
    let before = h.streamer.window().to_vec();
    h.tick(0.5, 0.0);
    assert_eq!(h.streamer.window(), before.as_slice());
  }

  #[test]
  fn paused_floor_ignores_ticks() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();
    h.streamer.set_paused(true);
    h.tick(1.0, 100.0);
    assert_eq!(h.xs(), vec![-12.0, 6.0, 24.0]);

    h.streamer.set_paused(false);
    h.tick(1.0, 1.0);
    assert_eq!(h.xs(), vec![-13.0, 5.0, 23.0]);
  }

  #[test]
  fn speed_multiplier_is_clamped_and_applied() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();
    assert_eq!(h.streamer.set_speed_multiplier(10.0), 3.0);
    assert_eq!(h.streamer.set_speed_multiplier(0.0), 0.1);
    h.streamer.set_speed_multiplier(2.0);

    h.tick(1.0, 1.0);
    assert_eq!(h.xs(), vec![-14.0, 4.0, 22.0]);
  }

  #[test]
  fn forced_chunk_absorbs_one_recycle() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();
    let forced = h
      .streamer
      .force_spawn_pattern(&mut h.world, PatternId(2))
      .unwrap();
    assert_eq!(h.xs(), vec![-12.0, 6.0, 24.0, 42.0]);
    assert!(!h.pool.owns(forced));
    assert_eq!(
      h.world.get::<FloorChunk>(forced),
      Some(&FloorChunk { pattern: PatternId(2) })
    );

    // -12 -> -32 crosses; the window shrinks back without a respawn.
    h.tick(1.0, 20.0);
    assert_eq!(h.xs(), vec![-14.0, 4.0, 22.0]);
    assert!(h.streamer.window().last().unwrap().forced);

    // Once the forced chunk itself recycles it is destroyed, not pooled.
    h.tick(1.0, 60.0);
    h.tick(1.0, 0.0);
    assert!(h.streamer.window().iter().all(|c| !c.forced));
    assert!(h.world.get_entity(forced).is_err());
    assert_eq!(h.streamer.window().len(), 3);
  }

  #[test]
  fn force_spawn_rejects_unknown_pattern() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();
    assert_eq!(
      h.streamer.force_spawn_pattern(&mut h.world, PatternId(40)),
      Err(FloorError::UnknownPattern(PatternId(40)))
    );
  }

  #[test]
  fn reset_returns_to_level_zero_patterns() {
    let mut cfg = config(vec![pattern("flat", 1, 0), pattern("spikes", 1000, 5)]);
    cfg.difficulty.enabled = true;
    cfg.difficulty.interval_secs = 1.0;
    let mut h = Harness::new(cfg);
    h.start().unwrap();

    h.tick(5.5, 0.0);
    assert_eq!(h.streamer.difficulty_level(), 5);
    // Three recycles at level 5 almost surely pick the heavy pattern.
    h.tick(1.0, 60.0);
    assert!(h.streamer.window().iter().any(|c| c.pattern == PatternId(1)));

    h.streamer.reset_floor(&mut h.world, &mut h.pool).unwrap();
    assert_eq!(h.streamer.difficulty_level(), 0);
    assert_eq!(h.streamer.difficulty().elapsed(), 0.0);
    assert_eq!(h.streamer.window().len(), 3);
    assert!(h.streamer.window().iter().all(|c| c.pattern == PatternId(0)));
    assert!(h.streamer.history().iter().all(|id| id == PatternId(0)));
  }

  #[test]
  fn empty_catalog_disables_streaming() {
    let mut h = Harness::new(config(Vec::new()));
    assert_eq!(h.start(), Err(FloorError::EmptyCatalog));
    assert_eq!(h.streamer.disabled_reason(), Some(&FloorError::EmptyCatalog));

    h.tick(1.0, 10.0);
    assert!(h.streamer.window().is_empty());
    assert_eq!(
      h.streamer.force_spawn_pattern(&mut h.world, PatternId(0)),
      Err(FloorError::Disabled)
    );
  }

  #[test]
  fn unusable_catalog_disables_streaming() {
    let mut h = Harness::new(config(vec![
      pattern("missing", 5, 0),
      pattern("flat", 0, 0),
    ]));
    assert_eq!(h.start(), Err(FloorError::NoUsablePatterns));
    assert!(!h.streamer.is_running());
  }

  #[test]
  fn short_window_is_topped_up_once_patterns_unlock() {
    let mut cfg = config(vec![pattern("pit", 5, 1), pattern("stairs", 5, 1)]);
    cfg.difficulty.enabled = true;
    cfg.difficulty.interval_secs = 1.0;
    let mut h = Harness::new(cfg);

    h.start().unwrap();
    assert!(h.streamer.window().is_empty());

    h.tick(1.0, 0.0);
    assert_eq!(h.streamer.difficulty_level(), 1);
    assert_eq!(h.xs(), vec![-12.0, 6.0, 24.0]);
  }

  #[test]
  fn pooled_chunks_are_reused() {
    let mut h = Harness::new(config(vec![pattern("flat", 1, 0)]));
    h.start().unwrap();
    let flat = h.library.get("flat").unwrap().id();
    assert_eq!(h.pool.pool_status(flat), PoolStatus { available: 0, in_use: 3 });

    let first = h.streamer.window()[0].entity;
    h.tick(1.0, 20.0);
    assert_eq!(h.pool.pool_status(flat), PoolStatus { available: 0, in_use: 3 });
    let last = h.streamer.window().last().unwrap();
    assert_eq!(last.entity, first);
    assert_eq!(h.world.get::<Transform>(first).unwrap().translation.x, last.x);
  }

  #[test]
  fn unpooled_chunks_are_despawned() {
    let mut cfg = config(vec![pattern("flat", 1, 0)]);
    cfg.pooling.enabled = false;
    let mut h = Harness::new(cfg);
    h.start().unwrap();

    let first = h.streamer.window()[0].entity;
    h.tick(1.0, 20.0);
    assert!(h.world.get_entity(first).is_err());
    assert_eq!(h.streamer.window().len(), 3);
    assert_eq!(h.pool.templates().count(), 0);
  }

  #[test]
  fn turning_pooling_off_returns_pooled_chunks() {
    let mut h = Harness::new(config(vec![pattern("flat", 1, 0)]));
    h.start().unwrap();
    let flat = h.library.get("flat").unwrap().id();
    let old: Vec<Entity> = h.streamer.window().iter().map(|c| c.entity).collect();

    let mut cfg = config(vec![pattern("flat", 1, 0)]);
    cfg.pooling.enabled = false;
    assert!(h.streamer.apply_config(&cfg, &h.library));
    h.streamer.reset_floor(&mut h.world, &mut h.pool).unwrap();

    assert_eq!(h.pool.pool_status(flat), PoolStatus { available: 3, in_use: 0 });
    for entity in old {
      assert!(h.world.get::<Pooled>(entity).unwrap().is_returned());
      assert!(!h.streamer.window().iter().any(|c| c.entity == entity));
    }
    for chunk in h.streamer.window() {
      assert!(!h.pool.owns(chunk.entity));
    }
    assert_eq!(h.streamer.window().len(), 3);
  }

  #[test]
  fn externally_removed_chunks_are_replaced() {
    let mut h = Harness::new(config(vec![pattern("flat", 1, 0)]));
    h.start().unwrap();
    let gone = h.streamer.window()[1].entity;
    h.world.despawn(gone);

    h.tick(0.0, 0.0);
    assert_eq!(h.streamer.window().len(), 3);
    assert!(h.streamer.window().iter().all(|c| h.world.get_entity(c.entity).is_ok()));

    h.pool.clear_all_pools(&mut h.world);
    h.tick(0.0, 0.0);
    assert_eq!(h.streamer.window().len(), 3);
    for chunk in h.streamer.window() {
      assert!(h.pool.is_in_use(chunk.entity));
    }
  }

  #[test]
  fn reload_reports_layout_changes() {
    let mut h = Harness::new(config(default_patterns()));
    h.start().unwrap();

    let mut cfg = config(default_patterns());
    cfg.speed.max_multiplier = 1.5;
    cfg.speed.speed_multiplier = 2.0;
    assert!(!h.streamer.apply_config(&cfg, &h.library));
    assert_eq!(h.streamer.speed_multiplier(), 1.5);

    cfg.streaming.active_chunk_count = 6;
    assert!(h.streamer.apply_config(&cfg, &h.library));
  }

  #[test]
  fn disabled_streamer_restarts_after_reload() {
    let mut h = Harness::new(config(Vec::new()));
    assert!(h.start().is_err());

    assert!(h.streamer.apply_config(&config(default_patterns()), &h.library));
    h.streamer.reset_floor(&mut h.world, &mut h.pool).unwrap();
    assert!(h.streamer.is_running());
    assert_eq!(h.streamer.window().len(), 3);
  }
}
