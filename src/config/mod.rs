mod plugin;

use std::path::Path;
use std::{fmt, io};

use bevy::{asset::Asset, prelude::*, reflect::TypePath};
pub use plugin::{FloorConfigHandle, FloorConfigPlugin};
use serde::Deserialize;

/// Default location of the floor config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "assets/config/floor.config.toml";

#[derive(Asset, TypePath, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct FloorConfig {
  pub streaming: StreamingConfig,
  pub speed: SpeedConfig,
  pub difficulty: DifficultyConfig,
  pub pooling: PoolingConfig,
  pub patterns: Vec<PatternConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StreamingConfig {
  /// Width of every chunk along the scroll axis.
  pub chunk_width: f32,
  pub active_chunk_count: usize,
  pub spawn_y: f32,
  /// Extra margin beyond the viewport before a chunk is recycled.
  pub recycle_offset: f32,
  /// How far a respawned chunk tucks under its left neighbour.
  pub chunk_overlap: f32,
  pub prevent_repeat: bool,
  pub repeat_prevent_count: usize,
  /// Fixed RNG seed; random when absent.
  pub seed: Option<u64>,
}

impl Default for StreamingConfig {
  fn default() -> Self {
    Self {
      chunk_width: 18.0,
      active_chunk_count: 3,
      spawn_y: 0.0,
      recycle_offset: 2.0,
      chunk_overlap: 0.0,
      prevent_repeat: true,
      repeat_prevent_count: 2,
      seed: None,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SpeedConfig {
  /// Initial value of the shared scroll speed.
  pub base_scroll_speed: f32,
  pub speed_multiplier: f32,
  pub min_multiplier: f32,
  pub max_multiplier: f32,
}

impl Default for SpeedConfig {
  fn default() -> Self {
    Self {
      base_scroll_speed: 6.5,
      speed_multiplier: 1.0,
      min_multiplier: 0.1,
      max_multiplier: 3.0,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DifficultyConfig {
  pub enabled: bool,
  pub interval_secs: f32,
}

impl Default for DifficultyConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      interval_secs: 30.0,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PoolingConfig {
  pub enabled: bool,
  /// Instances created per template when the floor first starts.
  pub preload_per_template: usize,
}

impl Default for PoolingConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      preload_per_template: 3,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PatternConfig {
  /// Name of a template registered in the `TemplateLibrary`.
  pub template: String,
  #[serde(default = "default_weight")]
  pub weight: u32,
  #[serde(default)]
  pub min_difficulty: u32,
  #[serde(default)]
  pub label: String,
}

fn default_weight() -> u32 {
  5
}

impl FloorConfig {
  pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(source)?)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let source = std::fs::read_to_string(path)?;
    Self::from_toml_str(&source)
  }

  /// Clamps out-of-range values to usable ones, warning about each fix.
  pub fn sanitized(mut self) -> Self {
    let streaming = &mut self.streaming;
    if streaming.chunk_width <= 0.0 {
      warn!("chunk_width must be positive, using 18");
      streaming.chunk_width = 18.0;
    }
    if streaming.active_chunk_count < 2 {
      warn!("active_chunk_count must be at least 2");
      streaming.active_chunk_count = 2;
    }
    if streaming.chunk_overlap < 0.0 || streaming.chunk_overlap >= streaming.chunk_width {
      warn!(
        "chunk_overlap {} outside [0, chunk_width), using 0",
        streaming.chunk_overlap
      );
      streaming.chunk_overlap = 0.0;
    }

    let speed = &mut self.speed;
    if speed.min_multiplier > speed.max_multiplier {
      warn!("min_multiplier above max_multiplier, swapping");
      std::mem::swap(&mut speed.min_multiplier, &mut speed.max_multiplier);
    }
    speed.speed_multiplier = speed
      .speed_multiplier
      .clamp(speed.min_multiplier, speed.max_multiplier);
    speed.base_scroll_speed = speed.base_scroll_speed.max(0.0);

    if self.difficulty.interval_secs <= 0.0 {
      warn!("difficulty interval must be positive, using 30s");
      self.difficulty.interval_secs = 30.0;
    }

    for (i, pattern) in self.patterns.iter_mut().enumerate() {
      if pattern.label.is_empty() {
        pattern.label = format!("{} #{}", pattern.template, i);
      }
    }

    self
  }
}

/// The live, sanitized floor configuration.
#[derive(Resource, Debug, Clone)]
pub struct FloorSettings(pub FloorConfig);

impl FloorSettings {
  pub fn new(config: FloorConfig) -> Self {
    Self(config.sanitized())
  }
}

/// Error loading the floor config.
#[derive(Debug)]
pub enum ConfigError {
  Io(io::Error),
  Parse(toml::de::Error),
}

impl From<io::Error> for ConfigError {
  fn from(err: io::Error) -> Self {
    Self::Io(err)
  }
}

impl From<toml::de::Error> for ConfigError {
  fn from(err: toml::de::Error) -> Self {
    Self::Parse(err)
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Io(e) => write!(f, "I/O error: {}", e),
      Self::Parse(e) => write!(f, "parse error: {}", e),
    }
  }
}

impl std::error::Error for ConfigError {}
