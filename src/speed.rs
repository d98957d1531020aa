//! Shared scroll speed.

use bevy::prelude::*;

/// World scroll speed in units per second, read by the floor every tick.
///
/// A boost scales the base speed for a fixed time. Boosting again while a
/// boost is active replaces it and restarts the countdown; the base speed
/// underneath is untouched either way.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct ScrollSpeed {
  base: f32,
  boost: Option<SpeedBoost>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SpeedBoost {
  multiplier: f32,
  remaining: f32,
}

impl Default for ScrollSpeed {
  fn default() -> Self {
    Self::new(6.5)
  }
}

impl ScrollSpeed {
  pub fn new(base: f32) -> Self {
    Self {
      base: base.max(0.0),
      boost: None,
    }
  }

  /// Effective speed, including any active boost.
  pub fn current(&self) -> f32 {
    match self.boost {
      Some(boost) => self.base * boost.multiplier,
      None => self.base,
    }
  }

  pub fn base(&self) -> f32 {
    self.base
  }

  /// Sets the base speed. Negative values clamp to zero.
  pub fn set(&mut self, speed: f32) {
    self.base = speed.max(0.0);
  }

  pub fn boost(&mut self, multiplier: f32, seconds: f32) {
    if seconds <= 0.0 {
      return;
    }
    let multiplier = multiplier.max(0.0);
    info!(
      "Speed boost x{:.2} for {:.1}s ({:.2} -> {:.2})",
      multiplier,
      seconds,
      self.base,
      self.base * multiplier
    );
    self.boost = Some(SpeedBoost {
      multiplier,
      remaining: seconds,
    });
  }

  pub fn is_boosted(&self) -> bool {
    self.boost.is_some()
  }

  /// Cancels any active boost.
  pub fn end_boost(&mut self) {
    self.boost = None;
  }

  /// Counts the boost down. Returns true on the tick it expires.
  pub fn tick(&mut self, delta: f32) -> bool {
    let Some(boost) = &mut self.boost else {
      return false;
    };
    boost.remaining -= delta;
    if boost.remaining > 0.0 {
      return false;
    }
    self.boost = None;
    true
  }
}

/// System: expires speed boosts.
pub fn tick_scroll_speed(time: Res<Time>, mut speed: ResMut<ScrollSpeed>) {
  if speed.tick(time.delta_secs()) {
    info!("Speed boost ended, speed {:.2}", speed.current());
  }
}
