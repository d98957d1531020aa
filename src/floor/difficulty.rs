//! Play-time driven difficulty level.

/// Maps elapsed active play time to an integer difficulty level.
///
/// `level = floor(elapsed / interval)`, with no upper bound. Time only
/// accumulates while `running` is set.
#[derive(Clone, Debug)]
pub struct DifficultyClock {
  pub running: bool,
  interval: f32,
  elapsed: f32,
  level: u32,
}

impl DifficultyClock {
  pub fn new(interval_secs: f32, running: bool) -> Self {
    Self {
      running,
      interval: interval_secs,
      elapsed: 0.0,
      level: 0,
    }
  }

  pub fn level(&self) -> u32 {
    self.level
  }

  pub fn elapsed(&self) -> f32 {
    self.elapsed
  }

  pub fn interval(&self) -> f32 {
    self.interval
  }

  /// Changes the step length. The level never drops as a result.
  pub fn set_interval(&mut self, interval_secs: f32) {
    self.interval = interval_secs;
    self.level = self.level.max(self.level_at(self.elapsed));
  }

  /// Accumulates `delta` seconds, returning the new level if it changed.
  pub fn advance(&mut self, delta: f32) -> Option<u32> {
    if !self.running || delta <= 0.0 {
      return None;
    }

    self.elapsed += delta;
    let level = self.level_at(self.elapsed);
    if level > self.level {
      self.level = level;
      Some(level)
    } else {
      None
    }
  }

  pub fn reset(&mut self) {
    self.elapsed = 0.0;
    self.level = 0;
  }

  fn level_at(&self, elapsed: f32) -> u32 {
    if self.interval <= 0.0 {
      return self.level;
    }
    (elapsed / self.interval).floor() as u32
  }
}
