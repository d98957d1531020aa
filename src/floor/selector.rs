//! Weighted pattern selection with difficulty gating and anti-repeat.

use std::collections::VecDeque;

use rand::Rng;

use super::catalog::{PatternCatalog, PatternId};

/// Bounded FIFO of the most recently selected patterns.
#[derive(Clone, Debug, Default)]
pub struct PatternHistory {
  entries: VecDeque<PatternId>,
  cap: usize,
}

impl PatternHistory {
  pub fn new(cap: usize) -> Self {
    Self {
      entries: VecDeque::with_capacity(cap + 1),
      cap,
    }
  }

  /// Records a selection, evicting the oldest entries beyond the cap.
  pub fn push(&mut self, id: PatternId) {
    self.entries.push_back(id);
    while self.entries.len() > self.cap {
      self.entries.pop_front();
    }
  }

  pub fn contains(&self, id: PatternId) -> bool {
    self.entries.contains(&id)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn cap(&self) -> usize {
    self.cap
  }

  /// Changes the cap, trimming the oldest entries if needed.
  pub fn set_cap(&mut self, cap: usize) {
    self.cap = cap;
    while self.entries.len() > self.cap {
      self.entries.pop_front();
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = PatternId> + '_ {
    self.entries.iter().copied()
  }
}

/// Picks chunk patterns.
#[derive(Clone, Debug)]
pub struct PatternSelector {
  pub prevent_repeat: bool,
  history: PatternHistory,
}

impl PatternSelector {
  pub fn new(prevent_repeat: bool, repeat_prevent_count: usize) -> Self {
    Self {
      prevent_repeat,
      history: PatternHistory::new(repeat_prevent_count),
    }
  }

  pub fn history(&self) -> &PatternHistory {
    &self.history
  }

  pub fn history_mut(&mut self) -> &mut PatternHistory {
    &mut self.history
  }

  /// Selects the next pattern for difficulty `level` and records it.
  ///
  /// Patterns gated above `level` are never candidates. Recently used
  /// patterns are skipped while anti-repeat is on, unless that would leave no
  /// candidate at all. Returns `None` when nothing passes the difficulty gate.
  pub fn select<R: Rng>(
    &mut self,
    catalog: &PatternCatalog,
    level: u32,
    rng: &mut R,
  ) -> Option<PatternId> {
    let mut candidates = self.candidates(catalog, level, self.prevent_repeat);
    if candidates.is_empty() {
      candidates = self.candidates(catalog, level, false);
    }

    let chosen = match candidates.as_slice() {
      [] => return None,
      [(only, _)] => *only,
      _ => weighted_pick(&candidates, rng),
    };

    self.history.push(chosen);
    Some(chosen)
  }

  fn candidates(
    &self,
    catalog: &PatternCatalog,
    level: u32,
    skip_recent: bool,
  ) -> Vec<(PatternId, u32)> {
    catalog
      .iter()
      .filter(|(_, p)| p.is_usable() && p.min_difficulty <= level)
      .filter(|(id, _)| !skip_recent || !self.history.contains(*id))
      .map(|(id, p)| (id, p.weight))
      .collect()
  }
}

/// Draws one candidate with probability proportional to its weight.
///
/// Candidates are walked in order; the first whose cumulative weight exceeds
/// the draw wins.
fn weighted_pick<R: Rng>(candidates: &[(PatternId, u32)], rng: &mut R) -> PatternId {
  let total: u64 = candidates.iter().map(|&(_, w)| u64::from(w)).sum();
  let draw = rng.random_range(0..total);

  let mut cumulative = 0u64;
  for &(id, weight) in candidates {
    cumulative += u64::from(weight);
    if draw < cumulative {
      return id;
    }
  }

  candidates[candidates.len() - 1].0
}
