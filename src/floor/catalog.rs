//! Authored chunk patterns, resolved against the template library.

use bevy::prelude::*;

use crate::config::PatternConfig;
use crate::pool::{Template, TemplateLibrary};

/// Index of a pattern in its catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(pub usize);

/// A content descriptor for chunk generation.
#[derive(Clone, Debug)]
pub struct ChunkPattern {
  /// `None` when the authored template name did not resolve.
  pub template: Option<Template>,
  pub weight: u32,
  /// Lowest difficulty level at which the pattern may appear.
  pub min_difficulty: u32,
  pub label: String,
}

impl ChunkPattern {
  pub fn new(template: Template, weight: u32, min_difficulty: u32) -> Self {
    Self {
      label: template.name().to_string(),
      template: Some(template),
      weight,
      min_difficulty,
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = label.into();
    self
  }

  /// Whether the selector may ever pick this pattern.
  pub fn is_usable(&self) -> bool {
    self.template.is_some() && self.weight > 0
  }
}

/// Ordered pattern list. Catalog order breaks weighted-selection ties.
#[derive(Clone, Debug, Default)]
pub struct PatternCatalog {
  patterns: Vec<ChunkPattern>,
}

impl PatternCatalog {
  pub fn new(patterns: Vec<ChunkPattern>) -> Self {
    Self { patterns }
  }

  /// Builds a catalog from config, looking templates up by name.
  ///
  /// Unresolved names and zero weights are kept (so pattern ids match the
  /// authored order) but flagged unusable with a warning.
  pub fn resolve(configs: &[PatternConfig], library: &TemplateLibrary) -> Self {
    let patterns = configs
      .iter()
      .enumerate()
      .map(|(i, config)| {
        let template = library.get(&config.template).cloned();
        if template.is_none() {
          warn!(
            "Chunk pattern [{}] '{}' references unknown template '{}'",
            i, config.label, config.template
          );
        }
        if config.weight == 0 {
          warn!("Chunk pattern [{}] '{}' has zero weight", i, config.label);
        }
        ChunkPattern {
          template,
          weight: config.weight,
          min_difficulty: config.min_difficulty,
          label: config.label.clone(),
        }
      })
      .collect();
    Self { patterns }
  }

  pub fn get(&self, id: PatternId) -> Option<&ChunkPattern> {
    self.patterns.get(id.0)
  }

  pub fn iter(&self) -> impl Iterator<Item = (PatternId, &ChunkPattern)> {
    self
      .patterns
      .iter()
      .enumerate()
      .map(|(i, pattern)| (PatternId(i), pattern))
  }

  pub fn len(&self) -> usize {
    self.patterns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.patterns.is_empty()
  }

  pub fn has_usable(&self) -> bool {
    self.patterns.iter().any(ChunkPattern::is_usable)
  }

  /// Distinct templates of all usable patterns, in catalog order.
  pub fn usable_templates(&self) -> Vec<Template> {
    let mut templates: Vec<Template> = Vec::new();
    for pattern in self.patterns.iter().filter(|p| p.is_usable()) {
      if let Some(template) = &pattern.template {
        if !templates.contains(template) {
          templates.push(template.clone());
        }
      }
    }
    templates
  }
}
