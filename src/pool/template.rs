//! Spawnable templates.
//!
//! A [`Template`] is the identity of a class of reusable entity. The pool keys
//! its entries on [`TemplateId`]; the [`TemplateLibrary`] maps authored names
//! to templates so configuration can refer to them by string.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bevy::prelude::*;

/// Builds the components of a reusable entity.
///
/// Implemented for any `Fn(&mut EntityWorldMut)` closure, so most templates
/// are a single closure inserting a bundle.
pub trait Spawnable: Send + Sync + 'static {
  /// Inserts the template's components into a freshly spawned entity.
  fn spawn(&self, entity: &mut EntityWorldMut);

  /// Called every time a pooled instance is handed out again.
  ///
  /// Use this to restore state that gameplay mutated during the previous
  /// activation (collected pickups, damaged children, ...).
  fn on_reuse(&self, _entity: &mut EntityWorldMut) {}
}

impl<F> Spawnable for F
where
  F: Fn(&mut EntityWorldMut) + Send + Sync + 'static,
{
  fn spawn(&self, entity: &mut EntityWorldMut) {
    self(entity);
  }
}

/// Stable identity of a registered template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(pub u32);

/// A registered, immutable spawnable template.
#[derive(Clone)]
pub struct Template {
  id: TemplateId,
  name: Arc<str>,
  spawnable: Arc<dyn Spawnable>,
}

impl Template {
  pub fn id(&self) -> TemplateId {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Spawns a bare instance of this template, not tracked by any pool.
  pub fn instantiate(
    &self,
    world: &mut World,
    transform: Transform,
    parent: Option<Entity>,
  ) -> Entity {
    let mut entity = world.spawn((Name::new(self.name.to_string()), transform));
    if let Some(parent) = parent {
      entity.insert(ChildOf(parent));
    }
    self.spawnable.spawn(&mut entity);
    entity.id()
  }

  pub(crate) fn build(&self, entity: &mut EntityWorldMut) {
    self.spawnable.spawn(entity);
  }

  pub(crate) fn reuse(&self, entity: &mut EntityWorldMut) {
    self.spawnable.on_reuse(entity);
  }
}

impl fmt::Debug for Template {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Template")
      .field("id", &self.id)
      .field("name", &self.name)
      .finish()
  }
}

impl PartialEq for Template {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for Template {}

/// Name-indexed registry of every template known to the game.
#[derive(Resource, Default)]
pub struct TemplateLibrary {
  by_name: HashMap<String, Template>,
  next_id: u32,
}

impl TemplateLibrary {
  /// Registers a template under `name`.
  ///
  /// Templates are immutable once registered: registering an existing name
  /// again returns the original template and ignores `spawnable`.
  pub fn register(&mut self, name: impl Into<String>, spawnable: impl Spawnable) -> Template {
    let name = name.into();
    if let Some(existing) = self.by_name.get(&name) {
      warn!("Template '{}' already registered, keeping original", name);
      return existing.clone();
    }

    let template = Template {
      id: TemplateId(self.next_id),
      name: Arc::from(name.as_str()),
      spawnable: Arc::new(spawnable),
    };
    self.next_id += 1;
    self.by_name.insert(name, template.clone());
    template
  }

  pub fn get(&self, name: &str) -> Option<&Template> {
    self.by_name.get(name)
  }

  pub fn by_id(&self, id: TemplateId) -> Option<&Template> {
    self.by_name.values().find(|t| t.id == id)
  }

  pub fn len(&self) -> usize {
    self.by_name.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_name.is_empty()
  }
}
