use bevy::{asset::AssetEvent, ecs::message::MessageReader, prelude::*};
use bevy_common_assets::toml::TomlAssetPlugin;

use super::{FloorConfig, FloorSettings};

/// Handle to the floor config asset, watched for hot reload.
#[derive(Resource)]
pub struct FloorConfigHandle(pub Handle<FloorConfig>);

/// Loads `FloorSettings` from the assets directory and keeps them in sync
/// with the file on disk.
///
/// Needs `AssetPlugin`. A `FloorSettings` inserted before startup wins over
/// the file.
pub struct FloorConfigPlugin {
  /// Path relative to the assets directory.
  pub asset_path: String,
}

impl Default for FloorConfigPlugin {
  fn default() -> Self {
    Self {
      asset_path: "config/floor.config.toml".to_string(),
    }
  }
}

#[derive(Resource, Clone)]
struct FloorConfigPath(String);

impl Plugin for FloorConfigPlugin {
  fn build(&self, app: &mut App) {
    app
      .insert_resource(FloorConfigPath(self.asset_path.clone()))
      .add_plugins(TomlAssetPlugin::<FloorConfig>::new(&["floor.config.toml"]))
      .add_systems(PreStartup, load_config_sync)
      .add_systems(Update, watch_config_changes);
  }
}

fn load_config_sync(
  mut commands: Commands,
  asset_server: Res<AssetServer>,
  path: Res<FloorConfigPath>,
  existing: Option<Res<FloorSettings>>,
) {
  let handle: Handle<FloorConfig> = asset_server.load(path.0.clone());
  commands.insert_resource(FloorConfigHandle(handle));

  if existing.is_some() {
    return;
  }

  let file = format!("assets/{}", path.0);
  let config = match FloorConfig::load(&file) {
    Ok(config) => config,
    Err(err) => {
      error!("Failed to load floor config '{}': {}", file, err);
      FloorConfig::default()
    }
  };
  commands.insert_resource(FloorSettings::new(config));
}

fn watch_config_changes(
  mut commands: Commands,
  config_handle: Res<FloorConfigHandle>,
  mut messages: MessageReader<AssetEvent<FloorConfig>>,
  configs: Res<Assets<FloorConfig>>,
) {
  for event in messages.read() {
    if let AssetEvent::Modified { id } = event {
      if config_handle.0.id() == *id {
        if let Some(config) = configs.get(&config_handle.0) {
          info!("Floor config reloaded");
          commands.insert_resource(FloorSettings::new(config.clone()));
        }
      }
    }
  }
}
