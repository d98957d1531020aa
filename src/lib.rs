//! Endless 2D floor streaming on Bevy.
//!
//! - [`pool`]: generic entity pooling keyed by [`pool::Template`].
//! - [`floor`]: the chunk streamer, its pattern selector and difficulty clock.
//! - [`speed`]: the shared scroll speed the floor reads every tick.
//! - [`config`]: TOML configuration with hot reload.
//!
//! Add [`FloorPlugin`], register chunk templates in the
//! [`pool::TemplateLibrary`] during `Startup`, and provide a
//! [`config::FloorSettings`] (directly or through
//! [`config::FloorConfigPlugin`]).

pub mod config;
pub mod floor;
pub mod pool;
pub mod speed;
#[cfg(feature = "visual_debug")]
pub mod visual_debug;

use bevy::prelude::*;

use crate::floor::{
  StreamingViewport, advance_floor, apply_floor_settings, start_floor, update_streaming_viewport,
};
use crate::pool::{PoolRegistry, TemplateLibrary, expire_pooled_lifetimes};
use crate::speed::{ScrollSpeed, tick_scroll_speed};

pub mod prelude {
  pub use crate::FloorPlugin;
  pub use crate::config::{FloorConfig, FloorConfigPlugin, FloorSettings};
  pub use crate::floor::{
    ChunkStreamer, FloorChunk, FloorError, ForceSpawnPattern, PatternId, ResetFloor, SetPaused,
    SetSpeedMultiplier, StreamingCamera, StreamingViewport, ViewportEdges,
  };
  pub use crate::pool::{
    InitializePool, PoolRegistry, PooledLifetime, ReturnAllToPool, ReturnToPool, Spawnable,
    Template, TemplateLibrary,
  };
  pub use crate::speed::ScrollSpeed;
}

/// Pooling, scroll speed and floor streaming.
///
/// The streamer is built in `PostStartup` from whatever `FloorSettings` and
/// templates exist by then.
pub struct FloorPlugin;

impl Plugin for FloorPlugin {
  fn build(&self, app: &mut App) {
    app
      .init_resource::<PoolRegistry>()
      .init_resource::<TemplateLibrary>()
      .init_resource::<ScrollSpeed>()
      .init_resource::<StreamingViewport>()
      .add_systems(PostStartup, start_floor)
      .add_systems(PreUpdate, (update_streaming_viewport, tick_scroll_speed))
      .add_systems(
        Update,
        (apply_floor_settings, advance_floor, expire_pooled_lifetimes).chain(),
      );
  }
}
