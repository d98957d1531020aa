//! Gizmo overlay for the floor: recycle/spawn lines and chunk extents.

use bevy::prelude::*;

use crate::floor::ChunkStreamer;

const LINE_HEIGHT: f32 = 20.0;
const CHUNK_HEIGHT: f32 = 2.0;

/// Draws the streamer state with gizmos. Requires the gizmo plugin.
pub struct FloorDebugPlugin;

impl Plugin for FloorDebugPlugin {
  fn build(&self, app: &mut App) {
    app.add_systems(Update, draw_floor_gizmos);
  }
}

fn draw_floor_gizmos(mut gizmos: Gizmos, streamer: Option<Res<ChunkStreamer>>) {
  let Some(streamer) = streamer else {
    return;
  };
  let settings = streamer.settings();
  let bounds = streamer.bounds();
  let y = settings.spawn_y;

  // Recycle line (red) and spawn line (green)
  gizmos.line_2d(
    Vec2::new(bounds.left, y - LINE_HEIGHT),
    Vec2::new(bounds.left, y + LINE_HEIGHT),
    Color::srgb(1.0, 0.2, 0.2),
  );
  gizmos.line_2d(
    Vec2::new(bounds.right, y - LINE_HEIGHT),
    Vec2::new(bounds.right, y + LINE_HEIGHT),
    Color::srgb(0.2, 1.0, 0.2),
  );

  for chunk in streamer.window() {
    let color = if chunk.forced {
      Color::srgb(1.0, 1.0, 0.0)
    } else {
      Color::srgb(0.3, 0.6, 1.0)
    };
    let min = Vec2::new(chunk.x, y - CHUNK_HEIGHT);
    let max = Vec2::new(chunk.x + settings.chunk_width, y + CHUNK_HEIGHT);
    gizmos.line_2d(min, Vec2::new(max.x, min.y), color);
    gizmos.line_2d(Vec2::new(max.x, min.y), max, color);
    gizmos.line_2d(max, Vec2::new(min.x, max.y), color);
    gizmos.line_2d(Vec2::new(min.x, max.y), min, color);
  }
}
