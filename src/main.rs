// =============================================================================
// BIG ENGINE - minimal Vulkan bootstrap
// =============================================================================
//
// Opens a window and draws one coloured triangle every frame until the window
// is closed.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Engine (winit ApplicationHandler)                              │
// │    ├── VulkanDevice      instance, GPU, queue, allocator        │
// │    ├── RenderWindow      surface, swapchain, frames in flight   │
// │    ├── ShaderProgram     GLSL pair -> graphics pipeline         │
// │    └── Mesh              the triangle's vertex buffer           │
// └─────────────────────────────────────────────────────────────────┘
//
// LIFETIME:
//   logging -> engine (device -> window -> shader -> triangle) -> loop
//   -> engine teardown (reverse) -> logging
//
// =============================================================================

mod backend;
mod config;
mod engine;
mod geometry;
mod logging;
mod shader_program;
mod window;

use anyhow::{Context, Result};
use config::{Config, CONFIG_PATH};
use engine::Engine;
use winit::event_loop::EventLoop;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, config_error) = Config::load();

    // Logging first; nothing else starts without it
    let _log_guard = logging::init(&config.debug)?;

    if let Some(e) = config_error {
        log::warn!("Ignoring {}: {:#}", CONFIG_PATH, e);
    }
    log::debug!("Config: {:?}", config);

    log::info!("Starting {}", config.window.title);
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut engine = Engine::new(config);

    let result = event_loop
        .run_app(&mut engine)
        .context("Event loop failed");

    // Already done on a clean exit, needed when the loop bailed out
    engine.destroy();

    result?;
    if let Some(e) = engine.take_error() {
        return Err(e);
    }

    log::info!("Shutdown complete");
    Ok(())
}
