// =============================================================================
// ENGINE - startup, render loop, shutdown
// =============================================================================
//
// STARTUP (once, when winit resumes):
//   graphics subsystem -> window -> shader program -> triangle upload
//
// EVERY FRAME:
//   begin frame (clear) -> bind shader program -> draw triangle -> end frame (present)
//
// SHUTDOWN:
//   triangle -> shader program -> window -> graphics subsystem
//
// Startup may fail at any step. Whatever was created is still released by
// destroy(), and always before the graphics subsystem.
// =============================================================================

use anyhow::{Context, Result};
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowId;

use crate::backend::{ShaderStage, VulkanDevice};
use crate::config::Config;
use crate::geometry::{Mesh, TRIANGLE};
use crate::shader_program::{ShaderProgram, DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};
use crate::window::RenderWindow;

pub struct Engine {
    config: Config,

    // Released top to bottom; the device always last
    mesh: Option<Mesh>,
    shader_program: Option<ShaderProgram>,
    window: Option<RenderWindow>,
    device: Option<Arc<VulkanDevice>>,

    started: bool,
    /// First fatal error, reported by main once the loop has exited
    error: Option<anyhow::Error>,
    stats: FrameStats,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            mesh: None,
            shader_program: None,
            window: None,
            device: None,
            started: false,
            error: None,
            stats: FrameStats::default(),
        }
    }

    /// Bring up the graphics subsystem, the window and the shader program.
    ///
    /// On error, whatever was created so far stays in place for `destroy`.
    pub fn create(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let settings = self.config.window_settings();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Graphics subsystem
        // ─────────────────────────────────────────────────────────────────────
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let display = event_loop
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let device = VulkanDevice::new(&settings.title, display, enable_validation)
            .context("Failed to initialize render system")?;
        self.device = Some(device.clone());

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Window
        // ─────────────────────────────────────────────────────────────────────
        let window = RenderWindow::create(
            event_loop,
            device.clone(),
            &settings,
            self.config.present_mode(),
            self.config.frames_in_flight(),
        )
        .context("Failed to create window")?;
        let render_pass = window.render_pass();
        self.window = Some(window);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Shader program
        // ─────────────────────────────────────────────────────────────────────
        let program = self.shader_program.insert(ShaderProgram::new(device));
        program
            .load_shader(DEFAULT_VERTEX_SHADER, ShaderStage::Vertex)
            .and_then(|_| program.load_shader(DEFAULT_FRAGMENT_SHADER, ShaderStage::Fragment))
            .and_then(|_| program.link(render_pass))
            .context("Failed to create shader program")?;

        log::info!("Engine created");
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.device.is_some()
            && self.window.is_some()
            && self.shader_program.as_ref().is_some_and(ShaderProgram::is_linked)
    }

    /// Upload the static triangle.
    pub fn upload_geometry(&mut self) -> Result<()> {
        let device = self.device.clone().context("Engine not created")?;
        let mesh = Mesh::upload(device, &TRIANGLE).context("Failed to upload geometry")?;
        self.mesh = Some(mesh);
        Ok(())
    }

    /// Draw one frame. Returns whether an image was presented.
    pub fn render_frame(&mut self) -> Result<bool> {
        let (Some(window), Some(program), Some(mesh)) = (
            self.window.as_mut(),
            self.shader_program.as_ref(),
            self.mesh.as_ref(),
        ) else {
            anyhow::bail!("Engine not created");
        };

        let Some(frame) = window.begin_frame()? else {
            return Ok(false);
        };

        program.bind(frame.cmd)?;
        mesh.draw(frame.cmd)?;

        window.end_frame(frame)?;
        Ok(true)
    }

    /// Take the first fatal error seen while running, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        if let Some(window) = self.window.as_mut() {
            window.request_close();
        }
        event_loop.exit();
    }

    /// Release everything in reverse order of creation. Safe to call on an
    /// engine that was never (or only partly) created, and safe to call twice.
    pub fn destroy(&mut self) {
        if self.device.is_none() {
            return;
        }
        log::info!("Destroying engine...");

        if let Some(device) = &self.device {
            let _ = device.wait_idle();
        }

        if let Some(mut mesh) = self.mesh.take() {
            mesh.destroy();
        }
        if let Some(mut program) = self.shader_program.take() {
            program.destroy();
        }
        if let Some(mut window) = self.window.take() {
            window.destroy();
        }

        // Last reference: the graphics subsystem goes down here
        drop(self.device.take());

        if let Some((frames, fps)) = self.stats.summary(Instant::now()) {
            log::info!("Rendered {} frames, {:.1} FPS average", frames, fps);
        }
        log::info!("Engine destroyed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.destroy();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for Engine {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only the first resume starts the engine
        if self.started {
            return;
        }
        self.started = true;

        if let Err(e) = self.create(event_loop).and_then(|_| self.upload_geometry()) {
            self.fail(event_loop, e.context("Engine startup failed"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(window) = self.window.as_mut() {
                    window.request_close();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resized(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                let closing = self.window.as_ref().map_or(true, RenderWindow::is_closing);
                if closing || !self.is_created() {
                    return;
                }

                match self.render_frame() {
                    Ok(true) => {
                        if let Some(fps) = self.stats.record(Instant::now()) {
                            log::debug!("{:.0} FPS", fps);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => self.fail(event_loop, e.context("Render error")),
                }
            }

            _ => {}
        }
    }

    /// Keep the loop spinning: one redraw per pass until closing.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            if wants_redraw(window.is_closing(), window.is_minimized()) {
                window.request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.destroy();
    }
}

/// A minimised window idles until a `Resized` event brings it back.
fn wants_redraw(closing: bool, minimized: bool) -> bool {
    !closing && !minimized
}

// =============================================================================
// FRAME STATISTICS
// =============================================================================

const FPS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct FrameStats {
    first_frame: Option<Instant>,
    total_frames: u64,
    interval_start: Option<Instant>,
    interval_frames: u32,
}

impl FrameStats {
    /// Count a presented frame. Returns the frame rate once per interval.
    fn record(&mut self, now: Instant) -> Option<f64> {
        self.first_frame.get_or_insert(now);
        let interval_start = *self.interval_start.get_or_insert(now);

        self.total_frames += 1;
        self.interval_frames += 1;

        let elapsed = now.duration_since(interval_start);
        if elapsed < FPS_INTERVAL {
            return None;
        }

        let fps = self.interval_frames as f64 / elapsed.as_secs_f64();
        self.interval_start = Some(now);
        self.interval_frames = 0;
        Some(fps)
    }

    /// Total frames and average frame rate since the first frame.
    fn summary(&self, now: Instant) -> Option<(u64, f64)> {
        let first = self.first_frame?;
        let elapsed = now.duration_since(first).as_secs_f64();
        if elapsed <= 0.0 {
            return Some((self.total_frames, 0.0));
        }
        Some((self.total_frames, self.total_frames as f64 / elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_is_not_created() {
        let engine = Engine::new(Config::default());
        assert!(!engine.is_created());
    }

    #[test]
    fn destroy_without_create_is_a_no_op() {
        let mut engine = Engine::new(Config::default());
        engine.destroy();
        engine.destroy();
        assert!(!engine.is_created());
        assert!(engine.take_error().is_none());
    }

    #[test]
    fn rendering_before_create_is_an_error() {
        let mut engine = Engine::new(Config::default());
        let err = engine.render_frame().unwrap_err();
        assert!(err.to_string().contains("not created"));
    }

    #[test]
    fn geometry_needs_a_device() {
        let mut engine = Engine::new(Config::default());
        assert!(engine.upload_geometry().is_err());
    }

    #[test]
    fn no_redraw_while_minimized_or_closing() {
        assert!(wants_redraw(false, false));
        assert!(!wants_redraw(false, true));
        assert!(!wants_redraw(true, false));
        assert!(!wants_redraw(true, true));
    }

    #[test]
    fn fps_is_reported_once_per_interval() {
        let mut stats = FrameStats::default();
        let start = Instant::now();

        assert_eq!(stats.record(start), None);
        for i in 1..60 {
            assert_eq!(stats.record(start + Duration::from_millis(i * 16)), None);
        }

        let fps = stats.record(start + Duration::from_secs(1)).unwrap();
        assert!((fps - 61.0).abs() < 0.01, "fps was {fps}");

        // New interval starts from the report
        assert_eq!(stats.record(start + Duration::from_millis(1500)), None);
    }

    #[test]
    fn summary_averages_over_the_whole_run() {
        let mut stats = FrameStats::default();
        assert!(stats.summary(Instant::now()).is_none());

        let start = Instant::now();
        for i in 0..100 {
            stats.record(start + Duration::from_millis(i * 20));
        }

        let (frames, fps) = stats.summary(start + Duration::from_secs(2)).unwrap();
        assert_eq!(frames, 100);
        assert!((fps - 50.0).abs() < 0.01);
    }
}
