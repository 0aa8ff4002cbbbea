// Render window - the OS window plus everything needed to present into it
//
// Owns: winit window, Vulkan surface, swapchain, render pass + framebuffers,
// one command buffer and one set of sync objects per frame in flight, and one
// render-finished semaphore per swapchain image.
//
// FRAME:
//   begin_frame  wait fence -> acquire image -> begin commands -> begin render pass (clear)
//   ...caller binds a shader program and draws...
//   end_frame    end render pass -> submit -> present -> next frame slot

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::backend::pipeline::{self, full_scissor, full_viewport};
use crate::backend::swapchain::choose_surface_format;
use crate::backend::sync::{FrameSync, ImageSync};
use crate::backend::{Swapchain, VulkanDevice};
use crate::config::WindowSettings;

/// A frame that has been started and must be handed back to `end_frame`.
#[must_use]
pub struct Frame {
    pub cmd: vk::CommandBuffer,
    image_index: u32,
}

pub struct RenderWindow {
    window: Option<Arc<Window>>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain: Option<Swapchain>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    /// Lives and dies with the swapchain images
    image_sync: ImageSync,

    command_pool: vk::CommandPool,
    /// One per frame in flight, re-recorded every frame
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    current_frame: usize,

    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,

    /// Swapchain no longer matches the window
    needs_resize: bool,
    /// Zero-sized window, nothing to render into
    is_minimized: bool,
    closing: bool,

    device: Arc<VulkanDevice>,
}

impl RenderWindow {
    pub fn create(
        event_loop: &ActiveEventLoop,
        device: Arc<VulkanDevice>,
        settings: &WindowSettings,
        present_mode: vk::PresentModeKHR,
        frames_in_flight: usize,
    ) -> Result<Self> {
        log::info!(
            "Creating window '{}' ({}x{})",
            settings.title,
            settings.width,
            settings.height
        );

        let attributes = Window::default_attributes()
            .with_title(settings.title.as_str())
            .with_inner_size(PhysicalSize::new(settings.width, settings.height));

        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );

        let surface_loader = ash::khr::surface::Instance::new(&device.entry, &device.instance);

        let surface = unsafe {
            ash_window::create_surface(
                &device.entry,
                &device.instance,
                window
                    .display_handle()
                    .context("Failed to get display handle")?
                    .as_raw(),
                window
                    .window_handle()
                    .context("Failed to get window handle")?
                    .as_raw(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        // From here on, Drop releases whatever has been created
        let mut this = Self {
            window: Some(window),
            surface,
            surface_loader,
            swapchain: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            image_sync: ImageSync::default(),
            command_pool: vk::CommandPool::null(),
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            current_frame: 0,
            clear_color: settings.clear_color,
            present_mode,
            needs_resize: false,
            is_minimized: false,
            closing: false,
            device,
        };

        this.init_presentation(frames_in_flight)?;
        Ok(this)
    }

    fn init_presentation(&mut self, frames_in_flight: usize) -> Result<()> {
        let device = self.device.clone();

        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                self.surface,
            )
        }
        .context("Failed to query surface support")?;

        if !supported {
            anyhow::bail!("GPU can't present to this window");
        }

        // The render pass only depends on the surface format, which does not
        // change across swapchain recreation.
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(device.physical_device, self.surface)
        }
        .context("Failed to query surface formats")?;
        let format = choose_surface_format(&formats).context("No suitable surface format")?;
        self.render_pass = pipeline::create_render_pass(&device, format.format)?;

        self.create_swapchain_resources()?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        self.command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);

        self.command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        for _ in 0..frames_in_flight {
            self.frame_sync.push(FrameSync::new(&device)?);
        }

        log::info!("Window ready, {} frames in flight", frames_in_flight);
        Ok(())
    }

    /// (Re)create swapchain and framebuffers for the current window size.
    ///
    /// A zero-sized window leaves the window minimized with no swapchain.
    fn create_swapchain_resources(&mut self) -> Result<()> {
        let size = self
            .window
            .as_ref()
            .context("Window already destroyed")?
            .inner_size();

        pipeline::destroy_framebuffers(&self.device, &mut self.framebuffers);
        self.image_sync.destroy(&self.device.device);
        // The surface can only have one swapchain at a time
        self.swapchain = None;

        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        let swapchain = Swapchain::new(
            self.device.clone(),
            self.surface,
            &self.surface_loader,
            size.width,
            size.height,
            self.present_mode,
        )?;

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;
        self.image_sync = ImageSync::new(&self.device, swapchain.image_views.len())?;

        self.swapchain = Some(swapchain);
        self.needs_resize = false;
        Ok(())
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        // Nothing may still be using the old images
        self.device.wait_idle()?;
        self.create_swapchain_resources()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Start a frame: clear the next swapchain image and leave a render pass
    /// open for drawing.
    ///
    /// `None` means there is nothing to draw into this time (minimized, or the
    /// swapchain went out of date and will be rebuilt next frame).
    pub fn begin_frame(&mut self) -> Result<Option<Frame>> {
        if self.needs_resize && !self.is_minimized {
            self.recreate_swapchain()?;
        }
        if self.is_minimized {
            return Ok(None);
        }

        let device = &self.device.device;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let sync = &self.frame_sync[self.current_frame];

        // Wait until the GPU is done with this frame slot
        unsafe { device.wait_for_fences(&[sync.in_flight_fence], true, u64::MAX) }
            .context("Failed to wait for frame fence")?;

        let image_index = match swapchain.acquire_next_image(u64::MAX, sync.image_available)? {
            Some((index, suboptimal)) => {
                if suboptimal {
                    self.needs_resize = true;
                }
                index
            }
            None => {
                self.needs_resize = true;
                return Ok(None);
            }
        };

        // Only reset once we know work will be submitted with this fence
        unsafe { device.reset_fences(&[sync.in_flight_fence]) }
            .context("Failed to reset frame fence")?;

        let cmd = self.command_buffers[self.current_frame];
        let framebuffer = self.framebuffers[image_index as usize];
        let extent = swapchain.extent;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(extent)]);
        }

        Ok(Some(Frame { cmd, image_index }))
    }

    /// Finish the frame started by `begin_frame` and present it.
    pub fn end_frame(&mut self, frame: Frame) -> Result<()> {
        let device = &self.device.device;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let sync = &self.frame_sync[self.current_frame];

        unsafe {
            device.cmd_end_render_pass(frame.cmd);
            device
                .end_command_buffer(frame.cmd)
                .context("Failed to end command buffer")?;
        }

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let render_finished = self
            .image_sync
            .render_finished(frame.image_index)
            .context("No render-finished semaphore for swapchain image")?;
        let signal_semaphores = [render_finished];
        let command_buffers = [frame.cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                sync.in_flight_fence,
            )
        }
        .context("Failed to submit frame")?;

        let needs_recreate = swapchain.present(
            self.device.graphics_queue,
            frame.image_index,
            &signal_semaphores,
        )?;
        if needs_recreate {
            self.needs_resize = true;
        }

        self.current_frame = (self.current_frame + 1) % self.frame_sync.len();
        Ok(())
    }

    /// Window size changed. Zero means minimized.
    pub fn resized(&mut self, width: u32, height: u32) {
        log::debug!("Window resized to {}x{}", width, height);

        if width == 0 || height == 0 {
            self.is_minimized = true;
        } else {
            self.is_minimized = false;
            self.needs_resize = true;
        }
    }

    pub fn is_minimized(&self) -> bool {
        self.is_minimized
    }

    pub fn request_close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    /// Release everything this window owns. Safe to call twice.
    pub fn destroy(&mut self) {
        if self.window.is_none() {
            return;
        }
        log::info!("Destroying window...");

        let _ = self.device.wait_idle();
        let device = &self.device.device;

        unsafe {
            for sync in self.frame_sync.drain(..) {
                sync.destroy(device);
            }

            // Also frees the command buffers
            device.destroy_command_pool(self.command_pool, None);
            self.command_pool = vk::CommandPool::null();
            self.command_buffers.clear();
        }

        pipeline::destroy_framebuffers(&self.device, &mut self.framebuffers);
        self.image_sync.destroy(device);

        unsafe {
            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }

        self.swapchain = None;

        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            self.surface = vk::SurfaceKHR::null();
        }

        // The OS window goes last, the surface referenced it
        self.window = None;
    }
}

impl Drop for RenderWindow {
    fn drop(&mut self) {
        self.destroy();
    }
}
