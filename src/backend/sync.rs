// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// FrameSync: one set per frame in flight.
// ImageSync: one render-finished semaphore per swapchain image. Present has no
// fence, so a semaphore it waits on is only known to be free again once the
// same image has been acquired a second time.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        // Null handles are ignored by the destroy calls, so a half-built set
        // can go through destroy() unchanged.
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
        };

        if let Err(e) = sync.create_handles(&device.device) {
            sync.destroy(&device.device);
            return Err(e).context("Failed to create frame sync objects");
        }

        Ok(sync)
    }

    fn create_handles(&mut self, device: &ash::Device) -> VkResult<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default()
            .flags(vk::FenceCreateFlags::SIGNALED); // First wait must not block

        unsafe {
            self.image_available = device.create_semaphore(&semaphore_info, None)?;
            self.in_flight_fence = device.create_fence(&fence_info, None)?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Render-finished semaphores indexed by swapchain image.
#[derive(Default)]
pub struct ImageSync {
    render_finished: Vec<vk::Semaphore>,
}

impl ImageSync {
    pub fn new(device: &VulkanDevice, image_count: usize) -> Result<Self> {
        let mut sync = Self {
            render_finished: Vec::with_capacity(image_count),
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..image_count {
            match unsafe { device.device.create_semaphore(&semaphore_info, None) } {
                Ok(semaphore) => sync.render_finished.push(semaphore),
                Err(e) => {
                    sync.destroy(&device.device);
                    return Err(e).context("Failed to create image sync objects");
                }
            }
        }

        Ok(sync)
    }

    /// Semaphore signalled when rendering into `image_index` is done and
    /// waited on by its present.
    pub fn render_finished(&self, image_index: u32) -> Option<vk::Semaphore> {
        self.render_finished.get(image_index as usize).copied()
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for semaphore in self.render_finished.drain(..) {
            unsafe { device.destroy_semaphore(semaphore, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image_sync(image_count: u64) -> ImageSync {
        ImageSync {
            render_finished: (1..=image_count).map(vk::Semaphore::from_raw).collect(),
        }
    }

    #[test]
    fn each_image_has_its_own_semaphore() {
        let sync = image_sync(3);
        let semaphores: Vec<_> = (0..3).map(|i| sync.render_finished(i).unwrap()).collect();

        assert_ne!(semaphores[0], semaphores[1]);
        assert_ne!(semaphores[1], semaphores[2]);
        assert_ne!(semaphores[0], semaphores[2]);
        assert!(sync.render_finished(3).is_none());
    }

    #[test]
    fn reused_frame_slot_signals_a_different_semaphore() {
        // 3 images, 2 frames in flight, images handed out in turn
        let sync = image_sync(3);
        let frames_in_flight = 2;

        let mut last_signal_by_slot: Vec<Option<vk::Semaphore>> = vec![None; frames_in_flight];
        for frame in 0..12u32 {
            let slot = frame as usize % frames_in_flight;
            let image_index = frame % 3;
            let signal = sync.render_finished(image_index).unwrap();

            // Before the same image comes back, its semaphore is never signalled again
            for earlier in frame.saturating_sub(2)..frame {
                assert_ne!(sync.render_finished(earlier % 3), Some(signal));
            }
            if let Some(previous) = last_signal_by_slot[slot] {
                assert_ne!(previous, signal);
            }
            last_signal_by_slot[slot] = Some(signal);
        }
    }

    #[test]
    fn empty_set_has_no_semaphores() {
        assert!(ImageSync::default().render_finished(0).is_none());
    }
}
