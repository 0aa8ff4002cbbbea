// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, explicit creation and destruction.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use device::VulkanDevice;
pub use shader::ShaderStage;
pub use swapchain::Swapchain;
