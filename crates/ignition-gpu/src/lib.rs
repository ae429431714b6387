//! Vulkan capability negotiation.
//!
//! This crate provides:
//! - A process-wide loader cache for Vulkan entry points
//! - Instance creation with validation layers and a debug messenger
//! - Physical device selection against declarative criteria
//! - Logical device creation and queue lookup
//! - Swapchain format, present mode and extent negotiation

pub mod capabilities;
pub mod debug;
pub mod device;
pub mod error;
pub mod features;
pub mod instance;
pub mod loader;
pub mod queue;
pub mod selector;
pub mod surface;
pub mod swapchain;
pub mod system;

pub use capabilities::{CandidateDeviceDescription, GpuVendor};
pub use device::{CustomQueueDescription, Device, DeviceBuilder, FeatureBlock};
pub use error::{
    DeviceError, GpuError, InstanceError, PhysicalDeviceError, QueueError, Result,
    SwapchainError,
};
pub use instance::{Instance, InstanceBuilder};
pub use queue::QueueType;
pub use selector::{PhysicalDeviceSelection, PhysicalDeviceSelector, SelectionCriteria, Suitability};
pub use surface::SurfaceSupportDetails;
pub use swapchain::{Swapchain, SwapchainBuilder};
pub use system::SystemCapabilities;
