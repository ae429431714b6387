//! Error types for every negotiation stage.
//!
//! Each stage reports exactly one kind on failure. Variants that wrap a failed
//! platform call carry the raw [`vk::Result`] for diagnostics.

use ash::vk;
use thiserror::Error;

/// Instance creation errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceError {
    /// The Vulkan loader library could not be opened.
    #[error("Vulkan loader unavailable")]
    VulkanUnavailable,

    /// The required API version is not available.
    #[error("Required Vulkan version unavailable")]
    VulkanVersionUnavailable,

    /// Vulkan 1.1 was required but is not available.
    #[error("Vulkan 1.1 unavailable")]
    VulkanVersion11Unavailable,

    /// Vulkan 1.2 or newer was required but is not available.
    #[error("Vulkan 1.2 unavailable")]
    VulkanVersion12Unavailable,

    /// The debug messenger could not be created.
    #[error("Failed to create debug messenger: {0}")]
    FailedCreateDebugMessenger(vk::Result),

    /// `vkCreateInstance` failed.
    #[error("Failed to create instance: {0}")]
    FailedCreateInstance(vk::Result),

    /// A requested layer is not present.
    #[error("Requested layers not present")]
    RequestedLayersNotPresent,

    /// A requested extension is not present.
    #[error("Requested extensions not present")]
    RequestedExtensionsNotPresent,

    /// The surface extensions needed for presentation are not present.
    #[error("Windowing extensions not present")]
    WindowingExtensionsNotPresent,
}

impl InstanceError {
    /// Snake-case name of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VulkanUnavailable => "vulkan_unavailable",
            Self::VulkanVersionUnavailable => "vulkan_version_unavailable",
            Self::VulkanVersion11Unavailable => "vulkan_version_1_1_unavailable",
            Self::VulkanVersion12Unavailable => "vulkan_version_1_2_unavailable",
            Self::FailedCreateDebugMessenger(_) => "failed_create_debug_messenger",
            Self::FailedCreateInstance(_) => "failed_create_instance",
            Self::RequestedLayersNotPresent => "requested_layers_not_present",
            Self::RequestedExtensionsNotPresent => "requested_extensions_not_present",
            Self::WindowingExtensionsNotPresent => "windowing_extensions_not_present",
        }
    }

    /// The platform status that caused this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match *self {
            Self::FailedCreateDebugMessenger(r) | Self::FailedCreateInstance(r) => Some(r),
            _ => None,
        }
    }
}

/// Physical device selection errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalDeviceError {
    /// Presentation is needed but no surface was given.
    #[error("No surface provided")]
    NoSurfaceProvided,

    /// `vkEnumeratePhysicalDevices` failed.
    #[error("Failed to enumerate physical devices: {0}")]
    FailedEnumeratePhysicalDevices(vk::Result),

    /// The instance exposes no physical devices.
    #[error("No physical devices found")]
    NoPhysicalDevicesFound,

    /// No physical device satisfied the required criteria.
    #[error("No suitable device")]
    NoSuitableDevice,
}

impl PhysicalDeviceError {
    /// Snake-case name of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSurfaceProvided => "no_surface_provided",
            Self::FailedEnumeratePhysicalDevices(_) => "failed_enumerate_physical_devices",
            Self::NoPhysicalDevicesFound => "no_physical_devices_found",
            Self::NoSuitableDevice => "no_suitable_device",
        }
    }

    /// The platform status that caused this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match *self {
            Self::FailedEnumeratePhysicalDevices(r) => Some(r),
            _ => None,
        }
    }
}

/// Queue lookup errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Present queue unavailable")]
    PresentUnavailable,
    #[error("Graphics queue unavailable")]
    GraphicsUnavailable,
    #[error("Compute queue unavailable")]
    ComputeUnavailable,
    #[error("Transfer queue unavailable")]
    TransferUnavailable,
    #[error("Queue index out of range")]
    QueueIndexOutOfRange,
    #[error("Invalid queue family index")]
    InvalidQueueFamilyIndex,
}

impl QueueError {
    /// Snake-case name of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PresentUnavailable => "present_unavailable",
            Self::GraphicsUnavailable => "graphics_unavailable",
            Self::ComputeUnavailable => "compute_unavailable",
            Self::TransferUnavailable => "transfer_unavailable",
            Self::QueueIndexOutOfRange => "queue_index_out_of_range",
            Self::InvalidQueueFamilyIndex => "invalid_queue_family_index",
        }
    }
}

/// Logical device errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// `vkCreateDevice` failed.
    #[error("Failed to create device: {0}")]
    FailedCreateDevice(vk::Result),
}

impl DeviceError {
    /// Snake-case name of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailedCreateDevice(_) => "failed_create_device",
        }
    }

    /// The platform status that caused this error.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match *self {
            Self::FailedCreateDevice(r) => Some(r),
        }
    }
}

/// Swapchain errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainError {
    /// No surface was given to the builder.
    #[error("Surface handle not provided")]
    SurfaceHandleNotProvided,

    /// Querying surface capabilities, formats, or present modes failed.
    #[error("Failed to query surface support details: {0}")]
    FailedQuerySurfaceSupportDetails(vk::Result),

    /// `vkCreateSwapchainKHR` failed.
    #[error("Failed to create swapchain: {0}")]
    FailedCreateSwapchain(vk::Result),

    /// `vkGetSwapchainImagesKHR` failed.
    #[error("Failed to get swapchain images: {0}")]
    FailedGetSwapchainImages(vk::Result),

    /// Creating one of the image views failed.
    #[error("Failed to create swapchain image views: {0}")]
    FailedCreateSwapchainImageViews(vk::Result),

    /// The graphics or present queue family could not be resolved.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SwapchainError {
    /// Snake-case name of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SurfaceHandleNotProvided => "surface_handle_not_provided",
            Self::FailedQuerySurfaceSupportDetails(_) => "failed_query_surface_support_details",
            Self::FailedCreateSwapchain(_) => "failed_create_swapchain",
            Self::FailedGetSwapchainImages(_) => "failed_get_swapchain_images",
            Self::FailedCreateSwapchainImageViews(_) => "failed_create_swapchain_image_views",
            Self::Queue(e) => e.as_str(),
        }
    }

    /// The platform status that caused this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match *self {
            Self::FailedQuerySurfaceSupportDetails(r)
            | Self::FailedCreateSwapchain(r)
            | Self::FailedGetSwapchainImages(r)
            | Self::FailedCreateSwapchainImageViews(r) => Some(r),
            Self::SurfaceHandleNotProvided | Self::Queue(_) => None,
        }
    }
}

/// Any error produced by this crate.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    PhysicalDevice(#[from] PhysicalDeviceError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Swapchain(#[from] SwapchainError),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),
}

impl GpuError {
    /// The platform status that caused this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Instance(e) => e.vk_result(),
            Self::PhysicalDevice(e) => e.vk_result(),
            Self::Device(e) => e.vk_result(),
            Self::Swapchain(e) => e.vk_result(),
            Self::Queue(_) | Self::SurfaceCreation(_) => None,
        }
    }
}

/// Result type alias.
pub type Result<T, E = GpuError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_taxonomy() {
        assert_eq!(InstanceError::VulkanUnavailable.as_str(), "vulkan_unavailable");
        assert_eq!(
            PhysicalDeviceError::NoSuitableDevice.as_str(),
            "no_suitable_device"
        );
        assert_eq!(
            SwapchainError::FailedCreateSwapchainImageViews(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
                .as_str(),
            "failed_create_swapchain_image_views"
        );
    }

    #[test]
    fn status_is_carried_through_umbrella() {
        let err: GpuError =
            DeviceError::FailedCreateDevice(vk::Result::ERROR_INITIALIZATION_FAILED).into();
        assert_eq!(
            err.vk_result(),
            Some(vk::Result::ERROR_INITIALIZATION_FAILED)
        );

        let err: GpuError = PhysicalDeviceError::NoSurfaceProvided.into();
        assert_eq!(err.vk_result(), None);
    }
}
