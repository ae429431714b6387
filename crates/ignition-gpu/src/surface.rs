//! Surface creation for windowed rendering and surface support queries.

use crate::error::{GpuError, Result, SwapchainError};
use crate::instance::Instance;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Create a surface for a window.
///
/// # Safety
/// The instance must be valid and outlive the surface, and the window must
/// have valid handles.
pub unsafe fn create_surface<W>(instance: &Instance, window: &W) -> Result<vk::SurfaceKHR>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

    ash_window::create_surface(
        instance.entry(),
        instance.raw(),
        display.as_raw(),
        window_handle.as_raw(),
        instance.allocation_callbacks(),
    )
    .map_err(|e| GpuError::SurfaceCreation(e.to_string()))
}

/// Destroy a surface.
///
/// # Safety
/// No swapchain created for the surface may still exist.
pub unsafe fn destroy_surface(instance: &Instance, surface: vk::SurfaceKHR) {
    instance
        .surface_fn()
        .destroy_surface(surface, instance.allocation_callbacks());
}

/// What a surface supports on one physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupportDetails {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Query surface capabilities, formats and present modes.
///
/// A surface reporting no formats is treated as a failed query.
///
/// # Safety
/// The physical device and surface must belong to the instance `surface_fn`
/// was loaded from.
pub unsafe fn query_surface_support_details(
    surface_fn: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SurfaceSupportDetails, SwapchainError> {
    if surface == vk::SurfaceKHR::null() {
        return Err(SwapchainError::SurfaceHandleNotProvided);
    }

    let capabilities = surface_fn
        .get_physical_device_surface_capabilities(physical_device, surface)
        .map_err(SwapchainError::FailedQuerySurfaceSupportDetails)?;
    let formats = surface_fn
        .get_physical_device_surface_formats(physical_device, surface)
        .map_err(SwapchainError::FailedQuerySurfaceSupportDetails)?;
    if formats.is_empty() {
        return Err(SwapchainError::FailedQuerySurfaceSupportDetails(
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        ));
    }
    let present_modes = surface_fn
        .get_physical_device_surface_present_modes(physical_device, surface)
        .map_err(SwapchainError::FailedQuerySurfaceSupportDetails)?;

    Ok(SurfaceSupportDetails {
        capabilities,
        formats,
        present_modes,
    })
}
