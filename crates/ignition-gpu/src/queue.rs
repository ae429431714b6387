//! Queue family classification.
//!
//! All functions are pure over a queue family table and return the index of
//! the matching family, or `None`.

use ash::vk;

/// Kind of queue requested from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Present,
    Graphics,
    Compute,
    Transfer,
}

fn family_indices(
    families: &[vk::QueueFamilyProperties],
) -> impl Iterator<Item = (u32, vk::QueueFlags)> + '_ {
    (0u32..).zip(families.iter().map(|f| f.queue_flags))
}

/// First family with graphics support.
pub fn graphics_queue_index(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    family_indices(families)
        .find(|(_, flags)| flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i)
}

fn dedicated_index(
    families: &[vk::QueueFamilyProperties],
    wanted: vk::QueueFlags,
    excluded: vk::QueueFlags,
) -> Option<u32> {
    family_indices(families)
        .find(|(_, flags)| {
            flags.contains(wanted)
                && !flags.contains(vk::QueueFlags::GRAPHICS)
                && !flags.contains(excluded)
        })
        .map(|(i, _)| i)
}

fn separate_index(
    families: &[vk::QueueFamilyProperties],
    wanted: vk::QueueFlags,
    avoided: vk::QueueFlags,
) -> Option<u32> {
    let mut fallback = None;
    for (i, flags) in family_indices(families) {
        if flags.contains(wanted) && !flags.contains(vk::QueueFlags::GRAPHICS) {
            if !flags.contains(avoided) {
                return Some(i);
            }
            fallback = Some(i);
        }
    }
    fallback
}

/// First family with compute but neither graphics nor transfer.
pub fn dedicated_compute_queue_index(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    dedicated_index(families, vk::QueueFlags::COMPUTE, vk::QueueFlags::TRANSFER)
}

/// First family with transfer but neither graphics nor compute.
pub fn dedicated_transfer_queue_index(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    dedicated_index(families, vk::QueueFlags::TRANSFER, vk::QueueFlags::COMPUTE)
}

/// A family with compute but not graphics.
///
/// Families without transfer are preferred; otherwise the last family with
/// transfer is returned.
pub fn separate_compute_queue_index(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    separate_index(families, vk::QueueFlags::COMPUTE, vk::QueueFlags::TRANSFER)
}

/// A family with transfer but not graphics.
///
/// Families without compute are preferred; otherwise the last family with
/// compute is returned.
pub fn separate_transfer_queue_index(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    separate_index(families, vk::QueueFlags::TRANSFER, vk::QueueFlags::COMPUTE)
}

/// First family for which `supports_present` reports true.
///
/// A failing query ends the search with no result.
pub fn present_queue_index(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool, vk::Result>,
) -> Option<u32> {
    for (i, _) in family_indices(families) {
        match supports_present(i) {
            Ok(true) => return Some(i),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!("Present support query for family {} failed: {}", i, e);
                return None;
            }
        }
    }
    None
}

/// Present family for a surface, querying through the surface loader.
///
/// Returns `None` for a null surface.
pub(crate) fn present_queue_index_for_surface(
    surface_fn: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    families: &[vk::QueueFamilyProperties],
) -> Option<u32> {
    if surface == vk::SurfaceKHR::null() {
        return None;
    }
    present_queue_index(families, |i| {
        // SAFETY: physical_device and surface come from the same live instance.
        unsafe { surface_fn.get_physical_device_surface_support(physical_device, i, surface) }
    })
}
