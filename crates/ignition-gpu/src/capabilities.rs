//! Per-device capability description.

use crate::queue;
use ash::vk;
use std::ffi::{CStr, CString};

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Everything the selector needs to know about one physical device.
///
/// Filled once per device; scoring reads only this data.
#[derive(Debug, Clone, Default)]
pub struct CandidateDeviceDescription {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Supported device extension names.
    pub available_extensions: Vec<CString>,
    /// Family able to present to the selector's surface, if any.
    pub present_family: Option<u32>,
    /// Formats the surface supports on this device. Empty without a surface.
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// Present modes the surface supports on this device. Empty without a surface.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl CandidateDeviceDescription {
    /// Query the description of a physical device.
    ///
    /// Failed enumerations are treated as empty lists.
    ///
    /// # Safety
    /// The instance, physical device, and surface (if not null) must be valid
    /// and belong together.
    pub unsafe fn describe(
        instance: &ash::Instance,
        surface_fn: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let queue_families =
            instance.get_physical_device_queue_family_properties(physical_device);

        let available_extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
            .iter()
            .map(|ext| CStr::from_ptr(ext.extension_name.as_ptr()).to_owned())
            .collect();

        let present_family = queue::present_queue_index_for_surface(
            surface_fn,
            physical_device,
            surface,
            &queue_families,
        );

        let (surface_formats, present_modes) = if surface == vk::SurfaceKHR::null() {
            (Vec::new(), Vec::new())
        } else {
            (
                surface_fn
                    .get_physical_device_surface_formats(physical_device, surface)
                    .unwrap_or_default(),
                surface_fn
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .unwrap_or_default(),
            )
        };

        Self {
            physical_device,
            properties,
            features,
            memory_properties,
            queue_families,
            available_extensions,
            present_family,
            surface_formats,
            present_modes,
        }
    }

    /// Device name as reported by the driver.
    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn vendor(&self) -> GpuVendor {
        GpuVendor::from_vendor_id(self.properties.vendor_id)
    }

    /// Returns true if the device supports a device extension.
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.available_extensions
            .iter()
            .any(|ext| ext.as_c_str() == name)
    }

    /// Device-local heaps, in heap order.
    pub fn device_local_heaps(&self) -> impl Iterator<Item = &vk::MemoryHeap> + '_ {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
    }

    /// Total device-local memory in bytes.
    pub fn device_local_memory(&self) -> vk::DeviceSize {
        self.device_local_heaps().map(|heap| heap.size).sum()
    }

    /// Get a human-readable summary of the device.
    pub fn summary(&self) -> String {
        let api_version = self.properties.api_version;
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name(),
            self.vendor(),
            self.properties.device_type,
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version),
            self.device_local_memory() / (1024 * 1024),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A discrete GPU with one graphics family and the given memory.
    pub(crate) fn fake_device(
        handle: u64,
        device_type: vk::PhysicalDeviceType,
        api_version: u32,
        vram: vk::DeviceSize,
    ) -> CandidateDeviceDescription {
        use ash::vk::Handle;

        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: vram,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory_properties.memory_heaps[1] = vk::MemoryHeap {
            size: 16 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };

        CandidateDeviceDescription {
            physical_device: vk::PhysicalDevice::from_raw(handle),
            properties: vk::PhysicalDeviceProperties {
                api_version,
                device_type,
                vendor_id: 0x10DE,
                ..Default::default()
            },
            memory_properties,
            queue_families: vec![vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS
                    | vk::QueueFlags::COMPUTE
                    | vk::QueueFlags::TRANSFER,
                queue_count: 16,
                ..Default::default()
            }],
            present_family: Some(0),
            surface_formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn only_device_local_heaps_count() {
        let desc = fake_device(
            1,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::API_VERSION_1_3,
            8 << 30,
        );
        assert_eq!(desc.device_local_memory(), 8 << 30);
        assert_eq!(desc.device_local_heaps().count(), 1);
        assert!(desc.summary().contains("8192 MB VRAM"));
    }
}
