//! Logical device creation and queue lookup.

use crate::error::{DeviceError, QueueError};
use crate::features;
use crate::instance::Instance;
use crate::queue::{self, QueueType};
use crate::selector::PhysicalDeviceSelection;
use ash::vk;
use std::ffi::{c_char, CString};

/// Queues to create from one queue family.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomQueueDescription {
    pub index: u32,
    pub count: u32,
    /// One priority per queue.
    pub priorities: Vec<f32>,
}

impl CustomQueueDescription {
    /// Describe `count` queues of family `index`.
    ///
    /// Missing priorities default to 1.0 and extra ones are dropped.
    pub fn new(index: u32, count: u32, mut priorities: Vec<f32>) -> Self {
        priorities.resize(count as usize, 1.0);
        Self {
            index,
            count,
            priorities,
        }
    }
}

/// One queue at priority 1.0 from every family.
pub fn default_queue_descriptions(
    families: &[vk::QueueFamilyProperties],
) -> Vec<CustomQueueDescription> {
    (0u32..)
        .take(families.len())
        .map(|index| CustomQueueDescription::new(index, 1, vec![1.0]))
        .collect()
}

/// Extensions to enable on the device: the selection's list plus the
/// swapchain extension when presentation may be used.
pub fn device_extensions(selection: &PhysicalDeviceSelection) -> Vec<CString> {
    let mut extensions = selection.extensions_to_enable().to_vec();
    let presents = selection.surface() != vk::SurfaceKHR::null()
        || selection.defer_surface_initialization();
    if presents && !selection.is_extension_enabled(ash::khr::swapchain::NAME) {
        extensions.push(ash::khr::swapchain::NAME.to_owned());
    }
    extensions
}

/// Queue descriptions to create: the custom setup with every priority list
/// matched to its count, or one queue per family when none was given.
fn resolve_queue_descriptions(
    custom: &[CustomQueueDescription],
    families: &[vk::QueueFamilyProperties],
) -> Vec<CustomQueueDescription> {
    if custom.is_empty() {
        return default_queue_descriptions(families);
    }
    custom
        .iter()
        .map(|d| CustomQueueDescription::new(d.index, d.count, d.priorities.clone()))
        .collect()
}

/// Whether the flat feature struct goes into device creation. A
/// `Features2` block carries the features instead.
fn uses_flat_features(blocks: &[FeatureBlock]) -> bool {
    !blocks
        .iter()
        .any(|b| matches!(b, FeatureBlock::Features2(_)))
}

/// Unlink the blocks and merge `required` into any `Features2` block.
fn prepare_feature_blocks(
    blocks: &[FeatureBlock],
    required: &vk::PhysicalDeviceFeatures,
) -> Vec<FeatureBlock> {
    blocks
        .iter()
        .copied()
        .map(|block| match block {
            FeatureBlock::Features2(mut f) => {
                f.p_next = std::ptr::null_mut();
                f.features = features::merge_features(&f.features, required);
                FeatureBlock::Features2(f)
            }
            FeatureBlock::Vulkan11(mut f) => {
                f.p_next = std::ptr::null_mut();
                FeatureBlock::Vulkan11(f)
            }
            FeatureBlock::Vulkan12(mut f) => {
                f.p_next = std::ptr::null_mut();
                FeatureBlock::Vulkan12(f)
            }
            FeatureBlock::Vulkan13(mut f) => {
                f.p_next = std::ptr::null_mut();
                FeatureBlock::Vulkan13(f)
            }
        })
        .collect()
}

/// Core features enabled by a device created with `blocks`.
fn effective_features(
    blocks: &[FeatureBlock],
    required: &vk::PhysicalDeviceFeatures,
) -> vk::PhysicalDeviceFeatures {
    blocks
        .iter()
        .find_map(|b| match b {
            FeatureBlock::Features2(f) => Some(f.features),
            _ => None,
        })
        .unwrap_or(*required)
}

fn check_queue_slot(
    descriptions: &[CustomQueueDescription],
    family: u32,
    index: u32,
) -> Result<(), QueueError> {
    let description = descriptions
        .iter()
        .find(|d| d.index == family)
        .ok_or(QueueError::InvalidQueueFamilyIndex)?;
    if index >= description.count {
        return Err(QueueError::QueueIndexOutOfRange);
    }
    Ok(())
}

/// A feature structure chained into device creation.
#[derive(Debug, Clone, Copy)]
pub enum FeatureBlock {
    /// Replaces the flat feature struct; the selection's required features
    /// are merged into it.
    Features2(vk::PhysicalDeviceFeatures2<'static>),
    Vulkan11(vk::PhysicalDeviceVulkan11Features<'static>),
    Vulkan12(vk::PhysicalDeviceVulkan12Features<'static>),
    Vulkan13(vk::PhysicalDeviceVulkan13Features<'static>),
}

/// Builder for [`Device`].
#[derive(Clone)]
pub struct DeviceBuilder<'a> {
    instance: &'a Instance,
    selection: &'a PhysicalDeviceSelection,
    queue_descriptions: Vec<CustomQueueDescription>,
    feature_blocks: Vec<FeatureBlock>,
    allocation_callbacks: Option<&'static vk::AllocationCallbacks<'static>>,
}

impl<'a> DeviceBuilder<'a> {
    pub fn new(instance: &'a Instance, selection: &'a PhysicalDeviceSelection) -> Self {
        Self {
            instance,
            selection,
            queue_descriptions: Vec::new(),
            feature_blocks: Vec::new(),
            allocation_callbacks: instance.allocation_callbacks(),
        }
    }

    /// Create exactly these queues instead of one per family.
    pub fn custom_queue_setup(mut self, descriptions: Vec<CustomQueueDescription>) -> Self {
        self.queue_descriptions = descriptions;
        self
    }

    pub fn add_feature_block(mut self, block: FeatureBlock) -> Self {
        self.feature_blocks.push(block);
        self
    }

    pub fn allocation_callbacks(
        mut self,
        callbacks: &'static vk::AllocationCallbacks<'static>,
    ) -> Self {
        self.allocation_callbacks = Some(callbacks);
        self
    }

    /// Create the logical device.
    pub fn build(&self) -> Result<Device, DeviceError> {
        let selection = self.selection;
        let queue_descriptions =
            resolve_queue_descriptions(&self.queue_descriptions, selection.queue_families());

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_descriptions
            .iter()
            .map(|d| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(d.index)
                    .queue_priorities(&d.priorities)
            })
            .collect();

        let extensions = device_extensions(selection);
        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let mut blocks = prepare_feature_blocks(&self.feature_blocks, selection.features());
        let enabled_features = effective_features(&blocks, selection.features());

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names);
        if uses_flat_features(&blocks) {
            create_info = create_info.enabled_features(selection.features());
        }

        for block in &mut blocks {
            create_info = match block {
                FeatureBlock::Features2(f) => create_info.push_next(f),
                FeatureBlock::Vulkan11(f) => create_info.push_next(f),
                FeatureBlock::Vulkan12(f) => create_info.push_next(f),
                FeatureBlock::Vulkan13(f) => create_info.push_next(f),
            };
        }

        // SAFETY: the physical device belongs to this instance and every
        // pointer in create_info outlives the call.
        let device = unsafe {
            self.instance.raw().create_device(
                selection.handle(),
                &create_info,
                self.allocation_callbacks,
            )
        }
        .map_err(DeviceError::FailedCreateDevice)?;

        tracing::info!(
            "Created logical device: {} queue families, {} extensions, {} core features",
            queue_descriptions.len(),
            extensions.len(),
            features::enabled_count(&enabled_features)
        );

        Ok(Device {
            device,
            instance: self.instance.raw().clone(),
            surface_fn: self.instance.surface_fn().clone(),
            selection: selection.clone(),
            queue_descriptions,
            enabled_extensions: extensions,
            allocation_callbacks: self.allocation_callbacks,
        })
    }
}

/// A created logical device.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    surface_fn: ash::khr::surface::Instance,
    selection: PhysicalDeviceSelection,
    queue_descriptions: Vec<CustomQueueDescription>,
    enabled_extensions: Vec<CString>,
    allocation_callbacks: Option<&'static vk::AllocationCallbacks<'static>>,
}

impl Device {
    pub fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    /// Core device function table.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub(crate) fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub(crate) fn surface_fn(&self) -> &ash::khr::surface::Instance {
        &self.surface_fn
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.selection.handle()
    }

    pub fn selection(&self) -> &PhysicalDeviceSelection {
        &self.selection
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.selection.surface()
    }

    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        self.selection.queue_families()
    }

    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    pub fn allocation_callbacks(&self) -> Option<&'static vk::AllocationCallbacks<'static>> {
        self.allocation_callbacks
    }

    /// Family index for a queue type.
    ///
    /// Compute and transfer resolve to a family without graphics.
    pub fn get_queue_index(&self, queue_type: QueueType) -> Result<u32, QueueError> {
        let families = self.queue_families();
        match queue_type {
            QueueType::Present => queue::present_queue_index_for_surface(
                &self.surface_fn,
                self.physical_device(),
                self.surface(),
                families,
            )
            .ok_or(QueueError::PresentUnavailable),
            QueueType::Graphics => {
                queue::graphics_queue_index(families).ok_or(QueueError::GraphicsUnavailable)
            }
            QueueType::Compute => {
                queue::separate_compute_queue_index(families).ok_or(QueueError::ComputeUnavailable)
            }
            QueueType::Transfer => queue::separate_transfer_queue_index(families)
                .ok_or(QueueError::TransferUnavailable),
        }
    }

    /// Family index of a dedicated compute or transfer family.
    pub fn get_dedicated_queue_index(&self, queue_type: QueueType) -> Result<u32, QueueError> {
        let families = self.queue_families();
        match queue_type {
            QueueType::Compute => queue::dedicated_compute_queue_index(families)
                .ok_or(QueueError::ComputeUnavailable),
            QueueType::Transfer => queue::dedicated_transfer_queue_index(families)
                .ok_or(QueueError::TransferUnavailable),
            QueueType::Present | QueueType::Graphics => Err(QueueError::InvalidQueueFamilyIndex),
        }
    }

    /// First queue of the family for `queue_type`.
    pub fn get_queue(&self, queue_type: QueueType) -> Result<vk::Queue, QueueError> {
        let family = self.get_queue_index(queue_type)?;
        self.get_queue_at(family, 0)
    }

    /// First queue of the dedicated family for `queue_type`.
    pub fn get_dedicated_queue(&self, queue_type: QueueType) -> Result<vk::Queue, QueueError> {
        let family = self.get_dedicated_queue_index(queue_type)?;
        self.get_queue_at(family, 0)
    }

    /// Queue `index` of family `family`, if it was created.
    pub fn get_queue_at(&self, family: u32, index: u32) -> Result<vk::Queue, QueueError> {
        check_queue_slot(&self.queue_descriptions, family, index)?;
        // SAFETY: the queue was requested at device creation.
        Ok(unsafe { self.device.get_device_queue(family, index) })
    }

    /// Destroy the logical device.
    ///
    /// # Safety
    /// All objects created from the device must be destroyed and no work may
    /// be pending on its queues.
    pub unsafe fn destroy(self) {
        self.device.destroy_device(self.allocation_callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_normalized() {
        let padded = CustomQueueDescription::new(1, 3, vec![0.5]);
        assert_eq!(padded.priorities, vec![0.5, 1.0, 1.0]);

        let truncated = CustomQueueDescription::new(0, 1, vec![0.25, 0.75]);
        assert_eq!(truncated.priorities, vec![0.25]);
    }

    #[test]
    fn default_setup_covers_every_family() {
        let families = vec![vk::QueueFamilyProperties::default(); 3];
        let descriptions = default_queue_descriptions(&families);

        assert_eq!(descriptions.len(), 3);
        for (i, d) in descriptions.iter().enumerate() {
            assert_eq!(d.index, i as u32);
            assert_eq!(d.count, 1);
            assert_eq!(d.priorities, vec![1.0]);
        }
    }

    #[test]
    fn swapchain_extension_added_once_when_presenting() {
        use crate::capabilities::CandidateDeviceDescription;
        use ash::vk::Handle;

        let selection = |surface: u64, defer: bool, extensions: Vec<CString>| {
            PhysicalDeviceSelection::from_parts(
                CandidateDeviceDescription::default(),
                vk::SurfaceKHR::from_raw(surface),
                vk::PhysicalDeviceFeatures::default(),
                extensions,
                defer,
            )
        };
        let swapchain = ash::khr::swapchain::NAME.to_owned();

        assert!(device_extensions(&selection(0, false, vec![])).is_empty());
        assert_eq!(
            device_extensions(&selection(0, true, vec![])),
            vec![swapchain.clone()]
        );
        assert_eq!(
            device_extensions(&selection(7, false, vec![swapchain.clone()])),
            vec![swapchain]
        );
    }

    #[test]
    fn queue_slot_validation() {
        let descriptions = vec![
            CustomQueueDescription::new(0, 2, vec![]),
            CustomQueueDescription::new(2, 1, vec![]),
        ];
        assert_eq!(check_queue_slot(&descriptions, 0, 1), Ok(()));
        assert_eq!(
            check_queue_slot(&descriptions, 0, 2),
            Err(QueueError::QueueIndexOutOfRange)
        );
        assert_eq!(
            check_queue_slot(&descriptions, 1, 0),
            Err(QueueError::InvalidQueueFamilyIndex)
        );
    }

    #[test]
    fn struct_literal_priorities_match_count() {
        let families = vec![vk::QueueFamilyProperties::default(); 2];
        let custom = vec![
            CustomQueueDescription {
                index: 0,
                count: 2,
                priorities: vec![1.0],
            },
            CustomQueueDescription {
                index: 1,
                count: 1,
                priorities: vec![0.5, 0.25],
            },
        ];

        let resolved = resolve_queue_descriptions(&custom, &families);
        assert_eq!(resolved[0].priorities, vec![1.0, 1.0]);
        assert_eq!(resolved[1].priorities, vec![0.5]);
        for d in &resolved {
            assert_eq!(d.priorities.len(), d.count as usize);
        }
        assert_eq!(check_queue_slot(&resolved, 0, 1), Ok(()));
        assert_eq!(
            check_queue_slot(&resolved, 1, 1),
            Err(QueueError::QueueIndexOutOfRange)
        );
    }

    #[test]
    fn empty_custom_setup_falls_back_to_defaults() {
        let families = vec![vk::QueueFamilyProperties::default(); 3];
        assert_eq!(
            resolve_queue_descriptions(&[], &families),
            default_queue_descriptions(&families)
        );
    }

    #[test]
    fn features2_block_replaces_flat_features() {
        let required = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };

        let vulkan12_only = [FeatureBlock::Vulkan12(
            vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true),
        )];
        assert!(uses_flat_features(&[]));
        assert!(uses_flat_features(&vulkan12_only));
        assert_eq!(
            effective_features(&prepare_feature_blocks(&vulkan12_only, &required), &required)
                .sampler_anisotropy,
            vk::TRUE
        );

        let with_features2 = [
            FeatureBlock::Vulkan12(vk::PhysicalDeviceVulkan12Features::default()),
            FeatureBlock::Features2(vk::PhysicalDeviceFeatures2::default().features(
                vk::PhysicalDeviceFeatures {
                    geometry_shader: vk::TRUE,
                    ..Default::default()
                },
            )),
        ];
        assert!(!uses_flat_features(&with_features2));

        let prepared = prepare_feature_blocks(&with_features2, &required);
        let FeatureBlock::Features2(merged) = prepared[1] else {
            panic!("block order changed");
        };
        assert_eq!(merged.features.geometry_shader, vk::TRUE);
        assert_eq!(merged.features.sampler_anisotropy, vk::TRUE);
        assert!(merged.p_next.is_null());
        assert_eq!(
            features::enabled_count(&effective_features(&prepared, &required)),
            2
        );
    }
}
