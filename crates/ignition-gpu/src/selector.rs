//! Physical device selection.
//!
//! Each enumerated device is described once, rated against the criteria, and
//! one is picked: the first rated [`Suitability::Yes`], otherwise the last
//! rated [`Suitability::Partial`].

use crate::capabilities::CandidateDeviceDescription;
use crate::error::PhysicalDeviceError;
use crate::features;
use crate::instance::Instance;
use crate::queue;
use ash::vk;
use std::ffi::{CStr, CString};

/// How well a device matches the selection criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Suitability {
    /// A required criterion is not met.
    No,
    /// All required criteria are met, some desired ones are not.
    Partial,
    Yes,
}

/// Device requirements.
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub preferred_type: vk::PhysicalDeviceType,
    pub allow_any_type: bool,
    pub require_present: bool,
    pub require_dedicated_transfer_queue: bool,
    pub require_dedicated_compute_queue: bool,
    pub require_separate_transfer_queue: bool,
    pub require_separate_compute_queue: bool,
    /// Minimum size of some device-local heap, in bytes.
    pub required_mem_size: vk::DeviceSize,
    pub desired_mem_size: vk::DeviceSize,
    pub required_extensions: Vec<CString>,
    pub desired_extensions: Vec<CString>,
    pub required_version: u32,
    pub desired_version: u32,
    pub required_features: vk::PhysicalDeviceFeatures,
    pub defer_surface_initialization: bool,
    pub use_first_gpu_unconditionally: bool,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            preferred_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            allow_any_type: true,
            require_present: true,
            require_dedicated_transfer_queue: false,
            require_dedicated_compute_queue: false,
            require_separate_transfer_queue: false,
            require_separate_compute_queue: false,
            required_mem_size: 0,
            desired_mem_size: 0,
            required_extensions: Vec::new(),
            desired_extensions: Vec::new(),
            required_version: vk::API_VERSION_1_0,
            desired_version: vk::API_VERSION_1_0,
            required_features: vk::PhysicalDeviceFeatures::default(),
            defer_surface_initialization: false,
            use_first_gpu_unconditionally: false,
        }
    }
}

/// Rate one device against the criteria.
///
/// `headless` is whether the instance was created without windowing support.
pub fn rate(
    criteria: &SelectionCriteria,
    desc: &CandidateDeviceDescription,
    headless: bool,
) -> Suitability {
    let mut suitable = Suitability::Yes;
    let api_version = desc.properties.api_version;
    let families = &desc.queue_families;

    if criteria.required_version > api_version {
        return Suitability::No;
    }
    if criteria.desired_version > api_version {
        suitable = Suitability::Partial;
    }

    if (criteria.require_dedicated_compute_queue
        && queue::dedicated_compute_queue_index(families).is_none())
        || (criteria.require_dedicated_transfer_queue
            && queue::dedicated_transfer_queue_index(families).is_none())
        || (criteria.require_separate_compute_queue
            && queue::separate_compute_queue_index(families).is_none())
        || (criteria.require_separate_transfer_queue
            && queue::separate_transfer_queue_index(families).is_none())
    {
        return Suitability::No;
    }

    if criteria.require_present
        && desc.present_family.is_none()
        && !criteria.defer_surface_initialization
    {
        return Suitability::No;
    }

    if !criteria
        .required_extensions
        .iter()
        .all(|ext| desc.supports_extension(ext))
    {
        return Suitability::No;
    }
    if !criteria
        .desired_extensions
        .iter()
        .all(|ext| desc.supports_extension(ext))
    {
        suitable = Suitability::Partial;
    }

    let swapchain_adequate = if criteria.defer_surface_initialization {
        true
    } else if headless {
        false
    } else {
        !desc.surface_formats.is_empty() && !desc.present_modes.is_empty()
    };
    if criteria.require_present && !swapchain_adequate {
        return Suitability::No;
    }

    if desc.properties.device_type != criteria.preferred_type {
        if criteria.allow_any_type {
            suitable = Suitability::Partial;
        } else {
            return Suitability::No;
        }
    }

    if !features::supports_features(&desc.features, &criteria.required_features) {
        return Suitability::No;
    }

    let mut has_required_memory = false;
    let mut has_desired_memory = false;
    for heap in desc.device_local_heaps() {
        if heap.size > 0 && heap.size >= criteria.required_mem_size {
            has_required_memory = true;
        }
        if heap.size > 0 && heap.size >= criteria.desired_mem_size {
            has_desired_memory = true;
        }
    }
    if !has_required_memory {
        return Suitability::No;
    }
    if !has_desired_memory {
        suitable = Suitability::Partial;
    }

    suitable
}

/// Index of the device to select: the first `Yes`, else the last `Partial`.
pub fn pick(ratings: &[Suitability]) -> Option<usize> {
    let mut partial = None;
    for (i, rating) in ratings.iter().enumerate() {
        match rating {
            Suitability::Yes => return Some(i),
            Suitability::Partial => partial = Some(i),
            Suitability::No => {}
        }
    }
    partial
}

/// Fail with `NoSurfaceProvided` when presentation needs a surface that is
/// missing.
fn check_surface(
    criteria: &SelectionCriteria,
    headless: bool,
    surface: vk::SurfaceKHR,
) -> Result<(), PhysicalDeviceError> {
    if !headless && !criteria.defer_surface_initialization && surface == vk::SurfaceKHR::null() {
        return Err(PhysicalDeviceError::NoSurfaceProvided);
    }
    Ok(())
}

/// Index of the candidate to select. With `use_first_gpu_unconditionally`
/// the first device is taken without rating.
fn choose_device(
    criteria: &SelectionCriteria,
    candidates: &[CandidateDeviceDescription],
    headless: bool,
) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if criteria.use_first_gpu_unconditionally {
        return Some(0);
    }
    let ratings: Vec<Suitability> = candidates
        .iter()
        .map(|desc| {
            let rating = rate(criteria, desc, headless);
            tracing::debug!("{}: {:?}", desc.device_name(), rating);
            rating
        })
        .collect();
    pick(&ratings)
}

/// Extensions to enable on the selected device: every required extension,
/// then the desired ones the device supports. No duplicates.
pub fn extensions_to_enable(
    criteria: &SelectionCriteria,
    desc: &CandidateDeviceDescription,
) -> Vec<CString> {
    let mut extensions: Vec<CString> = Vec::new();
    let desired = criteria
        .desired_extensions
        .iter()
        .filter(|ext| desc.supports_extension(ext));

    for ext in criteria.required_extensions.iter().chain(desired) {
        if !extensions.contains(ext) {
            extensions.push(ext.clone());
        }
    }
    extensions
}

/// The selected physical device and what to enable on it.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceSelection {
    description: CandidateDeviceDescription,
    surface: vk::SurfaceKHR,
    features: vk::PhysicalDeviceFeatures,
    extensions_to_enable: Vec<CString>,
    defer_surface_initialization: bool,
}

impl PhysicalDeviceSelection {
    pub(crate) fn from_parts(
        description: CandidateDeviceDescription,
        surface: vk::SurfaceKHR,
        features: vk::PhysicalDeviceFeatures,
        extensions_to_enable: Vec<CString>,
        defer_surface_initialization: bool,
    ) -> Self {
        Self {
            description,
            surface,
            features,
            extensions_to_enable,
            defer_surface_initialization,
        }
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.description.physical_device
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn description(&self) -> &CandidateDeviceDescription {
        &self.description
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.description.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.description.memory_properties
    }

    /// Features to enable: the required features of the criteria.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.description.queue_families
    }

    pub fn extensions_to_enable(&self) -> &[CString] {
        &self.extensions_to_enable
    }

    pub fn is_extension_enabled(&self, name: &CStr) -> bool {
        self.extensions_to_enable.iter().any(|e| e.as_c_str() == name)
    }

    pub fn defer_surface_initialization(&self) -> bool {
        self.defer_surface_initialization
    }

    pub fn has_dedicated_compute_queue(&self) -> bool {
        queue::dedicated_compute_queue_index(self.queue_families()).is_some()
    }

    pub fn has_dedicated_transfer_queue(&self) -> bool {
        queue::dedicated_transfer_queue_index(self.queue_families()).is_some()
    }

    pub fn has_separate_compute_queue(&self) -> bool {
        queue::separate_compute_queue_index(self.queue_families()).is_some()
    }

    pub fn has_separate_transfer_queue(&self) -> bool {
        queue::separate_transfer_queue_index(self.queue_families()).is_some()
    }

    /// Get a human-readable summary of the device.
    pub fn summary(&self) -> String {
        self.description.summary()
    }
}

/// Builder that selects a [`PhysicalDeviceSelection`] from an instance.
#[derive(Clone)]
pub struct PhysicalDeviceSelector<'a> {
    instance: &'a Instance,
    surface: vk::SurfaceKHR,
    criteria: SelectionCriteria,
}

impl<'a> PhysicalDeviceSelector<'a> {
    pub fn new(instance: &'a Instance) -> Self {
        Self {
            instance,
            surface: vk::SurfaceKHR::null(),
            criteria: SelectionCriteria {
                require_present: !instance.is_headless(),
                required_version: instance.api_version(),
                desired_version: instance.api_version(),
                ..SelectionCriteria::default()
            },
        }
    }

    /// Surface the device must be able to present to.
    pub fn surface(mut self, surface: vk::SurfaceKHR) -> Self {
        self.surface = surface;
        self
    }

    pub fn prefer_gpu_device_type(mut self, device_type: vk::PhysicalDeviceType) -> Self {
        self.criteria.preferred_type = device_type;
        self
    }

    /// Accept devices of a non-preferred type as partial matches.
    pub fn allow_any_gpu_device_type(mut self, allow: bool) -> Self {
        self.criteria.allow_any_type = allow;
        self
    }

    pub fn require_present(mut self, require: bool) -> Self {
        self.criteria.require_present = require;
        self
    }

    pub fn require_dedicated_compute_queue(mut self) -> Self {
        self.criteria.require_dedicated_compute_queue = true;
        self
    }

    pub fn require_dedicated_transfer_queue(mut self) -> Self {
        self.criteria.require_dedicated_transfer_queue = true;
        self
    }

    pub fn require_separate_compute_queue(mut self) -> Self {
        self.criteria.require_separate_compute_queue = true;
        self
    }

    pub fn require_separate_transfer_queue(mut self) -> Self {
        self.criteria.require_separate_transfer_queue = true;
        self
    }

    pub fn required_device_memory_size(mut self, size: vk::DeviceSize) -> Self {
        self.criteria.required_mem_size = size;
        self
    }

    pub fn desired_device_memory_size(mut self, size: vk::DeviceSize) -> Self {
        self.criteria.desired_mem_size = size;
        self
    }

    pub fn add_required_extension(mut self, extension: &CStr) -> Self {
        self.criteria.required_extensions.push(extension.to_owned());
        self
    }

    pub fn add_required_extensions<'e>(
        mut self,
        extensions: impl IntoIterator<Item = &'e CStr>,
    ) -> Self {
        self.criteria
            .required_extensions
            .extend(extensions.into_iter().map(CStr::to_owned));
        self
    }

    pub fn add_desired_extension(mut self, extension: &CStr) -> Self {
        self.criteria.desired_extensions.push(extension.to_owned());
        self
    }

    pub fn add_desired_extensions<'e>(
        mut self,
        extensions: impl IntoIterator<Item = &'e CStr>,
    ) -> Self {
        self.criteria
            .desired_extensions
            .extend(extensions.into_iter().map(CStr::to_owned));
        self
    }

    pub fn set_minimum_version(mut self, major: u32, minor: u32) -> Self {
        self.criteria.required_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    pub fn set_desired_version(mut self, major: u32, minor: u32) -> Self {
        self.criteria.desired_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    pub fn set_required_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.criteria.required_features = features;
        self
    }

    /// Select without a surface; the swapchain extension is still enabled.
    pub fn defer_surface_initialization(mut self) -> Self {
        self.criteria.defer_surface_initialization = true;
        self
    }

    /// Skip rating and take the first enumerated device.
    pub fn select_first_device_unconditionally(mut self, select: bool) -> Self {
        self.criteria.use_first_gpu_unconditionally = select;
        self
    }

    pub fn criteria(&self) -> &SelectionCriteria {
        &self.criteria
    }

    fn enumerate(&self) -> Result<Vec<CandidateDeviceDescription>, PhysicalDeviceError> {
        check_surface(&self.criteria, self.instance.is_headless(), self.surface)?;

        // SAFETY: the instance is live for 'a.
        let devices = unsafe { self.instance.raw().enumerate_physical_devices() }
            .map_err(PhysicalDeviceError::FailedEnumeratePhysicalDevices)?;
        if devices.is_empty() {
            return Err(PhysicalDeviceError::NoPhysicalDevicesFound);
        }

        Ok(devices
            .into_iter()
            .map(|device| {
                // SAFETY: device was enumerated from this instance.
                unsafe {
                    CandidateDeviceDescription::describe(
                        self.instance.raw(),
                        self.instance.surface_fn(),
                        device,
                        self.surface,
                    )
                }
            })
            .collect())
    }

    /// Describe and rate every device, in enumeration order.
    pub fn describe_all(
        &self,
    ) -> Result<Vec<(CandidateDeviceDescription, Suitability)>, PhysicalDeviceError> {
        let headless = self.instance.is_headless();
        Ok(self
            .enumerate()?
            .into_iter()
            .map(|desc| {
                let rating = rate(&self.criteria, &desc, headless);
                (desc, rating)
            })
            .collect())
    }

    /// Select a physical device.
    pub fn select(&self) -> Result<PhysicalDeviceSelection, PhysicalDeviceError> {
        let mut candidates = self.enumerate()?;

        let index = choose_device(&self.criteria, &candidates, self.instance.is_headless())
            .ok_or(PhysicalDeviceError::NoSuitableDevice)?;

        let description = candidates.swap_remove(index);
        let extensions = extensions_to_enable(&self.criteria, &description);
        let selection = PhysicalDeviceSelection::from_parts(
            description,
            self.surface,
            self.criteria.required_features,
            extensions,
            self.criteria.defer_surface_initialization,
        );

        tracing::info!("Selected GPU: {}", selection.summary());
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::tests::fake_device;

    const GIB: vk::DeviceSize = 1 << 30;

    fn discrete(handle: u64, api_version: u32) -> CandidateDeviceDescription {
        fake_device(handle, vk::PhysicalDeviceType::DISCRETE_GPU, api_version, 8 * GIB)
    }

    fn integrated(handle: u64) -> CandidateDeviceDescription {
        fake_device(
            handle,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::API_VERSION_1_3,
            2 * GIB,
        )
    }

    fn choose(
        criteria: &SelectionCriteria,
        devices: &[CandidateDeviceDescription],
    ) -> Option<usize> {
        let ratings: Vec<_> = devices.iter().map(|d| rate(criteria, d, false)).collect();
        pick(&ratings)
    }

    #[test]
    fn version_gate_rejects_older_device() {
        let criteria = SelectionCriteria {
            required_version: vk::API_VERSION_1_3,
            ..Default::default()
        };
        let devices = [discrete(1, vk::API_VERSION_1_1)];

        assert_eq!(rate(&criteria, &devices[0], false), Suitability::No);
        assert_eq!(choose(&criteria, &devices), None);
    }

    #[test]
    fn desired_version_is_partial() {
        let criteria = SelectionCriteria {
            desired_version: vk::API_VERSION_1_3,
            ..Default::default()
        };
        assert_eq!(
            rate(&criteria, &discrete(1, vk::API_VERSION_1_2), false),
            Suitability::Partial
        );
        assert_eq!(
            rate(&criteria, &discrete(1, vk::API_VERSION_1_3), false),
            Suitability::Yes
        );
    }

    #[test]
    fn device_type_preference() {
        let mut criteria = SelectionCriteria::default();
        assert_eq!(rate(&criteria, &integrated(1), false), Suitability::Partial);

        criteria.allow_any_type = false;
        assert_eq!(rate(&criteria, &integrated(1), false), Suitability::No);
    }

    #[test]
    fn first_yes_wins_over_earlier_partial() {
        let criteria = SelectionCriteria::default();
        let devices = [
            integrated(1),
            discrete(2, vk::API_VERSION_1_3),
            discrete(3, vk::API_VERSION_1_3),
        ];
        assert_eq!(choose(&criteria, &devices), Some(1));
    }

    #[test]
    fn last_partial_is_the_fallback() {
        let criteria = SelectionCriteria::default();
        let devices = [integrated(1), integrated(2), integrated(3)];
        assert_eq!(choose(&criteria, &devices), Some(2));
        assert_eq!(pick(&[Suitability::No, Suitability::No]), None);
    }

    #[test]
    fn selection_is_deterministic() {
        let criteria = SelectionCriteria {
            desired_mem_size: 4 * GIB,
            ..Default::default()
        };
        let devices = [
            integrated(1),
            discrete(2, vk::API_VERSION_1_1),
            discrete(3, vk::API_VERSION_1_3),
        ];
        let first = choose(&criteria, &devices);
        for _ in 0..10 {
            assert_eq!(choose(&criteria, &devices), first);
        }
    }

    #[test]
    fn stricter_criteria_never_add_yes_devices() {
        let mut no_present = discrete(4, vk::API_VERSION_1_3);
        no_present.present_family = None;
        let mut with_ext = discrete(5, vk::API_VERSION_1_3);
        with_ext.available_extensions = vec![c"VK_KHR_swapchain".to_owned()];
        let devices = [
            integrated(1),
            discrete(2, vk::API_VERSION_1_1),
            discrete(3, vk::API_VERSION_1_3),
            no_present,
            with_ext,
        ];

        let loose = SelectionCriteria {
            require_present: false,
            ..Default::default()
        };
        let strict = SelectionCriteria {
            require_present: true,
            required_version: vk::API_VERSION_1_2,
            required_mem_size: 4 * GIB,
            required_extensions: vec![c"VK_KHR_swapchain".to_owned()],
            allow_any_type: false,
            ..Default::default()
        };

        for device in &devices {
            if rate(&strict, device, false) == Suitability::Yes {
                assert_eq!(rate(&loose, device, false), Suitability::Yes);
            }
            assert!(rate(&strict, device, false) <= rate(&loose, device, false));
        }
        assert_eq!(choose(&strict, &devices), Some(4));
    }

    #[test]
    fn memory_requirements() {
        let device = discrete(1, vk::API_VERSION_1_3);
        let required = SelectionCriteria {
            required_mem_size: 16 * GIB,
            ..Default::default()
        };
        assert_eq!(rate(&required, &device, false), Suitability::No);

        let desired = SelectionCriteria {
            desired_mem_size: 16 * GIB,
            ..Default::default()
        };
        assert_eq!(rate(&desired, &device, false), Suitability::Partial);
    }

    #[test]
    fn presentation_requirements() {
        let mut device = discrete(1, vk::API_VERSION_1_3);
        device.present_family = None;
        let mut criteria = SelectionCriteria::default();
        assert_eq!(rate(&criteria, &device, false), Suitability::No);

        criteria.defer_surface_initialization = true;
        assert_eq!(rate(&criteria, &device, false), Suitability::Yes);

        let mut device = discrete(2, vk::API_VERSION_1_3);
        device.present_modes.clear();
        let criteria = SelectionCriteria::default();
        assert_eq!(rate(&criteria, &device, false), Suitability::No);

        // Headless instances have no swapchain support to offer.
        assert_eq!(
            rate(&criteria, &discrete(3, vk::API_VERSION_1_3), true),
            Suitability::No
        );
        let headless = SelectionCriteria {
            require_present: false,
            ..Default::default()
        };
        assert_eq!(
            rate(&headless, &discrete(3, vk::API_VERSION_1_3), true),
            Suitability::Yes
        );
    }

    #[test]
    fn dedicated_queue_requirement() {
        let criteria = SelectionCriteria {
            require_dedicated_transfer_queue: true,
            ..Default::default()
        };
        let mut device = discrete(1, vk::API_VERSION_1_3);
        assert_eq!(rate(&criteria, &device, false), Suitability::No);

        device.queue_families.push(vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::TRANSFER,
            queue_count: 2,
            ..Default::default()
        });
        assert_eq!(rate(&criteria, &device, false), Suitability::Yes);
    }

    #[test]
    fn required_features_must_be_supported() {
        let criteria = SelectionCriteria {
            required_features: vk::PhysicalDeviceFeatures::default().geometry_shader(true),
            ..Default::default()
        };
        let mut device = discrete(1, vk::API_VERSION_1_3);
        assert_eq!(rate(&criteria, &device, false), Suitability::No);

        device.features.geometry_shader = vk::TRUE;
        assert_eq!(rate(&criteria, &device, false), Suitability::Yes);
    }

    #[test]
    fn extension_accumulation() {
        let mut device = discrete(1, vk::API_VERSION_1_3);
        device.available_extensions = vec![
            c"VK_KHR_swapchain".to_owned(),
            c"VK_EXT_memory_budget".to_owned(),
        ];
        let criteria = SelectionCriteria {
            required_extensions: vec![
                c"VK_KHR_swapchain".to_owned(),
                c"VK_KHR_swapchain".to_owned(),
            ],
            desired_extensions: vec![
                c"VK_EXT_memory_budget".to_owned(),
                c"VK_KHR_swapchain".to_owned(),
                c"VK_NV_ray_tracing".to_owned(),
            ],
            ..Default::default()
        };

        assert_eq!(rate(&criteria, &device, false), Suitability::Partial);
        assert_eq!(
            extensions_to_enable(&criteria, &device),
            vec![
                c"VK_KHR_swapchain".to_owned(),
                c"VK_EXT_memory_budget".to_owned(),
            ]
        );
    }

    #[test]
    fn surface_required_unless_headless_or_deferred() {
        use ash::vk::Handle;

        let criteria = SelectionCriteria::default();
        assert_eq!(
            check_surface(&criteria, false, vk::SurfaceKHR::null()),
            Err(PhysicalDeviceError::NoSurfaceProvided)
        );
        assert_eq!(
            check_surface(&criteria, true, vk::SurfaceKHR::null()),
            Ok(())
        );
        assert_eq!(
            check_surface(&criteria, false, vk::SurfaceKHR::from_raw(1)),
            Ok(())
        );

        let deferred = SelectionCriteria {
            defer_surface_initialization: true,
            ..Default::default()
        };
        assert_eq!(
            check_surface(&deferred, false, vk::SurfaceKHR::null()),
            Ok(())
        );
    }

    #[test]
    fn first_device_taken_unconditionally() {
        let criteria = SelectionCriteria {
            required_version: vk::API_VERSION_1_3,
            use_first_gpu_unconditionally: true,
            ..Default::default()
        };
        let devices = [
            discrete(1, vk::API_VERSION_1_1),
            discrete(2, vk::API_VERSION_1_3),
        ];

        assert_eq!(rate(&criteria, &devices[0], true), Suitability::No);
        assert_eq!(choose_device(&criteria, &devices, true), Some(0));
        assert_eq!(choose_device(&criteria, &[], true), None);

        let rated = SelectionCriteria {
            use_first_gpu_unconditionally: false,
            ..criteria
        };
        assert_eq!(choose_device(&rated, &devices, true), Some(1));
    }
}
