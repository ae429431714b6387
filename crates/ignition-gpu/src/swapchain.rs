//! Swapchain negotiation and creation.

use crate::device::Device;
use crate::error::{QueueError, SwapchainError};
use crate::queue::{self, QueueType};
use crate::surface;
use ash::vk;

/// Formats tried when the caller asks for none.
pub const DEFAULT_FORMATS: [vk::SurfaceFormatKHR; 2] = [
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
];

/// Present modes tried when the caller asks for none.
pub const DEFAULT_PRESENT_MODES: [vk::PresentModeKHR; 2] =
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];

/// First desired format the surface supports, else the first available one.
pub fn find_surface_format(
    available: &[vk::SurfaceFormatKHR],
    desired: &[vk::SurfaceFormatKHR],
) -> vk::SurfaceFormatKHR {
    desired
        .iter()
        .find_map(|want| {
            available
                .iter()
                .find(|have| have.format == want.format && have.color_space == want.color_space)
        })
        .or_else(|| available.first())
        .copied()
        .unwrap_or_default()
}

/// First desired present mode the surface supports, else FIFO.
pub fn find_present_mode(
    available: &[vk::PresentModeKHR],
    desired: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    desired
        .iter()
        .copied()
        .find(|want| available.contains(want))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Swapchain extent for a desired window size.
///
/// A surface with a fixed current extent always gets that extent.
pub fn find_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: min.width.max(max.width.min(desired_width)),
        height: min.height.max(max.height.min(desired_height)),
    }
}

/// One image more than the minimum, capped by a nonzero maximum.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// Requested array layer count, capped by the surface and at least 1.
pub fn array_layers(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    requested.min(capabilities.max_image_array_layers).max(1)
}

/// Sharing mode and queue family list for the graphics and present families.
pub fn sharing_mode(graphics: u32, present: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics == present {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![graphics, present])
    }
}

/// Builder for [`Swapchain`].
#[derive(Clone)]
pub struct SwapchainBuilder<'a> {
    device: &'a Device,
    surface: vk::SurfaceKHR,
    desired_formats: Vec<vk::SurfaceFormatKHR>,
    desired_present_modes: Vec<vk::PresentModeKHR>,
    desired_width: u32,
    desired_height: u32,
    array_layer_count: u32,
    image_usage: vk::ImageUsageFlags,
    create_flags: vk::SwapchainCreateFlagsKHR,
    pre_transform: vk::SurfaceTransformFlagsKHR,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
    clipped: bool,
    old_swapchain: vk::SwapchainKHR,
    queue_family_indices: Option<(u32, u32)>,
    allocation_callbacks: Option<&'static vk::AllocationCallbacks<'static>>,
}

impl<'a> SwapchainBuilder<'a> {
    /// Builder for the device's surface.
    pub fn new(device: &'a Device) -> Self {
        Self {
            device,
            surface: device.surface(),
            desired_formats: Vec::new(),
            desired_present_modes: Vec::new(),
            desired_width: 256,
            desired_height: 256,
            array_layer_count: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            create_flags: vk::SwapchainCreateFlagsKHR::empty(),
            pre_transform: vk::SurfaceTransformFlagsKHR::empty(),
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            clipped: true,
            old_swapchain: vk::SwapchainKHR::null(),
            queue_family_indices: None,
            allocation_callbacks: device.allocation_callbacks(),
        }
    }

    /// Use a different surface, e.g. after deferred surface initialization.
    pub fn surface(mut self, surface: vk::SurfaceKHR) -> Self {
        self.surface = surface;
        self
    }

    pub fn desired_extent(mut self, width: u32, height: u32) -> Self {
        self.desired_width = width;
        self.desired_height = height;
        self
    }

    /// Most preferred format.
    pub fn desired_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.desired_formats.insert(0, format);
        self
    }

    /// Least preferred format so far.
    pub fn add_fallback_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.desired_formats.push(format);
        self
    }

    pub fn use_default_format_selection(mut self) -> Self {
        self.desired_formats = DEFAULT_FORMATS.to_vec();
        self
    }

    pub fn desired_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.desired_present_modes.insert(0, mode);
        self
    }

    pub fn add_fallback_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.desired_present_modes.push(mode);
        self
    }

    pub fn use_default_present_mode_selection(mut self) -> Self {
        self.desired_present_modes = DEFAULT_PRESENT_MODES.to_vec();
        self
    }

    pub fn image_usage_flags(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.image_usage = usage;
        self
    }

    pub fn add_image_usage_flags(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.image_usage |= usage;
        self
    }

    pub fn use_default_image_usage_flags(mut self) -> Self {
        self.image_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        self
    }

    pub fn image_array_layer_count(mut self, count: u32) -> Self {
        self.array_layer_count = count;
        self
    }

    pub fn clipped(mut self, clipped: bool) -> Self {
        self.clipped = clipped;
        self
    }

    pub fn create_flags(mut self, flags: vk::SwapchainCreateFlagsKHR) -> Self {
        self.create_flags = flags;
        self
    }

    /// Transform applied before presentation. Empty means the surface's
    /// current transform.
    pub fn pre_transform(mut self, transform: vk::SurfaceTransformFlagsKHR) -> Self {
        self.pre_transform = transform;
        self
    }

    pub fn composite_alpha(mut self, alpha: vk::CompositeAlphaFlagsKHR) -> Self {
        self.composite_alpha = alpha;
        self
    }

    /// Swapchain being replaced.
    pub fn old_swapchain(mut self, old: vk::SwapchainKHR) -> Self {
        self.old_swapchain = old;
        self
    }

    /// Use these graphics and present families instead of looking them up.
    pub fn queue_family_indices(mut self, graphics: u32, present: u32) -> Self {
        self.queue_family_indices = Some((graphics, present));
        self
    }

    pub fn allocation_callbacks(
        mut self,
        callbacks: &'static vk::AllocationCallbacks<'static>,
    ) -> Self {
        self.allocation_callbacks = Some(callbacks);
        self
    }

    fn resolve_queue_families(&self) -> Result<(u32, u32), QueueError> {
        if let Some(indices) = self.queue_family_indices {
            return Ok(indices);
        }

        let graphics = self.device.get_queue_index(QueueType::Graphics)?;
        let present = queue::present_queue_index_for_surface(
            self.device.surface_fn(),
            self.device.physical_device(),
            self.surface,
            self.device.queue_families(),
        )
        .ok_or(QueueError::PresentUnavailable)?;
        Ok((graphics, present))
    }

    /// Create the swapchain.
    pub fn build(&self) -> Result<Swapchain, SwapchainError> {
        if self.surface == vk::SurfaceKHR::null() {
            return Err(SwapchainError::SurfaceHandleNotProvided);
        }

        let desired_formats = if self.desired_formats.is_empty() {
            DEFAULT_FORMATS.to_vec()
        } else {
            self.desired_formats.clone()
        };
        let desired_present_modes = if self.desired_present_modes.is_empty() {
            DEFAULT_PRESENT_MODES.to_vec()
        } else {
            self.desired_present_modes.clone()
        };

        // SAFETY: the surface and physical device belong to the device's instance.
        let details = unsafe {
            surface::query_surface_support_details(
                self.device.surface_fn(),
                self.device.physical_device(),
                self.surface,
            )
        }?;
        let caps = &details.capabilities;

        let image_count = image_count(caps);
        let surface_format = find_surface_format(&details.formats, &desired_formats);
        let present_mode = find_present_mode(&details.present_modes, &desired_present_modes);
        let extent = find_extent(caps, self.desired_width, self.desired_height);
        let image_array_layers = array_layers(caps, self.array_layer_count);
        let pre_transform = if self.pre_transform.is_empty() {
            caps.current_transform
        } else {
            self.pre_transform
        };

        let (graphics, present) = self.resolve_queue_families()?;
        let (sharing, family_indices) = sharing_mode(graphics, present);

        tracing::debug!(
            "Negotiated swapchain: {:?} {:?}, {:?}, {}x{}, {} images, {} layers",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count,
            image_array_layers
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .flags(self.create_flags)
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(image_array_layers)
            .image_usage(self.image_usage)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(pre_transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(present_mode)
            .clipped(self.clipped)
            .old_swapchain(self.old_swapchain);

        let loader = ash::khr::swapchain::Device::new(self.device.instance(), self.device.raw());

        // SAFETY: every handle in create_info is live and owned by this device.
        let handle = unsafe { loader.create_swapchain(&create_info, self.allocation_callbacks) }
            .map_err(SwapchainError::FailedCreateSwapchain)?;

        // SAFETY: handle was just created.
        let images = match unsafe { loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                // SAFETY: the swapchain has no outstanding images.
                unsafe { loader.destroy_swapchain(handle, self.allocation_callbacks) };
                return Err(SwapchainError::FailedGetSwapchainImages(e));
            }
        };

        tracing::info!(
            "Created swapchain: {}x{} {:?} {:?} ({} images)",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len()
        );

        Ok(Swapchain {
            handle,
            device: self.device.raw().clone(),
            loader,
            image_format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode,
            extent,
            image_count: images.len() as u32,
            image_usage: self.image_usage,
            allocation_callbacks: self.allocation_callbacks,
        })
    }

    /// Create a swapchain replacing `old`.
    ///
    /// `old` is retired but not destroyed.
    pub fn recreate(&self, old: &Swapchain) -> Result<Swapchain, SwapchainError> {
        self.clone().old_swapchain(old.handle()).build()
    }
}

/// A created swapchain.
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    pub image_format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub image_usage: vk::ImageUsageFlags,
    allocation_callbacks: Option<&'static vk::AllocationCallbacks<'static>>,
}

impl Swapchain {
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Swapchain extension function table.
    pub fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.loader
    }

    /// Presentable images, in swapchain order.
    pub fn get_images(&self) -> Result<Vec<vk::Image>, SwapchainError> {
        // SAFETY: the swapchain is live.
        unsafe { self.loader.get_swapchain_images(self.handle) }
            .map_err(SwapchainError::FailedGetSwapchainImages)
    }

    /// Create one 2D color view per image.
    ///
    /// Stops at the first failure; views created before it are not
    /// destroyed.
    pub fn get_image_views(&self) -> Result<Vec<vk::ImageView>, SwapchainError> {
        let images = self.get_images()?;

        images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.image_format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                // SAFETY: image belongs to this swapchain's device.
                unsafe {
                    self.device
                        .create_image_view(&view_info, self.allocation_callbacks)
                }
                .map_err(SwapchainError::FailedCreateSwapchainImageViews)
            })
            .collect()
    }

    /// Destroy image views created by [`Self::get_image_views`].
    ///
    /// # Safety
    /// The views must not be in use.
    pub unsafe fn destroy_image_views(&self, views: &[vk::ImageView]) {
        for &view in views {
            self.device
                .destroy_image_view(view, self.allocation_callbacks);
        }
    }

    /// Destroy the swapchain.
    ///
    /// # Safety
    /// Its image views must be destroyed and its images not in use.
    pub unsafe fn destroy(self) {
        self.loader
            .destroy_swapchain(self.handle, self.allocation_callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            max_image_array_layers: 1,
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_earliest_desired_match() {
        let available = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            find_surface_format(&available, &DEFAULT_FORMATS),
            DEFAULT_FORMATS[0]
        );
    }

    #[test]
    fn format_requires_matching_color_space() {
        let available = [
            format(
                vk::Format::R16G16B16A16_SFLOAT,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
            format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            ),
        ];
        let desired = [format(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        assert_eq!(find_surface_format(&available, &desired), available[0]);
    }

    #[test]
    fn format_falls_back_to_first_available() {
        let desired = [format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let available = [
            format(vk::Format::R5G6B5_UNORM_PACK16, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
        ];
        let chosen = find_surface_format(&available, &desired);
        assert_eq!(chosen, available[0]);
        assert!(available.contains(&chosen));
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(
            find_present_mode(&available, &[vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::FIFO
        );

        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            find_present_mode(&available, &DEFAULT_PRESENT_MODES),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn extent_is_clamped() {
        let caps = capabilities((100, 100), (1920, 1080));
        for &(w, h) in &[(0, 0), (50, 5000), (800, 600), (4000, 4000), (u32::MAX, 1)] {
            let extent = find_extent(&caps, w, h);
            assert!((100..=1920).contains(&extent.width));
            assert!((100..=1080).contains(&extent.height));
        }
        assert_eq!(
            find_extent(&caps, 800, 600),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn fixed_current_extent_wins() {
        let mut caps = capabilities((1, 1), (4096, 4096));
        caps.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(find_extent(&caps, 300, 300), caps.current_extent);
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut caps = capabilities((1, 1), (1, 1));
        assert_eq!(image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(image_count(&caps), 2);
    }

    #[test]
    fn array_layers_are_clamped() {
        let mut caps = capabilities((1, 1), (1, 1));
        assert_eq!(array_layers(&caps, 4), 1);
        assert_eq!(array_layers(&caps, 0), 1);

        caps.max_image_array_layers = 6;
        assert_eq!(array_layers(&caps, 4), 4);
    }

    #[test]
    fn sharing_follows_queue_families() {
        assert_eq!(sharing_mode(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(
            sharing_mode(0, 2),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }
}
