//! Negotiation pipeline: instance, device selection, device, swapchain.

use anyhow::Context;
use ash::vk;
use ignition_gpu::{
    surface, Device, DeviceBuilder, Instance, InstanceBuilder, PhysicalDeviceSelection,
    PhysicalDeviceSelector, QueueType, Swapchain, SwapchainBuilder,
};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use crate::config::ProbeConfig;

fn build_instance(config: &ProbeConfig) -> anyhow::Result<Instance> {
    let mut builder = InstanceBuilder::new()
        .app_name(config.title.as_str())
        .engine_name("Ignition")
        .desire_api_version(vk::API_VERSION_1_3)
        .headless(config.headless)
        .request_validation_layers(config.validation);
    if config.validation {
        builder = builder.use_default_debug_messenger();
    }

    let caps = builder.system_capabilities()?;
    info!(
        "Vulkan loader: {} layers, {} instance extensions, validation {}",
        caps.available_layers.len(),
        caps.available_extensions.len(),
        if caps.validation_layers_available {
            "available"
        } else {
            "unavailable"
        }
    );

    Ok(builder.build()?)
}

fn select_device(
    config: &ProbeConfig,
    instance: &Instance,
    surface: vk::SurfaceKHR,
) -> anyhow::Result<PhysicalDeviceSelection> {
    let selector = PhysicalDeviceSelector::new(instance)
        .surface(surface)
        .prefer_gpu_device_type(config.prefer);

    for (desc, rating) in selector.describe_all()? {
        info!("Candidate: {} -> {:?}", desc.summary(), rating);
    }

    let selection = selector.select()?;
    info!(
        "Queues: compute dedicated {} separate {}, transfer dedicated {} separate {}",
        selection.has_dedicated_compute_queue(),
        selection.has_separate_compute_queue(),
        selection.has_dedicated_transfer_queue(),
        selection.has_separate_transfer_queue()
    );
    Ok(selection)
}

fn report_queues(device: &Device) {
    for queue_type in [
        QueueType::Graphics,
        QueueType::Present,
        QueueType::Compute,
        QueueType::Transfer,
    ] {
        match device.get_queue_index(queue_type) {
            Ok(index) => info!("{queue_type:?} queue family: {index}"),
            Err(e) => info!("{queue_type:?} queue family: {e}"),
        }
    }
}

/// Run the pipeline without a window.
pub fn run_headless(config: &ProbeConfig) -> anyhow::Result<()> {
    let instance = build_instance(config)?;
    let selection = select_device(config, &instance, vk::SurfaceKHR::null())?;
    let device = DeviceBuilder::new(&instance, &selection).build()?;
    report_queues(&device);

    // SAFETY: nothing was created from the device.
    unsafe {
        device.destroy();
        instance.destroy();
    }
    Ok(())
}

/// Run the pipeline against a window until it is closed.
pub fn run_windowed(config: ProbeConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new()?;
    let mut probe = Probe {
        config,
        state: None,
        error: None,
    };

    event_loop.run_app(&mut probe)?;

    match probe.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct Probe {
    config: ProbeConfig,
    state: Option<ProbeState>,
    error: Option<anyhow::Error>,
}

struct ProbeState {
    swapchain: Swapchain,
    image_views: Vec<vk::ImageView>,
    device: Device,
    surface: vk::SurfaceKHR,
    instance: Instance,
    window: Window,
}

impl ProbeState {
    fn new(config: &ProbeConfig, window: Window) -> anyhow::Result<Self> {
        let instance = build_instance(config)?;
        // SAFETY: the window outlives the surface; both are owned by this state.
        let surface = match unsafe { surface::create_surface(&instance, &window) } {
            Ok(surface) => surface,
            Err(e) => {
                // SAFETY: nothing was created from the instance.
                unsafe { instance.destroy() };
                return Err(e.into());
            }
        };

        match Self::create_device(config, &instance, surface, window.inner_size()) {
            Ok((device, swapchain, image_views)) => Ok(Self {
                swapchain,
                image_views,
                device,
                surface,
                instance,
                window,
            }),
            Err(e) => {
                // SAFETY: no device or swapchain is left alive on failure.
                unsafe {
                    surface::destroy_surface(&instance, surface);
                    instance.destroy();
                }
                Err(e)
            }
        }
    }

    /// Select a device and create it with its swapchain. Nothing created
    /// here outlives an error.
    fn create_device(
        config: &ProbeConfig,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        size: PhysicalSize<u32>,
    ) -> anyhow::Result<(Device, Swapchain, Vec<vk::ImageView>)> {
        let selection = select_device(config, instance, surface)?;
        let device = DeviceBuilder::new(instance, &selection).build()?;
        report_queues(&device);

        let chain = swapchain_builder(config, &device, size)
            .build()
            .map_err(anyhow::Error::from)
            .and_then(|swapchain| match swapchain.get_image_views() {
                Ok(image_views) => Ok((swapchain, image_views)),
                Err(e) => {
                    // SAFETY: no image of the swapchain is in use.
                    unsafe { swapchain.destroy() };
                    Err(e).context("Failed to create swapchain image views")
                }
            });

        match chain {
            Ok((swapchain, image_views)) => Ok((device, swapchain, image_views)),
            Err(e) => {
                // SAFETY: nothing created from the device is still alive.
                unsafe { device.destroy() };
                Err(e)
            }
        }
    }

    fn resize(&mut self, config: &ProbeConfig, size: PhysicalSize<u32>) -> anyhow::Result<()> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        // SAFETY: the device is idle, so no view or image is in use.
        unsafe {
            self.device.raw().device_wait_idle()?;
            self.swapchain.destroy_image_views(&self.image_views);
        }
        self.image_views.clear();

        let swapchain = swapchain_builder(config, &self.device, size).recreate(&self.swapchain)?;
        let old = std::mem::replace(&mut self.swapchain, swapchain);
        // SAFETY: the old swapchain was retired by the recreate call.
        unsafe { old.destroy() };

        self.image_views = self.swapchain.get_image_views()?;
        Ok(())
    }

    fn destroy(self) {
        // SAFETY: destroyed in dependency order after the device is idle.
        unsafe {
            if let Err(e) = self.device.raw().device_wait_idle() {
                warn!("Device wait failed during shutdown: {e}");
            }
            self.swapchain.destroy_image_views(&self.image_views);
            self.swapchain.destroy();
            self.device.destroy();
            surface::destroy_surface(&self.instance, self.surface);
            self.instance.destroy();
        }
        drop(self.window);
    }
}

fn swapchain_builder<'a>(
    config: &ProbeConfig,
    device: &'a Device,
    size: PhysicalSize<u32>,
) -> SwapchainBuilder<'a> {
    let builder = SwapchainBuilder::new(device)
        .desired_extent(size.width, size.height)
        .add_image_usage_flags(vk::ImageUsageFlags::TRANSFER_DST);
    if config.vsync {
        builder.desired_present_mode(vk::PresentModeKHR::FIFO)
    } else {
        builder.use_default_present_mode_selection()
    }
}

impl ApplicationHandler for Probe {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let result = event_loop
            .create_window(window_attrs)
            .map_err(anyhow::Error::from)
            .and_then(|window| ProbeState::new(&self.config, window));

        match result {
            Ok(state) => {
                info!(
                    "Swapchain ready: {}x{} {:?} {:?}, {} images",
                    state.swapchain.extent.width,
                    state.swapchain.extent.height,
                    state.swapchain.image_format,
                    state.swapchain.present_mode,
                    state.swapchain.image_count
                );
                self.state = Some(state);
            }
            Err(e) => {
                error!("Failed to initialize probe: {e:#}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(state) = self.state.take() {
                    state.destroy();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    match state.resize(&self.config, size) {
                        Ok(()) => info!(
                            "Swapchain recreated: {}x{}",
                            state.swapchain.extent.width, state.swapchain.extent.height
                        ),
                        Err(e) => {
                            error!("Resize error: {e:#}");
                            self.error = Some(e);
                            event_loop.exit();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.destroy();
        }
    }
}
