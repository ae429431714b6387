//! Probe configuration and command-line parsing.

use anyhow::{bail, Context};
use ash::vk;

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Window title and application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Skip the window and swapchain.
    pub headless: bool,
    /// Enable validation layers and the debug messenger (default: debug builds only).
    pub validation: bool,
    /// Preferred device type.
    pub prefer: vk::PhysicalDeviceType,
    /// Prefer FIFO presentation.
    pub vsync: bool,
    /// Print help and exit.
    pub help: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            title: "Ignition Probe".to_string(),
            width: 1280,
            height: 720,
            headless: false,
            validation: cfg!(debug_assertions),
            prefer: vk::PhysicalDeviceType::DISCRETE_GPU,
            vsync: false,
            help: false,
        }
    }
}

impl ProbeConfig {
    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_preferred_device_type(mut self, prefer: vk::PhysicalDeviceType) -> Self {
        self.prefer = prefer;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Parse command-line arguments, not including the program name.
    pub fn from_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => config.help = true,
                "--headless" => config = config.with_headless(true),
                "--validation" => config = config.with_validation(true),
                "--no-validation" => config = config.with_validation(false),
                "--vsync" => config = config.with_vsync(true),
                "--size" => {
                    let value = args.next().context("--size needs a value like 1280x720")?;
                    let (width, height) = parse_size(&value)?;
                    config = config.with_size(width, height);
                }
                "--prefer" => {
                    let value = args.next().context("--prefer needs a device type")?;
                    config = config.with_preferred_device_type(parse_device_type(&value)?);
                }
                other => bail!("Unknown argument: {other}"),
            }
        }

        Ok(config)
    }
}

fn parse_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("Invalid size {value:?}, expected WIDTHxHEIGHT"))?;
    let width = width
        .parse()
        .with_context(|| format!("Invalid width in {value:?}"))?;
    let height = height
        .parse()
        .with_context(|| format!("Invalid height in {value:?}"))?;
    Ok((width, height))
}

fn parse_device_type(value: &str) -> anyhow::Result<vk::PhysicalDeviceType> {
    Ok(match value {
        "discrete" => vk::PhysicalDeviceType::DISCRETE_GPU,
        "integrated" => vk::PhysicalDeviceType::INTEGRATED_GPU,
        "virtual" => vk::PhysicalDeviceType::VIRTUAL_GPU,
        "cpu" => vk::PhysicalDeviceType::CPU,
        "other" => vk::PhysicalDeviceType::OTHER,
        _ => bail!("Unknown device type {value:?} (discrete, integrated, virtual, cpu, other)"),
    })
}
