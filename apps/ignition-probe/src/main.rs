//! Ignition Probe
//!
//! Negotiates a Vulkan instance, physical device, logical device and (unless
//! headless) a swapchain for a window, logging every decision.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ignition-probe -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--headless`: Skip the window, surface and swapchain
//! - `--validation`: Enable validation layers and the debug messenger
//! - `--no-validation`: Disable validation layers (default in release builds)
//! - `--size <WxH>`: Window size (default: 1280x720)
//! - `--prefer <TYPE>`: Preferred device type (default: discrete)
//! - `--vsync`: Prefer FIFO presentation
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod config;
mod probe;

use tracing_subscriber::EnvFilter;

use crate::config::ProbeConfig;

fn main() -> anyhow::Result<()> {
    let config = ProbeConfig::from_args(std::env::args().skip(1))?;
    if config.help {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("{} starting...", config.title);

    if config.headless {
        probe::run_headless(&config)
    } else {
        probe::run_windowed(config)
    }
}

fn print_help() {
    eprintln!(
        "Ignition Probe - Vulkan capability negotiation

USAGE:
    cargo run -p ignition-probe -- [OPTIONS]

OPTIONS:
    --headless              Skip the window, surface and swapchain
    --validation            Enable validation layers and the debug messenger
    --no-validation         Disable validation layers (default in release builds)
    --size <WxH>            Window size (default: 1280x720)
    --prefer <TYPE>         Preferred device type: discrete, integrated,
                            virtual, cpu, other (default: discrete)
    --vsync                 Prefer FIFO presentation
    -h, --help              Print this help message

EXAMPLES:
    # Probe without a window
    cargo run -p ignition-probe -- --headless

    # Prefer an integrated GPU with validation
    cargo run -p ignition-probe -- --prefer integrated --validation

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
