//! Process-wide cache of Vulkan entry points.
//!
//! The loader library is opened at most once per process. Initialization runs
//! under a mutex; after that the cached table is read without locking.

use ash::vk;
use parking_lot::{const_mutex, Mutex};
use std::sync::OnceLock;

/// Shared library names probed in order when no external loader is supplied.
#[cfg(any(target_os = "macos", target_os = "ios"))]
const LIBRARY_NAMES: &[&str] = &[
    "libvulkan.dylib",
    "libvulkan.1.dylib",
    "libMoltenVK.dylib",
];
#[cfg(windows)]
const LIBRARY_NAMES: &[&str] = &["vulkan-1.dll"];
#[cfg(not(any(target_os = "macos", target_os = "ios", windows)))]
const LIBRARY_NAMES: &[&str] = &["libvulkan.so.1", "libvulkan.so"];

/// A value initialized at most once, guarded by a mutex during initialization.
///
/// Unlike a bare `OnceLock`, a failed initialization is not cached and the
/// next caller retries.
pub struct LoaderCell<T> {
    init_lock: Mutex<()>,
    value: OnceLock<T>,
}

impl<T> LoaderCell<T> {
    pub const fn new() -> Self {
        Self {
            init_lock: const_mutex(()),
            value: OnceLock::new(),
        }
    }

    /// The initialized value, without locking.
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Return the cached value, running `init` under the lock if absent.
    pub fn get_or_try_init(&self, init: impl FnOnce() -> Option<T>) -> Option<&T> {
        if let Some(value) = self.value.get() {
            return Some(value);
        }

        let _guard = self.init_lock.lock();
        // Another thread may have won the race while we waited.
        if let Some(value) = self.value.get() {
            return Some(value);
        }

        let value = init()?;
        Some(self.value.get_or_init(|| value))
    }
}

impl<T> Default for LoaderCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

static ENTRY: LoaderCell<ash::Entry> = LoaderCell::new();

/// Load the global function table.
///
/// With `get_instance_proc_addr` supplied, that pointer is trusted and no
/// library is opened. Otherwise the platform library names are probed in
/// order. Returns `false` if no library could be opened or it does not export
/// `vkGetInstanceProcAddr`.
///
/// The first successful initialization wins; later calls return `true`
/// without replacing the table.
pub fn initialize(get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>) -> bool {
    ENTRY
        .get_or_try_init(|| match get_instance_proc_addr {
            Some(fp) => {
                tracing::debug!("Using externally supplied vkGetInstanceProcAddr");
                // SAFETY: the caller vouches for the supplied entry point.
                Some(unsafe {
                    ash::Entry::from_static_fn(ash::StaticFn {
                        get_instance_proc_addr: fp,
                    })
                })
            }
            None => open_library(),
        })
        .is_some()
}

fn open_library() -> Option<ash::Entry> {
    for name in LIBRARY_NAMES {
        // SAFETY: loading the Vulkan loader runs its initialization routines,
        // which is the intended use of these libraries.
        match unsafe { ash::Entry::load_from(name) } {
            Ok(entry) => {
                tracing::debug!("Loaded Vulkan library {}", name);
                return Some(entry);
            }
            Err(e) => tracing::debug!("Could not load {}: {}", name, e),
        }
    }
    None
}

/// The global (pre-instance) function table.
///
/// Initializes from the platform library on first use.
pub fn global_functions() -> Option<&'static ash::Entry> {
    if let Some(entry) = ENTRY.get() {
        return Some(entry);
    }
    initialize(None);
    ENTRY.get()
}

/// Instance-level function tables for one instance handle.
#[derive(Clone)]
pub struct InstanceFunctions {
    pub core: ash::Instance,
    pub surface: ash::khr::surface::Instance,
    pub debug_utils: ash::ext::debug_utils::Instance,
}

/// Resolve instance-level entry points for `instance`.
///
/// Returns `None` if the global table was never initialized. Safe to call
/// repeatedly; each call resolves the same pointers.
///
/// # Safety
/// `instance` must be a valid instance created through [`global_functions`].
pub unsafe fn resolve_instance_functions(instance: vk::Instance) -> Option<InstanceFunctions> {
    let entry = ENTRY.get()?;
    let core = ash::Instance::load(entry.static_fn(), instance);
    let surface = ash::khr::surface::Instance::new(entry, &core);
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, &core);
    Some(InstanceFunctions {
        core,
        surface,
        debug_utils,
    })
}
