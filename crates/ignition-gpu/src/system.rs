//! Globally available layers and instance extensions.

use crate::error::InstanceError;
use crate::loader;
use std::ffi::{CStr, CString};

/// The standard Khronos validation layer.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Snapshot of the layers and instance extensions the platform exposes.
#[derive(Debug, Clone, Default)]
pub struct SystemCapabilities {
    /// Available layer names, in enumeration order.
    pub available_layers: Vec<CString>,
    /// Available instance extension names, in enumeration order.
    pub available_extensions: Vec<CString>,
    /// The Khronos validation layer is available.
    pub validation_layers_available: bool,
    /// `VK_EXT_debug_utils` is available globally or from some layer.
    pub debug_utils_available: bool,
}

impl SystemCapabilities {
    /// Query the platform. Fails only if the loader cannot be opened.
    ///
    /// A failed layer or extension enumeration yields an empty list.
    pub fn query() -> Result<Self, InstanceError> {
        let entry = loader::global_functions().ok_or(InstanceError::VulkanUnavailable)?;
        Ok(Self::query_with(entry))
    }

    pub(crate) fn query_with(entry: &ash::Entry) -> Self {
        // SAFETY: the entry table was resolved by the loader cache.
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let extensions =
            unsafe { entry.enumerate_instance_extension_properties(None) }.unwrap_or_default();

        let layer_names: Vec<CString> = layers
            .iter()
            // SAFETY: Vulkan guarantees layer_name is NUL-terminated.
            .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) }.to_owned())
            .collect();
        let extension_names: Vec<CString> = extensions
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_owned())
            .collect();

        let debug_utils_in_layer = layer_names.iter().any(|layer| {
            unsafe { entry.enumerate_instance_extension_properties(Some(layer.as_c_str())) }
                .map(|exts| {
                    exts.iter().any(|e| {
                        let name = unsafe { CStr::from_ptr(e.extension_name.as_ptr()) };
                        name == ash::ext::debug_utils::NAME
                    })
                })
                .unwrap_or(false)
        });

        let caps = Self::from_parts(layer_names, extension_names, debug_utils_in_layer);
        tracing::debug!(
            "System exposes {} layers, {} instance extensions",
            caps.available_layers.len(),
            caps.available_extensions.len()
        );
        caps
    }

    /// Build a snapshot from already-known names.
    pub fn from_parts(
        available_layers: Vec<CString>,
        available_extensions: Vec<CString>,
        debug_utils_in_layer: bool,
    ) -> Self {
        let validation_layers_available = available_layers
            .iter()
            .any(|l| l.as_c_str() == VALIDATION_LAYER_NAME);
        let debug_utils_available = debug_utils_in_layer
            || available_extensions
                .iter()
                .any(|e| e.as_c_str() == ash::ext::debug_utils::NAME);

        Self {
            available_layers,
            available_extensions,
            validation_layers_available,
            debug_utils_available,
        }
    }

    /// Returns true if a layer is available.
    pub fn is_layer_available(&self, layer_name: &CStr) -> bool {
        self.available_layers.iter().any(|l| l.as_c_str() == layer_name)
    }

    /// Returns true if an instance extension is available.
    pub fn is_extension_available(&self, extension_name: &CStr) -> bool {
        self.available_extensions
            .iter()
            .any(|e| e.as_c_str() == extension_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_flags() {
        let caps = SystemCapabilities::from_parts(
            vec![VALIDATION_LAYER_NAME.to_owned()],
            vec![c"VK_KHR_surface".to_owned()],
            false,
        );
        assert!(caps.validation_layers_available);
        assert!(!caps.debug_utils_available);
        assert!(caps.is_extension_available(c"VK_KHR_surface"));
        assert!(!caps.is_layer_available(c"VK_LAYER_LUNARG_api_dump"));

        let caps = SystemCapabilities::from_parts(vec![], vec![], true);
        assert!(caps.debug_utils_available);
        assert!(!caps.validation_layers_available);
    }
}
