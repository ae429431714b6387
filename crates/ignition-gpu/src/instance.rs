//! Vulkan instance creation.

use crate::debug;
use crate::error::InstanceError;
use crate::loader::{self, InstanceFunctions};
use crate::system::{SystemCapabilities, VALIDATION_LAYER_NAME};
use ash::vk;
use std::ffi::{c_char, CStr, CString};

/// Platform surface extensions, at least one of which must be present for
/// a windowed instance.
#[cfg(windows)]
const WINDOWING_EXTENSIONS: &[&CStr] = &[ash::khr::win32_surface::NAME];
#[cfg(target_os = "android")]
const WINDOWING_EXTENSIONS: &[&CStr] = &[ash::khr::android_surface::NAME];
#[cfg(any(target_os = "macos", target_os = "ios"))]
const WINDOWING_EXTENSIONS: &[&CStr] = &[ash::ext::metal_surface::NAME];
#[cfg(all(
    unix,
    not(any(target_os = "android", target_os = "macos", target_os = "ios"))
))]
const WINDOWING_EXTENSIONS: &[&CStr] = &[
    ash::khr::xcb_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::wayland_surface::NAME,
];
#[cfg(not(any(unix, windows)))]
const WINDOWING_EXTENSIONS: &[&CStr] = &[];

const USES_PORTABILITY_ENUMERATION: bool = cfg!(any(target_os = "macos", target_os = "ios"));

/// Resolve the API version to request.
///
/// `platform_version` is only called when a version above 1.0 was asked for.
/// It returns `None` if the platform cannot report its version.
pub fn resolve_api_version(
    required: u32,
    desired: u32,
    platform_version: impl FnOnce() -> Option<u32>,
) -> Result<u32, InstanceError> {
    let baseline = vk::API_VERSION_1_0;
    if required <= baseline && desired <= baseline {
        return Ok(baseline);
    }

    let required_set = required > baseline;
    let Some(platform) = platform_version() else {
        return if required_set {
            Err(version_unavailable(required))
        } else {
            Ok(baseline)
        };
    };

    if required_set && platform < required {
        return Err(version_unavailable(required));
    }

    if required_set {
        Ok(required)
    } else {
        Ok(desired.min(platform))
    }
}

fn version_unavailable(required: u32) -> InstanceError {
    match vk::api_version_minor(required) {
        0 => InstanceError::VulkanVersionUnavailable,
        1 => InstanceError::VulkanVersion11Unavailable,
        _ => InstanceError::VulkanVersion12Unavailable,
    }
}

fn push_unique(list: &mut Vec<CString>, name: &CStr) {
    if !list.iter().any(|n| n.as_c_str() == name) {
        list.push(name.to_owned());
    }
}

/// Assemble the instance extension list and check it against the platform.
pub fn assemble_extensions(
    requested: &[CString],
    debug_messenger: bool,
    headless: bool,
    caps: &SystemCapabilities,
    windowing: &[&CStr],
) -> Result<Vec<CString>, InstanceError> {
    let mut extensions = requested.to_vec();

    if debug_messenger && caps.debug_utils_available {
        push_unique(&mut extensions, ash::ext::debug_utils::NAME);
    }

    if !headless {
        let surface_added = caps.is_extension_available(ash::khr::surface::NAME);
        if surface_added {
            push_unique(&mut extensions, ash::khr::surface::NAME);
        }

        let mut protocol_added = false;
        for &ext in windowing {
            if caps.is_extension_available(ext) {
                push_unique(&mut extensions, ext);
                protocol_added = true;
            }
        }

        if !surface_added || !protocol_added {
            return Err(InstanceError::WindowingExtensionsNotPresent);
        }
    }

    let available = |name: &CStr| {
        caps.is_extension_available(name)
            || (name == ash::ext::debug_utils::NAME && caps.debug_utils_available)
    };
    if let Some(missing) = extensions.iter().find(|ext| !available(ext.as_c_str())) {
        tracing::debug!("Instance extension {:?} not available", missing);
        return Err(InstanceError::RequestedExtensionsNotPresent);
    }

    Ok(extensions)
}

/// Assemble the layer list and check it against the platform.
pub fn assemble_layers(
    requested: &[CString],
    enable_validation: bool,
    request_validation: bool,
    caps: &SystemCapabilities,
) -> Result<Vec<CString>, InstanceError> {
    let mut layers = requested.to_vec();

    if enable_validation || (request_validation && caps.validation_layers_available) {
        push_unique(&mut layers, VALIDATION_LAYER_NAME);
    } else if request_validation {
        tracing::warn!("Validation layers requested but not available");
    }

    if let Some(missing) = layers.iter().find(|l| !caps.is_layer_available(l.as_c_str())) {
        tracing::debug!("Layer {:?} not available", missing);
        return Err(InstanceError::RequestedLayersNotPresent);
    }

    Ok(layers)
}

/// Builder for [`Instance`].
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    app_name: String,
    engine_name: String,
    application_version: u32,
    engine_version: u32,
    required_api_version: u32,
    desired_api_version: u32,
    layers: Vec<CString>,
    extensions: Vec<CString>,
    headless: bool,
    enable_validation_layers: bool,
    request_validation_layers: bool,
    use_debug_messenger: bool,
    debug_callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
    debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    debug_message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    disabled_validation_checks: Vec<vk::ValidationCheckEXT>,
    enabled_validation_features: Vec<vk::ValidationFeatureEnableEXT>,
    disabled_validation_features: Vec<vk::ValidationFeatureDisableEXT>,
    allocation_callbacks: Option<&'static vk::AllocationCallbacks<'static>>,
    external_loader: Option<vk::PFN_vkGetInstanceProcAddr>,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            engine_name: String::new(),
            application_version: 0,
            engine_version: 0,
            required_api_version: vk::API_VERSION_1_0,
            desired_api_version: vk::API_VERSION_1_0,
            layers: Vec::new(),
            extensions: Vec::new(),
            headless: false,
            enable_validation_layers: false,
            request_validation_layers: false,
            use_debug_messenger: false,
            debug_callback: Some(debug::default_debug_callback),
            debug_message_severity: debug::DEFAULT_MESSAGE_SEVERITY,
            debug_message_type: debug::DEFAULT_MESSAGE_TYPE,
            disabled_validation_checks: Vec::new(),
            enabled_validation_features: Vec::new(),
            disabled_validation_features: Vec::new(),
            allocation_callbacks: None,
            external_loader: None,
        }
    }
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = name.into();
        self
    }

    /// Application version, as packed by `vk::make_api_version`.
    pub fn app_version(mut self, version: u32) -> Self {
        self.application_version = version;
        self
    }

    pub fn engine_version(mut self, version: u32) -> Self {
        self.engine_version = version;
        self
    }

    /// Fail if the platform does not support at least this API version.
    pub fn require_api_version(mut self, version: u32) -> Self {
        self.required_api_version = version;
        self
    }

    /// Use this API version if the platform supports it.
    pub fn desire_api_version(mut self, version: u32) -> Self {
        self.desired_api_version = version;
        self
    }

    pub fn enable_layer(mut self, layer: &CStr) -> Self {
        self.layers.push(layer.to_owned());
        self
    }

    pub fn enable_extension(mut self, extension: &CStr) -> Self {
        self.extensions.push(extension.to_owned());
        self
    }

    pub fn enable_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a CStr>) -> Self {
        self.extensions
            .extend(extensions.into_iter().map(CStr::to_owned));
        self
    }

    /// Skip windowing extensions; devices are not required to present.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Enable the validation layer; fail if it is not available.
    pub fn enable_validation_layers(mut self, enable: bool) -> Self {
        self.enable_validation_layers = enable;
        self
    }

    /// Enable the validation layer only if it is available.
    pub fn request_validation_layers(mut self, request: bool) -> Self {
        self.request_validation_layers = request;
        self
    }

    /// Create a debug messenger with the default callback.
    pub fn use_default_debug_messenger(mut self) -> Self {
        self.use_debug_messenger = true;
        self.debug_callback = Some(debug::default_debug_callback);
        self
    }

    /// Create a debug messenger with a custom callback.
    pub fn debug_callback(mut self, callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT) -> Self {
        self.use_debug_messenger = true;
        self.debug_callback = callback;
        self
    }

    pub fn debug_messenger_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.debug_message_severity = severity;
        self
    }

    pub fn add_debug_messenger_severity(
        mut self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Self {
        self.debug_message_severity |= severity;
        self
    }

    pub fn debug_messenger_type(mut self, message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        self.debug_message_type = message_type;
        self
    }

    pub fn add_debug_messenger_type(
        mut self,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> Self {
        self.debug_message_type |= message_type;
        self
    }

    /// Disable a validation check.
    pub fn add_validation_disable(mut self, check: vk::ValidationCheckEXT) -> Self {
        self.disabled_validation_checks.push(check);
        self
    }

    pub fn add_validation_feature_enable(
        mut self,
        feature: vk::ValidationFeatureEnableEXT,
    ) -> Self {
        self.enabled_validation_features.push(feature);
        self
    }

    pub fn add_validation_feature_disable(
        mut self,
        feature: vk::ValidationFeatureDisableEXT,
    ) -> Self {
        self.disabled_validation_features.push(feature);
        self
    }

    pub fn allocation_callbacks(
        mut self,
        callbacks: &'static vk::AllocationCallbacks<'static>,
    ) -> Self {
        self.allocation_callbacks = Some(callbacks);
        self
    }

    /// Load the API through a caller-supplied `vkGetInstanceProcAddr`
    /// instead of opening the platform library.
    pub fn external_loader(
        mut self,
        get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    ) -> Self {
        self.external_loader = Some(get_instance_proc_addr);
        self
    }

    /// Layers and extensions the platform exposes.
    pub fn system_capabilities(&self) -> Result<SystemCapabilities, InstanceError> {
        if let Some(loader_fn) = self.external_loader {
            loader::initialize(Some(loader_fn));
        }
        SystemCapabilities::query()
    }

    fn messenger_create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(self.debug_message_severity)
            .message_type(self.debug_message_type)
            .pfn_user_callback(self.debug_callback)
    }

    /// Create the instance.
    pub fn build(&self) -> Result<Instance, InstanceError> {
        let caps = self.system_capabilities()?;
        let entry = loader::global_functions().ok_or(InstanceError::VulkanUnavailable)?;

        let api_version = resolve_api_version(
            self.required_api_version,
            self.desired_api_version,
            || {
                // SAFETY: the entry table is loaded.
                match unsafe { entry.try_enumerate_instance_version() } {
                    Ok(Some(version)) => Some(version),
                    Ok(None) => Some(vk::API_VERSION_1_0),
                    Err(_) => None,
                }
            },
        )?;

        if self.use_debug_messenger && !caps.debug_utils_available {
            tracing::warn!("Debug messenger requested but VK_EXT_debug_utils is not available");
        }

        let mut extensions = assemble_extensions(
            &self.extensions,
            self.use_debug_messenger,
            self.headless,
            &caps,
            WINDOWING_EXTENSIONS,
        )?;
        let layers = assemble_layers(
            &self.layers,
            self.enable_validation_layers,
            self.request_validation_layers,
            &caps,
        )?;

        let mut flags = vk::InstanceCreateFlags::empty();
        if USES_PORTABILITY_ENUMERATION
            && caps.is_extension_available(ash::khr::portability_enumeration::NAME)
        {
            push_unique(&mut extensions, ash::khr::portability_enumeration::NAME);
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let debug_utils_enabled = extensions
            .iter()
            .any(|e| e.as_c_str() == ash::ext::debug_utils::NAME);

        let app_name = CString::new(self.app_name.as_str()).unwrap_or_default();
        let engine_name = CString::new(self.engine_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(self.application_version)
            .engine_name(&engine_name)
            .engine_version(self.engine_version)
            .api_version(api_version);

        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Messages emitted while the instance is being created.
        let mut messenger_info = self.messenger_create_info();
        let mut validation_features = vk::ValidationFeaturesEXT::default()
            .enabled_validation_features(&self.enabled_validation_features)
            .disabled_validation_features(&self.disabled_validation_features);
        let mut validation_flags = vk::ValidationFlagsEXT::default()
            .disabled_validation_checks(&self.disabled_validation_checks);

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(flags);
        if self.use_debug_messenger && debug_utils_enabled {
            create_info = create_info.push_next(&mut messenger_info);
        }
        if !self.enabled_validation_features.is_empty()
            || !self.disabled_validation_features.is_empty()
        {
            create_info = create_info.push_next(&mut validation_features);
        }
        if !self.disabled_validation_checks.is_empty() {
            create_info = create_info.push_next(&mut validation_flags);
        }

        // SAFETY: every pointer in create_info outlives the call.
        let handle = unsafe { entry.create_instance(&create_info, self.allocation_callbacks) }
            .map_err(InstanceError::FailedCreateInstance)?
            .handle();

        // SAFETY: handle was just created through the cached entry table.
        let functions = unsafe { loader::resolve_instance_functions(handle) }
            .ok_or(InstanceError::VulkanUnavailable)?;

        let debug_messenger = if self.use_debug_messenger {
            let result = if debug_utils_enabled {
                // SAFETY: the instance is live and VK_EXT_debug_utils is enabled.
                unsafe {
                    functions
                        .debug_utils
                        .create_debug_utils_messenger(
                            &self.messenger_create_info(),
                            self.allocation_callbacks,
                        )
                }
            } else {
                Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
            };

            match result {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    // SAFETY: no child objects exist yet.
                    unsafe { functions.core.destroy_instance(self.allocation_callbacks) };
                    return Err(InstanceError::FailedCreateDebugMessenger(e));
                }
            }
        } else {
            None
        };

        tracing::info!(
            "Created Vulkan {}.{} instance ({} layers, {} extensions{})",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            layers.len(),
            extensions.len(),
            if debug_messenger.is_some() {
                ", debug messenger"
            } else {
                ""
            }
        );

        Ok(Instance {
            entry,
            functions,
            debug_messenger,
            api_version,
            headless: self.headless,
            enabled_extensions: extensions,
            allocation_callbacks: self.allocation_callbacks,
        })
    }
}

/// A created Vulkan instance.
pub struct Instance {
    entry: &'static ash::Entry,
    functions: InstanceFunctions,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    api_version: u32,
    headless: bool,
    enabled_extensions: Vec<CString>,
    allocation_callbacks: Option<&'static vk::AllocationCallbacks<'static>>,
}

impl Instance {
    pub fn handle(&self) -> vk::Instance {
        self.functions.core.handle()
    }

    pub fn entry(&self) -> &ash::Entry {
        self.entry
    }

    /// Core instance function table.
    pub fn raw(&self) -> &ash::Instance {
        &self.functions.core
    }

    pub fn surface_fn(&self) -> &ash::khr::surface::Instance {
        &self.functions.surface
    }

    pub fn debug_messenger(&self) -> Option<vk::DebugUtilsMessengerEXT> {
        self.debug_messenger
    }

    /// The API version the instance was created with.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    pub fn allocation_callbacks(&self) -> Option<&'static vk::AllocationCallbacks<'static>> {
        self.allocation_callbacks
    }

    /// Destroy the debug messenger, then the instance.
    ///
    /// # Safety
    /// All devices and surfaces created from this instance must be destroyed.
    pub unsafe fn destroy(self) {
        if let Some(messenger) = self.debug_messenger {
            self.functions
                .debug_utils
                .destroy_debug_utils_messenger(messenger, self.allocation_callbacks);
        }
        self.functions
            .core
            .destroy_instance(self.allocation_callbacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(layers: &[&CStr], extensions: &[&CStr]) -> SystemCapabilities {
        SystemCapabilities::from_parts(
            layers.iter().map(|l| (*l).to_owned()).collect(),
            extensions.iter().map(|e| (*e).to_owned()).collect(),
            false,
        )
    }

    #[test]
    fn version_baseline_skips_platform_query() {
        let version = resolve_api_version(vk::API_VERSION_1_0, vk::API_VERSION_1_0, || {
            panic!("platform queried")
        });
        assert_eq!(version, Ok(vk::API_VERSION_1_0));
    }

    #[test]
    fn version_required_and_desired() {
        assert_eq!(
            resolve_api_version(vk::API_VERSION_1_1, vk::API_VERSION_1_0, || Some(
                vk::API_VERSION_1_3
            )),
            Ok(vk::API_VERSION_1_1)
        );
        assert_eq!(
            resolve_api_version(vk::API_VERSION_1_0, vk::API_VERSION_1_3, || Some(
                vk::API_VERSION_1_2
            )),
            Ok(vk::API_VERSION_1_2)
        );
        // A desired version alone never fails.
        assert_eq!(
            resolve_api_version(vk::API_VERSION_1_0, vk::API_VERSION_1_3, || None),
            Ok(vk::API_VERSION_1_0)
        );
    }

    #[test]
    fn version_errors_by_granularity() {
        assert_eq!(
            resolve_api_version(vk::API_VERSION_1_1, 0, || Some(vk::API_VERSION_1_0)),
            Err(InstanceError::VulkanVersion11Unavailable)
        );
        assert_eq!(
            resolve_api_version(vk::API_VERSION_1_3, 0, || Some(vk::API_VERSION_1_1)),
            Err(InstanceError::VulkanVersion12Unavailable)
        );
        assert_eq!(
            resolve_api_version(vk::make_api_version(0, 2, 0, 0), 0, || None),
            Err(InstanceError::VulkanVersionUnavailable)
        );
    }

    #[test]
    fn headless_skips_windowing() {
        let caps = caps(&[], &[]);
        let exts = assemble_extensions(&[], false, true, &caps, &[c"VK_KHR_xcb_surface"]);
        assert_eq!(exts, Ok(vec![]));
    }

    #[test]
    fn windowing_requires_surface_and_protocol() {
        let protocols = [c"VK_KHR_xcb_surface", c"VK_KHR_wayland_surface"];

        let only_surface = caps(&[], &[ash::khr::surface::NAME]);
        assert_eq!(
            assemble_extensions(&[], false, false, &only_surface, &protocols),
            Err(InstanceError::WindowingExtensionsNotPresent)
        );

        let full = caps(
            &[],
            &[
                ash::khr::surface::NAME,
                c"VK_KHR_xcb_surface",
                c"VK_KHR_wayland_surface",
            ],
        );
        let exts = assemble_extensions(&[], false, false, &full, &protocols).unwrap();
        assert_eq!(exts.len(), 3);
    }

    #[test]
    fn debug_utils_only_added_when_available() {
        let without = caps(&[], &[]);
        assert_eq!(
            assemble_extensions(&[], true, true, &without, &[]),
            Ok(vec![])
        );

        let with = caps(&[], &[ash::ext::debug_utils::NAME]);
        assert_eq!(
            assemble_extensions(&[], true, true, &with, &[]),
            Ok(vec![ash::ext::debug_utils::NAME.to_owned()])
        );
    }

    #[test]
    fn missing_extension_is_rejected() {
        let caps = caps(&[], &[]);
        assert_eq!(
            assemble_extensions(&[c"VK_EXT_missing".to_owned()], false, true, &caps, &[]),
            Err(InstanceError::RequestedExtensionsNotPresent)
        );
    }

    #[test]
    fn validation_layer_assembly() {
        let none = caps(&[], &[]);
        assert_eq!(assemble_layers(&[], false, true, &none), Ok(vec![]));
        assert_eq!(
            assemble_layers(&[], true, false, &none),
            Err(InstanceError::RequestedLayersNotPresent)
        );

        let with = caps(&[VALIDATION_LAYER_NAME], &[]);
        assert_eq!(
            assemble_layers(&[], false, true, &with),
            Ok(vec![VALIDATION_LAYER_NAME.to_owned()])
        );
    }
}
