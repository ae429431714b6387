//! Debug messenger callback and message naming.

use ash::vk;
use std::ffi::{c_void, CStr};

/// Severities reported by default: warnings and errors.
pub const DEFAULT_MESSAGE_SEVERITY: vk::DebugUtilsMessageSeverityFlagsEXT =
    vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw()
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw(),
    );

/// Message types reported by default: general, validation and performance.
pub const DEFAULT_MESSAGE_TYPE: vk::DebugUtilsMessageTypeFlagsEXT =
    vk::DebugUtilsMessageTypeFlagsEXT::from_raw(
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION.as_raw()
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE.as_raw(),
    );

/// Name of a single message severity.
pub fn message_severity_name(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> &'static str {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => "VERBOSE",
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => "INFO",
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => "WARNING",
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => "ERROR",
        _ => "UNKNOWN",
    }
}

/// Name of a message type combination, e.g. `"General | Validation"`.
pub fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    const GENERAL: u32 = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL.as_raw();
    const VALIDATION: u32 = vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION.as_raw();
    const PERFORMANCE: u32 = vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE.as_raw();

    match message_type.as_raw() {
        x if x == GENERAL | VALIDATION | PERFORMANCE => "General | Validation | Performance",
        x if x == VALIDATION | PERFORMANCE => "Validation | Performance",
        x if x == GENERAL | PERFORMANCE => "General | Performance",
        x if x == GENERAL | VALIDATION => "General | Validation",
        PERFORMANCE => "Performance",
        VALIDATION => "Validation",
        GENERAL => "General",
        _ => "Unknown",
    }
}

/// Debug messenger callback that forwards messages to `tracing`.
///
/// # Safety
/// Called by the Vulkan loader with a valid callback data pointer.
pub unsafe extern "system" fn default_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or a valid callback data pointer.
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => {
            unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy()
        }
        _ => std::borrow::Cow::Borrowed("<no message>"),
    };
    let kind = message_type_name(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => tracing::error!("[{}] {}", kind, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => tracing::warn!("[{}] {}", kind, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => tracing::info!("[{}] {}", kind, message),
        _ => tracing::trace!(
            "[{}] [{}] {}",
            message_severity_name(message_severity),
            kind,
            message
        ),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(message_type_name(DEFAULT_MESSAGE_TYPE), "General | Validation | Performance");
        assert_eq!(
            message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "Validation"
        );
        assert_eq!(
            message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::empty()),
            "Unknown"
        );
    }

    #[test]
    fn severity_names() {
        assert_eq!(
            message_severity_name(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
            "WARNING"
        );
        assert_eq!(message_severity_name(DEFAULT_MESSAGE_SEVERITY), "UNKNOWN");
    }

    #[test]
    fn default_callback_never_aborts_the_call() {
        let message = c"test message";
        let mut data = vk::DebugUtilsMessengerCallbackDataEXT::default();
        data.p_message = message.as_ptr();
        let result = unsafe {
            default_debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }
}
