//! Core feature-bit comparison.

use ash::vk;

macro_rules! for_each_feature {
    ($m:ident) => {
        $m!(
            robust_buffer_access,
            full_draw_index_uint32,
            image_cube_array,
            independent_blend,
            geometry_shader,
            tessellation_shader,
            sample_rate_shading,
            dual_src_blend,
            logic_op,
            multi_draw_indirect,
            draw_indirect_first_instance,
            depth_clamp,
            depth_bias_clamp,
            fill_mode_non_solid,
            depth_bounds,
            wide_lines,
            large_points,
            alpha_to_one,
            multi_viewport,
            sampler_anisotropy,
            texture_compression_etc2,
            texture_compression_astc_ldr,
            texture_compression_bc,
            occlusion_query_precise,
            pipeline_statistics_query,
            vertex_pipeline_stores_and_atomics,
            fragment_stores_and_atomics,
            shader_tessellation_and_geometry_point_size,
            shader_image_gather_extended,
            shader_storage_image_extended_formats,
            shader_storage_image_multisample,
            shader_storage_image_read_without_format,
            shader_storage_image_write_without_format,
            shader_uniform_buffer_array_dynamic_indexing,
            shader_sampled_image_array_dynamic_indexing,
            shader_storage_buffer_array_dynamic_indexing,
            shader_storage_image_array_dynamic_indexing,
            shader_clip_distance,
            shader_cull_distance,
            shader_float64,
            shader_int64,
            shader_int16,
            shader_resource_residency,
            shader_resource_min_lod,
            sparse_binding,
            sparse_residency_buffer,
            sparse_residency_image2_d,
            sparse_residency_image3_d,
            sparse_residency2_samples,
            sparse_residency4_samples,
            sparse_residency8_samples,
            sparse_residency16_samples,
            sparse_residency_aliased,
            variable_multisample_rate,
            inherited_queries
        )
    };
}

/// Returns true if every feature enabled in `requested` is enabled in `supported`.
pub fn supports_features(
    supported: &vk::PhysicalDeviceFeatures,
    requested: &vk::PhysicalDeviceFeatures,
) -> bool {
    macro_rules! check {
        ($($field:ident),*) => {
            $((requested.$field == vk::FALSE || supported.$field != vk::FALSE))&&*
        };
    }
    for_each_feature!(check)
}

/// Union of two feature sets.
pub fn merge_features(
    a: &vk::PhysicalDeviceFeatures,
    b: &vk::PhysicalDeviceFeatures,
) -> vk::PhysicalDeviceFeatures {
    let mut merged = *a;
    macro_rules! merge {
        ($($field:ident),*) => {
            $(
                if b.$field != vk::FALSE {
                    merged.$field = vk::TRUE;
                }
            )*
        };
    }
    for_each_feature!(merge);
    merged
}

/// Number of features enabled in `features`.
pub fn enabled_count(features: &vk::PhysicalDeviceFeatures) -> usize {
    let mut count = 0;
    macro_rules! count {
        ($($field:ident),*) => {
            $(
                if features.$field != vk::FALSE {
                    count += 1;
                }
            )*
        };
    }
    for_each_feature!(count);
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_subset_is_supported() {
        let supported = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .sampler_anisotropy(true);
        let requested = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        assert!(supports_features(&supported, &requested));
        assert!(supports_features(
            &supported,
            &vk::PhysicalDeviceFeatures::default()
        ));
    }

    #[test]
    fn missing_feature_is_rejected() {
        let supported = vk::PhysicalDeviceFeatures::default().geometry_shader(true);
        let requested = vk::PhysicalDeviceFeatures::default().inherited_queries(true);

        assert!(!supports_features(&supported, &requested));
    }

    #[test]
    fn merge_is_union() {
        let a = vk::PhysicalDeviceFeatures::default().wide_lines(true);
        let b = vk::PhysicalDeviceFeatures::default()
            .shader_int64(true)
            .robust_buffer_access(true);
        let merged = merge_features(&a, &b);

        assert_eq!(enabled_count(&merged), 3);
        assert!(supports_features(&merged, &a));
        assert!(supports_features(&merged, &b));
    }
}
