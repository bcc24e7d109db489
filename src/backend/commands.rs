// Dynamic state commands
//
// Core 1.3 covers the first two extended dynamic state sets. Everything newer
// (vertex input, extended dynamic state 3) lives on the shader object loader,
// and fragment shading rate on its own KHR loader.

use super::interface::DynamicCommand;
use ash::extensions::ext::ShaderObject;
use ash::vk;
use std::mem;

/// `vkCmdSetFragmentShadingRateKHR`, loaded by hand since ash ships no wrapper for it
#[derive(Clone)]
pub struct FragmentShadingRateLoader {
    fp: vk::KhrFragmentShadingRateFn,
}

impl FragmentShadingRateLoader {
    pub fn new(instance: &ash::Instance, device: &ash::Device) -> Self {
        let handle = device.handle();
        let fp = vk::KhrFragmentShadingRateFn::load(|name| unsafe {
            mem::transmute(instance.get_device_proc_addr(handle, name.as_ptr()))
        });
        Self { fp }
    }

    pub unsafe fn cmd_set_fragment_shading_rate(
        &self,
        cmd: vk::CommandBuffer,
        fragment_size: &vk::Extent2D,
        combiner_ops: &[vk::FragmentShadingRateCombinerOpKHR; 2],
    ) {
        (self.fp.cmd_set_fragment_shading_rate_khr)(cmd, fragment_size, combiner_ops)
    }
}

pub struct CommandLoaders<'a> {
    pub device: &'a ash::Device,
    pub shader_object: Option<&'a ShaderObject>,
    pub fragment_shading_rate: Option<&'a FragmentShadingRateLoader>,
}

fn bool32(values: &[bool]) -> Vec<vk::Bool32> {
    values.iter().map(|&b| b as vk::Bool32).collect()
}

pub fn cmd_set_dynamic_state(loaders: &CommandLoaders, cmd: vk::CommandBuffer, command: &DynamicCommand) {
    let device = loaders.device;
    unsafe {
        match command {
            DynamicCommand::PrimitiveTopology(topology) => device.cmd_set_primitive_topology(cmd, *topology),
            DynamicCommand::PrimitiveRestartEnable(enable) => device.cmd_set_primitive_restart_enable(cmd, *enable),
            DynamicCommand::ViewportWithCount(viewports) => device.cmd_set_viewport_with_count(cmd, viewports),
            DynamicCommand::ScissorWithCount(scissors) => device.cmd_set_scissor_with_count(cmd, scissors),
            DynamicCommand::RasterizerDiscardEnable(enable) => {
                device.cmd_set_rasterizer_discard_enable(cmd, *enable)
            }
            DynamicCommand::CullMode(mode) => device.cmd_set_cull_mode(cmd, *mode),
            DynamicCommand::FrontFace(face) => device.cmd_set_front_face(cmd, *face),
            DynamicCommand::DepthBiasEnable(enable) => device.cmd_set_depth_bias_enable(cmd, *enable),
            DynamicCommand::DepthBias { constant_factor, clamp, slope_factor } => {
                device.cmd_set_depth_bias(cmd, *constant_factor, *clamp, *slope_factor)
            }
            DynamicCommand::LineWidth(width) => device.cmd_set_line_width(cmd, *width),
            DynamicCommand::DepthTestEnable(enable) => device.cmd_set_depth_test_enable(cmd, *enable),
            DynamicCommand::DepthWriteEnable(enable) => device.cmd_set_depth_write_enable(cmd, *enable),
            DynamicCommand::DepthCompareOp(op) => device.cmd_set_depth_compare_op(cmd, *op),
            DynamicCommand::DepthBoundsTestEnable(enable) => device.cmd_set_depth_bounds_test_enable(cmd, *enable),
            DynamicCommand::DepthBounds { min, max } => device.cmd_set_depth_bounds(cmd, *min, *max),
            DynamicCommand::StencilTestEnable(enable) => device.cmd_set_stencil_test_enable(cmd, *enable),
            DynamicCommand::StencilOp { face, fail_op, pass_op, depth_fail_op, compare_op } => {
                device.cmd_set_stencil_op(cmd, *face, *fail_op, *pass_op, *depth_fail_op, *compare_op)
            }
            DynamicCommand::StencilCompareMask { face, mask } => device.cmd_set_stencil_compare_mask(cmd, *face, *mask),
            DynamicCommand::StencilWriteMask { face, mask } => device.cmd_set_stencil_write_mask(cmd, *face, *mask),
            DynamicCommand::StencilReference { face, reference } => {
                device.cmd_set_stencil_reference(cmd, *face, *reference)
            }
            DynamicCommand::BlendConstants(constants) => device.cmd_set_blend_constants(cmd, constants),
            DynamicCommand::FragmentShadingRate { fragment_size, combiner_ops } => {
                match loaders.fragment_shading_rate {
                    Some(fsr) => fsr.cmd_set_fragment_shading_rate(cmd, fragment_size, combiner_ops),
                    None => log::warn!("Dropping {:?}: VK_KHR_fragment_shading_rate not enabled", command.state()),
                }
            }
            _ => match loaders.shader_object {
                Some(loader) => set_extended_state(loader, cmd, command),
                None => log::warn!("Dropping {:?}: VK_EXT_shader_object not enabled", command.state()),
            },
        }
    }
}

unsafe fn set_extended_state(loader: &ShaderObject, cmd: vk::CommandBuffer, command: &DynamicCommand) {
    match command {
        DynamicCommand::VertexInput { bindings, attributes } => {
            let bindings: Vec<vk::VertexInputBindingDescription2EXT> = bindings
                .iter()
                .map(|b| {
                    vk::VertexInputBindingDescription2EXT::builder()
                        .binding(b.binding)
                        .stride(b.stride)
                        .input_rate(b.input_rate)
                        .divisor(1)
                        .build()
                })
                .collect();
            let attributes: Vec<vk::VertexInputAttributeDescription2EXT> = attributes
                .iter()
                .map(|a| {
                    vk::VertexInputAttributeDescription2EXT::builder()
                        .location(a.location)
                        .binding(a.binding)
                        .format(a.format)
                        .offset(a.offset)
                        .build()
                })
                .collect();
            loader.cmd_set_vertex_input(cmd, &bindings, &attributes)
        }
        DynamicCommand::PatchControlPoints(points) => loader.cmd_set_patch_control_points(cmd, *points),
        DynamicCommand::TessellationDomainOrigin(origin) => loader.cmd_set_tessellation_domain_origin(cmd, *origin),
        DynamicCommand::PolygonMode(mode) => loader.cmd_set_polygon_mode(cmd, *mode),
        DynamicCommand::LineRasterizationMode(mode) => loader.cmd_set_line_rasterization_mode(cmd, *mode),
        DynamicCommand::LineStippleEnable(enable) => loader.cmd_set_line_stipple_enable(cmd, *enable),
        DynamicCommand::DepthClampEnable(enable) => loader.cmd_set_depth_clamp_enable(cmd, *enable),
        DynamicCommand::DepthClipEnable(enable) => loader.cmd_set_depth_clip_enable(cmd, *enable),
        DynamicCommand::DepthClipNegativeOneToOne(enable) => {
            loader.cmd_set_depth_clip_negative_one_to_one(cmd, *enable)
        }
        DynamicCommand::ProvokingVertexMode(mode) => loader.cmd_set_provoking_vertex_mode(cmd, *mode),
        DynamicCommand::ConservativeRasterizationMode(mode) => {
            loader.cmd_set_conservative_rasterization_mode(cmd, *mode)
        }
        DynamicCommand::ExtraPrimitiveOverestimationSize(size) => {
            loader.cmd_set_extra_primitive_overestimation_size(cmd, *size)
        }
        DynamicCommand::RasterizationStream(stream) => loader.cmd_set_rasterization_stream(cmd, *stream),
        DynamicCommand::RasterizationSamples(samples) => loader.cmd_set_rasterization_samples(cmd, *samples),
        DynamicCommand::SampleMask { samples, mask } => loader.cmd_set_sample_mask(cmd, *samples, mask),
        DynamicCommand::AlphaToCoverageEnable(enable) => loader.cmd_set_alpha_to_coverage_enable(cmd, *enable),
        DynamicCommand::AlphaToOneEnable(enable) => loader.cmd_set_alpha_to_one_enable(cmd, *enable),
        DynamicCommand::LogicOpEnable(enable) => loader.cmd_set_logic_op_enable(cmd, *enable),
        DynamicCommand::LogicOp(op) => loader.cmd_set_logic_op(cmd, *op),
        DynamicCommand::ColorBlendEnable(enables) => loader.cmd_set_color_blend_enable(cmd, 0, &bool32(enables)),
        DynamicCommand::ColorBlendEquation(equations) => loader.cmd_set_color_blend_equation(cmd, 0, equations),
        DynamicCommand::ColorWriteMask(masks) => loader.cmd_set_color_write_mask(cmd, 0, masks),
        // Core and KHR commands are dispatched by the caller
        other => log::warn!("{:?} is not an extended dynamic state", other.state()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool32_maps_each_enable() {
        assert_eq!(bool32(&[true, false, true]), vec![vk::TRUE, vk::FALSE, vk::TRUE]);
    }

    #[test]
    fn shading_rate_loader_can_live_in_a_shared_device() {
        fn shared<T: Send + Sync + Clone>() {}
        shared::<FragmentShadingRateLoader>();

        // Unresolved entry points fall back to ash's panicking stubs instead of null
        let fp = vk::KhrFragmentShadingRateFn::load(|_| std::ptr::null());
        let loader = FragmentShadingRateLoader { fp };
        let _ = loader.clone();
    }
}
