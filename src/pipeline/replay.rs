// Fixed-function state replay for shader objects
//
// Shader objects have no pipeline object to carry fixed-function state, so
// every value is captured at build time and re-issued as individual
// dynamic-state commands on each bind. Which commands are issued is driven
// by `REPLAY_TABLE`: one entry per state, each with a predicate that keeps
// values of disabled features from being set at all.

use super::dynamic::DynamicStateSet;
use super::state::{
    ColorBlendState, DepthStencilState, FragmentShadingRateState, InputAssemblyState, MultisampleState,
    RasterizationState, TessellationState, VertexInputState, ViewportState,
};
use super::wrapper::PipelineDescription;
use crate::backend::interface::{DeviceInterface, DynamicCommand};
use ash::vk;

/// Every fixed-function value a shader-object draw depends on.
#[derive(Debug, Clone)]
pub struct ReplayStateSnapshot {
    pub has_vertex_stage: bool,
    pub has_tessellation: bool,
    pub has_geometry: bool,

    // Vertex input interface
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart_enable: bool,

    // Pre-rasterization
    pub patch_control_points: u32,
    pub domain_origin: vk::TessellationDomainOrigin,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub depth_clip_negative_one_to_one: Option<bool>,
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
    pub line_rasterization_mode: vk::LineRasterizationModeEXT,
    pub stippled_line_enable: bool,
    pub depth_clip_enable: Option<bool>,
    pub provoking_vertex_mode: Option<vk::ProvokingVertexModeEXT>,
    pub conservative_mode: Option<vk::ConservativeRasterizationModeEXT>,
    pub extra_primitive_overestimation_size: f32,
    pub rasterization_stream: Option<u32>,
    pub fragment_shading_rate: Option<FragmentShadingRateState>,

    // Fragment shader
    pub rasterization_samples: vk::SampleCountFlags,
    pub sample_mask: Vec<vk::SampleMask>,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub depth_bounds_test_enable: bool,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
    pub stencil_test_enable: bool,
    pub stencil_front: vk::StencilOpState,
    pub stencil_back: vk::StencilOpState,

    // Fragment output
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub color_blend_enables: Vec<bool>,
    pub color_blend_equations: Vec<vk::ColorBlendEquationEXT>,
    pub color_write_masks: Vec<vk::ColorComponentFlags>,
    pub blend_constants: [f32; 4],
}

impl ReplayStateSnapshot {
    /// Flatten the collected state. Absent blocks contribute their defaults.
    pub(crate) fn capture(desc: &PipelineDescription) -> Self {
        let vertex_input = desc.vertex_input.clone().unwrap_or_default();
        let input_assembly = desc.input_assembly.unwrap_or_default();
        let tessellation: TessellationState = desc.tessellation.unwrap_or_default();
        let viewport = desc.viewport.clone().unwrap_or_else(ViewportState::default);
        let raster = desc.rasterization.unwrap_or_default();
        let multisample = desc.multisample().cloned().unwrap_or_default();
        let depth_stencil = desc.depth_stencil.unwrap_or_default();
        let color_blend = desc.color_blend.clone().unwrap_or_default();
        Self::from_blocks(
            desc,
            &vertex_input,
            &input_assembly,
            &tessellation,
            &viewport,
            &raster,
            &multisample,
            &depth_stencil,
            &color_blend,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn from_blocks(
        desc: &PipelineDescription,
        vertex_input: &VertexInputState,
        input_assembly: &InputAssemblyState,
        tessellation: &TessellationState,
        viewport: &ViewportState,
        raster: &RasterizationState,
        multisample: &MultisampleState,
        depth_stencil: &DepthStencilState,
        color_blend: &ColorBlendState,
    ) -> Self {
        let sample_mask = if multisample.sample_mask.is_empty() {
            let words = (multisample.rasterization_samples.as_raw() as usize + 31) / 32;
            vec![u32::MAX; words.max(1)]
        } else {
            multisample.sample_mask.clone()
        };

        Self {
            has_vertex_stage: desc.has_stage(vk::ShaderStageFlags::VERTEX),
            has_tessellation: desc.has_stage(vk::ShaderStageFlags::TESSELLATION_CONTROL)
                || desc.has_stage(vk::ShaderStageFlags::TESSELLATION_EVALUATION),
            has_geometry: desc.has_stage(vk::ShaderStageFlags::GEOMETRY),

            vertex_bindings: vertex_input.bindings.clone(),
            vertex_attributes: vertex_input.attributes.clone(),
            topology: input_assembly.topology,
            primitive_restart_enable: input_assembly.primitive_restart_enable,

            patch_control_points: tessellation.patch_control_points,
            domain_origin: tessellation
                .domain_origin
                .unwrap_or(vk::TessellationDomainOrigin::UPPER_LEFT),
            viewports: viewport.viewports.clone(),
            scissors: viewport.scissors.clone(),
            depth_clip_negative_one_to_one: viewport.chain.depth_clip_negative_one_to_one,
            depth_clamp_enable: raster.depth_clamp_enable,
            rasterizer_discard_enable: raster.rasterizer_discard_enable,
            polygon_mode: raster.polygon_mode,
            cull_mode: raster.cull_mode,
            front_face: raster.front_face,
            depth_bias_enable: raster.depth_bias_enable,
            depth_bias_constant_factor: raster.depth_bias_constant_factor,
            depth_bias_clamp: raster.depth_bias_clamp,
            depth_bias_slope_factor: raster.depth_bias_slope_factor,
            line_width: raster.line_width,
            line_rasterization_mode: raster
                .line
                .map(|l| l.mode)
                .unwrap_or(vk::LineRasterizationModeEXT::DEFAULT),
            stippled_line_enable: raster.line.map(|l| l.stippled_line_enable).unwrap_or(false),
            depth_clip_enable: raster.depth_clip_enable,
            provoking_vertex_mode: raster.provoking_vertex_mode,
            conservative_mode: raster.conservative_mode,
            extra_primitive_overestimation_size: raster.extra_primitive_overestimation_size,
            rasterization_stream: raster.rasterization_stream,
            fragment_shading_rate: desc.fragment_shading_rate,

            rasterization_samples: multisample.rasterization_samples,
            sample_mask,
            alpha_to_coverage_enable: multisample.alpha_to_coverage_enable,
            alpha_to_one_enable: multisample.alpha_to_one_enable,
            depth_test_enable: depth_stencil.depth_test_enable,
            depth_write_enable: depth_stencil.depth_write_enable,
            depth_compare_op: depth_stencil.depth_compare_op,
            depth_bounds_test_enable: depth_stencil.depth_bounds_test_enable,
            min_depth_bounds: depth_stencil.min_depth_bounds,
            max_depth_bounds: depth_stencil.max_depth_bounds,
            stencil_test_enable: depth_stencil.stencil_test_enable,
            stencil_front: depth_stencil.front,
            stencil_back: depth_stencil.back,

            logic_op_enable: color_blend.logic_op_enable,
            logic_op: color_blend.logic_op,
            color_blend_enables: color_blend
                .attachments
                .iter()
                .map(|a| a.blend_enable == vk::TRUE)
                .collect(),
            color_blend_equations: color_blend
                .attachments
                .iter()
                .map(|a| vk::ColorBlendEquationEXT {
                    src_color_blend_factor: a.src_color_blend_factor,
                    dst_color_blend_factor: a.dst_color_blend_factor,
                    color_blend_op: a.color_blend_op,
                    src_alpha_blend_factor: a.src_alpha_blend_factor,
                    dst_alpha_blend_factor: a.dst_alpha_blend_factor,
                    alpha_blend_op: a.alpha_blend_op,
                })
                .collect(),
            color_write_masks: color_blend.attachments.iter().map(|a| a.color_write_mask).collect(),
            blend_constants: color_blend.blend_constants,
        }
    }

    fn rasterizes(&self) -> bool {
        !self.rasterizer_discard_enable
    }

    fn draws_lines(&self) -> bool {
        matches!(
            self.topology,
            vk::PrimitiveTopology::LINE_LIST
                | vk::PrimitiveTopology::LINE_STRIP
                | vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY
                | vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY
        ) || self.polygon_mode == vk::PolygonMode::LINE
    }

    fn blends(&self) -> bool {
        self.color_blend_enables.iter().any(|&e| e)
    }

    /// Commands `replay` would issue, without a device.
    pub fn commands(&self, caller_dynamic: Option<&DynamicStateSet>) -> Vec<DynamicCommand> {
        REPLAY_TABLE
            .iter()
            .filter(|entry| {
                !caller_dynamic.map_or(false, |set| set.contains_any(entry.declared_as))
            })
            .filter(|entry| (entry.enabled)(self))
            .flat_map(|entry| (entry.commands)(self))
            .collect()
    }

    /// Issue every enabled command not left to the caller.
    pub fn replay(
        &self,
        device: &dyn DeviceInterface,
        cmd: vk::CommandBuffer,
        caller_dynamic: Option<&DynamicStateSet>,
    ) {
        for command in self.commands(caller_dynamic) {
            device.cmd_set_dynamic_state(cmd, &command);
        }
    }
}

struct ReplayEntry {
    /// Declaring any of these dynamic leaves the entry to the caller
    declared_as: &'static [vk::DynamicState],
    enabled: fn(&ReplayStateSnapshot) -> bool,
    commands: fn(&ReplayStateSnapshot) -> Vec<DynamicCommand>,
}

use vk::DynamicState as S;
use DynamicCommand as C;

static REPLAY_TABLE: &[ReplayEntry] = &[
    // Vertex input interface
    ReplayEntry {
        declared_as: &[S::VERTEX_INPUT_EXT],
        enabled: |s| s.has_vertex_stage,
        commands: |s| {
            vec![C::VertexInput {
                bindings: s.vertex_bindings.clone(),
                attributes: s.vertex_attributes.clone(),
            }]
        },
    },
    ReplayEntry {
        declared_as: &[S::PRIMITIVE_TOPOLOGY],
        enabled: |s| s.has_vertex_stage,
        commands: |s| vec![C::PrimitiveTopology(s.topology)],
    },
    ReplayEntry {
        declared_as: &[S::PRIMITIVE_RESTART_ENABLE],
        enabled: |s| s.has_vertex_stage,
        commands: |s| vec![C::PrimitiveRestartEnable(s.primitive_restart_enable)],
    },
    // Pre-rasterization
    ReplayEntry {
        declared_as: &[S::PATCH_CONTROL_POINTS_EXT],
        enabled: |s| s.has_tessellation,
        commands: |s| vec![C::PatchControlPoints(s.patch_control_points)],
    },
    ReplayEntry {
        declared_as: &[S::TESSELLATION_DOMAIN_ORIGIN_EXT],
        enabled: |s| s.has_tessellation,
        commands: |s| vec![C::TessellationDomainOrigin(s.domain_origin)],
    },
    ReplayEntry {
        declared_as: &[S::VIEWPORT, S::VIEWPORT_WITH_COUNT],
        enabled: |s| !s.viewports.is_empty(),
        commands: |s| vec![C::ViewportWithCount(s.viewports.clone())],
    },
    ReplayEntry {
        declared_as: &[S::SCISSOR, S::SCISSOR_WITH_COUNT],
        enabled: |s| !s.scissors.is_empty(),
        commands: |s| vec![C::ScissorWithCount(s.scissors.clone())],
    },
    ReplayEntry {
        declared_as: &[S::RASTERIZER_DISCARD_ENABLE],
        enabled: |_| true,
        commands: |s| vec![C::RasterizerDiscardEnable(s.rasterizer_discard_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_CLAMP_ENABLE_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::DepthClampEnable(s.depth_clamp_enable)],
    },
    ReplayEntry {
        declared_as: &[S::POLYGON_MODE_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::PolygonMode(s.polygon_mode)],
    },
    ReplayEntry {
        declared_as: &[S::CULL_MODE],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::CullMode(s.cull_mode)],
    },
    ReplayEntry {
        declared_as: &[S::FRONT_FACE],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::FrontFace(s.front_face)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_BIAS_ENABLE],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::DepthBiasEnable(s.depth_bias_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_BIAS],
        enabled: |s| s.rasterizes() && s.depth_bias_enable,
        commands: |s| {
            vec![C::DepthBias {
                constant_factor: s.depth_bias_constant_factor,
                clamp: s.depth_bias_clamp,
                slope_factor: s.depth_bias_slope_factor,
            }]
        },
    },
    ReplayEntry {
        declared_as: &[S::LINE_WIDTH],
        enabled: |s| s.rasterizes() && s.draws_lines(),
        commands: |s| vec![C::LineWidth(s.line_width)],
    },
    ReplayEntry {
        declared_as: &[S::LINE_RASTERIZATION_MODE_EXT],
        enabled: |s| s.rasterizes() && s.draws_lines(),
        commands: |s| vec![C::LineRasterizationMode(s.line_rasterization_mode)],
    },
    ReplayEntry {
        declared_as: &[S::LINE_STIPPLE_ENABLE_EXT],
        enabled: |s| s.rasterizes() && s.draws_lines(),
        commands: |s| vec![C::LineStippleEnable(s.stippled_line_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_CLIP_ENABLE_EXT],
        enabled: |s| s.rasterizes() && s.depth_clip_enable.is_some(),
        commands: |s| vec![C::DepthClipEnable(s.depth_clip_enable.unwrap_or(true))],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_CLIP_NEGATIVE_ONE_TO_ONE_EXT],
        enabled: |s| s.rasterizes() && s.depth_clip_negative_one_to_one.is_some(),
        commands: |s| {
            s.depth_clip_negative_one_to_one
                .map(C::DepthClipNegativeOneToOne)
                .into_iter()
                .collect()
        },
    },
    ReplayEntry {
        declared_as: &[S::PROVOKING_VERTEX_MODE_EXT],
        enabled: |s| s.rasterizes() && s.provoking_vertex_mode.is_some(),
        commands: |s| s.provoking_vertex_mode.map(C::ProvokingVertexMode).into_iter().collect(),
    },
    ReplayEntry {
        declared_as: &[S::CONSERVATIVE_RASTERIZATION_MODE_EXT],
        enabled: |s| s.rasterizes() && s.conservative_mode.is_some(),
        commands: |s| s.conservative_mode.map(C::ConservativeRasterizationMode).into_iter().collect(),
    },
    ReplayEntry {
        declared_as: &[S::EXTRA_PRIMITIVE_OVERESTIMATION_SIZE_EXT],
        enabled: |s| {
            s.rasterizes() && s.conservative_mode == Some(vk::ConservativeRasterizationModeEXT::OVERESTIMATE)
        },
        commands: |s| vec![C::ExtraPrimitiveOverestimationSize(s.extra_primitive_overestimation_size)],
    },
    ReplayEntry {
        declared_as: &[S::RASTERIZATION_STREAM_EXT],
        enabled: |s| s.has_geometry && s.rasterization_stream.is_some(),
        commands: |s| s.rasterization_stream.map(C::RasterizationStream).into_iter().collect(),
    },
    ReplayEntry {
        declared_as: &[S::FRAGMENT_SHADING_RATE_KHR],
        enabled: |s| s.fragment_shading_rate.is_some(),
        commands: |s| {
            s.fragment_shading_rate
                .map(|fsr| C::FragmentShadingRate {
                    fragment_size: fsr.fragment_size,
                    combiner_ops: fsr.combiner_ops,
                })
                .into_iter()
                .collect()
        },
    },
    // Fragment shader
    ReplayEntry {
        declared_as: &[S::RASTERIZATION_SAMPLES_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::RasterizationSamples(s.rasterization_samples)],
    },
    ReplayEntry {
        declared_as: &[S::SAMPLE_MASK_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| {
            vec![C::SampleMask {
                samples: s.rasterization_samples,
                mask: s.sample_mask.clone(),
            }]
        },
    },
    ReplayEntry {
        declared_as: &[S::ALPHA_TO_COVERAGE_ENABLE_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::AlphaToCoverageEnable(s.alpha_to_coverage_enable)],
    },
    ReplayEntry {
        declared_as: &[S::ALPHA_TO_ONE_ENABLE_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::AlphaToOneEnable(s.alpha_to_one_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_TEST_ENABLE],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::DepthTestEnable(s.depth_test_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_WRITE_ENABLE],
        enabled: |s| s.rasterizes() && s.depth_test_enable,
        commands: |s| vec![C::DepthWriteEnable(s.depth_write_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_COMPARE_OP],
        enabled: |s| s.rasterizes() && s.depth_test_enable,
        commands: |s| vec![C::DepthCompareOp(s.depth_compare_op)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_BOUNDS_TEST_ENABLE],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::DepthBoundsTestEnable(s.depth_bounds_test_enable)],
    },
    ReplayEntry {
        declared_as: &[S::DEPTH_BOUNDS],
        enabled: |s| s.rasterizes() && s.depth_bounds_test_enable,
        commands: |s| {
            vec![C::DepthBounds {
                min: s.min_depth_bounds,
                max: s.max_depth_bounds,
            }]
        },
    },
    ReplayEntry {
        declared_as: &[S::STENCIL_TEST_ENABLE],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::StencilTestEnable(s.stencil_test_enable)],
    },
    ReplayEntry {
        declared_as: &[S::STENCIL_OP],
        enabled: |s| s.rasterizes() && s.stencil_test_enable,
        commands: |s| {
            per_face(s, |face, op| C::StencilOp {
                face,
                fail_op: op.fail_op,
                pass_op: op.pass_op,
                depth_fail_op: op.depth_fail_op,
                compare_op: op.compare_op,
            })
        },
    },
    ReplayEntry {
        declared_as: &[S::STENCIL_COMPARE_MASK],
        enabled: |s| s.rasterizes() && s.stencil_test_enable,
        commands: |s| per_face(s, |face, op| C::StencilCompareMask { face, mask: op.compare_mask }),
    },
    ReplayEntry {
        declared_as: &[S::STENCIL_WRITE_MASK],
        enabled: |s| s.rasterizes() && s.stencil_test_enable,
        commands: |s| per_face(s, |face, op| C::StencilWriteMask { face, mask: op.write_mask }),
    },
    ReplayEntry {
        declared_as: &[S::STENCIL_REFERENCE],
        enabled: |s| s.rasterizes() && s.stencil_test_enable,
        commands: |s| per_face(s, |face, op| C::StencilReference { face, reference: op.reference }),
    },
    // Fragment output
    ReplayEntry {
        declared_as: &[S::LOGIC_OP_ENABLE_EXT],
        enabled: ReplayStateSnapshot::rasterizes,
        commands: |s| vec![C::LogicOpEnable(s.logic_op_enable)],
    },
    ReplayEntry {
        declared_as: &[S::LOGIC_OP_EXT],
        enabled: |s| s.rasterizes() && s.logic_op_enable,
        commands: |s| vec![C::LogicOp(s.logic_op)],
    },
    ReplayEntry {
        declared_as: &[S::COLOR_BLEND_ENABLE_EXT],
        enabled: |s| s.rasterizes() && !s.color_blend_enables.is_empty(),
        commands: |s| vec![C::ColorBlendEnable(s.color_blend_enables.clone())],
    },
    ReplayEntry {
        declared_as: &[S::COLOR_BLEND_EQUATION_EXT],
        enabled: |s| s.rasterizes() && s.blends(),
        commands: |s| vec![C::ColorBlendEquation(s.color_blend_equations.clone())],
    },
    ReplayEntry {
        declared_as: &[S::COLOR_WRITE_MASK_EXT],
        enabled: |s| s.rasterizes() && !s.color_write_masks.is_empty(),
        commands: |s| vec![C::ColorWriteMask(s.color_write_masks.clone())],
    },
    ReplayEntry {
        declared_as: &[S::BLEND_CONSTANTS],
        enabled: |s| s.rasterizes() && s.blends(),
        commands: |s| vec![C::BlendConstants(s.blend_constants)],
    },
];

/// One command per face, or a single FRONT_AND_BACK one when both agree.
fn per_face(
    s: &ReplayStateSnapshot,
    make: impl Fn(vk::StencilFaceFlags, &vk::StencilOpState) -> DynamicCommand,
) -> Vec<DynamicCommand> {
    let same = s.stencil_front.fail_op == s.stencil_back.fail_op
        && s.stencil_front.pass_op == s.stencil_back.pass_op
        && s.stencil_front.depth_fail_op == s.stencil_back.depth_fail_op
        && s.stencil_front.compare_op == s.stencil_back.compare_op
        && s.stencil_front.compare_mask == s.stencil_back.compare_mask
        && s.stencil_front.write_mask == s.stencil_back.write_mask
        && s.stencil_front.reference == s.stencil_back.reference;
    if same {
        vec![make(vk::StencilFaceFlags::FRONT_AND_BACK, &s.stencil_front)]
    } else {
        vec![
            make(vk::StencilFaceFlags::FRONT, &s.stencil_front),
            make(vk::StencilFaceFlags::BACK, &s.stencil_back),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::{LineRasterizationState, ViewportStateChain, DEFAULT_STENCIL_OP_STATE};

    fn snapshot(edit: impl FnOnce(&mut PipelineDescription)) -> ReplayStateSnapshot {
        let mut desc = PipelineDescription::default();
        desc.push_stage_for_test(vk::ShaderStageFlags::VERTEX);
        desc.push_stage_for_test(vk::ShaderStageFlags::FRAGMENT);
        edit(&mut desc);
        ReplayStateSnapshot::capture(&desc)
    }

    fn count(commands: &[DynamicCommand], state: vk::DynamicState) -> usize {
        commands.iter().filter(|c| c.state() == state).count()
    }

    #[test]
    fn stencil_values_only_with_stencil_test() {
        let disabled = snapshot(|_| {}).commands(None);
        for state in [S::STENCIL_OP, S::STENCIL_COMPARE_MASK, S::STENCIL_WRITE_MASK, S::STENCIL_REFERENCE] {
            assert_eq!(count(&disabled, state), 0);
        }
        assert_eq!(count(&disabled, S::STENCIL_TEST_ENABLE), 1);

        let enabled = snapshot(|d| {
            d.depth_stencil = Some(DepthStencilState {
                stencil_test_enable: true,
                back: vk::StencilOpState { reference: 3, ..DEFAULT_STENCIL_OP_STATE },
                ..Default::default()
            });
        })
        .commands(None);
        assert_eq!(count(&enabled, S::STENCIL_REFERENCE), 2);
        assert_eq!(count(&enabled, S::STENCIL_COMPARE_MASK), 2);
    }

    #[test]
    fn line_width_only_for_lines() {
        let triangles = snapshot(|_| {}).commands(None);
        assert_eq!(count(&triangles, S::LINE_WIDTH), 0);

        let lines = snapshot(|d| {
            d.input_assembly = Some(InputAssemblyState {
                topology: vk::PrimitiveTopology::LINE_STRIP,
                primitive_restart_enable: false,
            });
        })
        .commands(None);
        assert_eq!(count(&lines, S::LINE_WIDTH), 1);

        let wireframe = snapshot(|d| {
            d.rasterization = Some(RasterizationState {
                polygon_mode: vk::PolygonMode::LINE,
                line: Some(LineRasterizationState {
                    mode: vk::LineRasterizationModeEXT::BRESENHAM,
                    stippled_line_enable: false,
                    stipple_factor: 1,
                    stipple_pattern: 0xffff,
                }),
                ..Default::default()
            });
        })
        .commands(None);
        assert_eq!(count(&wireframe, S::LINE_WIDTH), 1);
        assert!(wireframe.iter().any(|c| matches!(
            c,
            DynamicCommand::LineRasterizationMode(vk::LineRasterizationModeEXT::BRESENHAM)
        )));
    }

    #[test]
    fn rasterizer_discard_suppresses_fragment_state() {
        let commands = snapshot(|d| {
            d.rasterization = Some(RasterizationState {
                rasterizer_discard_enable: true,
                ..Default::default()
            });
        })
        .commands(None);
        assert_eq!(count(&commands, S::RASTERIZER_DISCARD_ENABLE), 1);
        assert_eq!(count(&commands, S::CULL_MODE), 0);
        assert_eq!(count(&commands, S::DEPTH_TEST_ENABLE), 0);
        assert_eq!(count(&commands, S::COLOR_WRITE_MASK_EXT), 0);
    }

    #[test]
    fn caller_dynamic_states_are_skipped() {
        let set = DynamicStateSet::new(&[S::VIEWPORT, S::CULL_MODE]);
        let snap = snapshot(|d| {
            d.viewport = Some(ViewportState {
                viewports: vec![vk::Viewport { width: 4.0, height: 4.0, max_depth: 1.0, ..Default::default() }],
                ..Default::default()
            });
        });
        let all = snap.commands(None);
        let skipped = snap.commands(Some(&set));
        assert_eq!(count(&all, S::VIEWPORT_WITH_COUNT), 1);
        assert_eq!(count(&skipped, S::VIEWPORT_WITH_COUNT), 0);
        assert_eq!(count(&skipped, S::CULL_MODE), 0);
        assert_eq!(all.len() - skipped.len(), 2);
    }

    #[test]
    fn dynamic_stride_still_replays_vertex_input() {
        let snap = snapshot(|d| {
            d.vertex_input = Some(VertexInputState {
                bindings: vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: 16,
                    input_rate: vk::VertexInputRate::VERTEX,
                }],
                attributes: vec![vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32B32A32_SFLOAT,
                    offset: 0,
                }],
            });
        });

        let stride_only = DynamicStateSet::new(&[S::VERTEX_INPUT_BINDING_STRIDE]);
        let commands = snap.commands(Some(&stride_only));
        assert_eq!(count(&commands, S::VERTEX_INPUT_EXT), 1);

        let whole_input = DynamicStateSet::new(&[S::VERTEX_INPUT_EXT]);
        assert_eq!(count(&snap.commands(Some(&whole_input)), S::VERTEX_INPUT_EXT), 0);
    }

    #[test]
    fn depth_clip_control_replays_only_when_chained() {
        let plain = snapshot(|_| {}).commands(None);
        assert_eq!(count(&plain, S::DEPTH_CLIP_NEGATIVE_ONE_TO_ONE_EXT), 0);

        let snap = snapshot(|d| {
            d.viewport = Some(ViewportState {
                chain: ViewportStateChain {
                    depth_clip_negative_one_to_one: Some(true),
                },
                ..Default::default()
            });
        });
        let commands = snap.commands(None);
        assert!(commands
            .iter()
            .any(|c| matches!(c, DynamicCommand::DepthClipNegativeOneToOne(true))));

        let set = DynamicStateSet::new(&[S::DEPTH_CLIP_NEGATIVE_ONE_TO_ONE_EXT]);
        assert_eq!(count(&snap.commands(Some(&set)), S::DEPTH_CLIP_NEGATIVE_ONE_TO_ONE_EXT), 0);
    }

    #[test]
    fn default_sample_mask_covers_all_samples() {
        let snap = snapshot(|d| {
            d.fragment_multisample = Some(MultisampleState {
                rasterization_samples: vk::SampleCountFlags::TYPE_64,
                ..Default::default()
            });
        });
        assert_eq!(snap.sample_mask, vec![u32::MAX, u32::MAX]);
    }

    #[test]
    fn mesh_pipelines_skip_vertex_input() {
        let mut desc = PipelineDescription::default();
        desc.push_stage_for_test(vk::ShaderStageFlags::MESH_EXT);
        let commands = ReplayStateSnapshot::capture(&desc).commands(None);
        assert_eq!(count(&commands, S::VERTEX_INPUT_EXT), 0);
        assert_eq!(count(&commands, S::PRIMITIVE_TOPOLOGY), 0);
    }
}
