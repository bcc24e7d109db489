// Fixed-function state blocks and construction vocabulary
//
// Every state block is owned, pointer-free data. Native create-info structs
// are only assembled at the device boundary, so a block captured into a
// library part or a replay snapshot can never be changed behind its back.

use ash::vk;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CONSTRUCTION TYPE
// =============================================================================

/// How a graphics pipeline description is realized on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineConstructionType {
    /// One `vkCreateGraphicsPipelines` call with the whole description
    Monolithic,
    /// Four library parts linked with link-time optimization
    LinkTimeOptimizedLibrary,
    /// Four library parts linked without optimization
    FastLinkedLibrary,
    ShaderObjectUnlinkedSpirv,
    ShaderObjectUnlinkedBinary,
    ShaderObjectLinkedSpirv,
    ShaderObjectLinkedBinary,
}

/// The three structurally different construction backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionFamily {
    Monolithic,
    Library,
    ShaderObject,
}

impl PipelineConstructionType {
    pub const ALL: [PipelineConstructionType; 7] = [
        Self::Monolithic,
        Self::LinkTimeOptimizedLibrary,
        Self::FastLinkedLibrary,
        Self::ShaderObjectUnlinkedSpirv,
        Self::ShaderObjectUnlinkedBinary,
        Self::ShaderObjectLinkedSpirv,
        Self::ShaderObjectLinkedBinary,
    ];

    pub fn family(self) -> ConstructionFamily {
        match self {
            Self::Monolithic => ConstructionFamily::Monolithic,
            Self::LinkTimeOptimizedLibrary | Self::FastLinkedLibrary => ConstructionFamily::Library,
            _ => ConstructionFamily::ShaderObject,
        }
    }

    pub fn is_shader_object(self) -> bool {
        self.family() == ConstructionFamily::ShaderObject
    }

    /// Shader objects created with `VK_SHADER_CREATE_LINK_STAGE_BIT_EXT`
    pub fn is_linked_shader_object(self) -> bool {
        matches!(self, Self::ShaderObjectLinkedSpirv | Self::ShaderObjectLinkedBinary)
    }

    /// Shader objects that must be round-tripped through their binary form
    pub fn uses_shader_binary(self) -> bool {
        matches!(self, Self::ShaderObjectUnlinkedBinary | Self::ShaderObjectLinkedBinary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monolithic => "monolithic",
            Self::LinkTimeOptimizedLibrary => "library-optimized",
            Self::FastLinkedLibrary => "library-fast",
            Self::ShaderObjectUnlinkedSpirv => "shader-object-unlinked-spirv",
            Self::ShaderObjectUnlinkedBinary => "shader-object-unlinked-binary",
            Self::ShaderObjectLinkedSpirv => "shader-object-linked-spirv",
            Self::ShaderObjectLinkedBinary => "shader-object-linked-binary",
        }
    }
}

impl fmt::Display for PipelineConstructionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineConstructionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.as_str() == normalized)
            .ok_or_else(|| format!("unknown pipeline construction type '{}'", s))
    }
}

// =============================================================================
// SETUP STATE
// =============================================================================

/// Bitmask of completed setup phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupState(u32);

impl SetupState {
    pub const NONE: Self = Self(0);
    pub const VERTEX_INPUT_INTERFACE: Self = Self(0x1);
    pub const PRE_RASTERIZATION_SHADERS: Self = Self(0x2);
    pub const FRAGMENT_SHADER: Self = Self(0x4);
    pub const FRAGMENT_OUTPUT_INTERFACE: Self = Self(0x8);
    pub const ALL: Self = Self(0xf);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for SetupState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SetupState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// SHADER-ADJACENT RECORDS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SpecializationInfo {
    pub map_entries: Vec<vk::SpecializationMapEntry>,
    pub data: Vec<u8>,
}

impl SpecializationInfo {
    /// Build from consecutive 4-byte constants with ids 0..n
    pub fn from_u32_constants(values: &[u32]) -> Self {
        let map_entries = (0..values.len() as u32)
            .map(|id| vk::SpecializationMapEntry {
                constant_id: id,
                offset: id * 4,
                size: 4,
            })
            .collect();
        let data = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self { map_entries, data }
    }
}

// =============================================================================
// FIXED-FUNCTION STATE BLOCKS
// =============================================================================

#[derive(Debug, Clone)]
pub struct VertexInputState {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl Default for VertexInputState {
    /// One vec4 position stream at binding 0 / location 0
    fn default() -> Self {
        Self {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: 4 * std::mem::size_of::<f32>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: vec![vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TessellationState {
    /// `u32::MAX` forces the tessellation block to be omitted
    pub patch_control_points: u32,
    /// Only chained when set
    pub domain_origin: Option<vk::TessellationDomainOrigin>,
}

impl Default for TessellationState {
    fn default() -> Self {
        Self {
            patch_control_points: 3,
            domain_origin: None,
        }
    }
}

/// Records chained onto the viewport state block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewportStateChain {
    /// `VK_EXT_depth_clip_control`: clip z against [-1, 1] instead of [0, 1]
    pub depth_clip_negative_one_to_one: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ViewportState {
    pub viewport_count: u32,
    pub scissor_count: u32,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub chain: ViewportStateChain,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            viewport_count: 1,
            scissor_count: 1,
            viewports: Vec::new(),
            scissors: Vec::new(),
            chain: ViewportStateChain::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineRasterizationState {
    pub mode: vk::LineRasterizationModeEXT,
    pub stippled_line_enable: bool,
    pub stipple_factor: u32,
    pub stipple_pattern: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
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
    // Extension blocks, chained only when present
    pub line: Option<LineRasterizationState>,
    pub provoking_vertex_mode: Option<vk::ProvokingVertexModeEXT>,
    pub conservative_mode: Option<vk::ConservativeRasterizationModeEXT>,
    pub extra_primitive_overestimation_size: f32,
    pub depth_clip_enable: Option<bool>,
    pub rasterization_stream: Option<u32>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
            line: None,
            provoking_vertex_mode: None,
            conservative_mode: None,
            extra_primitive_overestimation_size: 0.0,
            depth_clip_enable: None,
            rasterization_stream: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultisampleState {
    pub rasterization_samples: vk::SampleCountFlags,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    /// Empty means all samples enabled
    pub sample_mask: Vec<vk::SampleMask>,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: false,
            min_sample_shading: 1.0,
            sample_mask: Vec::new(),
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
        }
    }
}

pub const DEFAULT_STENCIL_OP_STATE: vk::StencilOpState = vk::StencilOpState {
    fail_op: vk::StencilOp::KEEP,
    pass_op: vk::StencilOp::KEEP,
    depth_fail_op: vk::StencilOp::KEEP,
    compare_op: vk::CompareOp::NEVER,
    compare_mask: 0,
    write_mask: 0,
    reference: 0,
};

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: vk::StencilOpState,
    pub back: vk::StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            front: DEFAULT_STENCIL_OP_STATE,
            back: DEFAULT_STENCIL_OP_STATE,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }
}

pub const DEFAULT_COLOR_BLEND_ATTACHMENT: vk::PipelineColorBlendAttachmentState =
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        src_color_blend_factor: vk::BlendFactor::ZERO,
        dst_color_blend_factor: vk::BlendFactor::ZERO,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ZERO,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::RGBA,
    };

#[derive(Debug, Clone)]
pub struct ColorBlendState {
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op_enable: false,
            logic_op: vk::LogicOp::CLEAR,
            attachments: vec![DEFAULT_COLOR_BLEND_ATTACHMENT],
            blend_constants: [0.0; 4],
        }
    }
}

impl ColorBlendState {
    pub fn any_blend_enabled(&self) -> bool {
        self.attachments.iter().any(|a| a.blend_enable == vk::TRUE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentShadingRateState {
    pub fragment_size: vk::Extent2D,
    pub combiner_ops: [vk::FragmentShadingRateCombinerOpKHR; 2],
}

impl Default for FragmentShadingRateState {
    fn default() -> Self {
        Self {
            fragment_size: vk::Extent2D { width: 1, height: 1 },
            combiner_ops: [vk::FragmentShadingRateCombinerOpKHR::KEEP; 2],
        }
    }
}

/// Attachment formats a pipeline renders to when no render pass object exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderingFormats {
    pub view_mask: u32,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: vk::Format,
    pub stencil_format: vk::Format,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineRobustness {
    pub storage_buffers: vk::PipelineRobustnessBufferBehaviorEXT,
    pub uniform_buffers: vk::PipelineRobustnessBufferBehaviorEXT,
    pub vertex_inputs: vk::PipelineRobustnessBufferBehaviorEXT,
    pub images: vk::PipelineRobustnessImageBehaviorEXT,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_type_parses_from_config_strings() {
        for ty in PipelineConstructionType::ALL {
            assert_eq!(ty.as_str().parse::<PipelineConstructionType>(), Ok(ty));
        }
        assert_eq!(
            "SHADER_OBJECT_LINKED_BINARY".parse::<PipelineConstructionType>(),
            Ok(PipelineConstructionType::ShaderObjectLinkedBinary)
        );
        assert!("vulkan-sc".parse::<PipelineConstructionType>().is_err());
    }

    #[test]
    fn families_and_variants() {
        use PipelineConstructionType::*;
        assert_eq!(Monolithic.family(), ConstructionFamily::Monolithic);
        assert_eq!(FastLinkedLibrary.family(), ConstructionFamily::Library);
        assert_eq!(ShaderObjectUnlinkedBinary.family(), ConstructionFamily::ShaderObject);
        assert!(ShaderObjectLinkedSpirv.is_linked_shader_object());
        assert!(!ShaderObjectUnlinkedBinary.is_linked_shader_object());
        assert!(ShaderObjectUnlinkedBinary.uses_shader_binary());
        assert!(!LinkTimeOptimizedLibrary.uses_shader_binary());
    }

    #[test]
    fn setup_state_accumulates() {
        let mut state = SetupState::NONE;
        state |= SetupState::VERTEX_INPUT_INTERFACE;
        state |= SetupState::PRE_RASTERIZATION_SHADERS;
        assert!(state.contains(SetupState::VERTEX_INPUT_INTERFACE | SetupState::PRE_RASTERIZATION_SHADERS));
        assert!(!state.contains(SetupState::FRAGMENT_SHADER));
        assert_eq!(state.bits(), 0x3);
    }

    #[test]
    fn specialization_constants_are_packed() {
        let info = SpecializationInfo::from_u32_constants(&[7, 9]);
        assert_eq!(info.map_entries.len(), 2);
        assert_eq!(info.map_entries[1].offset, 4);
        assert_eq!(info.data.len(), 8);
    }
}
