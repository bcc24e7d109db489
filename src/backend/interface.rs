// Device boundary
//
// Everything the wrappers need from the driver goes through `DeviceInterface`.
// Arguments are owned, pointer-free records; the ash backend turns them into
// create-info structs, the recorder logs them.

use crate::pipeline::chain::ExtensionChain;
use crate::pipeline::state::{
    ColorBlendState, DepthStencilState, InputAssemblyState, MultisampleState, RasterizationState,
    SpecializationInfo, TessellationState, VertexInputState, ViewportState,
};
use ash::vk;
use std::sync::Arc;

pub type VkResult<T> = Result<T, vk::Result>;

// =============================================================================
// CREATION RECORDS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutDesc {
    pub flags: vk::PipelineLayoutCreateFlags,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

#[derive(Debug, Clone, Default)]
pub struct ShaderStageDesc {
    pub stage: vk::ShaderStageFlags,
    /// Null when the stage is only known by its module identifier
    pub module: vk::ShaderModule,
    pub specialization: Option<SpecializationInfo>,
    pub module_identifier: Option<Vec<u8>>,
}

/// One graphics pipeline creation: monolithic, a library part, or a link.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub flags: vk::PipelineCreateFlags,
    pub stages: Vec<ShaderStageDesc>,
    pub vertex_input: Option<VertexInputState>,
    pub input_assembly: Option<InputAssemblyState>,
    pub tessellation: Option<TessellationState>,
    pub viewport: Option<ViewportState>,
    pub rasterization: Option<RasterizationState>,
    pub multisample: Option<MultisampleState>,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_blend: Option<ColorBlendState>,
    /// `None` omits the dynamic state block entirely
    pub dynamic_states: Option<Vec<vk::DynamicState>>,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    /// Library parts to link; empty for anything but a link
    pub libraries: Vec<vk::Pipeline>,
    pub base_pipeline: vk::Pipeline,
    pub base_pipeline_index: i32,
    pub chain: ExtensionChain,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            flags: vk::PipelineCreateFlags::empty(),
            stages: Vec::new(),
            vertex_input: None,
            input_assembly: None,
            tessellation: None,
            viewport: None,
            rasterization: None,
            multisample: None,
            depth_stencil: None,
            color_blend: None,
            dynamic_states: None,
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            libraries: Vec::new(),
            base_pipeline: vk::Pipeline::null(),
            base_pipeline_index: -1,
            chain: ExtensionChain::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ShaderCode {
    Spirv(Arc<[u32]>),
    Binary(Arc<[u8]>),
}

#[derive(Debug, Clone)]
pub struct ShaderObjectDesc {
    pub flags: vk::ShaderCreateFlagsEXT,
    pub stage: vk::ShaderStageFlags,
    pub next_stage: vk::ShaderStageFlags,
    pub code: ShaderCode,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub specialization: Option<SpecializationInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct SubpassDesc {
    pub input: Vec<vk::AttachmentReference>,
    pub color: Vec<vk::AttachmentReference>,
    /// Empty or one entry per color reference (`vk::ATTACHMENT_UNUSED` allowed)
    pub resolve: Vec<vk::AttachmentReference>,
    pub depth_stencil: Option<vk::AttachmentReference>,
    pub preserve: Vec<u32>,
    pub view_mask: u32,
}

impl SubpassDesc {
    /// Every attachment reference used by the subpass, in declaration order.
    pub fn references(&self) -> impl Iterator<Item = &vk::AttachmentReference> {
        self.input
            .iter()
            .chain(self.color.iter())
            .chain(self.resolve.iter())
            .chain(self.depth_stencil.iter())
            .filter(|r| r.attachment != vk::ATTACHMENT_UNUSED)
    }
}

/// Legacy multi-subpass render description.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

// =============================================================================
// COMMAND RECORDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Float([0.0; 4])
    }
}

impl ClearValue {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Float(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::Int(int32) => vk::ClearValue {
                color: vk::ClearColorValue { int32 },
            },
            Self::Uint(uint32) => vk::ClearValue {
                color: vk::ClearColorValue { uint32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderPassBeginDesc {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: Vec<ClearValue>,
    pub contents: vk::SubpassContents,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderingAttachmentDesc {
    /// Index into the originating render pass description
    pub attachment: u32,
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub resolve_mode: vk::ResolveModeFlags,
    pub resolve_view: vk::ImageView,
    pub resolve_layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: ClearValue,
}

/// A begin/end rendering region targeting image views directly.
#[derive(Debug, Clone, Default)]
pub struct RenderingScopeDesc {
    pub flags: vk::RenderingFlags,
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
    pub view_mask: u32,
    pub color: Vec<RenderingAttachmentDesc>,
    pub depth: Option<RenderingAttachmentDesc>,
    pub stencil: Option<RenderingAttachmentDesc>,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryBarrierDesc {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageBarrierDesc {
    pub attachment: u32,
    pub image: vk::Image,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub subresource_range: vk::ImageSubresourceRange,
}

#[derive(Debug, Clone, Default)]
pub struct BarrierDesc {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dependency_flags: vk::DependencyFlags,
    pub memory: Vec<MemoryBarrierDesc>,
    pub images: Vec<ImageBarrierDesc>,
}

#[derive(Debug, Clone, Copy)]
pub struct ClearAttachmentDesc {
    pub aspect_mask: vk::ImageAspectFlags,
    pub color_attachment: u32,
    pub value: ClearValue,
}

/// One draw-time state-setting call.
#[derive(Debug, Clone)]
pub enum DynamicCommand {
    VertexInput {
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    },
    PrimitiveTopology(vk::PrimitiveTopology),
    PrimitiveRestartEnable(bool),
    PatchControlPoints(u32),
    TessellationDomainOrigin(vk::TessellationDomainOrigin),
    ViewportWithCount(Vec<vk::Viewport>),
    ScissorWithCount(Vec<vk::Rect2D>),
    RasterizerDiscardEnable(bool),
    PolygonMode(vk::PolygonMode),
    CullMode(vk::CullModeFlags),
    FrontFace(vk::FrontFace),
    DepthBiasEnable(bool),
    DepthBias { constant_factor: f32, clamp: f32, slope_factor: f32 },
    LineWidth(f32),
    LineRasterizationMode(vk::LineRasterizationModeEXT),
    LineStippleEnable(bool),
    DepthClampEnable(bool),
    DepthClipEnable(bool),
    DepthClipNegativeOneToOne(bool),
    ProvokingVertexMode(vk::ProvokingVertexModeEXT),
    ConservativeRasterizationMode(vk::ConservativeRasterizationModeEXT),
    ExtraPrimitiveOverestimationSize(f32),
    RasterizationStream(u32),
    RasterizationSamples(vk::SampleCountFlags),
    SampleMask { samples: vk::SampleCountFlags, mask: Vec<vk::SampleMask> },
    AlphaToCoverageEnable(bool),
    AlphaToOneEnable(bool),
    DepthTestEnable(bool),
    DepthWriteEnable(bool),
    DepthCompareOp(vk::CompareOp),
    DepthBoundsTestEnable(bool),
    DepthBounds { min: f32, max: f32 },
    StencilTestEnable(bool),
    StencilOp {
        face: vk::StencilFaceFlags,
        fail_op: vk::StencilOp,
        pass_op: vk::StencilOp,
        depth_fail_op: vk::StencilOp,
        compare_op: vk::CompareOp,
    },
    StencilCompareMask { face: vk::StencilFaceFlags, mask: u32 },
    StencilWriteMask { face: vk::StencilFaceFlags, mask: u32 },
    StencilReference { face: vk::StencilFaceFlags, reference: u32 },
    LogicOpEnable(bool),
    LogicOp(vk::LogicOp),
    ColorBlendEnable(Vec<bool>),
    ColorBlendEquation(Vec<vk::ColorBlendEquationEXT>),
    ColorWriteMask(Vec<vk::ColorComponentFlags>),
    BlendConstants([f32; 4]),
    FragmentShadingRate {
        fragment_size: vk::Extent2D,
        combiner_ops: [vk::FragmentShadingRateCombinerOpKHR; 2],
    },
}

impl DynamicCommand {
    /// The dynamic state this command sets.
    pub fn state(&self) -> vk::DynamicState {
        use vk::DynamicState as S;
        match self {
            Self::VertexInput { .. } => S::VERTEX_INPUT_EXT,
            Self::PrimitiveTopology(_) => S::PRIMITIVE_TOPOLOGY,
            Self::PrimitiveRestartEnable(_) => S::PRIMITIVE_RESTART_ENABLE,
            Self::PatchControlPoints(_) => S::PATCH_CONTROL_POINTS_EXT,
            Self::TessellationDomainOrigin(_) => S::TESSELLATION_DOMAIN_ORIGIN_EXT,
            Self::ViewportWithCount(_) => S::VIEWPORT_WITH_COUNT,
            Self::ScissorWithCount(_) => S::SCISSOR_WITH_COUNT,
            Self::RasterizerDiscardEnable(_) => S::RASTERIZER_DISCARD_ENABLE,
            Self::PolygonMode(_) => S::POLYGON_MODE_EXT,
            Self::CullMode(_) => S::CULL_MODE,
            Self::FrontFace(_) => S::FRONT_FACE,
            Self::DepthBiasEnable(_) => S::DEPTH_BIAS_ENABLE,
            Self::DepthBias { .. } => S::DEPTH_BIAS,
            Self::LineWidth(_) => S::LINE_WIDTH,
            Self::LineRasterizationMode(_) => S::LINE_RASTERIZATION_MODE_EXT,
            Self::LineStippleEnable(_) => S::LINE_STIPPLE_ENABLE_EXT,
            Self::DepthClampEnable(_) => S::DEPTH_CLAMP_ENABLE_EXT,
            Self::DepthClipEnable(_) => S::DEPTH_CLIP_ENABLE_EXT,
            Self::DepthClipNegativeOneToOne(_) => S::DEPTH_CLIP_NEGATIVE_ONE_TO_ONE_EXT,
            Self::ProvokingVertexMode(_) => S::PROVOKING_VERTEX_MODE_EXT,
            Self::ConservativeRasterizationMode(_) => S::CONSERVATIVE_RASTERIZATION_MODE_EXT,
            Self::ExtraPrimitiveOverestimationSize(_) => S::EXTRA_PRIMITIVE_OVERESTIMATION_SIZE_EXT,
            Self::RasterizationStream(_) => S::RASTERIZATION_STREAM_EXT,
            Self::RasterizationSamples(_) => S::RASTERIZATION_SAMPLES_EXT,
            Self::SampleMask { .. } => S::SAMPLE_MASK_EXT,
            Self::AlphaToCoverageEnable(_) => S::ALPHA_TO_COVERAGE_ENABLE_EXT,
            Self::AlphaToOneEnable(_) => S::ALPHA_TO_ONE_ENABLE_EXT,
            Self::DepthTestEnable(_) => S::DEPTH_TEST_ENABLE,
            Self::DepthWriteEnable(_) => S::DEPTH_WRITE_ENABLE,
            Self::DepthCompareOp(_) => S::DEPTH_COMPARE_OP,
            Self::DepthBoundsTestEnable(_) => S::DEPTH_BOUNDS_TEST_ENABLE,
            Self::DepthBounds { .. } => S::DEPTH_BOUNDS,
            Self::StencilTestEnable(_) => S::STENCIL_TEST_ENABLE,
            Self::StencilOp { .. } => S::STENCIL_OP,
            Self::StencilCompareMask { .. } => S::STENCIL_COMPARE_MASK,
            Self::StencilWriteMask { .. } => S::STENCIL_WRITE_MASK,
            Self::StencilReference { .. } => S::STENCIL_REFERENCE,
            Self::LogicOpEnable(_) => S::LOGIC_OP_ENABLE_EXT,
            Self::LogicOp(_) => S::LOGIC_OP_EXT,
            Self::ColorBlendEnable(_) => S::COLOR_BLEND_ENABLE_EXT,
            Self::ColorBlendEquation(_) => S::COLOR_BLEND_EQUATION_EXT,
            Self::ColorWriteMask(_) => S::COLOR_WRITE_MASK_EXT,
            Self::BlendConstants(_) => S::BLEND_CONSTANTS,
            Self::FragmentShadingRate { .. } => S::FRAGMENT_SHADING_RATE_KHR,
        }
    }
}

// =============================================================================
// THE TRAIT
// =============================================================================

/// Synchronous access to one logical device.
///
/// Creation calls are individually fallible; command recording is not.
pub trait DeviceInterface: Send + Sync {
    fn create_shader_module(
        &self,
        code: &[u32],
        flags: vk::ShaderModuleCreateFlags,
    ) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        desc: &GraphicsPipelineDesc,
    ) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    /// All stages in one call so linked stages see each other.
    fn create_shaders(&self, descs: &[ShaderObjectDesc]) -> VkResult<Vec<vk::ShaderEXT>>;
    fn get_shader_binary_data(&self, shader: vk::ShaderEXT) -> VkResult<Vec<u8>>;
    fn destroy_shader(&self, shader: vk::ShaderEXT);

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, desc: &FramebufferDesc) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBeginDesc);
    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer, contents: vk::SubpassContents);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, scope: &RenderingScopeDesc);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    fn cmd_pipeline_barrier(&self, cmd: vk::CommandBuffer, barrier: &BarrierDesc);
    fn cmd_clear_attachments(
        &self,
        cmd: vk::CommandBuffer,
        attachments: &[ClearAttachmentDesc],
        rects: &[vk::ClearRect],
    );

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    /// A null shader unbinds the stage.
    fn cmd_bind_shader(&self, cmd: vk::CommandBuffer, stage: vk::ShaderStageFlags, shader: vk::ShaderEXT);
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn cmd_set_dynamic_state(&self, cmd: vk::CommandBuffer, command: &DynamicCommand);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subpass_references_skip_unused() {
        let subpass = SubpassDesc {
            color: vec![
                vk::AttachmentReference { attachment: 0, layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL },
                vk::AttachmentReference {
                    attachment: vk::ATTACHMENT_UNUSED,
                    layout: vk::ImageLayout::UNDEFINED,
                },
            ],
            depth_stencil: Some(vk::AttachmentReference {
                attachment: 2,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }),
            ..Default::default()
        };
        let used: Vec<u32> = subpass.references().map(|r| r.attachment).collect();
        assert_eq!(used, vec![0, 2]);
    }

    #[test]
    fn dynamic_commands_know_their_state() {
        assert_eq!(DynamicCommand::LineWidth(2.0).state(), vk::DynamicState::LINE_WIDTH);
        assert_eq!(
            DynamicCommand::StencilReference { face: vk::StencilFaceFlags::FRONT_AND_BACK, reference: 1 }.state(),
            vk::DynamicState::STENCIL_REFERENCE
        );
    }
}
