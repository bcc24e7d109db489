// Graphics pipeline wrapper
//
// The caller describes a pipeline in four ordered phases and gets the same
// bind behavior whichever construction type realizes it. Phase setup only
// collects state into a `PipelineDescription`; the construction backend
// decides what to do with it (nothing yet, create a library part, or wait
// for `build_pipeline`).

use super::chain::{ExtensionChain, FeedbackSink};
use super::dynamic::DynamicStateSet;
use super::layout::{PipelineLayoutInfo, PipelineLayoutWrapper};
use super::library::{LibraryBackend, LibraryPart};
use super::monolithic::MonolithicBackend;
use super::shader::ShaderWrapper;
use super::shader_object::ShaderObjectBackend;
use super::state::*;
use crate::backend::interface::{DeviceInterface, ShaderStageDesc};
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

// =============================================================================
// SETUP PARAMETERS
// =============================================================================

/// Cache and creation feedback for one library part. Ignored by the other
/// construction types.
#[derive(Debug, Clone, Default)]
pub struct PartOptions {
    pub cache: vk::PipelineCache,
    pub feedback: Option<FeedbackSink>,
}

/// A shader plus the specialization constants it is attached with.
#[derive(Debug, Clone, Default)]
pub struct ShaderStage {
    pub shader: ShaderWrapper,
    pub specialization: Option<SpecializationInfo>,
}

impl From<ShaderWrapper> for ShaderStage {
    fn from(shader: ShaderWrapper) -> Self {
        Self {
            shader,
            specialization: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputSetup {
    pub vertex_input: Option<VertexInputState>,
    pub input_assembly: Option<InputAssemblyState>,
    /// Keep absent blocks absent instead of substituting defaults
    pub use_null_blocks: bool,
    pub part: PartOptions,
}

#[derive(Debug, Clone, Default)]
pub struct PreRasterizationSetup {
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub viewport_chain: ViewportStateChain,
    pub layout: PipelineLayoutInfo,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub vertex: ShaderStage,
    pub tessellation_control: ShaderStage,
    pub tessellation_evaluation: ShaderStage,
    pub geometry: ShaderStage,
    pub rasterization: Option<RasterizationState>,
    pub fragment_shading_rate: Option<FragmentShadingRateState>,
    pub rendering: Option<RenderingFormats>,
    pub part: PartOptions,
}

#[derive(Debug, Clone, Default)]
pub struct MeshShaderSetup {
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub viewport_chain: ViewportStateChain,
    pub layout: PipelineLayoutInfo,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub task: ShaderStage,
    pub mesh: ShaderStage,
    pub rasterization: Option<RasterizationState>,
    pub fragment_shading_rate: Option<FragmentShadingRateState>,
    pub rendering: Option<RenderingFormats>,
    pub part: PartOptions,
}

#[derive(Debug, Clone, Default)]
pub struct FragmentShaderSetup {
    /// Null keeps the layout pinned by an earlier phase
    pub layout: PipelineLayoutInfo,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub fragment: ShaderStage,
    pub depth_stencil: Option<DepthStencilState>,
    pub multisample: Option<MultisampleState>,
    pub part: PartOptions,
}

#[derive(Debug, Clone, Default)]
pub struct FragmentOutputSetup {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub color_blend: Option<ColorBlendState>,
    pub multisample: Option<MultisampleState>,
    pub part: PartOptions,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub cache: vk::PipelineCache,
    pub base_pipeline: vk::Pipeline,
    pub base_pipeline_index: i32,
    pub feedback: Option<FeedbackSink>,
    /// Extra records chained onto a monolithic pipeline
    pub extra_chain: ExtensionChain,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            cache: vk::PipelineCache::null(),
            base_pipeline: vk::Pipeline::null(),
            base_pipeline_index: -1,
            feedback: None,
            extra_chain: ExtensionChain::new(),
        }
    }
}

// =============================================================================
// COLLECTED STATE
// =============================================================================

#[derive(Debug, Clone)]
pub struct StageShader {
    pub stage: vk::ShaderStageFlags,
    pub shader: ShaderWrapper,
}

/// Everything the phases have collected so far.
#[derive(Debug, Clone, Default)]
pub(crate) struct PipelineDescription {
    pub flags: vk::PipelineCreateFlags,
    pub dynamic_states: Option<DynamicStateSet>,
    pub layout: PipelineLayoutInfo,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    /// In attach order
    pub stages: Vec<StageShader>,

    pub vertex_input: Option<VertexInputState>,
    pub input_assembly: Option<InputAssemblyState>,
    pub tessellation: Option<TessellationState>,
    pub viewport: Option<ViewportState>,
    pub rasterization: Option<RasterizationState>,
    pub fragment_shading_rate: Option<FragmentShadingRateState>,
    pub rendering: Option<RenderingFormats>,
    pub depth_stencil: Option<DepthStencilState>,
    pub fragment_multisample: Option<MultisampleState>,
    pub output_multisample: Option<MultisampleState>,
    pub color_blend: Option<ColorBlendState>,
    pub representative_fragment_test: Option<bool>,
    pub robustness: Option<PipelineRobustness>,

    /// Some stage is known only by its module identifier
    pub fail_on_compile_required: bool,
}

impl PipelineDescription {
    pub fn has_stage(&self, stage: vk::ShaderStageFlags) -> bool {
        self.stages.iter().any(|s| s.stage == stage)
    }

    /// The fragment output multisample state wins over the fragment shader one.
    pub fn multisample(&self) -> Option<&MultisampleState> {
        self.output_multisample.as_ref().or(self.fragment_multisample.as_ref())
    }

    /// Stage records for module-based creation, realizing modules on the way.
    pub fn stage_descs(
        &self,
        device: &Arc<dyn DeviceInterface>,
        include: impl Fn(vk::ShaderStageFlags) -> bool,
    ) -> Result<Vec<ShaderStageDesc>> {
        self.stages
            .iter()
            .filter(|s| include(s.stage))
            .map(|s| {
                Ok(ShaderStageDesc {
                    stage: s.stage,
                    module: s.shader.realize(device)?,
                    specialization: s.shader.specialization().cloned(),
                    module_identifier: s.shader.module_identifier().map(<[u8]>::to_vec),
                })
            })
            .collect()
    }

    #[cfg(test)]
    pub fn push_stage_for_test(&mut self, stage: vk::ShaderStageFlags) {
        self.stages.push(StageShader {
            stage,
            shader: ShaderWrapper::from_spirv(vec![0x0723_0203u32]),
        });
    }
}

/// Values used when a phase does not supply its own block.
#[derive(Debug, Clone)]
struct Defaults {
    input_assembly: InputAssemblyState,
    tessellation: TessellationState,
    rasterization: RasterizationState,
    viewport_count: u32,
    scissor_count: u32,
    use_viewport_state: bool,
    use_default_rasterization: bool,
    use_default_depth_stencil: bool,
    use_default_color_blend: bool,
    use_default_multisample: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            input_assembly: InputAssemblyState::default(),
            tessellation: TessellationState::default(),
            rasterization: RasterizationState::default(),
            viewport_count: 1,
            scissor_count: 1,
            use_viewport_state: true,
            use_default_rasterization: false,
            use_default_depth_stencil: false,
            use_default_color_blend: false,
            use_default_multisample: false,
        }
    }
}

// =============================================================================
// CONSTRUCTION BACKENDS
// =============================================================================

/// One way of turning a `PipelineDescription` into something bindable.
pub(crate) trait ConstructionBackend: Send + Sync {
    /// Called at the end of each phase setup.
    fn create_part(
        &mut self,
        _device: &Arc<dyn DeviceInterface>,
        _part: LibraryPart,
        _desc: &PipelineDescription,
        _options: &PartOptions,
    ) -> Result<()> {
        Ok(())
    }

    fn build(
        &mut self,
        device: &Arc<dyn DeviceInterface>,
        desc: &PipelineDescription,
        options: &BuildOptions,
    ) -> Result<()>;

    fn bind(&self, device: &dyn DeviceInterface, cmd: vk::CommandBuffer);

    fn is_built(&self) -> bool;

    /// Null for shader objects
    fn pipeline(&self) -> vk::Pipeline;

    fn shader_objects(&self) -> Vec<(vk::ShaderStageFlags, vk::ShaderEXT)> {
        Vec::new()
    }

    /// Destroy the final object(s). Library parts are released too.
    fn release(&mut self, device: &dyn DeviceInterface);
}

// =============================================================================
// THE WRAPPER
// =============================================================================

pub struct GraphicsPipelineWrapper {
    construction_type: PipelineConstructionType,
    device: Arc<dyn DeviceInterface>,
    setup_state: SetupState,
    finalized: bool,
    layout_pinned: bool,
    defaults: Defaults,
    desc: PipelineDescription,
    backend: Box<dyn ConstructionBackend>,
}

impl GraphicsPipelineWrapper {
    pub fn new(
        device: Arc<dyn DeviceInterface>,
        construction_type: PipelineConstructionType,
        flags: vk::PipelineCreateFlags,
    ) -> Self {
        let backend: Box<dyn ConstructionBackend> = match construction_type.family() {
            ConstructionFamily::Monolithic => Box::new(MonolithicBackend::default()),
            ConstructionFamily::Library => Box::new(LibraryBackend::new(
                construction_type == PipelineConstructionType::LinkTimeOptimizedLibrary,
            )),
            ConstructionFamily::ShaderObject => Box::new(ShaderObjectBackend::new(construction_type)),
        };

        Self {
            construction_type,
            device,
            setup_state: SetupState::NONE,
            finalized: false,
            layout_pinned: false,
            defaults: Defaults::default(),
            desc: PipelineDescription {
                flags,
                ..Default::default()
            },
            backend,
        }
    }

    pub fn construction_type(&self) -> PipelineConstructionType {
        self.construction_type
    }

    pub fn setup_state(&self) -> SetupState {
        self.setup_state
    }

    fn assert_before(&self, phase: SetupState, what: &str) {
        assert!(
            !self.finalized && !self.setup_state.contains(phase),
            "{} must be set before the {:?} phase (current: {:#x})",
            what,
            phase,
            self.setup_state.bits()
        );
    }

    // -------------------------------------------------------------------------
    // Pre-phase configuration
    // -------------------------------------------------------------------------

    /// Every phase needs to know the dynamic states, so this comes first.
    pub fn set_dynamic_states(&mut self, states: &[vk::DynamicState]) -> &mut Self {
        self.assert_before(SetupState::VERTEX_INPUT_INTERFACE, "dynamic states");
        self.desc.dynamic_states = Some(DynamicStateSet::new(states));
        self
    }

    /// Pin the layout; later phases will not replace it.
    pub fn set_monolithic_pipeline_layout(&mut self, layout: &PipelineLayoutWrapper) -> &mut Self {
        assert!(!self.finalized, "pipeline was already built");
        self.desc.layout = layout.info().clone();
        self.layout_pinned = true;
        self
    }

    pub fn set_default_topology(&mut self, topology: vk::PrimitiveTopology) -> &mut Self {
        self.assert_before(SetupState::VERTEX_INPUT_INTERFACE, "default topology");
        self.defaults.input_assembly.topology = topology;
        self
    }

    /// `u32::MAX` forces the tessellation block to be left out.
    pub fn set_default_patch_control_points(&mut self, patch_control_points: u32) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "patch control points");
        self.defaults.tessellation.patch_control_points = patch_control_points;
        self
    }

    /// The domain origin record is only chained when forced, non-default, or
    /// already present.
    pub fn set_default_tessellation_domain_origin(
        &mut self,
        domain_origin: vk::TessellationDomainOrigin,
        force: bool,
    ) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "tessellation domain origin");
        let tessellation = &mut self.defaults.tessellation;
        if force
            || domain_origin != vk::TessellationDomainOrigin::UPPER_LEFT
            || tessellation.domain_origin.is_some()
        {
            tessellation.domain_origin = Some(domain_origin);
        }
        self
    }

    pub fn set_default_rasterizer_discard_enable(&mut self, enable: bool) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "rasterizer discard");
        self.defaults.rasterization.rasterizer_discard_enable = enable;
        self
    }

    pub fn set_default_rasterization_state(&mut self) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "default rasterization state");
        self.defaults.use_default_rasterization = true;
        self
    }

    pub fn set_default_depth_stencil_state(&mut self) -> &mut Self {
        self.assert_before(SetupState::FRAGMENT_SHADER, "default depth/stencil state");
        self.defaults.use_default_depth_stencil = true;
        self
    }

    pub fn set_default_color_blend_state(&mut self) -> &mut Self {
        self.assert_before(SetupState::FRAGMENT_SHADER, "default color blend state");
        self.defaults.use_default_color_blend = true;
        self
    }

    pub fn set_default_multisample_state(&mut self) -> &mut Self {
        self.assert_before(SetupState::FRAGMENT_SHADER, "default multisample state");
        self.defaults.use_default_multisample = true;
        self
    }

    pub fn set_default_viewports_count(&mut self, count: u32) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "viewport count");
        self.defaults.viewport_count = count;
        self
    }

    pub fn set_default_scissors_count(&mut self, count: u32) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "scissor count");
        self.defaults.scissor_count = count;
        self
    }

    pub fn disable_viewport_state(&mut self, disable: bool) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "viewport state");
        self.defaults.use_viewport_state = !disable;
        self
    }

    pub fn set_representative_fragment_test_state(&mut self, enable: Option<bool>) -> &mut Self {
        self.assert_before(SetupState::FRAGMENT_SHADER, "representative fragment test state");
        self.desc.representative_fragment_test = enable;
        self
    }

    pub fn set_pipeline_robustness(&mut self, robustness: PipelineRobustness) -> &mut Self {
        self.assert_before(SetupState::PRE_RASTERIZATION_SHADERS, "pipeline robustness");
        self.desc.robustness = Some(robustness);
        self
    }

    /// Library parts other than fragment output only need the view mask of
    /// the rendering formats; this supplies the full formats afterwards.
    pub fn set_rendering_color_attachments_info(&mut self, rendering: RenderingFormats) -> &mut Self {
        let Some(current) = &self.desc.rendering else {
            return self;
        };
        if self.construction_type == PipelineConstructionType::Monolithic {
            return self;
        }
        assert!(
            self.setup_state.contains(SetupState::PRE_RASTERIZATION_SHADERS)
                && !self.setup_state.contains(SetupState::FRAGMENT_OUTPUT_INTERFACE),
            "rendering attachment info must be replaced between pre-rasterization and fragment output"
        );
        assert_eq!(current.view_mask, rendering.view_mask, "rendering view mask must not change");
        self.desc.rendering = Some(rendering);
        self
    }

    // -------------------------------------------------------------------------
    // Phases
    // -------------------------------------------------------------------------

    pub fn setup_vertex_input_state(&mut self, setup: VertexInputSetup) -> Result<&mut Self> {
        assert!(!self.finalized, "pipeline was already built");
        assert_eq!(
            self.setup_state,
            SetupState::NONE,
            "vertex input state must be set up first"
        );
        self.setup_state = SetupState::VERTEX_INPUT_INTERFACE;
        log::debug!("[{}] vertex input interface", self.construction_type);

        self.desc.vertex_input = match setup.vertex_input {
            Some(state) => Some(state),
            None if setup.use_null_blocks => None,
            None => Some(VertexInputState::default()),
        };
        self.desc.input_assembly = match setup.input_assembly {
            Some(state) => Some(state),
            None if setup.use_null_blocks => None,
            None => Some(self.defaults.input_assembly),
        };

        self.backend
            .create_part(&self.device, LibraryPart::VertexInput, &self.desc, &setup.part)?;
        Ok(self)
    }

    pub fn setup_pre_rasterization_shader_state(&mut self, setup: PreRasterizationSetup) -> Result<&mut Self> {
        assert!(!self.finalized, "pipeline was already built");
        assert_eq!(
            self.setup_state,
            SetupState::VERTEX_INPUT_INTERFACE,
            "pre-rasterization state must follow vertex input state"
        );
        self.setup_state |= SetupState::PRE_RASTERIZATION_SHADERS;
        log::debug!("[{}] pre-rasterization shaders", self.construction_type);

        self.pin_layout(&setup.layout);
        self.desc.render_pass = setup.render_pass;
        self.desc.subpass = setup.subpass;
        self.desc.fragment_shading_rate = setup.fragment_shading_rate;
        self.desc.rendering = setup.rendering;
        self.desc.rasterization = self.rasterization_or_default(setup.rasterization);
        self.desc.viewport = self.viewport_state(setup.viewports, setup.scissors, setup.viewport_chain);

        self.attach_stage(vk::ShaderStageFlags::VERTEX, setup.vertex);
        self.attach_stage(vk::ShaderStageFlags::TESSELLATION_CONTROL, setup.tessellation_control);
        self.attach_stage(vk::ShaderStageFlags::TESSELLATION_EVALUATION, setup.tessellation_evaluation);
        self.attach_stage(vk::ShaderStageFlags::GEOMETRY, setup.geometry);

        // A patch list needs the tessellation block even when the
        // tessellation stages come from a binary
        let has_tessellation = self.desc.has_stage(vk::ShaderStageFlags::TESSELLATION_CONTROL)
            || self.desc.has_stage(vk::ShaderStageFlags::TESSELLATION_EVALUATION);
        let patch_list = self.desc.input_assembly.map(|ia| ia.topology)
            == Some(vk::PrimitiveTopology::PATCH_LIST);
        let force_null = self.defaults.tessellation.patch_control_points == u32::MAX;
        self.desc.tessellation =
            ((has_tessellation || patch_list) && !force_null).then_some(self.defaults.tessellation);

        self.backend
            .create_part(&self.device, LibraryPart::PreRasterization, &self.desc, &setup.part)?;
        Ok(self)
    }

    /// Mesh pipelines have no vertex input, so this completes the first two
    /// phases at once.
    pub fn setup_pre_rasterization_mesh_shader_state(&mut self, setup: MeshShaderSetup) -> Result<&mut Self> {
        assert!(!self.finalized, "pipeline was already built");
        assert_eq!(
            self.setup_state,
            SetupState::NONE,
            "mesh shader state replaces vertex input and must come first"
        );
        self.setup_state = SetupState::VERTEX_INPUT_INTERFACE | SetupState::PRE_RASTERIZATION_SHADERS;
        log::debug!("[{}] mesh pre-rasterization shaders", self.construction_type);

        self.pin_layout(&setup.layout);
        self.desc.render_pass = setup.render_pass;
        self.desc.subpass = setup.subpass;
        self.desc.fragment_shading_rate = setup.fragment_shading_rate;
        self.desc.rendering = setup.rendering;
        self.desc.rasterization = self.rasterization_or_default(setup.rasterization);
        self.desc.viewport = self.viewport_state(setup.viewports, setup.scissors, setup.viewport_chain);
        self.desc.tessellation = None;

        self.attach_stage(vk::ShaderStageFlags::MESH_EXT, setup.mesh);
        self.attach_stage(vk::ShaderStageFlags::TASK_EXT, setup.task);

        self.backend
            .create_part(&self.device, LibraryPart::MeshPreRasterization, &self.desc, &setup.part)?;
        Ok(self)
    }

    pub fn setup_fragment_shader_state(&mut self, setup: FragmentShaderSetup) -> Result<&mut Self> {
        assert!(!self.finalized, "pipeline was already built");
        assert_eq!(
            self.setup_state,
            SetupState::VERTEX_INPUT_INTERFACE | SetupState::PRE_RASTERIZATION_SHADERS,
            "fragment shader state must follow pre-rasterization state"
        );
        self.setup_state |= SetupState::FRAGMENT_SHADER;
        log::debug!("[{}] fragment shader", self.construction_type);

        self.pin_layout(&setup.layout);
        self.desc.render_pass = setup.render_pass;
        self.desc.subpass = setup.subpass;
        self.desc.depth_stencil = setup
            .depth_stencil
            .or_else(|| self.defaults.use_default_depth_stencil.then(DepthStencilState::default));
        self.desc.fragment_multisample = setup
            .multisample
            .or_else(|| self.defaults.use_default_multisample.then(MultisampleState::default));
        self.attach_stage(vk::ShaderStageFlags::FRAGMENT, setup.fragment);

        self.backend
            .create_part(&self.device, LibraryPart::FragmentShader, &self.desc, &setup.part)?;
        Ok(self)
    }

    pub fn setup_fragment_output_state(&mut self, setup: FragmentOutputSetup) -> Result<&mut Self> {
        assert!(!self.finalized, "pipeline was already built");
        assert_eq!(
            self.setup_state,
            SetupState::VERTEX_INPUT_INTERFACE | SetupState::PRE_RASTERIZATION_SHADERS | SetupState::FRAGMENT_SHADER,
            "fragment output state must follow fragment shader state"
        );
        self.setup_state |= SetupState::FRAGMENT_OUTPUT_INTERFACE;
        log::debug!("[{}] fragment output interface", self.construction_type);

        self.desc.render_pass = setup.render_pass;
        self.desc.subpass = setup.subpass;
        self.desc.color_blend = setup
            .color_blend
            .or_else(|| self.defaults.use_default_color_blend.then(ColorBlendState::default));
        self.desc.output_multisample = setup
            .multisample
            .or_else(|| self.defaults.use_default_multisample.then(MultisampleState::default));

        self.backend
            .create_part(&self.device, LibraryPart::FragmentOutput, &self.desc, &setup.part)?;
        Ok(self)
    }

    /// Realize the pipeline. One-shot.
    ///
    /// Returns `PipelineError::NotYetCompiled` when a stage was given only by
    /// module identifier and the driver would have to compile.
    pub fn build_pipeline(&mut self, options: BuildOptions) -> Result<()> {
        assert!(!self.finalized, "pipeline was already built");
        assert_eq!(self.setup_state, SetupState::ALL, "all four phases must be set up before building");
        assert!(
            self.desc.layout.handle != vk::PipelineLayout::null(),
            "a pipeline layout must be attached before building"
        );
        self.finalized = true;

        match self.backend.build(&self.device, &self.desc, &options) {
            Ok(()) => {
                log::info!(
                    "[{}] built pipeline ({} stages)",
                    self.construction_type,
                    self.desc.stages.len()
                );
                Ok(())
            }
            Err(e) => {
                log::info!("[{}] pipeline build failed: {}", self.construction_type, e);
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Use
    // -------------------------------------------------------------------------

    pub fn was_built(&self) -> bool {
        self.backend.is_built()
    }

    /// The final pipeline object. Null for shader objects.
    pub fn pipeline(&self) -> vk::Pipeline {
        assert!(self.was_built(), "pipeline was not built");
        self.backend.pipeline()
    }

    /// Per-stage shader objects, empty for pipeline-based construction.
    pub fn shader_objects(&self) -> Vec<(vk::ShaderStageFlags, vk::ShaderEXT)> {
        self.backend.shader_objects()
    }

    pub fn shader_stages(&self) -> &[StageShader] {
        &self.desc.stages
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        assert!(self.was_built(), "pipeline was not built");
        self.backend.bind(self.device.as_ref(), cmd);
    }

    pub fn destroy_pipeline(&mut self) {
        assert!(self.was_built(), "pipeline was not built");
        self.backend.release(self.device.as_ref());
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn pin_layout(&mut self, layout: &PipelineLayoutInfo) {
        if !self.layout_pinned && layout.handle != vk::PipelineLayout::null() {
            self.desc.layout = layout.clone();
            self.layout_pinned = true;
        }
    }

    fn rasterization_or_default(&self, rasterization: Option<RasterizationState>) -> Option<RasterizationState> {
        rasterization.or_else(|| {
            self.defaults
                .use_default_rasterization
                .then_some(self.defaults.rasterization)
        })
    }

    fn viewport_state(
        &self,
        viewports: Vec<vk::Viewport>,
        scissors: Vec<vk::Rect2D>,
        chain: ViewportStateChain,
    ) -> Option<ViewportState> {
        if !self.defaults.use_viewport_state {
            return None;
        }
        Some(ViewportState {
            viewport_count: if viewports.is_empty() {
                self.defaults.viewport_count
            } else {
                viewports.len() as u32
            },
            scissor_count: if scissors.is_empty() {
                self.defaults.scissor_count
            } else {
                scissors.len() as u32
            },
            viewports,
            scissors,
            chain,
        })
    }

    /// Copies the shader into the next free stage slot; unset shaders are skipped.
    fn attach_stage(&mut self, stage: vk::ShaderStageFlags, setup: ShaderStage) {
        if !setup.shader.is_set() {
            return;
        }
        if self.construction_type.is_shader_object() {
            let usable_binary = self.construction_type.uses_shader_binary() && setup.shader.binary().is_some();
            assert!(
                setup.shader.code().is_some() || usable_binary,
                "shader objects need SPIR-V code or a binary for {:?}",
                stage
            );
        }
        let mut shader = setup.shader;
        shader.attach(&self.desc.layout, setup.specialization);
        if shader.code().is_none() && shader.module_identifier().is_some() {
            self.desc.fail_on_compile_required = true;
        }
        self.desc.stages.push(StageShader { stage, shader });
    }
}

impl Drop for GraphicsPipelineWrapper {
    fn drop(&mut self) {
        self.backend.release(self.device.as_ref());
    }
}
