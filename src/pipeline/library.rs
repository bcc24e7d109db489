// Graphics pipeline library construction
//
// Each phase is realized as its own library part as soon as it is set up.
// `build` only links the parts. Parts are never regenerated, so creating the
// same phase twice is a contract violation.

use super::chain::{ChainRecord, ExtensionChain};
use super::state::SetupState;
use super::wrapper::{BuildOptions, ConstructionBackend, PartOptions, PipelineDescription};
use crate::backend::interface::{DeviceInterface, GraphicsPipelineDesc};
use crate::error::{PipelineError, Result};
use ash::vk;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LibraryPart {
    VertexInput,
    PreRasterization,
    /// Mesh pipelines fold vertex input into pre-rasterization
    MeshPreRasterization,
    FragmentShader,
    FragmentOutput,
}

impl LibraryPart {
    fn slot(self) -> usize {
        match self {
            Self::VertexInput => 0,
            Self::PreRasterization | Self::MeshPreRasterization => 1,
            Self::FragmentShader => 2,
            Self::FragmentOutput => 3,
        }
    }

    fn library_flags(self) -> vk::GraphicsPipelineLibraryFlagsEXT {
        match self {
            Self::VertexInput => vk::GraphicsPipelineLibraryFlagsEXT::VERTEX_INPUT_INTERFACE,
            Self::PreRasterization | Self::MeshPreRasterization => {
                vk::GraphicsPipelineLibraryFlagsEXT::PRE_RASTERIZATION_SHADERS
            }
            Self::FragmentShader => vk::GraphicsPipelineLibraryFlagsEXT::FRAGMENT_SHADER,
            Self::FragmentOutput => vk::GraphicsPipelineLibraryFlagsEXT::FRAGMENT_OUTPUT_INTERFACE,
        }
    }

    /// Phases whose dynamic states the part declares.
    fn phases(self) -> SetupState {
        match self {
            Self::VertexInput => SetupState::VERTEX_INPUT_INTERFACE,
            Self::PreRasterization => SetupState::PRE_RASTERIZATION_SHADERS,
            Self::MeshPreRasterization => {
                SetupState::VERTEX_INPUT_INTERFACE | SetupState::PRE_RASTERIZATION_SHADERS
            }
            Self::FragmentShader => SetupState::FRAGMENT_SHADER,
            Self::FragmentOutput => SetupState::FRAGMENT_OUTPUT_INTERFACE,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LibraryBackend {
    link_time_optimized: bool,
    parts: [vk::Pipeline; 4],
    part_stage_count: u32,
    /// Some part was created from a module identifier
    fail_on_compile_required: bool,
    linked: vk::Pipeline,
}

impl LibraryBackend {
    pub fn new(link_time_optimized: bool) -> Self {
        Self {
            link_time_optimized,
            parts: [vk::Pipeline::null(); 4],
            part_stage_count: 0,
            fail_on_compile_required: false,
            linked: vk::Pipeline::null(),
        }
    }

    #[cfg(test)]
    pub fn parts(&self) -> [vk::Pipeline; 4] {
        self.parts
    }
}

impl ConstructionBackend for LibraryBackend {
    fn create_part(
        &mut self,
        device: &Arc<dyn DeviceInterface>,
        part: LibraryPart,
        desc: &PipelineDescription,
        options: &PartOptions,
    ) -> Result<()> {
        let slot = part.slot();
        assert!(
            self.parts[slot] == vk::Pipeline::null(),
            "library part {:?} was already created",
            part
        );

        let mut flags = (desc.flags | vk::PipelineCreateFlags::LIBRARY_KHR) & !vk::PipelineCreateFlags::DERIVATIVE;
        if self.link_time_optimized {
            flags |= vk::PipelineCreateFlags::RETAIN_LINK_TIME_OPTIMIZATION_INFO_EXT;
        }

        let mut create_info = GraphicsPipelineDesc {
            dynamic_states: desc.dynamic_states.as_ref().map(|d| d.for_phases(part.phases())),
            ..Default::default()
        };
        let mut chain = ExtensionChain::new();
        chain.push(ChainRecord::LibraryInfo(part.library_flags()));

        match part {
            LibraryPart::VertexInput => {
                create_info.vertex_input = desc.vertex_input.clone();
                create_info.input_assembly = desc.input_assembly;
            }
            LibraryPart::PreRasterization | LibraryPart::MeshPreRasterization => {
                create_info.stages = desc.stage_descs(device, |s| s != vk::ShaderStageFlags::FRAGMENT)?;
                create_info.layout = desc.layout.handle;
                create_info.render_pass = desc.render_pass;
                create_info.subpass = desc.subpass;
                create_info.tessellation = desc.tessellation;
                create_info.viewport = desc.viewport.clone();
                create_info.rasterization = desc.rasterization;
                chain
                    .push_opt(desc.fragment_shading_rate.map(ChainRecord::FragmentShadingRate))
                    .push_opt(desc.rendering.clone().map(ChainRecord::Rendering))
                    .push_opt(desc.robustness.map(ChainRecord::Robustness));
            }
            LibraryPart::FragmentShader => {
                create_info.stages = desc.stage_descs(device, |s| s == vk::ShaderStageFlags::FRAGMENT)?;
                create_info.layout = desc.layout.handle;
                create_info.render_pass = desc.render_pass;
                create_info.subpass = desc.subpass;
                create_info.depth_stencil = desc.depth_stencil;
                create_info.multisample = desc.fragment_multisample.clone();
                chain
                    .push_opt(desc.fragment_shading_rate.map(ChainRecord::FragmentShadingRate))
                    .push_opt(desc.rendering.clone().map(ChainRecord::Rendering))
                    .push_opt(
                        desc.representative_fragment_test
                            .map(|enable| ChainRecord::RepresentativeFragmentTest { enable }),
                    )
                    .push_opt(desc.robustness.map(ChainRecord::Robustness));
            }
            LibraryPart::FragmentOutput => {
                create_info.render_pass = desc.render_pass;
                create_info.subpass = desc.subpass;
                create_info.color_blend = desc.color_blend.clone();
                create_info.multisample = desc.output_multisample.clone();
                chain
                    .push_opt(desc.fragment_shading_rate.map(ChainRecord::FragmentShadingRate))
                    .push_opt(desc.rendering.clone().map(ChainRecord::Rendering));
            }
        }

        let requires_compile = create_info
            .stages
            .iter()
            .any(|s| s.module == vk::ShaderModule::null() && s.module_identifier.is_some());
        if requires_compile {
            flags |= vk::PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED;
            self.fail_on_compile_required = true;
        }

        let stage_count = create_info.stages.len() as u32;
        chain.push_opt(
            options
                .feedback
                .clone()
                .map(|sink| ChainRecord::CreationFeedback { sink, stage_count }),
        );
        create_info.flags = flags;
        create_info.chain = chain;

        let pipeline = device
            .create_graphics_pipeline(options.cache, &create_info)
            .map_err(|e| PipelineError::from_creation(e, requires_compile))?;
        log::debug!("Created library part {:?}: {:?}", part, pipeline);

        self.parts[slot] = pipeline;
        self.part_stage_count += stage_count;
        Ok(())
    }

    fn build(
        &mut self,
        device: &Arc<dyn DeviceInterface>,
        desc: &PipelineDescription,
        options: &BuildOptions,
    ) -> Result<()> {
        assert!(
            desc.layout.handle != vk::PipelineLayout::null(),
            "library link needs the pipeline layout pinned"
        );

        let mut flags = desc.flags;
        if self.link_time_optimized {
            flags |= vk::PipelineCreateFlags::LINK_TIME_OPTIMIZATION_EXT;
        }
        if self.fail_on_compile_required {
            flags |= vk::PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED;
        }

        let mut chain = ExtensionChain::new();
        let stage_count = self.part_stage_count;
        chain.push_opt(
            options
                .feedback
                .clone()
                .map(|sink| ChainRecord::CreationFeedback { sink, stage_count }),
        );

        let create_info = GraphicsPipelineDesc {
            flags,
            layout: desc.layout.handle,
            libraries: self
                .parts
                .iter()
                .copied()
                .filter(|p| *p != vk::Pipeline::null())
                .collect(),
            base_pipeline: options.base_pipeline,
            base_pipeline_index: options.base_pipeline_index,
            chain,
            ..Default::default()
        };

        self.linked = device
            .create_graphics_pipeline(options.cache, &create_info)
            .map_err(|e| PipelineError::from_creation(e, self.fail_on_compile_required))?;
        Ok(())
    }

    fn bind(&self, device: &dyn DeviceInterface, cmd: vk::CommandBuffer) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.linked);
    }

    fn is_built(&self) -> bool {
        self.linked != vk::Pipeline::null()
    }

    fn pipeline(&self) -> vk::Pipeline {
        self.linked
    }

    fn release(&mut self, device: &dyn DeviceInterface) {
        if self.linked != vk::Pipeline::null() {
            device.destroy_pipeline(std::mem::take(&mut self.linked));
        }
        for part in &mut self.parts {
            if *part != vk::Pipeline::null() {
                device.destroy_pipeline(std::mem::take(part));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recorder::{DeviceCall, RecordingDevice};
    use crate::pipeline::chain::{ChainKind, FeedbackSink};
    use crate::pipeline::dynamic::DynamicStateSet;
    use crate::pipeline::layout::PipelineLayoutInfo;
    use crate::pipeline::state::{InputAssemblyState, VertexInputState};
    use ash::vk::Handle;

    fn device() -> (Arc<RecordingDevice>, Arc<dyn DeviceInterface>) {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();
        (recorder, device)
    }

    fn described() -> PipelineDescription {
        let mut desc = PipelineDescription {
            layout: PipelineLayoutInfo {
                handle: vk::PipelineLayout::from_raw(0x55),
                ..Default::default()
            },
            vertex_input: Some(VertexInputState::default()),
            input_assembly: Some(InputAssemblyState::default()),
            dynamic_states: Some(DynamicStateSet::new(&[
                vk::DynamicState::VERTEX_INPUT_BINDING_STRIDE,
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::DEPTH_TEST_ENABLE,
                vk::DynamicState::BLEND_CONSTANTS,
            ])),
            ..Default::default()
        };
        desc.push_stage_for_test(vk::ShaderStageFlags::VERTEX);
        desc.push_stage_for_test(vk::ShaderStageFlags::FRAGMENT);
        desc
    }

    fn create_all(backend: &mut LibraryBackend, device: &Arc<dyn DeviceInterface>, desc: &PipelineDescription) {
        for part in [
            LibraryPart::VertexInput,
            LibraryPart::PreRasterization,
            LibraryPart::FragmentShader,
            LibraryPart::FragmentOutput,
        ] {
            backend.create_part(device, part, desc, &PartOptions::default()).unwrap();
        }
    }

    #[test]
    fn parts_declare_only_their_own_dynamic_states() {
        let (recorder, device) = device();
        let mut backend = LibraryBackend::new(false);
        create_all(&mut backend, &device, &described());

        let dynamic: Vec<_> = recorder
            .pipeline_descs()
            .into_iter()
            .map(|d| d.dynamic_states.unwrap_or_default())
            .collect();
        assert_eq!(
            dynamic,
            vec![
                vec![vk::DynamicState::VERTEX_INPUT_BINDING_STRIDE],
                vec![vk::DynamicState::VIEWPORT],
                vec![vk::DynamicState::DEPTH_TEST_ENABLE],
                vec![vk::DynamicState::BLEND_CONSTANTS],
            ]
        );
    }

    #[test]
    fn each_part_carries_its_library_flag() {
        let (recorder, device) = device();
        let mut backend = LibraryBackend::new(true);
        create_all(&mut backend, &device, &described());

        for (desc, expected) in recorder.pipeline_descs().iter().zip([
            vk::GraphicsPipelineLibraryFlagsEXT::VERTEX_INPUT_INTERFACE,
            vk::GraphicsPipelineLibraryFlagsEXT::PRE_RASTERIZATION_SHADERS,
            vk::GraphicsPipelineLibraryFlagsEXT::FRAGMENT_SHADER,
            vk::GraphicsPipelineLibraryFlagsEXT::FRAGMENT_OUTPUT_INTERFACE,
        ]) {
            assert!(matches!(
                desc.chain.find(ChainKind::LibraryInfo),
                Some(ChainRecord::LibraryInfo(flags)) if *flags == expected
            ));
            assert!(desc.flags.contains(vk::PipelineCreateFlags::LIBRARY_KHR));
            assert!(desc
                .flags
                .contains(vk::PipelineCreateFlags::RETAIN_LINK_TIME_OPTIMIZATION_INFO_EXT));
        }
    }

    #[test]
    fn link_reuses_parts_without_regenerating_them() {
        let (recorder, device) = device();
        let mut backend = LibraryBackend::new(true);
        let desc = described();
        create_all(&mut backend, &device, &desc);
        let parts = backend.parts();
        assert!(parts.iter().all(|p| *p != vk::Pipeline::null()));

        let feedback = FeedbackSink::new();
        backend
            .build(
                &device,
                &desc,
                &BuildOptions {
                    feedback: Some(feedback.clone()),
                    ..Default::default()
                },
            )
            .unwrap();

        let descs = recorder.pipeline_descs();
        assert_eq!(descs.len(), 5);
        let link = &descs[4];
        assert_eq!(link.libraries, parts.to_vec());
        assert!(link.flags.contains(vk::PipelineCreateFlags::LINK_TIME_OPTIMIZATION_EXT));
        assert_eq!(backend.parts(), parts);
        assert_eq!(feedback.get().map(|f| f.stages.len()), Some(2));

        backend.release(device.as_ref());
        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::DestroyPipeline(_))), 5);
    }

    #[test]
    #[should_panic(expected = "already created")]
    fn parts_are_never_regenerated() {
        let (_, device) = device();
        let mut backend = LibraryBackend::new(false);
        let desc = described();
        backend
            .create_part(&device, LibraryPart::VertexInput, &desc, &PartOptions::default())
            .unwrap();
        let _ = backend.create_part(&device, LibraryPart::VertexInput, &desc, &PartOptions::default());
    }

    #[test]
    fn mesh_part_declares_vertex_input_and_pre_rasterization_states() {
        let (recorder, device) = device();
        let mut backend = LibraryBackend::new(false);
        let mut desc = described();
        desc.dynamic_states = Some(DynamicStateSet::new(&[
            vk::DynamicState::PRIMITIVE_RESTART_ENABLE,
            vk::DynamicState::SCISSOR,
        ]));
        backend
            .create_part(&device, LibraryPart::MeshPreRasterization, &desc, &PartOptions::default())
            .unwrap();

        let created = &recorder.pipeline_descs()[0];
        let mut states = created.dynamic_states.clone().unwrap_or_default();
        states.sort_by_key(|s| s.as_raw());
        assert_eq!(
            states,
            vec![vk::DynamicState::SCISSOR, vk::DynamicState::PRIMITIVE_RESTART_ENABLE]
        );
        assert!(backend.parts()[0] == vk::Pipeline::null());
    }

    #[test]
    fn identifier_only_part_fails_fast() {
        let (recorder, device) = device();
        recorder.fail_next_pipeline(vk::Result::PIPELINE_COMPILE_REQUIRED);
        let mut backend = LibraryBackend::new(false);
        let mut desc = described();
        desc.stages[1].shader = crate::pipeline::shader::ShaderWrapper::from_module_identifier(vec![7; 16]);

        let result = backend.create_part(&device, LibraryPart::FragmentShader, &desc, &PartOptions::default());
        assert_eq!(result, Err(PipelineError::NotYetCompiled));
        let created = &recorder.pipeline_descs()[0];
        assert!(created
            .flags
            .contains(vk::PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED));
    }
}
