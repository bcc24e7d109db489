// Monolithic construction: everything in one creation call at build time.

use super::chain::{ChainRecord, ExtensionChain};
use super::wrapper::{BuildOptions, ConstructionBackend, PipelineDescription};
use crate::backend::interface::{DeviceInterface, GraphicsPipelineDesc};
use crate::error::{PipelineError, Result};
use ash::vk;
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct MonolithicBackend {
    pipeline: vk::Pipeline,
}

impl ConstructionBackend for MonolithicBackend {
    fn build(
        &mut self,
        device: &Arc<dyn DeviceInterface>,
        desc: &PipelineDescription,
        options: &BuildOptions,
    ) -> Result<()> {
        let stages = desc.stage_descs(device, |_| true)?;

        let mut flags = desc.flags;
        if desc.fail_on_compile_required {
            flags |= vk::PipelineCreateFlags::FAIL_ON_PIPELINE_COMPILE_REQUIRED;
        }

        let mut chain = ExtensionChain::new();
        chain
            .push_opt(desc.fragment_shading_rate.map(ChainRecord::FragmentShadingRate))
            .push_opt(desc.rendering.clone().map(ChainRecord::Rendering))
            .push_opt(options.feedback.clone().map(|sink| ChainRecord::CreationFeedback {
                sink,
                stage_count: stages.len() as u32,
            }))
            .push_opt(
                desc.representative_fragment_test
                    .map(|enable| ChainRecord::RepresentativeFragmentTest { enable }),
            )
            .push_opt(desc.robustness.map(ChainRecord::Robustness))
            .extend(&options.extra_chain);

        let create_info = GraphicsPipelineDesc {
            flags,
            stages,
            vertex_input: desc.vertex_input.clone(),
            input_assembly: desc.input_assembly,
            tessellation: desc.tessellation,
            viewport: desc.viewport.clone(),
            rasterization: desc.rasterization,
            multisample: desc.multisample().cloned(),
            depth_stencil: desc.depth_stencil,
            color_blend: desc.color_blend.clone(),
            dynamic_states: desc.dynamic_states.as_ref().map(|d| d.all()),
            layout: desc.layout.handle,
            render_pass: desc.render_pass,
            subpass: desc.subpass,
            libraries: Vec::new(),
            base_pipeline: options.base_pipeline,
            base_pipeline_index: options.base_pipeline_index,
            chain,
        };

        self.pipeline = device
            .create_graphics_pipeline(options.cache, &create_info)
            .map_err(|e| PipelineError::from_creation(e, desc.fail_on_compile_required))?;
        Ok(())
    }

    fn bind(&self, device: &dyn DeviceInterface, cmd: vk::CommandBuffer) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
    }

    fn is_built(&self) -> bool {
        self.pipeline != vk::Pipeline::null()
    }

    fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    fn release(&mut self, device: &dyn DeviceInterface) {
        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(std::mem::take(&mut self.pipeline));
        }
    }
}
