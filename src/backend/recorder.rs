// In-process device that records instead of executing
//
// Handles are synthetic, monotonically increasing and never null. Every call
// is appended to a log that tests (and the probe's dry-run mode) inspect.

use super::interface::*;
use crate::pipeline::chain::{ChainRecord, CreationFeedback};
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub enum DeviceCall {
    CreateShaderModule { module: vk::ShaderModule, word_count: usize },
    DestroyShaderModule(vk::ShaderModule),
    CreatePipelineLayout { layout: vk::PipelineLayout, desc: PipelineLayoutDesc },
    DestroyPipelineLayout(vk::PipelineLayout),
    CreateGraphicsPipeline {
        /// Null when an injected failure was returned
        pipeline: vk::Pipeline,
        cache: vk::PipelineCache,
        desc: Box<GraphicsPipelineDesc>,
    },
    DestroyPipeline(vk::Pipeline),
    CreateShaders { shaders: Vec<vk::ShaderEXT>, descs: Vec<ShaderObjectDesc> },
    GetShaderBinaryData(vk::ShaderEXT),
    DestroyShader(vk::ShaderEXT),
    CreateRenderPass { render_pass: vk::RenderPass, desc: RenderPassDesc },
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer { framebuffer: vk::Framebuffer, desc: FramebufferDesc },
    DestroyFramebuffer(vk::Framebuffer),
    BeginRenderPass(RenderPassBeginDesc),
    NextSubpass(vk::SubpassContents),
    EndRenderPass,
    BeginRendering(RenderingScopeDesc),
    EndRendering,
    PipelineBarrier(BarrierDesc),
    ClearAttachments { attachments: Vec<ClearAttachmentDesc>, rects: Vec<vk::ClearRect> },
    BindPipeline { bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline },
    BindShader { stage: vk::ShaderStageFlags, shader: vk::ShaderEXT },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
        dynamic_offsets: Vec<u32>,
    },
    SetDynamicState(DynamicCommand),
}

/// Records every call; see module docs.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_handle: AtomicU64,
    calls: Mutex<Vec<DeviceCall>>,
    pipeline_results: Mutex<VecDeque<vk::Result>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next graphics pipeline creation fail with `result`.
    /// Queued failures are consumed in order.
    pub fn fail_next_pipeline(&self, result: vk::Result) {
        self.pipeline_results.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn call_count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Every recorded dynamic-state command, in order.
    pub fn dynamic_commands(&self) -> Vec<DynamicCommand> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SetDynamicState(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every recorded graphics pipeline descriptor, in order.
    pub fn pipeline_descs(&self) -> Vec<GraphicsPipelineDesc> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::CreateGraphicsPipeline { desc, .. } => Some((**desc).clone()),
                _ => None,
            })
            .collect()
    }

    /// Every recorded barrier, in order.
    pub fn barriers(&self) -> Vec<BarrierDesc> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::PipelineBarrier(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    fn handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn record(&self, call: DeviceCall) {
        log::trace!("device call: {:?}", call);
        self.calls.lock().push(call);
    }
}

impl DeviceInterface for RecordingDevice {
    fn create_shader_module(
        &self,
        code: &[u32],
        _flags: vk::ShaderModuleCreateFlags,
    ) -> VkResult<vk::ShaderModule> {
        let module = self.handle();
        self.record(DeviceCall::CreateShaderModule { module, word_count: code.len() });
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.record(DeviceCall::DestroyShaderModule(module));
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> VkResult<vk::PipelineLayout> {
        let layout = self.handle();
        self.record(DeviceCall::CreatePipelineLayout { layout, desc: desc.clone() });
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.record(DeviceCall::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        desc: &GraphicsPipelineDesc,
    ) -> VkResult<vk::Pipeline> {
        let injected = self.pipeline_results.lock().pop_front();
        let pipeline = match injected {
            Some(_) => vk::Pipeline::null(),
            None => self.handle(),
        };
        self.record(DeviceCall::CreateGraphicsPipeline {
            pipeline,
            cache,
            desc: Box::new(desc.clone()),
        });
        if let Some(result) = injected {
            return Err(result);
        }

        for record in desc.chain.iter() {
            if let ChainRecord::CreationFeedback { sink, stage_count } = record {
                sink.store(CreationFeedback {
                    flags: vk::PipelineCreationFeedbackFlags::VALID,
                    duration_ns: 0,
                    stages: vec![(vk::PipelineCreationFeedbackFlags::VALID, 0); *stage_count as usize],
                });
            }
        }
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(DeviceCall::DestroyPipeline(pipeline));
    }

    fn create_shaders(&self, descs: &[ShaderObjectDesc]) -> VkResult<Vec<vk::ShaderEXT>> {
        let shaders: Vec<vk::ShaderEXT> = descs.iter().map(|_| self.handle()).collect();
        self.record(DeviceCall::CreateShaders { shaders: shaders.clone(), descs: descs.to_vec() });
        Ok(shaders)
    }

    fn get_shader_binary_data(&self, shader: vk::ShaderEXT) -> VkResult<Vec<u8>> {
        self.record(DeviceCall::GetShaderBinaryData(shader));
        Ok(shader.as_raw().to_le_bytes().to_vec())
    }

    fn destroy_shader(&self, shader: vk::ShaderEXT) {
        self.record(DeviceCall::DestroyShader(shader));
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        let render_pass = self.handle();
        self.record(DeviceCall::CreateRenderPass { render_pass, desc: desc.clone() });
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.record(DeviceCall::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> VkResult<vk::Framebuffer> {
        let framebuffer = self.handle();
        self.record(DeviceCall::CreateFramebuffer { framebuffer, desc: desc.clone() });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.record(DeviceCall::DestroyFramebuffer(framebuffer));
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, begin: &RenderPassBeginDesc) {
        self.record(DeviceCall::BeginRenderPass(begin.clone()));
    }

    fn cmd_next_subpass(&self, _cmd: vk::CommandBuffer, contents: vk::SubpassContents) {
        self.record(DeviceCall::NextSubpass(contents));
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record(DeviceCall::EndRenderPass);
    }

    fn cmd_begin_rendering(&self, _cmd: vk::CommandBuffer, scope: &RenderingScopeDesc) {
        self.record(DeviceCall::BeginRendering(scope.clone()));
    }

    fn cmd_end_rendering(&self, _cmd: vk::CommandBuffer) {
        self.record(DeviceCall::EndRendering);
    }

    fn cmd_pipeline_barrier(&self, _cmd: vk::CommandBuffer, barrier: &BarrierDesc) {
        self.record(DeviceCall::PipelineBarrier(barrier.clone()));
    }

    fn cmd_clear_attachments(
        &self,
        _cmd: vk::CommandBuffer,
        attachments: &[ClearAttachmentDesc],
        rects: &[vk::ClearRect],
    ) {
        self.record(DeviceCall::ClearAttachments {
            attachments: attachments.to_vec(),
            rects: rects.to_vec(),
        });
    }

    fn cmd_bind_pipeline(
        &self,
        _cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.record(DeviceCall::BindPipeline { bind_point, pipeline });
    }

    fn cmd_bind_shader(&self, _cmd: vk::CommandBuffer, stage: vk::ShaderStageFlags, shader: vk::ShaderEXT) {
        self.record(DeviceCall::BindShader { stage, shader });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.record(DeviceCall::BindDescriptorSets {
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_set_dynamic_state(&self, _cmd: vk::CommandBuffer, command: &DynamicCommand) {
        self.record(DeviceCall::SetDynamicState(command.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_non_null() {
        let device = RecordingDevice::new();
        let a = device.create_shader_module(&[0x0723_0203], vk::ShaderModuleCreateFlags::empty()).unwrap();
        let b = device.create_render_pass(&RenderPassDesc::default()).unwrap();
        assert_ne!(a, vk::ShaderModule::null());
        assert_ne!(a.as_raw(), b.as_raw());
        assert_eq!(device.calls().len(), 2);
    }

    #[test]
    fn injected_failure_is_consumed_once() {
        let device = RecordingDevice::new();
        device.fail_next_pipeline(vk::Result::ERROR_OUT_OF_HOST_MEMORY);

        let desc = GraphicsPipelineDesc::default();
        assert_eq!(
            device.create_graphics_pipeline(vk::PipelineCache::null(), &desc),
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        );
        assert!(device.create_graphics_pipeline(vk::PipelineCache::null(), &desc).is_ok());
        assert_eq!(device.pipeline_descs().len(), 2);
    }
}
