// Shader object construction
//
// One shader object per attached stage, created in a single batch at build
// time. Binding binds every graphics slot (null for unused ones) and then
// replays the fixed-function snapshot as dynamic state.

use super::dynamic::DynamicStateSet;
use super::replay::ReplayStateSnapshot;
use super::state::PipelineConstructionType;
use super::wrapper::{BuildOptions, ConstructionBackend, PipelineDescription};
use crate::backend::interface::{DeviceInterface, ShaderCode, ShaderObjectDesc};
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Graphics bind slots, in bind order.
pub const SHADER_OBJECT_STAGES: [vk::ShaderStageFlags; 7] = [
    vk::ShaderStageFlags::VERTEX,
    vk::ShaderStageFlags::TESSELLATION_CONTROL,
    vk::ShaderStageFlags::TESSELLATION_EVALUATION,
    vk::ShaderStageFlags::GEOMETRY,
    vk::ShaderStageFlags::FRAGMENT,
    vk::ShaderStageFlags::TASK_EXT,
    vk::ShaderStageFlags::MESH_EXT,
];

/// The stage that consumes `stage`'s output, given what is attached.
pub fn next_stage(stage: vk::ShaderStageFlags, attached: &[vk::ShaderStageFlags]) -> vk::ShaderStageFlags {
    use vk::ShaderStageFlags as S;
    let has = |s: S| attached.contains(&s);
    let first_of = |candidates: &[S]| {
        candidates
            .iter()
            .copied()
            .find(|s| has(*s))
            .unwrap_or_else(S::empty)
    };

    match stage {
        S::VERTEX => first_of(&[S::TESSELLATION_CONTROL, S::GEOMETRY, S::FRAGMENT]),
        S::TESSELLATION_CONTROL => first_of(&[S::TESSELLATION_EVALUATION]),
        S::TESSELLATION_EVALUATION => first_of(&[S::GEOMETRY, S::FRAGMENT]),
        S::GEOMETRY => first_of(&[S::FRAGMENT]),
        S::TASK_EXT => first_of(&[S::MESH_EXT]),
        _ => S::empty(),
    }
}

#[derive(Debug)]
pub(crate) struct ShaderObjectBackend {
    construction_type: PipelineConstructionType,
    shaders: Vec<(vk::ShaderStageFlags, vk::ShaderEXT)>,
    snapshot: Option<ReplayStateSnapshot>,
    caller_dynamic: Option<DynamicStateSet>,
}

impl ShaderObjectBackend {
    pub fn new(construction_type: PipelineConstructionType) -> Self {
        Self {
            construction_type,
            shaders: Vec::new(),
            snapshot: None,
            caller_dynamic: None,
        }
    }

    fn shader_descs(&self, desc: &PipelineDescription) -> Vec<ShaderObjectDesc> {
        let attached: Vec<_> = desc.stages.iter().map(|s| s.stage).collect();
        let link = self.construction_type.is_linked_shader_object() && attached.len() > 1;

        desc.stages
            .iter()
            .map(|s| {
                let code = match (self.construction_type.uses_shader_binary(), s.shader.binary(), s.shader.code()) {
                    (true, Some(binary), _) => ShaderCode::Binary(Arc::clone(binary)),
                    (_, _, Some(code)) => ShaderCode::Spirv(Arc::clone(code)),
                    // attach_stage rejects everything else
                    _ => unreachable!("{:?} shader has neither SPIR-V nor a usable binary", s.stage),
                };
                let mut flags = vk::ShaderCreateFlagsEXT::empty();
                if link {
                    flags |= vk::ShaderCreateFlagsEXT::LINK_STAGE;
                }
                let layout = s.shader.layout().unwrap_or(&desc.layout);
                ShaderObjectDesc {
                    flags,
                    stage: s.stage,
                    next_stage: next_stage(s.stage, &attached),
                    code,
                    set_layouts: layout.set_layouts.clone(),
                    push_constant_ranges: layout.push_constant_ranges.clone(),
                    specialization: s.shader.specialization().cloned(),
                }
            })
            .collect()
    }
}

impl ConstructionBackend for ShaderObjectBackend {
    fn build(
        &mut self,
        device: &Arc<dyn DeviceInterface>,
        desc: &PipelineDescription,
        _options: &BuildOptions,
    ) -> Result<()> {
        let mut descs = self.shader_descs(desc);
        let mut shaders = device.create_shaders(&descs)?;

        // Binary variants round-trip anything that was still built from SPIR-V
        let needs_round_trip = self.construction_type.uses_shader_binary()
            && descs.iter().any(|d| matches!(d.code, ShaderCode::Spirv(_)));
        if needs_round_trip {
            let binaries = shaders
                .iter()
                .map(|s| device.get_shader_binary_data(*s))
                .collect::<std::result::Result<Vec<_>, _>>();
            for shader in shaders.drain(..) {
                device.destroy_shader(shader);
            }
            for (d, binary) in descs.iter_mut().zip(binaries?) {
                d.code = ShaderCode::Binary(binary.into());
            }
            shaders = device.create_shaders(&descs)?;
            log::debug!("Recreated {} shader objects from binaries", shaders.len());
        }

        self.shaders = descs.iter().map(|d| d.stage).zip(shaders).collect();
        self.snapshot = Some(ReplayStateSnapshot::capture(desc));
        self.caller_dynamic = desc.dynamic_states.clone();
        Ok(())
    }

    fn bind(&self, device: &dyn DeviceInterface, cmd: vk::CommandBuffer) {
        for stage in SHADER_OBJECT_STAGES {
            let shader = self
                .shaders
                .iter()
                .find(|(s, _)| *s == stage)
                .map(|(_, shader)| *shader)
                .unwrap_or_default();
            device.cmd_bind_shader(cmd, stage, shader);
        }
        if let Some(snapshot) = &self.snapshot {
            snapshot.replay(device, cmd, self.caller_dynamic.as_ref());
        }
    }

    fn is_built(&self) -> bool {
        !self.shaders.is_empty()
    }

    fn pipeline(&self) -> vk::Pipeline {
        vk::Pipeline::null()
    }

    fn shader_objects(&self) -> Vec<(vk::ShaderStageFlags, vk::ShaderEXT)> {
        self.shaders.clone()
    }

    fn release(&mut self, device: &dyn DeviceInterface) {
        for (_, shader) in self.shaders.drain(..) {
            device.destroy_shader(shader);
        }
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::interface::DynamicCommand;
    use crate::backend::recorder::{DeviceCall, RecordingDevice};
    use crate::pipeline::dynamic::DynamicStateSet;
    use vk::ShaderStageFlags as S;

    fn device() -> (Arc<RecordingDevice>, Arc<dyn DeviceInterface>) {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();
        (recorder, device)
    }

    fn described(stages: &[S]) -> PipelineDescription {
        let mut desc = PipelineDescription::default();
        for stage in stages {
            desc.push_stage_for_test(*stage);
        }
        desc
    }

    #[test]
    fn next_stage_follows_attached_stages() {
        let all = [S::VERTEX, S::TESSELLATION_CONTROL, S::TESSELLATION_EVALUATION, S::GEOMETRY, S::FRAGMENT];
        assert_eq!(next_stage(S::VERTEX, &all), S::TESSELLATION_CONTROL);
        assert_eq!(next_stage(S::TESSELLATION_CONTROL, &all), S::TESSELLATION_EVALUATION);
        assert_eq!(next_stage(S::TESSELLATION_EVALUATION, &all), S::GEOMETRY);
        assert_eq!(next_stage(S::GEOMETRY, &all), S::FRAGMENT);
        assert_eq!(next_stage(S::FRAGMENT, &all), S::empty());

        assert_eq!(next_stage(S::VERTEX, &[S::VERTEX, S::GEOMETRY]), S::GEOMETRY);
        assert_eq!(next_stage(S::VERTEX, &[S::VERTEX, S::FRAGMENT]), S::FRAGMENT);
        assert_eq!(next_stage(S::VERTEX, &[S::VERTEX]), S::empty());
        assert_eq!(next_stage(S::TASK_EXT, &[S::TASK_EXT, S::MESH_EXT]), S::MESH_EXT);
        assert_eq!(next_stage(S::MESH_EXT, &[S::MESH_EXT, S::FRAGMENT]), S::empty());
    }

    #[test]
    fn linked_variants_create_one_batch_with_link_flag() {
        let (recorder, device) = device();
        let mut backend = ShaderObjectBackend::new(PipelineConstructionType::ShaderObjectLinkedSpirv);
        backend
            .build(&device, &described(&[S::VERTEX, S::FRAGMENT]), &BuildOptions::default())
            .unwrap();

        let batches: Vec<_> = recorder
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::CreateShaders { descs, .. } => Some(descs),
                _ => None,
            })
            .collect();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].iter().all(|d| d.flags.contains(vk::ShaderCreateFlagsEXT::LINK_STAGE)));
        assert_eq!(batches[0][0].next_stage, S::FRAGMENT);
    }

    #[test]
    fn binary_variants_recreate_from_binaries() {
        let (recorder, device) = device();
        let mut backend = ShaderObjectBackend::new(PipelineConstructionType::ShaderObjectUnlinkedBinary);
        backend
            .build(&device, &described(&[S::VERTEX, S::FRAGMENT]), &BuildOptions::default())
            .unwrap();

        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::GetShaderBinaryData(_))), 2);
        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::DestroyShader(_))), 2);
        let last_batch = recorder
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::CreateShaders { descs, .. } => Some(descs),
                _ => None,
            })
            .last()
            .unwrap_or_default();
        assert!(last_batch.iter().all(|d| matches!(d.code, ShaderCode::Binary(_))));
        assert!(last_batch.iter().all(|d| d.flags.is_empty()));
    }

    #[test]
    fn bind_covers_every_slot_then_replays() {
        let (recorder, device) = device();
        let mut backend = ShaderObjectBackend::new(PipelineConstructionType::ShaderObjectUnlinkedSpirv);
        let mut desc = described(&[S::VERTEX, S::FRAGMENT]);
        desc.dynamic_states = Some(DynamicStateSet::new(&[vk::DynamicState::CULL_MODE]));
        backend.build(&device, &desc, &BuildOptions::default()).unwrap();
        recorder.take_calls();

        backend.bind(device.as_ref(), vk::CommandBuffer::null());
        let calls = recorder.calls();
        let bound: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::BindShader { stage, shader } => Some((*stage, *shader)),
                _ => None,
            })
            .collect();
        assert_eq!(bound.iter().map(|(s, _)| *s).collect::<Vec<_>>(), SHADER_OBJECT_STAGES.to_vec());
        let live: Vec<_> = bound
            .iter()
            .filter(|(_, shader)| *shader != vk::ShaderEXT::null())
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(live, vec![S::VERTEX, S::FRAGMENT]);

        let commands = recorder.dynamic_commands();
        assert!(!commands.is_empty());
        assert!(!commands.iter().any(|c| matches!(c, DynamicCommand::CullMode(_))));
        assert!(!commands.iter().any(|c| matches!(c, DynamicCommand::StencilOp { .. })));
    }

    #[test]
    fn release_destroys_every_shader() {
        let (recorder, device) = device();
        let mut backend = ShaderObjectBackend::new(PipelineConstructionType::ShaderObjectLinkedSpirv);
        backend
            .build(&device, &described(&[S::TASK_EXT, S::MESH_EXT, S::FRAGMENT]), &BuildOptions::default())
            .unwrap();
        backend.release(device.as_ref());
        assert!(!backend.is_built());
        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::DestroyShader(_))), 3);
    }
}
