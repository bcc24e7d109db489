// Pipeline layout wrapper
//
// Shader objects do not support independent descriptor sets, so the flag is
// cleared for that family instead of being rejected.

use super::state::PipelineConstructionType;
use crate::backend::interface::{DeviceInterface, PipelineLayoutDesc};
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// The parts of a layout a pipeline or shader object needs to redeclare it.
#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutInfo {
    pub handle: vk::PipelineLayout,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

pub struct PipelineLayoutWrapper {
    construction_type: PipelineConstructionType,
    device: Arc<dyn DeviceInterface>,
    flags: vk::PipelineLayoutCreateFlags,
    info: PipelineLayoutInfo,
}

impl PipelineLayoutWrapper {
    pub fn new(
        construction_type: PipelineConstructionType,
        device: Arc<dyn DeviceInterface>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        Self::from_desc(
            construction_type,
            device,
            PipelineLayoutDesc {
                flags: vk::PipelineLayoutCreateFlags::empty(),
                set_layouts: set_layouts.to_vec(),
                push_constant_ranges: push_constant_ranges.to_vec(),
            },
        )
    }

    /// Zero or one descriptor set layout, no push constants.
    pub fn from_set_layout(
        construction_type: PipelineConstructionType,
        device: Arc<dyn DeviceInterface>,
        set_layout: Option<vk::DescriptorSetLayout>,
    ) -> Result<Self> {
        let set_layouts: Vec<_> = set_layout.into_iter().collect();
        Self::new(construction_type, device, &set_layouts, &[])
    }

    pub fn from_desc(
        construction_type: PipelineConstructionType,
        device: Arc<dyn DeviceInterface>,
        mut desc: PipelineLayoutDesc,
    ) -> Result<Self> {
        if construction_type.is_shader_object() {
            desc.flags &= !vk::PipelineLayoutCreateFlags::INDEPENDENT_SETS_EXT;
        }

        let handle = device.create_pipeline_layout(&desc)?;
        log::debug!(
            "Created pipeline layout {:?}: {} set layouts, {} push constant ranges",
            handle,
            desc.set_layouts.len(),
            desc.push_constant_ranges.len()
        );

        Ok(Self {
            construction_type,
            device,
            flags: desc.flags,
            info: PipelineLayoutInfo {
                handle,
                set_layouts: desc.set_layouts,
                push_constant_ranges: desc.push_constant_ranges,
            },
        })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.info.handle
    }

    pub fn info(&self) -> &PipelineLayoutInfo {
        &self.info
    }

    pub fn construction_type(&self) -> PipelineConstructionType {
        self.construction_type
    }

    pub fn flags(&self) -> vk::PipelineLayoutCreateFlags {
        self.flags
    }

    pub fn set_layout_count(&self) -> u32 {
        self.info.set_layouts.len() as u32
    }

    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.info.set_layouts
    }

    pub fn push_constant_range_count(&self) -> u32 {
        self.info.push_constant_ranges.len() as u32
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.info.push_constant_ranges
    }

    /// Same call shape for every construction type.
    pub fn bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.device
            .cmd_bind_descriptor_sets(cmd, bind_point, self.info.handle, first_set, sets, dynamic_offsets);
    }
}

impl Drop for PipelineLayoutWrapper {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.info.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recorder::{DeviceCall, RecordingDevice};
    use ash::vk::Handle;

    fn device() -> (Arc<RecordingDevice>, Arc<dyn DeviceInterface>) {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();
        (recorder, device)
    }

    #[test]
    fn counts_read_back_exactly() {
        let (_, device) = device();
        for n in [0usize, 1, 8] {
            for m in [0usize, 1, 8] {
                let set_layouts: Vec<_> = (0..n)
                    .map(|i| vk::DescriptorSetLayout::from_raw(100 + i as u64))
                    .collect();
                let ranges: Vec<_> = (0..m)
                    .map(|i| vk::PushConstantRange {
                        stage_flags: vk::ShaderStageFlags::VERTEX,
                        offset: 4 * i as u32,
                        size: 4,
                    })
                    .collect();
                let layout = PipelineLayoutWrapper::new(
                    PipelineConstructionType::Monolithic,
                    device.clone(),
                    &set_layouts,
                    &ranges,
                )
                .unwrap();
                assert_eq!(layout.set_layout_count() as usize, n);
                assert_eq!(layout.push_constant_range_count() as usize, m);
                assert_eq!(layout.set_layouts(), &set_layouts[..]);
            }
        }
    }

    #[test]
    fn shader_objects_drop_independent_sets() {
        let (recorder, device) = device();
        let desc = PipelineLayoutDesc {
            flags: vk::PipelineLayoutCreateFlags::INDEPENDENT_SETS_EXT,
            ..Default::default()
        };

        let so = PipelineLayoutWrapper::from_desc(
            PipelineConstructionType::ShaderObjectUnlinkedSpirv,
            device.clone(),
            desc.clone(),
        )
        .unwrap();
        let lib = PipelineLayoutWrapper::from_desc(PipelineConstructionType::FastLinkedLibrary, device, desc).unwrap();

        assert!(so.flags().is_empty());
        assert_eq!(lib.flags(), vk::PipelineLayoutCreateFlags::INDEPENDENT_SETS_EXT);
        let created: Vec<_> = recorder
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::CreatePipelineLayout { desc, .. } => Some(desc.flags),
                _ => None,
            })
            .collect();
        assert_eq!(
            created,
            vec![
                vk::PipelineLayoutCreateFlags::empty(),
                vk::PipelineLayoutCreateFlags::INDEPENDENT_SETS_EXT
            ]
        );
    }

    #[test]
    fn binds_with_own_handle_and_destroys_on_drop() {
        let (recorder, device) = device();
        let layout = PipelineLayoutWrapper::from_set_layout(
            PipelineConstructionType::ShaderObjectLinkedSpirv,
            device,
            Some(vk::DescriptorSetLayout::from_raw(7)),
        )
        .unwrap();
        let handle = layout.handle();
        layout.bind_descriptor_sets(
            vk::CommandBuffer::null(),
            vk::PipelineBindPoint::GRAPHICS,
            0,
            &[vk::DescriptorSet::from_raw(9)],
            &[],
        );
        drop(layout);

        let calls = recorder.calls();
        assert!(matches!(calls[1], DeviceCall::BindDescriptorSets { layout, .. } if layout == handle));
        assert!(matches!(calls[2], DeviceCall::DestroyPipelineLayout(h) if h == handle));
    }
}
