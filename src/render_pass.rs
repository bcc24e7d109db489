// Render pass wrapper
//
// Classic mode is a thin layer over a native render pass and framebuffer.
// Emulated mode (paired with shader objects) has no render pass object: each
// subpass becomes a dynamic rendering scope, and the layout transitions and
// dependencies the render pass would have performed are issued as explicit
// barriers. A per-attachment layout cursor tracks where every image is.

use crate::backend::interface::{
    BarrierDesc, ClearAttachmentDesc, ClearValue, DeviceInterface, FramebufferDesc, ImageBarrierDesc,
    MemoryBarrierDesc, RenderPassBeginDesc, RenderPassDesc, RenderingAttachmentDesc, RenderingScopeDesc,
    SubpassDesc,
};
use crate::error::Result;
use crate::pipeline::PipelineConstructionType;
use ash::vk;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPassMode {
    Classic,
    Emulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    NotBegun,
    Active(u32),
    Ended,
}

/// Parameters of the single-subpass shorthand constructor.
#[derive(Debug, Clone, Copy)]
pub struct SimpleRenderPass {
    /// `UNDEFINED` leaves out the color attachment
    pub color_format: vk::Format,
    pub depth_stencil_format: Option<vk::Format>,
    pub load_op: vk::AttachmentLoadOp,
    pub final_layout_color: vk::ImageLayout,
    pub final_layout_depth_stencil: vk::ImageLayout,
    pub subpass_layout_color: vk::ImageLayout,
    pub subpass_layout_depth_stencil: vk::ImageLayout,
}

impl Default for SimpleRenderPass {
    fn default() -> Self {
        Self {
            color_format: vk::Format::R8G8B8A8_UNORM,
            depth_stencil_format: None,
            load_op: vk::AttachmentLoadOp::CLEAR,
            final_layout_color: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            final_layout_depth_stencil: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            subpass_layout_color: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            subpass_layout_depth_stencil: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }
}

impl SimpleRenderPass {
    pub fn to_desc(&self) -> RenderPassDesc {
        let attachment = |format, subpass_layout, final_layout| vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: self.load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: self.load_op,
            stencil_store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: if self.load_op == vk::AttachmentLoadOp::LOAD {
                subpass_layout
            } else {
                vk::ImageLayout::UNDEFINED
            },
            final_layout,
            ..Default::default()
        };

        let mut desc = RenderPassDesc::default();
        let mut subpass = SubpassDesc::default();
        if self.color_format != vk::Format::UNDEFINED {
            subpass.color.push(vk::AttachmentReference {
                attachment: desc.attachments.len() as u32,
                layout: self.subpass_layout_color,
            });
            desc.attachments
                .push(attachment(self.color_format, self.subpass_layout_color, self.final_layout_color));
        }
        if let Some(format) = self.depth_stencil_format {
            subpass.depth_stencil = Some(vk::AttachmentReference {
                attachment: desc.attachments.len() as u32,
                layout: self.subpass_layout_depth_stencil,
            });
            desc.attachments.push(attachment(
                format,
                self.subpass_layout_depth_stencil,
                self.final_layout_depth_stencil,
            ));
        }
        desc.subpasses.push(subpass);
        desc
    }
}

/// What a secondary command buffer must declare to execute inside a subpass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceRenderingInfo {
    pub color_formats: Vec<vk::Format>,
    pub depth_format: vk::Format,
    pub stencil_format: vk::Format,
    pub view_mask: u32,
    pub rasterization_samples: vk::SampleCountFlags,
}

pub struct RenderPassWrapper {
    device: Arc<dyn DeviceInterface>,
    mode: RenderPassMode,
    desc: RenderPassDesc,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    layers: u32,
    layouts: Vec<vk::ImageLayout>,
    /// Dependencies already honoured by a layout transition barrier
    consumed_dependencies: Vec<usize>,
    state: PassState,
    render_area: vk::Rect2D,
    clear_values: Vec<ClearValue>,
}

impl RenderPassWrapper {
    pub fn new(
        construction_type: PipelineConstructionType,
        device: Arc<dyn DeviceInterface>,
        desc: RenderPassDesc,
    ) -> Result<Self> {
        assert!(!desc.subpasses.is_empty(), "a render pass needs at least one subpass");
        let mode = if construction_type.is_shader_object() {
            RenderPassMode::Emulated
        } else {
            RenderPassMode::Classic
        };

        let render_pass = match mode {
            RenderPassMode::Classic => device.create_render_pass(&desc)?,
            RenderPassMode::Emulated => vk::RenderPass::null(),
        };
        log::debug!(
            "Render pass ({:?}): {} attachments, {} subpasses, {} dependencies",
            mode,
            desc.attachments.len(),
            desc.subpasses.len(),
            desc.dependencies.len()
        );

        let layouts = desc.attachments.iter().map(|a| a.initial_layout).collect();
        Ok(Self {
            device,
            mode,
            desc,
            render_pass,
            framebuffer: vk::Framebuffer::null(),
            images: Vec::new(),
            views: Vec::new(),
            layers: 1,
            layouts,
            consumed_dependencies: Vec::new(),
            state: PassState::NotBegun,
            render_area: vk::Rect2D::default(),
            clear_values: Vec::new(),
        })
    }

    pub fn simple(
        construction_type: PipelineConstructionType,
        device: Arc<dyn DeviceInterface>,
        params: &SimpleRenderPass,
    ) -> Result<Self> {
        Self::new(construction_type, device, params.to_desc())
    }

    pub fn mode(&self) -> RenderPassMode {
        self.mode
    }

    /// Null in emulated mode
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    /// Where the emulated pass believes the attachment's image currently is.
    pub fn attachment_layout(&self, attachment: u32) -> vk::ImageLayout {
        self.layouts[attachment as usize]
    }

    /// Bind concrete images. `images` is only used for emulated barriers and
    /// may be empty in classic mode.
    pub fn create_framebuffer(
        &mut self,
        images: &[vk::Image],
        views: &[vk::ImageView],
        width: u32,
        height: u32,
        layers: u32,
    ) -> Result<()> {
        assert_eq!(
            views.len(),
            self.desc.attachments.len(),
            "one image view per attachment"
        );
        assert_eq!(self.state, PassState::NotBegun, "framebuffer must be created before begin");

        match self.mode {
            RenderPassMode::Classic => {
                self.framebuffer = self.device.create_framebuffer(&FramebufferDesc {
                    render_pass: self.render_pass,
                    attachments: views.to_vec(),
                    width,
                    height,
                    layers,
                })?;
            }
            RenderPassMode::Emulated => {
                assert_eq!(images.len(), views.len(), "one image per attachment view");
                self.images = images.to_vec();
            }
        }
        self.views = views.to_vec();
        self.layers = layers.max(1);
        Ok(())
    }

    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    // -------------------------------------------------------------------------
    // Protocol
    // -------------------------------------------------------------------------

    pub fn begin(
        &mut self,
        cmd: vk::CommandBuffer,
        render_area: vk::Rect2D,
        clear_values: &[ClearValue],
        contents: vk::SubpassContents,
    ) {
        assert!(!matches!(self.state, PassState::Active(_)), "render pass already begun");
        self.render_area = render_area;
        self.clear_values = clear_values.to_vec();
        self.state = PassState::Active(0);

        match self.mode {
            RenderPassMode::Classic => self.device.cmd_begin_render_pass(
                cmd,
                &RenderPassBeginDesc {
                    render_pass: self.render_pass,
                    framebuffer: self.framebuffer,
                    render_area,
                    clear_values: clear_values.to_vec(),
                    contents,
                },
            ),
            RenderPassMode::Emulated => {
                self.layouts = self.desc.attachments.iter().map(|a| a.initial_layout).collect();
                self.consumed_dependencies.clear();
                self.transition_to_first_use(cmd);
                self.clear_on_load(cmd);
                self.insert_dependencies(cmd, 0);
                self.begin_subpass_scope(cmd, 0);
            }
        }
    }

    pub fn next_subpass(&mut self, cmd: vk::CommandBuffer, contents: vk::SubpassContents) {
        let PassState::Active(current) = self.state else {
            panic!("next_subpass outside an active render pass");
        };
        let next = current + 1;
        assert!(
            (next as usize) < self.desc.subpasses.len(),
            "no subpass after {}",
            current
        );
        self.state = PassState::Active(next);

        match self.mode {
            RenderPassMode::Classic => self.device.cmd_next_subpass(cmd, contents),
            RenderPassMode::Emulated => {
                self.device.cmd_end_rendering(cmd);
                self.transition_for_subpass(cmd, next);
                self.insert_dependencies(cmd, next);
                self.begin_subpass_scope(cmd, next);
            }
        }
    }

    pub fn end(&mut self, cmd: vk::CommandBuffer) {
        let PassState::Active(current) = self.state else {
            panic!("end outside an active render pass");
        };
        self.state = PassState::Ended;

        match self.mode {
            RenderPassMode::Classic => self.device.cmd_end_render_pass(cmd),
            RenderPassMode::Emulated => {
                assert_eq!(
                    current as usize,
                    self.desc.subpasses.len() - 1,
                    "emulated render pass must end in its last subpass"
                );
                self.device.cmd_end_rendering(cmd);
                self.transition_to_final(cmd);
                self.insert_dependencies(cmd, vk::SUBPASS_EXTERNAL);
            }
        }
    }

    pub fn clear_attachments(
        &self,
        cmd: vk::CommandBuffer,
        attachments: &[ClearAttachmentDesc],
        rects: &[vk::ClearRect],
    ) {
        self.device.cmd_clear_attachments(cmd, attachments, rects);
    }

    pub fn fill_inheritance_rendering_info(&self, subpass: u32) -> InheritanceRenderingInfo {
        let sp = &self.desc.subpasses[subpass as usize];
        let format_of = |r: &vk::AttachmentReference| self.desc.attachments[r.attachment as usize].format;

        let mut rasterization_samples = vk::SampleCountFlags::TYPE_1;
        let color_formats = sp
            .color
            .iter()
            .map(|r| {
                if r.attachment == vk::ATTACHMENT_UNUSED {
                    return vk::Format::UNDEFINED;
                }
                rasterization_samples = self.desc.attachments[r.attachment as usize].samples;
                format_of(r)
            })
            .collect();

        let (mut depth_format, mut stencil_format) = (vk::Format::UNDEFINED, vk::Format::UNDEFINED);
        if let Some(r) = sp.depth_stencil.filter(|r| r.attachment != vk::ATTACHMENT_UNUSED) {
            let format = format_of(&r);
            let aspect = aspect_mask(format);
            if aspect.contains(vk::ImageAspectFlags::DEPTH) {
                depth_format = format;
            }
            if aspect.contains(vk::ImageAspectFlags::STENCIL) {
                stencil_format = format;
            }
            rasterization_samples = self.desc.attachments[r.attachment as usize].samples;
        }

        InheritanceRenderingInfo {
            color_formats,
            depth_format,
            stencil_format,
            view_mask: sp.view_mask,
            rasterization_samples,
        }
    }

    // -------------------------------------------------------------------------
    // Emulation
    // -------------------------------------------------------------------------

    fn external_dependency(&self, into_pass: bool) -> Option<(usize, vk::SubpassDependency)> {
        self.desc
            .dependencies
            .iter()
            .copied()
            .enumerate()
            .find(|(_, d)| {
                if into_pass {
                    d.src_subpass == vk::SUBPASS_EXTERNAL
                } else {
                    d.dst_subpass == vk::SUBPASS_EXTERNAL
                }
            })
    }

    fn image_barrier(&self, attachment: u32, new_layout: vk::ImageLayout) -> ImageBarrierDesc {
        let format = self.desc.attachments[attachment as usize].format;
        ImageBarrierDesc {
            attachment,
            image: self.images.get(attachment as usize).copied().unwrap_or_default(),
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::empty(),
            old_layout: self.layouts[attachment as usize],
            new_layout,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(format),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
        }
    }

    fn emit_transitions(
        &mut self,
        cmd: vk::CommandBuffer,
        targets: Vec<(u32, vk::ImageLayout)>,
        template: BarrierDesc,
        access: (vk::AccessFlags, vk::AccessFlags),
    ) -> bool {
        let images: Vec<_> = targets
            .into_iter()
            .filter(|(attachment, layout)| self.layouts[*attachment as usize] != *layout)
            .map(|(attachment, layout)| ImageBarrierDesc {
                src_access: access.0,
                dst_access: access.1,
                ..self.image_barrier(attachment, layout)
            })
            .collect();
        if images.is_empty() {
            return false;
        }
        for image in &images {
            log::debug!(
                "attachment {}: {:?} -> {:?}",
                image.attachment,
                image.old_layout,
                image.new_layout
            );
            self.layouts[image.attachment as usize] = image.new_layout;
        }
        self.device.cmd_pipeline_barrier(cmd, &BarrierDesc { images, ..template });
        true
    }

    /// Every attachment goes to the layout its first subpass expects.
    fn transition_to_first_use(&mut self, cmd: vk::CommandBuffer) {
        let mut targets: Vec<(u32, vk::ImageLayout)> = Vec::new();
        for subpass in &self.desc.subpasses {
            for r in subpass.references() {
                if !targets.iter().any(|(a, _)| *a == r.attachment) {
                    targets.push((r.attachment, r.layout));
                }
            }
        }

        let external = self.external_dependency(true);
        let (template, access) = match external {
            Some((_, d)) => (
                stage_barrier(d.src_stage_mask, d.dst_stage_mask, d.dependency_flags),
                (d.src_access_mask, d.dst_access_mask),
            ),
            None => (
                stage_barrier(
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::ALL_GRAPHICS,
                    vk::DependencyFlags::empty(),
                ),
                (vk::AccessFlags::empty(), vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE),
            ),
        };
        if self.emit_transitions(cmd, targets, template, access) {
            self.consumed_dependencies.extend(external.map(|(index, _)| index));
        }
    }

    fn transition_for_subpass(&mut self, cmd: vk::CommandBuffer, subpass: u32) {
        let targets: Vec<_> = self.desc.subpasses[subpass as usize]
            .references()
            .map(|r| (r.attachment, r.layout))
            .collect();
        let _ = self.emit_transitions(
            cmd,
            targets,
            stage_barrier(
                vk::PipelineStageFlags::ALL_GRAPHICS,
                vk::PipelineStageFlags::ALL_GRAPHICS,
                vk::DependencyFlags::BY_REGION,
            ),
            (
                vk::AccessFlags::MEMORY_WRITE,
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            ),
        );
    }

    fn transition_to_final(&mut self, cmd: vk::CommandBuffer) {
        let targets: Vec<_> = self
            .desc
            .attachments
            .iter()
            .enumerate()
            .map(|(i, a)| (i as u32, a.final_layout))
            .collect();

        let external = self.external_dependency(false);
        let (template, access) = match external {
            Some((_, d)) => (
                stage_barrier(d.src_stage_mask, d.dst_stage_mask, d.dependency_flags),
                (d.src_access_mask, d.dst_access_mask),
            ),
            None => (
                stage_barrier(
                    vk::PipelineStageFlags::ALL_GRAPHICS,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::DependencyFlags::empty(),
                ),
                (vk::AccessFlags::MEMORY_WRITE, vk::AccessFlags::empty()),
            ),
        };
        if self.emit_transitions(cmd, targets, template, access) {
            self.consumed_dependencies.extend(external.map(|(index, _)| index));
        }
    }

    /// Self-dependencies are left to the caller's own barriers, and external
    /// ones a layout transition already carried are not repeated.
    fn insert_dependencies(&self, cmd: vk::CommandBuffer, subpass: u32) {
        for (_, d) in self.desc.dependencies.iter().enumerate().filter(|(i, d)| {
            d.dst_subpass == subpass && d.src_subpass != d.dst_subpass && !self.consumed_dependencies.contains(i)
        }) {
            let barrier = BarrierDesc {
                memory: vec![MemoryBarrierDesc {
                    src_access: d.src_access_mask,
                    dst_access: d.dst_access_mask,
                }],
                ..stage_barrier(d.src_stage_mask, d.dst_stage_mask, d.dependency_flags)
            };
            self.device.cmd_pipeline_barrier(cmd, &barrier);
        }
    }

    /// Clearing is tied to image views here, so each clear-on-load attachment
    /// gets its own empty rendering scope.
    fn clear_on_load(&self, cmd: vk::CommandBuffer) {
        for (i, attachment) in self.desc.attachments.iter().enumerate() {
            let aspect = aspect_mask(attachment.format);
            let clear_depth_or_color = attachment.load_op == vk::AttachmentLoadOp::CLEAR;
            let clear_stencil = aspect.contains(vk::ImageAspectFlags::STENCIL)
                && attachment.stencil_load_op == vk::AttachmentLoadOp::CLEAR;
            if !clear_depth_or_color && !clear_stencil {
                continue;
            }

            let target = RenderingAttachmentDesc {
                clear_value: self.clear_values.get(i).copied().unwrap_or_default(),
                ..self.rendering_attachment(i as u32, vk::AttachmentLoadOp::CLEAR)
            };
            let mut scope = RenderingScopeDesc {
                render_area: self.render_area,
                layer_count: self.layers,
                ..Default::default()
            };
            if aspect.contains(vk::ImageAspectFlags::COLOR) {
                scope.color.push(target);
            } else {
                if clear_depth_or_color && aspect.contains(vk::ImageAspectFlags::DEPTH) {
                    scope.depth = Some(target);
                }
                if clear_stencil {
                    scope.stencil = Some(target);
                }
            }
            self.device.cmd_begin_rendering(cmd, &scope);
            self.device.cmd_end_rendering(cmd);
        }
    }

    fn rendering_attachment(&self, attachment: u32, load_op: vk::AttachmentLoadOp) -> RenderingAttachmentDesc {
        RenderingAttachmentDesc {
            attachment,
            view: self.views.get(attachment as usize).copied().unwrap_or_default(),
            layout: self.layouts[attachment as usize],
            resolve_mode: vk::ResolveModeFlags::NONE,
            resolve_view: vk::ImageView::null(),
            resolve_layout: vk::ImageLayout::UNDEFINED,
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: ClearValue::default(),
        }
    }

    fn begin_subpass_scope(&self, cmd: vk::CommandBuffer, subpass: u32) {
        let sp = &self.desc.subpasses[subpass as usize];
        let mut scope = RenderingScopeDesc {
            render_area: self.render_area,
            layer_count: self.layers,
            view_mask: sp.view_mask,
            ..Default::default()
        };

        for (i, r) in sp.color.iter().enumerate() {
            if r.attachment == vk::ATTACHMENT_UNUSED {
                continue;
            }
            let mut color = self.rendering_attachment(r.attachment, vk::AttachmentLoadOp::LOAD);
            if let Some(resolve) = sp.resolve.get(i).filter(|r| r.attachment != vk::ATTACHMENT_UNUSED) {
                color.resolve_mode = resolve_mode_for(self.desc.attachments[resolve.attachment as usize].format);
                color.resolve_view = self.views.get(resolve.attachment as usize).copied().unwrap_or_default();
                color.resolve_layout = self.layouts[resolve.attachment as usize];
            }
            scope.color.push(color);
        }

        if let Some(r) = sp.depth_stencil.filter(|r| r.attachment != vk::ATTACHMENT_UNUSED) {
            let aspect = aspect_mask(self.desc.attachments[r.attachment as usize].format);
            let target = self.rendering_attachment(r.attachment, vk::AttachmentLoadOp::LOAD);
            if aspect.contains(vk::ImageAspectFlags::DEPTH) {
                scope.depth = Some(target);
            }
            if aspect.contains(vk::ImageAspectFlags::STENCIL) {
                scope.stencil = Some(target);
            }
        }

        self.device.cmd_begin_rendering(cmd, &scope);
    }
}

impl Drop for RenderPassWrapper {
    fn drop(&mut self) {
        if self.framebuffer != vk::Framebuffer::null() {
            self.device.destroy_framebuffer(self.framebuffer);
        }
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
        }
    }
}

fn stage_barrier(
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    dependency_flags: vk::DependencyFlags,
) -> BarrierDesc {
    BarrierDesc {
        src_stage: if src_stage.is_empty() {
            vk::PipelineStageFlags::TOP_OF_PIPE
        } else {
            src_stage
        },
        dst_stage: if dst_stage.is_empty() {
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        } else {
            dst_stage
        },
        dependency_flags,
        ..Default::default()
    }
}

/// Integer attachments cannot be averaged.
pub fn resolve_mode_for(format: vk::Format) -> vk::ResolveModeFlags {
    if is_integer_format(format) {
        vk::ResolveModeFlags::SAMPLE_ZERO
    } else {
        vk::ResolveModeFlags::AVERAGE
    }
}

pub fn is_integer_format(format: vk::Format) -> bool {
    use vk::Format as F;
    matches!(
        format,
        F::R8_UINT
            | F::R8_SINT
            | F::R8G8_UINT
            | F::R8G8_SINT
            | F::R8G8B8_UINT
            | F::R8G8B8_SINT
            | F::B8G8R8_UINT
            | F::B8G8R8_SINT
            | F::R8G8B8A8_UINT
            | F::R8G8B8A8_SINT
            | F::B8G8R8A8_UINT
            | F::B8G8R8A8_SINT
            | F::A8B8G8R8_UINT_PACK32
            | F::A8B8G8R8_SINT_PACK32
            | F::A2R10G10B10_UINT_PACK32
            | F::A2R10G10B10_SINT_PACK32
            | F::A2B10G10R10_UINT_PACK32
            | F::A2B10G10R10_SINT_PACK32
            | F::R16_UINT
            | F::R16_SINT
            | F::R16G16_UINT
            | F::R16G16_SINT
            | F::R16G16B16_UINT
            | F::R16G16B16_SINT
            | F::R16G16B16A16_UINT
            | F::R16G16B16A16_SINT
            | F::R32_UINT
            | F::R32_SINT
            | F::R32G32_UINT
            | F::R32G32_SINT
            | F::R32G32B32_UINT
            | F::R32G32B32_SINT
            | F::R32G32B32A32_UINT
            | F::R32G32B32A32_SINT
            | F::R64_UINT
            | F::R64_SINT
            | F::R64G64_UINT
            | F::R64G64_SINT
            | F::R64G64B64_UINT
            | F::R64G64B64_SINT
            | F::R64G64B64A64_UINT
            | F::R64G64B64A64_SINT
            | F::S8_UINT
    )
}

pub fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    use vk::Format as F;
    match format {
        F::D16_UNORM | F::X8_D24_UNORM_PACK32 | F::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
        F::S8_UINT => vk::ImageAspectFlags::STENCIL,
        F::D16_UNORM_S8_UINT | F::D24_UNORM_S8_UINT | F::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recorder::{DeviceCall, RecordingDevice};
    use ash::vk::Handle;

    const A: u32 = 0;
    const B: u32 = 1;

    fn color_attachment(format: vk::Format, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
            ..Default::default()
        }
    }

    fn color_ref(attachment: u32) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    /// Subpass 0 writes A; subpass 1 writes B after a dependency on subpass 0.
    fn two_subpasses(b_final: vk::ImageLayout) -> RenderPassDesc {
        RenderPassDesc {
            attachments: vec![
                color_attachment(vk::Format::R8G8B8A8_UNORM, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                color_attachment(vk::Format::R8G8B8A8_UNORM, b_final),
            ],
            subpasses: vec![
                SubpassDesc {
                    color: vec![color_ref(A)],
                    ..Default::default()
                },
                SubpassDesc {
                    color: vec![color_ref(B)],
                    ..Default::default()
                },
            ],
            dependencies: vec![
                vk::SubpassDependency {
                    src_subpass: vk::SUBPASS_EXTERNAL,
                    dst_subpass: 0,
                    src_stage_mask: vk::PipelineStageFlags::TOP_OF_PIPE,
                    dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    ..Default::default()
                },
                vk::SubpassDependency {
                    src_subpass: 0,
                    dst_subpass: 1,
                    src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                    src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    dst_access_mask: vk::AccessFlags::SHADER_READ,
                    ..Default::default()
                },
                vk::SubpassDependency {
                    src_subpass: 1,
                    dst_subpass: 1,
                    src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                    ..Default::default()
                },
            ],
        }
    }

    fn emulated(desc: RenderPassDesc) -> (Arc<RecordingDevice>, RenderPassWrapper) {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();
        let mut pass =
            RenderPassWrapper::new(PipelineConstructionType::ShaderObjectUnlinkedSpirv, device, desc).unwrap();
        let count = pass.desc().attachments.len() as u64;
        let images: Vec<_> = (0..count).map(|i| vk::Image::from_raw(0x100 + i)).collect();
        let views: Vec<_> = (0..count).map(|i| vk::ImageView::from_raw(0x200 + i)).collect();
        pass.create_framebuffer(&images, &views, 32, 32, 1).unwrap();
        (recorder, pass)
    }

    fn transitions_of(calls: &[DeviceCall], attachment: u32) -> Vec<(vk::ImageLayout, vk::ImageLayout)> {
        calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::PipelineBarrier(b) => Some(b.images.clone()),
                _ => None,
            })
            .flatten()
            .filter(|i| i.attachment == attachment)
            .map(|i| (i.old_layout, i.new_layout))
            .collect()
    }

    fn area() -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width: 32, height: 32 },
        }
    }

    #[test]
    fn emulated_two_subpass_layout_tracking() {
        for b_final in [
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ] {
            let (recorder, mut pass) = emulated(two_subpasses(b_final));
            let cmd = vk::CommandBuffer::null();

            pass.begin(cmd, area(), &[], vk::SubpassContents::INLINE);
            let at_begin = recorder.take_calls();
            pass.next_subpass(cmd, vk::SubpassContents::INLINE);
            let at_next = recorder.take_calls();
            pass.end(cmd);
            let at_end = recorder.take_calls();

            assert_eq!(
                transitions_of(&at_begin, A),
                vec![(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)]
            );
            assert!(transitions_of(&at_next, A).is_empty());
            assert!(transitions_of(&at_end, A).is_empty());
            assert_eq!(pass.attachment_layout(A), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

            assert_eq!(transitions_of(&at_begin, B).len(), 1);
            assert!(transitions_of(&at_next, B).is_empty());
            let expected_end = usize::from(b_final != vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
            assert_eq!(transitions_of(&at_end, B).len(), expected_end);
            assert_eq!(pass.attachment_layout(B), b_final);
            assert_eq!(pass.state(), PassState::Ended);
        }
    }

    #[test]
    fn begin_uses_external_dependency_scope() {
        let (recorder, mut pass) = emulated(two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        pass.begin(vk::CommandBuffer::null(), area(), &[], vk::SubpassContents::INLINE);

        let first = &recorder.barriers()[0];
        assert_eq!(first.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(first.dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(first
            .images
            .iter()
            .all(|i| i.dst_access == vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(first.images[0].image, vk::Image::from_raw(0x100));
    }

    #[test]
    fn self_dependencies_are_not_reissued() {
        let (recorder, mut pass) = emulated(two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        let cmd = vk::CommandBuffer::null();
        pass.begin(cmd, area(), &[], vk::SubpassContents::INLINE);
        recorder.take_calls();
        pass.next_subpass(cmd, vk::SubpassContents::INLINE);

        let memory_barriers: Vec<_> = recorder
            .barriers()
            .into_iter()
            .filter(|b| !b.memory.is_empty())
            .collect();
        assert_eq!(memory_barriers.len(), 1);
        assert_eq!(memory_barriers[0].memory[0].dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn external_dependency_applies_once_at_begin() {
        let (recorder, mut pass) = emulated(two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        pass.begin(vk::CommandBuffer::null(), area(), &[], vk::SubpassContents::INLINE);

        let barriers = recorder.barriers();
        let external_scoped = barriers
            .iter()
            .filter(|b| b.dst_stage == vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .count();
        assert_eq!(external_scoped, 1);
        assert!(barriers.iter().all(|b| b.memory.is_empty()));

        // Nothing to transition, so the dependency stands on its own
        let mut settled = two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        for attachment in &mut settled.attachments {
            attachment.initial_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        }
        let (recorder, mut pass) = emulated(settled);
        pass.begin(vk::CommandBuffer::null(), area(), &[], vk::SubpassContents::INLINE);
        let barriers = recorder.barriers();
        assert_eq!(barriers.len(), 1);
        assert!(barriers[0].images.is_empty());
        assert_eq!(barriers[0].memory[0].dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn clear_on_load_uses_empty_rendering_scope() {
        let mut desc = two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        desc.attachments[A as usize].load_op = vk::AttachmentLoadOp::CLEAR;
        let (recorder, mut pass) = emulated(desc);
        pass.begin(
            vk::CommandBuffer::null(),
            area(),
            &[ClearValue::Float([1.0, 0.0, 0.0, 1.0])],
            vk::SubpassContents::INLINE,
        );

        let scopes: Vec<_> = recorder
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::BeginRendering(scope) => Some(scope),
                _ => None,
            })
            .collect();
        assert_eq!(scopes.len(), 2);
        let clear = &scopes[0].color[0];
        assert_eq!(clear.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(clear.clear_value, ClearValue::Float([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(clear.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(scopes[1].color[0].load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn resolve_mode_depends_on_format_class() {
        assert_eq!(resolve_mode_for(vk::Format::R8_UINT), vk::ResolveModeFlags::SAMPLE_ZERO);
        assert_eq!(resolve_mode_for(vk::Format::R8G8B8A8_UINT), vk::ResolveModeFlags::SAMPLE_ZERO);
        assert_eq!(resolve_mode_for(vk::Format::R8G8B8A8_UNORM), vk::ResolveModeFlags::AVERAGE);
        assert_eq!(resolve_mode_for(vk::Format::R16G16B16A16_SFLOAT), vk::ResolveModeFlags::AVERAGE);
    }

    #[test]
    fn resolve_attachment_selects_mode_in_scope() {
        let mut multisampled = color_attachment(vk::Format::R8G8B8A8_UINT, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        multisampled.samples = vk::SampleCountFlags::TYPE_4;
        let desc = RenderPassDesc {
            attachments: vec![
                multisampled,
                color_attachment(vk::Format::R8G8B8A8_UINT, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            ],
            subpasses: vec![SubpassDesc {
                color: vec![color_ref(0)],
                resolve: vec![color_ref(1)],
                ..Default::default()
            }],
            dependencies: Vec::new(),
        };
        let (recorder, mut pass) = emulated(desc);
        pass.begin(vk::CommandBuffer::null(), area(), &[], vk::SubpassContents::INLINE);

        let scope = recorder
            .calls()
            .into_iter()
            .find_map(|c| match c {
                DeviceCall::BeginRendering(scope) => Some(scope),
                _ => None,
            })
            .unwrap();
        assert_eq!(scope.color[0].resolve_mode, vk::ResolveModeFlags::SAMPLE_ZERO);
        assert_eq!(scope.color[0].resolve_view, vk::ImageView::from_raw(0x201));
        assert_eq!(
            pass.fill_inheritance_rendering_info(0).rasterization_samples,
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    #[should_panic(expected = "last subpass")]
    fn emulated_end_requires_last_subpass() {
        let (_, mut pass) = emulated(two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        pass.begin(vk::CommandBuffer::null(), area(), &[], vk::SubpassContents::INLINE);
        pass.end(vk::CommandBuffer::null());
    }

    #[test]
    fn classic_passes_through() {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();
        let mut pass = RenderPassWrapper::new(
            PipelineConstructionType::Monolithic,
            device,
            two_subpasses(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        )
        .unwrap();
        pass.create_framebuffer(&[], &[vk::ImageView::from_raw(1), vk::ImageView::from_raw(2)], 32, 32, 1)
            .unwrap();
        let cmd = vk::CommandBuffer::null();
        pass.begin(cmd, area(), &[], vk::SubpassContents::INLINE);
        pass.end(cmd);
        let handle = pass.handle();
        drop(pass);

        let calls = recorder.calls();
        assert!(matches!(calls[0], DeviceCall::CreateRenderPass { .. }));
        assert!(matches!(calls[1], DeviceCall::CreateFramebuffer { ref desc, .. } if desc.render_pass == handle));
        assert!(matches!(calls[2], DeviceCall::BeginRenderPass(_)));
        assert!(matches!(calls[3], DeviceCall::EndRenderPass));
        assert_eq!(recorder.barriers().len(), 0);
        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::DestroyRenderPass(_))), 1);
    }

    #[test]
    fn simple_pass_and_inheritance_info() {
        let params = SimpleRenderPass {
            depth_stencil_format: Some(vk::Format::D24_UNORM_S8_UINT),
            ..Default::default()
        };
        let desc = params.to_desc();
        assert_eq!(desc.attachments.len(), 2);
        assert_eq!(desc.attachments[0].initial_layout, vk::ImageLayout::UNDEFINED);

        let device: Arc<dyn DeviceInterface> = Arc::new(RecordingDevice::new());
        let pass = RenderPassWrapper::simple(PipelineConstructionType::ShaderObjectLinkedBinary, device, &params).unwrap();
        assert_eq!(pass.mode(), RenderPassMode::Emulated);
        assert_eq!(pass.handle(), vk::RenderPass::null());
        let info = pass.fill_inheritance_rendering_info(0);
        assert_eq!(info.color_formats, vec![vk::Format::R8G8B8A8_UNORM]);
        assert_eq!(info.depth_format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(info.stencil_format, vk::Format::D24_UNORM_S8_UINT);
    }
}
