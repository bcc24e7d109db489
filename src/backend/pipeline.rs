// Graphics pipeline, render pass and framebuffer creation
//
// Turns the owned descriptor records into ash create-info structs. Everything
// a create-info points at lives in locals of the creating function, so the
// structs are built with `.build()` and passed straight to the driver.

use super::interface::*;
use crate::pipeline::chain::{ChainRecord, CreationFeedback, FeedbackSink};
use ash::vk;
use std::ffi::{c_void, CStr};

pub const ENTRY_POINT: &CStr = c"main";

/// A native extension struct produced from one `ChainRecord`.
enum NativeRecord {
    LibraryInfo(vk::GraphicsPipelineLibraryCreateInfoEXT),
    Libraries(vk::PipelineLibraryCreateInfoKHR),
    FragmentShadingRate(vk::PipelineFragmentShadingRateStateCreateInfoKHR),
    Rendering(vk::PipelineRenderingCreateInfo),
    RepresentativeFragmentTest(vk::PipelineRepresentativeFragmentTestStateCreateInfoNV),
    Robustness(vk::PipelineRobustnessCreateInfoEXT),
    CreationFeedback(vk::PipelineCreationFeedbackCreateInfo),
}

impl NativeRecord {
    fn base(&mut self) -> *mut vk::BaseOutStructure {
        match self {
            Self::LibraryInfo(s) => s as *mut _ as *mut vk::BaseOutStructure,
            Self::Libraries(s) => s as *mut _ as *mut vk::BaseOutStructure,
            Self::FragmentShadingRate(s) => s as *mut _ as *mut vk::BaseOutStructure,
            Self::Rendering(s) => s as *mut _ as *mut vk::BaseOutStructure,
            Self::RepresentativeFragmentTest(s) => s as *mut _ as *mut vk::BaseOutStructure,
            Self::Robustness(s) => s as *mut _ as *mut vk::BaseOutStructure,
            Self::CreationFeedback(s) => s as *mut _ as *mut vk::BaseOutStructure,
        }
    }
}

/// Link `records` in order and return the head, or null when empty.
///
/// The records must not move until the create call has returned.
fn link(records: &mut [NativeRecord]) -> *const c_void {
    let mut next: *mut vk::BaseOutStructure = std::ptr::null_mut();
    for record in records.iter_mut().rev() {
        let base = record.base();
        unsafe { (*base).p_next = next };
        next = base;
    }
    next as *const c_void
}

struct FeedbackStorage {
    sink: FeedbackSink,
    pipeline: vk::PipelineCreationFeedback,
    stages: Vec<vk::PipelineCreationFeedback>,
}

impl FeedbackStorage {
    fn publish(&self) {
        self.sink.store(CreationFeedback {
            flags: self.pipeline.flags,
            duration_ns: self.pipeline.duration,
            stages: self.stages.iter().map(|s| (s.flags, s.duration)).collect(),
        });
    }
}

pub fn create_pipeline_layout(device: &ash::Device, desc: &PipelineLayoutDesc) -> VkResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .flags(desc.flags)
        .set_layouts(&desc.set_layouts)
        .push_constant_ranges(&desc.push_constant_ranges);

    unsafe { device.create_pipeline_layout(&layout_info, None) }
}

pub fn create_graphics_pipeline(
    device: &ash::Device,
    cache: vk::PipelineCache,
    desc: &GraphicsPipelineDesc,
) -> VkResult<vk::Pipeline> {
    // Shader stages
    let specializations: Vec<Option<vk::SpecializationInfo>> = desc
        .stages
        .iter()
        .map(|s| {
            s.specialization.as_ref().map(|sp| {
                vk::SpecializationInfo::builder()
                    .map_entries(&sp.map_entries)
                    .data(&sp.data)
                    .build()
            })
        })
        .collect();
    let mut identifiers: Vec<Option<vk::PipelineShaderStageModuleIdentifierCreateInfoEXT>> = desc
        .stages
        .iter()
        .map(|s| {
            s.module_identifier.as_ref().map(|id| {
                vk::PipelineShaderStageModuleIdentifierCreateInfoEXT::builder()
                    .identifier(id)
                    .build()
            })
        })
        .collect();
    let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
        .stages
        .iter()
        .zip(&specializations)
        .zip(identifiers.iter_mut())
        .map(|((stage, specialization), identifier)| {
            let mut builder = vk::PipelineShaderStageCreateInfo::builder()
                .stage(stage.stage)
                .module(stage.module)
                .name(ENTRY_POINT);
            if let Some(specialization) = specialization {
                builder = builder.specialization_info(specialization);
            }
            if let Some(identifier) = identifier {
                builder = builder.push_next(identifier);
            }
            builder.build()
        })
        .collect();

    // Vertex input
    let vertex_input = desc.vertex_input.as_ref().map(|v| {
        vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&v.bindings)
            .vertex_attribute_descriptions(&v.attributes)
            .build()
    });
    let input_assembly = desc.input_assembly.map(|ia| {
        vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(ia.topology)
            .primitive_restart_enable(ia.primitive_restart_enable)
            .build()
    });

    // Tessellation
    let mut domain_origin = desc
        .tessellation
        .and_then(|t| t.domain_origin)
        .map(|origin| {
            vk::PipelineTessellationDomainOriginStateCreateInfo::builder()
                .domain_origin(origin)
                .build()
        });
    let tessellation = desc.tessellation.map(|t| {
        let mut builder =
            vk::PipelineTessellationStateCreateInfo::builder().patch_control_points(t.patch_control_points);
        if let Some(origin) = domain_origin.as_mut() {
            builder = builder.push_next(origin);
        }
        builder.build()
    });

    // Viewport and scissor
    let mut depth_clip_control = desc
        .viewport
        .as_ref()
        .and_then(|v| v.chain.depth_clip_negative_one_to_one)
        .map(|negative_one_to_one| {
            vk::PipelineViewportDepthClipControlCreateInfoEXT::builder()
                .negative_one_to_one(negative_one_to_one)
                .build()
        });
    let viewport = desc.viewport.as_ref().map(|v| {
        let mut builder = vk::PipelineViewportStateCreateInfo::builder();
        if let Some(control) = depth_clip_control.as_mut() {
            builder = builder.push_next(control);
        }
        if !v.viewports.is_empty() {
            builder = builder.viewports(&v.viewports);
        }
        if !v.scissors.is_empty() {
            builder = builder.scissors(&v.scissors);
        }
        builder
            .viewport_count(v.viewport_count)
            .scissor_count(v.scissor_count)
            .build()
    });

    // Rasterization and its extension blocks
    let raster = desc.rasterization;
    let mut line_state = raster.and_then(|r| r.line).map(|line| {
        vk::PipelineRasterizationLineStateCreateInfoEXT::builder()
            .line_rasterization_mode(line.mode)
            .stippled_line_enable(line.stippled_line_enable)
            .line_stipple_factor(line.stipple_factor)
            .line_stipple_pattern(line.stipple_pattern)
            .build()
    });
    let mut provoking_vertex = raster.and_then(|r| r.provoking_vertex_mode).map(|mode| {
        vk::PipelineRasterizationProvokingVertexStateCreateInfoEXT::builder()
            .provoking_vertex_mode(mode)
            .build()
    });
    let mut conservative = raster.and_then(|r| {
        r.conservative_mode.map(|mode| {
            vk::PipelineRasterizationConservativeStateCreateInfoEXT::builder()
                .conservative_rasterization_mode(mode)
                .extra_primitive_overestimation_size(r.extra_primitive_overestimation_size)
                .build()
        })
    });
    let mut depth_clip = raster.and_then(|r| r.depth_clip_enable).map(|enable| {
        vk::PipelineRasterizationDepthClipStateCreateInfoEXT::builder()
            .depth_clip_enable(enable)
            .build()
    });
    let mut stream = raster.and_then(|r| r.rasterization_stream).map(|stream| {
        vk::PipelineRasterizationStateStreamCreateInfoEXT::builder()
            .rasterization_stream(stream)
            .build()
    });
    let rasterization = raster.map(|r| {
        let mut builder = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(r.depth_clamp_enable)
            .rasterizer_discard_enable(r.rasterizer_discard_enable)
            .polygon_mode(r.polygon_mode)
            .cull_mode(r.cull_mode)
            .front_face(r.front_face)
            .depth_bias_enable(r.depth_bias_enable)
            .depth_bias_constant_factor(r.depth_bias_constant_factor)
            .depth_bias_clamp(r.depth_bias_clamp)
            .depth_bias_slope_factor(r.depth_bias_slope_factor)
            .line_width(r.line_width);
        if let Some(s) = line_state.as_mut() {
            builder = builder.push_next(s);
        }
        if let Some(s) = provoking_vertex.as_mut() {
            builder = builder.push_next(s);
        }
        if let Some(s) = conservative.as_mut() {
            builder = builder.push_next(s);
        }
        if let Some(s) = depth_clip.as_mut() {
            builder = builder.push_next(s);
        }
        if let Some(s) = stream.as_mut() {
            builder = builder.push_next(s);
        }
        builder.build()
    });

    // Fragment state
    let multisample = desc.multisample.as_ref().map(|m| {
        let mut builder = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(m.rasterization_samples)
            .sample_shading_enable(m.sample_shading_enable)
            .min_sample_shading(m.min_sample_shading)
            .alpha_to_coverage_enable(m.alpha_to_coverage_enable)
            .alpha_to_one_enable(m.alpha_to_one_enable);
        if !m.sample_mask.is_empty() {
            builder = builder.sample_mask(&m.sample_mask);
        }
        builder.build()
    });
    let depth_stencil = desc.depth_stencil.map(|ds| {
        vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(ds.depth_test_enable)
            .depth_write_enable(ds.depth_write_enable)
            .depth_compare_op(ds.depth_compare_op)
            .depth_bounds_test_enable(ds.depth_bounds_test_enable)
            .stencil_test_enable(ds.stencil_test_enable)
            .front(ds.front)
            .back(ds.back)
            .min_depth_bounds(ds.min_depth_bounds)
            .max_depth_bounds(ds.max_depth_bounds)
            .build()
    });
    let color_blend = desc.color_blend.as_ref().map(|cb| {
        vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(cb.logic_op_enable)
            .logic_op(cb.logic_op)
            .attachments(&cb.attachments)
            .blend_constants(cb.blend_constants)
            .build()
    });
    let dynamic = desc.dynamic_states.as_ref().map(|states| {
        vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(states)
            .build()
    });

    // Extension chain, flattened in insertion order
    let mut feedback = desc.chain.iter().find_map(|record| match record {
        ChainRecord::CreationFeedback { sink, stage_count } => Some(FeedbackStorage {
            sink: sink.clone(),
            pipeline: vk::PipelineCreationFeedback::default(),
            stages: vec![vk::PipelineCreationFeedback::default(); *stage_count as usize],
        }),
        _ => None,
    });
    let mut natives: Vec<NativeRecord> = Vec::with_capacity(desc.chain.len() + 1);
    for record in desc.chain.iter() {
        let native = match record {
            ChainRecord::LibraryInfo(flags) => NativeRecord::LibraryInfo(
                vk::GraphicsPipelineLibraryCreateInfoEXT::builder()
                    .flags(*flags)
                    .build(),
            ),
            ChainRecord::FragmentShadingRate(fsr) => NativeRecord::FragmentShadingRate(
                vk::PipelineFragmentShadingRateStateCreateInfoKHR::builder()
                    .fragment_size(fsr.fragment_size)
                    .combiner_ops(fsr.combiner_ops)
                    .build(),
            ),
            ChainRecord::Rendering(formats) => NativeRecord::Rendering(
                vk::PipelineRenderingCreateInfo::builder()
                    .view_mask(formats.view_mask)
                    .color_attachment_formats(&formats.color_formats)
                    .depth_attachment_format(formats.depth_format)
                    .stencil_attachment_format(formats.stencil_format)
                    .build(),
            ),
            ChainRecord::RepresentativeFragmentTest { enable } => NativeRecord::RepresentativeFragmentTest(
                vk::PipelineRepresentativeFragmentTestStateCreateInfoNV::builder()
                    .representative_fragment_test_enable(*enable)
                    .build(),
            ),
            ChainRecord::Robustness(r) => NativeRecord::Robustness(
                vk::PipelineRobustnessCreateInfoEXT::builder()
                    .storage_buffers(r.storage_buffers)
                    .uniform_buffers(r.uniform_buffers)
                    .vertex_inputs(r.vertex_inputs)
                    .images(r.images)
                    .build(),
            ),
            ChainRecord::CreationFeedback { .. } => match feedback.as_mut() {
                Some(storage) => NativeRecord::CreationFeedback(
                    vk::PipelineCreationFeedbackCreateInfo::builder()
                        .pipeline_creation_feedback(&mut storage.pipeline)
                        .pipeline_stage_creation_feedbacks(&mut storage.stages)
                        .build(),
                ),
                None => continue,
            },
        };
        natives.push(native);
    }
    if !desc.libraries.is_empty() {
        natives.push(NativeRecord::Libraries(
            vk::PipelineLibraryCreateInfoKHR::builder()
                .libraries(&desc.libraries)
                .build(),
        ));
    }

    let mut builder = vk::GraphicsPipelineCreateInfo::builder()
        .flags(desc.flags)
        .stages(&stages)
        .layout(desc.layout)
        .render_pass(desc.render_pass)
        .subpass(desc.subpass)
        .base_pipeline_handle(desc.base_pipeline)
        .base_pipeline_index(desc.base_pipeline_index);
    if let Some(s) = vertex_input.as_ref() {
        builder = builder.vertex_input_state(s);
    }
    if let Some(s) = input_assembly.as_ref() {
        builder = builder.input_assembly_state(s);
    }
    if let Some(s) = tessellation.as_ref() {
        builder = builder.tessellation_state(s);
    }
    if let Some(s) = viewport.as_ref() {
        builder = builder.viewport_state(s);
    }
    if let Some(s) = rasterization.as_ref() {
        builder = builder.rasterization_state(s);
    }
    if let Some(s) = multisample.as_ref() {
        builder = builder.multisample_state(s);
    }
    if let Some(s) = depth_stencil.as_ref() {
        builder = builder.depth_stencil_state(s);
    }
    if let Some(s) = color_blend.as_ref() {
        builder = builder.color_blend_state(s);
    }
    if let Some(s) = dynamic.as_ref() {
        builder = builder.dynamic_state(s);
    }
    let mut pipeline_info = builder.build();
    pipeline_info.p_next = link(&mut natives);

    let pipelines = unsafe {
        device.create_graphics_pipelines(cache, std::slice::from_ref(&pipeline_info), None)
    }
    .map_err(|(_, e)| e)?;

    if let Some(storage) = &feedback {
        storage.publish();
    }
    pipelines.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)
}

pub fn create_render_pass(device: &ash::Device, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
    let subpasses: Vec<vk::SubpassDescription> = desc
        .subpasses
        .iter()
        .map(|s| {
            let mut builder = vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .input_attachments(&s.input)
                .color_attachments(&s.color)
                .preserve_attachments(&s.preserve);
            if !s.resolve.is_empty() {
                builder = builder.resolve_attachments(&s.resolve);
            }
            if let Some(depth_stencil) = s.depth_stencil.as_ref() {
                builder = builder.depth_stencil_attachment(depth_stencil);
            }
            builder.build()
        })
        .collect();

    let view_masks: Vec<u32> = desc.subpasses.iter().map(|s| s.view_mask).collect();
    let mut multiview = vk::RenderPassMultiviewCreateInfo::builder()
        .view_masks(&view_masks)
        .build();

    let mut render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&desc.attachments)
        .subpasses(&subpasses)
        .dependencies(&desc.dependencies);
    if view_masks.iter().any(|m| *m != 0) {
        render_pass_info = render_pass_info.push_next(&mut multiview);
    }

    unsafe { device.create_render_pass(&render_pass_info, None) }
}

pub fn create_framebuffer(device: &ash::Device, desc: &FramebufferDesc) -> VkResult<vk::Framebuffer> {
    let framebuffer_info = vk::FramebufferCreateInfo::builder()
        .render_pass(desc.render_pass)
        .attachments(&desc.attachments)
        .width(desc.width)
        .height(desc.height)
        .layers(desc.layers);

    unsafe { device.create_framebuffer(&framebuffer_info, None) }
}

pub fn cmd_begin_render_pass(device: &ash::Device, cmd: vk::CommandBuffer, begin: &RenderPassBeginDesc) {
    let clear_values: Vec<vk::ClearValue> = begin.clear_values.iter().map(|c| c.to_vk()).collect();
    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(begin.render_pass)
        .framebuffer(begin.framebuffer)
        .render_area(begin.render_area)
        .clear_values(&clear_values);

    unsafe { device.cmd_begin_render_pass(cmd, &begin_info, begin.contents) }
}

fn rendering_attachment(attachment: &RenderingAttachmentDesc) -> vk::RenderingAttachmentInfo {
    vk::RenderingAttachmentInfo::builder()
        .image_view(attachment.view)
        .image_layout(attachment.layout)
        .resolve_mode(attachment.resolve_mode)
        .resolve_image_view(attachment.resolve_view)
        .resolve_image_layout(attachment.resolve_layout)
        .load_op(attachment.load_op)
        .store_op(attachment.store_op)
        .clear_value(attachment.clear_value.to_vk())
        .build()
}

pub fn cmd_begin_rendering(device: &ash::Device, cmd: vk::CommandBuffer, scope: &RenderingScopeDesc) {
    let colors: Vec<vk::RenderingAttachmentInfo> = scope.color.iter().map(rendering_attachment).collect();
    let depth = scope.depth.as_ref().map(rendering_attachment);
    let stencil = scope.stencil.as_ref().map(rendering_attachment);

    let mut rendering_info = vk::RenderingInfo::builder()
        .flags(scope.flags)
        .render_area(scope.render_area)
        .layer_count(scope.layer_count)
        .view_mask(scope.view_mask)
        .color_attachments(&colors);
    if let Some(depth) = depth.as_ref() {
        rendering_info = rendering_info.depth_attachment(depth);
    }
    if let Some(stencil) = stencil.as_ref() {
        rendering_info = rendering_info.stencil_attachment(stencil);
    }

    unsafe { device.cmd_begin_rendering(cmd, &rendering_info) }
}

pub fn cmd_pipeline_barrier(device: &ash::Device, cmd: vk::CommandBuffer, barrier: &BarrierDesc) {
    let memory: Vec<vk::MemoryBarrier> = barrier
        .memory
        .iter()
        .map(|m| {
            vk::MemoryBarrier::builder()
                .src_access_mask(m.src_access)
                .dst_access_mask(m.dst_access)
                .build()
        })
        .collect();
    let images: Vec<vk::ImageMemoryBarrier> = barrier
        .images
        .iter()
        .map(|i| {
            vk::ImageMemoryBarrier::builder()
                .src_access_mask(i.src_access)
                .dst_access_mask(i.dst_access)
                .old_layout(i.old_layout)
                .new_layout(i.new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(i.image)
                .subresource_range(i.subresource_range)
                .build()
        })
        .collect();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            barrier.src_stage,
            barrier.dst_stage,
            barrier.dependency_flags,
            &memory,
            &[],
            &images,
        )
    }
}

pub fn cmd_clear_attachments(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    attachments: &[ClearAttachmentDesc],
    rects: &[vk::ClearRect],
) {
    let clears: Vec<vk::ClearAttachment> = attachments
        .iter()
        .map(|a| vk::ClearAttachment {
            aspect_mask: a.aspect_mask,
            color_attachment: a.color_attachment,
            clear_value: a.value.to_vk(),
        })
        .collect();

    unsafe { device.cmd_clear_attachments(cmd, &clears, rects) }
}
