// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Physical device selection (Vulkan 1.3, prefer discrete GPU)
// - Logical device creation with every optional pipeline extension the GPU offers
// - `DeviceInterface` on top of ash

use super::capabilities::{self, DeviceCapabilities};
use super::commands::{self, CommandLoaders, FragmentShadingRateLoader};
use super::interface::*;
use super::{pipeline, shader};
use anyhow::{Context, Result};
use ash::extensions::ext::{DebugUtils, ShaderObject};
use ash::{vk, Entry};
use std::ffi::{CStr, CString};
use std::sync::Arc;

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Extension loaders, present only when the extension was enabled
    shader_object: Option<ShaderObject>,
    fragment_shading_rate: Option<FragmentShadingRateLoader>,

    pub properties: vk::PhysicalDeviceProperties,
    pub capabilities: DeviceCapabilities,
}

impl VulkanDevice {
    /// Create Vulkan device
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }.context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let instance = Self::create_instance(&entry, app_name, enable_validation)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let (physical_device, graphics_queue_family) = Self::pick_physical_device(&instance)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let caps = Self::query_capabilities(&instance, physical_device, &properties)?;

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, graphics_queue_family, &caps)?;

        let shader_object = caps
            .supports(capabilities::SHADER_OBJECT)
            .then(|| ShaderObject::new(&instance, &device));
        let fragment_shading_rate = caps
            .supports(capabilities::FRAGMENT_SHADING_RATE)
            .then(|| FragmentShadingRateLoader::new(&instance, &device));

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            graphics_queue,
            graphics_queue_family,
            debug_utils,
            shader_object,
            fragment_shading_rate,
            properties,
            capabilities: caps,
        }))
    }

    fn create_instance(entry: &Entry, app_name: &str, enable_validation: bool) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("pipeline-construction")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extensions = if enable_validation {
            vec![DebugUtils::name().as_ptr()]
        } else {
            vec![]
        };

        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(entry: &Entry, instance: &ash::Instance) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };

            // Dynamic rendering and extended dynamic state 1/2 are core in 1.3
            if props.api_version < vk::API_VERSION_1_3 {
                continue;
            }

            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

            let graphics_family = queue_families
                .iter()
                .enumerate()
                .find(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32);

            if let Some(graphics_family) = graphics_family {
                let score = match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                    _ => 1,
                };

                if score > best_score {
                    best_score = score;
                    best_device = Some((device, graphics_family));
                }
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No Vulkan 1.3 GPU with a graphics queue found"))
    }

    fn query_capabilities(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        properties: &vk::PhysicalDeviceProperties,
    ) -> Result<DeviceCapabilities> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .context("Failed to enumerate device extensions")?;

        let names = extensions
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_string_lossy().into_owned());

        Ok(DeviceCapabilities::new(properties.api_version, names))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        caps: &DeviceCapabilities,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let enabled: Vec<&CStr> = capabilities::OPTIONAL_EXTENSIONS
            .iter()
            .copied()
            .filter(|ext| caps.supports(ext))
            .collect();
        for ext in &enabled {
            log::debug!("Enabling {}", ext.to_string_lossy());
        }
        let extensions: Vec<*const std::ffi::c_char> = enabled.iter().map(|ext| ext.as_ptr()).collect();

        // Query what the GPU supports, then enable exactly that
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut library = vk::PhysicalDeviceGraphicsPipelineLibraryFeaturesEXT::default();
        let mut shader_object = vk::PhysicalDeviceShaderObjectFeaturesEXT::default();
        let mut dynamic_state3 = vk::PhysicalDeviceExtendedDynamicState3FeaturesEXT::default();
        let mut vertex_input = vk::PhysicalDeviceVertexInputDynamicStateFeaturesEXT::default();
        let mut shading_rate = vk::PhysicalDeviceFragmentShadingRateFeaturesKHR::default();
        let mut robustness = vk::PhysicalDevicePipelineRobustnessFeaturesEXT::default();
        let mut module_identifier = vk::PhysicalDeviceShaderModuleIdentifierFeaturesEXT::default();
        let mut depth_clip_control = vk::PhysicalDeviceDepthClipControlFeaturesEXT::default();

        let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut vulkan13);
        if caps.supports(capabilities::GRAPHICS_PIPELINE_LIBRARY) {
            features2 = features2.push_next(&mut library);
        }
        if caps.supports(capabilities::SHADER_OBJECT) {
            features2 = features2.push_next(&mut shader_object);
        }
        if caps.supports(capabilities::EXTENDED_DYNAMIC_STATE_3) {
            features2 = features2.push_next(&mut dynamic_state3);
        }
        if caps.supports(capabilities::VERTEX_INPUT_DYNAMIC_STATE) {
            features2 = features2.push_next(&mut vertex_input);
        }
        if caps.supports(capabilities::FRAGMENT_SHADING_RATE) {
            features2 = features2.push_next(&mut shading_rate);
        }
        if caps.supports(capabilities::PIPELINE_ROBUSTNESS) {
            features2 = features2.push_next(&mut robustness);
        }
        if caps.supports(capabilities::SHADER_MODULE_IDENTIFIER) {
            features2 = features2.push_next(&mut module_identifier);
        }
        if caps.supports(capabilities::DEPTH_CLIP_CONTROL) {
            features2 = features2.push_next(&mut depth_clip_control);
        }
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut *features2);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    fn loaders(&self) -> CommandLoaders<'_> {
        CommandLoaders {
            device: &self.device,
            shader_object: self.shader_object.as_ref(),
            fragment_shading_rate: self.fragment_shading_rate.as_ref(),
        }
    }

    fn shader_object_loader(&self) -> VkResult<&ShaderObject> {
        self.shader_object.as_ref().ok_or(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl DeviceInterface for VulkanDevice {
    fn create_shader_module(&self, code: &[u32], flags: vk::ShaderModuleCreateFlags) -> VkResult<vk::ShaderModule> {
        shader::create_shader_module(&self.device, code, flags)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> VkResult<vk::PipelineLayout> {
        pipeline::create_pipeline_layout(&self.device, desc)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, cache: vk::PipelineCache, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline> {
        pipeline::create_graphics_pipeline(&self.device, cache, desc)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_shaders(&self, descs: &[ShaderObjectDesc]) -> VkResult<Vec<vk::ShaderEXT>> {
        shader::create_shaders(self.shader_object_loader()?, descs)
    }

    fn get_shader_binary_data(&self, shader: vk::ShaderEXT) -> VkResult<Vec<u8>> {
        shader::get_shader_binary_data(self.shader_object_loader()?, shader)
    }

    fn destroy_shader(&self, shader: vk::ShaderEXT) {
        if let Some(loader) = &self.shader_object {
            shader::destroy_shader(loader, shader);
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        pipeline::create_render_pass(&self.device, desc)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> VkResult<vk::Framebuffer> {
        pipeline::create_framebuffer(&self.device, desc)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBeginDesc) {
        pipeline::cmd_begin_render_pass(&self.device, cmd, begin)
    }

    fn cmd_next_subpass(&self, cmd: vk::CommandBuffer, contents: vk::SubpassContents) {
        unsafe { self.device.cmd_next_subpass(cmd, contents) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, scope: &RenderingScopeDesc) {
        pipeline::cmd_begin_rendering(&self.device, cmd, scope)
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) }
    }

    fn cmd_pipeline_barrier(&self, cmd: vk::CommandBuffer, barrier: &BarrierDesc) {
        pipeline::cmd_pipeline_barrier(&self.device, cmd, barrier)
    }

    fn cmd_clear_attachments(&self, cmd: vk::CommandBuffer, attachments: &[ClearAttachmentDesc], rects: &[vk::ClearRect]) {
        pipeline::cmd_clear_attachments(&self.device, cmd, attachments, rects)
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(cmd, bind_point, pipeline) }
    }

    fn cmd_bind_shader(&self, cmd: vk::CommandBuffer, stage: vk::ShaderStageFlags, shader: vk::ShaderEXT) {
        match &self.shader_object {
            Some(loader) => unsafe { loader.cmd_bind_shaders(cmd, &[stage], &[shader]) },
            None => log::warn!("Cannot bind {:?} shader: VK_EXT_shader_object not enabled", stage),
        }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, sets, dynamic_offsets)
        }
    }

    fn cmd_set_dynamic_state(&self, cmd: vk::CommandBuffer, command: &DynamicCommand) {
        commands::cmd_set_dynamic_state(&self.loaders(), cmd, command)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
