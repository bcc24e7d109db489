// Device capability query
//
// Decides whether a construction type can run on a device before any wrapper
// is created. An unsupported type is reported as `NotSupported`, never as a
// failure.

use crate::error::{PipelineError, Result};
use crate::pipeline::state::{ConstructionFamily, PipelineConstructionType};
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;

pub const GRAPHICS_PIPELINE_LIBRARY: &CStr = c"VK_EXT_graphics_pipeline_library";
pub const PIPELINE_LIBRARY: &CStr = c"VK_KHR_pipeline_library";
pub const SHADER_OBJECT: &CStr = c"VK_EXT_shader_object";
pub const FRAGMENT_SHADING_RATE: &CStr = c"VK_KHR_fragment_shading_rate";
pub const VERTEX_INPUT_DYNAMIC_STATE: &CStr = c"VK_EXT_vertex_input_dynamic_state";
pub const EXTENDED_DYNAMIC_STATE_3: &CStr = c"VK_EXT_extended_dynamic_state3";
pub const PIPELINE_ROBUSTNESS: &CStr = c"VK_EXT_pipeline_robustness";
pub const SHADER_MODULE_IDENTIFIER: &CStr = c"VK_EXT_shader_module_identifier";
pub const DEPTH_CLIP_CONTROL: &CStr = c"VK_EXT_depth_clip_control";

/// Optional device extensions enabled whenever the device offers them.
pub const OPTIONAL_EXTENSIONS: &[&CStr] = &[
    PIPELINE_LIBRARY,
    GRAPHICS_PIPELINE_LIBRARY,
    SHADER_OBJECT,
    FRAGMENT_SHADING_RATE,
    VERTEX_INPUT_DYNAMIC_STATE,
    EXTENDED_DYNAMIC_STATE_3,
    PIPELINE_ROBUSTNESS,
    SHADER_MODULE_IDENTIFIER,
    DEPTH_CLIP_CONTROL,
];

#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    pub api_version: u32,
    pub extensions: BTreeSet<String>,
}

impl DeviceCapabilities {
    pub fn new(api_version: u32, extensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            api_version,
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn supports(&self, extension: &CStr) -> bool {
        self.extensions.contains(extension.to_string_lossy().as_ref())
    }
}

/// `Ok` when `construction_type` can be used on a device with `caps`.
pub fn check_pipeline_construction_requirements(
    caps: &DeviceCapabilities,
    construction_type: PipelineConstructionType,
) -> Result<()> {
    let required: &[&CStr] = match construction_type.family() {
        ConstructionFamily::Monolithic => &[],
        ConstructionFamily::Library => &[GRAPHICS_PIPELINE_LIBRARY],
        ConstructionFamily::ShaderObject => &[SHADER_OBJECT],
    };

    for extension in required {
        if !caps.supports(extension) {
            return Err(PipelineError::NotSupported(format!(
                "{} requires {}",
                construction_type,
                extension.to_string_lossy()
            )));
        }
    }

    // Emulated render passes are built on dynamic rendering
    if construction_type.is_shader_object() && caps.api_version < vk::API_VERSION_1_3 {
        return Err(PipelineError::NotSupported(format!(
            "{} requires Vulkan 1.3",
            construction_type
        )));
    }
    Ok(())
}
