// Shader module and shader object creation
//
// Vulkan consumes SPIR-V as 4-byte words for modules, and as a byte blob
// (SPIR-V or driver binary) for shader objects.

use super::interface::{ShaderCode, ShaderObjectDesc, VkResult};
use super::pipeline::ENTRY_POINT;
use ash::extensions::ext::ShaderObject;
use ash::vk;

pub fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
    flags: vk::ShaderModuleCreateFlags,
) -> VkResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().flags(flags).code(code);

    unsafe { device.create_shader_module(&create_info, None) }
}

fn code_bytes(code: &ShaderCode) -> (vk::ShaderCodeTypeEXT, &[u8]) {
    match code {
        // Words to bytes is always aligned
        ShaderCode::Spirv(words) => (vk::ShaderCodeTypeEXT::SPIRV, unsafe {
            std::slice::from_raw_parts(words.as_ptr() as *const u8, words.len() * 4)
        }),
        ShaderCode::Binary(bytes) => (vk::ShaderCodeTypeEXT::BINARY, bytes),
    }
}

/// Create every stage in one call so linked stages are compiled together.
pub fn create_shaders(loader: &ShaderObject, descs: &[ShaderObjectDesc]) -> VkResult<Vec<vk::ShaderEXT>> {
    let specializations: Vec<Option<vk::SpecializationInfo>> = descs
        .iter()
        .map(|d| {
            d.specialization.as_ref().map(|sp| {
                vk::SpecializationInfo::builder()
                    .map_entries(&sp.map_entries)
                    .data(&sp.data)
                    .build()
            })
        })
        .collect();

    let create_infos: Vec<vk::ShaderCreateInfoEXT> = descs
        .iter()
        .zip(&specializations)
        .map(|(desc, specialization)| {
            let (code_type, code) = code_bytes(&desc.code);
            let mut builder = vk::ShaderCreateInfoEXT::builder()
                .flags(desc.flags)
                .stage(desc.stage)
                .next_stage(desc.next_stage)
                .code_type(code_type)
                .code(code)
                .name(ENTRY_POINT)
                .set_layouts(&desc.set_layouts)
                .push_constant_ranges(&desc.push_constant_ranges);
            if let Some(specialization) = specialization {
                builder = builder.specialization_info(specialization);
            }
            builder.build()
        })
        .collect();

    unsafe { loader.create_shaders(&create_infos, None) }
}

pub fn get_shader_binary_data(loader: &ShaderObject, shader: vk::ShaderEXT) -> VkResult<Vec<u8>> {
    unsafe { loader.get_shader_binary_data(shader) }
}

pub fn destroy_shader(loader: &ShaderObject, shader: vk::ShaderEXT) {
    unsafe { loader.destroy_shader(shader, None) }
}
