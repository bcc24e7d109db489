// Shader stage wrapper
//
// A `ShaderWrapper` holds a shared reference to SPIR-V code and lazily
// creates the shader module the first time a module-based pipeline asks for
// it. Copies share the module cache, so a copy handed to a pipeline wrapper
// and the caller's original observe the same handle. Shader objects are not
// created here: linked stages have to be created together, which only the
// pipeline wrapper can do.

use super::layout::PipelineLayoutInfo;
use super::state::SpecializationInfo;
use crate::backend::interface::DeviceInterface;
use crate::error::Result;
use ash::vk;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct RealizedModule {
    device: Arc<dyn DeviceInterface>,
    module: vk::ShaderModule,
}

struct ShaderSource {
    /// `None` when the stage is described by a module identifier only
    code: Option<Arc<[u32]>>,
    flags: vk::ShaderModuleCreateFlags,
    module_identifier: Option<Vec<u8>>,
    binary: Option<Arc<[u8]>>,
    realized: Mutex<Option<RealizedModule>>,
}

impl Drop for ShaderSource {
    fn drop(&mut self) {
        if let Some(realized) = self.realized.get_mut().take() {
            realized.device.destroy_shader_module(realized.module);
        }
    }
}

/// One programmable stage. The default value is the unset shader.
#[derive(Clone, Default)]
pub struct ShaderWrapper {
    source: Option<Arc<ShaderSource>>,
    layout: Option<PipelineLayoutInfo>,
    specialization: Option<SpecializationInfo>,
}

impl fmt::Debug for ShaderWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderWrapper")
            .field("is_set", &self.is_set())
            .field("words", &self.code().map(|c| c.len()))
            .field("module_identifier", &self.module_identifier().is_some())
            .field("attached", &self.layout.is_some())
            .finish()
    }
}

impl ShaderWrapper {
    pub fn from_spirv(code: impl Into<Arc<[u32]>>) -> Self {
        Self::with_source(Some(code.into()), None)
    }

    /// Parse a SPIR-V blob, checking size and magic number.
    pub fn from_bytes(bytes: &[u8]) -> std::io::Result<Self> {
        let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes))?;
        Ok(Self::from_spirv(words))
    }

    /// A stage known only by its module identifier. Pipelines using it are
    /// created with `FAIL_ON_PIPELINE_COMPILE_REQUIRED`.
    pub fn from_module_identifier(identifier: Vec<u8>) -> Self {
        Self::with_source(None, Some(identifier))
    }

    fn with_source(code: Option<Arc<[u32]>>, module_identifier: Option<Vec<u8>>) -> Self {
        Self {
            source: Some(Arc::new(ShaderSource {
                code,
                flags: vk::ShaderModuleCreateFlags::empty(),
                module_identifier,
                binary: None,
                realized: Mutex::new(None),
            })),
            layout: None,
            specialization: None,
        }
    }

    /// Must be called before the wrapper is copied anywhere.
    pub fn with_flags(self, flags: vk::ShaderModuleCreateFlags) -> Self {
        self.map_source(|s| s.flags = flags)
    }

    /// Precompiled shader-object binary to use instead of the SPIR-V code.
    pub fn with_binary(self, binary: impl Into<Arc<[u8]>>) -> Self {
        let binary = binary.into();
        self.map_source(|s| s.binary = Some(binary))
    }

    fn map_source(mut self, f: impl FnOnce(&mut ShaderSource)) -> Self {
        let source = self
            .source
            .as_mut()
            .and_then(Arc::get_mut)
            .filter(|s| s.realized.lock().is_none());
        match source {
            Some(source) => f(source),
            None => panic!("shader must be configured before it is shared or realized"),
        }
        self
    }

    pub fn is_set(&self) -> bool {
        self.source.is_some()
    }

    pub fn code(&self) -> Option<&Arc<[u32]>> {
        self.source.as_ref().and_then(|s| s.code.as_ref())
    }

    pub fn flags(&self) -> vk::ShaderModuleCreateFlags {
        self.source.as_ref().map(|s| s.flags).unwrap_or_default()
    }

    pub fn module_identifier(&self) -> Option<&[u8]> {
        self.source.as_ref().and_then(|s| s.module_identifier.as_deref())
    }

    pub fn binary(&self) -> Option<&Arc<[u8]>> {
        self.source.as_ref().and_then(|s| s.binary.as_ref())
    }

    pub fn specialization(&self) -> Option<&SpecializationInfo> {
        self.specialization.as_ref()
    }

    pub fn layout(&self) -> Option<&PipelineLayoutInfo> {
        self.layout.as_ref()
    }

    /// Record the binding context. Done once, when the stage is placed into
    /// a pipeline phase.
    pub fn attach(&mut self, layout: &PipelineLayoutInfo, specialization: Option<SpecializationInfo>) {
        assert!(self.layout.is_none(), "shader is already attached to a pipeline layout");
        self.layout = Some(layout.clone());
        self.specialization = specialization;
    }

    /// The shader module, created on first use and shared by every copy.
    ///
    /// Unset shaders and module-identifier shaders yield a null handle.
    pub fn realize(&self, device: &Arc<dyn DeviceInterface>) -> Result<vk::ShaderModule> {
        let Some(source) = &self.source else {
            return Ok(vk::ShaderModule::null());
        };
        let Some(code) = &source.code else {
            return Ok(vk::ShaderModule::null());
        };

        let mut realized = source.realized.lock();
        if let Some(existing) = realized.as_ref() {
            return Ok(existing.module);
        }
        let module = device.create_shader_module(code, source.flags)?;
        log::debug!("Created shader module {:?} ({} words)", module, code.len());
        *realized = Some(RealizedModule {
            device: Arc::clone(device),
            module,
        });
        Ok(module)
    }

    /// The module if some copy already realized it.
    pub fn module(&self) -> vk::ShaderModule {
        self.source
            .as_ref()
            .and_then(|s| s.realized.lock().as_ref().map(|r| r.module))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recorder::{DeviceCall, RecordingDevice};

    const SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];

    #[test]
    fn unset_shader_realizes_to_null() {
        let device: Arc<dyn DeviceInterface> = Arc::new(RecordingDevice::new());
        let shader = ShaderWrapper::default();
        assert!(!shader.is_set());
        assert_eq!(shader.realize(&device), Ok(vk::ShaderModule::null()));
    }

    #[test]
    fn copies_share_the_realized_module() {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();

        let original = ShaderWrapper::from_spirv(SPIRV.to_vec());
        let copy = original.clone();
        let module = copy.realize(&device).unwrap();

        assert_ne!(module, vk::ShaderModule::null());
        assert_eq!(original.module(), module);
        assert_eq!(original.realize(&device), Ok(module));
        assert_eq!(
            recorder.call_count(|c| matches!(c, DeviceCall::CreateShaderModule { .. })),
            1
        );
    }

    #[test]
    fn module_destroyed_with_last_copy() {
        let recorder = Arc::new(RecordingDevice::new());
        let device: Arc<dyn DeviceInterface> = recorder.clone();

        let original = ShaderWrapper::from_spirv(SPIRV.to_vec());
        let copy = original.clone();
        copy.realize(&device).unwrap();
        drop(original);
        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::DestroyShaderModule(_))), 0);
        drop(copy);
        assert_eq!(recorder.call_count(|c| matches!(c, DeviceCall::DestroyShaderModule(_))), 1);
    }

    #[test]
    fn module_identifier_has_no_module() {
        let device: Arc<dyn DeviceInterface> = Arc::new(RecordingDevice::new());
        let shader = ShaderWrapper::from_module_identifier(vec![1, 2, 3]);
        assert!(shader.is_set());
        assert_eq!(shader.module_identifier(), Some(&[1u8, 2, 3][..]));
        assert_eq!(shader.realize(&device), Ok(vk::ShaderModule::null()));
    }

    #[test]
    fn parses_spirv_bytes() {
        let bytes: Vec<u8> = SPIRV.iter().flat_map(|w| w.to_le_bytes()).collect();
        let shader = ShaderWrapper::from_bytes(&bytes).unwrap();
        assert_eq!(shader.code().map(|c| c.len()), Some(5));
        assert!(ShaderWrapper::from_bytes(&bytes[..7]).is_err());
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn attach_is_one_shot() {
        let mut shader = ShaderWrapper::from_spirv(SPIRV.to_vec());
        let layout = PipelineLayoutInfo::default();
        shader.attach(&layout, None);
        shader.attach(&layout, None);
    }
}
