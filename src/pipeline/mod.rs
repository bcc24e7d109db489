// Pipeline module - graphics pipeline construction
//
// Shader, layout and pipeline wrappers that give the same call shape for
// monolithic pipelines, graphics pipeline libraries and shader objects.

pub mod chain;
pub mod dynamic;
pub mod layout;
mod library;
mod monolithic;
pub mod replay;
pub mod shader;
pub mod shader_object;
pub mod state;
pub mod wrapper;

pub use chain::{ChainRecord, CreationFeedback, ExtensionChain, FeedbackSink};
pub use dynamic::DynamicStateSet;
pub use layout::{PipelineLayoutInfo, PipelineLayoutWrapper};
pub use shader::ShaderWrapper;
pub use state::{ConstructionFamily, PipelineConstructionType, SetupState};
pub use wrapper::{
    BuildOptions, FragmentOutputSetup, FragmentShaderSetup, GraphicsPipelineWrapper, MeshShaderSetup,
    PartOptions, PreRasterizationSetup, ShaderStage, VertexInputSetup,
};
