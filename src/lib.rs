// =============================================================================
// PIPELINE CONSTRUCTION - one interface over three ways to build a pipeline
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  GraphicsPipelineWrapper / RenderPassWrapper                    │
// │    └── Construction backend (monolithic, library, shader obj)   │
// │          └── DeviceInterface                                    │
// │                ├── VulkanDevice (ash)                           │
// │                └── RecordingDevice (tests, dry runs)            │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render_pass;

pub use backend::interface::DeviceInterface;
pub use backend::recorder::RecordingDevice;
pub use error::{PipelineError, Result};
pub use pipeline::{GraphicsPipelineWrapper, PipelineConstructionType, PipelineLayoutWrapper, ShaderWrapper};
pub use render_pass::RenderPassWrapper;
