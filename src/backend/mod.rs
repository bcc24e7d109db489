// Backend module - device boundary and its implementations
//
// `interface` is the seam the wrappers are written against. `device` drives a
// real GPU through ash; `recorder` logs calls for tests and dry runs.

pub mod capabilities;
mod commands;
pub mod device;
pub mod interface;
mod pipeline;
pub mod recorder;
mod shader;

pub use capabilities::{check_pipeline_construction_requirements, DeviceCapabilities};
pub use device::VulkanDevice;
pub use interface::DeviceInterface;
pub use recorder::{DeviceCall, RecordingDevice};
