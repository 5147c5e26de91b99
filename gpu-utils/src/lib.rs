pub mod gpu;
pub mod wgpu_utils;

pub use gpu::{CallbackId, ContextLostReason, Gpu, GpuDescriptor, GpuError};
