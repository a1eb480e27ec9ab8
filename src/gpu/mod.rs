//! GPU-facing components: C2 packet definitions, C3 render command queue,
//! C10 command-buffer parser.

pub mod commands;
pub mod parser;
pub mod pm4;
pub mod queue;

pub use commands::{GpuTrackedState, RenderCommand};
pub use parser::GpuCommandParser;
pub use queue::RenderCommandQueue;
