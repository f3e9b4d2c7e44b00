mod engine_handle;
mod sse_handle;

pub use engine_handle::*;
pub use sse_handle::*;
