/// Command buffers, render tasks and queues.
pub mod command;
/// `wgpu`-backed queue and textures.
#[cfg(feature = "gpu")]
pub mod gpu;
/// Render task validation and encoding.
pub mod submit;
/// Destination, texture and presentation contracts.
pub mod surface;
/// Headless in-memory swap surface.
pub mod swap;
