use crate::foundation::core::{Point, Rect};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::raster::{Image, MAX_RENDER_DIM};
use crate::render::command::{CommandBuffer, FrameTap, RenderTask};
use crate::render::surface::RenderDestination;

/// Validates and encodes render tasks into a frame's command buffer.
///
/// A rejected submission leaves the buffer untouched, so the caller can still present and commit
/// it.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderSubmitter;

impl RenderSubmitter {
    pub fn new() -> Self {
        Self
    }

    /// Encode a task drawing the `from` region of `image` into `destination` at `origin`.
    ///
    /// The destination's texture is not touched here; it is fetched when the buffer executes.
    /// `tap`, when given, receives the written pixels right after the write.
    pub fn submit(
        &self,
        image: Image,
        from: Rect,
        destination: RenderDestination,
        origin: Point,
        buffer: &mut CommandBuffer,
        tap: Option<FrameTap>,
    ) -> FramecastResult<()> {
        if destination.width == 0 || destination.height == 0 {
            return Err(FramecastError::render(format!(
                "destination {}x{} is empty",
                destination.width, destination.height
            )));
        }
        if destination.width > MAX_RENDER_DIM || destination.height > MAX_RENDER_DIM {
            return Err(FramecastError::render(format!(
                "destination {}x{} exceeds {MAX_RENDER_DIM}",
                destination.width, destination.height
            )));
        }
        let finite = [from.x0, from.y0, from.x1, from.y1, origin.x, origin.y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(FramecastError::render("render rect or origin is not finite"));
        }
        let bound = f64::from(MAX_RENDER_DIM);
        if origin.x.abs() > bound || origin.y.abs() > bound {
            return Err(FramecastError::render(format!(
                "origin ({}, {}) is outside +/-{MAX_RENDER_DIM}",
                origin.x, origin.y
            )));
        }
        if from.width() <= 0.0 || from.height() <= 0.0 {
            return Err(FramecastError::render("render rect is empty"));
        }
        if from.width() > f64::from(MAX_RENDER_DIM) || from.height() > f64::from(MAX_RENDER_DIM) {
            return Err(FramecastError::render(format!(
                "render rect {}x{} exceeds {MAX_RENDER_DIM}",
                from.width(),
                from.height()
            )));
        }

        buffer.encode_task(RenderTask::new(image, from, destination, origin, tap));
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/submit.rs"]
mod tests;
