use std::time::Duration;

use crate::foundation::core::{PixelFormat, Size};
use crate::foundation::error::FramecastResult;
use crate::raster::FramePixels;

/// A writable destination texture.
pub trait Texture: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;
    /// Write `pixels` with their top-left corner at `(x, y)`, clipped to the texture.
    fn write(&mut self, pixels: &FramePixels, x: i64, y: i64) -> FramecastResult<()>;
}

/// Fetch-on-demand access to a destination texture.
///
/// Called at most once, when the render task starts executing on the queue; a presentable
/// surface may only be valid just before it is written.
pub trait TextureProvider: Send {
    fn acquire(self: Box<Self>) -> FramecastResult<Box<dyn Texture>>;
}

impl<F> TextureProvider for F
where
    F: FnOnce() -> FramecastResult<Box<dyn Texture>> + Send,
{
    fn acquire(self: Box<Self>) -> FramecastResult<Box<dyn Texture>> {
        (*self)()
    }
}

/// Something that can be shown once its buffer's work has run.
pub trait Presentable: Send {
    fn present(self: Box<Self>);
}

/// Target of a single frame's render.
pub struct RenderDestination {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub(crate) texture: Box<dyn TextureProvider>,
}

impl RenderDestination {
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        texture: Box<dyn TextureProvider>,
    ) -> Self {
        Self {
            width,
            height,
            pixel_format,
            texture,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

impl std::fmt::Debug for RenderDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDestination")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .finish_non_exhaustive()
    }
}

/// What the display hands out for one tick.
pub struct SurfaceFrame {
    pub destination: RenderDestination,
    pub drawable: Box<dyn Presentable>,
    /// Presentation time on the display's timeline. `None` for a bare surface without timing;
    /// the encode bridge then takes its raw-surface path.
    pub timestamp: Option<Duration>,
}

/// Per-tick source of destinations.
pub trait SurfaceProvider: Send {
    /// `None` when no surface is ready; the tick is skipped.
    fn next_frame(&mut self) -> Option<SurfaceFrame>;
}
