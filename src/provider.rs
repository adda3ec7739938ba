use crate::foundation::core::{LinearRgba, Point};
use crate::raster::{Image, MAX_RENDER_DIM};

/// Inputs handed to the image provider for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRequest {
    /// Seconds since the pipeline started.
    pub time: f64,
    /// Backing-store scale of the destination (points to pixels).
    pub scale_factor: f32,
    /// Display headroom for this frame; 1.0 means standard range.
    pub headroom: f32,
}

/// Produces a frame's visual content.
///
/// Implementations must be deterministic for a given request (golden-frame tests rely on it) and
/// cheap enough to run once per tick.
pub trait ImageProvider: Send {
    fn image(&self, req: &FrameRequest) -> Image;
}

impl<F> ImageProvider for F
where
    F: Fn(&FrameRequest) -> Image + Send,
{
    fn image(&self, req: &FrameRequest) -> Image {
        self(req)
    }
}

/// Procedural demo content: soft bands sweeping across a square, with highlights that brighten up
/// to the available headroom.
#[derive(Clone, Copy, Debug)]
pub struct PulseField {
    /// Edge length in points; multiplied by the scale factor.
    pub size_points: u32,
    /// Sweep period in seconds.
    pub period_secs: f64,
}

impl Default for PulseField {
    fn default() -> Self {
        Self {
            size_points: 256,
            period_secs: 4.0,
        }
    }
}

impl PulseField {
    /// Edge length in pixels, kept within `1..=MAX_RENDER_DIM`.
    fn side_px(&self, scale_factor: f32) -> u32 {
        let side = (self.size_points as f32 * scale_factor.max(0.0)).round() as u32;
        side.clamp(1, MAX_RENDER_DIM)
    }
}

impl ImageProvider for PulseField {
    fn image(&self, req: &FrameRequest) -> Image {
        let side = self.side_px(req.scale_factor);
        let phase = if self.period_secs > 0.0 {
            (req.time / self.period_secs).fract() as f32
        } else {
            0.0
        };
        let peak = req.headroom.max(1.0);
        let inv = 1.0 / side as f32;

        Image::from_fn(Point::ZERO, side, side, move |x, y| {
            let u = x as f32 * inv;
            let v = y as f32 * inv;
            let band = ((u + v) * 0.5 - phase).rem_euclid(1.0);
            let glow = (1.0 - (band - 0.5).abs() * 2.0).powi(6);
            let base = 0.15 + 0.35 * u;
            let lum = base + glow * (peak - base);
            LinearRgba::new(lum * 0.9, lum * (0.6 + 0.4 * v), lum, 1.0)
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/provider.rs"]
mod tests;
