//! Lazily evaluated images and rendered pixel buffers.
//!
//! An [`Image`] is a recipe: raster leaves, solid fills, translations and source-over
//! composites. Nothing is rasterized until [`Image::render`] evaluates a region, which is what the
//! render task does when it executes on the queue.

use std::sync::Arc;

use image::Rgba32FImage;
use rayon::prelude::*;

use crate::foundation::core::{LinearRgba, PixelFormat, Point, Rect, Vec2};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::foundation::math::{over_premul, unorm8};

/// Upper bound on a rendered region's width or height.
pub const MAX_RENDER_DIM: u32 = 16_384;

/// Opaque 2D pixel-producing value with an extent.
///
/// Cloning is cheap: nodes are shared.
#[derive(Clone, Debug)]
pub struct Image {
    node: Arc<Node>,
}

#[derive(Debug)]
enum Node {
    Raster { origin: Point, pixels: Rgba32FImage },
    Solid { color: LinearRgba, extent: Rect },
    Translate { by: Vec2, input: Image },
    Over { src: Image, dst: Image },
}

impl Image {
    fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    /// Wrap premultiplied linear RGBA pixels placed at `origin`.
    pub fn from_pixels(origin: Point, pixels: Rgba32FImage) -> Self {
        Self::from_node(Node::Raster { origin, pixels })
    }

    /// Build a `width x height` raster at `origin`, evaluating `f(x, y)` per pixel.
    ///
    /// Rows are filled in parallel; `f` must be pure.
    pub fn from_fn<F>(origin: Point, width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> LinearRgba + Sync,
    {
        let mut pixels = Rgba32FImage::new(width, height);
        let row_len = (width as usize) * 4;
        if row_len > 0 {
            let buf: &mut [f32] = &mut pixels;
            buf.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, px) in row.chunks_exact_mut(4).enumerate() {
                        px.copy_from_slice(&f(x as u32, y as u32).to_array());
                    }
                });
        }
        Self::from_pixels(origin, pixels)
    }

    /// A constant color covering `extent`.
    pub fn solid(color: LinearRgba, extent: Rect) -> Self {
        Self::from_node(Node::Solid { color, extent })
    }

    /// Bounds of the non-transparent area this image may produce.
    pub fn extent(&self) -> Rect {
        match &*self.node {
            Node::Raster { origin, pixels } => Rect::from_origin_size(
                *origin,
                (f64::from(pixels.width()), f64::from(pixels.height())),
            ),
            Node::Solid { extent, .. } => *extent,
            Node::Translate { by, input } => input.extent() + *by,
            Node::Over { src, dst } => src.extent().union(dst.extent()),
        }
    }

    /// This image moved by `by`.
    pub fn translated(&self, by: Vec2) -> Self {
        Self::from_node(Node::Translate {
            by,
            input: self.clone(),
        })
    }

    /// This image composited (premultiplied source-over) on top of `background`.
    pub fn composited_over(&self, background: &Image) -> Self {
        Self::from_node(Node::Over {
            src: self.clone(),
            dst: background.clone(),
        })
    }

    /// Evaluate the color at `p` (nearest pixel). Outside the extent the image is transparent.
    pub fn sample(&self, p: Point) -> LinearRgba {
        match &*self.node {
            Node::Raster { origin, pixels } => {
                let fx = (p.x - origin.x).floor();
                let fy = (p.y - origin.y).floor();
                if fx < 0.0
                    || fy < 0.0
                    || fx >= f64::from(pixels.width())
                    || fy >= f64::from(pixels.height())
                {
                    return LinearRgba::TRANSPARENT;
                }
                LinearRgba::from_array(pixels.get_pixel(fx as u32, fy as u32).0)
            }
            Node::Solid { color, extent } => {
                if p.x >= extent.x0 && p.x < extent.x1 && p.y >= extent.y0 && p.y < extent.y1 {
                    *color
                } else {
                    LinearRgba::TRANSPARENT
                }
            }
            Node::Translate { by, input } => input.sample(p - *by),
            Node::Over { src, dst } => LinearRgba::from_array(over_premul(
                dst.sample(p).to_array(),
                src.sample(p).to_array(),
            )),
        }
    }

    /// Rasterize the region `from` into a tightly packed buffer of `format`.
    ///
    /// `from` is snapped outward to whole pixels. Standard-range formats clamp to `[0, 1]`;
    /// [`PixelFormat::Rgba32Float`] keeps extended values.
    pub fn render(&self, from: Rect, format: PixelFormat) -> FramecastResult<FramePixels> {
        if !(from.x0.is_finite() && from.y0.is_finite() && from.x1.is_finite() && from.y1.is_finite())
        {
            return Err(FramecastError::render("render region is not finite"));
        }
        let from = from.abs().expand();
        let width = from.width() as u64;
        let height = from.height() as u64;
        if width == 0 || height == 0 {
            return Err(FramecastError::render("render region is empty"));
        }
        if width > u64::from(MAX_RENDER_DIM) || height > u64::from(MAX_RENDER_DIM) {
            return Err(FramecastError::render(format!(
                "render region {width}x{height} exceeds {MAX_RENDER_DIM}"
            )));
        }
        let (width, height) = (width as u32, height as u32);

        let bpp = format.bytes_per_pixel();
        let mut data = vec![0u8; format.buffer_len(width, height)];
        data.par_chunks_mut(width as usize * bpp)
            .enumerate()
            .for_each(|(y, row)| {
                let py = from.y0 + y as f64 + 0.5;
                for (x, out) in row.chunks_exact_mut(bpp).enumerate() {
                    let px = self.sample(Point::new(from.x0 + x as f64 + 0.5, py));
                    encode_pixel(out, px, format);
                }
            });

        Ok(FramePixels {
            width,
            height,
            format,
            data,
        })
    }
}

fn encode_pixel(out: &mut [u8], px: LinearRgba, format: PixelFormat) {
    match format {
        PixelFormat::Rgba8Unorm => {
            out.copy_from_slice(&[unorm8(px.r), unorm8(px.g), unorm8(px.b), unorm8(px.a)]);
        }
        PixelFormat::Bgra8Unorm => {
            out.copy_from_slice(&[unorm8(px.b), unorm8(px.g), unorm8(px.r), unorm8(px.a)]);
        }
        PixelFormat::Rgba32Float => {
            for (dst, v) in out.chunks_exact_mut(4).zip(px.to_array()) {
                dst.copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}

/// A rendered frame: tightly packed, row-major pixels in `format`.
#[derive(Clone, Debug, PartialEq)]
pub struct FramePixels {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl FramePixels {
    /// A zero-filled buffer.
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0u8; format.buffer_len(width, height)],
        }
    }

    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Copy `src` into this buffer with its top-left corner at `(x, y)`, clipping to bounds.
    pub fn blit(&mut self, src: &FramePixels, x: i64, y: i64) -> FramecastResult<()> {
        if src.format != self.format {
            return Err(FramecastError::render(format!(
                "pixel format mismatch: {:?} into {:?}",
                src.format, self.format
            )));
        }
        let bpp = self.format.bytes_per_pixel();
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(i64::from(src.width)).min(i64::from(self.width));
        let y1 = y.saturating_add(i64::from(src.height)).min(i64::from(self.height));
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        let span = (x1 - x0) as usize * bpp;
        let dst_stride = self.bytes_per_row();
        let src_stride = src.bytes_per_row();
        for row in y0..y1 {
            let d = row as usize * dst_stride + x0 as usize * bpp;
            let s = (row - y) as usize * src_stride + (x0 - x) as usize * bpp;
            self.data[d..d + span].copy_from_slice(&src.data[s..s + span]);
        }
        Ok(())
    }

    /// Standard-range RGBA8 copy (clamps extended values), e.g. for PNG output or 8-bit encoders.
    pub fn to_rgba8(&self) -> image::RgbaImage {
        let mut out = image::RgbaImage::new(self.width, self.height);
        let bpp = self.format.bytes_per_pixel();
        for (dst, src) in out.chunks_exact_mut(4).zip(self.data.chunks_exact(bpp)) {
            match self.format {
                PixelFormat::Rgba8Unorm => dst.copy_from_slice(src),
                PixelFormat::Bgra8Unorm => dst.copy_from_slice(&[src[2], src[1], src[0], src[3]]),
                PixelFormat::Rgba32Float => {
                    for (d, c) in dst.iter_mut().zip(src.chunks_exact(4)) {
                        *d = unorm8(f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
                    }
                }
            }
        }
        out
    }

    /// Read back one pixel as linear RGBA.
    pub fn pixel(&self, x: u32, y: u32) -> Option<LinearRgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let i = y as usize * self.bytes_per_row() + x as usize * bpp;
        let px = &self.data[i..i + bpp];
        let unit = |v: u8| f32::from(v) / 255.0;
        Some(match self.format {
            PixelFormat::Rgba8Unorm => {
                LinearRgba::new(unit(px[0]), unit(px[1]), unit(px[2]), unit(px[3]))
            }
            PixelFormat::Bgra8Unorm => {
                LinearRgba::new(unit(px[2]), unit(px[1]), unit(px[0]), unit(px[3]))
            }
            PixelFormat::Rgba32Float => {
                let mut c = [0.0f32; 4];
                for (v, b) in c.iter_mut().zip(px.chunks_exact(4)) {
                    *v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                LinearRgba::from_array(c)
            }
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/raster.rs"]
mod tests;
