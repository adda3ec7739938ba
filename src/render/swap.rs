use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::core::{Fps, PixelFormat};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::raster::FramePixels;
use crate::render::surface::{
    Presentable, RenderDestination, SurfaceFrame, SurfaceProvider, Texture,
};

/// Headless display surface backed by a ring of in-memory buffers.
///
/// A buffer handed out by [`SurfaceProvider::next_frame`] stays reserved until its drawable is
/// presented (it becomes the front buffer) or dropped. When every buffer is reserved or on screen
/// the surface is unavailable and `next_frame` returns `None`.
///
/// Clones share the same buffers.
#[derive(Clone)]
pub struct SwapSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    timing: Option<Fps>,
    shared: Arc<Mutex<SwapState>>,
}

struct SwapState {
    buffers: Vec<FramePixels>,
    reserved: Vec<bool>,
    front: Option<usize>,
    handed_out: u64,
    presented: u64,
    texture_fetches: u64,
}

impl SwapSurface {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        buffer_count: usize,
    ) -> FramecastResult<Self> {
        if width == 0 || height == 0 {
            return Err(FramecastError::validation("surface size must be non-zero"));
        }
        if buffer_count < 2 {
            return Err(FramecastError::validation(
                "surface needs at least 2 buffers (one on screen, one to draw)",
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            timing: None,
            shared: Arc::new(Mutex::new(SwapState {
                buffers: (0..buffer_count)
                    .map(|_| FramePixels::zeroed(width, height, format))
                    .collect(),
                reserved: vec![false; buffer_count],
                front: None,
                handed_out: 0,
                presented: 0,
                texture_fetches: 0,
            })),
        })
    }

    /// Stamp frames with presentation times spaced by `fps`. Without timing frames are bare
    /// surfaces.
    pub fn with_frame_timing(mut self, fps: Fps) -> Self {
        self.timing = Some(fps);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Copy of the buffer currently on screen.
    pub fn front_buffer(&self) -> Option<FramePixels> {
        let st = self.lock();
        st.front.map(|i| st.buffers[i].clone())
    }

    pub fn presented_count(&self) -> u64 {
        self.lock().presented
    }

    pub fn texture_fetches(&self) -> u64 {
        self.lock().texture_fetches
    }

    /// Buffers currently handed out and not yet presented or dropped.
    pub fn reserved_count(&self) -> usize {
        self.lock().reserved.iter().filter(|r| **r).count()
    }

    fn lock(&self) -> MutexGuard<'_, SwapState> {
        lock_state(&self.shared)
    }
}

fn lock_state(shared: &Mutex<SwapState>) -> MutexGuard<'_, SwapState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SurfaceProvider for SwapSurface {
    fn next_frame(&mut self) -> Option<SurfaceFrame> {
        let (slot, ordinal) = {
            let mut st = self.lock();
            let front = st.front;
            let slot = (0..st.buffers.len()).find(|&i| !st.reserved[i] && Some(i) != front)?;
            st.reserved[slot] = true;
            let ordinal = st.handed_out;
            st.handed_out += 1;
            (slot, ordinal)
        };

        let shared = Arc::clone(&self.shared);
        let (width, height, format) = (self.width, self.height, self.format);
        let texture = move || -> FramecastResult<Box<dyn Texture>> {
            lock_state(&shared).texture_fetches += 1;
            Ok(Box::new(SwapTexture {
                shared,
                slot,
                width,
                height,
                format,
            }))
        };

        Some(SurfaceFrame {
            destination: RenderDestination::new(width, height, format, Box::new(texture)),
            drawable: Box::new(SwapDrawable {
                shared: Arc::clone(&self.shared),
                slot,
                presented: false,
            }),
            timestamp: self
                .timing
                .map(|fps| std::time::Duration::from_secs_f64(fps.frames_to_secs(ordinal))),
        })
    }
}

struct SwapTexture {
    shared: Arc<Mutex<SwapState>>,
    slot: usize,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Texture for SwapTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn write(&mut self, pixels: &FramePixels, x: i64, y: i64) -> FramecastResult<()> {
        lock_state(&self.shared).buffers[self.slot].blit(pixels, x, y)
    }
}

struct SwapDrawable {
    shared: Arc<Mutex<SwapState>>,
    slot: usize,
    presented: bool,
}

impl Presentable for SwapDrawable {
    fn present(mut self: Box<Self>) {
        let mut st = lock_state(&self.shared);
        st.reserved[self.slot] = false;
        st.front = Some(self.slot);
        st.presented += 1;
        drop(st);
        self.presented = true;
    }
}

impl Drop for SwapDrawable {
    fn drop(&mut self) {
        if !self.presented {
            lock_state(&self.shared).reserved[self.slot] = false;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/swap.rs"]
mod tests;
