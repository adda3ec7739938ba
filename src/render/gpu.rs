//! `wgpu` destination textures and a device-backed command queue.
//!
//! Render tasks still rasterize on the CPU; their output is uploaded with `write_texture` and the
//! buffer's completion is tied to the device timeline through `on_submitted_work_done`, so
//! handlers fire only after the upload has retired on the GPU.

use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::foundation::core::PixelFormat;
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::raster::FramePixels;
use crate::render::command::{CommandBuffer, CommandQueue};
use crate::render::surface::{Texture, TextureProvider};

/// Device and queue pair.
#[derive(Clone, Debug)]
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WgpuContext {
    pub fn new() -> FramecastResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                FramecastError::queue("no gpu adapter available")
            }
            other => FramecastError::queue(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("framecast"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| FramecastError::queue(format!("wgpu request_device failed: {e:?}")))?;

        Ok(Self { device, queue })
    }

    /// Allocate a texture usable as a render destination.
    pub fn create_target(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> FramecastResult<WgpuTarget> {
        if width == 0 || height == 0 {
            return Err(FramecastError::validation("gpu target size must be non-zero"));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("framecast_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Ok(WgpuTarget {
            queue: self.queue.clone(),
            texture,
            width,
            height,
            format,
        })
    }
}

pub fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

/// A GPU texture that can be handed to render tasks.
#[derive(Clone, Debug)]
pub struct WgpuTarget {
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl WgpuTarget {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Deferred handle for a [`crate::render::surface::RenderDestination`].
    pub fn texture_provider(&self) -> Box<dyn TextureProvider> {
        let target = self.clone();
        Box::new(move || -> FramecastResult<Box<dyn Texture>> { Ok(Box::new(target)) })
    }
}

impl Texture for WgpuTarget {
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
        if pixels.format != self.format {
            return Err(FramecastError::render(format!(
                "pixel format {:?} does not match texture format {:?}",
                pixels.format, self.format
            )));
        }
        let sx = x.saturating_neg().max(0);
        let sy = y.saturating_neg().max(0);
        let dx = x.max(0);
        let dy = y.max(0);
        let w = (i64::from(pixels.width) - sx).min(i64::from(self.width) - dx);
        let h = (i64::from(pixels.height) - sy).min(i64::from(self.height) - dy);
        if w <= 0 || h <= 0 {
            return Ok(());
        }

        let bpp = self.format.bytes_per_pixel();
        let src_stride = pixels.bytes_per_row();
        let row_bytes = (w as usize) * bpp;
        let mut clipped = Vec::with_capacity(row_bytes * h as usize);
        for row in 0..h as usize {
            let start = (sy as usize + row) * src_stride + (sx as usize) * bpp;
            clipped.extend_from_slice(&pixels.data[start..start + row_bytes]);
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: dx as u32,
                    y: dy as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &clipped,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_bytes as u32),
                rows_per_image: Some(h as u32),
            },
            wgpu::Extent3d {
                width: w as u32,
                height: h as u32,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

/// Command queue whose buffers retire on the device timeline.
///
/// `commit` runs the buffer's tasks on the calling thread (uploads are only queued), submits, and
/// registers the completion with `on_submitted_work_done`. A poll thread drives the device so the
/// callbacks fire without the committer blocking. Device callbacks fire in submission order.
pub struct WgpuQueue {
    queue: wgpu::Queue,
    wake: Mutex<Option<mpsc::Sender<()>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl WgpuQueue {
    pub fn new(ctx: &WgpuContext) -> FramecastResult<Self> {
        let (wake, rx) = mpsc::channel::<()>();
        let device = ctx.device.clone();
        let poller = std::thread::Builder::new()
            .name("framecast-gpu-poll".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    while rx.try_recv().is_ok() {}
                    if let Err(e) = device.poll(wgpu::PollType::wait_indefinitely()) {
                        tracing::error!(error = ?e, "wgpu poll failed");
                    }
                }
            })
            .map_err(|e| FramecastError::queue(format!("failed to spawn gpu poll thread: {e}")))?;

        Ok(Self {
            queue: ctx.queue.clone(),
            wake: Mutex::new(Some(wake)),
            poller: Mutex::new(Some(poller)),
        })
    }

    /// Stop polling after retiring everything already submitted.
    pub fn shutdown(&self) -> FramecastResult<()> {
        drop(
            self.wake
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = poller {
            handle
                .join()
                .map_err(|_| FramecastError::queue("gpu poll thread panicked"))?;
        }
        Ok(())
    }
}

impl CommandQueue for WgpuQueue {
    fn commit(&self, buffer: CommandBuffer) -> FramecastResult<()> {
        let guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        let wake = guard
            .as_ref()
            .ok_or_else(|| FramecastError::queue("queue is shut down"))?;

        let completion = buffer.run();
        self.queue.submit(std::iter::empty());
        self.queue
            .on_submitted_work_done(move || completion.signal());
        wake.send(())
            .map_err(|_| FramecastError::queue("gpu poll thread exited"))
    }
}

impl Drop for WgpuQueue {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "gpu queue shutdown failed");
        }
    }
}
