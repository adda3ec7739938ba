//! The per-tick frame loop.
//!
//! One tick: take an in-flight slot, get a surface, probe headroom, ask the provider for an image,
//! composite it, submit it, then present and commit. The slot comes back when the queue retires
//! the frame's command buffer. Rendered pixels are tapped into the encode bridge on the queue's
//! timeline, in tick order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::encode::bridge::{EncodeBridge, EncodeFrame, EncodeInput, EncodeStatsSnapshot};
use crate::encode::session::{EncoderSession, SessionConfig};
use crate::foundation::core::{FrameIndex, Point, Rect};
use crate::foundation::error::{ErrorClass, FramecastError, FramecastResult};
use crate::probe::{DynamicRangeProbe, DynamicRangeSource};
use crate::provider::{FrameRequest, ImageProvider};
use crate::raster::FramePixels;
use crate::render::command::{CommandQueue, FrameTap, SerialQueue};
use crate::render::submit::RenderSubmitter;
use crate::render::surface::SurfaceProvider;
use crate::sync::slots::FrameSlotLimiter;

/// What happened to one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A render task was submitted and the frame committed.
    Rendered(FrameIndex),
    /// Submission was rejected; the frame was still presented and committed without a task.
    Dropped(FrameIndex),
    /// No surface was available; nothing was rendered, presented or encoded.
    Skipped,
}

/// Loop counters, updated from the tick and completion threads.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    rendered: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    execution_failures: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStatsSnapshot {
    pub ticks: u64,
    pub rendered: u64,
    pub dropped: u64,
    pub skipped: u64,
    /// Command buffers retired by the queue.
    pub completed: u64,
    /// Retired buffers whose render task failed while executing.
    pub execution_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            execution_failures: self.execution_failures.load(Ordering::Relaxed),
        }
    }
}

/// Summary returned by [`FramePipeline::close`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PipelineReport {
    pub frames: PipelineStatsSnapshot,
    pub encode: Option<EncodeStatsSnapshot>,
    /// Every in-flight frame completed before the drain timeout.
    pub drained: bool,
    /// Frames that used the neutral headroom because the source failed.
    pub headroom_fallbacks: u64,
    /// An encoder was attached and its session reached `Writing`.
    pub encoder_started: bool,
    /// Why the attached encoder never started. Set means no video was produced.
    pub encode_start_error: Option<String>,
    /// Failure reported when the started session finished.
    pub encode_error: Option<String>,
}

/// Drives ticks from a provider to a surface, with an optional encode bridge alongside.
pub struct FramePipeline {
    cfg: PipelineConfig,
    limiter: Arc<FrameSlotLimiter>,
    probe: DynamicRangeProbe,
    provider: Box<dyn ImageProvider>,
    compositor: Compositor,
    submitter: RenderSubmitter,
    surface: Box<dyn SurfaceProvider>,
    queue: Arc<dyn CommandQueue>,
    encode: Option<EncodeBridge>,
    encode_input: Option<EncodeInput>,
    stats: Arc<PipelineStats>,
    next_index: u64,
    clock_frames: u64,
    epoch: Option<Instant>,
}

impl FramePipeline {
    /// Pipeline on a [`SerialQueue`] with the headroom source named in `cfg`.
    pub fn new(
        cfg: PipelineConfig,
        provider: Box<dyn ImageProvider>,
        surface: Box<dyn SurfaceProvider>,
    ) -> FramecastResult<Self> {
        cfg.validate()?;
        let queue: Arc<dyn CommandQueue> = Arc::new(SerialQueue::new()?);
        Ok(Self {
            limiter: Arc::new(FrameSlotLimiter::new(cfg.max_in_flight)?),
            probe: DynamicRangeProbe::new(cfg.headroom.build()),
            compositor: Compositor::new(cfg.background),
            submitter: RenderSubmitter::new(),
            provider,
            surface,
            queue,
            encode: None,
            encode_input: None,
            stats: Arc::new(PipelineStats::default()),
            next_index: 0,
            clock_frames: 0,
            epoch: None,
            cfg,
        })
    }

    pub fn with_queue(mut self, queue: Arc<dyn CommandQueue>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_headroom_source(mut self, source: Box<dyn DynamicRangeSource>) -> Self {
        self.probe = DynamicRangeProbe::new(source);
        self
    }

    /// Attach an encoder session. It stays idle until [`FramePipeline::start_encoding`].
    pub fn with_encoder(mut self, session: Box<dyn EncoderSession>) -> Self {
        let bridge = EncodeBridge::with_capacity(session, self.cfg.encode_channel_capacity);
        self.encode_input = Some(bridge.input());
        self.encode = Some(bridge);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn limiter(&self) -> &Arc<FrameSlotLimiter> {
        &self.limiter
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn encode_stats(&self) -> Option<EncodeStatsSnapshot> {
        self.encode.as_ref().map(EncodeBridge::stats)
    }

    pub fn headroom_fallbacks(&self) -> u64 {
        self.probe.fallback_count()
    }

    /// Begin the encode session for `width`x`height` frames.
    ///
    /// A failure stays on the encode path: ticks keep rendering and presenting, and frames are
    /// simply not encoded.
    pub fn start_encoding(&mut self, width: u32, height: u32) -> FramecastResult<()> {
        let bridge = self
            .encode
            .as_mut()
            .ok_or_else(|| FramecastError::encoder_start("no encoder session attached"))?;
        bridge.start(SessionConfig {
            width,
            height,
            format: self.cfg.pixel_format,
            fps: self.cfg.fps,
            encoder: self.cfg.encoder.clone(),
        })
    }

    /// Tick using wall-clock time since the first tick.
    pub fn tick(&mut self) -> FramecastResult<TickOutcome> {
        let epoch = *self.epoch.get_or_insert_with(Instant::now);
        self.tick_at(epoch.elapsed().as_secs_f64())
    }

    /// Produce one frame for provider time `time` (seconds).
    ///
    /// Blocks only in the slot acquire. Frame-local failures come back as `Ok` outcomes; an `Err`
    /// means the queue rejected the commit.
    #[tracing::instrument(level = "debug", skip(self), fields(frame = tracing::field::Empty))]
    pub fn tick_at(&mut self, time: f64) -> FramecastResult<TickOutcome> {
        self.limiter.acquire();
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let Some(frame) = self.surface.next_frame() else {
            self.limiter.release();
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(error = %FramecastError::SurfaceUnavailable, "tick skipped");
            return Ok(TickOutcome::Skipped);
        };

        let index = FrameIndex(self.next_index);
        self.next_index += 1;
        tracing::Span::current().record("frame", index.0);

        let headroom = self.probe.current_headroom();
        let req = FrameRequest {
            time,
            scale_factor: self.cfg.scale_factor,
            headroom,
        };
        let image = self.provider.image(&req);
        let size = frame.destination.size();
        let composed = self.compositor.composite(&image, size);
        tracing::debug!(headroom, width = size.width, height = size.height, "frame composed");

        let mut buffer = self.queue.command_buffer(index);
        let tap = self.encode_tap(frame.timestamp);
        let outcome = match self.submitter.submit(
            composed,
            Rect::from_origin_size(Point::ZERO, size),
            frame.destination,
            Point::ZERO,
            &mut buffer,
            tap,
        ) {
            Ok(()) => {
                self.stats.rendered.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Rendered(index)
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(frame = index.0, error = %e, "render submission failed, frame dropped");
                TickOutcome::Dropped(index)
            }
        };

        let limiter = Arc::clone(&self.limiter);
        let stats = Arc::clone(&self.stats);
        buffer.add_completed_handler(move |status| {
            if !status.is_ok() {
                stats.execution_failures.fetch_add(1, Ordering::Relaxed);
            }
            stats.completed.fetch_add(1, Ordering::Relaxed);
            limiter.release();
        });
        buffer.present_drawable(frame.drawable);

        if let Err(e) = self.queue.commit(buffer) {
            // The buffer and its handler are gone; the slot has to come back here.
            self.limiter.release();
            tracing::error!(frame = index.0, error = %e, "command buffer commit failed");
            return Err(e);
        }
        Ok(outcome)
    }

    fn encode_tap(&self, timestamp: Option<Duration>) -> Option<FrameTap> {
        let input = self.encode_input.as_ref()?;
        if !input.is_writing() {
            return None;
        }
        let input = input.clone();
        Some(Box::new(move |pixels: Arc<FramePixels>| {
            let frame = match timestamp {
                Some(pts) => EncodeFrame::Timed { pts, pixels },
                None => EncodeFrame::RawSurface(pixels),
            };
            // Counted by the bridge; never surfaces on the render path.
            let _ = input.append(frame);
        }))
    }

    /// Tick at the configured rate until `stop` is set or `limit` ticks have run.
    ///
    /// Provider time advances by exactly one frame duration per tick. Returns the number of ticks
    /// run; only fatal errors end the loop early.
    pub fn run(&mut self, limit: Option<u64>, stop: &AtomicBool) -> FramecastResult<u64> {
        let interval = self.cfg.fps.frame_duration();
        let mut anchor = Instant::now();
        let mut n: u64 = 0;
        tracing::info!(fps = self.cfg.fps.as_f64(), limit = ?limit, "frame loop started");

        while !stop.load(Ordering::Relaxed) && limit.is_none_or(|l| n < l) {
            let deadline = anchor + interval.mul_f64(n as f64);
            let now = Instant::now();
            if now < deadline {
                sleep_until(deadline);
            } else if now - deadline > interval {
                tracing::debug!(behind = ?(now - deadline), "frame loop behind schedule, re-anchoring");
                anchor = now - interval.mul_f64(n as f64);
            }

            let time = self.cfg.fps.frames_to_secs(self.clock_frames);
            self.clock_frames += 1;
            if let Err(e) = self.tick_at(time) {
                if e.class() == ErrorClass::Fatal {
                    return Err(e);
                }
                tracing::warn!(error = %e, "tick failed");
            }
            n += 1;
        }

        tracing::info!(ticks = n, "frame loop stopped");
        Ok(n)
    }

    /// Wait for in-flight frames (bounded by `drain_timeout_ms`), then finish the encoder.
    pub fn close(mut self) -> PipelineReport {
        let drained = self.limiter.wait_idle(self.cfg.drain_timeout());
        if !drained {
            tracing::warn!(
                in_flight = self.limiter.in_flight(),
                "drain timed out with frames still in flight"
            );
        }

        let encode_error = match self.encode.as_mut().map(EncodeBridge::finish) {
            Some(Err(e)) => {
                tracing::warn!(error = %e, "encoder finish failed");
                Some(e.to_string())
            }
            _ => None,
        };

        let report = PipelineReport {
            frames: self.stats.snapshot(),
            encode: self.encode_stats(),
            drained,
            headroom_fallbacks: self.probe.fallback_count(),
            encoder_started: self.encode.as_ref().is_some_and(EncodeBridge::started),
            encode_start_error: self
                .encode
                .as_ref()
                .and_then(|b| b.start_error().map(str::to_string)),
            encode_error,
        };
        tracing::info!(
            rendered = report.frames.rendered,
            completed = report.frames.completed,
            skipped = report.frames.skipped,
            dropped = report.frames.dropped,
            "pipeline closed"
        );
        report
    }
}

/// Sleep to `deadline`, spinning through the last stretch for sub-millisecond accuracy.
fn sleep_until(deadline: Instant) {
    const SPIN_THRESHOLD: Duration = Duration::from_micros(1500);

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining > SPIN_THRESHOLD {
        std::thread::sleep(remaining - SPIN_THRESHOLD);
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;
