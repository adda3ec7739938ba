//! Hand-off from the render path to an [`EncoderSession`].
//!
//! Frames are queued through a bounded channel to a dedicated worker thread that owns the session.
//! Producers never block: a full channel drops the frame and counts it. Nothing on this path can
//! fail presentation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::encode::session::{EncoderSession, SampleSource, SessionConfig, SessionSample};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::raster::FramePixels;

pub const DEFAULT_ENCODE_CHANNEL_CAPACITY: usize = 8;

/// A frame offered to the encoder.
#[derive(Clone, Debug)]
pub enum EncodeFrame {
    /// Pixels with a presentation time on the display timeline.
    Timed {
        pts: Duration,
        pixels: Arc<FramePixels>,
    },
    /// Pixels without timing; the bridge synthesizes a timestamp.
    RawSurface(Arc<FramePixels>),
}

/// Session lifecycle. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Writing,
    Finished,
}

/// Counters for the encode path.
#[derive(Debug, Default)]
pub struct EncodeStats {
    queued: AtomicU64,
    appended: AtomicU64,
    trimmed: AtomicU64,
    synthesized: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`EncodeStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct EncodeStatsSnapshot {
    /// Accepted into the channel.
    pub queued: u64,
    /// Appended by the session.
    pub appended: u64,
    /// Discarded for landing before the start offset.
    pub trimmed: u64,
    /// Raw surfaces that were given a synthesized timestamp.
    pub synthesized: u64,
    /// Rejected by the session (or by timestamp ordering).
    pub failed: u64,
    /// Dropped because the channel was full.
    pub dropped: u64,
    /// Offered while the bridge was not writing.
    pub rejected: u64,
}

impl EncodeStats {
    pub fn snapshot(&self) -> EncodeStatsSnapshot {
        EncodeStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            appended: self.appended.load(Ordering::Relaxed),
            trimmed: self.trimmed.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Gate {
    state: BridgeState,
    tx: Option<SyncSender<EncodeFrame>>,
}

struct Shared {
    gate: Mutex<Gate>,
    stats: EncodeStats,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns an encoder session and its worker thread.
pub struct EncodeBridge {
    shared: Arc<Shared>,
    session: Option<Box<dyn EncoderSession>>,
    worker: Option<JoinHandle<FramecastResult<()>>>,
    capacity: usize,
    started: bool,
    start_error: Option<String>,
}

impl EncodeBridge {
    pub fn new(session: Box<dyn EncoderSession>) -> Self {
        Self::with_capacity(session, DEFAULT_ENCODE_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds frames waiting for the worker (at least 1).
    pub fn with_capacity(session: Box<dyn EncoderSession>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                gate: Mutex::new(Gate {
                    state: BridgeState::Idle,
                    tx: None,
                }),
                stats: EncodeStats::default(),
            }),
            session: Some(session),
            worker: None,
            capacity: capacity.max(1),
            started: false,
            start_error: None,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> EncodeStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Whether a session was started. Stays `true` after `finish`.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Why the last `start` failed, if it did and no later `start` succeeded.
    ///
    /// A bridge that never reached `Writing` produces no video, which this makes visible after
    /// `finish`.
    pub fn start_error(&self) -> Option<&str> {
        self.start_error.as_deref()
    }

    /// Producer handle for the render path.
    pub fn input(&self) -> EncodeInput {
        EncodeInput {
            shared: Arc::clone(&self.shared),
        }
    }

    /// `Idle -> Writing`. On failure the bridge stays idle and keeps rejecting frames.
    #[tracing::instrument(skip(self, cfg), fields(width = cfg.width, height = cfg.height))]
    pub fn start(&mut self, cfg: SessionConfig) -> FramecastResult<()> {
        let state = self.state();
        if state != BridgeState::Idle {
            return Err(FramecastError::encoder_start(format!(
                "encode bridge cannot start from {state:?}"
            )));
        }
        if let Err(e) = cfg.encoder.validate() {
            return Err(self.start_failed(FramecastError::encoder_start(e.to_string())));
        }
        let Some(mut session) = self.session.take() else {
            return Err(self.start_failed(FramecastError::encoder_start(
                "encoder session already consumed",
            )));
        };

        if let Err(e) = session.start(&cfg) {
            self.session = Some(session);
            let e = match e {
                FramecastError::EncoderStartFailed(_) => e,
                other => FramecastError::encoder_start(other.to_string()),
            };
            return Err(self.start_failed(e));
        }

        let (tx, rx) = mpsc::sync_channel::<EncodeFrame>(self.capacity);
        let shared = Arc::clone(&self.shared);
        let worker = std::thread::Builder::new()
            .name("framecast-encode".to_string())
            .spawn(move || run_worker(session, rx, cfg, &shared.stats))
            .map_err(|e| FramecastError::encoder_start(format!("failed to spawn encoder: {e}")));
        let worker = match worker {
            Ok(w) => w,
            Err(e) => return Err(self.start_failed(e)),
        };

        self.started = true;
        self.start_error = None;
        let mut gate = self.shared.lock();
        gate.tx = Some(tx);
        gate.state = BridgeState::Writing;
        drop(gate);
        self.worker = Some(worker);
        tracing::info!("encode session writing");
        Ok(())
    }

    fn start_failed(&mut self, e: FramecastError) -> FramecastError {
        tracing::warn!(error = %e, "encoder session failed to start");
        self.start_error = Some(e.to_string());
        e
    }

    /// Mark the input finished and wait for the worker to flush what it already accepted.
    ///
    /// Does not wait on rendering or GPU work. Idempotent: later calls return `Ok(())`.
    pub fn finish(&mut self) -> FramecastResult<()> {
        {
            let mut gate = self.shared.lock();
            if gate.state == BridgeState::Finished {
                return Ok(());
            }
            gate.state = BridgeState::Finished;
            drop(gate.tx.take());
        }

        let Some(worker) = self.worker.take() else {
            tracing::debug!("encode bridge finished without starting");
            return Ok(());
        };
        let res = worker
            .join()
            .map_err(|_| FramecastError::encoder_append("encoder thread panicked"))?;
        let stats = self.stats();
        tracing::info!(
            appended = stats.appended,
            dropped = stats.dropped,
            trimmed = stats.trimmed,
            failed = stats.failed,
            "encode session finished"
        );
        res
    }
}

impl Drop for EncodeBridge {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "encoder finish failed during drop");
        }
    }
}

/// Cloneable, non-blocking producer side of an [`EncodeBridge`].
#[derive(Clone)]
pub struct EncodeInput {
    shared: Arc<Shared>,
}

impl EncodeInput {
    /// Offer a frame. Never blocks; every rejection is counted.
    pub fn append(&self, frame: EncodeFrame) -> FramecastResult<()> {
        let gate = self.shared.lock();
        let stats = &self.shared.stats;
        let tx = match (gate.state, gate.tx.as_ref()) {
            (BridgeState::Writing, Some(tx)) => tx,
            (state, _) => {
                bump(&stats.rejected);
                return Err(FramecastError::encoder_append(format!(
                    "encode bridge is {state:?}"
                )));
            }
        };
        match tx.try_send(frame) {
            Ok(()) => {
                bump(&stats.queued);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                bump(&stats.dropped);
                tracing::debug!("encoder backlog full, frame dropped");
                Err(FramecastError::encoder_append("encoder backlog full"))
            }
            Err(TrySendError::Disconnected(_)) => {
                bump(&stats.failed);
                Err(FramecastError::encoder_append("encoder thread exited"))
            }
        }
    }

    pub fn is_writing(&self) -> bool {
        self.shared.lock().state == BridgeState::Writing
    }
}

/// Maps display-timeline frames onto the session timeline.
struct Timeline {
    start_offset: Duration,
    frame_duration: Duration,
    last_pts: Option<Duration>,
    warned_raw: bool,
}

enum Placement {
    At(Duration, SampleSource),
    Trimmed,
    OutOfOrder(Duration),
}

impl Timeline {
    fn place(&mut self, frame: &EncodeFrame, stats: &EncodeStats) -> Placement {
        match frame {
            EncodeFrame::Timed { pts, .. } => {
                let Some(rel) = pts.checked_sub(self.start_offset) else {
                    return Placement::Trimmed;
                };
                if self.last_pts.is_some_and(|last| rel <= last) {
                    return Placement::OutOfOrder(rel);
                }
                self.last_pts = Some(rel);
                Placement::At(rel, SampleSource::Timed)
            }
            EncodeFrame::RawSurface(_) => {
                if !self.warned_raw {
                    self.warned_raw = true;
                    tracing::warn!(
                        "encoding bare surfaces; timestamps are synthesized from the frame rate"
                    );
                }
                bump(&stats.synthesized);
                let pts = self
                    .last_pts
                    .map_or(Duration::ZERO, |last| last + self.frame_duration);
                self.last_pts = Some(pts);
                Placement::At(pts, SampleSource::RawSurface)
            }
        }
    }
}

fn run_worker(
    mut session: Box<dyn EncoderSession>,
    rx: mpsc::Receiver<EncodeFrame>,
    cfg: SessionConfig,
    stats: &EncodeStats,
) -> FramecastResult<()> {
    let mut timeline = Timeline {
        start_offset: cfg.encoder.start_offset(),
        frame_duration: cfg.fps.frame_duration(),
        last_pts: None,
        warned_raw: false,
    };
    let mut logged_failure = false;

    while let Ok(frame) = rx.recv() {
        let (pts, source) = match timeline.place(&frame, stats) {
            Placement::At(pts, source) => (pts, source),
            Placement::Trimmed => {
                bump(&stats.trimmed);
                continue;
            }
            Placement::OutOfOrder(pts) => {
                bump(&stats.failed);
                tracing::debug!(pts = ?pts, "non-increasing timestamp, frame skipped");
                continue;
            }
        };
        let pixels = match &frame {
            EncodeFrame::Timed { pixels, .. } | EncodeFrame::RawSurface(pixels) => pixels,
        };

        match session.append(&SessionSample {
            pts,
            pixels,
            source,
        }) {
            Ok(()) => bump(&stats.appended),
            Err(e) => {
                bump(&stats.failed);
                if !logged_failure {
                    logged_failure = true;
                    tracing::warn!(error = %e, "encoder rejected a frame");
                } else {
                    tracing::debug!(error = %e, "encoder rejected a frame");
                }
            }
        }
    }

    session.finish()
}

#[cfg(test)]
#[path = "../../tests/unit/encode/bridge.rs"]
mod tests;
