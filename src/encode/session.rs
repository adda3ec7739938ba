use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::foundation::core::{Fps, PixelFormat};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::raster::FramePixels;

/// Video codec requested from the encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    H264,
    Hevc,
}

impl Codec {
    /// Profiles accepted for 8-bit 4:2:0 output.
    pub fn profiles(self) -> &'static [&'static str] {
        match self {
            Self::H264 => &["baseline", "main", "high", "high10", "high422", "high444"],
            Self::Hevc => &["main", "main10", "mainstillpicture", "msp"],
        }
    }
}

/// Encoder parameters.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub codec: Codec,
    /// Target bitrate in kbit/s.
    pub bitrate_kbps: u32,
    /// Codec profile name (e.g. `high`, `main10`). `None` leaves the encoder default.
    pub profile: Option<String>,
    /// Where the session timeline starts, in seconds of frame time.
    pub start_offset_secs: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            bitrate_kbps: 8_000,
            profile: None,
            start_offset_secs: 0.0,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> FramecastResult<()> {
        if self.bitrate_kbps == 0 {
            return Err(FramecastError::validation("encoder bitrate_kbps must be > 0"));
        }
        if !self.start_offset_secs.is_finite() || self.start_offset_secs < 0.0 {
            return Err(FramecastError::validation(
                "encoder start_offset_secs must be finite and >= 0",
            ));
        }
        if let Some(p) = &self.profile
            && !self.codec.profiles().contains(&p.as_str())
        {
            return Err(FramecastError::validation(format!(
                "encoder profile '{p}' is not supported for {:?} (expected one of {})",
                self.codec,
                self.codec.profiles().join(", ")
            )));
        }
        Ok(())
    }

    pub fn start_offset(&self) -> Duration {
        Duration::from_secs_f64(self.start_offset_secs.max(0.0))
    }
}

/// Everything a session learns when it starts.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: Fps,
    pub encoder: EncoderConfig,
}

/// How a sample's timestamp was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleSource {
    /// Came with its own presentation time.
    Timed,
    /// Bare surface; the timestamp was synthesized from the frame rate and may be off.
    RawSurface,
}

/// One frame as seen by an encoder session.
#[derive(Clone, Copy, Debug)]
pub struct SessionSample<'a> {
    /// Time on the session timeline (zero at the configured start offset).
    pub pts: Duration,
    pub pixels: &'a FramePixels,
    pub source: SampleSource,
}

/// Video-encoder input.
///
/// `append` failures are per-frame and non-fatal; the bridge counts them and keeps going.
pub trait EncoderSession: Send {
    fn start(&mut self, cfg: &SessionConfig) -> FramecastResult<()>;
    fn append(&mut self, sample: &SessionSample<'_>) -> FramecastResult<()>;
    fn finish(&mut self) -> FramecastResult<()>;
}

/// A sample captured by [`InMemoryEncoder`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSample {
    pub pts: Duration,
    pub source: SampleSource,
    pub pixels: FramePixels,
}

#[derive(Debug, Default)]
struct Recording {
    config: Option<SessionConfig>,
    samples: Vec<RecordedSample>,
    finish_calls: u32,
}

/// In-memory session for tests and golden-frame checks.
///
/// The session is moved into the encode bridge; keep a [`RecordingHandle`] to inspect it.
#[derive(Debug, Default)]
pub struct InMemoryEncoder {
    recording: Arc<Mutex<Recording>>,
}

impl InMemoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording(&self) -> RecordingHandle {
        RecordingHandle {
            recording: Arc::clone(&self.recording),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EncoderSession for InMemoryEncoder {
    fn start(&mut self, cfg: &SessionConfig) -> FramecastResult<()> {
        let mut rec = self.lock();
        rec.config = Some(cfg.clone());
        rec.samples.clear();
        Ok(())
    }

    fn append(&mut self, sample: &SessionSample<'_>) -> FramecastResult<()> {
        let mut rec = self.lock();
        let Some(cfg) = rec.config.as_ref() else {
            return Err(FramecastError::encoder_append("session not started"));
        };
        if sample.pixels.width != cfg.width || sample.pixels.height != cfg.height {
            return Err(FramecastError::encoder_append(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                sample.pixels.width, sample.pixels.height, cfg.width, cfg.height
            )));
        }
        rec.samples.push(RecordedSample {
            pts: sample.pts,
            source: sample.source,
            pixels: sample.pixels.clone(),
        });
        Ok(())
    }

    fn finish(&mut self) -> FramecastResult<()> {
        self.lock().finish_calls += 1;
        Ok(())
    }
}

/// Read access to an [`InMemoryEncoder`]'s captured state.
#[derive(Clone, Debug)]
pub struct RecordingHandle {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingHandle {
    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> Option<SessionConfig> {
        self.lock().config.clone()
    }

    pub fn samples(&self) -> Vec<RecordedSample> {
        self.lock().samples.clone()
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn finish_calls(&self) -> u32 {
        self.lock().finish_calls
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/session.rs"]
mod tests;
