use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;

use crate::encode::bridge::DEFAULT_ENCODE_CHANNEL_CAPACITY;
use crate::encode::session::EncoderConfig;
use crate::foundation::core::{Fps, LinearRgba, PixelFormat};
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::probe::HeadroomSourceKind;
use crate::sync::slots::DEFAULT_MAX_IN_FLIGHT;

/// Pipeline knobs. Every field has a default, so a config file only names what it changes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Frames allowed between acquire and GPU retirement.
    pub max_in_flight: usize,
    /// Target presentation rate.
    pub fps: Fps,
    /// Points-to-pixels factor handed to the image provider.
    pub scale_factor: f32,
    /// Fill behind the composed image. Alpha is forced to 1.
    pub background: LinearRgba,
    /// Format of the destination surface.
    pub pixel_format: PixelFormat,
    pub headroom: HeadroomSourceKind,
    /// Encode frames that may wait for the encoder before new ones are dropped.
    pub encode_channel_capacity: usize,
    /// How long `close` waits for outstanding completions.
    pub drain_timeout_ms: u64,
    pub encoder: EncoderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            fps: Fps::default(),
            scale_factor: 1.0,
            background: LinearRgba::OPAQUE_BLACK,
            pixel_format: PixelFormat::Bgra8Unorm,
            headroom: HeadroomSourceKind::default(),
            encode_channel_capacity: DEFAULT_ENCODE_CHANNEL_CAPACITY,
            drain_timeout_ms: 2_000,
            encoder: EncoderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> FramecastResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| FramecastError::validation(format!("invalid pipeline config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> FramecastResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> FramecastResult<()> {
        if self.max_in_flight == 0 {
            return Err(FramecastError::validation("max_in_flight must be > 0"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(FramecastError::validation(
                "scale_factor must be finite and > 0",
            ));
        }
        if !self.background.to_array().iter().all(|c| c.is_finite()) {
            return Err(FramecastError::validation("background must be finite"));
        }
        if let HeadroomSourceKind::Fixed(v) = self.headroom
            && !(v.is_finite() && v >= 1.0)
        {
            return Err(FramecastError::validation(
                "fixed headroom must be finite and >= 1.0",
            ));
        }
        if self.encode_channel_capacity == 0 {
            return Err(FramecastError::validation(
                "encode_channel_capacity must be > 0",
            ));
        }
        self.encoder.validate()
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
