use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::foundation::error::{FramecastError, FramecastResult};

/// Headroom meaning "standard range only".
pub const NEUTRAL_HEADROOM: f32 = 1.0;

/// Environment variable read by [`EnvHeadroom::from_default_var`].
pub const HEADROOM_ENV_VAR: &str = "FRAMECAST_HEADROOM";

/// Source of the display's current extended-range headroom.
///
/// Implementations must answer from a cheap local read; the probe calls this once per frame.
pub trait DynamicRangeSource: Send + Sync {
    fn headroom(&self) -> FramecastResult<f32>;
}

/// A display without extended range.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardRange;

impl DynamicRangeSource for StandardRange {
    fn headroom(&self) -> FramecastResult<f32> {
        Ok(NEUTRAL_HEADROOM)
    }
}

/// A constant headroom, for headless runs and tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedHeadroom(pub f32);

impl DynamicRangeSource for FixedHeadroom {
    fn headroom(&self) -> FramecastResult<f32> {
        Ok(self.0)
    }
}

/// Headroom published by a host (for example from a display-change callback).
///
/// Clones share the same value. Until [`SharedHeadroom::set`] is called the source reports
/// itself unavailable.
#[derive(Clone, Debug)]
pub struct SharedHeadroom {
    bits: Arc<AtomicU32>,
}

const UNAVAILABLE_BITS: u32 = u32::MAX;

impl SharedHeadroom {
    pub fn unavailable() -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(UNAVAILABLE_BITS)),
        }
    }

    pub fn new(headroom: f32) -> Self {
        let s = Self::unavailable();
        s.set(headroom);
        s
    }

    pub fn set(&self, headroom: f32) {
        self.bits.store(headroom.to_bits(), Ordering::Release);
    }

    pub fn clear(&self) {
        self.bits.store(UNAVAILABLE_BITS, Ordering::Release);
    }
}

impl DynamicRangeSource for SharedHeadroom {
    fn headroom(&self) -> FramecastResult<f32> {
        match self.bits.load(Ordering::Acquire) {
            UNAVAILABLE_BITS => Err(FramecastError::headroom("no headroom published yet")),
            bits => Ok(f32::from_bits(bits)),
        }
    }
}

/// Reads headroom from an environment variable on every call.
#[derive(Clone, Debug)]
pub struct EnvHeadroom {
    var: String,
}

impl EnvHeadroom {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn from_default_var() -> Self {
        Self::new(HEADROOM_ENV_VAR)
    }
}

impl DynamicRangeSource for EnvHeadroom {
    fn headroom(&self) -> FramecastResult<f32> {
        let raw = std::env::var(&self.var)
            .map_err(|e| FramecastError::headroom(format!("{}: {e}", self.var)))?;
        raw.trim()
            .parse::<f32>()
            .map_err(|e| FramecastError::headroom(format!("{}='{raw}': {e}", self.var)))
    }
}

/// Which [`DynamicRangeSource`] to build from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HeadroomSourceKind {
    /// Always standard range.
    Standard,
    /// A fixed headroom value.
    Fixed(f32),
    /// Read [`HEADROOM_ENV_VAR`] each frame.
    #[default]
    Env,
}

impl HeadroomSourceKind {
    pub fn build(self) -> Box<dyn DynamicRangeSource> {
        match self {
            Self::Standard => Box::new(StandardRange),
            Self::Fixed(v) => Box::new(FixedHeadroom(v)),
            Self::Env => Box::new(EnvHeadroom::from_default_var()),
        }
    }
}

/// Per-frame headroom reader with a neutral fallback.
///
/// Never caches: every call goes back to the source, since brightness or display changes can move
/// the value between frames.
pub struct DynamicRangeProbe {
    source: Box<dyn DynamicRangeSource>,
    fallbacks: AtomicU64,
}

impl DynamicRangeProbe {
    pub fn new(source: Box<dyn DynamicRangeSource>) -> Self {
        Self {
            source,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Current headroom, or exactly [`NEUTRAL_HEADROOM`] when the source fails or reports a
    /// value that is not a finite number `>= 1.0`.
    pub fn current_headroom(&self) -> f32 {
        match self.source.headroom() {
            Ok(v) if v.is_finite() && v >= NEUTRAL_HEADROOM => v,
            Ok(v) => {
                tracing::debug!(value = v, "headroom out of range, using neutral");
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                NEUTRAL_HEADROOM
            }
            Err(e) => {
                tracing::debug!(error = %e, "headroom unavailable, using neutral");
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                NEUTRAL_HEADROOM
            }
        }
    }

    /// Number of frames that fell back to the neutral value.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

impl Default for DynamicRangeProbe {
    fn default() -> Self {
        Self::new(HeadroomSourceKind::default().build())
    }
}

#[cfg(test)]
#[path = "../tests/unit/probe.rs"]
mod tests;
