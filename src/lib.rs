//! framecast renders a procedurally generated image to a display surface at a fixed rate, adapts
//! output to the display's dynamic-range headroom, and streams every rendered frame into a video
//! encoder on the side.
//!
//! - Build a [`FramePipeline`] from a [`PipelineConfig`], an [`ImageProvider`] and a
//!   [`SurfaceProvider`]
//! - Optionally attach an [`EncoderSession`] and start encoding
//! - Drive it with [`FramePipeline::tick`] or [`FramePipeline::run`], then [`FramePipeline::close`]
#![forbid(unsafe_code)]

mod foundation;

/// Display centering and background flattening.
pub mod compositor;
/// Pipeline and encoder configuration.
pub mod config;
/// Encoder sessions and the encode bridge.
pub mod encode;
/// The tick loop.
pub mod pipeline;
/// Dynamic-range headroom sources.
pub mod probe;
/// Image provider contract and demo content.
pub mod provider;
/// Lazy images and rendered pixel buffers.
pub mod raster;
/// Submission, command buffers, queues and surfaces.
pub mod render;
/// In-flight frame gating.
pub mod sync;

pub use crate::foundation::core::{
    FrameIndex, Fps, LinearRgba, PixelFormat, Point, Rect, Size, Vec2,
};
pub use crate::foundation::error::{ErrorClass, FramecastError, FramecastResult};

pub use crate::compositor::{Compositor, centering_shift};
pub use crate::config::PipelineConfig;
pub use crate::encode::bridge::{
    BridgeState, EncodeBridge, EncodeFrame, EncodeInput, EncodeStatsSnapshot,
};
pub use crate::encode::ffmpeg::{FfmpegEncoder, FfmpegEncoderOpts};
pub use crate::encode::session::{
    Codec, EncoderConfig, EncoderSession, InMemoryEncoder, RecordingHandle, SampleSource,
    SessionConfig, SessionSample,
};
pub use crate::pipeline::{FramePipeline, PipelineReport, PipelineStatsSnapshot, TickOutcome};
pub use crate::probe::{DynamicRangeProbe, DynamicRangeSource, HeadroomSourceKind};
pub use crate::provider::{FrameRequest, ImageProvider, PulseField};
pub use crate::raster::{FramePixels, Image};
pub use crate::render::command::{
    CommandBuffer, CommandQueue, CompletionStatus, SerialQueue,
};
pub use crate::render::submit::RenderSubmitter;
pub use crate::render::surface::{
    Presentable, RenderDestination, SurfaceFrame, SurfaceProvider, Texture, TextureProvider,
};
pub use crate::render::swap::SwapSurface;
pub use crate::sync::slots::FrameSlotLimiter;
