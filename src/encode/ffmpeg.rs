use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::encode::session::{Codec, EncoderSession, SessionConfig, SessionSample};
use crate::foundation::core::PixelFormat;
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::foundation::math::{mul_div255_u16, unorm8};
use crate::raster::FramePixels;

/// Longest run of repeated frames written to cover a timestamp gap.
const MAX_GAP_FILL_FRAMES: u64 = 600;

/// Options for [`FfmpegEncoder`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegEncoderOpts {
    /// Output MP4 file path.
    pub out_path: PathBuf,
    /// Overwrite output file if it already exists.
    pub overwrite: bool,
    /// Background used to flatten alpha (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
}

impl FfmpegEncoderOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

/// Encoder session that spawns the system `ffmpeg` and streams raw RGBA8 frames to stdin.
///
/// ffmpeg sees a constant-rate stream, so sample timestamps are mapped onto frame slots: a gap
/// repeats the previous frame and a sample landing on an already-written slot is skipped.
pub struct FfmpegEncoder {
    opts: FfmpegEncoderOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SessionConfig>,
    written: u64,
}

impl FfmpegEncoder {
    pub fn new(opts: FfmpegEncoderOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            written: 0,
        }
    }

    fn write_scratch(&mut self) -> FramecastResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FramecastError::encoder_append(
                "ffmpeg encoder is already finalized",
            ));
        };
        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            FramecastError::encoder_append(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.written += 1;
        Ok(())
    }
}

impl EncoderSession for FfmpegEncoder {
    fn start(&mut self, cfg: &SessionConfig) -> FramecastResult<()> {
        if self.child.is_some() {
            return Err(FramecastError::encoder_start("ffmpeg encoder already started"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(FramecastError::encoder_start(
                "ffmpeg encoder width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(FramecastError::encoder_start(
                "ffmpeg encoder width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        cfg.encoder
            .validate()
            .map_err(|e| FramecastError::encoder_start(e.to_string()))?;

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(FramecastError::encoder_start(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(FramecastError::encoder_start(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }
        let encoder = encoder_name(cfg.encoder.codec);
        if !ffmpeg_has_encoder(encoder) {
            return Err(FramecastError::encoder_start(format!(
                "this ffmpeg build has no '{encoder}' encoder"
            )));
        }
        if cfg.format.is_extended_range() {
            tracing::info!("extended-range frames are clamped to 8-bit for ffmpeg output");
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(ffmpeg_args(&self.opts, cfg));
        tracing::debug!(cmd = ?cmd, "spawning ffmpeg");

        let mut child = cmd.spawn().map_err(|e| {
            FramecastError::encoder_start(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FramecastError::encoder_start("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| FramecastError::encoder_start("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.scratch = vec![0u8; PixelFormat::Rgba8Unorm.buffer_len(cfg.width, cfg.height)];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg.clone());
        self.written = 0;
        Ok(())
    }

    fn append(&mut self, sample: &SessionSample<'_>) -> FramecastResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| FramecastError::encoder_append("ffmpeg encoder not started"))?;
        let px = sample.pixels;
        if px.width != cfg.width || px.height != cfg.height {
            return Err(FramecastError::encoder_append(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                px.width, px.height, cfg.width, cfg.height
            )));
        }

        let slot = (sample.pts.as_secs_f64() * cfg.fps.as_f64()).round() as u64;
        if slot < self.written {
            tracing::trace!(slot, written = self.written, "sample lands on a written slot");
            return Ok(());
        }

        let gap = slot - self.written;
        if gap > MAX_GAP_FILL_FRAMES {
            tracing::warn!(gap, "timestamp gap exceeds fill limit, timeline will be compressed");
        }
        let gap = gap.min(MAX_GAP_FILL_FRAMES);

        // Gaps repeat the previous frame; before the first frame they repeat this one.
        if self.written == 0 {
            flatten_to_opaque_rgba8(&mut self.scratch, px, self.opts.bg_rgba)?;
            for _ in 0..gap {
                self.write_scratch()?;
            }
        } else {
            for _ in 0..gap {
                self.write_scratch()?;
            }
            flatten_to_opaque_rgba8(&mut self.scratch, px, self.opts.bg_rgba)?;
        }
        self.write_scratch()
    }

    fn finish(&mut self) -> FramecastResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().map_err(|e| {
            FramecastError::encoder_append(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| FramecastError::encoder_append("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| {
                    FramecastError::encoder_append(format!("ffmpeg stderr read failed: {e}"))
                })?,
            None => Vec::new(),
        };

        self.cfg = None;
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(FramecastError::encoder_append(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        tracing::info!(frames = self.written, out = %self.opts.out_path.display(), "ffmpeg finished");
        Ok(())
    }
}

/// Command-line arguments for one session, excluding the program name.
pub fn ffmpeg_args(opts: &FfmpegEncoderOpts, cfg: &SessionConfig) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    args.push(if opts.overwrite { "-y" } else { "-n" }.to_string());

    // Input: straight RGBA8 after flattening; rawvideo takes `-r` before `-i`.
    args.extend(
        [
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
        ]
        .map(String::from),
    );
    args.push(format!("{}x{}", cfg.width, cfg.height));
    args.push("-r".to_string());
    args.push(format!("{}/{}", cfg.fps.num, cfg.fps.den));
    args.extend(["-i", "pipe:0", "-an", "-c:v"].map(String::from));

    let enc = &cfg.encoder;
    args.push(encoder_name(enc.codec).to_string());
    args.push("-b:v".to_string());
    args.push(format!("{}k", enc.bitrate_kbps));
    if let Some(profile) = &enc.profile {
        args.push("-profile:v".to_string());
        args.push(profile.clone());
    }
    if enc.codec == Codec::Hevc {
        args.extend(["-tag:v", "hvc1"].map(String::from));
    }
    args.extend(["-pix_fmt", "yuv420p"].map(String::from));
    if enc.start_offset_secs > 0.0 {
        args.push("-output_ts_offset".to_string());
        args.push(format!("{}", enc.start_offset_secs));
    }
    args.extend(["-movflags", "+faststart"].map(String::from));
    args.push(opts.out_path.to_string_lossy().into_owned());
    args
}

fn encoder_name(codec: Codec) -> &'static str {
    match codec {
        Codec::H264 => "libx264",
        Codec::Hevc => "libx265",
    }
}

/// Whether `ffmpeg -encoders` lists `name`.
fn ffmpeg_has_encoder(name: &str) -> bool {
    std::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .is_ok_and(|out| {
            out.status.success() && lists_encoder(&String::from_utf8_lossy(&out.stdout), name)
        })
}

/// Encoder rows look like ` V....D libx264   libx264 H.264 / AVC ...`.
fn lists_encoder(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

/// Convert any supported frame into opaque straight RGBA8 over `bg_rgba`.
fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &FramePixels,
    bg_rgba: [u8; 4],
) -> FramecastResult<()> {
    let bpp = src.format.bytes_per_pixel();
    if dst.len() / 4 != src.data.len() / bpp {
        return Err(FramecastError::encoder_append(
            "frame data size does not match encoder scratch buffer",
        ));
    }

    let bg = [
        u16::from(bg_rgba[0]),
        u16::from(bg_rgba[1]),
        u16::from(bg_rgba[2]),
    ];
    for (d, s) in dst.chunks_exact_mut(4).zip(src.data.chunks_exact(bpp)) {
        let premul: [u8; 4] = match src.format {
            PixelFormat::Rgba8Unorm => [s[0], s[1], s[2], s[3]],
            PixelFormat::Bgra8Unorm => [s[2], s[1], s[0], s[3]],
            PixelFormat::Rgba32Float => {
                let mut c = [0u8; 4];
                for (v, b) in c.iter_mut().zip(s.chunks_exact(4)) {
                    *v = unorm8(f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
                }
                c
            }
        };

        let a = u16::from(premul[3]);
        if a == 255 {
            d.copy_from_slice(&premul);
            continue;
        }
        let inv = 255u16 - a;
        for ((dc, sc), bc) in d.iter_mut().zip(premul).zip(bg) {
            *dc = (u16::from(sc) + mul_div255_u16(bc, inv)).min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> FramecastResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
