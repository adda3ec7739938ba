use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use framecast::{
    Compositor, FfmpegEncoder, FfmpegEncoderOpts, FramePipeline, FrameRequest, HeadroomSourceKind,
    ImageProvider, PipelineConfig, PixelFormat, PulseField, Rect, Size, SwapSurface,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "framecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the frame loop headless for a number of frames.
    Run(RunArgs),
    /// Compose a single frame and write it as a PNG.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Pipeline config JSON. Defaults apply to anything it leaves out.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 90)]
    frames: u64,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Swap surface buffer count. Below `max_in_flight + 1` some ticks find no free buffer.
    #[arg(long, default_value_t = 4)]
    buffers: usize,

    /// Fixed display headroom, overriding the config's source.
    #[arg(long)]
    headroom: Option<f32>,

    /// Hand frames to the encoder without timestamps.
    #[arg(long, default_value_t = false)]
    bare_surface: bool,

    /// Encode to this MP4 path (requires `ffmpeg` on PATH).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the last presented frame to this PNG path.
    #[arg(long)]
    png: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Provider time in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, default_value_t = 1.0)]
    scale_factor: f32,

    #[arg(long, default_value_t = 1.0)]
    headroom: f32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,framecast=debug,wgpu=warn,naga=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        )
        .init();
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(h) = args.headroom {
        cfg.headroom = HeadroomSourceKind::Fixed(h);
        cfg.validate()?;
    }

    let mut surface = SwapSurface::new(args.width, args.height, cfg.pixel_format, args.buffers)?;
    if !args.bare_surface {
        surface = surface.with_frame_timing(cfg.fps);
    }
    let display = surface.clone();

    let mut pipeline = FramePipeline::new(
        cfg,
        Box::new(PulseField::default()),
        Box::new(surface),
    )?;
    if let Some(out) = &args.out {
        pipeline = pipeline.with_encoder(Box::new(FfmpegEncoder::new(FfmpegEncoderOpts::new(
            out.clone(),
        ))));
        if let Err(e) = pipeline.start_encoding(args.width, args.height) {
            tracing::warn!(error = %e, "encoding disabled for this run");
        }
    }

    let stop = AtomicBool::new(false);
    pipeline.run(Some(args.frames), &stop)?;
    let report = pipeline.close();

    if let Some(png) = &args.png {
        let front = display
            .front_buffer()
            .context("no frame was presented")?;
        save_png(png, &front.to_rgba8())?;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(out) = &args.out {
        if let Some(e) = &report.encode_start_error {
            anyhow::bail!("no video written to '{}': encoder did not start: {e}", out.display());
        }
        if let Some(e) = &report.encode_error {
            anyhow::bail!("video '{}' is incomplete: {e}", out.display());
        }
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let req = FrameRequest {
        time: args.time,
        scale_factor: args.scale_factor,
        headroom: args.headroom.max(1.0),
    };
    let image = PulseField::default().image(&req);
    let size = Size::new(f64::from(args.width), f64::from(args.height));
    let composed = Compositor::default().composite(&image, size);
    let pixels = composed.render(
        Rect::from_origin_size((0.0, 0.0), size),
        PixelFormat::Rgba8Unorm,
    )?;
    save_png(&args.out, &pixels.to_rgba8())
}

fn save_png(path: &std::path::Path, img: &image::RgbaImage) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}
