use super::*;
use crate::encode::session::EncoderConfig;
use crate::foundation::core::Fps;

fn session_cfg(encoder: EncoderConfig) -> SessionConfig {
    SessionConfig {
        width: 4,
        height: 2,
        format: PixelFormat::Bgra8Unorm,
        fps: Fps::new(30000, 1001).unwrap(),
        encoder,
    }
}

#[test]
fn args_carry_codec_bitrate_and_rational_fps() {
    let opts = FfmpegEncoderOpts::new("out/clip.mp4");
    let args = ffmpeg_args(&opts, &session_cfg(EncoderConfig::default()));
    let joined = args.join(" ");
    assert!(joined.starts_with("-y "));
    assert!(joined.contains("-s 4x2 -r 30000/1001 -i pipe:0"));
    assert!(joined.contains("-c:v libx264 -b:v 8000k"));
    assert!(!joined.contains("-profile:v"));
    assert!(!joined.contains("-output_ts_offset"));
    assert_eq!(args.last().map(String::as_str), Some("out/clip.mp4"));
}

#[test]
fn args_for_hevc_with_profile_and_offset() {
    let mut opts = FfmpegEncoderOpts::new("clip.mp4");
    opts.overwrite = false;
    let args = ffmpeg_args(
        &opts,
        &session_cfg(EncoderConfig {
            codec: Codec::Hevc,
            bitrate_kbps: 2500,
            profile: Some("main10".to_string()),
            start_offset_secs: 1.5,
        }),
    );
    let joined = args.join(" ");
    assert!(joined.starts_with("-n "));
    assert!(joined.contains("-c:v libx265 -b:v 2500k -profile:v main10 -tag:v hvc1"));
    assert!(joined.contains("-output_ts_offset 1.5"));
}

#[test]
fn flatten_swizzles_bgra_and_fills_alpha_with_bg() {
    let src = FramePixels {
        width: 2,
        height: 1,
        format: PixelFormat::Bgra8Unorm,
        data: vec![3, 2, 1, 255, 0, 0, 0, 0],
    };
    let mut dst = vec![0u8; 8];
    flatten_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
    assert_eq!(dst, vec![1, 2, 3, 255, 10, 20, 30, 255]);
}

#[test]
fn flatten_clamps_extended_float_values() {
    let mut data = Vec::new();
    for v in [2.0f32, 0.5, 0.0, 1.0] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    let src = FramePixels {
        width: 1,
        height: 1,
        format: PixelFormat::Rgba32Float,
        data,
    };
    let mut dst = vec![0u8; 4];
    flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
    assert_eq!(dst, vec![255, 128, 0, 255]);
}

#[test]
fn flatten_rejects_mismatched_sizes() {
    let src = FramePixels::zeroed(2, 2, PixelFormat::Rgba8Unorm);
    let mut dst = vec![0u8; 4];
    assert!(flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).is_err());
}

#[test]
fn odd_dimensions_fail_to_start() {
    let mut enc = FfmpegEncoder::new(FfmpegEncoderOpts::new(
        std::env::temp_dir().join("framecast_odd.mp4"),
    ));
    let mut cfg = session_cfg(EncoderConfig::default());
    cfg.width = 3;
    let err = enc.start(&cfg).unwrap_err();
    assert!(matches!(err, FramecastError::EncoderStartFailed(_)));
}

#[test]
fn append_before_start_fails_and_finish_is_a_noop() {
    let mut enc = FfmpegEncoder::new(FfmpegEncoderOpts::new("unused.mp4"));
    let px = FramePixels::zeroed(4, 2, PixelFormat::Bgra8Unorm);
    let err = enc
        .append(&SessionSample {
            pts: std::time::Duration::ZERO,
            pixels: &px,
            source: crate::encode::session::SampleSource::Timed,
        })
        .unwrap_err();
    assert!(matches!(err, FramecastError::EncoderAppendFailed(_)));
    enc.finish().unwrap();
}

#[test]
fn encoder_listing_matches_whole_names() {
    let listing = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264 / AVC\n V....D libx264rgb           libx264 H.264 RGB\n A....D aac                  AAC\n";
    assert!(lists_encoder(listing, "libx264"));
    assert!(!lists_encoder(listing, "libx265"));
    assert!(!lists_encoder(listing, "H.264"));
}

#[test]
fn unsupported_profile_fails_to_start() {
    let mut enc = FfmpegEncoder::new(FfmpegEncoderOpts::new(
        std::env::temp_dir().join("framecast_bad_profile.mp4"),
    ));
    let err = enc
        .start(&session_cfg(EncoderConfig {
            profile: Some("bogus".to_string()),
            ..EncoderConfig::default()
        }))
        .unwrap_err();
    assert!(matches!(err, FramecastError::EncoderStartFailed(_)));
    assert!(err.to_string().contains("bogus"));
}
