use super::*;

fn cfg() -> SessionConfig {
    SessionConfig {
        width: 2,
        height: 1,
        format: PixelFormat::Rgba8Unorm,
        fps: Fps::default(),
        encoder: EncoderConfig::default(),
    }
}

#[test]
fn encoder_config_validation() {
    assert!(EncoderConfig::default().validate().is_ok());
    let bad = [
        EncoderConfig {
            bitrate_kbps: 0,
            ..EncoderConfig::default()
        },
        EncoderConfig {
            start_offset_secs: -1.0,
            ..EncoderConfig::default()
        },
        EncoderConfig {
            start_offset_secs: f64::NAN,
            ..EncoderConfig::default()
        },
        EncoderConfig {
            profile: Some("  ".to_string()),
            ..EncoderConfig::default()
        },
    ];
    for c in bad {
        assert!(c.validate().is_err(), "{c:?}");
    }
}

#[test]
fn encoder_config_parses_partial_json() {
    let c: EncoderConfig =
        serde_json::from_str(r#"{"codec":"hevc","start_offset_secs":0.5}"#).unwrap();
    assert_eq!(c.codec, Codec::Hevc);
    assert_eq!(c.bitrate_kbps, 8_000);
    assert_eq!(c.start_offset(), Duration::from_millis(500));
}

#[test]
fn in_memory_encoder_records_through_handle() {
    let mut enc = InMemoryEncoder::new();
    let rec = enc.recording();
    let px = FramePixels::zeroed(2, 1, PixelFormat::Rgba8Unorm);
    let sample = SessionSample {
        pts: Duration::from_millis(33),
        pixels: &px,
        source: SampleSource::Timed,
    };

    assert!(enc.append(&sample).is_err());
    enc.start(&cfg()).unwrap();
    enc.append(&sample).unwrap();
    enc.finish().unwrap();

    assert_eq!(rec.config(), Some(cfg()));
    assert_eq!(rec.sample_count(), 1);
    assert_eq!(rec.samples()[0].pts, Duration::from_millis(33));
    assert_eq!(rec.finish_calls(), 1);
}

#[test]
fn in_memory_encoder_rejects_wrong_size() {
    let mut enc = InMemoryEncoder::new();
    enc.start(&cfg()).unwrap();
    let px = FramePixels::zeroed(3, 1, PixelFormat::Rgba8Unorm);
    let err = enc
        .append(&SessionSample {
            pts: Duration::ZERO,
            pixels: &px,
            source: SampleSource::RawSurface,
        })
        .unwrap_err();
    assert!(matches!(err, FramecastError::EncoderAppendFailed(_)));
}

#[test]
fn profiles_are_checked_against_the_codec() {
    let with = |codec, profile: &str| EncoderConfig {
        codec,
        profile: Some(profile.to_string()),
        ..EncoderConfig::default()
    };
    assert!(with(Codec::H264, "high").validate().is_ok());
    assert!(with(Codec::Hevc, "main10").validate().is_ok());

    for bad in [
        with(Codec::H264, "bogus"),
        with(Codec::H264, "main10"),
        with(Codec::Hevc, "high"),
        with(Codec::Hevc, "MAIN"),
    ] {
        let err = bad.validate().unwrap_err();
        assert!(matches!(err, FramecastError::Validation(_)), "{bad:?}");
    }
}
