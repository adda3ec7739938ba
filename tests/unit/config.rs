use super::*;
use crate::encode::session::Codec;

#[test]
fn defaults_validate() {
    let cfg = PipelineConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.max_in_flight, 3);
    assert_eq!(cfg.fps, Fps::new(30, 1).unwrap());
    assert_eq!(cfg.drain_timeout(), Duration::from_secs(2));
}

#[test]
fn partial_json_fills_defaults() {
    let cfg = PipelineConfig::from_json_str(
        r#"{
            "max_in_flight": 2,
            "fps": { "num": 60000, "den": 1001 },
            "pixel_format": "rgba32_float",
            "headroom": { "kind": "fixed", "value": 4.0 },
            "encoder": { "codec": "hevc", "start_offset_secs": 1.0 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.max_in_flight, 2);
    assert_eq!(cfg.pixel_format, PixelFormat::Rgba32Float);
    assert_eq!(cfg.headroom, HeadroomSourceKind::Fixed(4.0));
    assert_eq!(cfg.encoder.codec, Codec::Hevc);
    assert_eq!(cfg.encoder.bitrate_kbps, 8_000);
    assert_eq!(cfg.scale_factor, 1.0);
}

#[test]
fn rejects_bad_values() {
    let cases = [
        r#"{"max_in_flight": 0}"#,
        r#"{"fps": {"num": 30, "den": 0}}"#,
        r#"{"scale_factor": -1.0}"#,
        r#"{"headroom": {"kind": "fixed", "value": 0.5}}"#,
        r#"{"encode_channel_capacity": 0}"#,
        r#"{"encoder": {"start_offset_secs": -2.0}}"#,
        r#"{"unknown_knob": true}"#,
        "not json",
    ];
    for json in cases {
        let err = PipelineConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, FramecastError::Validation(_)), "{json}: {err}");
    }
}

#[test]
fn from_path_reports_missing_file() {
    let err = PipelineConfig::from_path("/definitely/not/here/framecast.json").unwrap_err();
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn round_trips_through_json() {
    let cfg = PipelineConfig::default();
    let text = serde_json::to_string(&cfg).unwrap();
    assert_eq!(PipelineConfig::from_json_str(&text).unwrap(), cfg);
}
