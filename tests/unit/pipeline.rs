use super::*;
use crate::encode::session::InMemoryEncoder;
use crate::foundation::core::{LinearRgba, PixelFormat};
use crate::raster::Image;
use crate::render::swap::SwapSurface;

fn pipeline() -> FramePipeline {
    let cfg = PipelineConfig {
        pixel_format: PixelFormat::Rgba8Unorm,
        headroom: crate::probe::HeadroomSourceKind::Standard,
        ..PipelineConfig::default()
    };
    let provider = |_: &FrameRequest| {
        Image::solid(LinearRgba::new(1.0, 0.0, 0.0, 1.0), Rect::new(0.0, 0.0, 2.0, 2.0))
    };
    let surface = SwapSurface::new(4, 4, PixelFormat::Rgba8Unorm, 3).unwrap();
    FramePipeline::new(cfg, Box::new(provider), Box::new(surface)).unwrap()
}

#[test]
fn sleep_until_past_deadline_returns_immediately() {
    let deadline = Instant::now();
    std::thread::sleep(Duration::from_millis(2));
    let start = Instant::now();
    sleep_until(deadline);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn sleep_until_reaches_deadline() {
    let deadline = Instant::now() + Duration::from_millis(3);
    sleep_until(deadline);
    assert!(Instant::now() >= deadline);
}

#[test]
fn no_tap_without_a_writing_encoder() {
    let p = pipeline();
    assert!(p.encode_tap(None).is_none());

    let p = pipeline().with_encoder(Box::new(InMemoryEncoder::new()));
    assert!(p.encode_tap(Some(Duration::ZERO)).is_none());
}

#[test]
fn tap_exists_once_encoding_started() {
    let mut p = pipeline().with_encoder(Box::new(InMemoryEncoder::new()));
    p.start_encoding(4, 4).unwrap();
    assert!(p.encode_tap(None).is_some());
}

#[test]
fn start_encoding_without_session_is_an_encode_path_error() {
    let mut p = pipeline();
    let err = p.start_encoding(4, 4).unwrap_err();
    assert_eq!(err.class(), ErrorClass::EncodePath);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let cfg = PipelineConfig {
        max_in_flight: 0,
        ..PipelineConfig::default()
    };
    let surface = SwapSurface::new(4, 4, PixelFormat::Rgba8Unorm, 3).unwrap();
    let provider = |_: &FrameRequest| Image::solid(LinearRgba::OPAQUE_BLACK, Rect::ZERO);
    assert!(FramePipeline::new(cfg, Box::new(provider), Box::new(surface)).is_err());
}
