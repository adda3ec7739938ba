use super::*;
use crate::foundation::core::LinearRgba;
use std::time::Duration;

#[test]
fn rejects_degenerate_configs() {
    assert!(SwapSurface::new(0, 4, PixelFormat::Rgba8Unorm, 3).is_err());
    assert!(SwapSurface::new(4, 4, PixelFormat::Rgba8Unorm, 1).is_err());
}

#[test]
fn runs_out_of_buffers_until_present() {
    let mut s = SwapSurface::new(2, 2, PixelFormat::Rgba8Unorm, 2).unwrap();
    let a = s.next_frame().unwrap();
    let b = s.next_frame().unwrap();
    assert!(s.next_frame().is_none());
    assert_eq!(s.reserved_count(), 2);

    a.drawable.present();
    // `a` is now on screen, so only `b`'s buffer could be reused and it is still reserved.
    assert!(s.next_frame().is_none());

    b.drawable.present();
    assert_eq!(s.presented_count(), 2);
    assert!(s.next_frame().is_some());
}

#[test]
fn dropping_an_unpresented_frame_frees_its_buffer() {
    let mut s = SwapSurface::new(2, 2, PixelFormat::Rgba8Unorm, 2).unwrap();
    let a = s.next_frame().unwrap();
    drop(a);
    assert_eq!(s.reserved_count(), 0);
    assert_eq!(s.presented_count(), 0);
}

#[test]
fn texture_writes_reach_the_front_buffer() {
    let mut s = SwapSurface::new(2, 1, PixelFormat::Rgba8Unorm, 3).unwrap();
    let frame = s.next_frame().unwrap();
    assert_eq!(s.texture_fetches(), 0);

    let mut tex = frame.destination.texture.acquire().unwrap();
    assert_eq!(s.texture_fetches(), 1);
    let px = crate::raster::Image::solid(
        LinearRgba::new(0.0, 1.0, 0.0, 1.0),
        crate::foundation::core::Rect::new(0.0, 0.0, 2.0, 1.0),
    )
    .render(
        crate::foundation::core::Rect::new(0.0, 0.0, 2.0, 1.0),
        PixelFormat::Rgba8Unorm,
    )
    .unwrap();
    tex.write(&px, 0, 0).unwrap();
    assert!(s.front_buffer().is_none());

    frame.drawable.present();
    let front = s.front_buffer().unwrap();
    assert_eq!(front.data, vec![0, 255, 0, 255, 0, 255, 0, 255]);
}

#[test]
fn timing_stamps_frames_in_order() {
    let mut s = SwapSurface::new(2, 2, PixelFormat::Rgba8Unorm, 4)
        .unwrap()
        .with_frame_timing(Fps::new(10, 1).unwrap());
    let f0 = s.next_frame().unwrap();
    let f1 = s.next_frame().unwrap();
    assert_eq!(f0.timestamp, Some(Duration::ZERO));
    assert_eq!(f1.timestamp, Some(Duration::from_secs_f64(0.1)));

    let mut bare = SwapSurface::new(2, 2, PixelFormat::Rgba8Unorm, 2).unwrap();
    assert_eq!(bare.next_frame().unwrap().timestamp, None);
}
