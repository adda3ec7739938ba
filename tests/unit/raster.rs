use super::*;

fn red() -> LinearRgba {
    LinearRgba::new(1.0, 0.0, 0.0, 1.0)
}

#[test]
fn raster_extent_follows_origin_and_size() {
    let img = Image::from_fn(Point::new(3.0, -2.0), 4, 5, |_, _| red());
    assert_eq!(img.extent(), Rect::new(3.0, -2.0, 7.0, 3.0));

    let moved = img.translated(Vec2::new(-3.0, 2.0));
    assert_eq!(moved.extent(), Rect::new(0.0, 0.0, 4.0, 5.0));
}

#[test]
fn over_extent_is_union() {
    let a = Image::solid(red(), Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = Image::solid(red(), Rect::new(-5.0, 5.0, 2.0, 20.0));
    assert_eq!(
        a.composited_over(&b).extent(),
        Rect::new(-5.0, 0.0, 10.0, 20.0)
    );
}

#[test]
fn sample_outside_extent_is_transparent() {
    let img = Image::from_fn(Point::ZERO, 2, 2, |_, _| red());
    assert_eq!(img.sample(Point::new(0.5, 0.5)), red());
    assert_eq!(img.sample(Point::new(2.5, 0.5)), LinearRgba::TRANSPARENT);
    assert_eq!(img.sample(Point::new(-0.5, 0.5)), LinearRgba::TRANSPARENT);
}

#[test]
fn render_translated_raster_lands_at_shift() {
    let img = Image::from_fn(Point::ZERO, 1, 1, |_, _| red()).translated(Vec2::new(2.0, 1.0));
    let bg = Image::solid(LinearRgba::OPAQUE_BLACK, Rect::new(0.0, 0.0, 4.0, 3.0));
    let out = img
        .composited_over(&bg)
        .render(Rect::new(0.0, 0.0, 4.0, 3.0), PixelFormat::Rgba8Unorm)
        .unwrap();

    assert_eq!((out.width, out.height), (4, 3));
    assert_eq!(out.pixel(2, 1), Some(LinearRgba::new(1.0, 0.0, 0.0, 1.0)));
    assert_eq!(out.pixel(0, 0), Some(LinearRgba::OPAQUE_BLACK));
    assert_eq!(out.pixel(3, 2), Some(LinearRgba::OPAQUE_BLACK));
}

#[test]
fn render_bgra_swaps_channels() {
    let img = Image::solid(red(), Rect::new(0.0, 0.0, 1.0, 1.0));
    let out = img
        .render(Rect::new(0.0, 0.0, 1.0, 1.0), PixelFormat::Bgra8Unorm)
        .unwrap();
    assert_eq!(out.data, vec![0, 0, 255, 255]);
    assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [255, 0, 0, 255]);
}

#[test]
fn float_format_keeps_extended_values() {
    let bright = LinearRgba::new(3.5, 1.0, 0.25, 1.0);
    let img = Image::solid(bright, Rect::new(0.0, 0.0, 2.0, 2.0));

    let hdr = img
        .render(Rect::new(0.0, 0.0, 2.0, 2.0), PixelFormat::Rgba32Float)
        .unwrap();
    assert_eq!(hdr.data.len(), 2 * 2 * 16);
    assert_eq!(hdr.pixel(1, 1), Some(bright));

    let sdr = img
        .render(Rect::new(0.0, 0.0, 2.0, 2.0), PixelFormat::Rgba8Unorm)
        .unwrap();
    assert_eq!(sdr.data[0], 255);
}

#[test]
fn render_rejects_empty_and_non_finite_regions() {
    let img = Image::solid(red(), Rect::new(0.0, 0.0, 1.0, 1.0));
    assert!(
        img.render(Rect::new(0.0, 0.0, 0.0, 4.0), PixelFormat::Rgba8Unorm)
            .is_err()
    );
    assert!(
        img.render(Rect::new(0.0, 0.0, f64::NAN, 4.0), PixelFormat::Rgba8Unorm)
            .is_err()
    );
}

#[test]
fn blit_clips_to_destination() {
    let mut dst = FramePixels::zeroed(3, 3, PixelFormat::Rgba8Unorm);
    let src = FramePixels {
        width: 2,
        height: 2,
        format: PixelFormat::Rgba8Unorm,
        data: vec![9u8; 16],
    };
    dst.blit(&src, 2, -1).unwrap();
    assert_eq!(dst.pixel(2, 0).unwrap().r, 9.0 / 255.0);
    assert_eq!(dst.pixel(1, 0).unwrap().r, 0.0);
    assert_eq!(dst.pixel(2, 1).unwrap().r, 0.0);

    let wrong = FramePixels::zeroed(1, 1, PixelFormat::Rgba32Float);
    assert!(dst.blit(&wrong, 0, 0).is_err());
}

#[test]
fn blit_at_extreme_offsets_writes_nothing() {
    let mut dst = FramePixels::zeroed(3, 3, PixelFormat::Rgba8Unorm);
    let src = FramePixels {
        width: 2,
        height: 2,
        format: PixelFormat::Rgba8Unorm,
        data: vec![9u8; 16],
    };
    for (x, y) in [(i64::MAX, 0), (0, i64::MAX), (i64::MIN, 0), (0, i64::MIN)] {
        dst.blit(&src, x, y).unwrap();
    }
    assert!(dst.data.iter().all(|b| *b == 0));
}
