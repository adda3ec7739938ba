use crate::foundation::core::{LinearRgba, Rect, Size, Vec2};
use crate::raster::Image;

/// Places provider output centered on an opaque canvas the size of the destination.
#[derive(Clone, Copy, Debug)]
pub struct Compositor {
    background: LinearRgba,
}

impl Compositor {
    /// `background` is forced opaque: presented surfaces may ignore alpha.
    pub fn new(background: LinearRgba) -> Self {
        Self {
            background: LinearRgba {
                a: 1.0,
                ..background
            },
        }
    }

    pub fn background(&self) -> LinearRgba {
        self.background
    }

    /// Center `image` in `(0,0)..destination` and flatten it over the background.
    ///
    /// The image is not cropped here; anything outside the destination is cut by the render
    /// bounds later.
    pub fn composite(&self, image: &Image, destination: Size) -> Image {
        let bounds = Rect::from_origin_size((0.0, 0.0), destination);
        let shift = centering_shift(image.extent(), destination);
        let background = Image::solid(self.background, bounds);
        image.translated(shift).composited_over(&background)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(LinearRgba::OPAQUE_BLACK)
    }
}

/// Whole-pixel translation that moves the center of `extent` onto the center of
/// `(0,0)..destination`.
///
/// Rounding keeps sampling on pixel boundaries so the result never blurs.
pub fn centering_shift(extent: Rect, destination: Size) -> Vec2 {
    Vec2::new(
        ((destination.width - extent.width()) * 0.5 - extent.x0).round(),
        ((destination.height - extent.height()) * 0.5 - extent.y0).round(),
    )
}

#[cfg(test)]
#[path = "../tests/unit/compositor.rs"]
mod tests;
