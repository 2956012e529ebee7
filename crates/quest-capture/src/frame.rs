use crate::geometry::{FrameSpace, Rect, ScreenOffset};
use crate::CaptureError;
use image::RgbaImage;

/// One immutable screen capture in RGBA channel order.
///
/// Analysis coordinates are always relative to the top-left pixel; `screen_origin`
/// records where that pixel sat on the physical screen.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
    screen_origin: ScreenOffset,
    bounds: Rect<FrameSpace>,
}

impl Frame {
    pub fn new(image: RgbaImage, screen_origin: ScreenOffset) -> Result<Self, CaptureError> {
        let bounds = Rect::new(0, 0, image.width(), image.height()).ok_or_else(|| {
            CaptureError::InvalidGeometry(format!(
                "captured frame is empty ({}x{})",
                image.width(),
                image.height()
            ))
        })?;
        Ok(Self {
            image,
            screen_origin,
            bounds,
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn screen_origin(&self) -> ScreenOffset {
        self.screen_origin
    }

    /// The whole frame as a frame-relative rectangle.
    pub fn bounds(&self) -> Rect<FrameSpace> {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_rejected() {
        let err = Frame::new(RgbaImage::new(0, 10), ScreenOffset::default()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidGeometry(_)));
    }

    #[test]
    fn test_bounds_cover_image() {
        let frame = Frame::new(RgbaImage::new(1366, 768), ScreenOffset::new(4, 30)).unwrap();
        let bounds = frame.bounds();
        assert_eq!((bounds.x(), bounds.y()), (0, 0));
        assert_eq!((bounds.width(), bounds.height()), (1366, 768));
        assert_eq!(frame.screen_origin(), ScreenOffset::new(4, 30));
    }
}
