use crate::error::VisionError;
use image::RgbaImage;
use quest_capture::{Frame, FrameSpace, Rect};

/// Copy `rect` out of the frame into a fresh buffer.
///
/// Never clamps: a rectangle that leaves the frame means the layout does not match
/// the resolution, and cropping silently would feed the wrong pixels downstream.
pub fn extract(frame: &Frame, rect: &Rect<FrameSpace>) -> Result<RgbaImage, VisionError> {
    if !rect.fits_within(frame.width(), frame.height()) {
        return Err(VisionError::OutOfBounds {
            rect: *rect,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }

    Ok(image::imageops::crop_imm(
        frame.image(),
        rect.x() as u32,
        rect.y() as u32,
        rect.width(),
        rect.height(),
    )
    .to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_capture::ScreenOffset;

    fn frame(w: u32, h: u32) -> Frame {
        let img = RgbaImage::from_fn(w, h, |x, y| image::Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255]));
        Frame::new(img, ScreenOffset::new(40, 30)).unwrap()
    }

    #[test]
    fn test_extract_copies_pixels() {
        let f = frame(300, 200);
        let roi = extract(&f, &Rect::new(100, 72, 50, 20).unwrap()).unwrap();
        assert_eq!(roi.dimensions(), (50, 20));
        assert_eq!(roi.get_pixel(0, 0).0, [100, 72, 0, 255]);
        assert_eq!(roi.get_pixel(49, 19).0, [149, 91, 0, 255]);
    }

    #[test]
    fn test_full_frame_is_allowed() {
        let f = frame(64, 32);
        assert!(extract(&f, &f.bounds()).is_ok());
    }

    #[test]
    fn test_roi_past_edge_is_out_of_bounds() {
        let f = frame(1366, 768);
        let err = extract(&f, &Rect::new(1300, 700, 200, 100).unwrap()).unwrap_err();
        match err {
            VisionError::OutOfBounds {
                frame_width,
                frame_height,
                ..
            } => assert_eq!((frame_width, frame_height), (1366, 768)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_origin_is_out_of_bounds() {
        let f = frame(100, 100);
        let err = extract(&f, &Rect::new(-1, 0, 10, 10).unwrap()).unwrap_err();
        assert!(matches!(err, VisionError::OutOfBounds { .. }));
    }
}
