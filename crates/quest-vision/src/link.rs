use crate::blobs::{find_blobs, BoundingBox};
use crate::error::{Target, VisionError};
use image::RgbaImage;
use quest_capture::{Point, RoiSpace};
use quest_data::{LinkSettings, ShapeBand};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkTarget {
    pub underline: BoundingBox,
    /// ROI-local click point.
    pub click: Point<RoiSpace>,
}

/// Find the clickable link in a description ROI.
pub fn resolve_link_target(
    roi: &RgbaImage,
    settings: &LinkSettings,
) -> Result<LinkTarget, VisionError> {
    let blobs = find_blobs(roi, &settings.color, settings.min_area, &settings.morphology);
    select_link_target(&blobs, settings)
}

/// Pick the underline among already-extracted blobs and derive its click point.
pub fn select_link_target(
    blobs: &[BoundingBox],
    settings: &LinkSettings,
) -> Result<LinkTarget, VisionError> {
    let underline =
        select_underline(blobs, &settings.shape).ok_or(VisionError::NotFound(Target::Link))?;
    let click = click_point(&underline, settings.click_bias);
    debug!(
        "Link underline at ({}, {}) {}x{} of {} blob(s), click ({}, {})",
        underline.x,
        underline.y,
        underline.width,
        underline.height,
        blobs.len(),
        click.x,
        click.y
    );
    Ok(LinkTarget { underline, click })
}

pub fn fits_band(blob: &BoundingBox, band: &ShapeBand) -> bool {
    blob.height > 0
        && (band.min_width..=band.max_width).contains(&blob.width)
        && (band.min_height..=band.max_height).contains(&blob.height)
        && blob.aspect_ratio() >= band.min_aspect_ratio
}

/// The lowest underline-shaped blob; ties go to the leftmost, then to list order.
pub fn select_underline(blobs: &[BoundingBox], band: &ShapeBand) -> Option<BoundingBox> {
    let mut best: Option<BoundingBox> = None;
    for blob in blobs.iter().filter(|b| fits_band(b, band)) {
        let better = match best {
            None => true,
            Some(current) => {
                blob.bottom() > current.bottom()
                    || (blob.bottom() == current.bottom() && blob.x < current.x)
            }
        };
        if better {
            best = Some(*blob);
        }
    }
    best
}

/// Horizontal centre of the underline, `bias` pixels above its vertical centre, never above row 0.
pub fn click_point(underline: &BoundingBox, bias: u32) -> Point<RoiSpace> {
    let x = underline.x + underline.width / 2;
    let y = (underline.y + underline.height / 2).saturating_sub(bias);
    Point::new(x as i32, y as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_capture::{FrameSpace, Rect, ScreenOffset};

    fn blob(x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
            area: (width * height) as u64,
        }
    }

    #[test]
    fn test_lowest_underline_wins() {
        let blobs = [blob(10, 5, 40, 3), blob(15, 40, 150, 4)];
        let target = select_link_target(&blobs, &LinkSettings::default()).unwrap();
        assert_eq!(target.underline, blobs[1]);
        assert_eq!((target.click.x, target.click.y), (90, 34));
    }

    #[test]
    fn test_click_maps_to_screen() {
        let blobs = [blob(10, 5, 40, 3), blob(15, 40, 150, 4)];
        let target = select_link_target(&blobs, &LinkSettings::default()).unwrap();
        let roi: Rect<FrameSpace> = Rect::new(88, 94, 230, 80).unwrap();
        let screen = target.click.in_frame(&roi).to_screen(ScreenOffset::new(200, 100));
        assert_eq!((screen.x, screen.y), (88 + 90 + 200, 94 + 34 + 100));
    }

    #[test]
    fn test_no_candidate_is_not_found() {
        // Too tall, too short, too square.
        let blobs = [blob(0, 0, 50, 20), blob(0, 30, 10, 2), blob(0, 40, 24, 7)];
        let err = select_link_target(&blobs, &LinkSettings::default()).unwrap_err();
        assert!(matches!(err, VisionError::NotFound(Target::Link)));
        assert!(select_underline(&[], &ShapeBand::default()).is_none());
    }

    #[test]
    fn test_equal_bottom_prefers_leftmost() {
        let blobs = [blob(80, 20, 40, 3), blob(10, 19, 40, 4), blob(10, 20, 60, 3)];
        let best = select_underline(&blobs, &ShapeBand::default()).unwrap();
        assert_eq!(best, blobs[1]);
    }

    #[test]
    fn test_click_clamped_at_top_row() {
        let p = click_point(&blob(0, 1, 40, 2), 8);
        assert_eq!((p.x, p.y), (20, 0));
    }

    #[test]
    fn test_resolve_from_pixels() {
        let mut roi = RgbaImage::from_pixel(230, 80, image::Rgba([20, 20, 20, 255]));
        for &(bx, by, bw, bh) in &[(10u32, 5u32, 40u32, 3u32), (15, 40, 150, 4)] {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    roi.put_pixel(x, y, image::Rgba([0, 200, 0, 255]));
                }
            }
        }
        let target = resolve_link_target(&roi, &LinkSettings::default()).unwrap();
        assert_eq!((target.click.x, target.click.y), (90, 34));
    }
}
