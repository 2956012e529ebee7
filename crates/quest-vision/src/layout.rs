use crate::error::VisionError;
use quest_capture::{FrameSpace, Point, Rect};
use quest_data::{ConfigError, LayoutEntry, LayoutTable};

/// Frame-space rectangle of layout element `element`, relative to the anchor's top-left corner.
///
/// Bounds are not checked here; extraction rejects rectangles that leave the frame.
pub fn resolve(
    layout: &LayoutTable,
    element: &str,
    anchor_origin: Point<FrameSpace>,
) -> Result<Rect<FrameSpace>, VisionError> {
    let entry = layout.get(element)?;
    resolve_entry(element, entry, anchor_origin)
}

pub fn resolve_entry(
    element: &str,
    entry: &LayoutEntry,
    anchor_origin: Point<FrameSpace>,
) -> Result<Rect<FrameSpace>, VisionError> {
    let invalid = |reason: &str| {
        VisionError::Config(ConfigError::InvalidValue {
            key: format!("layout.{element}"),
            reason: reason.to_string(),
        })
    };

    let x = anchor_origin
        .x
        .checked_add(entry.offset_x)
        .ok_or_else(|| invalid("horizontal offset overflows"))?;
    let y = anchor_origin
        .y
        .checked_add(entry.offset_y)
        .ok_or_else(|| invalid("vertical offset overflows"))?;
    let width = u32::try_from(entry.width).map_err(|_| invalid("width is negative"))?;
    let height = u32::try_from(entry.height).map_err(|_| invalid("height is negative"))?;

    Rect::new(x, y, width, height).ok_or_else(|| invalid("zero-sized region"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LayoutTable {
        LayoutTable::from_pairs([
            ("tasktype_offsetX", "0"),
            ("tasktype_offsetY", "22"),
            ("tasktype_width", "200"),
            ("tasktype_height", "20"),
            ("taskdesc_offsetX", "-12"),
            ("taskdesc_offsetY", "44"),
            ("taskdesc_width", "230"),
            ("taskdesc_height", "80"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolves_relative_to_anchor() {
        let rect = resolve(&table(), "tasktype", Point::new(100, 50)).unwrap();
        assert_eq!(
            (rect.x(), rect.y(), rect.width(), rect.height()),
            (100, 72, 200, 20)
        );
    }

    #[test]
    fn test_negative_offsets_move_left() {
        let rect = resolve(&table(), "taskdesc", Point::new(100, 50)).unwrap();
        assert_eq!((rect.x(), rect.y()), (88, 94));
    }

    #[test]
    fn test_unknown_element_is_config_error() {
        let err = resolve(&table(), "reward", Point::new(0, 0)).unwrap_err();
        assert!(matches!(
            err,
            VisionError::Config(ConfigError::MissingKey(ref k)) if k.starts_with("layout.reward")
        ));
        assert!(err.is_fatal());
    }
}
