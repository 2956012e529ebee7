use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Coordinates relative to the captured frame's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameSpace;

/// Coordinates relative to the top-left corner of a region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoiSpace;

/// Coordinates relative to the physical screen's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenSpace;

/// Screen position of a captured frame's top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScreenOffset {
    pub x: i32,
    pub y: i32,
}

impl ScreenOffset {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Integer pixel rectangle tagged with the coordinate space it is expressed in.
///
/// Width and height are always non-zero; `Rect::new` is the only constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect<S> {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    space: PhantomData<S>,
}

impl<S> Rect<S> {
    /// Returns `None` for a zero-sized rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
            space: PhantomData,
        })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Point<S> {
        Point::new(self.x, self.y)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// True when the rectangle lies entirely inside a `width x height` surface at the origin.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && self.right() <= width as i64 && self.bottom() <= height as i64
    }

    fn translate<T>(&self, dx: i32, dy: i32) -> Rect<T> {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width,
            height: self.height,
            space: PhantomData,
        }
    }
}

impl Rect<FrameSpace> {
    pub fn to_screen(&self, offset: ScreenOffset) -> Rect<ScreenSpace> {
        self.translate(offset.x, offset.y)
    }
}

impl Rect<RoiSpace> {
    /// Re-express a rectangle found inside `roi` in the frame's coordinates.
    pub fn in_frame(&self, roi: &Rect<FrameSpace>) -> Rect<FrameSpace> {
        self.translate(roi.x, roi.y)
    }
}

impl<S> fmt::Display for Rect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

impl<S> Serialize for Rect<S> {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Rect", 4)?;
        s.serialize_field("x", &self.x)?;
        s.serialize_field("y", &self.y)?;
        s.serialize_field("width", &self.width)?;
        s.serialize_field("height", &self.height)?;
        s.end()
    }
}

/// Integer pixel point tagged with its coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point<S> {
    pub x: i32,
    pub y: i32,
    space: PhantomData<S>,
}

impl<S> Point<S> {
    pub const fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }
}

impl Point<RoiSpace> {
    pub fn in_frame(&self, roi: &Rect<FrameSpace>) -> Point<FrameSpace> {
        Point::new(self.x + roi.x, self.y + roi.y)
    }
}

impl Point<FrameSpace> {
    pub fn to_screen(&self, offset: ScreenOffset) -> Point<ScreenSpace> {
        Point::new(self.x + offset.x, self.y + offset.y)
    }
}

impl<S> fmt::Display for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl<S> Serialize for Point<S> {
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        (self.x, self.y).serialize(serializer)
    }
}

/// Screen-absolute capture rectangle, as accepted by a [`crate::FrameSource`].
pub type ScreenRect = Rect<ScreenSpace>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_rect_rejected() {
        assert!(Rect::<FrameSpace>::new(0, 0, 0, 10).is_none());
        assert!(Rect::<FrameSpace>::new(0, 0, 10, 0).is_none());
        assert!(Rect::<FrameSpace>::new(-5, -5, 1, 1).is_some());
    }

    #[test]
    fn test_fits_within() {
        let inside = Rect::<FrameSpace>::new(1166, 668, 200, 100).unwrap();
        assert!(inside.fits_within(1366, 768));
        let outside = Rect::<FrameSpace>::new(1300, 700, 200, 100).unwrap();
        assert!(!outside.fits_within(1366, 768));
        let negative = Rect::<FrameSpace>::new(-1, 0, 10, 10).unwrap();
        assert!(!negative.fits_within(1366, 768));
    }

    #[test]
    fn test_roi_point_to_screen() {
        let roi = Rect::<FrameSpace>::new(100, 72, 200, 80).unwrap();
        let click = Point::<RoiSpace>::new(90, 34);
        let screen = click.in_frame(&roi).to_screen(ScreenOffset::new(8, 31));
        assert_eq!((screen.x, screen.y), (198, 137));
    }

    #[test]
    fn test_frame_rect_to_screen_keeps_size() {
        let rect = Rect::<FrameSpace>::new(10, 20, 30, 40).unwrap();
        let screen = rect.to_screen(ScreenOffset::new(-10, 5));
        assert_eq!((screen.x(), screen.y()), (0, 25));
        assert_eq!((screen.width(), screen.height()), (30, 40));
    }
}
