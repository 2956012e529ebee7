use crate::blobs::BoundingBox;
use image::{GrayImage, Rgba, RgbaImage};
use quest_capture::{Point, RoiSpace};
use std::path::{Path, PathBuf};
use tracing::warn;

const CANDIDATE: Rgba<u8> = Rgba([255, 200, 0, 255]);
const SELECTED: Rgba<u8> = Rgba([255, 0, 255, 255]);
const CLICK: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Writes intermediate images for offline inspection. Failures are logged, never returned.
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Cannot create debug directory {}: {}", dir.display(), e);
        }
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_rgba(&self, cycle: u64, name: &str, image: &RgbaImage) {
        let path = self.path_for(cycle, name);
        if let Err(e) = image.save(&path) {
            warn!("Failed to save {}: {}", path.display(), e);
        }
    }

    pub fn save_gray(&self, cycle: u64, name: &str, image: &GrayImage) {
        let path = self.path_for(cycle, name);
        if let Err(e) = image.save(&path) {
            warn!("Failed to save {}: {}", path.display(), e);
        }
    }

    /// Description ROI with every blob outlined, the chosen underline highlighted and the click marked.
    pub fn save_link_overlay(
        &self,
        cycle: u64,
        roi: &RgbaImage,
        blobs: &[BoundingBox],
        selected: Option<&BoundingBox>,
        click: Option<Point<RoiSpace>>,
    ) {
        self.save_rgba(cycle, "link_overlay", &annotate(roi, blobs, selected, click));
    }

    fn path_for(&self, cycle: u64, name: &str) -> PathBuf {
        self.dir.join(format!("cycle_{cycle:05}_{name}.png"))
    }
}

pub fn annotate(
    roi: &RgbaImage,
    blobs: &[BoundingBox],
    selected: Option<&BoundingBox>,
    click: Option<Point<RoiSpace>>,
) -> RgbaImage {
    let mut out = roi.clone();
    for blob in blobs {
        outline(&mut out, blob, CANDIDATE);
    }
    if let Some(blob) = selected {
        outline(&mut out, blob, SELECTED);
    }
    if let Some(p) = click {
        for d in -3i64..=3 {
            put(&mut out, p.x as i64 + d, p.y as i64, CLICK);
            put(&mut out, p.x as i64, p.y as i64 + d, CLICK);
        }
    }
    out
}

fn outline(image: &mut RgbaImage, blob: &BoundingBox, color: Rgba<u8>) {
    let (x0, y0) = (blob.x as i64 - 1, blob.y as i64 - 1);
    let (x1, y1) = (blob.x as i64 + blob.width as i64, blob.y as i64 + blob.height as i64);
    for x in x0..=x1 {
        put(image, x, y0, color);
        put(image, x, y1, color);
    }
    for y in y0..=y1 {
        put(image, x0, y, color);
        put(image, x1, y, color);
    }
}

fn put(image: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
        image.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_marks_selection_and_click() {
        let roi = RgbaImage::from_pixel(100, 40, Rgba([0, 0, 0, 255]));
        let blob = BoundingBox {
            x: 10,
            y: 20,
            width: 50,
            height: 3,
            area: 150,
        };
        let out = annotate(&roi, &[blob], Some(&blob), Some(Point::new(35, 13)));
        assert_eq!(*out.get_pixel(9, 19), SELECTED);
        assert_eq!(*out.get_pixel(60, 23), SELECTED);
        assert_eq!(*out.get_pixel(35, 13), CLICK);
        assert_eq!(*out.get_pixel(30, 30), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_saves_named_by_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = Diagnostics::new(&dir.path().join("debug"));
        diagnostics.save_gray(7, "mask", &GrayImage::new(4, 4));
        assert!(dir.path().join("debug/cycle_00007_mask.png").exists());
    }

    #[test]
    fn test_unwritable_dir_does_not_panic() {
        let diagnostics = Diagnostics::new(Path::new("/proc/quest-debug-forbidden"));
        diagnostics.save_gray(1, "mask", &GrayImage::new(2, 2));
    }
}
