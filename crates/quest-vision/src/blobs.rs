use image::{GrayImage, Luma, RgbaImage};
use quest_capture::{Rect, RoiSpace};
use quest_data::{ColorBounds, ColorSpace, Kernel, MaskCleanup};
use serde::Serialize;

const ON: u8 = 255;

/// Axis-aligned bounding box of one external connected component, ROI-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Number of mask pixels in the component.
    pub area: u64,
}

impl BoundingBox {
    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn rect(&self) -> Option<Rect<RoiSpace>> {
        Rect::new(self.x as i32, self.y as i32, self.width, self.height)
    }
}

/// The binary mask and the blobs found in it.
pub struct BlobScan {
    pub mask: GrayImage,
    pub blobs: Vec<BoundingBox>,
}

/// Bounding boxes of the external blobs in `color` range, sorted by `(y, x)`.
pub fn find_blobs(
    roi: &RgbaImage,
    color: &ColorBounds,
    min_area: u64,
    cleanup: &MaskCleanup,
) -> Vec<BoundingBox> {
    scan_blobs(roi, color, min_area, cleanup).blobs
}

pub fn scan_blobs(
    roi: &RgbaImage,
    color: &ColorBounds,
    min_area: u64,
    cleanup: &MaskCleanup,
) -> BlobScan {
    let mut mask = color_mask(roi, color);
    if let Some(kernel) = cleanup.open {
        mask = dilate(&erode(&mask, kernel), kernel);
    }
    if let Some(kernel) = cleanup.dilate {
        mask = dilate(&mask, kernel);
    }

    let mut blobs: Vec<BoundingBox> = external_components(&mask)
        .into_iter()
        .filter(|b| b.area >= min_area)
        .collect();
    blobs.sort_by_key(|b| (b.y, b.x));
    BlobScan { mask, blobs }
}

/// 255 where the pixel lies inside `bounds` on all three channels, 0 elsewhere.
pub fn color_mask(roi: &RgbaImage, bounds: &ColorBounds) -> GrayImage {
    let (w, h) = roi.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b, _] = roi.get_pixel(x, y).0;
        let channels = match bounds.space {
            ColorSpace::Rgb => [r, g, b],
            ColorSpace::Bgr => [b, g, r],
            ColorSpace::Hsv => rgb_to_hsv(r, g, b),
        };
        let inside = (0..3).all(|i| bounds.lower[i] <= channels[i] && channels[i] <= bounds.upper[i]);
        Luma([if inside { ON } else { 0 }])
    })
}

/// 8-bit HSV with hue halved into 0..180; hues that round up to 180 wrap to 0.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let s = if max == 0.0 { 0.0 } else { diff / max * 255.0 };
    let mut hue = if diff == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / diff
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    [
        ((hue / 2.0).round() as u32 % 180) as u8,
        s.round() as u8,
        max as u8,
    ]
}

/// Grayscale erosion with a rectangular kernel anchored at its centre.
/// Pixels outside the image do not erode.
pub fn erode(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    morph(mask, kernel, true)
}

/// Grayscale dilation with a rectangular kernel anchored at its centre.
pub fn dilate(mask: &GrayImage, kernel: Kernel) -> GrayImage {
    morph(mask, kernel, false)
}

fn morph(mask: &GrayImage, kernel: Kernel, erode: bool) -> GrayImage {
    let (w, h) = mask.dimensions();
    let (ax, ay) = ((kernel.width / 2) as i64, (kernel.height / 2) as i64);
    GrayImage::from_fn(w, h, |x, y| {
        let mut acc = if erode { u8::MAX } else { 0 };
        for ky in 0..kernel.height as i64 {
            let sy = y as i64 + ky - ay;
            if sy < 0 || sy >= h as i64 {
                continue;
            }
            for kx in 0..kernel.width as i64 {
                let sx = x as i64 + kx - ax;
                if sx < 0 || sx >= w as i64 {
                    continue;
                }
                let v = mask.get_pixel(sx as u32, sy as u32)[0];
                acc = if erode { acc.min(v) } else { acc.max(v) };
            }
        }
        Luma([acc])
    })
}

/// 8-connected foreground components that are not enclosed in a hole of another component.
///
/// Background is 4-connected; a component is external when it touches the image border
/// or borders background reachable from the border.
pub fn external_components(mask: &GrayImage) -> Vec<BoundingBox> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let data = mask.as_raw();
    let on = |i: usize| data[i] != 0;

    let outside = outer_background(mask);
    let mut labelled = vec![false; w * h];
    let mut stack = Vec::new();
    let mut boxes = Vec::new();

    for start in 0..w * h {
        if !on(start) || labelled[start] {
            continue;
        }
        labelled[start] = true;
        stack.push(start);

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
        let mut area = 0u64;
        let mut external = false;

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            area += 1;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                external = true;
            }

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if on(n) {
                        if !labelled[n] {
                            labelled[n] = true;
                            stack.push(n);
                        }
                    } else if (dx == 0 || dy == 0) && outside[n] {
                        external = true;
                    }
                }
            }
        }

        if external {
            boxes.push(BoundingBox {
                x: min_x as u32,
                y: min_y as u32,
                width: (max_x - min_x + 1) as u32,
                height: (max_y - min_y + 1) as u32,
                area,
            });
        }
    }

    boxes
}

/// Background pixels 4-connected to the image border.
fn outer_background(mask: &GrayImage) -> Vec<bool> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    let data = mask.as_raw();
    let mut outside = vec![false; w * h];
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let border = x == 0 || y == 0 || x + 1 == w || y + 1 == h;
            let i = y * w + x;
            if border && data[i] == 0 && !outside[i] {
                outside[i] = true;
                stack.push(i);
            }
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = (i % w, i / w);
        let neighbours = [
            (x > 0).then(|| i - 1),
            (x + 1 < w).then(|| i + 1),
            (y > 0).then(|| i - w),
            (y + 1 < h).then(|| i + w),
        ];
        for n in neighbours.into_iter().flatten() {
            if data[n] == 0 && !outside[n] {
                outside[n] = true;
                stack.push(n);
            }
        }
    }

    outside
}
