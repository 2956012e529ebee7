use crate::error::{Target, VisionError};
use image::{GrayImage, RgbaImage};
use quest_capture::{Frame, FrameSpace, Rect};
use quest_data::ConfigError;
use std::path::Path;
use tracing::{debug, info};

/// Pre-processed landmark template for normalized cross-correlation.
pub struct AnchorTemplate {
    width: u32,
    height: u32,
    /// Template pixels with the mean subtracted, row-major.
    zero_mean: Vec<f64>,
    /// sqrt(sum(zero_mean^2))
    norm: f64,
}

/// The located landmark, used as the origin for every layout element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub rect: Rect<FrameSpace>,
    pub score: f64,
}

impl AnchorTemplate {
    /// Load the template image from disk. A missing or undecodable file is a configuration error.
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let img = image::open(path).map_err(|e| {
            VisionError::Config(ConfigError::InvalidValue {
                key: "anchor.template".to_string(),
                reason: format!("cannot load {}: {e}", path.display()),
            })
        })?;
        let template = Self::from_gray(&img.to_luma8())?;
        info!(
            "Anchor template {} loaded ({}x{})",
            path.display(),
            template.width,
            template.height
        );
        Ok(template)
    }

    pub fn from_rgba(image: &RgbaImage) -> Result<Self, VisionError> {
        Self::from_gray(&image::imageops::grayscale(image))
    }

    pub fn from_gray(gray: &GrayImage) -> Result<Self, VisionError> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidInput(format!(
                "anchor template is empty ({width}x{height})"
            )));
        }
        let n = (width * height) as f64;
        let mean = gray.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
        let zero_mean: Vec<f64> = gray.pixels().map(|p| p[0] as f64 - mean).collect();
        let norm = zero_mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        Ok(Self {
            width,
            height,
            zero_mean,
            norm,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Find the landmark in `frame`. Accepts the global best score iff `score >= threshold`.
///
/// Among equal best scores the first in row-major order (smallest y, then x) wins;
/// near-ties are not disambiguated.
pub fn locate(
    frame: &Frame,
    template: &AnchorTemplate,
    threshold: f64,
) -> Result<Anchor, VisionError> {
    let gray = image::imageops::grayscale(frame.image());
    let Some((x, y, score)) = best_match(&gray, template) else {
        debug!(
            "Anchor template {:?} does not fit in {}x{} frame",
            template.dimensions(),
            frame.width(),
            frame.height()
        );
        return Err(VisionError::NotFound(Target::Anchor));
    };

    debug!("Best anchor match at ({}, {}) score={:.4}", x, y, score);
    if score < threshold {
        debug!(
            "Anchor score {:.4} below threshold {:.2}",
            score, threshold
        );
        return Err(VisionError::NotFound(Target::Anchor));
    }

    let rect = Rect::new(x as i32, y as i32, template.width, template.height)
        .ok_or_else(|| VisionError::InvalidInput("anchor template is empty".to_string()))?;
    Ok(Anchor { rect, score })
}

/// Slide the template over `haystack` and return the best `(x, y, score)`.
///
/// `None` when the template is larger than the haystack.
pub fn best_match(haystack: &GrayImage, template: &AnchorTemplate) -> Option<(u32, u32, f64)> {
    let (w, h) = haystack.dimensions();
    let (tw, th) = (template.width, template.height);
    if tw > w || th > h {
        return None;
    }

    let sums = IntegralImages::new(haystack);
    let data = haystack.as_raw();
    let n = (tw * th) as f64;
    let stride = w as usize;

    let mut best = (0, 0, f64::NEG_INFINITY);
    for y in 0..=(h - th) {
        for x in 0..=(w - tw) {
            let (s1, s2) = sums.window(x, y, tw, th);
            let variance_sum = s2 - s1 * s1 / n;
            let denom = (variance_sum.max(0.0)).sqrt() * template.norm;

            // Uniform window or uniform template: correlation is undefined.
            let score = if denom < 1e-10 {
                0.0
            } else {
                let mut cross = 0.0;
                for j in 0..th as usize {
                    let row = (y as usize + j) * stride + x as usize;
                    let pixels = &data[row..row + tw as usize];
                    let tmpl = &template.zero_mean[j * tw as usize..(j + 1) * tw as usize];
                    cross += pixels
                        .iter()
                        .zip(tmpl)
                        .map(|(&p, &t)| p as f64 * t)
                        .sum::<f64>();
                }
                cross / denom
            };

            if score > best.2 {
                best = (x, y, score);
            }
        }
    }

    Some(best)
}

/// Summed-area tables of pixel values and squared pixel values.
struct IntegralImages {
    stride: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImages {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sum_sq = vec![0u64; stride * (h + 1)];
        let data = image.as_raw();

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = data[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sum_sq,
        }
    }

    /// Sum and sum of squares over a `w x h` window at `(x, y)`.
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        let at = |table: &[u64], x: usize, y: usize| table[y * self.stride + x];
        let area = |table: &[u64]| {
            (at(table, x1, y1) + at(table, x0, y0)) - (at(table, x1, y0) + at(table, x0, y1))
        };
        (area(&self.sum) as f64, area(&self.sum_sq) as f64)
    }
}
