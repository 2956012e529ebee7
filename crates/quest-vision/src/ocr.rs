use crate::error::VisionError;
use image::{GrayImage, RgbaImage};
use quest_data::OcrSettings;
use std::process::Command;
use tracing::{debug, info, warn};

/// Parameters for a single recognition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest<'a> {
    pub language: &'a str,
    /// Tesseract page segmentation mode.
    pub psm: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The engine or its language data cannot be used at all.
    #[error("{0}")]
    EngineUnavailable(String),
    /// The engine ran but failed on this particular image.
    #[error("{0}")]
    Recognition(String),
}

impl From<OcrError> for VisionError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::EngineUnavailable(msg) => VisionError::EngineUnavailable(msg),
            OcrError::Recognition(msg) => VisionError::Recognition(msg),
        }
    }
}

/// Black-box text recognizer. Returns the recognized text, possibly empty.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &GrayImage, request: &OcrRequest<'_>) -> Result<String, OcrError>;
}

/// How a region is prepared and read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    pub language: String,
    pub psm: u8,
    pub preprocess: bool,
    pub scale_factor: u32,
}

impl OcrOptions {
    /// Single-line task type.
    pub fn task_type(settings: &OcrSettings) -> Self {
        Self::with_psm(settings, settings.task_type_psm)
    }

    /// Multi-line description block.
    pub fn description(settings: &OcrSettings) -> Self {
        Self::with_psm(settings, settings.description_psm)
    }

    fn with_psm(settings: &OcrSettings, psm: u8) -> Self {
        Self {
            language: settings.language.clone(),
            psm,
            preprocess: settings.preprocess,
            scale_factor: settings.effective_scale(),
        }
    }

    pub fn request(&self) -> OcrRequest<'_> {
        OcrRequest {
            language: &self.language,
            psm: self.psm,
        }
    }
}

/// Prepare `roi` according to `options` and run it through `engine`.
pub fn read_text(
    roi: &RgbaImage,
    engine: &dyn OcrEngine,
    options: &OcrOptions,
) -> Result<String, OcrError> {
    let prepared = prepare(roi, options);
    let text = engine.recognize(&prepared, &options.request())?;
    debug!("OCR (psm {}) read {:?}", options.psm, text);
    Ok(text)
}

/// The exact image handed to the engine.
pub fn prepare(roi: &RgbaImage, options: &OcrOptions) -> GrayImage {
    if options.preprocess {
        preprocess_for_ocr(roi, options.scale_factor)
    } else {
        image::imageops::grayscale(roi)
    }
}

/// Pre-process an RGBA region for OCR:
/// 1. Convert to grayscale
/// 2. Upscale by `scale` (clamped to 2..=4) with Lanczos resampling
/// 3. Otsu threshold, inverted so light UI text becomes black on white
pub fn preprocess_for_ocr(image: &RgbaImage, scale: u32) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let scale = scale.clamp(2, 4);
    let (w, h) = gray.dimensions();
    let upscaled = image::imageops::resize(
        &gray,
        w * scale,
        h * scale,
        image::imageops::FilterType::Lanczos3,
    );

    let level = otsu_level(&upscaled);
    let (w, h) = upscaled.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        if upscaled.get_pixel(x, y)[0] > level {
            image::Luma([0u8])
        } else {
            image::Luma([255u8])
        }
    })
}

/// Threshold that maximizes between-class variance of the histogram.
pub fn otsu_level(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in image.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }

    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut background = 0u64;
    let mut background_sum = 0.0;
    let mut best_level = 0u8;
    let mut best_variance = -1.0;

    for (level, &count) in histogram.iter().enumerate() {
        background += count;
        if background == 0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0 {
            break;
        }
        background_sum += level as f64 * count as f64;

        let mean_bg = background_sum / background as f64;
        let mean_fg = (weighted_total - background_sum) / foreground as f64;
        let variance = background as f64 * foreground as f64 * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }

    best_level
}

/// Tesseract driven through its command-line interface.
pub struct TesseractEngine {
    binary: String,
}

impl TesseractEngine {
    /// Verify the binary runs and every requested language pack is installed.
    pub fn init(language: &str) -> Result<Self, OcrError> {
        Self::with_binary("tesseract", language)
    }

    pub fn with_binary(binary: &str, language: &str) -> Result<Self, OcrError> {
        let version = Command::new(binary)
            .arg("--version")
            .output()
            .map_err(|e| {
                OcrError::EngineUnavailable(format!(
                    "cannot run {binary}: {e}. Install with: apt install tesseract-ocr tesseract-ocr-chi-sim"
                ))
            })?;
        if !version.status.success() {
            return Err(OcrError::EngineUnavailable(format!(
                "{binary} --version exited with {}",
                version.status
            )));
        }

        let listing = Command::new(binary)
            .arg("--list-langs")
            .output()
            .map_err(|e| OcrError::EngineUnavailable(format!("cannot list languages: {e}")))?;
        // Older releases print the list on stderr.
        let mut text = String::from_utf8_lossy(&listing.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&listing.stderr));
        let installed: Vec<&str> = text.lines().map(str::trim).collect();

        for lang in language.split('+').filter(|l| !l.is_empty()) {
            if !installed.contains(&lang) {
                return Err(OcrError::EngineUnavailable(format!(
                    "language data {lang:?} is not installed"
                )));
            }
        }

        let first_line = String::from_utf8_lossy(&version.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        info!("Tesseract ready ({}), language {}", first_line.trim(), language);
        Ok(Self {
            binary: binary.to_string(),
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &GrayImage, request: &OcrRequest<'_>) -> Result<String, OcrError> {
        let input = tempfile::Builder::new()
            .prefix("quest_ocr_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Recognition(format!("cannot create temp file: {e}")))?;
        image
            .save(input.path())
            .map_err(|e| OcrError::Recognition(format!("cannot write OCR input: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(request.language)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg(request.psm.to_string())
            .output()
            .map_err(|e| OcrError::EngineUnavailable(format!("cannot run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(run_failure(&output.status.to_string(), &stderr));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| OcrError::Recognition(format!("non UTF-8 output: {e}")))?;
        Ok(text.trim().to_string())
    }
}

/// Classify a failed Tesseract run by what it printed on stderr.
fn run_failure(status: &str, stderr: &str) -> OcrError {
    let stderr = stderr.trim();
    if stderr.contains("Failed loading language") {
        return OcrError::EngineUnavailable(stderr.to_string());
    }
    warn!("Tesseract exited with {}: {}", status, stderr);
    OcrError::Recognition(format!("tesseract exited with {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<(u32, u32, u8)>>,
    }

    impl OcrEngine for Recorder {
        fn recognize(&self, image: &GrayImage, request: &OcrRequest<'_>) -> Result<String, OcrError> {
            self.seen
                .lock()
                .unwrap()
                .push((image.width(), image.height(), request.psm));
            Ok("text".to_string())
        }
    }

    #[test]
    fn test_preprocess_inverts_light_text() {
        let img = RgbaImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                image::Rgba([220, 220, 220, 255])
            } else {
                image::Rgba([30, 30, 30, 255])
            }
        });
        let processed = preprocess_for_ocr(&img, 3);
        assert_eq!(processed.dimensions(), (30, 30));
        assert_eq!(processed.get_pixel(0, 0)[0], 0);
        assert_eq!(processed.get_pixel(29, 0)[0], 255);
    }

    #[test]
    fn test_scale_is_clamped() {
        let img = RgbaImage::new(4, 4);
        assert_eq!(preprocess_for_ocr(&img, 1).dimensions(), (8, 8));
        assert_eq!(preprocess_for_ocr(&img, 10).dimensions(), (16, 16));
    }

    #[test]
    fn test_otsu_splits_bimodal_histogram() {
        let img = GrayImage::from_fn(20, 1, |x, _| image::Luma([if x < 10 { 40 } else { 200 }]));
        let level = otsu_level(&img);
        assert!((40..200).contains(&level), "level {level}");
    }

    #[test]
    fn test_read_text_honours_options() {
        let engine = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        let settings = OcrSettings::default();
        let roi = RgbaImage::new(20, 10);

        read_text(&roi, &engine, &OcrOptions::task_type(&settings)).unwrap();
        let raw = OcrOptions {
            preprocess: false,
            ..OcrOptions::description(&settings)
        };
        read_text(&roi, &engine, &raw).unwrap();

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen[0], (60, 30, 7));
        assert_eq!(seen[1], (20, 10, 3));
    }

    #[test]
    fn test_missing_language_data_is_unavailable() {
        let stderr = "Error opening data file /usr/share/tessdata/chi_sim.traineddata\n\
                      Failed loading language 'chi_sim'\n\
                      Tesseract couldn't load any languages!\n";
        match run_failure("exit status: 1", stderr) {
            OcrError::EngineUnavailable(msg) => assert!(msg.contains("chi_sim")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_other_exit_is_recognition_error() {
        let err = run_failure("exit status: 1", "Error in pixReadStream: Unknown format");
        assert!(matches!(err, OcrError::Recognition(msg) if msg.contains("exit status: 1")));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let err = TesseractEngine::with_binary("definitely-not-tesseract-xyz", "chi_sim")
            .err()
            .unwrap();
        assert!(matches!(err, OcrError::EngineUnavailable(_)));
    }
}
