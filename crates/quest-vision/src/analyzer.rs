use crate::anchor::locate;
use crate::blobs::scan_blobs;
use crate::classify::{classify, extract_required_item};
use crate::context::VisionContext;
use crate::diagnostics::Diagnostics;
use crate::error::VisionError;
use crate::layout::resolve;
use crate::link::select_link_target;
use crate::ocr::{prepare, read_text, OcrOptions};
use crate::region::extract;
use quest_capture::{Frame, FrameSpace, Point, Rect, ScreenSpace};
use quest_data::{TASK_DESC_ELEMENT, TASK_TYPE_ELEMENT};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// State of the per-cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    AnchorSearch,
    LayoutResolve,
    ExtractTaskType,
    Classify,
    ExtractDescription,
    ReadDescription,
    ColorScan,
    LinkResolve,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AnchorSearch => "anchor search",
            Stage::LayoutResolve => "layout resolve",
            Stage::ExtractTaskType => "extract(task type)",
            Stage::Classify => "classify",
            Stage::ExtractDescription => "extract(description)",
            Stage::ReadDescription => "read description",
            Stage::ColorScan => "color scan",
            Stage::LinkResolve => "link resolve",
        };
        f.write_str(name)
    }
}

/// A cycle that ended early, tagged with the state it failed in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct CycleError {
    pub stage: Stage,
    #[source]
    pub source: VisionError,
}

impl CycleError {
    pub fn is_fatal(&self) -> bool {
        self.source.is_fatal()
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, CycleError>;
}

impl<T, E: Into<VisionError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, CycleError> {
        self.map_err(|e| CycleError {
            stage,
            source: e.into(),
        })
    }
}

/// Output of one successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub cycle: u64,
    pub anchor: Rect<FrameSpace>,
    pub anchor_score: f64,
    pub task_category: Option<String>,
    /// Description text when the category asks for it, otherwise the task-type text.
    pub extracted_text: String,
    /// Frame-relative description ROI.
    pub content_roi: Rect<FrameSpace>,
    /// Screen-absolute click point on the task link.
    pub click_target: Option<Point<ScreenSpace>>,
    pub required_item: Option<String>,
}

/// Runs the perception state machine over captured frames.
pub struct QuestAnalyzer<'a> {
    ctx: &'a VisionContext,
    diagnostics: Option<Diagnostics>,
    task_type_ocr: OcrOptions,
    description_ocr: OcrOptions,
}

impl<'a> QuestAnalyzer<'a> {
    pub fn new(ctx: &'a VisionContext) -> Self {
        let config = ctx.config();
        let diagnostics = config
            .debug
            .save_images
            .then(|| Diagnostics::new(&config.debug.dir));
        Self {
            ctx,
            diagnostics,
            task_type_ocr: OcrOptions::task_type(&config.ocr),
            description_ocr: OcrOptions::description(&config.ocr),
        }
    }

    /// One synchronous pass: anchor, layout, task type, then the description branch if the
    /// category needs it. Screen translation happens once, on the click point.
    pub fn analyze(&self, frame: &Frame, cycle: u64) -> Result<AnalysisResult, CycleError> {
        let started = Instant::now();
        let config = self.ctx.config();

        let anchor = locate(frame, self.ctx.template(), config.anchor.threshold)
            .at(Stage::AnchorSearch)?;
        debug!("Cycle {}: anchor {} score {:.3}", cycle, anchor.rect, anchor.score);

        let anchor_origin = anchor.rect.origin();
        let type_roi =
            resolve(&config.layout, TASK_TYPE_ELEMENT, anchor_origin).at(Stage::LayoutResolve)?;
        let desc_roi =
            resolve(&config.layout, TASK_DESC_ELEMENT, anchor_origin).at(Stage::LayoutResolve)?;
        debug!("Cycle {}: task type ROI {}, description ROI {}", cycle, type_roi, desc_roi);

        let type_img = extract(frame, &type_roi).at(Stage::ExtractTaskType)?;
        if let Some(d) = &self.diagnostics {
            d.save_rgba(cycle, "task_type", &type_img);
            d.save_gray(cycle, "task_type_ocr", &prepare(&type_img, &self.task_type_ocr));
        }

        let classification = classify(
            &type_img,
            &config.keywords,
            self.ctx.engine(),
            &self.task_type_ocr,
            &config.ocr.tag_decorations,
        )
        .at(Stage::Classify)?;

        let mut result = AnalysisResult {
            cycle,
            anchor: anchor.rect,
            anchor_score: anchor.score,
            task_category: classification.matched_category.clone(),
            extracted_text: classification.raw_text.clone(),
            content_roi: desc_roi,
            click_target: None,
            required_item: None,
        };

        let Some(category) = classification.matched_category.as_deref() else {
            info!("Cycle {}: task type {:?} not classified", cycle, classification.raw_text);
            return Ok(result);
        };

        let wants_description = config.needs_description(category);
        let wants_link = config.needs_link(category);
        if !wants_description && !wants_link {
            info!("Cycle {}: {} ({:.0?})", cycle, category, started.elapsed());
            return Ok(result);
        }

        let desc_img = extract(frame, &desc_roi).at(Stage::ExtractDescription)?;
        if let Some(d) = &self.diagnostics {
            d.save_rgba(cycle, "description", &desc_img);
        }

        if wants_description {
            let text = read_text(&desc_img, self.ctx.engine(), &self.description_ocr)
                .at(Stage::ReadDescription)?;
            result.required_item =
                extract_required_item(&text, &config.items, &config.ocr.tag_decorations);
            result.extracted_text = text;
        }

        let item_missing = wants_description && result.required_item.is_none();
        if wants_link && item_missing {
            info!(
                "Cycle {}: no required item recognised in {:?}, not following the link",
                cycle, result.extracted_text
            );
        }

        if wants_link && !item_missing {
            let link = &config.link;
            let scan = scan_blobs(&desc_img, &link.color, link.min_area, &link.morphology);
            debug!("Cycle {}: {} colour blob(s) in description", cycle, scan.blobs.len());

            let target = match select_link_target(&scan.blobs, link) {
                Ok(target) => Some(target),
                Err(e) if e.is_not_found() => None,
                Err(source) => {
                    return Err(CycleError {
                        stage: Stage::LinkResolve,
                        source,
                    })
                }
            };
            if let Some(d) = &self.diagnostics {
                d.save_gray(cycle, "link_mask", &scan.mask);
                d.save_link_overlay(
                    cycle,
                    &desc_img,
                    &scan.blobs,
                    target.as_ref().map(|t| &t.underline),
                    target.map(|t| t.click),
                );
            }

            result.click_target = target.map(|t| {
                t.click
                    .in_frame(&desc_roi)
                    .to_screen(frame.screen_origin())
            });
            if result.click_target.is_none() {
                info!("Cycle {}: no link underline in description", cycle);
            }
        }

        info!(
            "Cycle {}: {} click={:?} item={:?} ({:.0?})",
            cycle,
            category,
            result.click_target.map(|p| (p.x, p.y)),
            result.required_item,
            started.elapsed()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorTemplate;
    use crate::error::Target;
    use crate::ocr::{OcrEngine, OcrError, OcrRequest};
    use image::{GrayImage, Rgba, RgbaImage};
    use quest_capture::ScreenOffset;
    use quest_data::QuestConfig;
    use std::path::Path;
    use std::sync::Mutex;

    const CONFIG: &str = r#"{
        "anchor": { "template": "unused.png", "threshold": 0.9 },
        "layout": {
            "tasktype_offsetX": 0, "tasktype_offsetY": 22, "tasktype_width": 200, "tasktype_height": 20,
            "taskdesc_offsetX": 0, "taskdesc_offsetY": 44, "taskdesc_width": 230, "taskdesc_height": 80
        },
        "keywords": { "见多识广": ["见多识广"], "急人所急": ["急人所急"], "除暴安良": ["除暴安良"] },
        "items": { "金疮药": ["金疮"] }
    }"#;

    /// Replays canned answers by page segmentation mode.
    struct ScriptedEngine {
        task_type: String,
        description: String,
        calls: Mutex<Vec<u8>>,
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, _: &GrayImage, request: &OcrRequest<'_>) -> Result<String, OcrError> {
            self.calls.lock().unwrap().push(request.psm);
            Ok(if request.psm == 7 {
                self.task_type.clone()
            } else {
                self.description.clone()
            })
        }
    }

    fn patch() -> GrayImage {
        GrayImage::from_fn(30, 12, |x, y| image::Luma([((x * 37 + y * 91) % 251) as u8]))
    }

    fn context(task_type: &str, description: &str) -> VisionContext {
        let config = QuestConfig::from_json_str(CONFIG, Path::new(".")).unwrap();
        let template = AnchorTemplate::from_gray(&patch()).unwrap();
        let engine = ScriptedEngine {
            task_type: task_type.to_string(),
            description: description.to_string(),
            calls: Mutex::new(Vec::new()),
        };
        VisionContext::with_engine(config, template, Box::new(engine))
    }

    /// 400x200 frame with the anchor at (100, 50) and green underlines in the description ROI.
    fn frame(with_anchor: bool, origin: ScreenOffset) -> Frame {
        let mut img = RgbaImage::from_pixel(400, 200, Rgba([40, 40, 40, 255]));
        if with_anchor {
            for (x, y, p) in patch().enumerate_pixels() {
                img.put_pixel(100 + x, 50 + y, Rgba([p[0], p[0], p[0], 255]));
            }
        }
        // Description ROI starts at (100, 94).
        for &(bx, by, bw, bh) in &[(10u32, 5u32, 40u32, 3u32), (15, 40, 150, 4)] {
            for y in by..by + bh {
                for x in bx..bx + bw {
                    img.put_pixel(100 + x, 94 + y, Rgba([0, 200, 0, 255]));
                }
            }
        }
        Frame::new(img, origin).unwrap()
    }

    #[test]
    fn test_link_task_yields_screen_click() {
        let ctx = context("[江湖历练任务]见多识广", "");
        let analyzer = QuestAnalyzer::new(&ctx);
        let result = analyzer
            .analyze(&frame(true, ScreenOffset::new(1000, 300)), 1)
            .unwrap();

        assert_eq!((result.anchor.x(), result.anchor.y()), (100, 50));
        assert_eq!(result.task_category.as_deref(), Some("见多识广"));
        assert_eq!(
            (result.content_roi.x(), result.content_roi.y()),
            (100, 94)
        );
        let click = result.click_target.unwrap();
        assert_eq!((click.x, click.y), (1000 + 100 + 90, 300 + 94 + 34));
        assert_eq!(result.required_item, None);
    }

    #[test]
    fn test_description_task_reads_item() {
        let ctx = context("急人所急的任务", "快去找到一个金疮药，并交给他");
        let result = QuestAnalyzer::new(&ctx)
            .analyze(&frame(true, ScreenOffset::default()), 2)
            .unwrap();
        assert_eq!(result.task_category.as_deref(), Some("急人所急"));
        assert_eq!(result.extracted_text, "快去找到一个金疮药，并交给他");
        assert_eq!(result.required_item.as_deref(), Some("金疮药"));
        assert!(result.click_target.is_some());
    }

    #[test]
    fn test_description_task_without_item_does_not_click() {
        let ctx = context("急人所急的任务", "去城里逛逛");
        let result = QuestAnalyzer::new(&ctx)
            .analyze(&frame(true, ScreenOffset::default()), 8)
            .unwrap();
        assert_eq!(result.task_category.as_deref(), Some("急人所急"));
        assert_eq!(result.extracted_text, "去城里逛逛");
        assert_eq!(result.required_item, None);
        assert_eq!(result.click_target, None);
    }

    #[test]
    fn test_plain_category_skips_description() {
        let ctx = context("除暴安良", "should not be read");
        let result = QuestAnalyzer::new(&ctx)
            .analyze(&frame(true, ScreenOffset::default()), 3)
            .unwrap();
        assert_eq!(result.task_category.as_deref(), Some("除暴安良"));
        assert_eq!(result.extracted_text, "除暴安良");
        assert_eq!(result.click_target, None);
    }

    #[test]
    fn test_unclassified_ends_cycle_without_click() {
        let ctx = context("", "");
        let result = QuestAnalyzer::new(&ctx)
            .analyze(&frame(true, ScreenOffset::default()), 4)
            .unwrap();
        assert_eq!(result.task_category, None);
        assert_eq!(result.click_target, None);
    }

    #[test]
    fn test_missing_anchor_fails_at_anchor_search() {
        let ctx = context("见多识广", "");
        let err = QuestAnalyzer::new(&ctx)
            .analyze(&frame(false, ScreenOffset::default()), 5)
            .unwrap_err();
        assert_eq!(err.stage, Stage::AnchorSearch);
        assert!(matches!(err.source, VisionError::NotFound(Target::Anchor)));
        assert!(err.is_not_found());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_roi_outside_frame_fails_at_extract() {
        let ctx = context("见多识广", "");
        let mut img = RgbaImage::from_pixel(200, 80, Rgba([40, 40, 40, 255]));
        for (x, y, p) in patch().enumerate_pixels() {
            img.put_pixel(100 + x, 50 + y, Rgba([p[0], p[0], p[0], 255]));
        }
        let frame = Frame::new(img, ScreenOffset::default()).unwrap();
        let err = QuestAnalyzer::new(&ctx).analyze(&frame, 6).unwrap_err();
        assert_eq!(err.stage, Stage::ExtractTaskType);
        assert!(matches!(err.source, VisionError::OutOfBounds { .. }));
    }

    #[test]
    fn test_link_absent_is_success_without_click() {
        let ctx = context("见多识广", "");
        let mut img = RgbaImage::from_pixel(400, 200, Rgba([40, 40, 40, 255]));
        for (x, y, p) in patch().enumerate_pixels() {
            img.put_pixel(100 + x, 50 + y, Rgba([p[0], p[0], p[0], 255]));
        }
        let frame = Frame::new(img, ScreenOffset::default()).unwrap();
        let result = QuestAnalyzer::new(&ctx).analyze(&frame, 7).unwrap();
        assert_eq!(result.task_category.as_deref(), Some("见多识广"));
        assert_eq!(result.click_target, None);
    }
}
