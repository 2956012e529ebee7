pub mod analyzer;
pub mod anchor;
pub mod blobs;
pub mod classify;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod layout;
pub mod link;
pub mod ocr;
pub mod region;

pub use analyzer::{AnalysisResult, CycleError, QuestAnalyzer, Stage};
pub use anchor::{locate, Anchor, AnchorTemplate};
pub use blobs::{find_blobs, scan_blobs, BlobScan, BoundingBox};
pub use classify::{classify, extract_required_item, normalize, ClassificationResult};
pub use context::VisionContext;
pub use diagnostics::Diagnostics;
pub use error::{Target, VisionError};
pub use link::{resolve_link_target, select_link_target, LinkTarget};
pub use ocr::{preprocess_for_ocr, OcrEngine, OcrError, OcrOptions, OcrRequest, TesseractEngine};
pub use region::extract;
