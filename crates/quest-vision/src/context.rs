use crate::anchor::AnchorTemplate;
use crate::error::VisionError;
use crate::ocr::{OcrEngine, TesseractEngine};
use quest_data::QuestConfig;
use tracing::info;

/// Everything a perception cycle needs, constructed once by the caller and passed by reference.
pub struct VisionContext {
    config: QuestConfig,
    template: AnchorTemplate,
    engine: Box<dyn OcrEngine>,
}

impl VisionContext {
    /// Load the anchor template and bring up Tesseract for the configured language.
    pub fn init(config: QuestConfig) -> Result<Self, VisionError> {
        let template = AnchorTemplate::load(&config.anchor.template)?;
        let engine = TesseractEngine::init(&config.ocr.language)?;
        info!("Vision context ready");
        Ok(Self::with_engine(config, template, Box::new(engine)))
    }

    pub fn with_engine(
        config: QuestConfig,
        template: AnchorTemplate,
        engine: Box<dyn OcrEngine>,
    ) -> Self {
        Self {
            config,
            template,
            engine,
        }
    }

    pub fn config(&self) -> &QuestConfig {
        &self.config
    }

    pub fn template(&self) -> &AnchorTemplate {
        &self.template
    }

    pub fn engine(&self) -> &dyn OcrEngine {
        self.engine.as_ref()
    }

    /// End the context's lifecycle; the engine and template are released here.
    pub fn shutdown(self) {
        info!("Vision context shut down");
    }
}
