//! CLI tool to run a saved screenshot through the quest perception pipeline.
//! Usage: cargo run -p quest-vision --features cli --bin analyze_frame -- <config.json> <screenshot.png> [output_dir]

use anyhow::{Context, Result};
use quest_capture::{Frame, ScreenOffset};
use quest_data::{QuestConfig, TASK_DESC_ELEMENT, TASK_TYPE_ELEMENT};
use quest_vision::{
    find_blobs, layout, locate, AnchorTemplate, QuestAnalyzer, TesseractEngine, VisionContext,
};
use std::path::PathBuf;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <config.json> <screenshot.png> [output_dir]", args[0]);
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);
    let input_path = PathBuf::from(&args[2]);
    let output_dir = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./debug_output"));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut config = QuestConfig::load(&config_path).context("Failed to load config")?;
    config.debug.save_images = true;
    config.debug.dir = output_dir.clone();

    println!("Loading image: {}", input_path.display());
    let img = image::open(&input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?
        .to_rgba8();
    println!("Image size: {}x{}", img.width(), img.height());
    let frame = Frame::new(img, ScreenOffset::default())?;

    println!("\n=== Anchor ===");
    let template = AnchorTemplate::load(&config.anchor.template)?;
    let anchor = match locate(&frame, &template, config.anchor.threshold) {
        Ok(anchor) => anchor,
        Err(e) => {
            println!("Anchor: {e}");
            return Ok(());
        }
    };
    println!("Anchor: {} score={:.4}", anchor.rect, anchor.score);

    println!("\n=== Regions ===");
    for element in [TASK_TYPE_ELEMENT, TASK_DESC_ELEMENT] {
        let rect = layout::resolve(&config.layout, element, anchor.rect.origin())?;
        match quest_vision::extract(&frame, &rect) {
            Ok(crop) => {
                println!("{element}: {rect}");
                if let Err(e) = crop.save(output_dir.join(format!("{element}_crop.png"))) {
                    println!("  failed to save crop: {e}");
                }
                if element == TASK_DESC_ELEMENT {
                    let link = &config.link;
                    let blobs = find_blobs(&crop, &link.color, link.min_area, &link.morphology);
                    println!("  {} colour blob(s)", blobs.len());
                    for b in &blobs {
                        println!("    ({}, {}) {}x{} area={}", b.x, b.y, b.width, b.height, b.area);
                    }
                }
            }
            Err(e) => println!("{element}: {e}"),
        }
    }

    println!("\n=== Analysis ===");
    let engine = match TesseractEngine::init(&config.ocr.language) {
        Ok(engine) => engine,
        Err(e) => {
            println!("Tesseract not available: {e}");
            return Ok(());
        }
    };
    let ctx = VisionContext::with_engine(config, template, Box::new(engine));
    match QuestAnalyzer::new(&ctx).analyze(&frame, 0) {
        Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        Err(e) => println!("Cycle failed: {e}"),
    }
    ctx.shutdown();

    println!("\nDebug images saved to: {}", output_dir.display());
    Ok(())
}
