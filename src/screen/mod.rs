//! Reading named fields off the launch monitor screen.
//!
//! - Field layouts (named relative regions per channel)
//! - Crop preprocessing
//! - The text recognizer seam and its tesseract implementation
//! - Field extraction with per-field cleanup

pub mod engine;
pub mod extract;
pub mod layout;
pub mod preprocess;
pub mod setup;

pub use engine::{TesseractRecognizer, TextRecognizer};
pub use extract::{DiagnosticCapture, FieldExtractor, FieldReading};
pub use layout::{Channel, FieldLayout, FieldRegion, RelativeRect};

use anyhow::Result;

use crate::config::RecorderConfig;
use crate::paths::get_debug_dir;

/// Builds the tesseract-backed extractor described by the config.
pub fn build_extractor(config: &RecorderConfig) -> Result<FieldExtractor> {
    let paths = setup::find_tesseract(&config.ocr)?;
    let recognizer = TesseractRecognizer::new(paths)
        .with_page_segmentation_mode(config.ocr.page_segmentation_mode)
        .with_min_confidence(config.ocr.min_confidence);

    let mut extractor = FieldExtractor::new(Box::new(recognizer), config.ocr.threshold)?;
    if config.diagnostics.retain_crops {
        let dir = if config.diagnostics.save_crops {
            let dir = config.diagnostics.dir.clone().unwrap_or_else(get_debug_dir);
            std::fs::create_dir_all(&dir)?;
            Some(dir)
        } else {
            None
        };
        extractor = extractor.with_diagnostics(DiagnosticCapture::new(dir));
    }
    Ok(extractor)
}
