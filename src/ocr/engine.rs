//! `ocrs`-backed recognition engine.
//!
//! Models are `.rten` files; by default the ones the ocrs CLI downloads into
//! its cache directory are reused. Everything here is synchronous; the
//! cache runs it under `spawn_blocking`.

use std::path::Path;

use anyhow::{anyhow, Result};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use tracing::info;

use super::{RawLine, RawRecognition, RecognitionEngine};

pub struct OcrsEngine {
    engine: OcrEngine,
}

impl OcrsEngine {
    /// Load detection + recognition models and build the engine. Any failure
    /// here surfaces as `RecognitionUnavailable` at the cache layer.
    pub fn load(detection_model: &Path, recognition_model: &Path) -> Result<Self> {
        let detection = rten::Model::load_file(detection_model).map_err(|e| {
            anyhow!(
                "loading detection model {}: {}",
                detection_model.display(),
                e
            )
        })?;
        let recognition = rten::Model::load_file(recognition_model).map_err(|e| {
            anyhow!(
                "loading recognition model {}: {}",
                recognition_model.display(),
                e
            )
        })?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection),
            recognition_model: Some(recognition),
            ..Default::default()
        })
        .map_err(|e| anyhow!("ocr engine init: {}", e))?;

        info!(
            detection = %detection_model.display(),
            recognition = %recognition_model.display(),
            "ocrs engine loaded"
        );
        Ok(Self { engine })
    }
}

impl RecognitionEngine for OcrsEngine {
    fn recognize(&self, image_path: &Path) -> Result<RawRecognition> {
        let img = image::open(image_path)
            .map_err(|e| anyhow!("decoding {}: {}", image_path.display(), e))?
            .into_rgb8();

        let source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| anyhow!("building image source: {}", e))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|e| anyhow!("preparing ocr input: {}", e))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|e| anyhow!("word detection: {}", e))?;
        let line_regions = self.engine.find_text_lines(&input, &words);
        let line_texts = self
            .engine
            .recognize_text(&input, &line_regions)
            .map_err(|e| anyhow!("text recognition: {}", e))?;

        let mut lines = Vec::new();
        for line in line_texts.into_iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }
            let corners = line.rotated_rect().corners();
            let quad = corners.iter().map(|p| [p.x, p.y]).collect();
            // ocrs does not expose a per-line confidence; the document model
            // treats the score as optional.
            lines.push(RawLine {
                text,
                score: None,
                quad,
            });
        }

        Ok(RawRecognition::Lines(lines))
    }
}
