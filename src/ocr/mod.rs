//! OCR enrichment: a memoizing cache over an opaque recognition engine.
//!
//! The engine is an optional capability. It is initialized lazily on the
//! first recognition request; if that fails (missing models, broken
//! install), the cache goes sticky-unavailable and every call returns `None`
//! instead of erroring: OCR text is enrichment, never a requirement for a
//! valid record.
//!
//! Memoization is per process lifetime, keyed by canonical file path, so
//! each unique image is recognized at most once no matter how many variants
//! reference it.

pub mod engine;

pub use engine::OcrsEngine;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::core::types::{OcrDocument, OcrLine};

/// Formats the engine consumes directly; everything else is transcoded.
const ALLOWED_EXTS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Engine-imposed ceiling on either image dimension.
const MAX_SIDE: u32 = 4000;

// ── Engine boundary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RawLine {
    pub text: String,
    pub score: Option<f32>,
    pub quad: Vec<[f32; 2]>,
}

/// Raw engine output. Engines differ in shape (a flat batch of lines vs. a
/// structured prediction object); the cache normalizes both into
/// [`OcrDocument`] so downstream code never sees the difference.
#[derive(Debug, Clone)]
pub enum RawRecognition {
    Lines(Vec<RawLine>),
    Prediction {
        texts: Vec<String>,
        scores: Vec<Option<f32>>,
        polys: Vec<Vec<[f32; 2]>>,
    },
}

pub trait RecognitionEngine: Send + Sync {
    fn recognize(&self, image_path: &Path) -> Result<RawRecognition>;
}

type EngineInit = Box<dyn Fn() -> Result<Arc<dyn RecognitionEngine>> + Send + Sync>;

enum EngineState {
    Uninit,
    Ready(Arc<dyn RecognitionEngine>),
    Unavailable,
}

// ── Cache ────────────────────────────────────────────────────────────────────

pub struct OcrCache {
    init: EngineInit,
    engine: Mutex<EngineState>,
    results: Mutex<HashMap<PathBuf, Option<OcrDocument>>>,
}

impl OcrCache {
    /// Cache over a lazily-initialized engine. `init` runs at most once, on
    /// the first recognition request.
    pub fn new(
        init: impl Fn() -> Result<Arc<dyn RecognitionEngine>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            init: Box::new(init),
            engine: Mutex::new(EngineState::Uninit),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// A cache whose engine never materializes; every call yields `None`.
    pub fn unavailable() -> Self {
        Self::new(|| Err(anyhow!("recognition disabled")))
    }

    /// Cache over an already-built engine (tests, custom engines).
    pub fn with_engine(engine: Arc<dyn RecognitionEngine>) -> Self {
        let cache = Self::new(|| Err(anyhow!("unused")));
        *cache.engine.lock().unwrap() = EngineState::Ready(engine);
        cache
    }

    /// Recognize a local image file. Returns the memoized document on repeat
    /// calls; `None` for unreadable/empty inputs or an unavailable engine.
    pub async fn recognize_file(&self, path: &Path) -> Option<OcrDocument> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(cached) = self.results.lock().unwrap().get(&key) {
            debug!(path = %key.display(), "ocr cache hit");
            return cached.clone();
        }

        let doc = self.recognize_uncached(&key).await;
        self.results.lock().unwrap().insert(key, doc.clone());
        doc
    }

    async fn recognize_uncached(&self, path: &Path) -> Option<OcrDocument> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() == 0 => {
                warn!(path = %path.display(), "ocr skipped empty file");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ocr input unreadable");
                return None;
            }
            Ok(_) => {}
        }

        let engine = self.engine_handle()?;
        let source = path.display().to_string();
        let owned = path.to_path_buf();

        // Recognition is CPU-bound; keep it off the async threads.
        let raw = tokio::task::spawn_blocking(move || {
            let (input_path, _tmp) = normalize_input(&owned)?;
            engine.recognize(&input_path)
        })
        .await;

        match raw {
            Ok(Ok(raw)) => Some(normalize_output(raw, source)),
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "recognition failed");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "recognition task panicked");
                None
            }
        }
    }

    fn engine_handle(&self) -> Option<Arc<dyn RecognitionEngine>> {
        let mut state = self.engine.lock().unwrap();
        match &*state {
            EngineState::Ready(engine) => Some(engine.clone()),
            EngineState::Unavailable => None,
            EngineState::Uninit => match (self.init)() {
                Ok(engine) => {
                    info!("recognition engine initialized");
                    *state = EngineState::Ready(engine.clone());
                    Some(engine)
                }
                Err(e) => {
                    warn!(error = %e, "recognition engine unavailable; OCR fields stay empty");
                    *state = EngineState::Unavailable;
                    None
                }
            },
        }
    }
}

// ── Input normalization ──────────────────────────────────────────────────────

/// Deletes its temporary file when dropped, success or not.
struct TempArtifact(Option<PathBuf>);

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Some(p) = self.0.take() {
            let _ = std::fs::remove_file(p);
        }
    }
}

fn temp_png_path() -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let n = SEQ.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("taolens-ocr-{}-{}.png", std::process::id(), n))
}

fn needs_transcode(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    !ALLOWED_EXTS.contains(&ext.as_str())
}

/// Target dimensions when either side exceeds the engine ceiling; `None`
/// when the image already fits.
pub fn scaled_dims(w: u32, h: u32) -> Option<(u32, u32)> {
    let max_side = w.max(h);
    if max_side <= MAX_SIDE {
        return None;
    }
    let scale = MAX_SIDE as f32 / max_side as f32;
    Some((
        ((w as f32 * scale) as u32).max(1),
        ((h as f32 * scale) as u32).max(1),
    ))
}

/// Constrain an input to what the engine accepts: transcode unsupported
/// formats to PNG and downscale oversized images preserving aspect ratio.
/// The returned guard removes any temporary file on drop.
fn normalize_input(path: &Path) -> Result<(PathBuf, TempArtifact)> {
    let transcode = needs_transcode(path);

    let decoded = image::open(path);
    let img = match decoded {
        Ok(img) => img,
        Err(e) if !transcode => {
            // Directly supported extension that our decoder dislikes: hand
            // the original file to the engine and let it decide.
            debug!(path = %path.display(), error = %e, "decode failed; passing file through");
            return Ok((path.to_path_buf(), TempArtifact(None)));
        }
        Err(e) => {
            return Err(anyhow!("cannot transcode {}: {}", path.display(), e));
        }
    };

    let (w, h) = (img.width(), img.height());
    let resized = scaled_dims(w, h).map(|(nw, nh)| img.resize(nw, nh, FilterType::Triangle));

    if resized.is_none() && !transcode {
        return Ok((path.to_path_buf(), TempArtifact(None)));
    }

    let out = temp_png_path();
    let to_save = resized.unwrap_or(img);
    to_save
        .save_with_format(&out, image::ImageFormat::Png)
        .map_err(|e| anyhow!("saving normalized image: {}", e))?;
    debug!(from = %path.display(), to = %out.display(), "ocr input normalized");
    Ok((out.clone(), TempArtifact(Some(out))))
}

// ── Output normalization ─────────────────────────────────────────────────────

fn quad4(points: &[[f32; 2]]) -> [[f32; 2]; 4] {
    let mut quad = [[0.0f32; 2]; 4];
    for (i, slot) in quad.iter_mut().enumerate() {
        if let Some(p) = points.get(i).or_else(|| points.last()) {
            *slot = *p;
        }
    }
    quad
}

/// Fold either raw engine shape into the one document type.
pub fn normalize_output(raw: RawRecognition, source: String) -> OcrDocument {
    let lines: Vec<OcrLine> = match raw {
        RawRecognition::Lines(lines) => lines
            .into_iter()
            .map(|l| OcrLine {
                quad: quad4(&l.quad),
                text: l.text,
                score: l.score,
            })
            .collect(),
        RawRecognition::Prediction {
            texts,
            scores,
            polys,
        } => texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| OcrLine {
                text,
                score: scores.get(i).copied().flatten(),
                quad: quad4(polys.get(i).map(Vec::as_slice).unwrap_or(&[])),
            })
            .collect(),
    };

    let full_text = lines
        .iter()
        .map(|l| l.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    OcrDocument {
        source,
        full_text,
        lines,
    }
}

/// Order-preserving deduplicated concatenation of text blocks.
pub fn dedup_concat<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for t in texts {
        if t.is_empty() {
            continue;
        }
        if seen.insert(t) {
            out.push(t);
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingEngine {
        calls: Arc<AtomicUsize>,
    }

    impl RecognitionEngine for CountingEngine {
        fn recognize(&self, image_path: &Path) -> Result<RawRecognition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawRecognition::Lines(vec![RawLine {
                text: format!("text-from-{}", image_path.file_name().unwrap().to_string_lossy()),
                score: Some(0.98),
                quad: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]],
            }]))
        }
    }

    fn temp_image(name: &str, bytes: &[u8]) -> PathBuf {
        let p = std::env::temp_dir().join(format!("taolens-ocrtest-{}-{}", std::process::id(), name));
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[tokio::test]
    async fn same_path_invokes_the_engine_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = OcrCache::with_engine(Arc::new(CountingEngine { calls: calls.clone() }));

        // Not a decodable image, but the extension is allowed so the
        // normalizer passes the file through untouched.
        let path = temp_image("memo.png", b"not-a-real-png");

        let first = cache.recognize_file(&path).await.unwrap();
        let second = cache.recognize_file(&path).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1, "engine ran exactly once");
        // Both callers observe identical text content (same-URL variants
        // share one recognition).
        assert_eq!(first.full_text, second.full_text);
        assert!(first.full_text.contains("text-from-"));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn unavailable_engine_degrades_every_call_to_none() {
        let init_calls = Arc::new(AtomicUsize::new(0));
        let counting = init_calls.clone();
        let cache = OcrCache::new(move || {
            counting.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("models not installed"))
        });

        let a = temp_image("unavail-a.png", b"xx");
        let b = temp_image("unavail-b.png", b"yy");
        assert!(cache.recognize_file(&a).await.is_none());
        assert!(cache.recognize_file(&b).await.is_none());
        assert_eq!(
            init_calls.load(Ordering::SeqCst),
            1,
            "failed init must be sticky, not retried per call"
        );

        std::fs::remove_file(&a).ok();
        std::fs::remove_file(&b).ok();
    }

    #[tokio::test]
    async fn empty_file_is_skipped_without_touching_the_engine() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = OcrCache::with_engine(Arc::new(CountingEngine { calls: calls.clone() }));
        let path = temp_image("empty.png", b"");
        assert!(cache.recognize_file(&path).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn both_raw_shapes_normalize_identically() {
        let lines = RawRecognition::Lines(vec![RawLine {
            text: "七天退换".into(),
            score: Some(0.91),
            quad: vec![[1.0, 2.0], [3.0, 2.0], [3.0, 4.0], [1.0, 4.0]],
        }]);
        let pred = RawRecognition::Prediction {
            texts: vec!["七天退换".into()],
            scores: vec![Some(0.91)],
            polys: vec![vec![[1.0, 2.0], [3.0, 2.0], [3.0, 4.0], [1.0, 4.0]]],
        };

        let a = normalize_output(lines, "x.png".into());
        let b = normalize_output(pred, "x.png".into());
        assert_eq!(a.full_text, b.full_text);
        assert_eq!(a.lines[0].quad, b.lines[0].quad);
        assert_eq!(a.lines[0].score, b.lines[0].score);
    }

    #[test]
    fn truncated_polys_are_padded_to_quads() {
        let doc = normalize_output(
            RawRecognition::Prediction {
                texts: vec!["a".into(), "b".into()],
                scores: vec![None],
                polys: vec![vec![[1.0, 1.0], [2.0, 1.0]]],
            },
            "y.png".into(),
        );
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].quad[3], [2.0, 1.0], "short poly padded with last point");
        assert_eq!(doc.lines[1].quad, [[0.0, 0.0]; 4], "missing poly padded with zeros");
    }

    #[test]
    fn downscale_preserves_aspect_and_only_fires_above_ceiling() {
        assert_eq!(scaled_dims(8000, 2000), Some((4000, 1000)));
        assert_eq!(scaled_dims(2000, 8000), Some((1000, 4000)));
        assert_eq!(scaled_dims(5000, 5000), Some((4000, 4000)));
        assert_eq!(scaled_dims(4000, 3000), None);
        assert_eq!(scaled_dims(10, 10), None);
    }

    #[test]
    fn dedup_concat_preserves_first_seen_order() {
        let joined = dedup_concat(["正品保证", "七天退换", "正品保证", "", "包邮"]);
        assert_eq!(joined, "正品保证\n七天退换\n包邮");
    }
}
