use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// TaolensConfig: file-based config loader (taolens.json) with env-var
// fallback for every field.
// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_CONFIG_PATH: &str = "TAOLENS_CONFIG";
pub const ENV_PROFILE_DIR: &str = "TAOLENS_PROFILE_DIR";
pub const ENV_OUTPUT_ROOT: &str = "TAOLENS_OUTPUT_ROOT";
pub const ENV_LOGIN_WAIT_SECS: &str = "TAOLENS_LOGIN_WAIT_SECS";
pub const ENV_OCR_DISABLED: &str = "TAOLENS_OCR_DISABLED";
pub const ENV_DETECTION_MODEL: &str = "TAOLENS_OCR_DETECTION_MODEL";
pub const ENV_RECOGNITION_MODEL: &str = "TAOLENS_OCR_RECOGNITION_MODEL";

/// Top-level config loaded from `taolens.json`. Every field is optional in
/// the file; `resolve_*` accessors apply env-var fallbacks and defaults.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct TaolensConfig {
    /// Persistent browser profile directory (keeps the manual login alive
    /// across runs). Default: `./chrome_profile`.
    pub profile_dir: Option<String>,
    /// Root folder for scrape output. Default: `./scraped_data`.
    pub output_root: Option<String>,
    /// Storefront home page opened for the manual-login pause.
    pub login_url: Option<String>,
    /// Seconds to pause on a fresh session for manual login. Default: 5.
    pub login_wait_secs: Option<u64>,
    /// Upper bound for locating the option panel, milliseconds. Default: 20000.
    pub panel_wait_ms: Option<u64>,
    /// Wait applied before re-reading the main image after a variant click,
    /// milliseconds. Default: 500.
    pub image_settle_ms: Option<u64>,
    /// Post-navigation settle time before extraction starts, ms. Default: 3000.
    pub page_settle_ms: Option<u64>,
    /// OCR toggles and model locations.
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct OcrConfig {
    /// Set to `false` to skip recognition entirely (records still carry
    /// images; OCR fields stay empty).
    pub enabled: Option<bool>,
    pub detection_model: Option<String>,
    pub recognition_model: Option<String>,
}

impl TaolensConfig {
    pub fn resolve_profile_dir(&self) -> PathBuf {
        if let Some(p) = non_empty(self.profile_dir.as_deref()) {
            return PathBuf::from(p);
        }
        if let Some(p) = env_non_empty(ENV_PROFILE_DIR) {
            return PathBuf::from(p);
        }
        PathBuf::from("chrome_profile")
    }

    pub fn resolve_output_root(&self) -> PathBuf {
        if let Some(p) = non_empty(self.output_root.as_deref()) {
            return PathBuf::from(p);
        }
        if let Some(p) = env_non_empty(ENV_OUTPUT_ROOT) {
            return PathBuf::from(p);
        }
        PathBuf::from("scraped_data")
    }

    pub fn resolve_login_url(&self) -> String {
        non_empty(self.login_url.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| "https://www.taobao.com".to_string())
    }

    pub fn resolve_login_wait_secs(&self) -> u64 {
        if let Some(n) = self.login_wait_secs {
            return n;
        }
        env_parse(ENV_LOGIN_WAIT_SECS).unwrap_or(5)
    }

    pub fn resolve_panel_wait_ms(&self) -> u64 {
        self.panel_wait_ms.unwrap_or(20_000)
    }

    pub fn resolve_image_settle_ms(&self) -> u64 {
        self.image_settle_ms.unwrap_or(500)
    }

    pub fn resolve_page_settle_ms(&self) -> u64 {
        self.page_settle_ms.unwrap_or(3_000)
    }

    /// OCR enabled: JSON field → `TAOLENS_OCR_DISABLED` env (set to disable)
    /// → `true`. Even when enabled, a failed engine init only downgrades to
    /// empty OCR fields.
    pub fn resolve_ocr_enabled(&self) -> bool {
        if let Some(b) = self.ocr.enabled {
            return b;
        }
        let Ok(v) = std::env::var(ENV_OCR_DISABLED) else {
            return true;
        };
        let v = v.trim().to_ascii_lowercase();
        !matches!(v.as_str(), "1" | "true" | "yes" | "on")
    }

    /// Detection model path: JSON → env → `<cache>/ocrs/text-detection.rten`.
    pub fn resolve_detection_model(&self) -> PathBuf {
        resolve_model_path(
            self.ocr.detection_model.as_deref(),
            ENV_DETECTION_MODEL,
            "text-detection.rten",
        )
    }

    /// Recognition model path: JSON → env → `<cache>/ocrs/text-recognition.rten`.
    pub fn resolve_recognition_model(&self) -> PathBuf {
        resolve_model_path(
            self.ocr.recognition_model.as_deref(),
            ENV_RECOGNITION_MODEL,
            "text-recognition.rten",
        )
    }
}

fn resolve_model_path(field: Option<&str>, env_key: &str, default_name: &str) -> PathBuf {
    if let Some(p) = non_empty(field) {
        return PathBuf::from(p);
    }
    if let Some(p) = env_non_empty(env_key) {
        return PathBuf::from(p);
    }
    // The ocrs CLI downloads its models here; reuse them instead of keeping
    // a second copy.
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocrs")
        .join(default_name)
}

/// Optional override for the Chromium-family browser executable. Only
/// returned when `CHROME_EXECUTABLE` points at an existing path; default
/// behavior is auto-discovery (see `browser::find_chrome_executable`).
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

/// Load `taolens.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `TAOLENS_CONFIG` env var path
/// 2. `./taolens.json`
/// 3. `../taolens.json`
///
/// Missing file → defaults (env fallbacks still apply per field).
/// Parse error → warn and fall back to defaults.
pub fn load_config() -> TaolensConfig {
    let mut candidates = vec![
        PathBuf::from("taolens.json"),
        PathBuf::from("../taolens.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<TaolensConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("taolens.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "taolens.json parse error at {}: {}; using defaults",
                        path.display(),
                        e
                    );
                    return TaolensConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    TaolensConfig::default()
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
