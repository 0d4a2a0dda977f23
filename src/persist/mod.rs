//! Output-folder persistence: record JSON, human-readable summary, image
//! manifest, raw-markup snapshots, and the fatal-failure page snapshot.
//!
//! The assembler stays pure with respect to the record it returns; every
//! file side effect funnels through here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::core::types::{ImageManifest, ProductRecord};

pub const RECORD_FILENAME: &str = "product_data.json";
pub const READABLE_FILENAME: &str = "product_data_readable.txt";
pub const MANIFEST_FILENAME: &str = "download_manifest.json";
pub const PARAMS_RAW_FILENAME: &str = "parameters_raw.html";
pub const DETAIL_RAW_FILENAME: &str = "image_details_raw.html";
pub const DEBUG_SNAPSHOT_FILENAME: &str = "debug_page_source.html";

/// One scrape's output folder.
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Create (if needed) and wrap an explicit output folder.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating output folder {}", root.display()))?;
        Ok(Self { root })
    }

    /// `<output_root>/scraped_data_<timestamp>/`
    pub fn timestamped(output_root: &Path) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self::at(output_root.join(format!("scraped_data_{stamp}")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a manifest-relative file.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn write_record(&self, record: &ProductRecord) -> Result<PathBuf> {
        let path = self.root.join(RECORD_FILENAME);
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        info!("Record saved to {}", path.display());
        Ok(path)
    }

    pub async fn write_readable(&self, record: &ProductRecord) -> Result<PathBuf> {
        let path = self.root.join(READABLE_FILENAME);
        tokio::fs::write(&path, render_readable(record)).await?;
        Ok(path)
    }

    pub async fn write_manifest(&self, manifest: &ImageManifest) -> Result<PathBuf> {
        let images_dir = self.root.join("images");
        tokio::fs::create_dir_all(&images_dir).await?;
        let path = images_dir.join(MANIFEST_FILENAME);
        tokio::fs::write(&path, serde_json::to_string_pretty(manifest)?).await?;
        info!("Image manifest saved to {}", path.display());
        Ok(path)
    }

    /// Raw markup snapshots are diagnostic artifacts; written only when the
    /// sections were actually captured.
    pub async fn write_raw_snapshots(&self, record: &ProductRecord) -> Result<()> {
        if !record.details.parameters_raw.is_empty() {
            let path = self.root.join(PARAMS_RAW_FILENAME);
            tokio::fs::write(&path, &record.details.parameters_raw).await?;
            info!("Raw parameters markup saved to {}", path.display());
        }
        if !record.details.detail_images_raw.is_empty() {
            let path = self.root.join(DETAIL_RAW_FILENAME);
            tokio::fs::write(&path, &record.details.detail_images_raw).await?;
            info!("Raw gallery markup saved to {}", path.display());
        }
        Ok(())
    }

    /// Page-source snapshot attached to the fatal option-panel failure.
    pub async fn write_debug_snapshot(&self, page_html: &str) -> Result<PathBuf> {
        let path = self.root.join(DEBUG_SNAPSHOT_FILENAME);
        tokio::fs::write(&path, page_html).await?;
        info!("Page snapshot saved to {} for selector maintenance", path.display());
        Ok(path)
    }
}

/// Plain-text digest of a record, mirroring what the JSON carries in full.
pub fn render_readable(record: &ProductRecord) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "Product Information");
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);
    let _ = writeln!(out, "Title: {}", record.title);
    let _ = writeln!(out, "URL: {}", record.url);
    let _ = writeln!(out);
    let _ = writeln!(out, "Shop Information:");
    let _ = writeln!(out, "  Name: {}", record.shop.name);
    let _ = writeln!(out, "  Rating: {}", record.shop.rating);
    let _ = writeln!(
        out,
        "  Good Review Rate: {}",
        record.shop.good_review_rate.as_deref().unwrap_or("")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Style Variations:");
    for (idx, style) in record.styles.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Style {}: {}", idx + 1, style.name);
        let _ = writeln!(out, "  Status: {}", if style.available { "有货" } else { "缺货" });
        let sizes: Vec<&str> = style.sizes.iter().map(|s| s.name.as_str()).collect();
        let _ = writeln!(out, "  Sizes: {}", sizes.join(", "));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Total Reviews: {}", record.details.reviews.len());
    let _ = writeln!(out, "Total Parameters: {}", record.details.parameters.len());
    out
}
