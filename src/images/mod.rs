//! Image acquisition and the content-addressed local store.
//!
//! The storefront's image hosts reject direct hotlinked requests, so bytes
//! are obtained through a tier chain (`ImageTransport`): a new tab sharing
//! the authenticated session, an in-page credentialed fetch, and finally a
//! raw referer-spoofed GET. First success wins; an image that survives no
//! tier is recorded as unavailable and the scrape moves on.
//!
//! Local names are derived from a short hash of the source URL plus a
//! sequence index and the original extension; stable across runs, so
//! re-running a scrape re-uses the same paths without a manifest lookup.

pub mod acquire;

pub use acquire::BrowserTransport;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::types::ManifestEntry;

/// Tiered byte acquisition for a single image URL.
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Tier 1: load the URL in an isolated tab that shares the session's
    /// cookies and exfiltrate the bytes from inside it.
    async fn fetch_new_tab(&self, url: &str) -> Result<Vec<u8>>;

    /// Tier 2: credentialed fetch issued from the product page itself.
    async fn fetch_in_page(&self, url: &str) -> Result<Vec<u8>>;

    /// Tier 3: plain HTTP GET with a spoofed referer.
    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>>;
}

/// Run the tier chain; `None` when every tier failed.
pub async fn acquire<T: ImageTransport + ?Sized>(transport: &T, url: &str) -> Option<Vec<u8>> {
    match transport.fetch_new_tab(url).await {
        Ok(bytes) if !bytes.is_empty() => {
            debug!(url, tier = "new_tab", bytes = bytes.len(), "image acquired");
            return Some(bytes);
        }
        Ok(_) => warn!(url, tier = "new_tab", "empty response"),
        Err(e) => debug!(url, tier = "new_tab", error = %e, "tier failed"),
    }

    match transport.fetch_in_page(url).await {
        Ok(bytes) if !bytes.is_empty() => {
            debug!(url, tier = "in_page", bytes = bytes.len(), "image acquired");
            return Some(bytes);
        }
        Ok(_) => warn!(url, tier = "in_page", "empty response"),
        Err(e) => debug!(url, tier = "in_page", error = %e, "tier failed"),
    }

    match transport.fetch_raw(url).await {
        Ok(bytes) if !bytes.is_empty() => {
            debug!(url, tier = "raw", bytes = bytes.len(), "image acquired");
            Some(bytes)
        }
        Ok(_) | Err(_) => {
            warn!(url, "image unavailable after all acquisition tiers");
            None
        }
    }
}

// ── Naming ───────────────────────────────────────────────────────────────────

/// `{prefix}_{index}_{sha256(url)[..8]}{ext}`: collision-resistant and
/// stable for a given source URL.
pub fn stable_filename(prefix: &str, index: usize, url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let short_hash: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}_{index}_{short_hash}{}", extension_of(url))
}

/// Extension from the URL path; `.jpg` when missing or implausibly long.
fn extension_of(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let name = path.rsplit('/').next().unwrap_or("");
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && ext.len() <= 4 => {
            format!(".{ext}")
        }
        _ => ".jpg".to_string(),
    }
}

/// Basename of the URL path, for the manifest's provenance field.
pub fn original_filename(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let name = path.rsplit('/').next().unwrap_or("");
    if name.is_empty() {
        "img".to_string()
    } else {
        name.to_string()
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// Writes acquired images under `<out_root>/images/<section>/` and builds
/// manifest entries with output-folder-relative paths.
pub struct ImageStore<'a, T: ImageTransport + ?Sized> {
    transport: &'a T,
    out_root: PathBuf,
}

impl<'a, T: ImageTransport + ?Sized> ImageStore<'a, T> {
    pub fn new(transport: &'a T, out_root: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            out_root: out_root.into(),
        }
    }

    /// Download a list of URLs into `images/<section>/`, deduplicating by
    /// URL while preserving first-seen order. Failed images are skipped.
    ///
    /// Sequential on purpose: tiers 1 and 2 go through the shared browser
    /// session.
    pub async fn download_set(&self, urls: &[String], section: &str) -> Vec<ManifestEntry> {
        let dir = self.out_root.join("images").join(section);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "could not create image dir");
            return Vec::new();
        }

        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();
        let mut index = 0usize;

        for url in urls {
            if url.is_empty() || !seen.insert(url.clone()) {
                continue;
            }
            index += 1;

            let Some(bytes) = acquire(self.transport, url).await else {
                continue;
            };

            let filename = stable_filename(section, index, url);
            let local_path = dir.join(&filename);
            if let Err(e) = tokio::fs::write(&local_path, &bytes).await {
                warn!(url, path = %local_path.display(), error = %e, "failed to save image");
                let _ = tokio::fs::remove_file(&local_path).await;
                continue;
            }

            entries.push(ManifestEntry {
                url: url.clone(),
                file: format!("images/{section}/{filename}"),
                original_filename: original_filename(url),
            });
        }

        info!(
            section,
            requested = urls.len(),
            downloaded = entries.len(),
            "image set downloaded"
        );
        entries
    }

    /// Absolute path for a manifest-relative file.
    pub fn resolve(&self, manifest_file: &str) -> PathBuf {
        self.out_root.join(manifest_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable transport: per-tier success toggles plus call counters.
    struct MockTransport {
        new_tab_ok: bool,
        in_page_ok: bool,
        raw_ok: bool,
        new_tab_calls: AtomicUsize,
        in_page_calls: AtomicUsize,
        raw_calls: AtomicUsize,
    }

    impl MockTransport {
        fn tiers(new_tab_ok: bool, in_page_ok: bool, raw_ok: bool) -> Self {
            Self {
                new_tab_ok,
                in_page_ok,
                raw_ok,
                new_tab_calls: AtomicUsize::new(0),
                in_page_calls: AtomicUsize::new(0),
                raw_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageTransport for MockTransport {
        async fn fetch_new_tab(&self, _url: &str) -> Result<Vec<u8>> {
            self.new_tab_calls.fetch_add(1, Ordering::SeqCst);
            if self.new_tab_ok {
                Ok(b"tier1-bytes".to_vec())
            } else {
                anyhow::bail!("hotlink blocked")
            }
        }

        async fn fetch_in_page(&self, _url: &str) -> Result<Vec<u8>> {
            self.in_page_calls.fetch_add(1, Ordering::SeqCst);
            if self.in_page_ok {
                Ok(b"tier2-bytes".to_vec())
            } else {
                anyhow::bail!("fetch rejected")
            }
        }

        async fn fetch_raw(&self, _url: &str) -> Result<Vec<u8>> {
            self.raw_calls.fetch_add(1, Ordering::SeqCst);
            if self.raw_ok {
                Ok(b"tier3-bytes".to_vec())
            } else {
                anyhow::bail!("403")
            }
        }
    }

    fn temp_out_root(tag: &str) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let n = SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("taolens-{}-{}-{}", tag, std::process::id(), n))
    }

    #[test]
    fn filenames_are_stable_and_collision_resistant() {
        let a1 = stable_filename("main", 1, "https://img.alicdn.com/bao/a.jpg");
        let a2 = stable_filename("main", 1, "https://img.alicdn.com/bao/a.jpg");
        let b = stable_filename("main", 1, "https://img.alicdn.com/bao/b.jpg");
        assert_eq!(a1, a2, "same URL must always map to the same name");
        assert_ne!(a1, b);
        assert!(a1.starts_with("main_1_"));
        assert!(a1.ends_with(".jpg"));
    }

    #[test]
    fn extension_falls_back_for_missing_or_absurd_suffixes() {
        assert!(stable_filename("d", 1, "https://h/x").ends_with(".jpg"));
        assert!(stable_filename("d", 1, "https://h/x.png?x-oss-process=resize").ends_with(".png"));
        assert!(stable_filename("d", 1, "https://h/x.verylongext").ends_with(".jpg"));
        assert!(stable_filename("d", 1, "https://h/a.webp").ends_with(".webp"));
    }

    #[test]
    fn original_filename_is_the_url_basename() {
        assert_eq!(original_filename("https://h/bao/uploaded/pic.jpg"), "pic.jpg");
        assert_eq!(original_filename("https://h/"), "img");
    }

    #[tokio::test]
    async fn acquisition_stops_at_first_successful_tier() {
        let t = MockTransport::tiers(true, true, true);
        let bytes = acquire(&t, "https://img/a.jpg").await.unwrap();
        assert_eq!(bytes, b"tier1-bytes");
        assert_eq!(t.in_page_calls.load(Ordering::SeqCst), 0);
        assert_eq!(t.raw_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tier_two_success_is_indistinguishable_downstream() {
        // Scenario D: tier 1 fails, tier 2 delivers; manifest and file layout
        // come out exactly as a tier-1 success would.
        let t = MockTransport::tiers(false, true, true);
        let root = temp_out_root("tier2");
        let store = ImageStore::new(&t, &root);

        let entries = store
            .download_set(&["https://img.alicdn.com/bao/a.jpg".to_string()], "main")
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(t.new_tab_calls.load(Ordering::SeqCst), 1);
        assert_eq!(t.in_page_calls.load(Ordering::SeqCst), 1);
        assert_eq!(t.raw_calls.load(Ordering::SeqCst), 0);

        // §: every manifest file must resolve to a non-empty local file.
        let local = store.resolve(&entries[0].file);
        let meta = std::fs::metadata(&local).unwrap();
        assert!(meta.len() > 0);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn total_failure_skips_the_image_without_aborting() {
        let t = MockTransport::tiers(false, false, false);
        let root = temp_out_root("allfail");
        let store = ImageStore::new(&t, &root);

        let entries = store
            .download_set(
                &[
                    "https://img/only.jpg".to_string(),
                    "https://img/only.jpg".to_string(), // duplicate, deduped
                ],
                "detail",
            )
            .await;
        assert!(entries.is_empty());
        // Each tier tried exactly once for the single unique URL.
        assert_eq!(t.new_tab_calls.load(Ordering::SeqCst), 1);
        assert_eq!(t.in_page_calls.load(Ordering::SeqCst), 1);
        assert_eq!(t.raw_calls.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn download_set_dedupes_and_preserves_order() {
        let t = MockTransport::tiers(true, false, false);
        let root = temp_out_root("dedupe");
        let store = ImageStore::new(&t, &root);

        let urls = vec![
            "https://img/1.jpg".to_string(),
            "https://img/2.jpg".to_string(),
            "https://img/1.jpg".to_string(),
        ];
        let entries = store.download_set(&urls, "main").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://img/1.jpg");
        assert_eq!(entries[1].url, "https://img/2.jpg");
        assert_eq!(t.new_tab_calls.load(Ordering::SeqCst), 2);

        std::fs::remove_dir_all(&root).ok();
    }
}
