//! Style/size variant walking.
//!
//! Selecting a variant re-renders the SKU subtree, which invalidates every
//! element handle held into it. The machine therefore never carries a handle
//! across a click: each per-variant step re-resolves container → axis →
//! value items from the page root and indexes into the fresh list. Stale
//! handles are ruled out by construction, not caught after the fact.
//!
//! Per-variant progression:
//! `Announced → (if available) Clicked → ImageSettled → SizeAxisRelocated →
//! SizesExtracted → Recorded`; sold-out variants skip the interaction steps.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::types::{SizeOption, StyleVariant};
use crate::core::CollectFailure;
use crate::dom::{DomNode, DomRoot};
use crate::extract::selectors::{
    DISABLED_ATTR, MAIN_IMAGE_SELECTORS, SIZE_AXIS_LABELS, SKU_CONTAINER_SELECTORS,
    SKU_CONTENT_SELECTOR, SKU_ITEM_SELECTOR, SKU_LABEL_SELECTOR, SKU_TITLED_LABEL_SELECTOR,
    SKU_VALUE_ITEM_FALLBACK_SELECTOR, SKU_VALUE_ITEM_SELECTOR, SKU_VALUE_WRAP_SELECTOR,
    STYLE_AXIS_LABELS, VALUE_ITEM_IMG_SELECTOR, VALUE_ITEM_TEXT_SELECTOR,
};

/// Name assigned to the implicit variant of a size-only product.
pub const IMPLICIT_VARIANT_NAME: &str = "默认";

#[derive(Debug, Clone)]
pub struct VariantConfig {
    /// Upper bound for the initial option-panel location.
    pub panel_wait_ms: u64,
    pub panel_poll_ms: u64,
    /// Settle delay before re-reading the main image after a click; applied
    /// once, then once more as a single retry window.
    pub image_settle_ms: u64,
    /// Polite pause between variant clicks (a small random jitter is added
    /// on top when nonzero).
    pub click_pause_ms: u64,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            panel_wait_ms: 20_000,
            panel_poll_ms: 250,
            image_settle_ms: 500,
            click_pause_ms: 500,
        }
    }
}

/// Per-variant progression marker, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Announced,
    Clicked,
    ImageSettled,
    SizeAxisRelocated,
    SizesExtracted,
    Recorded,
}

struct Announced {
    name: String,
    thumb: Option<String>,
    available: bool,
}

pub struct VariantMachine<'a, R: DomRoot> {
    root: &'a R,
    cfg: &'a VariantConfig,
}

impl<'a, R: DomRoot> VariantMachine<'a, R> {
    pub fn new(root: &'a R, cfg: &'a VariantConfig) -> Self {
        Self { root, cfg }
    }

    /// Walk every style variant and return them in on-page order.
    ///
    /// The only hard failure is an unlocatable option panel; everything else
    /// degrades to sentinels and empty lists.
    pub async fn run(&self) -> Result<Vec<StyleVariant>, CollectFailure> {
        let panel = self
            .locate_panel(self.cfg.panel_wait_ms)
            .await
            .ok_or(CollectFailure::OptionPanelMissing { snapshot: None })?;

        let style_axis = locate_axis(&panel, STYLE_AXIS_LABELS).await;

        let Some(axis) = style_axis else {
            // Size-only product: no style axis is an expected page shape,
            // folded into a single implicit variant.
            info!("no style axis found; treating as size-only product");
            let sizes = match locate_axis(&panel, SIZE_AXIS_LABELS).await {
                Some(size_axis) => extract_sizes(&size_axis).await,
                None => Vec::new(),
            };
            return Ok(vec![StyleVariant {
                name: IMPLICIT_VARIANT_NAME.to_string(),
                image_url: self.main_image_url().await,
                image_url_original: None,
                available: true,
                sizes,
                ocr: None,
            }]);
        };

        let style_count = value_items(&axis).await.len();
        info!(styles = style_count, "style axis located");

        let mut variants = Vec::with_capacity(style_count);
        for idx in 0..style_count {
            match self.process_style(idx).await {
                Some(variant) => {
                    debug!(variant = %variant.name, phase = ?Phase::Recorded, "variant recorded");
                    variants.push(variant);
                }
                None => {
                    warn!(index = idx, "style list shrank under iteration; stopping");
                    break;
                }
            }

            if self.cfg.click_pause_ms > 0 {
                // Jitter computed before the await; the rng is not Send.
                let jitter = {
                    use rand::Rng;
                    rand::rng().random_range(0..=self.cfg.click_pause_ms / 2)
                };
                tokio::time::sleep(Duration::from_millis(self.cfg.click_pause_ms + jitter)).await;
            }
        }

        Ok(variants)
    }

    /// One full pass over the style at `idx`, re-resolving every handle from
    /// the root. Returns `None` when the fresh item list no longer reaches
    /// `idx`.
    async fn process_style(&self, idx: usize) -> Option<StyleVariant> {
        let panel = self.locate_panel(self.cfg.panel_poll_ms).await?;
        let axis = locate_axis(&panel, STYLE_AXIS_LABELS).await?;
        let items = value_items(&axis).await;
        let item = items.get(idx)?;

        let announced = announce(item, idx).await;
        debug!(
            variant = %announced.name,
            available = announced.available,
            phase = ?Phase::Announced,
            "processing style"
        );

        let mut image_url = announced.thumb.clone();

        if announced.available {
            let before = self.main_image_url().await;
            match item.click().await {
                Ok(()) => {
                    debug!(variant = %announced.name, phase = ?Phase::Clicked, "clicked");
                    if let Some(settled) = self.wait_for_image_change(before.as_deref()).await {
                        debug!(variant = %announced.name, phase = ?Phase::ImageSettled, "image updated");
                        image_url = Some(settled);
                    } else if image_url.is_none() {
                        // No change within the window and no thumbnail: keep
                        // whatever the viewer showed before the click.
                        image_url = before;
                    }
                }
                Err(e) => {
                    warn!(variant = %announced.name, error = %e, "click failed; keeping thumbnail");
                }
            }
        } else {
            debug!(variant = %announced.name, "sold out; skipping interaction");
        }

        // Sizes reflect the *selected* style, so only an actually-selected
        // (clicked) variant gets a size list; sold-out variants carry none.
        let sizes = if announced.available {
            let fresh_panel = self.locate_panel(self.cfg.panel_poll_ms).await;
            match fresh_panel {
                Some(panel) => match locate_axis(&panel, SIZE_AXIS_LABELS).await {
                    Some(size_axis) => {
                        debug!(variant = %announced.name, phase = ?Phase::SizeAxisRelocated, "size axis relocated");
                        let sizes = extract_sizes(&size_axis).await;
                        debug!(
                            variant = %announced.name,
                            sizes = sizes.len(),
                            phase = ?Phase::SizesExtracted,
                            "sizes extracted"
                        );
                        sizes
                    }
                    None => {
                        warn!(variant = %announced.name, "size axis not found after click");
                        Vec::new()
                    }
                },
                None => {
                    warn!(variant = %announced.name, "option panel lost after click");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Some(StyleVariant {
            name: announced.name,
            image_url,
            image_url_original: None,
            available: announced.available,
            sizes,
            ocr: None,
        })
    }

    /// Bounded poll for the option panel over the ordered selector chain.
    async fn locate_panel(&self, wait_ms: u64) -> Option<R::Node> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);
        loop {
            for selector in SKU_CONTAINER_SELECTORS {
                if let Ok(Some(node)) = self.root.find(selector).await {
                    debug!(selector, "option panel located");
                    return Some(node);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(self.cfg.panel_poll_ms)).await;
        }
    }

    async fn main_image_url(&self) -> Option<String> {
        for selector in MAIN_IMAGE_SELECTORS {
            if let Ok(Some(node)) = self.root.find(selector).await {
                if let Ok(Some(src)) = node.attr("src").await {
                    if !src.is_empty() {
                        return Some(src);
                    }
                }
            }
        }
        None
    }

    /// Wait for the main image to move away from `before`. One settle delay
    /// plus a single retry window; never an unbounded block.
    async fn wait_for_image_change(&self, before: Option<&str>) -> Option<String> {
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_millis(self.cfg.image_settle_ms)).await;
            let current = self.main_image_url().await;
            match (&current, before) {
                (Some(now), Some(prev)) if now != prev => return current,
                (Some(_), None) => return current,
                _ => {}
            }
        }
        None
    }
}

/// Availability from the disabled-state attribute: absent, empty or an
/// explicit "false" means available; any other value conservatively reads as
/// sold out.
pub fn is_available(disabled_attr: Option<&str>) -> bool {
    matches!(disabled_attr.map(str::trim), None | Some("") | Some("false"))
}

/// Find the axis (`skuItem` block) whose label matches one of `labels`.
async fn locate_axis<N: DomNode>(panel: &N, labels: &[&str]) -> Option<N> {
    let items = panel.find_all(SKU_ITEM_SELECTOR).await.ok()?;
    for item in items {
        if let Some(label) = read_axis_label(&item).await {
            if labels.iter().any(|cand| label == *cand || label.contains(*cand)) {
                debug!(%label, "axis matched");
                return Some(item);
            }
        }
    }
    None
}

async fn read_axis_label<N: DomNode>(item: &N) -> Option<String> {
    if let Ok(Some(label_node)) = item.find(SKU_LABEL_SELECTOR).await {
        if let Ok(text) = label_node.text().await {
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    // Some layouts only carry the axis name in a titled span.
    if let Ok(Some(titled)) = item.find(SKU_TITLED_LABEL_SELECTOR).await {
        if let Ok(Some(title)) = titled.attr("title").await {
            if !title.trim().is_empty() {
                return Some(title.trim().to_string());
            }
        }
    }
    None
}

/// Value items of an axis, tolerating both nesting layouts.
async fn value_items<N: DomNode>(axis: &N) -> Vec<N> {
    let wrap = axis.find(SKU_VALUE_WRAP_SELECTOR).await.ok().flatten();
    let scope = wrap.as_ref().unwrap_or(axis);
    let content = scope.find(SKU_CONTENT_SELECTOR).await.ok().flatten();
    let scope = content.as_ref().unwrap_or(scope);

    let mut items = scope
        .find_all(SKU_VALUE_ITEM_SELECTOR)
        .await
        .unwrap_or_default();
    if items.is_empty() {
        items = scope
            .find_all(SKU_VALUE_ITEM_FALLBACK_SELECTOR)
            .await
            .unwrap_or_default();
    }
    items
}

async fn announce<N: DomNode>(item: &N, idx: usize) -> Announced {
    let available = is_available(
        item.attr(DISABLED_ATTR)
            .await
            .ok()
            .flatten()
            .as_deref(),
    );

    let mut name = String::new();
    if let Ok(Some(text_node)) = item.find(VALUE_ITEM_TEXT_SELECTOR).await {
        // Full name lives in the title attribute; rendered text may be
        // visually truncated.
        if let Ok(Some(title)) = text_node.attr("title").await {
            name = title.trim().to_string();
        }
        if name.is_empty() {
            name = text_node.text().await.unwrap_or_default();
        }
    }
    if name.is_empty() {
        name = item.text().await.unwrap_or_default();
    }
    if name.is_empty() {
        name = format!("Style_{}", idx + 1);
    }

    let thumb = match item.find(VALUE_ITEM_IMG_SELECTOR).await {
        Ok(Some(img)) => img.attr("src").await.ok().flatten().filter(|s| !s.is_empty()),
        _ => None,
    };

    Announced {
        name,
        thumb,
        available,
    }
}

/// Enumerate size options within the (already located) size axis, deduping
/// by name: first occurrence wins, later duplicates are logged and dropped.
async fn extract_sizes<N: DomNode>(size_axis: &N) -> Vec<SizeOption> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut sizes = Vec::new();

    for item in value_items(size_axis).await {
        let mut name = String::new();
        if let Ok(Some(text_node)) = item.find(VALUE_ITEM_TEXT_SELECTOR).await {
            if let Ok(Some(title)) = text_node.attr("title").await {
                name = title.trim().to_string();
            }
            if name.is_empty() {
                name = text_node.text().await.unwrap_or_default();
            }
        }
        if name.is_empty() {
            name = item.text().await.unwrap_or_default();
        }
        if name.is_empty() {
            continue;
        }

        if !seen.insert(name.clone()) {
            debug!(size = %name, "duplicate size name dropped");
            continue;
        }

        let available = is_available(
            item.attr(DISABLED_ATTR)
                .await
                .ok()
                .flatten()
                .as_deref(),
        );
        sizes.push(SizeOption { name, available });
    }

    sizes
}
