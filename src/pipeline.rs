//! Product record assembly.
//!
//! Drives the whole scrape in the fixed order: static fields → variant
//! machine → detail sections → image acquisition → OCR over local files →
//! fold-back → finalized record. Intermediate state accumulates in a private
//! builder; only the finished `ProductRecord` (plus the download manifest)
//! crosses the boundary.

use std::sync::Arc;

use tracing::{info, warn};

use crate::browser::{scroll_to_page_end, BrowserSession};
use crate::core::config::TaolensConfig;
use crate::core::types::{
    ImageManifest, OcrDocument, ProductDetails, ProductRecord, StyleVariant,
};
use crate::core::CollectFailure;
use crate::dom::DomRoot;
use crate::extract::{details, statics, VariantConfig, VariantMachine};
use crate::images::{BrowserTransport, ImageStore};
use crate::ocr::{dedup_concat, OcrCache, OcrsEngine, RecognitionEngine};
use crate::persist::OutputLayout;

pub struct ScrapeOutcome {
    pub record: ProductRecord,
    pub manifest: ImageManifest,
}

pub struct ProductAssembler<'a> {
    session: &'a BrowserSession,
    cfg: &'a TaolensConfig,
    ocr: OcrCache,
}

impl<'a> ProductAssembler<'a> {
    pub fn new(session: &'a BrowserSession, cfg: &'a TaolensConfig) -> Self {
        let ocr = if cfg.resolve_ocr_enabled() {
            let detection = cfg.resolve_detection_model();
            let recognition = cfg.resolve_recognition_model();
            OcrCache::new(move || {
                OcrsEngine::load(&detection, &recognition)
                    .map(|e| Arc::new(e) as Arc<dyn RecognitionEngine>)
            })
        } else {
            info!("OCR disabled by configuration");
            OcrCache::unavailable()
        };
        Self { session, cfg, ocr }
    }

    /// Scrape one product page into a typed record.
    ///
    /// Image files and the manifest are written under `layout` as they are
    /// acquired; the record itself is not persisted here.
    pub async fn scrape(
        &self,
        url: &str,
        layout: &OutputLayout,
    ) -> Result<ScrapeOutcome, CollectFailure> {
        self.session
            .goto(url, self.cfg.resolve_page_settle_ms())
            .await?;
        // The detail sections lazy-load on scroll.
        if let Err(e) = scroll_to_page_end(self.session.page()).await {
            warn!(error = %e, "pre-extraction scroll failed");
        }

        let dom = self.session.dom();
        let mut builder = RecordBuilder::new(url);

        // 1. Static header fields.
        builder.title = statics::extract_title(&dom).await;
        builder.shop = statics::extract_shop(&dom).await;
        builder.shipping = statics::extract_shipping(&dom).await;
        builder.price = statics::extract_price(&dom).await;
        builder.coupons = statics::extract_coupons(&dom).await;
        info!(title = %builder.title, "static fields extracted");

        // 2. Variant walk, the only step that can abort the scrape.
        let variant_cfg = VariantConfig {
            panel_wait_ms: self.cfg.resolve_panel_wait_ms(),
            image_settle_ms: self.cfg.resolve_image_settle_ms(),
            ..VariantConfig::default()
        };
        let machine = VariantMachine::new(&dom, &variant_cfg);
        builder.styles = match machine.run().await {
            Ok(styles) => styles,
            Err(CollectFailure::OptionPanelMissing { .. }) => {
                let snapshot = match dom.page_html().await {
                    Ok(html) => layout.write_debug_snapshot(&html).await.ok(),
                    Err(e) => {
                        warn!(error = %e, "could not capture page snapshot");
                        None
                    }
                };
                return Err(CollectFailure::OptionPanelMissing { snapshot });
            }
            Err(other) => return Err(other),
        };

        // 3. Detail sections.
        builder.details.reviews = details::extract_reviews(&dom).await;
        let (parameters, parameters_raw) = details::extract_parameters(&dom).await;
        builder.details.parameters = parameters;
        builder.details.parameters_raw = parameters_raw;
        let (gallery, gallery_raw) = details::extract_detail_gallery(&dom).await;
        builder.details.detail_images = gallery;
        builder.details.detail_images_raw = gallery_raw;

        // 4. Image acquisition (sequential; tiers share the browser session).
        let transport = BrowserTransport::new(self.session, url)?;
        let store = ImageStore::new(&transport, layout.root());

        let main_urls: Vec<String> = builder
            .styles
            .iter()
            .filter_map(|s| s.image_url.clone())
            .collect();
        let manifest = ImageManifest {
            main: store.download_set(&main_urls, "main").await,
            detail: store.download_set(&builder.details.detail_images, "detail").await,
        };

        // 5. OCR over local files only; never re-fetch.
        self.enrich_with_ocr(&mut builder, &manifest, layout).await;

        // 6. Controlled identity substitution: record both the original URL
        // and the local relocation for every downloaded image.
        relocate_images(&mut builder, &manifest);

        Ok(ScrapeOutcome {
            record: builder.finalize(),
            manifest,
        })
    }

    async fn enrich_with_ocr(
        &self,
        builder: &mut RecordBuilder,
        manifest: &ImageManifest,
        layout: &OutputLayout,
    ) {
        // Style main images.
        for style in &mut builder.styles {
            let Some(url) = style.image_url.as_deref() else {
                continue;
            };
            let Some(local) = manifest.local_file(url) else {
                continue;
            };
            let path = layout.resolve(local);
            if let Some(mut doc) = self.ocr.recognize_file(&path).await {
                // The document keys on the local file; report the source URL
                // the record already speaks in.
                doc.source = url.to_string();
                style.ocr = Some(doc);
            }
        }
        let main_texts: Vec<&str> = builder
            .styles
            .iter()
            .filter_map(|s| s.ocr.as_ref())
            .map(|d| d.full_text.as_str())
            .collect();
        builder.details.main_images_ocr_text = dedup_concat(main_texts);

        // Detail gallery images.
        let mut detail_docs: Vec<OcrDocument> = Vec::new();
        for url in &builder.details.detail_images {
            let Some(local) = manifest.local_file(url) else {
                continue;
            };
            let path = layout.resolve(local);
            if let Some(mut doc) = self.ocr.recognize_file(&path).await {
                doc.source = url.clone();
                detail_docs.push(doc);
            }
        }
        builder.details.detail_images_ocr_text =
            dedup_concat(detail_docs.iter().map(|d| d.full_text.as_str()));
        builder.details.detail_images_ocr = detail_docs;

        info!(
            main_docs = builder.styles.iter().filter(|s| s.ocr.is_some()).count(),
            detail_docs = builder.details.detail_images_ocr.len(),
            "ocr enrichment complete"
        );
    }
}

/// Rewrite downloaded image references to their local relative paths while
/// preserving the originals.
fn relocate_images(builder: &mut RecordBuilder, manifest: &ImageManifest) {
    for style in &mut builder.styles {
        if let Some(url) = style.image_url.clone() {
            if let Some(local) = manifest.local_file(&url) {
                style.image_url_original = Some(url);
                style.image_url = Some(local.to_string());
            }
        }
    }

    if !builder.details.detail_images.is_empty() {
        let originals = builder.details.detail_images.clone();
        builder.details.detail_images = originals
            .iter()
            .map(|url| {
                manifest
                    .local_file(url)
                    .map(str::to_string)
                    .unwrap_or_else(|| url.clone())
            })
            .collect();
        builder.details.detail_images_original = originals;
    }
}

// ── Private builder ──────────────────────────────────────────────────────────

/// Loose accumulation of extractor output; becomes a `ProductRecord` only
/// through `finalize`.
struct RecordBuilder {
    url: String,
    title: String,
    shop: crate::core::types::ShopProfile,
    shipping: crate::core::types::ShippingProfile,
    price: crate::core::types::PriceQuote,
    coupons: Vec<crate::core::types::CouponOffer>,
    styles: Vec<StyleVariant>,
    details: ProductDetails,
}

impl RecordBuilder {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            shop: Default::default(),
            shipping: Default::default(),
            price: Default::default(),
            coupons: Vec::new(),
            styles: Vec::new(),
            details: ProductDetails::default(),
        }
    }

    fn finalize(self) -> ProductRecord {
        ProductRecord {
            title: self.title,
            url: self.url,
            shop: self.shop,
            shipping: self.shipping,
            price: self.price,
            coupons: self.coupons,
            styles: self.styles,
            details: self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ManifestEntry, ShopProfile};

    fn manifest_with(url: &str, file: &str) -> ImageManifest {
        ImageManifest {
            main: vec![ManifestEntry {
                url: url.into(),
                file: file.into(),
                original_filename: "a.jpg".into(),
            }],
            detail: vec![],
        }
    }

    #[test]
    fn relocation_preserves_the_original_url() {
        let mut builder = RecordBuilder::new("https://item/1");
        builder.shop = ShopProfile::default();
        builder.styles = vec![StyleVariant {
            name: "红".into(),
            image_url: Some("https://img/a.jpg".into()),
            image_url_original: None,
            available: true,
            sizes: vec![],
            ocr: None,
        }];
        let manifest = manifest_with("https://img/a.jpg", "images/main/main_1_ff00aa11.jpg");

        relocate_images(&mut builder, &manifest);
        let style = &builder.styles[0];
        assert_eq!(style.image_url.as_deref(), Some("images/main/main_1_ff00aa11.jpg"));
        assert_eq!(style.image_url_original.as_deref(), Some("https://img/a.jpg"));
    }

    #[test]
    fn undownloaded_images_keep_their_urls() {
        let mut builder = RecordBuilder::new("https://item/1");
        builder.details.detail_images = vec![
            "https://img/ok.jpg".into(),
            "https://img/missing.jpg".into(),
        ];
        let manifest = ImageManifest {
            main: vec![],
            detail: vec![ManifestEntry {
                url: "https://img/ok.jpg".into(),
                file: "images/detail/detail_1_bb.jpg".into(),
                original_filename: "ok.jpg".into(),
            }],
        };

        relocate_images(&mut builder, &manifest);
        assert_eq!(
            builder.details.detail_images,
            vec![
                "images/detail/detail_1_bb.jpg".to_string(),
                "https://img/missing.jpg".to_string(),
            ]
        );
        assert_eq!(builder.details.detail_images_original.len(), 2);
    }
}
