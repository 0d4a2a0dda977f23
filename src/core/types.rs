use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Product record: the one typed structure that crosses component boundaries.
// Everything the page may or may not expose is an Option or an empty Vec;
// absence is a valid state, never an error.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub title: String,
    pub url: String,
    pub shop: ShopProfile,
    #[serde(default)]
    pub shipping: ShippingProfile,
    #[serde(default)]
    pub price: PriceQuote,
    #[serde(default)]
    pub coupons: Vec<CouponOffer>,
    #[serde(default)]
    pub styles: Vec<StyleVariant>,
    #[serde(default)]
    pub details: ProductDetails,
}

/// One style/color variant of the product, in on-page display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleVariant {
    pub name: String,
    /// Representative image. Starts as the remote URL; after download the
    /// relocation step rewrites it to the local relative path and moves the
    /// URL into `image_url_original`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url_original: Option<String>,
    pub available: bool,
    #[serde(default)]
    pub sizes: Vec<SizeOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<OcrDocument>,
}

/// Size names are unique within their owning variant; the first occurrence
/// on the page wins and later duplicates are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeOption {
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopProfile {
    pub name: String,
    /// Absolute URL; protocol-relative hrefs are scheme-normalized to https.
    pub url: String,
    pub rating: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_review_rate: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceQuote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponOffer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub guarantees: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub user: String,
    /// Date / purchase-option line as rendered.
    pub meta: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Name/value pair from the parameter table. Kept as a Vec of pairs so the
/// on-page order survives serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(default)]
    pub reviews: Vec<ReviewEntry>,
    #[serde(default)]
    pub parameters: Vec<ProductParameter>,
    /// Raw markup snapshot of the parameter section, for selector maintenance.
    #[serde(default)]
    pub parameters_raw: String,
    /// Detail-section image references; rewritten to local paths after
    /// download, with the originals preserved alongside.
    #[serde(default)]
    pub detail_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail_images_original: Vec<String>,
    #[serde(default)]
    pub detail_images_raw: String,
    #[serde(default)]
    pub detail_images_ocr: Vec<OcrDocument>,
    /// Deduplicated, order-preserving OCR text across distinct style images.
    #[serde(default)]
    pub main_images_ocr_text: String,
    #[serde(default)]
    pub detail_images_ocr_text: String,
}

// ---------------------------------------------------------------------------
// OCR output shape, engine-agnostic (see ocr::RawRecognition for the raw
// engine shapes this is normalized from).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrDocument {
    /// URL or local path the recognition ran against.
    pub source: String,
    /// All recognized lines joined with newlines.
    pub full_text: String,
    #[serde(default)]
    pub lines: Vec<OcrLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    /// Quadrilateral bounding box, 4 corners in (x, y) order.
    pub quad: [[f32; 2]; 4],
}

// ---------------------------------------------------------------------------
// Download manifest: lets later phases (OCR, JSON emission) resolve an
// original URL to its local file without re-fetching.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageManifest {
    #[serde(default)]
    pub main: Vec<ManifestEntry>,
    #[serde(default)]
    pub detail: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// Path relative to the output folder.
    pub file: String,
    pub original_filename: String,
}

impl ImageManifest {
    /// Look up the local relative path for a source URL across both sections.
    pub fn local_file(&self, url: &str) -> Option<&str> {
        self.main
            .iter()
            .chain(self.detail.iter())
            .find(|e| e.url == url)
            .map(|e| e.file.as_str())
    }
}

/// Normalize a possibly protocol-relative or root-relative image/shop URL to
/// an absolute https URL.
pub fn normalize_url(raw: &str, host_base: &str) -> String {
    if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else if raw.starts_with('/') {
        format!("{}{}", host_base.trim_end_matches('/'), raw)
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_quote_with_only_coupon_price_is_valid() {
        // A page exposing only the post-coupon price is a normal state.
        let q = PriceQuote {
            coupon_price: Some("¥199".into()),
            original_price: None,
            sales: None,
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["coupon_price"], "¥199");
        assert!(json.get("original_price").is_none());

        let back: PriceQuote = serde_json::from_value(json).unwrap();
        assert_eq!(back.coupon_price.as_deref(), Some("¥199"));
        assert!(back.original_price.is_none());
    }

    #[test]
    fn normalize_url_handles_protocol_relative_and_rooted() {
        assert_eq!(
            normalize_url("//img.alicdn.com/a.jpg", "https://img.alicdn.com"),
            "https://img.alicdn.com/a.jpg"
        );
        assert_eq!(
            normalize_url("/bao/uploaded/x.png", "https://img.alicdn.com"),
            "https://img.alicdn.com/bao/uploaded/x.png"
        );
        assert_eq!(
            normalize_url("https://shop.example.com", "https://ignored"),
            "https://shop.example.com"
        );
    }

    #[test]
    fn manifest_lookup_spans_both_sections() {
        let m = ImageManifest {
            main: vec![ManifestEntry {
                url: "https://a/1.jpg".into(),
                file: "images/main/main_1_aabbccdd.jpg".into(),
                original_filename: "1.jpg".into(),
            }],
            detail: vec![ManifestEntry {
                url: "https://a/2.jpg".into(),
                file: "images/detail/detail_1_11223344.jpg".into(),
                original_filename: "2.jpg".into(),
            }],
        };
        assert_eq!(
            m.local_file("https://a/2.jpg"),
            Some("images/detail/detail_1_11223344.jpg")
        );
        assert!(m.local_file("https://a/3.jpg").is_none());
    }
}
