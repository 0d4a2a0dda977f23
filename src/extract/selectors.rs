//! Selector strategy tables.
//!
//! The storefront ships auto-generated hashed class names
//! (`valueItem--smR4pNt4` and friends), so everything here matches on stable
//! class-name *fragments* and keeps an ordered fallback chain per region.
//! When the site reshuffles, this file is the single place to maintain.

use super::field::{FieldSpec, FieldStrategy};

// ── Option panel (SKU container) ─────────────────────────────────────────────

/// Ordered container candidates; the first match wins. Failing all of these
/// is the one fatal condition of a scrape.
pub const SKU_CONTAINER_SELECTORS: &[&str] = &[
    r#"div[class*="skuWrapper"]"#,
    r#"div[class*="sku"]"#,
    r#"div[class*="Sku"]"#,
    ".tb-sku",
    ".sku-inner",
];

pub const SKU_ITEM_SELECTOR: &str = r#"[class*="skuItem"]"#;
pub const SKU_LABEL_SELECTOR: &str = r#"[class*="labelWrap"]"#;
pub const SKU_TITLED_LABEL_SELECTOR: &str = "span[title]";
pub const SKU_VALUE_WRAP_SELECTOR: &str = r#"[class*="skuValueWrap"]"#;
pub const SKU_CONTENT_SELECTOR: &str = r#"[class*="content"]"#;
pub const SKU_VALUE_ITEM_SELECTOR: &str = r#"div[class*="valueItem"]"#;
/// Descendant fallback when the direct-child read returns nothing.
pub const SKU_VALUE_ITEM_FALLBACK_SELECTOR: &str = r#"[class*="valueItem"]"#;
pub const VALUE_ITEM_TEXT_SELECTOR: &str = r#"span[class*="valueItemText"]"#;
pub const VALUE_ITEM_IMG_SELECTOR: &str = r#"img[class*="valueItemImg"]"#;

/// The style/color axis is not uniformly named across product categories;
/// any of these label strings identifies it.
pub const STYLE_AXIS_LABELS: &[&str] = &["颜色分类", "颜色", "口味", "款式", "风格", "规格"];

pub const SIZE_AXIS_LABELS: &[&str] = &["尺码", "尺寸", "Size"];

/// Disabled-state attribute on value items. Absent / empty / "false" means
/// available; any other value conservatively reads as sold out.
pub const DISABLED_ATTR: &str = "data-disabled";

// ── Main product image ───────────────────────────────────────────────────────

pub const MAIN_IMAGE_SELECTORS: &[&str] = &[
    "#mainPicImageEl",
    r#"[id*="mainPic"]"#,
    r#"img[class*="mainPic"]"#,
    ".pic-view img",
    r#"[class*="pic--"] img"#,
    r#"[class*="image--"] img"#,
];

// ── Static header fields ─────────────────────────────────────────────────────

pub const TITLE: FieldSpec = FieldSpec {
    name: "title",
    strategies: &[
        FieldStrategy::titled(r#"[class*="mainTitle--"]"#),
        FieldStrategy::titled(r#"[class*="mainTitle"]"#),
    ],
};

pub const SHOP_HEADER: FieldSpec = FieldSpec {
    name: "shop_header",
    strategies: &[FieldStrategy::text(r#"[class*="shopHeader--"]"#)],
};

pub const SHOP_NAME: FieldSpec = FieldSpec {
    name: "shop_name",
    strategies: &[FieldStrategy::titled(r#"[class*="shopName--"]"#)],
};

pub const SHOP_LINK: FieldSpec = FieldSpec {
    name: "shop_url",
    strategies: &[FieldStrategy::attr(r#"a[href*="shop"]"#, "href")],
};

pub const SHOP_RATING: FieldSpec = FieldSpec {
    name: "shop_rating",
    strategies: &[FieldStrategy::text(r#"[class*="starNum--"]"#)],
};

/// Candidate nodes scanned for the 好评率 (positive-review-rate) line.
pub const SHOP_REVIEW_RATE_CANDIDATES: &str = "span, div";

// ── Shipping card ────────────────────────────────────────────────────────────

pub const SHIPPING_CARD: FieldSpec = FieldSpec {
    name: "shipping_card",
    strategies: &[FieldStrategy::text(r#"[class*="SecondCard--"]"#)],
};

pub const SHIPPING_DELIVERY: FieldSpec = FieldSpec {
    name: "shipping_delivery",
    strategies: &[FieldStrategy::text(
        r#"[class*="DomesticDelivery--"] [class*="shipping--"]"#,
    )],
};

pub const SHIPPING_FREIGHT: FieldSpec = FieldSpec {
    name: "shipping_freight",
    strategies: &[FieldStrategy::text(
        r#"[class*="DomesticDelivery--"] [class*="freight--"]"#,
    )],
};

pub const SHIPPING_ADDRESS: FieldSpec = FieldSpec {
    name: "shipping_address",
    strategies: &[FieldStrategy::text(
        r#"[class*="deliveryAddrWrap--"] span"#,
    )],
};

pub const SHIPPING_GUARANTEES: FieldSpec = FieldSpec {
    name: "shipping_guarantees",
    strategies: &[FieldStrategy::text(
        r#"[class*="GuaranteeInfo--"] [class*="guaranteeText--"]"#,
    )],
};

// ── Price block ──────────────────────────────────────────────────────────────

pub const PRICE_WRAP: FieldSpec = FieldSpec {
    name: "price_wrap",
    strategies: &[FieldStrategy::text(r#"[class*="priceWrap--"]"#)],
};

pub const PRICE_HIGHLIGHT_SYMBOL: FieldSpec = FieldSpec {
    name: "price_symbol",
    strategies: &[FieldStrategy::text(
        r#"[class*="highlightPrice--"] [class*="symbol--"]"#,
    )],
};

pub const PRICE_HIGHLIGHT_VALUE: FieldSpec = FieldSpec {
    name: "price_value",
    strategies: &[FieldStrategy::text(
        r#"[class*="highlightPrice--"] [class*="text--"]"#,
    )],
};

pub const PRICE_SUB_TEXTS: FieldSpec = FieldSpec {
    name: "price_original",
    strategies: &[FieldStrategy::text(r#"[class*="subPrice--"] [class*="text--"]"#)],
};

pub const PRICE_SALES: FieldSpec = FieldSpec {
    name: "price_sales",
    strategies: &[FieldStrategy::text(r#"[class*="salesDesc--"]"#)],
};

// ── Coupons ──────────────────────────────────────────────────────────────────

pub const COUPON_AREA_SELECTOR: &str = r#"[class*="couponInfoArea--"]"#;
pub const COUPON_WRAP_SELECTOR: &str = r#"[class*="couponWrap--"]"#;
pub const COUPON_TEXT_SELECTOR: &str = r#"[class*="couponText--"]"#;

// ── Detail section: reviews / parameters / gallery ───────────────────────────

pub const DETAIL_CONTAINER_SELECTOR: &str = r#"[class*="detailInfo"]"#;

pub const REVIEW_SELECTOR: &str = r#"[class*="Comment--"]"#;

pub const REVIEW_USER: FieldSpec = FieldSpec {
    name: "review_user",
    strategies: &[FieldStrategy::text(r#"[class*="userName--"]"#)],
};

pub const REVIEW_META: FieldSpec = FieldSpec {
    name: "review_meta",
    strategies: &[FieldStrategy::text(r#"[class*="meta--"]"#)],
};

pub const REVIEW_CONTENT: FieldSpec = FieldSpec {
    name: "review_content",
    strategies: &[FieldStrategy::titled(r#"[class*="content--"]"#)],
};

pub const REVIEW_PHOTO_SELECTOR: &str = r#"[class*="photo--"] img"#;

pub const PARAMS_AREA_SELECTOR: &str = r#"[class*="paramsInfoArea"]"#;
pub const PARAM_EMPHASIS_ITEM_SELECTOR: &str = r#"[class*="emphasisParamsInfoItem--"]"#;
pub const PARAM_GENERAL_ITEM_SELECTOR: &str = r#"[class*="generalParamsInfoItem--"]"#;
/// Title/value patterns tried per parameter item, in order.
pub const PARAM_TITLE_SELECTORS: &[&str] =
    &[r#"[class*="ItemTitle--"]"#, r#"[class*="InfoItemTitle--"]"#];
pub const PARAM_SUBTITLE_SELECTORS: &[&str] = &[
    r#"[class*="ItemSubTitle--"]"#,
    r#"[class*="InfoItemSubTitle--"]"#,
];
pub const PARAM_SPAN_FALLBACK_SELECTOR: &str = "span";

pub const TAB_SELECTOR: &str = "[data-tabindex]";
pub const TAB_DETAIL_TITLE_SELECTOR: &str = r#"[class*="tabDetailItemTitle"]"#;
/// Tab label identifying the picture-and-text detail gallery.
pub const DETAIL_GALLERY_TAB_LABEL: &str = "图文详情";
pub const DETAIL_DESC_ROOT_SELECTOR: &str = r#"[class*="desc-root"]"#;

/// Image candidates inside the gallery markup; evaluated over the captured
/// fragment, not the live DOM.
pub const DETAIL_IMAGE_SELECTORS: &[&str] = &[
    r#"img[class*="descV8-singleImage-image"]"#,
    ".descV8-singleImage-image",
    r#"img[class*="lazyload"]"#,
    "img[data-src]",
    r#"img[src*="alicdn.com"]"#,
];

/// Known 1px spacer the gallery lazy-loader leaves behind.
pub const PLACEHOLDER_IMAGE_MARKER: &str = "g.alicdn.com/s.gif";

/// Base host for root-relative gallery image paths.
pub const DETAIL_IMAGE_HOST_BASE: &str = "https://img.alicdn.com";
