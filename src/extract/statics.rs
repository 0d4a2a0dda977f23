//! Static header fields: title, shop, shipping, price, coupons.
//!
//! All of these are best-effort reads over the field resolver; a missing
//! region leaves the matching record fields at their sentinels/None and the
//! scrape moves on.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::core::types::{normalize_url, CouponOffer, PriceQuote, ShippingProfile, ShopProfile};
use crate::dom::{DomNode, DomRoot};
use crate::extract::field::{
    first_integer, resolve_list, resolve_node, resolve_text, FieldSpec, FieldStrategy,
};
use crate::extract::selectors::{
    COUPON_AREA_SELECTOR, COUPON_TEXT_SELECTOR, COUPON_WRAP_SELECTOR, PRICE_HIGHLIGHT_SYMBOL,
    PRICE_HIGHLIGHT_VALUE, PRICE_SALES, PRICE_SUB_TEXTS, PRICE_WRAP, SHIPPING_ADDRESS,
    SHIPPING_CARD, SHIPPING_DELIVERY, SHIPPING_FREIGHT, SHIPPING_GUARANTEES,
    SHOP_HEADER, SHOP_LINK, SHOP_NAME, SHOP_RATING, SHOP_REVIEW_RATE_CANDIDATES, TITLE,
};

const UNKNOWN_SHOP: &str = "Unknown Shop";
const UNKNOWN_PRODUCT: &str = "Unknown Product";

/// Product title: titled main-title node, else the document title.
pub async fn extract_title<R: DomRoot>(root: &R) -> String {
    let title = super::field::resolve_text_on_root(root, &TITLE, "").await;
    if !title.is_empty() {
        return title;
    }
    match root.page_html().await {
        Ok(html) => title_from_page_html(&html).unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
        Err(_) => UNKNOWN_PRODUCT.to_string(),
    }
}

/// `<title>` content up to the first " - " separator (the storefront appends
/// its own suffix there).
pub fn title_from_page_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("title").ok()?;
    let raw: String = doc.select(&sel).next()?.text().collect();
    let cleaned = raw.split(" - ").next().unwrap_or(&raw).trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub async fn extract_shop<R: DomRoot>(root: &R) -> ShopProfile {
    let Some(header) = resolve_node(root, &SHOP_HEADER).await else {
        return ShopProfile {
            name: UNKNOWN_SHOP.to_string(),
            ..Default::default()
        };
    };

    let name = resolve_text(&header, &SHOP_NAME, UNKNOWN_SHOP).await;
    let raw_url = resolve_text(&header, &SHOP_LINK, "").await;
    let url = if raw_url.is_empty() {
        String::new()
    } else {
        normalize_url(&raw_url, "https://www.taobao.com")
    };
    let rating = resolve_text(&header, &SHOP_RATING, "").await;

    // The positive-review-rate line carries no stable class; scan the header
    // for the 好评率 marker instead.
    let mut good_review_rate = None;
    if let Ok(nodes) = header.find_all(SHOP_REVIEW_RATE_CANDIDATES).await {
        for node in nodes {
            if let Ok(text) = node.text().await {
                if text.contains("好评率") {
                    good_review_rate = Some(text);
                    break;
                }
            }
        }
    }

    debug!(shop = %name, "shop profile extracted");
    ShopProfile {
        name,
        url,
        rating,
        good_review_rate,
    }
}

pub async fn extract_shipping<R: DomRoot>(root: &R) -> ShippingProfile {
    let Some(card) = resolve_node(root, &SHIPPING_CARD).await else {
        return ShippingProfile::default();
    };

    let delivery = non_empty(resolve_text(&card, &SHIPPING_DELIVERY, "").await);
    let freight = non_empty(resolve_text(&card, &SHIPPING_FREIGHT, "").await);
    let delivery_address = non_empty(resolve_text(&card, &SHIPPING_ADDRESS, "").await);

    let guarantees = resolve_list(&card, &SHIPPING_GUARANTEES)
        .await
        .unwrap_or_default();

    ShippingProfile {
        delivery,
        freight,
        delivery_address,
        guarantees,
    }
}

pub async fn extract_price<R: DomRoot>(root: &R) -> PriceQuote {
    let Some(wrap) = resolve_node(root, &PRICE_WRAP).await else {
        return PriceQuote::default();
    };

    // Post-coupon price renders as currency symbol + number in the
    // highlighted block.
    let symbol = resolve_text(&wrap, &PRICE_HIGHLIGHT_SYMBOL, "").await;
    let value = resolve_text(&wrap, &PRICE_HIGHLIGHT_VALUE, "").await;
    let coupon_price = if !symbol.is_empty() && !value.is_empty() {
        Some(format!("{symbol}{value}"))
    } else {
        None
    };

    // Pre-discount price may be split across several text spans; join and
    // scan for the first currency amount.
    let mut joined = String::new();
    for strategy in PRICE_SUB_TEXTS.strategies {
        if let Ok(nodes) = wrap.find_all(strategy.selector).await {
            for node in nodes {
                if let Ok(text) = node.text().await {
                    joined.push_str(&text);
                }
            }
        }
    }
    let original_price = original_price_from(&joined);

    let sales = non_empty(
        resolve_text(&wrap, &PRICE_SALES, "")
            .await
            .replace('\n', " ")
            .trim()
            .to_string(),
    );
    if let Some(count) = sales.as_deref().and_then(first_integer) {
        debug!(sales_count = count, "sales figure parsed");
    }

    PriceQuote {
        coupon_price,
        original_price,
        sales,
    }
}

/// First `¥<amount>` in the joined sub-price text.
pub fn original_price_from(joined: &str) -> Option<String> {
    static PRICE_RE: OnceLock<Regex> = OnceLock::new();
    let re = PRICE_RE.get_or_init(|| {
        Regex::new(r"¥\s*(\d+(?:\.\d+)?)").expect("valid price pattern")
    });
    re.captures(joined)
        .map(|caps| format!("¥{}", &caps[1]))
}

pub async fn extract_coupons<R: DomRoot>(root: &R) -> Vec<CouponOffer> {
    const COUPON_AREA: FieldSpec = FieldSpec {
        name: "coupon_area",
        strategies: &[FieldStrategy::text(COUPON_AREA_SELECTOR)],
    };
    let Some(area) = resolve_node(root, &COUPON_AREA).await else {
        return Vec::new();
    };

    let mut coupons = Vec::new();
    if let Ok(wraps) = area.find_all(COUPON_WRAP_SELECTOR).await {
        for wrap in wraps {
            let Ok(Some(text_node)) = wrap.find(COUPON_TEXT_SELECTOR).await else {
                continue;
            };
            let title = text_node.attr("title").await.ok().flatten();
            let text = text_node.text().await.unwrap_or_default();
            if text.is_empty() && title.is_none() {
                continue;
            }
            coupons.push(CouponOffer { title, text });
        }
    }
    debug!(count = coupons.len(), "coupons extracted");
    coupons
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
