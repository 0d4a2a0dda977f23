//! Detail-section extraction: reviews, the parameter table, and the
//! picture-and-text gallery.
//!
//! The gallery images are mined from a captured markup snapshot rather than
//! by walking the live DOM image-by-image; the snapshot doubles as the raw
//! diagnostic artifact that gets persisted alongside the record.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::core::types::{normalize_url, ProductParameter, ReviewEntry};
use crate::dom::{DomNode, DomRoot};
use crate::extract::field::{resolve_text, FieldSpec, FieldStrategy};
use crate::extract::selectors::{
    DETAIL_CONTAINER_SELECTOR, DETAIL_DESC_ROOT_SELECTOR, DETAIL_GALLERY_TAB_LABEL,
    DETAIL_IMAGE_HOST_BASE, DETAIL_IMAGE_SELECTORS, PARAMS_AREA_SELECTOR,
    PARAM_EMPHASIS_ITEM_SELECTOR, PARAM_GENERAL_ITEM_SELECTOR, PARAM_SPAN_FALLBACK_SELECTOR,
    PARAM_SUBTITLE_SELECTORS, PARAM_TITLE_SELECTORS, PLACEHOLDER_IMAGE_MARKER,
    REVIEW_CONTENT, REVIEW_META, REVIEW_PHOTO_SELECTOR, REVIEW_SELECTOR, REVIEW_USER,
    TAB_DETAIL_TITLE_SELECTOR, TAB_SELECTOR,
};

/// Reviews are bounded to the first few entries on the page.
pub const REVIEW_LIMIT: usize = 5;

pub async fn extract_reviews<R: DomRoot>(root: &R) -> Vec<ReviewEntry> {
    const DETAIL_CONTAINER: FieldSpec = FieldSpec {
        name: "detail_container",
        strategies: &[FieldStrategy::text(DETAIL_CONTAINER_SELECTOR)],
    };
    let Some(container) = super::field::resolve_node(root, &DETAIL_CONTAINER).await else {
        return Vec::new();
    };

    let mut reviews = Vec::new();
    let nodes = container.find_all(REVIEW_SELECTOR).await.unwrap_or_default();
    for node in nodes.into_iter().take(REVIEW_LIMIT) {
        let user = resolve_text(&node, &REVIEW_USER, "Anonymous").await;
        let meta = resolve_text(&node, &REVIEW_META, "").await;
        let content = resolve_text(&node, &REVIEW_CONTENT, "").await;

        let mut images = Vec::new();
        if let Ok(imgs) = node.find_all(REVIEW_PHOTO_SELECTOR).await {
            for img in imgs {
                if let Ok(Some(src)) = img.attr("src").await {
                    if !src.is_empty() {
                        images.push(src);
                    }
                }
            }
        }

        reviews.push(ReviewEntry {
            user,
            meta,
            content,
            images,
        });
    }
    debug!(count = reviews.len(), "reviews extracted");
    reviews
}

/// Parameter table plus its raw markup snapshot.
pub async fn extract_parameters<R: DomRoot>(root: &R) -> (Vec<ProductParameter>, String) {
    let mut raw = String::new();
    let mut items: Vec<(R::Node, bool)> = Vec::new(); // (node, is_emphasis)

    if let Ok(Some(area)) = root.find(PARAMS_AREA_SELECTOR).await {
        raw = area.outer_html().await.unwrap_or_default();
        collect_param_items(&area, &mut items).await;
    }

    // The params block sometimes only exists inside a titled tab.
    if items.is_empty() {
        if let Ok(tabs) = root.find_all(TAB_SELECTOR).await {
            for tab in tabs {
                let label = tab.text().await.unwrap_or_default();
                if label.contains("产品参数") || label.contains("参数信息") {
                    raw = tab.outer_html().await.unwrap_or_default();
                    collect_param_items(&tab, &mut items).await;
                    break;
                }
            }
        }
    }

    // Last resort: page-wide item search.
    if items.is_empty() {
        for (selector, emphasis) in [
            (PARAM_EMPHASIS_ITEM_SELECTOR, true),
            (PARAM_GENERAL_ITEM_SELECTOR, false),
        ] {
            if let Ok(found) = root.find_all(selector).await {
                for node in found {
                    if let Ok(html) = node.outer_html().await {
                        raw.push_str(&html);
                        raw.push('\n');
                    }
                    items.push((node, emphasis));
                }
            }
        }
    }

    let mut parameters = Vec::new();
    for (item, is_emphasis) in &items {
        if let Some(param) = read_param(item, *is_emphasis).await {
            parameters.push(param);
        }
    }

    if parameters.is_empty() {
        warn!("no product parameters found");
    } else {
        debug!(count = parameters.len(), "parameters extracted");
    }
    (parameters, raw)
}

async fn collect_param_items<N: DomNode>(scope: &N, items: &mut Vec<(N, bool)>) {
    if let Ok(found) = scope.find_all(PARAM_EMPHASIS_ITEM_SELECTOR).await {
        items.extend(found.into_iter().map(|n| (n, true)));
    }
    if let Ok(found) = scope.find_all(PARAM_GENERAL_ITEM_SELECTOR).await {
        items.extend(found.into_iter().map(|n| (n, false)));
    }
}

async fn read_param<N: DomNode>(item: &N, is_emphasis: bool) -> Option<ProductParameter> {
    let mut title_text = String::new();
    let mut subtitle_text = String::new();

    for (title_sel, subtitle_sel) in PARAM_TITLE_SELECTORS.iter().zip(PARAM_SUBTITLE_SELECTORS) {
        let title_node = item.find(title_sel).await.ok().flatten();
        let subtitle_node = item.find(subtitle_sel).await.ok().flatten();
        if let (Some(t), Some(s)) = (title_node, subtitle_node) {
            title_text = titled_text(&t).await;
            subtitle_text = titled_text(&s).await;
            break;
        }
    }

    // Unclassed layout: first two spans are label and value.
    if title_text.is_empty() || subtitle_text.is_empty() {
        let spans = item
            .find_all(PARAM_SPAN_FALLBACK_SELECTOR)
            .await
            .unwrap_or_default();
        if spans.len() >= 2 {
            title_text = titled_text(&spans[0]).await;
            subtitle_text = titled_text(&spans[1]).await;
        }
    }

    pair_param(&title_text, &subtitle_text, is_emphasis)
}

async fn titled_text<N: DomNode>(node: &N) -> String {
    if let Ok(Some(title)) = node.attr("title").await {
        let title = title.trim().to_string();
        if !title.is_empty() {
            return title;
        }
    }
    node.text().await.unwrap_or_default()
}

/// Zip a title/value pair into a parameter. Emphasis cards render the value
/// first and the label second, so the pair is swapped there; when one side
/// is empty the orientation flips as a fallback.
pub fn pair_param(title_text: &str, subtitle_text: &str, is_emphasis: bool) -> Option<ProductParameter> {
    let title_text = title_text.trim();
    let subtitle_text = subtitle_text.trim();

    let (mut name, mut value) = if is_emphasis {
        (subtitle_text, title_text)
    } else {
        (title_text, subtitle_text)
    };

    if (name.is_empty() || value.is_empty()) && !title_text.is_empty() && !subtitle_text.is_empty() {
        std::mem::swap(&mut name, &mut value);
    }

    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some(ProductParameter {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Locate the picture-and-text gallery tab and capture its markup. Image
/// URLs are mined from the captured fragment afterwards.
pub async fn extract_detail_gallery<R: DomRoot>(root: &R) -> (Vec<String>, String) {
    let mut raw = String::new();

    if let Ok(tabs) = root.find_all(TAB_SELECTOR).await {
        for tab in tabs {
            let mut matched = false;
            if let Ok(titles) = tab.find_all(TAB_DETAIL_TITLE_SELECTOR).await {
                for title in titles {
                    if let Ok(text) = title.text().await {
                        if text.contains(DETAIL_GALLERY_TAB_LABEL) {
                            matched = true;
                            break;
                        }
                    }
                }
            }
            // Some layouts drop the dedicated title node; fall back to the
            // tab's own text.
            if !matched {
                if let Ok(text) = tab.text().await {
                    matched = text.contains(DETAIL_GALLERY_TAB_LABEL);
                }
            }
            if matched {
                raw = tab.outer_html().await.unwrap_or_default();
                break;
            }
        }
    }

    if raw.is_empty() {
        warn!("picture-and-text gallery tab not found");
        return (Vec::new(), raw);
    }

    let images = collect_detail_images(&raw);
    debug!(count = images.len(), "gallery images collected");
    (images, raw)
}

/// Mine gallery image URLs out of a captured markup fragment.
///
/// Prefers `data-src` (lazy-loaded real source) over `src`, drops the 1px
/// placeholder spacer unless it resolves through `data-src`, normalizes
/// protocol-relative and rooted URLs, and dedupes preserving order.
pub fn collect_detail_images(raw_html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(raw_html);

    let scope_sel = match Selector::parse(DETAIL_DESC_ROOT_SELECTOR) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let scope: Option<ElementRef<'_>> = fragment.select(&scope_sel).next();

    let mut out: Vec<String> = Vec::new();
    for selector_str in DETAIL_IMAGE_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let matches: Vec<ElementRef<'_>> = match scope {
            Some(s) => s.select(&selector).collect(),
            None => fragment.select(&selector).collect(),
        };
        for img in matches {
            let data_src = img.value().attr("data-src");
            let src = img.value().attr("src");
            let mut chosen = data_src.or(src).unwrap_or_default().to_string();
            if chosen.is_empty() {
                continue;
            }
            if chosen.contains(PLACEHOLDER_IMAGE_MARKER) {
                match data_src {
                    Some(real) if !real.contains(PLACEHOLDER_IMAGE_MARKER) => {
                        chosen = real.to_string();
                    }
                    _ => continue,
                }
            }
            let normalized = normalize_url(&chosen, DETAIL_IMAGE_HOST_BASE);
            if !out.contains(&normalized) {
                out.push(normalized);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gallery_images_are_mined_normalized_and_deduped() {
        let raw = r#"
        <div data-tabindex="2">
          <div class="desc-root--Xk12">
            <img class="descV8-singleImage-image" src="//img.alicdn.com/a.jpg">
            <img class="descV8-singleImage-image" src="/bao/uploaded/b.png">
            <img class="lazyload" src="https://g.alicdn.com/s.gif" data-src="//img.alicdn.com/c.jpg">
            <img class="lazyload" src="https://g.alicdn.com/s.gif">
            <img src="https://img.alicdn.com/a.jpg">
          </div>
        </div>"#;

        let images = collect_detail_images(raw);
        assert_eq!(
            images,
            vec![
                "https://img.alicdn.com/a.jpg".to_string(),
                "https://img.alicdn.com/bao/uploaded/b.png".to_string(),
                "https://img.alicdn.com/c.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn gallery_mining_without_desc_root_scans_whole_fragment() {
        let raw = r#"<div><img data-src="//img.alicdn.com/x.jpg" src="https://g.alicdn.com/s.gif"></div>"#;
        assert_eq!(
            collect_detail_images(raw),
            vec!["https://img.alicdn.com/x.jpg".to_string()]
        );
    }

    #[test]
    fn emphasis_param_pair_swaps_value_and_label() {
        // Emphasis cards show the value big, label small underneath.
        let p = pair_param("纯棉", "材质", true).unwrap();
        assert_eq!(p.name, "材质");
        assert_eq!(p.value, "纯棉");

        let p = pair_param("品牌", "某品牌", false).unwrap();
        assert_eq!(p.name, "品牌");
        assert_eq!(p.value, "某品牌");
    }

    #[test]
    fn half_empty_param_pair_is_dropped() {
        assert!(pair_param("材质", "", false).is_none());
        assert!(pair_param("", "", true).is_none());
    }
}
