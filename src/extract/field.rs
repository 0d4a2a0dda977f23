//! Resilient field extraction: try an ordered list of strategies, take the
//! first that produces a value, fall back to a caller-supplied sentinel.
//!
//! This is the one primitive every field on the page goes through. A failed
//! field never aborts the scrape; the only trace a miss leaves is a tracing
//! event carrying the field name, which is deliberate: selector drift on a
//! hashed-class-name site is routine, and the log is where it shows up.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, warn};

use crate::dom::{DomNode, DomRoot};

/// Where a strategy takes its value from once the selector matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Prefer the `title` attribute, fall back to visible text. The title
    /// attribute carries the full string where the rendering may be
    /// truncated or empty.
    PreferTitleAttr,
    /// Visible text only.
    TextOnly,
    /// A specific attribute (e.g. `src`, `href`).
    Attr(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldStrategy {
    pub selector: &'static str,
    pub source: ValueSource,
}

impl FieldStrategy {
    pub const fn text(selector: &'static str) -> Self {
        Self {
            selector,
            source: ValueSource::TextOnly,
        }
    }

    pub const fn titled(selector: &'static str) -> Self {
        Self {
            selector,
            source: ValueSource::PreferTitleAttr,
        }
    }

    pub const fn attr(selector: &'static str, name: &'static str) -> Self {
        Self {
            selector,
            source: ValueSource::Attr(name),
        }
    }
}

/// A named field with its ordered fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub strategies: &'static [FieldStrategy],
}

/// Read a strategy's value out of an already-matched node.
async fn read_value<N: DomNode>(node: &N, source: ValueSource) -> Option<String> {
    let value = match source {
        ValueSource::PreferTitleAttr => {
            let titled = node.attr("title").await.ok().flatten();
            match titled.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
                Some(t) => Some(t),
                None => node.text().await.ok(),
            }
        }
        ValueSource::TextOnly => node.text().await.ok(),
        ValueSource::Attr(name) => node.attr(name).await.ok().flatten(),
    };
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Resolve a text field within `scope`. Returns the sentinel when every
/// strategy comes up empty.
pub async fn resolve_text<N: DomNode>(scope: &N, spec: &FieldSpec, sentinel: &str) -> String {
    for (i, strategy) in spec.strategies.iter().enumerate() {
        let Ok(Some(node)) = scope.find(strategy.selector).await else {
            continue;
        };
        if let Some(value) = read_value(&node, strategy.source).await {
            debug!(field = spec.name, strategy = i, "field resolved");
            return value;
        }
    }
    warn!(field = spec.name, "all extraction strategies failed");
    sentinel.to_string()
}

/// Same as [`resolve_text`] but scoped to the page root.
pub async fn resolve_text_on_root<R: DomRoot>(root: &R, spec: &FieldSpec, sentinel: &str) -> String {
    for (i, strategy) in spec.strategies.iter().enumerate() {
        let Ok(Some(node)) = root.find(strategy.selector).await else {
            continue;
        };
        if let Some(value) = read_value(&node, strategy.source).await {
            debug!(field = spec.name, strategy = i, "field resolved");
            return value;
        }
    }
    warn!(field = spec.name, "all extraction strategies failed");
    sentinel.to_string()
}

/// Resolve the first node (not value) a strategy chain can locate; used when
/// the caller needs to keep reading inside the matched region.
pub async fn resolve_node<R: DomRoot>(root: &R, spec: &FieldSpec) -> Option<R::Node> {
    for (i, strategy) in spec.strategies.iter().enumerate() {
        if let Ok(Some(node)) = root.find(strategy.selector).await {
            debug!(field = spec.name, strategy = i, "region located");
            return Some(node);
        }
    }
    warn!(field = spec.name, "region not found by any strategy");
    None
}

/// Collect values from every match of every strategy, deduplicated,
/// preserving first-seen order.
pub async fn resolve_list<N: DomNode>(scope: &N, spec: &FieldSpec) -> Result<Vec<String>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for strategy in spec.strategies {
        for node in scope.find_all(strategy.selector).await? {
            if let Some(value) = read_value(&node, strategy.source).await {
                if seen.insert(value.clone()) {
                    out.push(value);
                }
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    if out.is_empty() {
        warn!(field = spec.name, "list field resolved empty");
    }
    Ok(out)
}

/// First integer anywhere in `text`, as the numeric sub-field rule: scan for
/// the first run of digits, fall back to the raw text when none is present.
pub fn first_integer(text: &str) -> Option<i64> {
    static INT_RE: OnceLock<Regex> = OnceLock::new();
    let re = INT_RE.get_or_init(|| Regex::new(r"\d+").expect("valid integer pattern"));
    re.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Numeric sub-field resolution: integer when one is present, raw text
/// otherwise.
pub fn integer_or_raw(text: &str) -> std::result::Result<i64, String> {
    first_integer(text).ok_or_else(|| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fake::{FakeAxis, FakeItem, FakePage, PageState};
    use crate::extract::selectors;

    fn page_with_style_axis() -> FakePage {
        FakePage::new(PageState {
            has_container: true,
            axes: vec![FakeAxis {
                label: "颜色分类".into(),
                items: vec![FakeItem::named("藏蓝色 加绒")],
            }],
            main_image: Some("https://img.example/main.jpg".into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn sentinel_returned_when_every_strategy_misses() {
        let page = page_with_style_axis();
        const MISSING: FieldSpec = FieldSpec {
            name: "nonexistent",
            strategies: &[
                FieldStrategy::text(".does-not-exist"),
                FieldStrategy::titled(".also-missing"),
            ],
        };
        let got = resolve_text_on_root(&page, &MISSING, "N/A").await;
        assert_eq!(got, "N/A");
    }

    #[tokio::test]
    async fn repeated_resolution_is_idempotent_on_unchanged_dom() {
        let page = page_with_style_axis();
        const SPEC: FieldSpec = FieldSpec {
            name: "main_image",
            strategies: &[FieldStrategy::attr(selectors::MAIN_IMAGE_SELECTORS[0], "src")],
        };
        let spec = SPEC;
        let first = resolve_text_on_root(&page, &spec, "").await;
        let second = resolve_text_on_root(&page, &spec, "").await;
        assert_eq!(first, "https://img.example/main.jpg");
        assert_eq!(first, second);
        assert_eq!(page.generation(), 0, "resolution must not mutate the page");
    }

    #[tokio::test]
    async fn title_attribute_preferred_over_rendered_text() {
        let page = FakePage::new(PageState {
            has_container: true,
            axes: vec![FakeAxis {
                label: "颜色".into(),
                items: vec![FakeItem {
                    text: "藏蓝色 加…".into(), // visually truncated
                    title_attr: Some("藏蓝色 加绒加厚".into()),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        });
        let container = page
            .find(selectors::SKU_CONTAINER_SELECTORS[0])
            .await
            .unwrap()
            .unwrap();
        let axis = container
            .find_all(selectors::SKU_ITEM_SELECTOR)
            .await
            .unwrap()
            .remove(0);
        let wrap = axis
            .find(selectors::SKU_VALUE_WRAP_SELECTOR)
            .await
            .unwrap()
            .unwrap();
        let content = wrap
            .find(selectors::SKU_CONTENT_SELECTOR)
            .await
            .unwrap()
            .unwrap();
        let item = content
            .find_all(selectors::SKU_VALUE_ITEM_SELECTOR)
            .await
            .unwrap()
            .remove(0);

        const SPEC: FieldSpec = FieldSpec {
            name: "style_name",
            strategies: &[FieldStrategy::titled(selectors::VALUE_ITEM_TEXT_SELECTOR)],
        };
        let spec = SPEC;
        let got = resolve_text(&item, &spec, "N/A").await;
        assert_eq!(got, "藏蓝色 加绒加厚");
    }

    #[test]
    fn first_integer_scans_anywhere_in_text() {
        assert_eq!(first_integer("已售 1200+ 件"), Some(1200));
        assert_eq!(first_integer("库存42件"), Some(42));
        assert_eq!(first_integer("无货"), None);
    }

    #[test]
    fn integer_or_raw_falls_back_to_trimmed_text() {
        assert_eq!(integer_or_raw("  月销 300+ "), Ok(300));
        assert_eq!(integer_or_raw(" 暂无销量 "), Err("暂无销量".to_string()));
    }
}
