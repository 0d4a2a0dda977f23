//! `chromiumoxide`-backed implementation of the DOM seam.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::{Element, Page};
use tracing::debug;

use super::{DomNode, DomRoot};

/// Query root over a live page.
#[derive(Clone)]
pub struct CdpDom {
    page: Page,
}

impl CdpDom {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }
}

pub struct CdpNode {
    element: Element,
}

const TEXT_FN: &str = r#"function() {
    const t = (this.textContent || '').trim();
    if (t.length) return t;
    return (this.innerText || '').trim();
}"#;

const OUTER_HTML_FN: &str = "function() { return this.outerHTML; }";

const CLICK_FN: &str = "function() { this.click(); }";

fn js_string(returns: chromiumoxide::cdp::js_protocol::runtime::CallFunctionOnReturns) -> Option<String> {
    returns
        .result
        .value
        .and_then(|v| v.as_str().map(str::to_string))
}

#[async_trait]
impl DomRoot for CdpDom {
    type Node = CdpNode;

    async fn find(&self, selector: &str) -> Result<Option<CdpNode>> {
        // chromiumoxide reports "no node" as an error; fold any lookup error
        // into None so a missing region reads as a soft miss.
        match self.page.find_element(selector).await {
            Ok(element) => Ok(Some(CdpNode { element })),
            Err(e) => {
                debug!(selector, error = %e, "root lookup missed");
                Ok(None)
            }
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<CdpNode>> {
        let elements = self.page.find_elements(selector).await.unwrap_or_default();
        Ok(elements.into_iter().map(|element| CdpNode { element }).collect())
    }

    async fn page_html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow!("failed to read page content: {e}"))
    }
}

#[async_trait]
impl DomNode for CdpNode {
    async fn find(&self, selector: &str) -> Result<Option<Self>> {
        match self.element.find_element(selector).await {
            Ok(element) => Ok(Some(CdpNode { element })),
            Err(e) => {
                debug!(selector, error = %e, "scoped lookup missed");
                Ok(None)
            }
        }
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self>> {
        let elements = self
            .element
            .find_elements(selector)
            .await
            .unwrap_or_default();
        Ok(elements.into_iter().map(|element| CdpNode { element }).collect())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        self.element
            .attribute(name)
            .await
            .map_err(|e| anyhow!("attribute read failed: {e}"))
    }

    async fn text(&self) -> Result<String> {
        let returns = self
            .element
            .call_js_fn(TEXT_FN, false)
            .await
            .map_err(|e| anyhow!("text read failed: {e}"))?;
        Ok(js_string(returns).unwrap_or_default())
    }

    async fn outer_html(&self) -> Result<String> {
        let returns = self
            .element
            .call_js_fn(OUTER_HTML_FN, false)
            .await
            .map_err(|e| anyhow!("outerHTML read failed: {e}"))?;
        Ok(js_string(returns).unwrap_or_default())
    }

    async fn click(&self) -> Result<()> {
        self.element
            .call_js_fn(CLICK_FN, false)
            .await
            .map_err(|e| anyhow!("synthetic click failed: {e}"))?;
        Ok(())
    }
}
