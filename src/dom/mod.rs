//! Thin DOM-access seam over the live browser page.
//!
//! Every extractor reads the page through `DomRoot`/`DomNode` instead of
//! touching `chromiumoxide` types directly. Production uses `CdpDom`; tests
//! drive the extractors against the scripted fake in `fake.rs`, which is how
//! the stale-handle and click-count properties get asserted without a
//! browser.
//!
//! Lookup semantics are deliberately soft: "not found" and "no longer
//! attached" both come back as `None`/empty from the CDP implementation, and
//! the extractors are written to re-resolve from the root rather than retry
//! a held handle.

mod cdp;
#[cfg(test)]
pub mod fake;

pub use cdp::{CdpDom, CdpNode};

use anyhow::Result;
use async_trait::async_trait;

/// A handle to one element. Handles are cheap and disposable; after any DOM
/// mutation the owner is expected to re-resolve from the root.
#[async_trait]
pub trait DomNode: Sized + Send + Sync {
    /// First descendant matching `selector`, if any.
    async fn find(&self, selector: &str) -> Result<Option<Self>>;

    /// All descendants matching `selector` (empty when none).
    async fn find_all(&self, selector: &str) -> Result<Vec<Self>>;

    /// Attribute value, `None` when absent.
    async fn attr(&self, name: &str) -> Result<Option<String>>;

    /// Visible text: `textContent` preferred, `innerText` fallback, trimmed.
    /// Rendered text can be empty under dynamic rendering even when the
    /// node carries content, hence the two-step read.
    async fn text(&self) -> Result<String>;

    /// Serialized markup of the node, used for raw diagnostic snapshots.
    async fn outer_html(&self) -> Result<String>;

    /// Synthetic click (dispatched in page JS, matching what the site's own
    /// handlers expect from its widgets).
    async fn click(&self) -> Result<()>;
}

/// Page-level query root.
#[async_trait]
pub trait DomRoot: Send + Sync {
    type Node: DomNode;

    async fn find(&self, selector: &str) -> Result<Option<Self::Node>>;
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Node>>;

    /// Full serialized page source (diagnostic snapshot on fatal failure).
    async fn page_html(&self) -> Result<String>;
}
