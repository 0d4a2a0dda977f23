//! Scripted in-memory DOM used by the extractor/variant tests.
//!
//! Models exactly the slice of page structure the extractors query: an
//! option-panel container, labelled SKU axes with value items, and a main
//! image. Clicking a style item bumps a generation counter; any handle
//! minted under an older generation errors on use, which is how the tests
//! prove the variant machine never reuses a pre-click handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{DomNode, DomRoot};
use crate::extract::selectors::{
    MAIN_IMAGE_SELECTORS, SKU_CONTAINER_SELECTORS, SKU_CONTENT_SELECTOR, SKU_ITEM_SELECTOR,
    SKU_LABEL_SELECTOR, SKU_TITLED_LABEL_SELECTOR, SKU_VALUE_ITEM_SELECTOR,
    SKU_VALUE_WRAP_SELECTOR, VALUE_ITEM_IMG_SELECTOR, VALUE_ITEM_TEXT_SELECTOR,
};

#[derive(Debug, Clone, Default)]
pub struct FakeItem {
    pub text: String,
    pub title_attr: Option<String>,
    pub disabled: Option<String>,
    pub thumb: Option<String>,
}

impl FakeItem {
    pub fn named(name: &str) -> Self {
        Self {
            text: name.to_string(),
            title_attr: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = Some("true".to_string());
        self
    }

    pub fn with_thumb(mut self, url: &str) -> Self {
        self.thumb = Some(url.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeAxis {
    pub label: String,
    pub items: Vec<FakeItem>,
}

#[derive(Debug, Default)]
pub struct PageState {
    pub has_container: bool,
    /// Axes in on-page order (style axis first when present).
    pub axes: Vec<FakeAxis>,
    pub main_image: Option<String>,
    /// Style-item name → main image URL after clicking it.
    pub click_image: HashMap<String, String>,
    /// Names of every item actually clicked, in order.
    pub clicks: Vec<String>,
    pub generation: u64,
}

#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new(state: PageState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    fn node(&self, kind: Kind) -> FakeNode {
        let born = self.state.lock().unwrap().generation;
        FakeNode {
            state: self.state.clone(),
            kind,
            born,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Container,
    Axis(usize),
    Label(usize),
    ValueWrap(usize),
    Content(usize),
    Item { axis: usize, idx: usize },
    ItemText { axis: usize, idx: usize },
    ItemImg { axis: usize, idx: usize },
    MainImage,
}

pub struct FakeNode {
    state: Arc<Mutex<PageState>>,
    kind: Kind,
    born: u64,
}

impl FakeNode {
    fn fresh(&self, kind: Kind) -> FakeNode {
        FakeNode {
            state: self.state.clone(),
            kind,
            born: self.born,
        }
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, PageState>> {
        let state = self.state.lock().unwrap();
        if state.generation != self.born {
            return Err(anyhow!("stale element reference (generation moved)"));
        }
        Ok(state)
    }
}

#[async_trait]
impl DomRoot for FakePage {
    type Node = FakeNode;

    async fn find(&self, selector: &str) -> Result<Option<FakeNode>> {
        let state = self.state.lock().unwrap();
        if SKU_CONTAINER_SELECTORS.contains(&selector) {
            if state.has_container {
                drop(state);
                return Ok(Some(self.node(Kind::Container)));
            }
            return Ok(None);
        }
        if MAIN_IMAGE_SELECTORS.contains(&selector) {
            if state.main_image.is_some() && selector == MAIN_IMAGE_SELECTORS[0] {
                drop(state);
                return Ok(Some(self.node(Kind::MainImage)));
            }
            return Ok(None);
        }
        Ok(None)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeNode>> {
        Ok(self.find(selector).await?.into_iter().collect())
    }

    async fn page_html(&self) -> Result<String> {
        Ok("<html><body>fake</body></html>".to_string())
    }
}

#[async_trait]
impl DomNode for FakeNode {
    async fn find(&self, selector: &str) -> Result<Option<Self>> {
        let state = self.guard()?;
        let found = match (self.kind, selector) {
            (Kind::Axis(i), s) if s == SKU_LABEL_SELECTOR || s == SKU_TITLED_LABEL_SELECTOR => {
                state.axes.get(i).map(|_| Kind::Label(i))
            }
            (Kind::Axis(i), s) if s == SKU_VALUE_WRAP_SELECTOR => Some(Kind::ValueWrap(i)),
            (Kind::ValueWrap(i), s) if s == SKU_CONTENT_SELECTOR => Some(Kind::Content(i)),
            (Kind::Item { axis, idx }, s) if s == VALUE_ITEM_TEXT_SELECTOR => {
                Some(Kind::ItemText { axis, idx })
            }
            (Kind::Item { axis, idx }, s) if s == VALUE_ITEM_IMG_SELECTOR => state
                .axes
                .get(axis)
                .and_then(|a| a.items.get(idx))
                .and_then(|item| item.thumb.as_ref())
                .map(|_| Kind::ItemImg { axis, idx }),
            _ => None,
        };
        drop(state);
        Ok(found.map(|kind| self.fresh(kind)))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Self>> {
        let state = self.guard()?;
        let kinds: Vec<Kind> = match (self.kind, selector) {
            (Kind::Container, s) if s == SKU_ITEM_SELECTOR => {
                (0..state.axes.len()).map(Kind::Axis).collect()
            }
            (Kind::Content(i), s) if s == SKU_VALUE_ITEM_SELECTOR => state
                .axes
                .get(i)
                .map(|a| {
                    (0..a.items.len())
                        .map(|idx| Kind::Item { axis: i, idx })
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        drop(state);
        Ok(kinds.into_iter().map(|kind| self.fresh(kind)).collect())
    }

    async fn attr(&self, name: &str) -> Result<Option<String>> {
        let state = self.guard()?;
        let value = match (self.kind, name) {
            (Kind::Label(i), "title") => state.axes.get(i).map(|a| a.label.clone()),
            (Kind::ItemText { axis, idx }, "title") => state
                .axes
                .get(axis)
                .and_then(|a| a.items.get(idx))
                .and_then(|item| item.title_attr.clone()),
            (Kind::ItemImg { axis, idx }, "src") => state
                .axes
                .get(axis)
                .and_then(|a| a.items.get(idx))
                .and_then(|item| item.thumb.clone()),
            (Kind::Item { axis, idx }, "data-disabled") => state
                .axes
                .get(axis)
                .and_then(|a| a.items.get(idx))
                .and_then(|item| item.disabled.clone()),
            (Kind::MainImage, "src") => state.main_image.clone(),
            _ => None,
        };
        Ok(value)
    }

    async fn text(&self) -> Result<String> {
        let state = self.guard()?;
        let text = match self.kind {
            Kind::Label(i) => state.axes.get(i).map(|a| a.label.clone()),
            Kind::ItemText { axis, idx } | Kind::Item { axis, idx } => state
                .axes
                .get(axis)
                .and_then(|a| a.items.get(idx))
                .map(|item| item.text.clone()),
            _ => None,
        };
        Ok(text.unwrap_or_default())
    }

    async fn outer_html(&self) -> Result<String> {
        self.guard()?;
        Ok(format!("<fake kind={:?} />", self.kind))
    }

    async fn click(&self) -> Result<()> {
        let mut state = self.guard()?;
        let Kind::Item { axis, idx } = self.kind else {
            return Err(anyhow!("clicked a non-item node: {:?}", self.kind));
        };
        let name = state
            .axes
            .get(axis)
            .and_then(|a| a.items.get(idx))
            .map(|item| item.text.clone())
            .ok_or_else(|| anyhow!("clicked item no longer present"))?;
        state.clicks.push(name.clone());
        if let Some(new_image) = state.click_image.get(&name).cloned() {
            state.main_image = Some(new_image);
        }
        // The site re-renders the SKU subtree on selection; every handle
        // minted before this point is now stale.
        state.generation += 1;
        Ok(())
    }
}
