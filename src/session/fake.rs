//! In-memory [`RenderSession`] serving synthetic catalog pages.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use super::{ClickOutcome, RenderSession, SessionFactory};
use crate::{config::Schema, errors::SessionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeElement {
    Overlay,
    OverlayButton,
    Reveal,
    Card(usize),
    Swatches,
    Variant(usize),
    Price,
}

#[derive(Debug, Clone)]
pub struct Variant {
    pub value: String,
    pub label: String,
    pub price: f64,
    pub disabled: bool,
}

#[derive(Debug, Clone)]
pub enum Page {
    Listing {
        cards: Vec<String>,
        initial: usize,
        batch: usize,
        /// Keep the reveal control in the DOM, hidden, once everything is shown.
        hide_reveal: bool,
        pages: Option<usize>,
    },
    Detail {
        variants: Vec<Variant>,
        price_text: Option<String>,
    },
}

impl Page {
    /// A listing showing all of `cards` at once.
    pub fn listing(cards: Vec<String>) -> Self {
        let initial = cards.len();
        Page::Listing {
            cards,
            initial,
            batch: 0,
            hide_reveal: false,
            pages: None,
        }
    }

    /// A listing showing `initial` cards and `batch` more per reveal click.
    pub fn revealing(cards: Vec<String>, initial: usize, batch: usize) -> Self {
        Page::Listing {
            cards,
            initial,
            batch,
            hide_reveal: false,
            pages: None,
        }
    }

    pub fn hiding_reveal(mut self) -> Self {
        if let Page::Listing { hide_reveal, .. } = &mut self {
            *hide_reveal = true;
        }
        self
    }

    pub fn with_pages(mut self, count: usize) -> Self {
        if let Page::Listing { pages, .. } = &mut self {
            *pages = Some(count);
        }
        self
    }

    pub fn detail(variants: Vec<(&str, f64, bool)>) -> Self {
        Page::Detail {
            variants: variants
                .into_iter()
                .map(|(value, price, disabled)| Variant {
                    value: value.to_string(),
                    label: format!("{value} GB"),
                    price,
                    disabled,
                })
                .collect(),
            price_text: None,
        }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        if let Page::Detail { variants, .. } = &mut self {
            for (variant, label) in variants.iter_mut().zip(labels) {
                variant.label = label.to_string();
            }
        }
        self
    }

    pub fn with_price_text(mut self, text: &str) -> Self {
        if let Page::Detail { price_text, .. } = &mut self {
            *price_text = Some(text.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    schema: Schema,
    pages: HashMap<String, Page>,
    current: Option<String>,
    visible: usize,
    selected: Option<usize>,
    overlay_enabled: bool,
    overlay_visible: bool,
    obstructions: usize,
    script_clicks: usize,
    reveal_clicks: usize,
    navigations: Vec<String>,
    fail_on: Option<String>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: Page) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Show the cookie banner after every navigation.
    pub fn with_overlay(mut self) -> Self {
        self.overlay_enabled = true;
        self
    }

    /// The next `count` normal clicks are intercepted by a freshly shown banner.
    pub fn with_obstructions(mut self, count: usize) -> Self {
        self.obstructions = count;
        self
    }

    /// Navigating to `url` fails as if the browser had gone away.
    pub fn failing_on(mut self, url: &str) -> Self {
        self.fail_on = Some(url.to_string());
        self
    }

    pub fn goto_now(&mut self, url: &str) {
        self.navigations.push(url.to_string());
        self.current = Some(url.to_string());
        self.overlay_visible = self.overlay_enabled;
        self.selected = None;
        self.visible = match self.pages.get(url) {
            Some(Page::Listing { initial, .. }) => *initial,
            _ => 0,
        };
    }

    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn script_clicks(&self) -> usize {
        self.script_clicks
    }

    pub fn reveal_clicks(&self) -> usize {
        self.reveal_clicks
    }

    fn page(&self) -> Option<&Page> {
        self.current.as_ref().and_then(|url| self.pages.get(url))
    }

    fn exhausted(&self) -> bool {
        match self.page() {
            Some(Page::Listing { cards, .. }) => self.visible >= cards.len(),
            _ => true,
        }
    }

    fn lookup(&self, css: &str) -> Vec<FakeElement> {
        let schema = &self.schema;
        if css == schema.overlay {
            return if self.overlay_visible {
                vec![FakeElement::Overlay]
            } else {
                vec![]
            };
        }
        match self.page() {
            Some(Page::Listing { hide_reveal, .. }) => {
                if css == schema.card {
                    (0..self.visible).map(FakeElement::Card).collect()
                } else if css == schema.reveal && (!self.exhausted() || *hide_reveal) {
                    vec![FakeElement::Reveal]
                } else {
                    vec![]
                }
            }
            Some(Page::Detail { variants, .. }) => {
                if css == schema.swatches && !variants.is_empty() {
                    vec![FakeElement::Swatches]
                } else if css == schema.detail_price {
                    vec![FakeElement::Price]
                } else {
                    vec![]
                }
            }
            None => vec![],
        }
    }

    fn lookup_in(&self, parent: &FakeElement, css: &str) -> Vec<FakeElement> {
        match (parent, self.page()) {
            (FakeElement::Overlay, _) if css == self.schema.overlay_dismiss => {
                vec![FakeElement::OverlayButton]
            }
            (FakeElement::Swatches, Some(Page::Detail { variants, .. }))
                if css == self.schema.variant =>
            {
                (0..variants.len()).map(FakeElement::Variant).collect()
            }
            _ => vec![],
        }
    }

    fn variant(&self, index: usize) -> Option<&Variant> {
        match self.page() {
            Some(Page::Detail { variants, .. }) => variants.get(index),
            _ => None,
        }
    }

    fn render_listing(&self) -> String {
        let Some(Page::Listing {
            cards,
            hide_reveal,
            pages,
            ..
        }) = self.page()
        else {
            return "<html><body></body></html>".to_string();
        };
        let shown: String = cards[..self.visible.min(cards.len())].concat();
        let reveal = if !self.exhausted() {
            r#"<a class="btn btn-lg btn-block btn-primary ecomerce-items-scroll-more btn-more">More</a>"#
        } else if *hide_reveal {
            r#"<a class="btn btn-more" style="display: none;">More</a>"#
        } else {
            ""
        };
        let pager = pages
            .map(|count| {
                let items: String = (1..=count).map(|n| format!("<li>{n}</li>")).collect();
                format!(r#"<ul class="pagination"><li>&laquo;</li>{items}<li>&raquo;</li></ul>"#)
            })
            .unwrap_or_default();
        format!(r#"<html><body><div class="row">{shown}</div>{reveal}{pager}</body></html>"#)
    }
}

impl RenderSession for FakeSession {
    type Element = FakeElement;

    async fn goto(&mut self, url: &str) -> Result<(), SessionError> {
        if self.fail_on.as_deref() == Some(url) {
            return Err(SessionError::Other(format!("browser went away loading {url}")));
        }
        if !self.pages.contains_key(url) {
            return Err(SessionError::Other(format!("no page at {url}")));
        }
        self.goto_now(url);
        Ok(())
    }

    async fn source(&mut self) -> Result<String, SessionError> {
        Ok(self.render_listing())
    }

    async fn find(&mut self, css: &str) -> Result<Option<FakeElement>, SessionError> {
        Ok(self.lookup(css).into_iter().next())
    }

    async fn find_all(&mut self, css: &str) -> Result<Vec<FakeElement>, SessionError> {
        Ok(self.lookup(css))
    }

    async fn find_in(
        &mut self,
        parent: &FakeElement,
        css: &str,
    ) -> Result<Option<FakeElement>, SessionError> {
        Ok(self.lookup_in(parent, css).into_iter().next())
    }

    async fn find_all_in(
        &mut self,
        parent: &FakeElement,
        css: &str,
    ) -> Result<Vec<FakeElement>, SessionError> {
        Ok(self.lookup_in(parent, css))
    }

    async fn wait_for(
        &mut self,
        css: &str,
        _timeout: Duration,
    ) -> Result<Option<FakeElement>, SessionError> {
        self.find(css).await
    }

    async fn click(&mut self, element: &FakeElement) -> Result<ClickOutcome, SessionError> {
        if self.obstructions > 0 {
            self.obstructions -= 1;
            self.overlay_visible = true;
            return Ok(ClickOutcome::Obstructed);
        }
        match element {
            FakeElement::Reveal => {
                self.reveal_clicks += 1;
                let revealed = match self.page() {
                    Some(Page::Listing { cards, batch, .. }) => {
                        (self.visible + batch).min(cards.len())
                    }
                    _ => self.visible,
                };
                self.visible = revealed;
            }
            FakeElement::Variant(index) => {
                if self.variant(*index).is_some_and(|v| !v.disabled) {
                    self.selected = Some(*index);
                }
            }
            _ => {}
        }
        Ok(ClickOutcome::Clicked)
    }

    async fn script_click(&mut self, element: &FakeElement) -> Result<(), SessionError> {
        self.script_clicks += 1;
        if *element == FakeElement::OverlayButton {
            self.overlay_visible = false;
        }
        Ok(())
    }

    async fn text(&mut self, element: &FakeElement) -> Result<String, SessionError> {
        match element {
            FakeElement::Price => {
                if let Some(Page::Detail {
                    price_text: Some(text),
                    ..
                }) = self.page()
                {
                    return Ok(text.clone());
                }
                let price = self
                    .selected
                    .or(Some(0))
                    .and_then(|index| self.variant(index))
                    .map(|v| v.price)
                    .unwrap_or_default();
                Ok(format!("${price:.2}"))
            }
            FakeElement::Variant(index) => Ok(self
                .variant(*index)
                .map(|v| v.label.clone())
                .unwrap_or_default()),
            FakeElement::Reveal => Ok("More".to_string()),
            _ => Ok(String::new()),
        }
    }

    async fn attr(
        &mut self,
        _element: &FakeElement,
        _name: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(None)
    }

    async fn property(
        &mut self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let FakeElement::Variant(index) = element else {
            return Ok(None);
        };
        Ok(self.variant(*index).map(|v| match name {
            "value" => v.value.clone(),
            "disabled" => v.disabled.to_string(),
            _ => String::new(),
        }))
    }

    async fn is_interactable(&mut self, element: &FakeElement) -> Result<bool, SessionError> {
        Ok(match element {
            FakeElement::Reveal => !self.exhausted(),
            FakeElement::Variant(index) => self.variant(*index).is_some_and(|v| !v.disabled),
            _ => true,
        })
    }

    async fn settle(&mut self, _delay: Duration) {
        tokio::task::yield_now().await;
    }

    async fn close(self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Hands every worker its own copy of the same fake shop.
#[derive(Debug)]
pub struct FakeFactory {
    template: FakeSession,
    limit: Option<usize>,
    opened: AtomicUsize,
}

impl FakeFactory {
    pub fn new(template: FakeSession) -> Self {
        Self {
            template,
            limit: None,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn with_limit(mut self, sessions: usize) -> Self {
        self.limit = Some(sessions);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    fn max_sessions(&self) -> Option<usize> {
        self.limit
    }

    async fn open(&self) -> Result<FakeSession, SessionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.template.clone())
    }
}
