//! Walks one catalog listing until no more cards can be revealed.

use scraper::Html;
use strum::Display;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::{CompiledSchema, ScrapeContext},
    errors::ScrapeError,
    overlay::{click_through_overlay, dismiss_blocking_overlay},
    product::{CardSnapshot, ProductRecord, extract_product},
    session::RenderSession,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TraversalState {
    Loaded,
    Extracting,
    Advancing,
    Resolving,
    Done,
}

/// Collects every product of the listing at `entry`, in DOM order.
///
/// Cards are captured while the listing is expanded and only turned into
/// records once it is exhausted, since reading variant prices navigates away
/// and throws the revealed cards away with the page.
pub async fn collect_section<S: RenderSession>(
    session: &mut S,
    entry: &Url,
    ctx: &ScrapeContext,
) -> Result<Vec<ProductRecord>, ScrapeError> {
    let mut traversal = Traversal {
        entry,
        ctx,
        cards: Vec::new(),
        reveals: 0,
        records: Vec::new(),
    };
    let mut state = TraversalState::Loaded;
    loop {
        debug!("{}: {}", entry, state);
        state = match state {
            TraversalState::Loaded => traversal.load(session).await?,
            TraversalState::Extracting => traversal.extract(session).await?,
            TraversalState::Advancing => traversal.advance(session).await?,
            TraversalState::Resolving => traversal.resolve(session).await?,
            TraversalState::Done => return Ok(traversal.records),
        };
    }
}

struct Traversal<'a> {
    entry: &'a Url,
    ctx: &'a ScrapeContext,
    /// Cards captured so far; its length is the high-water mark.
    cards: Vec<CardSnapshot>,
    reveals: usize,
    records: Vec<ProductRecord>,
}

impl Traversal<'_> {
    async fn load<S: RenderSession>(
        &mut self,
        session: &mut S,
    ) -> Result<TraversalState, ScrapeError> {
        info!("Loading {}", self.entry);
        session.goto(self.entry.as_str()).await?;
        dismiss_blocking_overlay(session, &self.ctx.schema, &self.ctx.timing).await;
        session.settle(self.ctx.timing.settle_delay()).await;
        Ok(TraversalState::Extracting)
    }

    async fn extract<S: RenderSession>(
        &mut self,
        session: &mut S,
    ) -> Result<TraversalState, ScrapeError> {
        let html = session.source().await?;
        let (fresh, pages) = capture_new_cards(&html, &self.ctx.compiled, self.cards.len());
        if self.reveals == 0 && pages > 1 {
            warn!(
                "{} advertises {} numbered pages; only the first is collected",
                self.entry, pages
            );
        }
        debug!("Captured {} new cards from {}", fresh.len(), self.entry);
        self.cards.extend(fresh);
        Ok(TraversalState::Advancing)
    }

    async fn advance<S: RenderSession>(
        &mut self,
        session: &mut S,
    ) -> Result<TraversalState, ScrapeError> {
        let schema = &self.ctx.schema;
        let timing = &self.ctx.timing;
        if self.reveals >= timing.max_reveals {
            warn!("Stopping {} after {} reveals", self.entry, self.reveals);
            return Ok(TraversalState::Resolving);
        }
        let Some(reveal) = session.find(&schema.reveal).await? else {
            return Ok(TraversalState::Resolving);
        };
        if !session.is_interactable(&reveal).await? {
            debug!("Reveal control on {} is hidden or disabled", self.entry);
            return Ok(TraversalState::Resolving);
        }
        click_through_overlay(session, &reveal, "reveal control", schema, timing).await?;
        self.reveals += 1;

        if !self.await_growth(session).await? {
            warn!(
                "Reveal #{} on {} added no cards, stopping",
                self.reveals, self.entry
            );
            return Ok(TraversalState::Resolving);
        }
        Ok(TraversalState::Extracting)
    }

    /// Polls the card count until it passes the high-water mark. Falls back to
    /// one settle delay and a last look when the timeout runs out.
    async fn await_growth<S: RenderSession>(&self, session: &mut S) -> Result<bool, ScrapeError> {
        let timing = &self.ctx.timing;
        let card = &self.ctx.schema.card;
        let deadline = tokio::time::Instant::now() + timing.element_timeout();
        while tokio::time::Instant::now() < deadline {
            if session.find_all(card).await?.len() > self.cards.len() {
                return Ok(true);
            }
            session.settle(timing.poll_interval()).await;
        }
        session.settle(timing.settle_delay()).await;
        Ok(session.find_all(card).await?.len() > self.cards.len())
    }

    async fn resolve<S: RenderSession>(
        &mut self,
        session: &mut S,
    ) -> Result<TraversalState, ScrapeError> {
        info!(
            "Extracting {} products from {} after {} reveals",
            self.cards.len(),
            self.entry,
            self.reveals
        );
        for card in &self.cards {
            let record = extract_product(session, card, self.ctx)
                .await
                .map_err(|e| e.at_card(card.position))?;
            self.records.push(record);
        }
        Ok(TraversalState::Done)
    }
}

/// Cards past `already_captured` in `html`, plus the numbered page count.
fn capture_new_cards(
    html: &str,
    schema: &CompiledSchema,
    already_captured: usize,
) -> (Vec<CardSnapshot>, usize) {
    let document = Html::parse_document(html);
    let cards = CardSnapshot::capture(&document, schema, already_captured);
    (cards, page_count(&document, schema))
}

/// Number of pages a classic pager advertises; 1 when there is no pager.
pub fn page_count(document: &Html, schema: &CompiledSchema) -> usize {
    let Some(pagination) = document.select(&schema.pagination).next() else {
        return 1;
    };
    let items: Vec<_> = pagination.select(&schema.pagination_item).collect();
    items
        .len()
        .checked_sub(2)
        .and_then(|index| items.get(index))
        .and_then(|item| item.text().collect::<String>().trim().parse().ok())
        .unwrap_or(1)
}
