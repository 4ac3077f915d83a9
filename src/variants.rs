use tracing::debug;

use crate::{
    config::ScrapeContext,
    errors::ScrapeError,
    overlay::{click_through_overlay, dismiss_blocking_overlay},
    product::{VariantPrices, parse_price},
    session::RenderSession,
};

/// Visits a product's detail page and reads the price of every enabled variant.
///
/// Returns an empty map when the card has no detail link or the detail page
/// has no variant block. Leaves the session on the detail page.
pub async fn resolve_variant_prices<S: RenderSession>(
    session: &mut S,
    detail_link: Option<&str>,
    ctx: &ScrapeContext,
) -> Result<VariantPrices, ScrapeError> {
    let mut prices = VariantPrices::default();
    let Some(href) = detail_link else {
        return Ok(prices);
    };
    let url = ctx.resolve(href)?;
    let schema = &ctx.schema;

    session.goto(url.as_str()).await?;
    dismiss_blocking_overlay(session, schema, &ctx.timing).await;

    let Some(swatches) = session.find(&schema.swatches).await? else {
        debug!("No variant block on {}", url);
        return Ok(prices);
    };
    let buttons = session.find_all_in(&swatches, &schema.variant).await?;

    for button in buttons {
        if is_disabled(session, &button).await? {
            continue;
        }
        let label = session
            .property(&button, "value")
            .await?
            .ok_or(ScrapeError::MissingField("variant value"))?;

        let target = format!("variant {label}");
        click_through_overlay(session, &button, &target, schema, &ctx.timing).await?;

        let price_elem = session
            .find(&schema.detail_price)
            .await?
            .ok_or(ScrapeError::MissingField("variant price"))?;
        let price = parse_price(&session.text(&price_elem).await?, &schema.currency_symbol)?;
        debug!("{} variant {} costs {}", url, label, price);
        prices.insert(label, price);
    }
    debug!("Resolved {} variant prices on {}", prices.len(), url);
    Ok(prices)
}

async fn is_disabled<S: RenderSession>(
    session: &mut S,
    button: &S::Element,
) -> Result<bool, ScrapeError> {
    let disabled = session.property(button, "disabled").await?;
    Ok(matches!(disabled.as_deref(), Some("true")))
}
