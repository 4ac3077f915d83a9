use std::fmt;

use scraper::{ElementRef, Html};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
};

use crate::{
    config::{CompiledSchema, ScrapeContext},
    errors::ScrapeError,
    session::RenderSession,
    variants::resolve_variant_prices,
};

/// One product as it appears in a catalog section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub rating: u32,
    pub num_of_reviews: u32,
    pub additional_info: AdditionalInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    /// Price per storage option, empty when the product has no variant block.
    #[serde(default)]
    pub hdd_prices: VariantPrices,
}

/// Variant label to price, in the order the variants were activated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPrices(Vec<(String, f64)>);

impl VariantPrices {
    pub fn insert(&mut self, label: impl Into<String>, price: f64) {
        let label = label.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = price,
            None => self.0.push((label, price)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, price)| *price)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(label, _)| label.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for VariantPrices {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut prices = VariantPrices::default();
        for (label, price) in iter {
            prices.insert(label, price);
        }
        prices
    }
}

impl Serialize for VariantPrices {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(label, price)| (label, price)))
    }
}

impl<'de> Deserialize<'de> for VariantPrices {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PricesVisitor;

        impl<'de> Visitor<'de> for PricesVisitor {
            type Value = VariantPrices;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of variant labels to prices")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut prices = VariantPrices::default();
                while let Some((label, price)) = map.next_entry::<String, f64>()? {
                    prices.insert(label, price);
                }
                Ok(prices)
            }
        }

        deserializer.deserialize_map(PricesVisitor)
    }
}

/// Owned copy of one card's markup, kept so the card can be extracted after
/// the listing it came from has been navigated away from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSnapshot {
    /// 1-based position of the card in its listing.
    pub position: usize,
    pub html: String,
}

impl CardSnapshot {
    /// Captures the cards of `document`, skipping the first `already_captured`.
    pub fn capture(
        document: &Html,
        schema: &CompiledSchema,
        already_captured: usize,
    ) -> Vec<CardSnapshot> {
        document
            .select(&schema.card)
            .enumerate()
            .skip(already_captured)
            .map(|(index, card)| CardSnapshot {
                position: index + 1,
                html: card.html(),
            })
            .collect()
    }
}

/// The fields of a product readable from the listing card alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFields {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub rating: u32,
    pub num_of_reviews: u32,
    /// `href` of the title link, as written in the markup.
    pub detail_link: Option<String>,
}

impl ListingFields {
    pub fn parse(card: &CardSnapshot, ctx: &ScrapeContext) -> Result<Self, ScrapeError> {
        let fragment = Html::parse_fragment(&card.html);
        let root = fragment.root_element();
        let compiled = &ctx.compiled;

        let title_elem = root
            .select(&compiled.title)
            .next()
            .ok_or(ScrapeError::MissingField("title"))?;
        let title = title_elem
            .value()
            .attr("title")
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .ok_or(ScrapeError::MissingField("title"))?
            .to_string();
        let detail_link = title_elem.value().attr("href").map(str::to_string);

        let description = root
            .select(&compiled.description)
            .next()
            .map(element_text)
            .ok_or(ScrapeError::MissingField("description"))?;

        let price_text = root
            .select(&compiled.price)
            .next()
            .map(element_text)
            .ok_or(ScrapeError::MissingField("price"))?;
        let price = parse_price(&price_text, &ctx.schema.currency_symbol)?;

        let rating_attr = ctx.schema.rating_attr.as_str();
        let rating_raw = root
            .select(&compiled.rating)
            .next()
            .and_then(|elem| elem.value().attr(rating_attr))
            .ok_or(ScrapeError::MissingField("rating"))?;
        let rating = rating_raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ScrapeError::parse("rating", rating_raw))?;

        let num_of_reviews = match root.select(&compiled.reviews).next() {
            Some(elem) => parse_review_count(&element_text(elem))?,
            None => 0,
        };

        Ok(Self {
            title,
            description,
            price,
            rating,
            num_of_reviews,
            detail_link,
        })
    }
}

/// Turns one card into a record, visiting its detail page for variant prices.
///
/// The session ends up on the detail page, not on the listing the card came from.
pub async fn extract_product<S: RenderSession>(
    session: &mut S,
    card: &CardSnapshot,
    ctx: &ScrapeContext,
) -> Result<ProductRecord, ScrapeError> {
    let fields = ListingFields::parse(card, ctx)?;
    let hdd_prices = resolve_variant_prices(session, fields.detail_link.as_deref(), ctx).await?;
    Ok(ProductRecord {
        title: fields.title,
        description: fields.description,
        price: fields.price,
        rating: fields.rating,
        num_of_reviews: fields.num_of_reviews,
        additional_info: AdditionalInfo { hdd_prices },
    })
}

fn element_text(elem: ElementRef) -> String {
    elem.text().collect::<String>().trim().to_string()
}

/// Parses a displayed price such as `$1178.99`.
pub fn parse_price(raw: &str, currency_symbol: &str) -> Result<f64, ScrapeError> {
    let cleaned = raw.replace(currency_symbol, "");
    match cleaned.trim().parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
        _ => Err(ScrapeError::parse("price", raw)),
    }
}

/// "14 reviews" -> 14
fn parse_review_count(raw: &str) -> Result<u32, ScrapeError> {
    raw.split_whitespace()
        .next()
        .and_then(|count| count.parse::<u32>().ok())
        .ok_or_else(|| ScrapeError::parse("num_of_reviews", raw))
}
