//! CSV output, one file per catalog section.
//!
//! `additional_info` is stored in its column as compact JSON, e.g.
//! `{"hdd_prices":{"128":1178.99,"256":1198.99}}`, keeping variant order.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::{
    errors::ScrapeError,
    product::{AdditionalInfo, ProductRecord},
};

pub const HEADER: [&str; 6] = [
    "title",
    "description",
    "price",
    "rating",
    "num_of_reviews",
    "additional_info",
];

/// Receives the finished records of a section.
pub trait ProductSink {
    /// Stores `records` under `section`, returning where they went.
    fn write_section(
        &self,
        section: &str,
        records: &[ProductRecord],
    ) -> Result<PathBuf, ScrapeError>;
}

/// Writes `<dir>/<section>.csv`. Sections never share a file, so workers can
/// write through the same sink without coordinating.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, section: &str) -> PathBuf {
        self.dir.join(format!("{section}.csv"))
    }
}

impl ProductSink for CsvSink {
    fn write_section(
        &self,
        section: &str,
        records: &[ProductRecord],
    ) -> Result<PathBuf, ScrapeError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ScrapeError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(section);
        write_products(&path, records)?;
        info!("Saved {} products to {}", records.len(), path.display());
        Ok(path)
    }
}

pub fn write_products(path: &Path, records: &[ProductRecord]) -> Result<(), ScrapeError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(HEADER)?;

    for record in records {
        let price = record.price.to_string();
        let rating = record.rating.to_string();
        let num_of_reviews = record.num_of_reviews.to_string();
        let additional_info = serde_json::to_string(&record.additional_info)?;
        wtr.write_record([
            record.title.as_str(),
            record.description.as_str(),
            price.as_str(),
            rating.as_str(),
            num_of_reviews.as_str(),
            additional_info.as_str(),
        ])?;
    }

    wtr.flush().map_err(|source| ScrapeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    title: String,
    description: String,
    price: f64,
    rating: u32,
    num_of_reviews: u32,
    additional_info: String,
}

/// Reads back a file written by [`write_products`].
pub fn read_products(path: &Path) -> Result<Vec<ProductRecord>, ScrapeError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in rdr.deserialize::<CsvRow>() {
        let row = row?;
        let additional_info: AdditionalInfo = serde_json::from_str(&row.additional_info)?;
        records.push(ProductRecord {
            title: row.title,
            description: row.description,
            price: row.price,
            rating: row.rating,
            num_of_reviews: row.num_of_reviews,
            additional_info,
        });
    }
    Ok(records)
}
