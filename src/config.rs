use std::{env, path::PathBuf, time::Duration};

use color_eyre::Result;
use derive_deref::{Deref, DerefMut};
use directories::ProjectDirs;
use lazy_static::lazy_static;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::ScrapeError;

const CONFIG: &str = include_str!("../.config/config.json5");

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase();
    pub static ref DATA_FOLDER: Option<PathBuf> =
        env::var(format!("{}_DATA", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

/// Runtime configuration, layered from the embedded defaults, an optional
/// user file and `CATALOG_SCRAPER_*` environment variables.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Detail links on cards are resolved against this address.
    pub base_url: Url,
    pub output_dir: PathBuf,
    pub webdriver: WebDriverConfig,
    pub timing: Timing,
    pub schema: Schema,
    pub sections: Catalog,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WebDriverConfig {
    pub url: String,
    /// Start `driver_path` before connecting and kill it on shutdown.
    pub spawn_driver: bool,
    pub driver_path: String,
    pub headless: bool,
}

/// Wait bounds shared by every component. Fixed for the lifetime of a run.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Timing {
    pub element_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_reveals: usize,
}

impl Timing {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            element_timeout_ms: 10_000,
            settle_delay_ms: 2_000,
            poll_interval_ms: 250,
            max_reveals: 500,
        }
    }
}

/// CSS selectors describing the catalog page layout.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Schema {
    pub card: String,
    pub title: String,
    pub description: String,
    pub price: String,
    pub rating: String,
    pub rating_attr: String,
    pub reviews: String,
    pub reveal: String,
    pub pagination: String,
    pub overlay: String,
    pub overlay_dismiss: String,
    pub swatches: String,
    pub variant: String,
    pub detail_price: String,
    pub currency_symbol: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            card: ".thumbnail".into(),
            title: ".title".into(),
            description: ".description".into(),
            price: ".price".into(),
            rating: "p[data-rating]".into(),
            rating_attr: "data-rating".into(),
            reviews: ".ratings > p.pull-right".into(),
            reveal: ".btn-more".into(),
            pagination: ".pagination".into(),
            overlay: "#cookieBanner".into(),
            overlay_dismiss: "button".into(),
            swatches: ".swatches".into(),
            variant: "button".into(),
            detail_price: ".price".into(),
            currency_symbol: "$".into(),
        }
    }
}

/// The schema selectors that are matched against HTML snapshots, compiled once.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    pub card: Selector,
    pub title: Selector,
    pub description: Selector,
    pub price: Selector,
    pub rating: Selector,
    pub reviews: Selector,
    pub pagination: Selector,
    pub pagination_item: Selector,
}

impl Schema {
    pub fn compile(&self) -> Result<CompiledSchema, ScrapeError> {
        Ok(CompiledSchema {
            card: compile(&self.card)?,
            title: compile(&self.title)?,
            description: compile(&self.description)?,
            price: compile(&self.price)?,
            rating: compile(&self.rating)?,
            reviews: compile(&self.reviews)?,
            pagination: compile(&self.pagination)?,
            pagination_item: compile("li")?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// What every extraction step needs to know about the site, shared read-only.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    pub base_url: Url,
    pub schema: Schema,
    pub compiled: CompiledSchema,
    pub timing: Timing,
}

impl ScrapeContext {
    pub fn new(base_url: Url, schema: Schema, timing: Timing) -> Result<Self, ScrapeError> {
        let compiled = schema.compile()?;
        Ok(Self {
            base_url,
            schema,
            compiled,
            timing,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ScrapeError> {
        Self::new(config.base_url.clone(), config.schema.clone(), config.timing)
    }

    /// Absolute address of a link found in page markup.
    pub fn resolve(&self, href: &str) -> Result<Url, ScrapeError> {
        self.base_url.join(href).map_err(|source| ScrapeError::Link {
            href: href.to_string(),
            source,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let timing = Timing {
            element_timeout_ms: 20,
            settle_delay_ms: 0,
            poll_interval_ms: 1,
            max_reveals: 50,
        };
        Self::new(
            Url::parse("https://shop.test/").expect("valid test url"),
            Schema::default(),
            timing,
        )
        .expect("default schema compiles")
    }
}

/// A named listing entry point.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CatalogSection {
    pub name: String,
    pub url: Url,
}

/// Sections in the order they are traversed.
#[derive(Clone, Debug, Default, Deref, DerefMut, Deserialize, Serialize)]
pub struct Catalog(pub Vec<CatalogSection>);

impl Catalog {
    /// Keeps only the named sections, preserving configured order. An empty
    /// filter keeps everything.
    pub fn only(self, names: &[String]) -> Self {
        if names.is_empty() {
            return self;
        }
        Catalog(
            self.0
                .into_iter()
                .filter(|section| names.iter().any(|n| n == &section.name))
                .collect(),
        )
    }
}

impl Config {
    pub fn new(path: Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let config_file = path.unwrap_or_else(|| get_config_dir().join("config.json5"));
        debug!("Loading configuration overrides from {}", config_file.display());
        let builder = config::Config::builder()
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5))
            .add_source(config::File::from(config_file).required(false))
            .add_source(
                config::Environment::with_prefix(PROJECT_NAME.as_str())
                    .prefix_separator("_")
                    .separator("__"),
            );
        builder.build()?.try_deserialize()
    }
}

pub fn get_data_dir() -> PathBuf {
    if let Some(s) = DATA_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.data_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".data")
    }
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "webscraper", env!("CARGO_PKG_NAME"))
}
