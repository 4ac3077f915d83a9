use clap::Parser;
use color_eyre::eyre::eyre;
use tracing::{error, info};

use crate::{
    cli::Cli,
    config::{Config, ScrapeContext},
    session::WebDriverFactory,
    sink::CsvSink,
};

pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod overlay;
pub mod pagination;
pub mod product;
pub mod session;
pub mod sink;
pub mod variants;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    errors::init()?;
    logging::init()?;
    info!("Starting up");

    let args = Cli::parse();
    let mut config = Config::new(args.config)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(url) = args.webdriver {
        config.webdriver.url = url.to_string();
    }

    let ctx = ScrapeContext::from_config(&config)?;
    let sections = config.sections.clone().only(&args.sections);
    if sections.is_empty() {
        return Err(eyre!("no configured section matches {:?}", args.sections));
    }
    let sink = CsvSink::new(config.output_dir.clone());
    let factory = WebDriverFactory::new(config.webdriver.clone(), config.timing)?;

    let report = catalog::run_partitioned(&factory, &sections, &ctx, &sink, args.workers).await;
    for outcome in &report.sections {
        match &outcome.result {
            Ok(output) => info!(
                "{}: {} products -> {}",
                outcome.name,
                output.records.len(),
                output.path.display()
            ),
            Err(e) => error!("{}: {}", outcome.name, e),
        }
    }

    info!("Shutting down");
    if report.is_success() {
        Ok(())
    } else {
        let failed: Vec<_> = report.failures().map(|(name, _)| name).collect();
        Err(eyre!("{} section(s) failed: {}", failed.len(), failed.join(", ")))
    }
}
