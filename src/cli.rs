use std::path::PathBuf;

use clap::Parser;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory the per-section CSV files are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// WebDriver endpoint, e.g. http://localhost:4444
    #[arg(short, long, value_name = "URL")]
    pub webdriver: Option<Url>,

    /// Only scrape this section; may be repeated
    #[arg(short, long = "section", value_name = "NAME")]
    pub sections: Vec<String>,

    /// Number of browser sessions scraping in parallel
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub workers: usize,
}
