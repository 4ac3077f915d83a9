use std::path::PathBuf;

use color_eyre::Result;
use thiserror::Error;
use tracing::error;

/// Failures raised by a [`RenderSession`](crate::session::RenderSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// A WebDriver command failed.
    #[error("webdriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),
    /// The WebDriver session could not be created.
    #[error("could not open webdriver session: {0}")]
    Connect(#[from] fantoccini::error::NewSessionError),
    /// The driver process could not be started.
    #[error("could not start {path}: {source}")]
    Driver {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Everything that can go wrong while extracting a catalog section.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A field the page layout guarantees was not there.
    #[error("required field `{0}` not found")]
    MissingField(&'static str),

    #[error("could not parse {field} from {raw:?}")]
    Parse { field: &'static str, raw: String },

    /// A click was still intercepted after the overlay had been dismissed.
    #[error("click on {target} was obstructed twice")]
    Obstructed { target: String },

    #[error("invalid link {href:?}: {source}")]
    Link {
        href: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    /// Wraps the failure of a single card with its 1-based listing position.
    #[error("card #{position}: {source}")]
    Card {
        position: usize,
        #[source]
        source: Box<ScrapeError>,
    },

    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn parse(field: &'static str, raw: impl Into<String>) -> Self {
        Self::Parse {
            field,
            raw: raw.into(),
        }
    }

    pub fn at_card(self, position: usize) -> Self {
        Self::Card {
            position,
            source: Box::new(self),
        }
    }
}

pub fn init() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .panic_section(format!(
            "This is a bug. Consider reporting it along with {}.log",
            env!("CARGO_PKG_NAME")
        ))
        .capture_span_trace_by_default(false)
        .display_location_section(false)
        .display_env_section(false)
        .into_hooks();
    eyre_hook.install()?;
    std::panic::set_hook(Box::new(move |panic_info| {
        #[cfg(not(debug_assertions))]
        {
            use human_panic::{handle_dump, metadata, print_msg};
            let metadata = metadata!();
            let file_path = handle_dump(&metadata, panic_info);
            // prints human-panic message
            if let Err(e) = print_msg(file_path, &metadata) {
                eprintln!("human-panic: printing error message failed: {e}");
            }
            eprintln!("{}", panic_hook.panic_report(panic_info)); // prints color-eyre stack trace to stderr
        }
        let msg = format!("{}", panic_hook.panic_report(panic_info));
        error!("Error: {}", strip_ansi_escapes::strip_str(msg));

        #[cfg(debug_assertions)]
        {
            // Better Panic stacktrace that is only enabled when debugging.
            better_panic::Settings::auto()
                .most_recent_first(false)
                .lineno_suffix(true)
                .verbosity(better_panic::Verbosity::Full)
                .create_panic_handler()(panic_info);
        }

        std::process::exit(1);
    }));
    Ok(())
}
