//! The browser capability consumed by the scraper.
//!
//! Every component receives the session explicitly as `&mut S`, so at most one
//! navigation or extraction can be in flight against a session at a time.

use std::time::Duration;

use strum::Display;
use tracing::{debug, warn};

use crate::errors::SessionError;

mod webdriver;

#[cfg(test)]
pub mod fake;

pub use webdriver::{WebDriverFactory, WebDriverSession};

/// Result of a normal (non-scripted) click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ClickOutcome {
    Clicked,
    /// Another element, usually an overlay, received the click instead.
    Obstructed,
}

/// An interactive browser session holding the current address and rendered DOM.
#[allow(async_fn_in_trait)]
pub trait RenderSession {
    type Element: Clone;

    async fn goto(&mut self, url: &str) -> Result<(), SessionError>;

    /// Serialized HTML of the currently rendered document.
    async fn source(&mut self) -> Result<String, SessionError>;

    /// First element matching `css`, or `None` when nothing matches right now.
    async fn find(&mut self, css: &str) -> Result<Option<Self::Element>, SessionError>;

    async fn find_all(&mut self, css: &str) -> Result<Vec<Self::Element>, SessionError>;

    /// Like [`find`](Self::find), scoped to the subtree of `parent`.
    async fn find_in(
        &mut self,
        parent: &Self::Element,
        css: &str,
    ) -> Result<Option<Self::Element>, SessionError>;

    async fn find_all_in(
        &mut self,
        parent: &Self::Element,
        css: &str,
    ) -> Result<Vec<Self::Element>, SessionError>;

    /// Waits up to `timeout` for an element matching `css` to be present.
    async fn wait_for(
        &mut self,
        css: &str,
        timeout: Duration,
    ) -> Result<Option<Self::Element>, SessionError>;

    async fn click(&mut self, element: &Self::Element) -> Result<ClickOutcome, SessionError>;

    /// Clicks through script, bypassing interactability checks.
    async fn script_click(&mut self, element: &Self::Element) -> Result<(), SessionError>;

    async fn text(&mut self, element: &Self::Element) -> Result<String, SessionError>;

    async fn attr(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// DOM property (as opposed to markup attribute), stringified.
    async fn property(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Displayed and enabled.
    async fn is_interactable(&mut self, element: &Self::Element) -> Result<bool, SessionError>;

    /// Pause for asynchronous rendering to finish.
    async fn settle(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Waits up to `timeout` for an element matching `css` that can receive clicks.
    async fn wait_clickable(
        &mut self,
        css: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Option<Self::Element>, SessionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(element) = self.find(css).await? {
                if self.is_interactable(&element).await? {
                    return Ok(Some(element));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("{} not clickable after {:?}", css, timeout);
                return Ok(None);
            }
            self.settle(poll).await;
        }
    }

    /// Tears the session down. Must be called exactly once.
    async fn close(self) -> Result<(), SessionError>
    where
        Self: Sized;
}

/// Opens independent sessions, one per worker.
#[allow(async_fn_in_trait)]
pub trait SessionFactory {
    type Session: RenderSession;

    /// Upper bound on sessions open at the same time, if there is one.
    fn max_sessions(&self) -> Option<usize> {
        None
    }

    async fn open(&self) -> Result<Self::Session, SessionError>;
}

/// Opens a session, runs `body` with exclusive access to it and closes it
/// again whatever `body` returned.
pub async fn with_session<F, T>(
    factory: &F,
    body: impl AsyncFnOnce(&mut F::Session) -> T,
) -> Result<T, SessionError>
where
    F: SessionFactory,
{
    let mut session = factory.open().await?;
    let output = body(&mut session).await;
    if let Err(e) = session.close().await {
        warn!("Failed to close render session: {}", e);
    }
    Ok(output)
}
