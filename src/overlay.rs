use strum::Display;
use tracing::{debug, info, warn};

use crate::{
    config::{Schema, Timing},
    errors::{ScrapeError, SessionError},
    session::{ClickOutcome, RenderSession},
};

/// What happened to the blocking overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OverlayOutcome {
    /// The overlay never appeared.
    Absent,
    Dismissed,
    /// The overlay is on screen but could not be closed.
    Stuck,
}

/// Closes the cookie banner if it shows up within the element timeout.
///
/// Never fails: a missing banner is the normal case and a banner that cannot
/// be closed is logged and left for the caller's next click to run into.
pub async fn dismiss_blocking_overlay<S: RenderSession>(
    session: &mut S,
    schema: &Schema,
    timing: &Timing,
) -> OverlayOutcome {
    match try_dismiss(session, schema, timing).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Overlay not interactable: {}", e);
            OverlayOutcome::Stuck
        }
    }
}

async fn try_dismiss<S: RenderSession>(
    session: &mut S,
    schema: &Schema,
    timing: &Timing,
) -> Result<OverlayOutcome, SessionError> {
    let Some(banner) = session
        .wait_for(&schema.overlay, timing.element_timeout())
        .await?
    else {
        debug!("No overlay within {:?}", timing.element_timeout());
        return Ok(OverlayOutcome::Absent);
    };
    let Some(button) = session.find_in(&banner, &schema.overlay_dismiss).await? else {
        warn!("Overlay present without a dismiss control");
        return Ok(OverlayOutcome::Stuck);
    };
    if session
        .wait_clickable(&schema.overlay, timing.element_timeout(), timing.poll_interval())
        .await?
        .is_none()
    {
        warn!("Overlay never became clickable");
        return Ok(OverlayOutcome::Stuck);
    }
    session.script_click(&button).await?;
    info!("Cookie banner closed");
    Ok(OverlayOutcome::Dismissed)
}

/// Clicks `element`; if the overlay intercepts the click, dismisses it and
/// tries exactly once more.
pub async fn click_through_overlay<S: RenderSession>(
    session: &mut S,
    element: &S::Element,
    target: &str,
    schema: &Schema,
    timing: &Timing,
) -> Result<(), ScrapeError> {
    if session.click(element).await? == ClickOutcome::Clicked {
        return Ok(());
    }
    info!("Click on {} obstructed, dismissing overlay", target);
    dismiss_blocking_overlay(session, schema, timing).await;
    match session.click(element).await? {
        ClickOutcome::Clicked => Ok(()),
        ClickOutcome::Obstructed => {
            warn!("Click on {} obstructed again", target);
            Err(ScrapeError::Obstructed {
                target: target.to_string(),
            })
        }
    }
}
