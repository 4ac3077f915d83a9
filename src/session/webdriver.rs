use std::{
    process::{Child, Command, Stdio},
    sync::atomic::{AtomicU16, Ordering},
    time::Duration,
};

use fantoccini::{
    Client, ClientBuilder, Locator,
    elements::Element,
    error::CmdError,
};
use serde_json::json;
use tracing::{debug, error, info};
use url::Url;

use super::{ClickOutcome, RenderSession, SessionFactory};
use crate::{
    config::{Timing, WebDriverConfig},
    errors::SessionError,
};

/// A fantoccini client, plus the geckodriver process behind it when we started one.
#[derive(Debug)]
pub struct WebDriverSession {
    client: Client,
    geckodriver: Option<Child>,
}

impl WebDriverSession {
    /// Starts geckodriver on `port` if asked to, then connects to `url`.
    ///
    /// The driver needs a moment before it accepts connections, so connecting
    /// is retried every `timing.poll_interval()` until `timing.element_timeout()`.
    pub async fn connect(
        config: &WebDriverConfig,
        url: &str,
        port: Option<u16>,
        timing: &Timing,
    ) -> Result<Self, SessionError> {
        let geckodriver = match port {
            Some(port) => {
                info!("Starting {} on port {}", config.driver_path, port);
                let child = Command::new(&config.driver_path)
                    .args(["--port", &port.to_string()])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|source| SessionError::Driver {
                        path: config.driver_path.clone(),
                        source,
                    })?;
                Some(child)
            }
            None => None,
        };
        let session = Self {
            client: match Self::open_client(url, config.headless, timing).await {
                Ok(client) => client,
                Err(e) => {
                    if let Some(mut child) = geckodriver {
                        let _ = child.kill();
                        let _ = child.wait();
                    }
                    return Err(e);
                }
            },
            geckodriver,
        };
        if !config.headless {
            session.client.minimize_window().await?;
        }
        info!("Webdriver client connected to {}", url);
        Ok(session)
    }

    async fn open_client(
        url: &str,
        headless: bool,
        timing: &Timing,
    ) -> Result<Client, SessionError> {
        let mut capabilities = serde_json::Map::new();
        if headless {
            capabilities.insert(
                "moz:firefoxOptions".to_string(),
                json!({ "args": ["-headless"] }),
            );
        }
        let deadline = tokio::time::Instant::now() + timing.element_timeout();
        loop {
            match ClientBuilder::native()
                .capabilities(capabilities.clone())
                .connect(url)
                .await
            {
                Ok(client) => return Ok(client),
                Err(e) if tokio::time::Instant::now() < deadline => {
                    debug!("Webdriver not ready yet: {}", e);
                    tokio::time::sleep(timing.poll_interval()).await;
                }
                Err(e) => {
                    error!("Failed to connect to webdriver: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    fn kill_driver(&mut self) {
        if let Some(mut child) = self.geckodriver.take() {
            info!("Killing geckodriver");
            if let Err(e) = child.kill() {
                error!("Failed to kill geckodriver: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        self.kill_driver();
    }
}

fn missing<T>(result: Result<T, CmdError>) -> Result<Option<T>, SessionError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_no_such_element() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl RenderSession for WebDriverSession {
    type Element = Element;

    async fn goto(&mut self, url: &str) -> Result<(), SessionError> {
        debug!("Navigating to {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    async fn source(&mut self) -> Result<String, SessionError> {
        Ok(self.client.source().await?)
    }

    async fn find(&mut self, css: &str) -> Result<Option<Element>, SessionError> {
        missing(self.client.find(Locator::Css(css)).await)
    }

    async fn find_all(&mut self, css: &str) -> Result<Vec<Element>, SessionError> {
        Ok(self.client.find_all(Locator::Css(css)).await?)
    }

    async fn find_in(
        &mut self,
        parent: &Element,
        css: &str,
    ) -> Result<Option<Element>, SessionError> {
        missing(parent.find(Locator::Css(css)).await)
    }

    async fn find_all_in(
        &mut self,
        parent: &Element,
        css: &str,
    ) -> Result<Vec<Element>, SessionError> {
        Ok(parent.find_all(Locator::Css(css)).await?)
    }

    async fn wait_for(
        &mut self,
        css: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, SessionError> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(css))
            .await
        {
            Ok(element) => Ok(Some(element)),
            Err(CmdError::WaitTimeout) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn click(&mut self, element: &Element) -> Result<ClickOutcome, SessionError> {
        match element.click().await {
            Ok(()) => Ok(ClickOutcome::Clicked),
            Err(e) if matches!(&e, CmdError::Standard(w) if w.error == fantoccini::error::ErrorStatus::ElementClickIntercepted) => {
                debug!("Click intercepted: {}", e);
                Ok(ClickOutcome::Obstructed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn script_click(&mut self, element: &Element) -> Result<(), SessionError> {
        let argument =
            serde_json::to_value(element).map_err(|e| SessionError::Other(e.to_string()))?;
        self.client
            .execute("arguments[0].click();", vec![argument])
            .await?;
        Ok(())
    }

    async fn text(&mut self, element: &Element) -> Result<String, SessionError> {
        Ok(element.text().await?)
    }

    async fn attr(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(element.attr(name).await?)
    }

    async fn property(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(element.prop(name).await?)
    }

    async fn is_interactable(&mut self, element: &Element) -> Result<bool, SessionError> {
        Ok(element.is_displayed().await? && element.is_enabled().await?)
    }

    async fn close(mut self) -> Result<(), SessionError> {
        let result = self.client.clone().close().await;
        self.kill_driver();
        Ok(result?)
    }
}

/// Opens one WebDriver session per call. When the driver is spawned locally
/// every session gets its own geckodriver on consecutive ports.
#[derive(Debug)]
pub struct WebDriverFactory {
    config: WebDriverConfig,
    timing: Timing,
    /// Only a driver on this machine can be started by us.
    spawn: bool,
    next_port: AtomicU16,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig, timing: Timing) -> Result<Self, SessionError> {
        let url = Url::parse(&config.url)
            .map_err(|e| SessionError::Other(format!("bad webdriver url {}: {}", config.url, e)))?;
        let port = url.port_or_known_default().unwrap_or(4444);
        let local = matches!(
            url.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]")
        );
        if config.spawn_driver && !local {
            info!("{} is not local, connecting without starting a driver", config.url);
        }
        Ok(Self {
            spawn: config.spawn_driver && local,
            config,
            timing,
            next_port: AtomicU16::new(port),
        })
    }
}

impl SessionFactory for WebDriverFactory {
    type Session = WebDriverSession;

    /// An external geckodriver serves a single session.
    fn max_sessions(&self) -> Option<usize> {
        if self.spawn { None } else { Some(1) }
    }

    async fn open(&self) -> Result<WebDriverSession, SessionError> {
        if !self.spawn {
            return WebDriverSession::connect(&self.config, &self.config.url, None, &self.timing)
                .await;
        }
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| SessionError::Other(e.to_string()))?;
        url.set_port(Some(port))
            .map_err(|()| SessionError::Other(format!("cannot set port on {}", url)))?;
        WebDriverSession::connect(&self.config, url.as_str(), Some(port), &self.timing).await
    }
}
