//! Chromium DevTools implementation of the driver.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventFileChooserOpened, SetInterceptFileChooserDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Handler, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::profile::SessionProfile;
use super::protocols::{Driver, FileDialog, ReadyCondition};
use crate::config::DriverConfig;
use crate::errors::{DriverError, DriverResult};

const WAIT_FOR_POLL: Duration = Duration::from_millis(250);

fn protocol_error(e: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(e.to_string())
}

/// A driver backed by a Chromium page over the DevTools protocol.
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
    attached: bool,
    navigation_timeout: Duration,
    network_idle: Duration,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("closed", &self.is_closed())
            .field("attached", &self.attached)
            .field("navigation_timeout", &self.navigation_timeout)
            .finish_non_exhaustive()
    }
}

impl ChromiumDriver {
    /// Launches a browser on the profile, or attaches to the one named by
    /// `remote_debugging_url`.
    pub async fn launch(config: &DriverConfig, profile: &SessionProfile) -> DriverResult<Self> {
        let (browser, handler, attached) = match config.remote_debugging_url.as_deref() {
            Some(endpoint) => {
                let ws_url = discover_websocket_url(endpoint).await?;
                info!(endpoint = %endpoint, "Attaching to running browser");
                let (browser, handler) = Browser::connect(ws_url)
                    .await
                    .map_err(|e| DriverError::Launch(e.to_string()))?;
                (browser, handler, true)
            }
            None => {
                profile.ensure_exists()?;
                info!(
                    user_data_dir = %profile.user_data_dir().display(),
                    headless = config.headless,
                    "Launching browser"
                );
                let browser_config = build_browser_config(config, profile)?;
                let (browser, handler) = Browser::launch(browser_config)
                    .await
                    .map_err(|e| DriverError::Launch(e.to_string()))?;
                (browser, handler, false)
            }
        };

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = if attached {
            match browser.pages().await {
                Ok(mut pages) if !pages.is_empty() => pages.remove(0),
                _ => browser.new_page("about:blank").await.map_err(protocol_error)?,
            }
        } else {
            browser.new_page("about:blank").await.map_err(protocol_error)?
        };

        if let Some(user_agent) = config.user_agent.as_deref() {
            let params = SetUserAgentOverrideParams::new(user_agent);
            if let Err(e) = page.set_user_agent(params).await {
                warn!(error = %e, "Could not override user agent");
            }
        }

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            page,
            handler_task,
            closed,
            attached,
            navigation_timeout: config.navigation_timeout(),
            network_idle: config.network_idle(),
        })
    }

    /// Whether the DevTools connection dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes a launched browser and stops the event handler. An attached
    /// browser is only disconnected from.
    pub async fn close(self) {
        if !self.attached {
            if let Err(e) = self.browser.lock().await.close().await {
                debug!(error = %e, "Browser close failed");
            }
        }
        self.handler_task.abort();
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_closed() {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    async fn wait_for_network_idle(&self, bound: Duration) {
        let script = network_idle_script(bound, self.network_idle);
        match self.evaluate(&script).await {
            Ok(info) => {
                let ok = info.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false);
                let waited = info.get("waitedMs").and_then(serde_json::Value::as_u64).unwrap_or(0);
                if ok {
                    debug!(waited_ms = waited, "Network idle reached");
                } else {
                    warn!(waited_ms = waited, "Network idle not reached, continuing");
                }
            }
            Err(e) => warn!(error = %e, "Network idle probe failed"),
        }
    }
}

fn build_browser_config(config: &DriverConfig, profile: &SessionProfile) -> DriverResult<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .user_data_dir(profile.user_data_dir())
        .args(config.launch_args.iter().cloned());

    if !config.headless {
        builder = builder.with_head();
    }
    builder = match config.viewport {
        Some(viewport) => builder
            .viewport(Some(CdpViewport {
                width: viewport.width,
                height: viewport.height,
                ..CdpViewport::default()
            }))
            .window_size(viewport.width, viewport.height),
        None => builder.viewport(None),
    };
    if let Some(executable) = config.executable.as_ref() {
        builder = builder.chrome_executable(executable);
    }

    builder.build().map_err(DriverError::Launch)
}

/// Resolves the browser websocket URL from a DevTools HTTP endpoint.
async fn discover_websocket_url(endpoint: &str) -> DriverResult<String> {
    let json_url = format!("{}/json/version", endpoint.trim_end_matches('/'));
    let response = reqwest::get(&json_url)
        .await
        .map_err(|e| DriverError::Launch(format!("DevTools endpoint unreachable: {e}")))?;
    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| DriverError::Launch(format!("DevTools endpoint returned invalid JSON: {e}")))?;
    json["webSocketDebuggerUrl"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| DriverError::Launch("No webSocketDebuggerUrl in DevTools response".to_string()))
}

fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!(error = %e, "DevTools handler event error");
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

/// Page scripts run with user activation, as if the operator had clicked.
/// Without it the site's upload trigger cannot open a file chooser.
fn evaluate_params(script: &str) -> DriverResult<EvaluateParams> {
    EvaluateParams::builder()
        .expression(script)
        .await_promise(true)
        .return_by_value(true)
        .user_gesture(true)
        .build()
        .map_err(DriverError::Script)
}

fn network_idle_script(bound: Duration, idle: Duration) -> String {
    let timeout_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(1000);
    format!(
        r"(async () => {{
            const timeoutMs = {timeout_ms};
            const idleMs = {idle_ms};
            const interval = 250;
            const start = Date.now();
            const count = () => {{
                try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }}
            }};
            let last = count();
            let stable = 0;
            while (Date.now() - start < timeoutMs) {{
                await new Promise(r => setTimeout(r, interval));
                const current = count();
                if (document.readyState === 'complete' && current === last) {{
                    stable += interval;
                    if (stable >= idleMs) return {{ ok: true, waitedMs: Date.now() - start }};
                }} else {{
                    stable = 0;
                }}
                last = current;
            }}
            return {{ ok: false, waitedMs: Date.now() - start }};
        }})()"
    )
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn navigate(&self, address: &str, ready: ReadyCondition) -> DriverResult<()> {
        self.ensure_open()?;
        debug!(address = %address, "Navigating");
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(address)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(DriverError::Navigation {
                    address: address.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => return Err(DriverError::timeout("navigation", self.navigation_timeout)),
        }
        if ready == ReadyCondition::NetworkIdle {
            self.wait_for_network_idle(self.navigation_timeout).await;
        }
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        self.ensure_open()?;
        match tokio::time::timeout(self.navigation_timeout, self.page.reload()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(protocol_error(e)),
            Err(_) => return Err(DriverError::timeout("reload", self.navigation_timeout)),
        }
        self.wait_for_network_idle(self.navigation_timeout).await;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        self.ensure_open()?;
        let params = evaluate_params(script)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for(&self, predicate: &str, timeout: Duration) -> DriverResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        let script = format!("Boolean({predicate})");
        loop {
            match self.evaluate(&script).await {
                Ok(serde_json::Value::Bool(true)) => return Ok(true),
                Ok(_) => {}
                Err(DriverError::Closed) => return Err(DriverError::Closed),
                Err(e) => debug!(error = %e, "wait_for predicate threw"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(WAIT_FOR_POLL).await;
        }
    }

    async fn intercept_next_file_dialog(&self, timeout: Duration) -> DriverResult<Box<dyn FileDialog>> {
        self.ensure_open()?;
        let events = self
            .page
            .event_listener::<EventFileChooserOpened>()
            .await
            .map_err(|e| DriverError::Dialog(e.to_string()))?;
        self.page
            .execute(SetInterceptFileChooserDialogParams::new(true))
            .await
            .map_err(|e| DriverError::Dialog(e.to_string()))?;
        Ok(Box::new(ChromiumFileDialog {
            page: self.page.clone(),
            events,
            timeout,
        }))
    }

    async fn capture_frame(&self, path: &Path) -> DriverResult<()> {
        self.ensure_open()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(protocol_error)?;
        Ok(())
    }

    async fn current_address(&self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self.page.url().await.map_err(protocol_error)?.unwrap_or_default())
    }

    async fn raw_markup(&self) -> DriverResult<String> {
        self.ensure_open()?;
        self.page.content().await.map_err(protocol_error)
    }
}

struct ChromiumFileDialog {
    page: Page,
    events: EventStream<EventFileChooserOpened>,
    timeout: Duration,
}

#[async_trait]
impl FileDialog for ChromiumFileDialog {
    async fn accept(&mut self, files: &[PathBuf]) -> DriverResult<()> {
        let event = match tokio::time::timeout(self.timeout, self.events.next()).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(DriverError::Closed),
            Err(_) => return Err(DriverError::timeout("file dialog", self.timeout)),
        };

        match event.backend_node_id.clone() {
            Some(node) => {
                // The protocol resolves paths in the browser process.
                let paths = files.iter().map(|p| {
                    std::path::absolute(p)
                        .unwrap_or_else(|_| p.clone())
                        .display()
                        .to_string()
                });
                match SetFileInputFilesParams::builder()
                    .files(paths)
                    .backend_node_id(node)
                    .build()
                {
                    Ok(params) => self
                        .page
                        .execute(params)
                        .await
                        .map(|_| ())
                        .map_err(|e| DriverError::Dialog(e.to_string())),
                    Err(e) => Err(DriverError::Dialog(e)),
                }
            }
            None => Err(DriverError::Dialog(
                "file chooser opened without a backing input element".to_string(),
            )),
        }
    }

    async fn disarm(self: Box<Self>) {
        if let Err(e) = self
            .page
            .execute(SetInterceptFileChooserDialogParams::new(false))
            .await
        {
            debug!(error = %e, "Could not disable file chooser interception");
        }
    }
}
