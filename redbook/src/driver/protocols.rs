//! Protocol traits for the automation driver.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{DriverError, DriverResult};

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyCondition {
    /// The load event fired.
    Load,
    /// The load event fired and no new network resources appeared for the
    /// driver's idle window.
    #[default]
    NetworkIdle,
}

/// An armed one-shot interception of the native file-selection dialog.
///
/// Obtained from [`Driver::intercept_next_file_dialog`] before the dialog is
/// triggered, so a dialog opening immediately is not missed. While armed,
/// native dialogs on the page are swallowed; callers must [`disarm`] on
/// every path, including when the dialog was never triggered.
///
/// [`disarm`]: FileDialog::disarm
#[async_trait]
pub trait FileDialog: Send {
    /// Waits for the dialog to open and answers it with all files at once.
    ///
    /// Fails with [`DriverError::Timeout`] if the dialog never opened within
    /// the bound given when arming.
    async fn accept(&mut self, files: &[PathBuf]) -> DriverResult<()>;

    /// Releases the interception so later dialogs reach the operator.
    async fn disarm(self: Box<Self>);
}

/// Capability contract of a browser automation session.
///
/// Implementations drive exactly one page; callers never use a driver from
/// two flows at once.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Loads an address and waits for the ready condition.
    async fn navigate(&self, address: &str, ready: ReadyCondition) -> DriverResult<()>;

    /// Reloads the current page and waits for network idle.
    async fn reload(&self) -> DriverResult<()>;

    /// Evaluates a script in page context and returns its JSON value.
    ///
    /// Promises are awaited. `undefined` comes back as `null`.
    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;

    /// Polls a boolean script expression until it holds or the bound elapses.
    ///
    /// Returns `Ok(false)` on timeout.
    async fn wait_for(&self, predicate: &str, timeout: Duration) -> DriverResult<bool>;

    /// Arms interception of the next native file dialog.
    async fn intercept_next_file_dialog(&self, timeout: Duration) -> DriverResult<Box<dyn FileDialog>>;

    /// Captures the visible frame as a PNG.
    async fn capture_frame(&self, path: &Path) -> DriverResult<()>;

    /// Returns the current page address.
    async fn current_address(&self) -> DriverResult<String>;

    /// Returns the current rendered markup.
    async fn raw_markup(&self) -> DriverResult<String>;
}

/// Evaluates a script and deserializes its value.
pub async fn evaluate_as<T, D>(driver: &D, script: &str) -> DriverResult<T>
where
    T: DeserializeOwned,
    D: Driver + ?Sized,
{
    let value = driver.evaluate(script).await?;
    serde_json::from_value(value).map_err(|e| DriverError::Script(e.to_string()))
}
