//! Scripted in-memory driver.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::driver::{Driver, FileDialog, ReadyCondition};
use crate::errors::{DriverError, DriverResult};
use crate::session::{PageSignals, SIGNALS_TAG};

/// How the next file dialog behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogBehavior {
    /// The dialog opens and takes the files.
    #[default]
    Accept,
    /// Interception cannot be armed.
    ArmFails,
    /// The dialog never opens; `accept` times out.
    NeverOpens,
}

/// How navigation fails, if it does.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NavigationFailure {
    Error(String),
    Timeout(Duration),
}

#[derive(Debug)]
struct ScriptResponse {
    pattern: String,
    queue: VecDeque<Value>,
    last: Value,
}

/// A [`Driver`] whose page is a script.
///
/// Evaluations are answered by the first registered response whose pattern
/// occurs in the script; unanswered scripts fail like a throwing page
/// script. Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    address: Mutex<String>,
    address_queue: Mutex<VecDeque<String>>,
    markup: Mutex<String>,
    responses: Mutex<Vec<ScriptResponse>>,
    navigation_failure: Mutex<Option<NavigationFailure>>,
    navigation_redirect: Mutex<Option<String>>,
    dialog: Mutex<DialogBehavior>,
    navigations: Mutex<Vec<String>>,
    reloads: Mutex<usize>,
    scripts: Mutex<Vec<String>>,
    dialogs_armed: Mutex<usize>,
    dialogs_disarmed: Arc<Mutex<usize>>,
    uploads: Arc<Mutex<Vec<Vec<PathBuf>>>>,
    captures: Mutex<Vec<PathBuf>>,
}

impl ScriptedDriver {
    /// Creates a driver on a blank page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current address.
    pub fn set_address(&self, address: impl Into<String>) {
        *self.address.lock() = address.into();
    }

    /// Queues addresses returned by successive `current_address` calls.
    /// The last one sticks.
    pub fn queue_addresses<I, S>(&self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.address_queue
            .lock()
            .extend(addresses.into_iter().map(Into::into));
    }

    /// Sets the raw markup.
    pub fn set_markup(&self, markup: impl Into<String>) {
        *self.markup.lock() = markup.into();
    }

    /// Answers every script containing `pattern` with `value`.
    ///
    /// Registering the same pattern again replaces the earlier answer.
    pub fn respond(&self, pattern: &str, value: Value) {
        self.respond_sequence(pattern, vec![value]);
    }

    /// Answers scripts containing `pattern` with successive values; the last
    /// one repeats.
    pub fn respond_sequence(&self, pattern: &str, values: Vec<Value>) {
        let mut queue: VecDeque<Value> = values.into();
        let last = queue.pop_back().unwrap_or(Value::Null);
        let mut responses = self.responses.lock();
        responses.retain(|r| r.pattern != pattern);
        responses.push(ScriptResponse {
            pattern: pattern.to_string(),
            queue,
            last,
        });
    }

    /// Answers the session probe with fixed signals.
    pub fn set_signals(&self, signals: &PageSignals) {
        self.respond(SIGNALS_TAG, signals_value(signals));
    }

    /// Answers successive session probes; the last one repeats.
    pub fn signals_sequence(&self, signals: &[PageSignals]) {
        self.respond_sequence(SIGNALS_TAG, signals.iter().map(signals_value).collect());
    }

    /// Makes navigation fail.
    pub fn fail_navigation(&self, message: impl Into<String>) {
        *self.navigation_failure.lock() = Some(NavigationFailure::Error(message.into()));
    }

    /// Makes navigation time out.
    pub fn time_out_navigation(&self, after: Duration) {
        *self.navigation_failure.lock() = Some(NavigationFailure::Timeout(after));
    }

    /// Makes every navigation land on `address` instead of the target.
    pub fn redirect_navigation(&self, address: impl Into<String>) {
        *self.navigation_redirect.lock() = Some(address.into());
    }

    /// Sets the behavior of file dialogs armed from now on.
    pub fn set_dialog(&self, behavior: DialogBehavior) {
        *self.dialog.lock() = behavior;
    }

    /// Returns the requested navigation targets.
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    /// Returns the number of reloads.
    #[must_use]
    pub fn reload_count(&self) -> usize {
        *self.reloads.lock()
    }

    /// Returns every evaluated script.
    #[must_use]
    pub fn evaluated_scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    /// Returns how many evaluated scripts contained `pattern`.
    #[must_use]
    pub fn evaluation_count(&self, pattern: &str) -> usize {
        self.scripts
            .lock()
            .iter()
            .filter(|s| s.contains(pattern))
            .count()
    }

    /// Returns how many file dialogs were armed.
    #[must_use]
    pub fn dialogs_armed(&self) -> usize {
        *self.dialogs_armed.lock()
    }

    /// Returns how many armed file dialogs were released.
    #[must_use]
    pub fn dialogs_disarmed(&self) -> usize {
        *self.dialogs_disarmed.lock()
    }

    /// Returns the file lists handed to accepted dialogs.
    #[must_use]
    pub fn uploads(&self) -> Vec<Vec<PathBuf>> {
        self.uploads.lock().clone()
    }

    /// Returns the requested frame capture paths.
    #[must_use]
    pub fn captures(&self) -> Vec<PathBuf> {
        self.captures.lock().clone()
    }

    fn answer(&self, script: &str) -> Option<Value> {
        let mut responses = self.responses.lock();
        let response = responses
            .iter_mut()
            .find(|r| script.contains(r.pattern.as_str()))?;
        Some(
            response
                .queue
                .pop_front()
                .unwrap_or_else(|| response.last.clone()),
        )
    }
}

fn signals_value(signals: &PageSignals) -> Value {
    serde_json::to_value(signals).unwrap_or_default()
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn navigate(&self, address: &str, _ready: ReadyCondition) -> DriverResult<()> {
        self.navigations.lock().push(address.to_string());
        if let Some(failure) = self.navigation_failure.lock().clone() {
            return Err(match failure {
                NavigationFailure::Error(message) => DriverError::Navigation {
                    address: address.to_string(),
                    message,
                },
                NavigationFailure::Timeout(after) => DriverError::timeout("navigation", after),
            });
        }
        let landed = self
            .navigation_redirect
            .lock()
            .clone()
            .unwrap_or_else(|| address.to_string());
        self.set_address(landed);
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        *self.reloads.lock() += 1;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<Value> {
        self.scripts.lock().push(script.to_string());
        self.answer(script)
            .ok_or_else(|| DriverError::Script("no scripted response".to_string()))
    }

    async fn wait_for(&self, predicate: &str, timeout: Duration) -> DriverResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if matches!(self.evaluate(predicate).await, Ok(Value::Bool(true))) {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep((deadline - now).min(Duration::from_millis(250))).await;
        }
    }

    async fn intercept_next_file_dialog(
        &self,
        timeout: Duration,
    ) -> DriverResult<Box<dyn FileDialog>> {
        *self.dialogs_armed.lock() += 1;
        let behavior = *self.dialog.lock();
        if behavior == DialogBehavior::ArmFails {
            return Err(DriverError::Dialog("interception unavailable".to_string()));
        }
        Ok(Box::new(ScriptedDialog {
            behavior,
            timeout,
            uploads: Arc::clone(&self.uploads),
            disarmed: Arc::clone(&self.dialogs_disarmed),
        }))
    }

    async fn capture_frame(&self, path: &Path) -> DriverResult<()> {
        self.captures.lock().push(path.to_path_buf());
        std::fs::write(path, b"")?;
        Ok(())
    }

    async fn current_address(&self) -> DriverResult<String> {
        if let Some(next) = self.address_queue.lock().pop_front() {
            self.set_address(next);
        }
        Ok(self.address.lock().clone())
    }

    async fn raw_markup(&self) -> DriverResult<String> {
        Ok(self.markup.lock().clone())
    }
}

struct ScriptedDialog {
    behavior: DialogBehavior,
    timeout: Duration,
    uploads: Arc<Mutex<Vec<Vec<PathBuf>>>>,
    disarmed: Arc<Mutex<usize>>,
}

#[async_trait]
impl FileDialog for ScriptedDialog {
    async fn accept(&mut self, files: &[PathBuf]) -> DriverResult<()> {
        if self.behavior == DialogBehavior::NeverOpens {
            tokio::time::sleep(self.timeout).await;
            return Err(DriverError::timeout("file dialog", self.timeout));
        }
        self.uploads.lock().push(files.to_vec());
        Ok(())
    }

    async fn disarm(self: Box<Self>) {
        *self.disarmed.lock() += 1;
    }
}
