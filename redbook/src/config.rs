//! Configuration for the driver, the session classifier and both engines.
//!
//! Every field has a default, so a TOML file only needs to name the values
//! it overrides. Durations are stored as fractional seconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedbookConfig {
    /// Browser launch/attach settings.
    #[serde(default)]
    pub driver: DriverConfig,
    /// Markers used by the session classifier.
    #[serde(default)]
    pub session: SessionMarkers,
    /// Extraction engine settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Publication engine settings.
    #[serde(default)]
    pub publication: PublicationConfig,
}

impl RedbookConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document and validates it.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validates all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.driver.validate()?;
        self.extraction.validate()?;
        self.publication.validate()
    }
}

/// Converts configured seconds; values that cannot be a duration become zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn ensure_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be zero or a positive number of seconds"))
    }
}

fn ensure_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be a positive number of seconds"))
    }
}

/// Browser viewport size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

/// Configuration for launching or attaching to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Run without a visible window. Manual login needs a window, so this is
    /// off by default.
    #[serde(default)]
    pub headless: bool,
    /// Fixed viewport; `None` uses the window size.
    #[serde(default = "default_viewport")]
    pub viewport: Option<Viewport>,
    /// User agent override.
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
    /// Upper bound for a navigation to finish, in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_seconds: f64,
    /// Quiet period with no new network resources that counts as idle.
    #[serde(default = "default_network_idle")]
    pub network_idle_seconds: f64,
    /// DevTools HTTP endpoint of an already running browser
    /// (e.g. `http://127.0.0.1:9222`). When set the driver attaches instead
    /// of launching.
    #[serde(default)]
    pub remote_debugging_url: Option<String>,
    /// Browser executable override.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Extra command-line switches for a launched browser.
    #[serde(default = "default_launch_args")]
    pub launch_args: Vec<String>,
}

fn default_viewport() -> Option<Viewport> {
    Some(Viewport {
        width: 1280,
        height: 800,
    })
}

fn default_user_agent() -> Option<String> {
    Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .to_string(),
    )
}

fn default_navigation_timeout() -> f64 {
    60.0
}

fn default_network_idle() -> f64 {
    1.0
}

fn default_launch_args() -> Vec<String> {
    strings(&[
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-blink-features=AutomationControlled",
        "--no-first-run",
        "--no-default-browser-check",
    ])
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: false,
            viewport: default_viewport(),
            user_agent: default_user_agent(),
            navigation_timeout_seconds: default_navigation_timeout(),
            network_idle_seconds: default_network_idle(),
            remote_debugging_url: None,
            executable: None,
            launch_args: default_launch_args(),
        }
    }
}

impl DriverConfig {
    /// Creates a driver configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to a running browser instead of launching one.
    #[must_use]
    pub fn with_remote_debugging_url(mut self, url: impl Into<String>) -> Self {
        self.remote_debugging_url = Some(url.into());
        self
    }

    /// Sets headless mode.
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Gets the navigation timeout as Duration.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        seconds(self.navigation_timeout_seconds)
    }

    /// Gets the network idle window as Duration.
    #[must_use]
    pub fn network_idle(&self) -> Duration {
        seconds(self.network_idle_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("driver.navigation_timeout_seconds", self.navigation_timeout_seconds)?;
        ensure_positive("driver.network_idle_seconds", self.network_idle_seconds)
    }
}

/// Page markers the session classifier looks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMarkers {
    /// Address segment of the login page.
    #[serde(default = "default_login_segment")]
    pub login_path_segment: String,
    /// Address segment of the publish page.
    #[serde(default = "default_publish_segment")]
    pub publish_path_segment: String,
    /// Body texts shown only on the login wall.
    #[serde(default = "default_login_prompts")]
    pub login_prompt_texts: Vec<String>,
    /// Document-title fragment of the login page.
    #[serde(default = "default_login_title_marker")]
    pub login_title_marker: String,
    /// Elements present only on the login wall.
    #[serde(default = "default_login_selectors")]
    pub login_selectors: Vec<String>,
    /// Elements holding the note title once content rendered.
    #[serde(default = "default_title_selectors")]
    pub title_selectors: Vec<String>,
    /// Global variable holding the embedded initial state.
    #[serde(default = "default_state_global")]
    pub state_global: String,
}

fn default_login_segment() -> String {
    "login".to_string()
}

fn default_publish_segment() -> String {
    "publish".to_string()
}

fn default_login_prompts() -> Vec<String> {
    strings(&["手机号登录"])
}

fn default_login_title_marker() -> String {
    "登录".to_string()
}

fn default_login_selectors() -> Vec<String> {
    strings(&[".login-container"])
}

fn default_title_selectors() -> Vec<String> {
    strings(&[".title", "#detail-title"])
}

fn default_state_global() -> String {
    "__INITIAL_STATE__".to_string()
}

impl Default for SessionMarkers {
    fn default() -> Self {
        Self {
            login_path_segment: default_login_segment(),
            publish_path_segment: default_publish_segment(),
            login_prompt_texts: default_login_prompts(),
            login_title_marker: default_login_title_marker(),
            login_selectors: default_login_selectors(),
            title_selectors: default_title_selectors(),
            state_global: default_state_global(),
        }
    }
}

/// Configuration for the extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Bound on the initial readiness wait, in seconds.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_seconds: f64,
    /// Interval between readiness probes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: f64,
    /// Window granted for a manual login.
    #[serde(default = "default_login_window")]
    pub login_window_seconds: f64,
    /// Pause before reloading after a manual login.
    #[serde(default = "default_reload_pause")]
    pub reload_pause_seconds: f64,
    /// Regex patterns locating the embedded state blob, tried in order.
    /// The first capture group must hold the blob.
    #[serde(default = "default_state_patterns")]
    pub state_patterns: Vec<String>,
    /// Elements holding the note description.
    #[serde(default = "default_description_selectors")]
    pub description_selectors: Vec<String>,
    /// Elements holding the note tags.
    #[serde(default = "default_tag_selectors")]
    pub tag_selectors: Vec<String>,
    /// Carousel slide elements carrying background images.
    #[serde(default = "default_slide_selector")]
    pub slide_selector: String,
    /// Image elements inside known content containers.
    #[serde(default = "default_image_selectors")]
    pub image_selectors: Vec<String>,
    /// Images must exceed this width or height (pixels) to count.
    #[serde(default = "default_min_image_dimension")]
    pub min_image_dimension: u32,
}

fn default_ready_timeout() -> f64 {
    15.0
}

fn default_poll_interval() -> f64 {
    0.5
}

fn default_login_window() -> f64 {
    120.0
}

fn default_reload_pause() -> f64 {
    2.0
}

fn default_state_patterns() -> Vec<String> {
    strings(&[
        r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.+?\})\s*;?\s*</script>",
        r"(?s)__INITIAL_STATE__\s*=\s*(\{.+?\});",
        r"<script>window\.__INITIAL_STATE__=(.+?)</script>",
    ])
}

fn default_description_selectors() -> Vec<String> {
    strings(&[".desc", "#detail-desc"])
}

fn default_tag_selectors() -> Vec<String> {
    strings(&[".tag", "#detail-tag"])
}

fn default_slide_selector() -> String {
    ".swiper-slide".to_string()
}

fn default_image_selectors() -> Vec<String> {
    strings(&[".note-content img", ".media-container img", "main img"])
}

fn default_min_image_dimension() -> u32 {
    200
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_seconds: default_ready_timeout(),
            poll_interval_seconds: default_poll_interval(),
            login_window_seconds: default_login_window(),
            reload_pause_seconds: default_reload_pause(),
            state_patterns: default_state_patterns(),
            description_selectors: default_description_selectors(),
            tag_selectors: default_tag_selectors(),
            slide_selector: default_slide_selector(),
            image_selectors: default_image_selectors(),
            min_image_dimension: default_min_image_dimension(),
        }
    }
}

impl ExtractionConfig {
    /// Creates an extraction configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the readiness bound.
    #[must_use]
    pub fn with_ready_timeout(mut self, seconds: f64) -> Self {
        self.ready_timeout_seconds = seconds;
        self
    }

    /// Sets the manual login window.
    #[must_use]
    pub fn with_login_window(mut self, seconds: f64) -> Self {
        self.login_window_seconds = seconds;
        self
    }

    /// Adds a state pattern after the defaults.
    #[must_use]
    pub fn with_state_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.state_patterns.push(pattern.into());
        self
    }

    /// Gets the readiness bound as Duration.
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        seconds(self.ready_timeout_seconds)
    }

    /// Gets the poll interval as Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        seconds(self.poll_interval_seconds)
    }

    /// Gets the login window as Duration.
    #[must_use]
    pub fn login_window(&self) -> Duration {
        seconds(self.login_window_seconds)
    }

    /// Gets the reload pause as Duration.
    #[must_use]
    pub fn reload_pause(&self) -> Duration {
        seconds(self.reload_pause_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("extraction.ready_timeout_seconds", self.ready_timeout_seconds)?;
        ensure_positive("extraction.poll_interval_seconds", self.poll_interval_seconds)?;
        ensure_positive("extraction.login_window_seconds", self.login_window_seconds)?;
        ensure_non_negative("extraction.reload_pause_seconds", self.reload_pause_seconds)?;
        if self.state_patterns.is_empty() {
            return Err(ConfigError::invalid(
                "extraction.state_patterns",
                "at least one pattern is required",
            ));
        }
        for pattern in &self.state_patterns {
            regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// Configuration for the publication engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationConfig {
    /// Address of the creator publish page.
    #[serde(default = "default_publish_url")]
    pub publish_url: String,
    /// Exact visible labels of the image-post tab.
    #[serde(default = "default_tab_labels")]
    pub tab_labels: Vec<String>,
    /// Elements searched for a tab label.
    #[serde(default = "default_tab_text_scope")]
    pub tab_text_scope: String,
    /// Generic tab elements for the positional fallback.
    #[serde(default = "default_tab_list_selector")]
    pub tab_list_selector: String,
    /// Position of the image tab in the generic tab list.
    #[serde(default = "default_tab_fallback_index")]
    pub tab_fallback_index: usize,
    /// Pause after switching tabs.
    #[serde(default = "default_tab_switch_pause")]
    pub tab_switch_pause_seconds: f64,
    /// Visible texts of the upload trigger.
    #[serde(default = "default_upload_texts")]
    pub upload_texts: Vec<String>,
    /// Elements searched for an upload text.
    #[serde(default = "default_upload_text_scope")]
    pub upload_text_scope: String,
    /// Generic upload trigger selectors, tried in order.
    #[serde(default = "default_upload_selectors")]
    pub upload_selectors: Vec<String>,
    /// Bound on the file dialog appearing after the trigger.
    #[serde(default = "default_dialog_timeout")]
    pub dialog_timeout_seconds: f64,
    /// Delay granted to the page to process the upload.
    #[serde(default = "default_upload_settle")]
    pub upload_settle_seconds: f64,
    /// Upload attempts before giving up. Login recoveries don't count.
    #[serde(default = "default_max_upload_attempts")]
    pub max_upload_attempts: usize,
    /// Pause between failed upload attempts.
    #[serde(default = "default_retry_pause")]
    pub retry_pause_seconds: f64,
    /// Interval between address checks while waiting for a manual login.
    #[serde(default = "default_login_poll")]
    pub login_poll_seconds: f64,
    /// Elements that indicate an uploaded image preview.
    #[serde(default = "default_thumbnail_selectors")]
    pub thumbnail_selectors: Vec<String>,
    /// Bound on waiting for the form fields to render.
    #[serde(default = "default_field_wait")]
    pub field_wait_seconds: f64,
    /// Title input candidates, tried in order.
    #[serde(default = "default_title_field_selectors")]
    pub title_selectors: Vec<String>,
    /// Content editor candidates, tried in order.
    #[serde(default = "default_content_selectors")]
    pub content_selectors: Vec<String>,
}

fn default_publish_url() -> String {
    "https://creator.xiaohongshu.com/publish/publish".to_string()
}

fn default_tab_labels() -> Vec<String> {
    strings(&["上传图文", "图文"])
}

fn default_tab_text_scope() -> String {
    "div, span, li, .title".to_string()
}

fn default_tab_list_selector() -> String {
    ".creator-tab, [role=\"tab\"]".to_string()
}

fn default_tab_fallback_index() -> usize {
    1
}

fn default_tab_switch_pause() -> f64 {
    2.0
}

fn default_upload_texts() -> Vec<String> {
    strings(&["点击上传", "拖拽"])
}

fn default_upload_text_scope() -> String {
    "button, div, span, p".to_string()
}

fn default_upload_selectors() -> Vec<String> {
    strings(&[
        ".upload-container",
        ".upload-wrapper",
        ".file-picker",
        ".upload-input",
        "input[type=file]",
    ])
}

fn default_dialog_timeout() -> f64 {
    15.0
}

fn default_upload_settle() -> f64 {
    5.0
}

fn default_max_upload_attempts() -> usize {
    3
}

fn default_retry_pause() -> f64 {
    2.0
}

fn default_login_poll() -> f64 {
    2.0
}

fn default_thumbnail_selectors() -> Vec<String> {
    strings(&[
        ".img-preview-area img",
        ".image-preview",
        ".preview-item",
        ".img-container img",
        ".upload-item img",
    ])
}

fn default_field_wait() -> f64 {
    5.0
}

fn default_title_field_selectors() -> Vec<String> {
    strings(&[
        "input[placeholder*=\"标题\"]",
        ".title-input input",
        "input.d-text",
    ])
}

fn default_content_selectors() -> Vec<String> {
    strings(&[
        "#post-textarea",
        ".ql-editor",
        ".c-editor",
        "div[contenteditable=\"true\"]",
    ])
}

impl Default for PublicationConfig {
    fn default() -> Self {
        Self {
            publish_url: default_publish_url(),
            tab_labels: default_tab_labels(),
            tab_text_scope: default_tab_text_scope(),
            tab_list_selector: default_tab_list_selector(),
            tab_fallback_index: default_tab_fallback_index(),
            tab_switch_pause_seconds: default_tab_switch_pause(),
            upload_texts: default_upload_texts(),
            upload_text_scope: default_upload_text_scope(),
            upload_selectors: default_upload_selectors(),
            dialog_timeout_seconds: default_dialog_timeout(),
            upload_settle_seconds: default_upload_settle(),
            max_upload_attempts: default_max_upload_attempts(),
            retry_pause_seconds: default_retry_pause(),
            login_poll_seconds: default_login_poll(),
            thumbnail_selectors: default_thumbnail_selectors(),
            field_wait_seconds: default_field_wait(),
            title_selectors: default_title_field_selectors(),
            content_selectors: default_content_selectors(),
        }
    }
}

impl PublicationConfig {
    /// Creates a publication configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the publish address.
    #[must_use]
    pub fn with_publish_url(mut self, url: impl Into<String>) -> Self {
        self.publish_url = url.into();
        self
    }

    /// Sets the upload attempt budget.
    #[must_use]
    pub fn with_max_upload_attempts(mut self, attempts: usize) -> Self {
        self.max_upload_attempts = attempts;
        self
    }

    /// Gets the tab switch pause as Duration.
    #[must_use]
    pub fn tab_switch_pause(&self) -> Duration {
        seconds(self.tab_switch_pause_seconds)
    }

    /// Gets the dialog bound as Duration.
    #[must_use]
    pub fn dialog_timeout(&self) -> Duration {
        seconds(self.dialog_timeout_seconds)
    }

    /// Gets the upload settle delay as Duration.
    #[must_use]
    pub fn upload_settle(&self) -> Duration {
        seconds(self.upload_settle_seconds)
    }

    /// Gets the retry pause as Duration.
    #[must_use]
    pub fn retry_pause(&self) -> Duration {
        seconds(self.retry_pause_seconds)
    }

    /// Gets the login poll interval as Duration.
    #[must_use]
    pub fn login_poll(&self) -> Duration {
        seconds(self.login_poll_seconds)
    }

    /// Gets the form field wait as Duration.
    #[must_use]
    pub fn field_wait(&self) -> Duration {
        seconds(self.field_wait_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_attempts == 0 {
            return Err(ConfigError::invalid(
                "publication.max_upload_attempts",
                "must be at least 1",
            ));
        }
        ensure_non_negative("publication.tab_switch_pause_seconds", self.tab_switch_pause_seconds)?;
        ensure_non_negative("publication.upload_settle_seconds", self.upload_settle_seconds)?;
        ensure_non_negative("publication.retry_pause_seconds", self.retry_pause_seconds)?;
        ensure_positive("publication.dialog_timeout_seconds", self.dialog_timeout_seconds)?;
        ensure_positive("publication.login_poll_seconds", self.login_poll_seconds)?;
        ensure_positive("publication.field_wait_seconds", self.field_wait_seconds)
    }
}
