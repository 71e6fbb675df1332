//! The extraction engine.
//!
//! Reads one note from a live page. Acquisition runs as a chain: the
//! embedded state first, then the rendered DOM (or, when the DOM script
//! fails, the static markup). The DOM only fills what the state left empty.
//! The only terminal failures are an unreachable page and an operator abort;
//! everything else degrades into a sparser [`NoteContent`].

mod dom;
mod state;

pub use dom::{image_chain, is_fetchable, parse_css_url, DomQuery, DomSnapshot, ImageElement};
pub use state::{
    candidate_from_node, count_note_nodes, find_note_node, repair_undefined, StateError, StateParser,
    StructuredNote,
};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::config::{ExtractionConfig, SessionMarkers};
use crate::diagnostics::DiagnosticRecorder;
use crate::driver::{evaluate_as, Driver, ReadyCondition};
use crate::errors::{ConfigError, ExtractionError, FailureKind};
use crate::models::{NoteCandidate, NoteContent};
use crate::session::{self, PageSignals, SessionClassifier, SessionState};
use crate::strategy::StrategyChain;

/// Where a field of the result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// The embedded initial state.
    Structured,
    /// The DOM snapshot script.
    DomScript,
    /// The static markup, parsed when the DOM script failed.
    StaticMarkup,
    /// No stage produced it.
    #[default]
    Missing,
}

/// Provenance of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Correlation id used in the run's log events.
    pub run_id: Uuid,
    /// The requested address.
    pub address: String,
    /// Source of the title.
    pub title_source: FieldSource,
    /// Source of the image list.
    pub image_source: FieldSource,
    /// Name of the DOM image strategy that produced the images, if any.
    pub image_strategy: Option<String>,
    /// Whether the login wall was met.
    pub login_required: bool,
    /// Whether a manual login succeeded and the page was reloaded.
    pub refreshed: bool,
    /// Whether the embedded state held more than one note.
    pub multiple_notes: bool,
    /// Whether the result has no title.
    pub degraded: bool,
}

impl ExtractionReport {
    fn new(run_id: Uuid, address: &str) -> Self {
        Self {
            run_id,
            address: address.to_string(),
            title_source: FieldSource::Missing,
            image_source: FieldSource::Missing,
            image_strategy: None,
            login_required: false,
            refreshed: false,
            multiple_notes: false,
            degraded: false,
        }
    }
}

/// A merged candidate with field provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    /// The merged fields.
    pub candidate: NoteCandidate,
    /// Source of the title.
    pub title_source: FieldSource,
    /// Source of the images.
    pub image_source: FieldSource,
}

/// Merges the structured candidate with the DOM fallback.
///
/// Structured fields are never overwritten: the fallback only fills an
/// empty title, description or tag list, and its images are used only when
/// the structured list is empty.
#[must_use]
pub fn merge(
    structured: Option<NoteCandidate>,
    fallback: Option<(NoteCandidate, FieldSource)>,
) -> Merged {
    let has_structured = structured.is_some();
    let mut candidate = structured.unwrap_or_default();
    let mut title_source = if has_structured && candidate.has_title() {
        FieldSource::Structured
    } else {
        FieldSource::Missing
    };
    let mut image_source = if has_structured && candidate.has_images() {
        FieldSource::Structured
    } else {
        FieldSource::Missing
    };

    if let Some((dom, source)) = fallback {
        if !candidate.has_title() && dom.has_title() {
            candidate.title = dom.title.clone();
            title_source = source;
        }
        if candidate.description.trim().is_empty() && !dom.description.trim().is_empty() {
            candidate.description = dom.description.clone();
        }
        if candidate.tags.is_empty() {
            candidate.tags = dom.tags.clone();
        }
        if !candidate.has_images() && dom.has_images() {
            candidate.image_urls = dom.image_urls;
            image_source = source;
        }
    }

    Merged {
        candidate,
        title_source,
        image_source,
    }
}

/// Extracts notes through a [`Driver`].
pub struct ExtractionEngine<'d, D: Driver> {
    driver: &'d D,
    config: ExtractionConfig,
    classifier: SessionClassifier,
    parser: StateParser,
    dom: DomQuery,
    images: StrategyChain<DomSnapshot, Vec<String>>,
    cancellation: CancellationToken,
    diagnostics: DiagnosticRecorder,
}

impl<'d, D: Driver> ExtractionEngine<'d, D> {
    /// Creates an engine. Fails when a state pattern does not compile.
    pub fn new(
        driver: &'d D,
        config: ExtractionConfig,
        markers: SessionMarkers,
    ) -> Result<Self, ConfigError> {
        let parser = StateParser::new(&config.state_patterns)?;
        let dom = DomQuery::new(&config, &markers);
        let images = image_chain(config.min_image_dimension);
        Ok(Self {
            driver,
            config,
            classifier: SessionClassifier::new(markers),
            parser,
            dom,
            images,
            cancellation: CancellationToken::new(),
            diagnostics: DiagnosticRecorder::disabled(),
        })
    }

    /// Sets the token that aborts the manual-login wait.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Sets the diagnostic capture recorder.
    #[must_use]
    pub fn with_diagnostics(mut self, recorder: DiagnosticRecorder) -> Self {
        self.diagnostics = recorder;
        self
    }

    /// Extracts the note at `address`.
    pub async fn extract(&self, address: &str) -> Result<NoteContent, ExtractionError> {
        self.extract_with_report(address)
            .await
            .map(|(content, _)| content)
    }

    /// Extracts the note at `address` and reports where each part came from.
    pub async fn extract_with_report(
        &self,
        address: &str,
    ) -> Result<(NoteContent, ExtractionReport), ExtractionError> {
        let run_id = Uuid::new_v4();
        let mut report = ExtractionReport::new(run_id, address);
        info!(%run_id, address, "Extracting note");

        if let Err(e) = self
            .driver
            .navigate(address, ReadyCondition::NetworkIdle)
            .await
        {
            warn!(
                %run_id,
                address,
                error = %e,
                failure_kind = %FailureKind::NavigationFailure,
                "Note page did not load"
            );
            return Err(ExtractionError::from_navigation(address, e));
        }
        self.diagnostics.capture(self.driver, "navigated").await;

        let state = self.wait_until_ready().await;
        debug!(%run_id, %state, "Page ready");

        if state == SessionState::AuthenticationRequired {
            report.login_required = true;
            report.refreshed = self.recover_login(run_id).await?;
        }

        let markup = match self.driver.raw_markup().await {
            Ok(markup) => markup,
            Err(e) => {
                warn!(%run_id, error = %e, "Could not read page markup");
                String::new()
            }
        };

        let structured = match self.parser.parse(&markup) {
            Ok(note) => {
                if note.ambiguous {
                    warn!(
                        %run_id,
                        failure_kind = %FailureKind::ExtractionAmbiguous,
                        "Embedded state holds several notes, using the first"
                    );
                    report.multiple_notes = true;
                }
                Some(note.candidate)
            }
            Err(e) => {
                info!(%run_id, reason = %e, "No structured note, falling back to DOM");
                None
            }
        };

        let needs_dom = structured
            .as_ref()
            .map_or(true, |c| !c.has_title() || !c.has_images());
        let fallback = if needs_dom {
            Some(self.dom_candidate(&markup, &mut report).await)
        } else {
            None
        };

        let merged = merge(structured, fallback);
        report.title_source = merged.title_source;
        report.image_source = merged.image_source;
        let content = NoteContent::from(merged.candidate);
        report.degraded = content.title().is_empty();

        if report.degraded {
            warn!(
                %run_id,
                address,
                failure_kind = %FailureKind::ExtractionAmbiguous,
                "No title found, returning degraded note"
            );
        }
        info!(
            %run_id,
            title_source = ?report.title_source,
            image_source = ?report.image_source,
            images = content.image_urls().len(),
            tags = content.tags().len(),
            "Extraction finished"
        );
        Ok((content, report))
    }

    async fn signals(&self) -> PageSignals {
        session::probe(self.driver, self.classifier.markers()).await
    }

    /// Polls until a title, the login wall or the embedded state shows up.
    /// Timing out is not an error; the last classification is returned.
    async fn wait_until_ready(&self) -> SessionState {
        let deadline = Instant::now() + self.config.ready_timeout();
        loop {
            let signals = self.signals().await;
            let state = self.classifier.classify(&signals);
            if state == SessionState::AuthenticationRequired
                || self.classifier.has_valid_title(&signals)
                || signals.has_state_blob
            {
                return state;
            }
            if Instant::now() >= deadline {
                warn!(
                    after = ?self.config.ready_timeout(),
                    %state,
                    "Page readiness wait timed out, continuing"
                );
                return state;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn wait_for_title(&self) {
        loop {
            let signals = self.signals().await;
            if self.classifier.has_valid_title(&signals) {
                return;
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Waits for a manual login. Returns whether the page was reloaded.
    async fn recover_login(&self, run_id: Uuid) -> Result<bool, ExtractionError> {
        let window = self.config.login_window();
        warn!(
            %run_id,
            failure_kind = %FailureKind::SessionExpired,
            window_secs = window.as_secs(),
            "Login required, waiting for a manual login in the browser window"
        );
        self.diagnostics.capture(self.driver, "login_required").await;

        let waited = self
            .cancellation
            .run_until_cancelled(tokio::time::timeout(window, self.wait_for_title()))
            .await;
        match waited {
            None => Err(self.cancelled()),
            Some(Err(_)) => {
                warn!(%run_id, "Login window elapsed, continuing in degraded mode");
                Ok(false)
            }
            Some(Ok(())) => {
                info!(%run_id, "Login detected, reloading page");
                if !self.cancellation.sleep(self.config.reload_pause()).await {
                    return Err(self.cancelled());
                }
                if let Err(e) = self.driver.reload().await {
                    warn!(%run_id, error = %e, "Reload after login failed");
                }
                self.wait_until_ready().await;
                Ok(true)
            }
        }
    }

    fn cancelled(&self) -> ExtractionError {
        ExtractionError::Cancelled(
            self.cancellation
                .reason()
                .unwrap_or_else(|| "cancelled".to_string()),
        )
    }

    /// Builds the DOM candidate, from the live page or the static markup.
    async fn dom_candidate(
        &self,
        markup: &str,
        report: &mut ExtractionReport,
    ) -> (NoteCandidate, FieldSource) {
        let (snapshot, source) =
            match evaluate_as::<DomSnapshot, D>(self.driver, &self.dom.script()).await {
                Ok(snapshot) => (snapshot, FieldSource::DomScript),
                Err(e) => {
                    warn!(error = %e, "DOM script failed, reading static markup");
                    (self.dom.snapshot_from_markup(markup), FieldSource::StaticMarkup)
                }
            };

        let image_urls = match self.images.run(&snapshot).await {
            Ok(resolution) => {
                report.image_strategy = Some(resolution.strategy);
                resolution.value
            }
            Err(exhausted) => {
                debug!(error = %exhausted, "No DOM images");
                Vec::new()
            }
        };

        let candidate = NoteCandidate {
            title: snapshot.title,
            description: snapshot.description,
            tags: snapshot.tags,
            image_urls,
        };
        (candidate, source)
    }
}

impl<D: Driver> std::fmt::Debug for ExtractionEngine<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field("config", &self.config)
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}
