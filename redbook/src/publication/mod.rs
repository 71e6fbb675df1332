//! The publication engine.
//!
//! Opens the creator publish page, uploads the asset list through the native
//! file dialog and fills the title and body. Session loss is recovered by
//! waiting for the operator to log in by hand; other upload failures are
//! retried a bounded number of times. The form is never submitted.

mod form;
mod login;
mod upload;

pub use upload::{tab_chain, trigger_chain};

use tracing::{info, warn};
use uuid::Uuid;

use crate::assets::AssetList;
use crate::cancellation::CancellationToken;
use crate::config::{PublicationConfig, SessionMarkers};
use crate::diagnostics::DiagnosticRecorder;
use crate::driver::{Driver, ReadyCondition};
use crate::errors::{FailureKind, PublishError};
use crate::models::{Draft, PublicationResult, UploadFailure, UploadOutcome, UploadReason};
use crate::session::{self, SessionClassifier, SessionState};
use crate::strategy::StrategyChain;

/// Publishes drafts through a [`Driver`].
pub struct PublicationEngine<'d, D: Driver> {
    driver: &'d D,
    config: PublicationConfig,
    classifier: SessionClassifier,
    tabs: StrategyChain<D, String>,
    triggers: StrategyChain<D, String>,
    cancellation: CancellationToken,
    diagnostics: DiagnosticRecorder,
}

impl<'d, D: Driver> PublicationEngine<'d, D> {
    /// Creates an engine.
    #[must_use]
    pub fn new(driver: &'d D, config: PublicationConfig, markers: SessionMarkers) -> Self {
        let tabs = tab_chain(&config);
        let triggers = trigger_chain(&config);
        Self {
            driver,
            config,
            classifier: SessionClassifier::new(markers),
            tabs,
            triggers,
            cancellation: CancellationToken::new(),
            diagnostics: DiagnosticRecorder::disabled(),
        }
    }

    /// Sets the token that aborts login waits and pauses.
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

    /// Uploads `assets` and fills the form with `draft`.
    ///
    /// Returns once the form is filled and left open for review. Login
    /// walls are waited out for as long as it takes unless the cancellation
    /// token fires.
    pub async fn publish(
        &self,
        draft: &Draft,
        assets: &AssetList,
    ) -> Result<PublicationResult, PublishError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, title = %draft.title, images = assets.len(), "Publishing draft");

        self.open_publish_page(run_id).await?;

        let mut result = PublicationResult::default();
        self.upload_with_retries(run_id, assets, &mut result).await?;

        self.fill_form(run_id, draft, &mut result).await;
        result.filled = true;

        info!(
            %run_id,
            attempts = result.upload_attempts,
            login_recoveries = result.login_recoveries,
            title_filled = result.title_filled,
            content_filled = result.content_filled,
            "Form filled, waiting for manual confirmation"
        );
        Ok(result)
    }

    /// Reuses the current page when it already is the publish page.
    async fn open_publish_page(&self, run_id: Uuid) -> Result<(), PublishError> {
        let current = self.driver.current_address().await.unwrap_or_default();
        if self.classifier.on_publish_page(&current) {
            info!(%run_id, address = %current, "Reusing open publish page");
            return Ok(());
        }

        let address = &self.config.publish_url;
        info!(%run_id, address = %address, "Opening publish page");
        if let Err(e) = self
            .driver
            .navigate(address, ReadyCondition::NetworkIdle)
            .await
        {
            warn!(
                %run_id,
                error = %e,
                failure_kind = %FailureKind::NavigationFailure,
                "Publish page did not load"
            );
            return Err(PublishError::Navigation {
                address: address.clone(),
                message: e.to_string(),
            });
        }
        self.diagnostics.capture(self.driver, "navigated").await;
        Ok(())
    }

    /// Runs upload attempts until one succeeds or the attempts run out.
    async fn upload_with_retries(
        &self,
        run_id: Uuid,
        assets: &AssetList,
        result: &mut PublicationResult,
    ) -> Result<(), PublishError> {
        let max_attempts = self.config.max_upload_attempts;

        let last_reason = loop {
            if self.cancellation.is_cancelled() {
                return Err(self.cancelled());
            }
            let attempt = result.upload_attempts + 1;
            let outcome = self.attempt_upload(run_id, attempt, assets).await?;

            match outcome {
                UploadOutcome::Uploaded { thumbnails_seen } => {
                    result.upload_attempts = attempt;
                    result.thumbnails_seen = thumbnails_seen;
                    info!(%run_id, attempt, thumbnails_seen, "Upload succeeded");
                    return Ok(());
                }
                UploadOutcome::Failed(UploadFailure::LoginRedirect) => {
                    self.await_manual_login(run_id).await?;
                    result.login_recoveries += 1;
                }
                UploadOutcome::Failed(failure) => {
                    result.upload_attempts = attempt;
                    let reason = UploadReason::from(failure);
                    warn!(%run_id, attempt, max_attempts, %reason, "Upload attempt failed");
                    if attempt >= max_attempts {
                        break reason;
                    }
                    self.pause(self.config.retry_pause()).await?;
                }
            }
        };

        Err(PublishError::UploadExhausted {
            attempts: result.upload_attempts,
            last_reason,
        })
    }

    async fn session_state(&self) -> SessionState {
        let signals = session::probe(self.driver, self.classifier.markers()).await;
        self.classifier.classify(&signals)
    }

    /// Sleeps unless cancelled first.
    async fn pause(&self, duration: std::time::Duration) -> Result<(), PublishError> {
        if self.cancellation.sleep(duration).await {
            Ok(())
        } else {
            Err(self.cancelled())
        }
    }

    fn cancelled(&self) -> PublishError {
        PublishError::Cancelled(
            self.cancellation
                .reason()
                .unwrap_or_else(|| "cancelled".to_string()),
        )
    }
}

impl<D: Driver> std::fmt::Debug for PublicationEngine<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicationEngine")
            .field("config", &self.config)
            .field("tabs", &self.tabs)
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FileDialog;
    use crate::errors::DriverResult;
    use crate::session::SIGNALS_TAG;
    use crate::strategy::script_tag;
    use crate::testing::{
        login_wall_signals, publish_signals, DialogBehavior, ScriptedDriver, LOGIN_ADDRESS,
        PUBLISH_ADDRESS,
    };
    use async_trait::async_trait;
    use mockall::mock;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn assets() -> AssetList {
        AssetList::new(vec![
            PathBuf::from("images/page_01.png"),
            PathBuf::from("images/page_02.png"),
        ])
        .unwrap()
    }

    fn draft() -> Draft {
        Draft::new("七天搞定空间思维", "第一天：画出你的房间\n#空间思维")
    }

    /// A publish page where every locator finds its element.
    fn ready_page() -> ScriptedDriver {
        let driver = ScriptedDriver::new();
        driver.set_signals(&publish_signals());
        driver.respond(&script_tag("tab-label"), json!("上传图文"));
        driver.respond(&script_tag("upload-text"), json!("点击上传"));
        driver.respond(&script_tag("thumbnails"), json!(true));
        driver.respond(&script_tag("title-wait"), json!(true));
        driver.respond(&script_tag("title-field"), json!("input[placeholder*=\"标题\"]"));
        driver.respond(&script_tag("content-field"), json!("#post-textarea"));
        driver
    }

    fn engine(driver: &ScriptedDriver) -> PublicationEngine<'_, ScriptedDriver> {
        PublicationEngine::new(driver, PublicationConfig::default(), SessionMarkers::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_fills_form_without_submitting() {
        let driver = ready_page();

        let result = engine(&driver).publish(&draft(), &assets()).await.unwrap();

        assert_eq!(
            result,
            PublicationResult {
                filled: true,
                title_filled: true,
                content_filled: true,
                upload_attempts: 1,
                login_recoveries: 0,
                thumbnails_seen: true,
            }
        );
        assert_eq!(driver.navigations(), vec![PUBLISH_ADDRESS.to_string()]);
        assert_eq!(driver.uploads(), vec![assets().paths().to_vec()]);
        assert_eq!(driver.dialogs_disarmed(), 1);
        assert_eq!(driver.evaluation_count(&script_tag("tab-position")), 0);
        assert_eq!(driver.evaluation_count(&script_tag("upload-selector")), 0);

        let title_script = driver
            .evaluated_scripts()
            .into_iter()
            .find(|s| s.contains(&script_tag("title-field")))
            .unwrap();
        assert!(title_script.contains("七天搞定空间思维"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuses_open_publish_page() {
        let driver = ready_page();
        driver.set_address(PUBLISH_ADDRESS);

        engine(&driver).publish(&draft(), &assets()).await.unwrap();
        assert!(driver.navigations().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_failure_is_terminal() {
        let driver = ready_page();
        driver.fail_navigation("net::ERR_NAME_NOT_RESOLVED");

        let err = engine(&driver)
            .publish(&draft(), &assets())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Navigation { ref address, .. } if address == PUBLISH_ADDRESS));
        assert_eq!(driver.dialogs_armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_fallback_and_missing_tab() {
        let driver = ready_page();
        driver.respond(&script_tag("tab-label"), Value::Null);
        driver.respond(&script_tag("tab-position"), json!("[role=\"tab\"][1]"));
        engine(&driver).publish(&draft(), &assets()).await.unwrap();
        assert_eq!(driver.evaluation_count(&script_tag("tab-position")), 1);

        // No tab at all is only a warning.
        let driver = ready_page();
        driver.respond(&script_tag("tab-label"), Value::Null);
        driver.respond(&script_tag("tab-position"), Value::Null);
        let result = engine(&driver).publish(&draft(), &assets()).await.unwrap();
        assert_eq!(result.upload_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selector_trigger_fallback() {
        let driver = ready_page();
        driver.respond(&script_tag("upload-text"), Value::Null);
        driver.respond(&script_tag("upload-selector"), json!(".upload-container"));

        let result = engine(&driver).publish(&draft(), &assets()).await.unwrap();
        assert_eq!(result.upload_attempts, 1);
        assert_eq!(driver.uploads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_upload_target_exhausts_attempts() {
        let driver = ready_page();
        driver.respond(&script_tag("upload-text"), Value::Null);
        driver.respond(&script_tag("upload-selector"), Value::Null);

        let err = engine(&driver)
            .publish(&draft(), &assets())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::UploadExhausted {
                attempts: 3,
                last_reason: UploadReason::NoUploadTarget
            }
        ));
        assert_eq!(driver.dialogs_armed(), 3);
        assert_eq!(driver.dialogs_disarmed(), 3);
        assert!(driver.uploads().is_empty());
        assert_eq!(driver.evaluation_count(&script_tag("title-field")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dialog_timeout_respects_attempt_limit() {
        let driver = ready_page();
        driver.set_dialog(DialogBehavior::NeverOpens);
        let config = PublicationConfig::default().with_max_upload_attempts(2);

        let err = PublicationEngine::new(&driver, config, SessionMarkers::default())
            .publish(&draft(), &assets())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::UploadExhausted {
                attempts: 2,
                last_reason: UploadReason::NoFileDialog
            }
        ));
        assert_eq!(driver.evaluation_count(&script_tag("upload-text")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arming_failure_skips_trigger() {
        let driver = ready_page();
        driver.set_dialog(DialogBehavior::ArmFails);

        let err = engine(&driver)
            .publish(&draft(), &assets())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::UploadExhausted {
                last_reason: UploadReason::NoFileDialog,
                ..
            }
        ));
        assert_eq!(driver.evaluation_count(&script_tag("upload-text")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_recovery_does_not_consume_attempts() {
        let driver = ready_page();
        driver.signals_sequence(&[login_wall_signals(LOGIN_ADDRESS), publish_signals()]);
        // The first address is read before navigating; the rest are polled
        // while the operator logs in.
        driver.queue_addresses([LOGIN_ADDRESS, LOGIN_ADDRESS, LOGIN_ADDRESS, PUBLISH_ADDRESS]);
        let config = PublicationConfig::default().with_max_upload_attempts(1);

        let result = PublicationEngine::new(&driver, config, SessionMarkers::default())
            .publish(&draft(), &assets())
            .await
            .unwrap();

        assert_eq!(result.upload_attempts, 1);
        assert_eq!(result.login_recoveries, 1);
        assert_eq!(driver.reload_count(), 1);
        assert_eq!(driver.dialogs_armed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_after_upload_retries_upload() {
        let driver = ready_page();
        driver.signals_sequence(&[
            publish_signals(),
            login_wall_signals(PUBLISH_ADDRESS),
            publish_signals(),
        ]);

        let result = engine(&driver).publish(&draft(), &assets()).await.unwrap();

        assert_eq!(result.login_recoveries, 1);
        assert_eq!(result.upload_attempts, 1);
        assert_eq!(driver.uploads().len(), 2);
        assert_eq!(driver.evaluation_count(&script_tag("thumbnails")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_form_fill_is_best_effort() {
        let root = tempfile::tempdir().unwrap();
        let driver = ready_page();
        driver.respond(&script_tag("title-wait"), json!(false));
        driver.respond(&script_tag("title-field"), Value::Null);
        driver.respond(&script_tag("thumbnails"), json!(false));

        let result = engine(&driver)
            .with_diagnostics(DiagnosticRecorder::new(root.path()))
            .publish(&draft(), &assets())
            .await
            .unwrap();

        assert!(result.filled);
        assert!(!result.title_filled);
        assert!(result.content_filled);
        assert!(!result.thumbnails_seen);

        let names: Vec<String> = driver
            .captures()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "debug_01_navigated.png",
                "debug_02_uploaded.png",
                "debug_03_title_fail.png",
                "debug_04_content_filled.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_upload() {
        let driver = ready_page();
        let token = CancellationToken::new();
        token.cancel("shutdown");

        let err = engine(&driver)
            .with_cancellation(token)
            .publish(&draft(), &assets())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Cancelled(ref reason) if reason == "shutdown"));
        assert_eq!(driver.dialogs_armed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_dialog_pending_releases_interception() {
        let driver = ready_page();
        driver.set_dialog(DialogBehavior::NeverOpens);
        let config = PublicationConfig {
            dialog_timeout_seconds: 600.0,
            ..PublicationConfig::default()
        };
        let token = CancellationToken::new();
        let engine = PublicationEngine::new(&driver, config, SessionMarkers::default())
            .with_cancellation(token.clone());

        let (draft, assets) = (draft(), assets());
        let (outcome, ()) = tokio::join!(engine.publish(&draft, &assets), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            token.cancel("closing");
        });

        assert!(matches!(outcome, Err(PublishError::Cancelled(_))));
        assert_eq!(driver.dialogs_armed(), 1);
        assert_eq!(driver.dialogs_disarmed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_wall_on_publish_address_is_not_reloaded() {
        let driver = ready_page();
        driver.set_address(PUBLISH_ADDRESS);
        driver.set_signals(&login_wall_signals(PUBLISH_ADDRESS));
        let token = CancellationToken::new();
        let engine = engine(&driver).with_cancellation(token.clone());

        let (draft, assets) = (draft(), assets());
        let (outcome, ()) = tokio::join!(engine.publish(&draft, &assets), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            token.cancel("operator gave up");
        });

        assert!(matches!(outcome, Err(PublishError::Cancelled(_))));
        assert_eq!(driver.reload_count(), 0);
        assert_eq!(driver.dialogs_armed(), 0);
        assert!(driver.evaluation_count(SIGNALS_TAG) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_wall_on_publish_address_waits_until_cleared() {
        let driver = ready_page();
        driver.set_address(PUBLISH_ADDRESS);
        driver.signals_sequence(&[
            login_wall_signals(PUBLISH_ADDRESS),
            login_wall_signals(PUBLISH_ADDRESS),
            login_wall_signals(PUBLISH_ADDRESS),
            publish_signals(),
        ]);

        let result = engine(&driver).publish(&draft(), &assets()).await.unwrap();

        assert_eq!(result.login_recoveries, 1);
        assert_eq!(result.upload_attempts, 1);
        assert_eq!(driver.reload_count(), 1);
        assert_eq!(driver.dialogs_armed(), 1);
    }

    struct AcceptAll;

    #[async_trait]
    impl FileDialog for AcceptAll {
        async fn accept(&mut self, _files: &[PathBuf]) -> DriverResult<()> {
            Ok(())
        }

        async fn disarm(self: Box<Self>) {}
    }

    mock! {
        Page {}

        #[async_trait]
        impl Driver for Page {
            async fn navigate(&self, address: &str, ready: ReadyCondition) -> DriverResult<()>;
            async fn reload(&self) -> DriverResult<()>;
            async fn evaluate(&self, script: &str) -> DriverResult<Value>;
            async fn wait_for(&self, predicate: &str, timeout: Duration) -> DriverResult<bool>;
            async fn intercept_next_file_dialog(&self, timeout: Duration) -> DriverResult<Box<dyn FileDialog>>;
            async fn capture_frame(&self, path: &Path) -> DriverResult<()>;
            async fn current_address(&self) -> DriverResult<String>;
            async fn raw_markup(&self) -> DriverResult<String>;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_loss_after_upload_skips_thumbnail_probe() {
        let mut page = MockPage::new();
        let probes = AtomicUsize::new(0);
        page.expect_evaluate()
            .withf(|script: &str| script.contains(SIGNALS_TAG))
            .returning(move |_| {
                let signals = if probes.fetch_add(1, Ordering::SeqCst) == 0 {
                    publish_signals()
                } else {
                    login_wall_signals(LOGIN_ADDRESS)
                };
                Ok(serde_json::to_value(signals).unwrap())
            });
        page.expect_evaluate()
            .withf(|script: &str| script.contains(&script_tag("tab-label")))
            .returning(|_| Ok(json!("图文")));
        page.expect_evaluate()
            .withf(|script: &str| script.contains(&script_tag("upload-text")))
            .times(1)
            .returning(|_| Ok(json!("点击上传")));
        page.expect_evaluate()
            .withf(|script: &str| script.contains(&script_tag("thumbnails")))
            .never();
        page.expect_intercept_next_file_dialog()
            .times(1)
            .returning(|_| Ok(Box::new(AcceptAll)));
        let polls = AtomicUsize::new(0);
        page.expect_current_address().returning(move || {
            if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(PUBLISH_ADDRESS.to_string())
            } else {
                Ok(LOGIN_ADDRESS.to_string())
            }
        });
        page.expect_navigate().never();
        page.expect_reload().never();

        let token = CancellationToken::new();
        let engine = PublicationEngine::new(
            &page,
            PublicationConfig::default(),
            SessionMarkers::default(),
        )
        .with_cancellation(token.clone());

        let (draft, assets) = (draft(), assets());
        let (outcome, ()) = tokio::join!(engine.publish(&draft, &assets), async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            token.cancel("operator gave up");
        });

        assert!(matches!(outcome, Err(PublishError::Cancelled(ref r)) if r == "operator gave up"));
    }
}
