//! A single upload attempt.

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PublicationEngine;
use crate::assets::AssetList;
use crate::config::PublicationConfig;
use crate::driver::Driver;
use crate::errors::{FailureKind, PublishError};
use crate::models::{UploadFailure, UploadOutcome};
use crate::session::SessionState;
use crate::strategy::{any_present_script, NthClick, SelectorClick, StrategyChain, TextClick};

/// Locates the image-post tab: exact label first, then list position.
pub fn tab_chain<D: Driver + ?Sized>(config: &PublicationConfig) -> StrategyChain<D, String> {
    StrategyChain::new("image-tab")
        .with(TextClick::exact(
            "tab-label",
            config.tab_text_scope.as_str(),
            &config.tab_labels,
        ))
        .with(NthClick::new(
            "tab-position",
            config.tab_list_selector.as_str(),
            config.tab_fallback_index,
        ))
}

/// Locates the element that opens the file dialog: visible text first,
/// then upload-area selectors.
pub fn trigger_chain<D: Driver + ?Sized>(config: &PublicationConfig) -> StrategyChain<D, String> {
    StrategyChain::new("upload-trigger")
        .with(TextClick::containing(
            "upload-text",
            config.upload_text_scope.as_str(),
            &config.upload_texts,
        ))
        .with(SelectorClick::new("upload-selector", &config.upload_selectors))
}

impl<D: Driver> PublicationEngine<'_, D> {
    /// Runs one attempt. Only cancellation is an error; every page failure
    /// is an [`UploadOutcome::Failed`].
    pub(super) async fn attempt_upload(
        &self,
        run_id: Uuid,
        attempt: usize,
        assets: &AssetList,
    ) -> Result<UploadOutcome, PublishError> {
        debug!(%run_id, attempt, "Starting upload attempt");

        if self.session_state().await == SessionState::AuthenticationRequired {
            warn!(%run_id, attempt, failure_kind = %FailureKind::SessionExpired, "Publish page shows the login wall");
            return Ok(UploadOutcome::Failed(UploadFailure::LoginRedirect));
        }

        match self.tabs.run(self.driver).await {
            Ok(tab) => {
                debug!(%run_id, strategy = %tab.strategy, label = %tab.value, "Switched to image tab");
                self.pause(self.config.tab_switch_pause()).await?;
            }
            Err(e) => {
                warn!(
                    %run_id,
                    error = %e,
                    failure_kind = %FailureKind::TargetNotFound,
                    "Image tab not found, staying on the current tab"
                );
            }
        }

        // Armed before the click: the dialog may open immediately.
        let mut dialog = match self
            .driver
            .intercept_next_file_dialog(self.config.dialog_timeout())
            .await
        {
            Ok(dialog) => dialog,
            Err(e) => {
                warn!(
                    %run_id,
                    attempt,
                    error = %e,
                    failure_kind = %FailureKind::DialogTimeout,
                    "Could not intercept the file dialog"
                );
                return Ok(UploadOutcome::Failed(UploadFailure::NoFileDialog));
            }
        };

        let trigger = match self.triggers.run(self.driver).await {
            Ok(trigger) => trigger,
            Err(e) => {
                warn!(
                    %run_id,
                    attempt,
                    error = %e,
                    failure_kind = %FailureKind::TargetNotFound,
                    "No upload trigger found"
                );
                dialog.disarm().await;
                return Ok(UploadOutcome::Failed(UploadFailure::NoUploadTarget));
            }
        };
        debug!(%run_id, strategy = %trigger.strategy, target = %trigger.value, "Clicked upload trigger");

        let accepted = self
            .cancellation
            .run_until_cancelled(dialog.accept(assets.paths()))
            .await;
        dialog.disarm().await;
        let Some(accepted) = accepted else {
            return Err(self.cancelled());
        };
        if let Err(e) = accepted {
            warn!(
                %run_id,
                attempt,
                error = %e,
                failure_kind = %FailureKind::DialogTimeout,
                "File dialog did not open"
            );
            return Ok(UploadOutcome::Failed(UploadFailure::NoFileDialog));
        }
        info!(%run_id, attempt, files = assets.len(), "Files handed to the upload dialog");
        self.diagnostics.capture(self.driver, "uploaded").await;

        self.pause(self.config.upload_settle()).await?;

        if self.session_state().await == SessionState::AuthenticationRequired {
            warn!(
                %run_id,
                attempt,
                failure_kind = %FailureKind::SessionExpired,
                "Session expired during upload"
            );
            return Ok(UploadOutcome::Failed(UploadFailure::LoginRedirect));
        }

        let probe = any_present_script("thumbnails", &self.config.thumbnail_selectors);
        let thumbnails_seen = matches!(self.driver.evaluate(&probe).await, Ok(Value::Bool(true)));
        if !thumbnails_seen {
            warn!(%run_id, attempt, "No thumbnails seen after upload, continuing");
        }
        Ok(UploadOutcome::Uploaded { thumbnails_seen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDriver;

    #[test]
    fn test_chain_order() {
        let config = PublicationConfig::default();
        let tabs: StrategyChain<ScriptedDriver, String> = tab_chain(&config);
        assert_eq!(tabs.names(), vec!["tab-label", "tab-position"]);

        let triggers: StrategyChain<ScriptedDriver, String> = trigger_chain(&config);
        assert_eq!(triggers.names(), vec!["upload-text", "upload-selector"]);
        assert_eq!(triggers.label(), "upload-trigger");
    }
}
