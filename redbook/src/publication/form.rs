//! Best-effort form filling.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PublicationEngine;
use crate::driver::Driver;
use crate::errors::FailureKind;
use crate::models::{Draft, PublicationResult};
use crate::strategy::{any_present_script, FillField, StrategyChain};

impl<D: Driver> PublicationEngine<'_, D> {
    /// Writes the title and body. Never clicks publish.
    pub(super) async fn fill_form(&self, run_id: Uuid, draft: &Draft, result: &mut PublicationResult) {
        let ready = any_present_script("title-wait", &self.config.title_selectors);
        match self.driver.wait_for(&ready, self.config.field_wait()).await {
            Ok(true) => debug!(%run_id, "Form fields rendered"),
            Ok(false) => warn!(
                %run_id,
                after = ?self.config.field_wait(),
                "Title field did not appear, trying anyway"
            ),
            Err(e) => warn!(%run_id, error = %e, "Could not wait for the form fields"),
        }

        result.title_filled = self
            .fill(
                run_id,
                "title",
                FillField::input("title-field", &self.config.title_selectors, draft.title.as_str()),
            )
            .await;
        result.content_filled = self
            .fill(
                run_id,
                "content",
                FillField::editor(
                    "content-field",
                    &self.config.content_selectors,
                    draft.content.as_str(),
                ),
            )
            .await;
    }

    async fn fill(&self, run_id: Uuid, field: &str, strategy: FillField) -> bool {
        let chain: StrategyChain<D, String> = StrategyChain::new(field).with(strategy);
        match chain.run(self.driver).await {
            Ok(filled) => {
                info!(%run_id, field, selector = %filled.value, "Field filled");
                self.diagnostics
                    .capture(self.driver, &format!("{field}_filled"))
                    .await;
                true
            }
            Err(e) => {
                warn!(
                    %run_id,
                    field,
                    error = %e,
                    failure_kind = %FailureKind::TargetNotFound,
                    "Field not found, fill it in by hand"
                );
                self.diagnostics
                    .capture(self.driver, &format!("{field}_fail"))
                    .await;
                false
            }
        }
    }
}
