//! Waiting out a login wall.

use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::PublicationEngine;
use crate::driver::Driver;
use crate::errors::{FailureKind, PublishError};
use crate::session::SessionState;

impl<D: Driver> PublicationEngine<'_, D> {
    /// Polls until the site is back on the publish page with no login wall,
    /// then reloads it.
    ///
    /// There is no bound; the operator may take as long as they need. Only
    /// the cancellation token ends the wait early.
    pub(super) async fn await_manual_login(&self, run_id: Uuid) -> Result<(), PublishError> {
        warn!(
            %run_id,
            failure_kind = %FailureKind::SessionExpired,
            "Login required, log in through the browser window to continue"
        );
        self.diagnostics.capture(self.driver, "login_required").await;

        let started = Instant::now();
        loop {
            self.pause(self.config.login_poll()).await?;
            match self.driver.current_address().await {
                Ok(address) if self.classifier.on_publish_page(&address) => {
                    // The wall can overlay the publish page itself; reloading
                    // then would wipe what the operator is typing.
                    if self.session_state().await != SessionState::AuthenticationRequired {
                        break;
                    }
                    debug!(%run_id, %address, "Login wall still shown on the publish page");
                }
                Ok(address) => debug!(%run_id, %address, "Still waiting for login"),
                Err(e) => debug!(%run_id, error = %e, "Could not read address while waiting for login"),
            }
        }

        info!(
            %run_id,
            waited_secs = started.elapsed().as_secs(),
            "Login detected, reloading publish page"
        );
        if let Err(e) = self.driver.reload().await {
            warn!(%run_id, error = %e, "Reload after login failed");
        }
        Ok(())
    }
}
