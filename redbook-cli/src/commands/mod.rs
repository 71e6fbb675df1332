pub mod extract;
pub mod publish;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use redbook::config::RedbookConfig;
use redbook::diagnostics::DiagnosticRecorder;
use redbook::driver::{ChromiumDriver, SessionProfile};
use redbook::workspace::TaskWorkspace;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "redbook",
    author,
    version,
    about = "Extract notes and prepare posts through a logged-in browser",
    long_about = "Drives a real browser with a persistent profile. Log in once in the window \
                  it opens; later runs reuse the session. The publish form is filled but \
                  never submitted."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Extract a note page into a JSON document")]
    Extract(extract::ExtractArgs),

    #[command(about = "Upload images and fill the publish form")]
    Publish(publish::PublishArgs),
}

#[derive(Args)]
pub struct GlobalArgs {
    /// TOML configuration file
    #[arg(long, global = true, env = "REDBOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Browser profile directory holding the login session
    #[arg(long, global = true, default_value = "./user_data")]
    pub profile: PathBuf,

    /// Root of the per-task working directories
    #[arg(long, global = true, default_value = "./workspace")]
    pub workspace: PathBuf,

    /// Attach to a running browser instead of launching one
    #[arg(long, global = true, env = "REDBOOK_REMOTE_DEBUGGING_URL")]
    pub remote_debugging_url: Option<String>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    pub headless: bool,

    /// Skip the numbered frame captures
    #[arg(long, global = true)]
    pub no_captures: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Loads the configuration file, if any, and applies flag overrides.
    pub fn load_config(&self) -> Result<RedbookConfig> {
        let mut config = match &self.config {
            Some(path) => RedbookConfig::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RedbookConfig::default(),
        };
        if let Some(url) = &self.remote_debugging_url {
            config.driver.remote_debugging_url = Some(url.clone());
        }
        if self.headless {
            config.driver.headless = true;
        }
        config.validate()?;
        Ok(config)
    }

    /// Opens a task, generating an id when none is given.
    pub fn task(&self, task_id: Option<&str>) -> TaskWorkspace {
        task_id.map_or_else(
            || TaskWorkspace::generated(&self.workspace),
            |id| TaskWorkspace::new(&self.workspace, id),
        )
    }

    pub fn recorder(&self, dir: impl Into<PathBuf>) -> DiagnosticRecorder {
        if self.no_captures {
            DiagnosticRecorder::disabled()
        } else {
            DiagnosticRecorder::new(dir)
        }
    }

    /// Launches or attaches to the browser on the persistent profile.
    pub async fn launch(&self, config: &RedbookConfig) -> Result<ChromiumDriver> {
        let profile = SessionProfile::new(&self.profile);
        profile
            .ensure_exists()
            .with_context(|| format!("creating profile {}", self.profile.display()))?;
        info!(profile = %self.profile.display(), "Starting browser");
        Ok(ChromiumDriver::launch(&config.driver, &profile).await?)
    }
}
