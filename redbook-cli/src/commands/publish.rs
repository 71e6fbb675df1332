//! `redbook publish`: upload rendered images and fill the publish form.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use redbook::assets::AssetList;
use redbook::cancellation::CancellationToken;
use redbook::models::Draft;
use redbook::publication::PublicationEngine;
use tracing::{error, info};

use super::GlobalArgs;

#[derive(Args)]
pub struct PublishArgs {
    /// Draft JSON with `title` and `content`; defaults to the task draft
    #[arg(long)]
    pub draft: Option<PathBuf>,

    /// Directory of images to upload; defaults to the task images
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Task id inside the workspace
    #[arg(long)]
    pub task_id: Option<String>,

    /// Close the browser as soon as the form is filled
    #[arg(long)]
    pub no_wait: bool,
}

pub async fn run(global: &GlobalArgs, args: PublishArgs, token: CancellationToken) -> Result<()> {
    let config = global.load_config()?;

    let task = args.task_id.as_deref().map(|id| global.task(Some(id)));
    let (draft_path, images_dir) = match (args.draft, args.images, task) {
        (Some(draft), Some(images), _) => (draft, images),
        (draft, images, Some(task)) => (
            draft.unwrap_or_else(|| task.draft_path()),
            images.unwrap_or_else(|| task.images_dir()),
        ),
        _ => bail!("pass --task-id, or both --draft and --images"),
    };

    let draft = Draft::from_path(&draft_path)
        .with_context(|| format!("reading draft {}", draft_path.display()))?;
    let assets = AssetList::from_dir(&images_dir)?;
    info!(images = assets.len(), dir = %images_dir.display(), "Assets loaded");

    let driver = global.launch(&config).await?;
    let outcome = PublicationEngine::new(&driver, config.publication.clone(), config.session.clone())
        .with_cancellation(token.clone())
        .with_diagnostics(global.recorder(&images_dir))
        .publish(&draft, &assets)
        .await;

    match &outcome {
        Ok(result) => println!("{}", serde_json::to_string_pretty(result)?),
        Err(e) => error!(error = %e, "Publishing stopped; the browser stays open to finish by hand"),
    }

    if !args.no_wait && !token.is_cancelled() {
        info!("Review the form in the browser and publish it by hand; press Ctrl-C to close");
    }
    hold_open(&token, args.no_wait).await;
    driver.close().await;
    outcome?;
    Ok(())
}

/// Waits for the operator's Ctrl-C unless told not to wait.
async fn hold_open(token: &CancellationToken, no_wait: bool) {
    if !no_wait {
        token.cancelled().await;
    }
}
