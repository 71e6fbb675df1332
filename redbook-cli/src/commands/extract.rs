//! `redbook extract`: read one note page into `01_raw.json`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use redbook::cancellation::CancellationToken;
use redbook::extraction::ExtractionEngine;
use redbook::models::NoteDocument;
use tracing::info;

use super::GlobalArgs;

#[derive(Args)]
pub struct ExtractArgs {
    /// Address of the note page
    #[arg(long)]
    pub url: String,

    /// Output file; defaults to the task's raw note document
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Task id inside the workspace; generated when omitted
    #[arg(long)]
    pub task_id: Option<String>,

    /// Print where each field came from
    #[arg(long)]
    pub report: bool,
}

pub async fn run(global: &GlobalArgs, args: ExtractArgs, token: CancellationToken) -> Result<()> {
    let config = global.load_config()?;
    let output = match args.output {
        Some(path) => path,
        None => global.task(args.task_id.as_deref()).raw_note_path(),
    };
    let capture_dir = output
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let driver = global.launch(&config).await?;
    let outcome = match ExtractionEngine::new(
        &driver,
        config.extraction.clone(),
        config.session.clone(),
    ) {
        Ok(engine) => {
            engine
                .with_cancellation(token)
                .with_diagnostics(global.recorder(&capture_dir))
                .extract_with_report(&args.url)
                .await
                .map_err(anyhow::Error::from)
        }
        Err(e) => Err(e.into()),
    };
    driver.close().await;
    let (content, report) = outcome?;

    if content.is_empty() {
        info!(url = %args.url, "Nothing could be extracted, writing an empty note");
    }
    NoteDocument::new(&args.url, content).write_to(&output)?;
    info!(path = %output.display(), "Note saved");

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
