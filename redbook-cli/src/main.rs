//! `redbook`: extract notes and fill the publish form from the command line.

mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use redbook::cancellation::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);

    // The first Ctrl-C aborts login waits, or closes the browser once the
    // form is filled. A second one exits at once.
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(&interrupt) {
                Interrupt::Cancel => warn!("Interrupted; press Ctrl-C again to exit immediately"),
                Interrupt::Exit => {
                    warn!("Interrupted again, exiting");
                    std::process::exit(130);
                }
            }
        }
    });

    match cli.command {
        Commands::Extract(args) => commands::extract::run(&cli.global, args, token).await,
        Commands::Publish(args) => commands::publish::run(&cli.global, args, token).await,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    Exit,
}

fn on_interrupt(token: &CancellationToken) -> Interrupt {
    if token.is_cancelled() {
        Interrupt::Exit
    } else {
        token.cancel("interrupted");
        Interrupt::Cancel
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_interrupt_exits() {
        let token = CancellationToken::new();
        assert_eq!(on_interrupt(&token), Interrupt::Cancel);
        assert_eq!(token.reason().as_deref(), Some("interrupted"));
        assert_eq!(on_interrupt(&token), Interrupt::Exit);
        assert_eq!(on_interrupt(&token), Interrupt::Exit);
    }
}
