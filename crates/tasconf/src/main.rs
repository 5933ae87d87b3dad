mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing current step");
            token.cancel();
        }
    });
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "tasconf", &mut std::io::stdout());
            Ok(())
        }

        Command::Show(args) => commands::show::handle(&args, &cli.global),

        Command::Sync(args) => {
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            tracing::debug!(?args, "dispatching sync");
            commands::sync::handle(args, &cli.global, &cancel).await
        }
    }
}
