//! QuillFlow CLI and REST API entry point.
//!
//! Binary name: `qflow`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,quillflow=debug",
        _ => "trace",
    };
    quillflow_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "qflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    let ctx = cli.context();

    let result = match cli.command {
        Commands::Envelope { action } => cli::envelope::run(&state, &ctx, action, cli.json).await,
        Commands::Workflow { action } => cli::workflow::run(&state, &ctx, action, cli.json).await,
        Commands::ApiKey { action } => {
            cli::api_key::run(&state, ctx.account_id, action, cli.json).await
        }
        Commands::Tick => cli::serve::tick(&state, cli.json).await,
        Commands::Serve {
            port,
            host,
            scheduler,
        } => cli::serve::serve(state, ctx.account_id, host, port, scheduler).await,
        Commands::Completions { .. } => Ok(()),
    };

    quillflow_observe::tracing_setup::shutdown_tracing();
    result
}
