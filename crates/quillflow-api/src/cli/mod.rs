//! CLI command definitions and dispatch for the `qflow` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a noun-verb
//! pattern (e.g., `qflow envelope create`, `qflow workflow start`).

pub mod api_key;
pub mod envelope;
pub mod serve;
pub mod workflow;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use quillflow_types::access::AccountContext;
use uuid::Uuid;

/// Route envelopes to their recipients.
#[derive(Parser)]
#[command(name = "qflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout via OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Account the CLI acts for (full access). Defaults to the local account.
    #[arg(long, global = true, env = "QUILLFLOW_ACCOUNT_ID")]
    pub account: Option<Uuid>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The account context every CLI operation runs under.
    pub fn context(&self) -> AccountContext {
        AccountContext::full_access(self.account.unwrap_or(Uuid::nil()), "cli")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and edit draft envelopes.
    #[command(alias = "env")]
    Envelope {
        #[command(subcommand)]
        action: envelope::EnvelopeCommand,
    },

    /// Drive an envelope through routing.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Manage REST API keys.
    #[command(name = "api-key")]
    ApiKey {
        #[command(subcommand)]
        action: api_key::ApiKeyCommand,
    },

    /// Send due scheduled envelopes and deliver due notifications once.
    Tick,

    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `[server].port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `[server].host`).
        #[arg(long)]
        host: Option<String>,

        /// Also run the scheduler loop (`[scheduler].interval_secs`).
        #[arg(long)]
        scheduler: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse an id argument with a readable error.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> anyhow::Result<T> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid {what} id '{raw}'"))
}
