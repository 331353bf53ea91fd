// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - command-line client for the realtime messaging transport.

mod app;
mod history;
mod listen;
mod probe;
mod send;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use parley_config::model::ParleyConfig;
use parley_core::ParleyError;
use tracing::error;

use crate::app::App;

/// Parley - realtime messaging with a REST fallback.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user, overriding `session.user_id`.
    #[arg(long, global = true)]
    user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

/// Conversation or peer selection.
#[derive(Args, Debug, Clone, Default)]
struct TargetArgs {
    /// Conversation identifier.
    #[arg(long)]
    conversation: Option<i64>,

    /// Peer user identifier; direct messages when no conversation is given.
    #[arg(long)]
    peer: Option<i64>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether the broker endpoint supports the realtime transport.
    Probe,
    /// Stay connected and print deliveries and the unread count.
    Listen {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Send one message and report which path delivered it.
    Send {
        #[command(flatten)]
        target: TargetArgs,
        /// Message text.
        text: String,
    },
    /// Print a conversation's history, or the conversation list.
    History {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Delete a message or a whole conversation.
    Delete {
        /// Message identifier.
        #[arg(long, conflicts_with = "conversation", required_unless_present = "conversation")]
        message: Option<i64>,
        /// Conversation identifier.
        #[arg(long)]
        conversation: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => parley_config::load_and_validate_path(path),
        None => parley_config::load_and_validate(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    if let Some(user) = cli.user {
        config.session.user_id = Some(user);
    }

    init_tracing(&config.session.log_level);

    #[cfg(feature = "prometheus")]
    let recorder = install_metrics(&config);

    let result = run(cli.command, config).await;

    #[cfg(feature = "prometheus")]
    if let Some(recorder) = recorder {
        eprintln!("{}", recorder.render());
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("parley: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: ParleyConfig) -> Result<(), ParleyError> {
    if let Commands::Probe = command {
        return probe::run_probe(&config.transport).await;
    }

    let app = App::new(config)?;
    match command {
        Commands::Probe => Ok(()),
        Commands::Listen { target } => {
            let cancel = shutdown::install_signal_handler();
            listen::run_listen(&app, resolve(&target), cancel).await
        }
        Commands::Send { target, text } => {
            let target = resolve(&target).ok_or_else(|| {
                ParleyError::Config("send needs --conversation or --peer".into())
            })?;
            send::run_send(&app, target, text).await
        }
        Commands::History { target } => history::run_history(&app, resolve(&target)).await,
        Commands::Delete {
            message,
            conversation,
        } => match (message, conversation) {
            (Some(id), _) => history::run_delete_message(&app, id).await,
            (None, Some(id)) => history::run_delete_conversation(&app, id).await,
            (None, None) => Err(ParleyError::Config(
                "delete needs --message or --conversation".into(),
            )),
        },
    }
}

fn resolve(target: &TargetArgs) -> Option<parley_session::ConversationTarget> {
    app::target(target.conversation, target.peer)
}

#[cfg(feature = "prometheus")]
fn install_metrics(config: &ParleyConfig) -> Option<parley_prometheus::PrometheusRecorder> {
    if !config.metrics.enabled {
        return None;
    }
    match parley_prometheus::PrometheusRecorder::install() {
        Ok(recorder) => Some(recorder),
        Err(e) => {
            tracing::warn!(error = %e, "metrics disabled");
            None
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
