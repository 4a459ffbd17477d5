//! Codetriever CLI: index a workspace and answer natural-language questions
//! against it from the command line — the same engine `codetriever-api`
//! serves over HTTP, wired up directly instead of through a server process.

mod bootstrap;
mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use codetriever_config::EngineConfig;
use codetriever_config::validation::Validate;
use codetriever_search::QueryMode;

#[derive(Parser, Debug)]
#[command(name = "codetriever", author, version, about = "Index and query a code workspace", long_about = None)]
struct Cli {
    /// Workspace root to operate against.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Scope identifier (a named partition of the workspace).
    #[arg(long, global = true, default_value = "default")]
    scope: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full incremental build for the scope.
    Index {
        /// Path relative to the workspace root; defaults to the root itself.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Glob patterns to exclude from discovery, in addition to the configured defaults.
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Answer a natural-language question against the indexed scope.
    Query {
        /// The question to ask.
        query: String,
        /// Query mode: instant, auto, or thinking.
        #[arg(long, value_enum, default_value_t = CliQueryMode::Auto)]
        mode: CliQueryMode,
    },
    /// Print the last-built manifest's stats for the scope.
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliQueryMode {
    Instant,
    Auto,
    Thinking,
}

impl From<CliQueryMode> for QueryMode {
    fn from(mode: CliQueryMode) -> Self {
        match mode {
            CliQueryMode::Instant => Self::Instant,
            CliQueryMode::Auto => Self::Auto,
            CliQueryMode::Thinking => Self::Thinking,
        }
    }
}

type MainResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> MainResult {
    codetriever_common::initialize_environment();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    config.validate()?;

    let result = match cli.command {
        Command::Index { path, exclude } => {
            commands::index::run(&config, cli.workspace, commands::index::IndexArgs {
                scope_id: cli.scope,
                path,
                exclude,
            })
            .await
        }
        Command::Query { query, mode } => {
            commands::query::run(&config, cli.workspace, commands::query::QueryArgs {
                scope_id: cli.scope,
                query,
                mode: mode.into(),
            })
            .await
        }
        Command::Status => commands::status::run(cli.workspace, cli.scope).await,
    };

    result.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}
