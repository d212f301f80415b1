//! Nitpick CLI - a reviewer that watches coding agents
//!
//! `nitpick server` receives hook events and review requests over HTTP,
//! `nitpick mcp` exposes the review tool over stdio, and the `hook`
//! commands are what the host agent's hook configuration calls.

mod hook;
mod mcp;
mod server;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use nitpick_core::config::{CONFIG_FILE, LOG_FILE, nitpick_home};
use nitpick_core::{DefaultBackendFactory, Platform, ReviewerConfig, SessionRegistry};

#[derive(Parser)]
#[command(name = "nitpick")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Session-scoped code reviewer for coding agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hook and review HTTP server
    Server {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8081)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Run the MCP server on stdin/stdout
    Mcp,

    /// Commands called from host agent hooks
    #[command(subcommand)]
    Hook(HookCommands),
}

#[derive(Subcommand)]
enum HookCommands {
    /// Forward the hook event on stdin to the server
    Forward {
        /// Host agent (claude or cursor)
        #[arg(long, default_value = "claude")]
        platform: Platform,
    },

    /// Show pending reviewer feedback to the host agent
    Notify {
        /// Host agent (claude or cursor)
        #[arg(long, default_value = "claude")]
        platform: Platform,
    },
}

/// Log to `<home>/nitpick.log`. Stdout is reserved for MCP and hook output.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let default_filter = if verbose { "info,nitpick_core=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let dir = nitpick_home().ok().filter(|dir| std::fs::create_dir_all(dir).is_ok());
    match dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

fn registry() -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(Arc::new(DefaultBackendFactory::new())))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose);

    match cli.command {
        Commands::Server { port, host } => {
            let settings = match nitpick_home() {
                Ok(home) => ReviewerConfig::load_from(&[home.join(CONFIG_FILE)]),
                Err(_) => ReviewerConfig::default(),
            };
            server::run(&host, port, registry(), settings.idle_timeout()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mcp => {
            mcp::run(registry()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Hook(HookCommands::Forward { platform }) => Ok(hook::forward(platform).await),
        Commands::Hook(HookCommands::Notify { platform }) => Ok(hook::notify(platform).await),
    }
}
