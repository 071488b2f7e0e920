//! calfuse-server entry point.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{Level, error};

use calfuse_core::{TracingConfig, TracingOutputFormat, init_tracing};
use calfuse_providers::ProviderRegistry;
use calfuse_server::{Orchestrator, ServerConfig, ServerResult, ShutdownHandle, serve};

/// calfuse - unified Google and Outlook calendar events over HTTP
#[derive(Debug, Parser)]
#[command(name = "calfuse-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to listen on (overrides CALFUSE_BIND_ADDR)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log output format: pretty, compact or json
    #[arg(long, env = "CALFUSE_LOG_FORMAT", default_value = "compact")]
    log_format: TracingOutputFormat,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::server().with_format(cli.log_format);
    if cli.debug {
        tracing_config = tracing_config.with_level(Level::DEBUG);
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with an error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config = config.with_bind_addr(bind);
    }

    let registry = Arc::new(ProviderRegistry::from_env()?);
    let orchestrator = Orchestrator::new(registry, &config)?;

    let shutdown = ShutdownHandle::new();
    shutdown.spawn_listener();

    serve(&config, orchestrator, shutdown).await
}
