use anyhow::Context;
use clap::Parser;
use pgwrap::cli::{run_interactive, App, Cli, Commands};
use pgwrap::config::LogConfig;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Console logs go to stderr so stdout carries only command output.
/// With a log directory configured, a JSON daily-rolling file is added.
fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pgwrap.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        },
        None => {
            registry.init();
            None
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging(&LogConfig::from_env());

    let cli = Cli::parse();
    info!("Starting pgwrap...");

    let mut app = App::new(cli.connection);

    let result = match cli.command {
        None | Some(Commands::Interactive) => run_interactive(&mut app).await,
        Some(command) => app.run_command(command).await,
    };

    if let Err(e) = app.shutdown().await {
        error!("Failed to close connection: {:?}", e);
    }

    result.context("pgwrap command failed")
}
