//! Dataweave CLI - Main entry point

use clap::Parser;
use dataweave_cli::commands::{self, db::SchemaAction};
use dataweave_cli::{Cli, Commands};
use dataweave_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix(cli.command.log_prefix())
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI keeps working without logging
    let guard = init_logging(&log_config).ok();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = cli.command.workers() {
        builder.worker_threads(workers);
    }

    let result = builder
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(execute_command(cli.command)));

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        drop(guard);
        process::exit(1);
    }
}

async fn execute_command(command: Commands) -> anyhow::Result<()> {
    let config = commands::load_config()?;

    match command {
        Commands::Runserver { host, port, .. } => commands::serve::run(config, host, port).await,
        Commands::Runconsumer { rabbit_mq, queue } => {
            commands::consume::run(config, rabbit_mq, queue).await
        },
        Commands::Ingest {
            fpath,
            rabbit_mq,
            queue,
            dry_run,
        } => commands::ingest::run(config, &fpath, rabbit_mq, queue, dry_run)
            .await
            .map(|_| ()),
        Commands::CreateDb { db_url } => {
            commands::db::run(config, db_url, SchemaAction::Create).await
        },
        Commands::DeleteDb { db_url } => {
            commands::db::run(config, db_url, SchemaAction::Delete).await
        },
    }
}
