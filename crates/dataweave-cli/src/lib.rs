//! Dataweave CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Command-line entry points for every part of the pipeline:
//!
//! - **runserver**: serve the HTTP API
//! - **runconsumer**: store product records from the work queue
//! - **ingest**: publish the records of a local file onto the work queue
//! - **create-db** / **delete-db**: manage the SQLite schema

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dataweave - product data ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "dataweave")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API
    Runserver {
        /// Address to bind
        #[arg(long, env = "DATAWEAVE_HOST")]
        host: Option<String>,

        /// Port to bind
        #[arg(long, env = "DATAWEAVE_PORT")]
        port: Option<u16>,

        /// Number of runtime worker threads
        #[arg(long, env = "WORKERS", value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,
    },

    /// Consume the work queue and store products until interrupted
    Runconsumer {
        /// RabbitMQ connection URL
        #[arg(long = "rabbit-mq", env = "RABBITMQ_URL")]
        rabbit_mq: Option<String>,

        /// Work queue name
        #[arg(long, env = "QUEUE_NAME")]
        queue: Option<String>,
    },

    /// Publish every record of a JSON file onto the work queue
    Ingest {
        /// File of concatenated JSON objects
        #[arg(long)]
        fpath: PathBuf,

        /// RabbitMQ connection URL
        #[arg(long = "rabbit-mq", env = "RABBITMQ_URL")]
        rabbit_mq: Option<String>,

        /// Work queue name
        #[arg(long, env = "QUEUE_NAME")]
        queue: Option<String>,

        /// Read and frame the file without publishing
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the database schema
    CreateDb {
        /// SQLite database URL
        #[arg(long, env = "DATABASE_URL")]
        db_url: Option<String>,
    },

    /// Drop the database schema
    DeleteDb {
        /// SQLite database URL
        #[arg(long, env = "DATABASE_URL")]
        db_url: Option<String>,
    },
}

impl Commands {
    /// Worker thread count requested for the runtime, if any
    pub fn workers(&self) -> Option<usize> {
        match self {
            Commands::Runserver { workers, .. } => workers.map(usize::from),
            _ => None,
        }
    }

    /// Log file prefix for the process running this command
    pub fn log_prefix(&self) -> &'static str {
        match self {
            Commands::Runserver { .. } => "dataweave-server",
            Commands::Runconsumer { .. } => "dataweave-consumer",
            Commands::Ingest { .. } => "dataweave-ingest",
            Commands::CreateDb { .. } | Commands::DeleteDb { .. } => "dataweave-cli",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ingest_arguments() {
        let cli = Cli::parse_from([
            "dataweave",
            "ingest",
            "--fpath",
            "products.json",
            "--rabbit-mq",
            "amqp://localhost",
            "--dry-run",
        ]);

        match cli.command {
            Commands::Ingest {
                fpath,
                rabbit_mq,
                queue,
                dry_run,
            } => {
                assert_eq!(fpath, PathBuf::from("products.json"));
                assert_eq!(rabbit_mq.as_deref(), Some("amqp://localhost"));
                assert_eq!(queue, None);
                assert!(dry_run);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_workers_must_be_positive() {
        assert!(Cli::try_parse_from(["dataweave", "runserver", "--workers", "0"]).is_err());

        let cli = Cli::parse_from(["dataweave", "-v", "runserver", "--workers", "4"]);
        assert!(cli.verbose);
        assert_eq!(cli.command.workers(), Some(4));
    }
}
