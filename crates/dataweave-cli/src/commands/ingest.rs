//! `dataweave ingest` command implementation

use std::path::Path;

use anyhow::Context;
use dataweave_common::queue::redact_credentials;
use dataweave_ingest::{process_file, AmqpPublisher, MemorySink, RecordSink};
use dataweave_server::config::Config;
use tracing::{error, info, warn};

/// Publish every record of `fpath` onto the work queue
///
/// With `dry_run` the records are framed and parsed into memory and nothing is published.
pub async fn run(
    mut config: Config,
    fpath: &Path,
    rabbit_mq: Option<String>,
    queue: Option<String>,
    dry_run: bool,
) -> anyhow::Result<usize> {
    if let Some(url) = rabbit_mq {
        config.broker.url = url;
    }
    if let Some(queue) = queue {
        config.broker.queue = queue;
    }

    if dry_run {
        info!(path = %fpath.display(), "Dry run, nothing will be published");
        let sink = MemorySink::new();
        return ingest_with(&sink, fpath, &config.broker.queue).await;
    }

    info!(
        broker = %redact_credentials(&config.broker.url),
        queue = %config.broker.queue,
        "Publishing file"
    );
    let publisher = AmqpPublisher::new(config.broker.url.clone());
    let result = ingest_with(&publisher, fpath, &config.broker.queue).await;

    if let Err(e) = publisher.close().await {
        warn!(error = %e, "Failed to close publisher connection");
    }

    result
}

async fn ingest_with(sink: &dyn RecordSink, fpath: &Path, queue: &str) -> anyhow::Result<usize> {
    match process_file(fpath, queue, sink).await {
        Ok(records) => {
            println!("File ingested successfully with {} records.", records);
            Ok(records)
        },
        Err(e) => {
            error!(error = %e, path = %fpath.display(), "Ingest failed");
            println!("Failed to ingest file.");
            Err(e).with_context(|| format!("Failed to ingest {}", fpath.display()))
        },
    }
}
