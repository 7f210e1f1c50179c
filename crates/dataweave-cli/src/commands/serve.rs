//! `dataweave runserver` command implementation

use std::sync::Arc;

use dataweave_ingest::AmqpPublisher;
use dataweave_server::{api, config::Config};
use tracing::{info, warn};

/// Serve the HTTP API until Ctrl+C or SIGTERM
pub async fn run(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        database = %config.database.url,
        "Starting Dataweave API server"
    );

    let publisher = Arc::new(AmqpPublisher::new(config.broker.url.clone()));
    let result = api::serve(config, publisher.clone()).await;

    if let Err(e) = publisher.close().await {
        warn!(error = %e, "Failed to close publisher connection");
    }

    result
}
