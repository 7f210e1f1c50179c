//! `dataweave runconsumer` command implementation

use std::time::Duration;

use dataweave_common::queue::redact_credentials;
use dataweave_server::config::Config;
use dataweave_server::consumer::{ConsumerError, ProductConsumer};
use dataweave_server::{db, shutdown};
use tracing::{error, info, warn};

/// Pause before reconnecting after the broker connection is lost
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Store products from the work queue until Ctrl+C or SIGTERM
///
/// A lost broker connection is re-established after [`RECONNECT_DELAY`]; configuration errors
/// end the command.
pub async fn run(mut config: Config, rabbit_mq: Option<String>, queue: Option<String>) -> anyhow::Result<()> {
    if let Some(url) = rabbit_mq {
        config.broker.url = url;
    }
    if let Some(queue) = queue {
        config.broker.queue = queue;
    }
    config.validate()?;

    let pool = db::create_pool(&config.database).await?;
    db::schema::create_schema(&pool).await?;

    info!(
        broker = %redact_credentials(&config.broker.url),
        queue = %config.broker.queue,
        "Starting consumer"
    );

    let shutdown = shutdown::shutdown_token();
    let mut consumer = ProductConsumer::new(pool.clone(), &config.broker);

    let result = loop {
        let run = match consumer.connect().await {
            Ok(()) => consumer.start_consuming(shutdown.clone()).await.map(|stats| {
                info!(
                    received = stats.received,
                    acked = stats.acked,
                    retried = stats.retried,
                    dead_lettered = stats.dead_lettered,
                    "Consumer run finished"
                );
            }),
            Err(e) => Err(e),
        };

        match run {
            Ok(()) if shutdown.is_cancelled() => break Ok(()),
            Ok(()) => warn!("Consumer cancelled by broker, reconnecting"),
            Err(e) if is_connection_error(&e) => {
                error!(error = %e, "Broker connection failed, reconnecting");
            },
            Err(e) => break Err(e.into()),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            _ = tokio::time::sleep(RECONNECT_DELAY) => {},
        }
    };

    pool.close().await;
    info!("Consumer shut down");
    result
}

fn is_connection_error(err: &ConsumerError) -> bool {
    match err {
        ConsumerError::Broker(_) => true,
        ConsumerError::Queue(e) => e.is_broker(),
        ConsumerError::NotConnected => false,
    }
}
