//! Work queue consumer
//!
//! Pulls product records off the durable work queue and stores them through the transform
//! engine. Deliveries are acknowledged manually and only after the outcome is settled:
//!
//! - stored → `ack`
//! - transient failure with retries left → republish with `x-retry-count` + 1 after a backoff
//!   delay, then `ack` the original once the broker confirms the copy
//! - anything else → `reject(requeue = false)`, which the broker routes to `<queue>.dead-letter`
//!
//! One message is handled at a time; run more consumer processes to scale out.

pub mod disposition;
pub mod settle;

use dataweave_common::queue::{self, QueueTopology};
use dataweave_common::DataweaveError;
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions, ConfirmSelectOptions},
    types::FieldTable,
    Channel, Connection,
};
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::features::products::{transform_and_store, StoredProduct, TransformError};

pub use disposition::{Disposition, RetryPolicy};
pub use settle::{process_delivery, ChannelSettler, DeliverySettler, IncomingMessage};

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error(transparent)]
    Queue(#[from] DataweaveError),

    #[error("consumer is not connected; call connect() first")]
    NotConnected,
}

/// Lifecycle of a [`ProductConsumer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connected,
    Consuming,
    Stopped,
}

/// Counters for one `start_consuming` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acked: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

pub struct ProductConsumer {
    pool: SqlitePool,
    url: String,
    topology: QueueTopology,
    prefetch: u16,
    policy: RetryPolicy,
    state: ConsumerState,
    session: Option<BrokerSession>,
}

impl ProductConsumer {
    pub fn new(pool: SqlitePool, config: &BrokerConfig) -> Self {
        Self {
            pool,
            url: config.url.clone(),
            topology: QueueTopology::new(config.queue.clone()),
            prefetch: config.prefetch,
            policy: RetryPolicy::from_config(config),
            state: ConsumerState::Disconnected,
            session: None,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn queue(&self) -> &str {
        self.topology.queue()
    }

    /// Connect, set prefetch, and declare the queue topology
    ///
    /// Calling this on a connected consumer does nothing.
    pub async fn connect(&mut self) -> Result<(), ConsumerError> {
        if self.session.is_some() {
            return Ok(());
        }

        let connection = queue::connect(&self.url).await?;
        let channel = connection.create_channel().await?;
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await?;
        // Retry copies are republished on this channel and must be confirmed
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        self.topology.declare(&channel).await?;

        info!(
            queue = %self.topology.queue(),
            prefetch = self.prefetch,
            "Consumer connected"
        );

        self.session = Some(BrokerSession {
            connection,
            channel,
        });
        self.state = ConsumerState::Connected;
        Ok(())
    }

    /// Handle deliveries until `shutdown` is cancelled or the broker cancels the consumer
    ///
    /// Cancellation is observed between messages, so the message in flight is always settled
    /// first. The connection is closed before returning.
    pub async fn start_consuming(
        &mut self,
        shutdown: CancellationToken,
    ) -> Result<ConsumerStats, ConsumerError> {
        let result = self.consume(shutdown).await;
        self.close().await;
        self.state = ConsumerState::Stopped;
        result
    }

    async fn consume(&mut self, shutdown: CancellationToken) -> Result<ConsumerStats, ConsumerError> {
        let session = self.session.as_ref().ok_or(ConsumerError::NotConnected)?;
        let consumer_tag = format!("dataweave-{}", Uuid::new_v4());

        let mut deliveries = session
            .channel
            .basic_consume(
                self.topology.queue(),
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.state = ConsumerState::Consuming;
        info!(
            queue = %self.topology.queue(),
            consumer_tag = %consumer_tag,
            "Starting consumer"
        );

        let settler = ChannelSettler::new(session.channel.clone());
        let mut stats = ConsumerStats::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(error = %e, "Consumer channel failed");
                    return Err(e.into());
                },
                None => {
                    warn!("Consumer cancelled by broker");
                    break;
                },
            };

            stats.received += 1;
            let message = IncomingMessage {
                delivery_tag: delivery.delivery_tag,
                body: &delivery.data,
                retries: queue::retry_count(delivery.properties.headers()),
            };
            let disposition = process_delivery(
                &self.pool,
                &settler,
                &self.policy,
                self.topology.queue(),
                message,
                &shutdown,
            )
            .await?;

            match disposition {
                Some(Disposition::Ack) => stats.acked += 1,
                Some(Disposition::Retry { .. }) => stats.retried += 1,
                Some(Disposition::DeadLetter { .. }) => stats.dead_lettered += 1,
                None => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                },
            }
            debug!(?disposition, "Delivery settled");
        }

        info!(
            received = stats.received,
            acked = stats.acked,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            "Consumer stopped"
        );
        Ok(stats)
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.channel.close(200, "consumer stopped").await {
            warn!(error = %e, "Failed to close consumer channel");
        }
        if let Err(e) = session.connection.close(200, "consumer stopped").await {
            warn!(error = %e, "Failed to close consumer connection");
        }
    }
}

/// Decode one message body and store it
pub async fn process_message(
    pool: &SqlitePool,
    body: &[u8],
) -> Result<StoredProduct, TransformError> {
    let message: Value = serde_json::from_slice(body).map_err(TransformError::Decode)?;
    transform_and_store(pool, &message).await
}
