//! Settling one delivery with the broker
//!
//! [`DeliverySettler`] is the broker side of the consumer: ack, reject, and confirmed
//! republish. [`process_delivery`] stores a message and then settles it according to the
//! [`RetryPolicy`]. The original delivery is acked only after a successful store or after its
//! retry copy has been confirmed by the broker.

use async_trait::async_trait;
use chrono::Utc;
use dataweave_common::queue;
use lapin::{
    options::{BasicAckOptions, BasicPublishOptions, BasicRejectOptions},
    types::FieldTable,
    Channel,
};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::{process_message, ConsumerError, Disposition, RetryPolicy};

/// Broker operations on the channel a delivery arrived on
#[async_trait]
pub trait DeliverySettler: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<(), ConsumerError>;

    /// Reject without requeue, which dead-letters the message
    async fn reject(&self, delivery_tag: u64) -> Result<(), ConsumerError>;

    /// Publish a persistent copy onto `queue` and wait for the broker
    ///
    /// Returns `false` when the broker did not confirm the copy.
    async fn republish(
        &self,
        queue: &str,
        body: &[u8],
        headers: FieldTable,
    ) -> Result<bool, ConsumerError>;
}

/// Settles deliveries on a lapin channel in confirm mode
pub struct ChannelSettler {
    channel: Channel,
}

impl ChannelSettler {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl DeliverySettler for ChannelSettler {
    async fn ack(&self, delivery_tag: u64) -> Result<(), ConsumerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64) -> Result<(), ConsumerError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }

    async fn republish(
        &self,
        queue: &str,
        body: &[u8],
        headers: FieldTable,
    ) -> Result<bool, ConsumerError> {
        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                queue::persistent_properties().with_headers(headers),
            )
            .await?
            .await?;

        Ok(confirmation.is_ack())
    }
}

/// A delivery as the consumer sees it
#[derive(Debug, Clone, Copy)]
pub struct IncomingMessage<'a> {
    pub delivery_tag: u64,
    pub body: &'a [u8],
    /// Value of `x-retry-count`, 0 for a first delivery
    pub retries: u32,
}

/// Store one message and settle its delivery
///
/// Returns `None` when `shutdown` fires during a retry backoff. The delivery is then left
/// unsettled and the broker redelivers it once the channel closes.
#[tracing::instrument(
    skip(pool, settler, policy, message, shutdown),
    fields(delivery_tag = message.delivery_tag, retries = message.retries)
)]
pub async fn process_delivery(
    pool: &SqlitePool,
    settler: &dyn DeliverySettler,
    policy: &RetryPolicy,
    queue_name: &str,
    message: IncomingMessage<'_>,
    shutdown: &CancellationToken,
) -> Result<Option<Disposition>, ConsumerError> {
    let result = process_message(pool, message.body).await;
    let disposition = policy.disposition(&result, message.retries);

    match &disposition {
        Disposition::Ack => {
            settler.ack(message.delivery_tag).await?;
        },
        Disposition::Retry { attempt, delay } => {
            let last_error = result
                .as_ref()
                .err()
                .map(ToString::to_string)
                .unwrap_or_default();
            warn!(
                error = %last_error,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, scheduling retry"
            );

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!("Shutdown during retry backoff, leaving delivery for redelivery");
                    return Ok(None);
                }
                _ = tokio::time::sleep(*delay) => {}
            }

            let headers = queue::retry_headers(*attempt, &last_error, &Utc::now().to_rfc3339());
            if !settler.republish(queue_name, message.body, headers).await? {
                let reason = "retry copy was not confirmed by the broker".to_string();
                error!(reason = %reason, "Message dead-lettered");
                settler.reject(message.delivery_tag).await?;
                return Ok(Some(Disposition::DeadLetter { reason }));
            }
            settler.ack(message.delivery_tag).await?;
        },
        Disposition::DeadLetter { reason } => {
            error!(reason = %reason, "Message dead-lettered");
            settler.reject(message.delivery_tag).await?;
        },
    }

    Ok(Some(disposition))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::schema::create_schema;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Settled {
        Ack(u64),
        Reject(u64),
        Republish { queue: String, body: Vec<u8>, retry_count: u32 },
    }

    /// Records every broker call; republishes are confirmed unless `confirm` is false
    struct RecordingSettler {
        confirm: bool,
        calls: Mutex<Vec<Settled>>,
    }

    impl RecordingSettler {
        fn new() -> Self {
            Self {
                confirm: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn unconfirmed() -> Self {
            Self {
                confirm: false,
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<Settled> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliverySettler for RecordingSettler {
        async fn ack(&self, delivery_tag: u64) -> Result<(), ConsumerError> {
            self.calls.lock().unwrap().push(Settled::Ack(delivery_tag));
            Ok(())
        }

        async fn reject(&self, delivery_tag: u64) -> Result<(), ConsumerError> {
            self.calls.lock().unwrap().push(Settled::Reject(delivery_tag));
            Ok(())
        }

        async fn republish(
            &self,
            queue: &str,
            body: &[u8],
            headers: FieldTable,
        ) -> Result<bool, ConsumerError> {
            self.calls.lock().unwrap().push(Settled::Republish {
                queue: queue.to_string(),
                body: body.to_vec(),
                retry_count: queue::retry_count(&Some(headers)),
            });
            Ok(self.confirm)
        }
    }

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    fn policy(base_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay,
            max_delay: Duration::from_secs(60),
        }
    }

    fn body(id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "available_price": "12.50",
            "stock": "In Stock",
            "source": "X",
            "meta_info": format!("{{'reference_product_id': '{}'}}", id),
        }))
        .unwrap()
    }

    fn incoming(delivery_tag: u64, body: &[u8], retries: u32) -> IncomingMessage<'_> {
        IncomingMessage {
            delivery_tag,
            body,
            retries,
        }
    }

    #[tokio::test]
    async fn test_stored_message_is_acked() {
        let pool = pool().await;
        let settler = RecordingSettler::new();
        let body = body("P1");

        let disposition = process_delivery(
            &pool,
            &settler,
            &policy(Duration::ZERO),
            "products",
            incoming(7, &body, 0),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(disposition, Some(Disposition::Ack));
        assert_eq!(settler.calls(), vec![Settled::Ack(7)]);

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_without_republish() {
        let pool = pool().await;
        let settler = RecordingSettler::new();
        let body = body("P1");
        let shutdown = CancellationToken::new();

        for tag in [1, 2] {
            process_delivery(
                &pool,
                &settler,
                &policy(Duration::ZERO),
                "products",
                incoming(tag, &body, 0),
                &shutdown,
            )
            .await
            .unwrap();
        }

        assert_eq!(settler.calls(), vec![Settled::Ack(1), Settled::Reject(2)]);
    }

    #[tokio::test]
    async fn test_transient_failure_republishes_then_acks() {
        let pool = pool().await;
        pool.close().await;
        let settler = RecordingSettler::new();
        let body = body("P1");

        let disposition = process_delivery(
            &pool,
            &settler,
            &policy(Duration::ZERO),
            "products",
            incoming(3, &body, 1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(disposition, Some(Disposition::Retry { attempt: 2, .. })));
        assert_eq!(
            settler.calls(),
            vec![
                Settled::Republish {
                    queue: "products".to_string(),
                    body: body.clone(),
                    retry_count: 2,
                },
                Settled::Ack(3),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_rejected() {
        let pool = pool().await;
        pool.close().await;
        let settler = RecordingSettler::new();
        let body = body("P1");

        let disposition = process_delivery(
            &pool,
            &settler,
            &policy(Duration::ZERO),
            "products",
            incoming(4, &body, 3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(disposition, Some(Disposition::DeadLetter { .. })));
        assert_eq!(settler.calls(), vec![Settled::Reject(4)]);
    }

    #[tokio::test]
    async fn test_unconfirmed_retry_copy_dead_letters_original() {
        let pool = pool().await;
        pool.close().await;
        let settler = RecordingSettler::unconfirmed();
        let body = body("P1");

        let disposition = process_delivery(
            &pool,
            &settler,
            &policy(Duration::ZERO),
            "products",
            incoming(5, &body, 0),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(disposition, Some(Disposition::DeadLetter { .. })));
        let calls = settler.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Settled::Republish { retry_count: 1, .. }));
        assert_eq!(calls[1], Settled::Reject(5));
    }

    #[tokio::test]
    async fn test_shutdown_during_backoff_leaves_delivery_unsettled() {
        let pool = pool().await;
        pool.close().await;
        let settler = RecordingSettler::new();
        let body = body("P1");
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let disposition = process_delivery(
            &pool,
            &settler,
            &policy(Duration::from_secs(30)),
            "products",
            incoming(6, &body, 0),
            &shutdown,
        )
        .await
        .unwrap();

        assert_eq!(disposition, None);
        assert!(settler.calls().is_empty());
    }
}
