//! Queue publishers
//!
//! [`RecordSink`] is the seam between the file pipeline and the broker. [`AmqpPublisher`] sends
//! each record to RabbitMQ as a persistent message on a durable queue; [`MemorySink`] keeps
//! records in memory for dry runs.

use std::collections::HashSet;

use async_trait::async_trait;
use dataweave_common::queue::{self, QueueTopology};
use dataweave_common::DataweaveError;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    Channel, Connection,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::reader::RawRecord;

/// Errors raised while handing a record to the queue
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error(transparent)]
    Queue(#[from] DataweaveError),

    #[error("record could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker did not confirm the message on queue '{queue}'")]
    Nacked { queue: String },

    #[error("publisher is closed")]
    Closed,
}

/// Destination for parsed records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver one record to the named queue
    ///
    /// An `Err` means the record must be treated as not delivered.
    async fn publish(&self, queue: &str, record: &RawRecord) -> Result<(), PublishError>;
}

/// Open connection, confirm-mode channel, and the queues already declared on it
struct Session {
    connection: Connection,
    channel: Channel,
    declared: HashSet<String>,
}

impl Session {
    fn is_usable(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// Publishes records to RabbitMQ over one long-lived connection
///
/// The connection is opened on first use and shared by every publish. After a broker error the
/// session is dropped and the next publish reconnects; the failing publish itself is not retried.
pub struct AmqpPublisher {
    url: String,
    session: Mutex<Option<Session>>,
}

impl AmqpPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session: Mutex::new(None),
        }
    }

    async fn open_session(&self) -> Result<Session, PublishError> {
        let connection = queue::connect(&self.url).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        debug!(channel_id = channel.id(), "Opened publisher channel");

        Ok(Session {
            connection,
            channel,
            declared: HashSet::new(),
        })
    }

    async fn publish_on(
        session: &mut Session,
        queue_name: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        if !session.declared.contains(queue_name) {
            QueueTopology::new(queue_name)
                .declare(&session.channel)
                .await?;
            session.declared.insert(queue_name.to_string());
        }

        let confirmation = session
            .channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                payload,
                queue::persistent_properties(),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(PublishError::Nacked {
                queue: queue_name.to_string(),
            });
        }

        Ok(())
    }

    /// Close the connection if one is open
    pub async fn close(&self) -> Result<(), PublishError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        session.channel.close(200, "publisher closed").await?;
        session.connection.close(200, "publisher closed").await?;
        info!("Publisher connection closed");
        Ok(())
    }
}

#[async_trait]
impl RecordSink for AmqpPublisher {
    async fn publish(&self, queue_name: &str, record: &RawRecord) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(record)?;
        let mut guard = self.session.lock().await;

        if !guard.as_ref().is_some_and(Session::is_usable) {
            if guard.is_some() {
                warn!("Publisher connection lost, reconnecting");
            }
            *guard = Some(self.open_session().await?);
        }

        let session = guard.as_mut().ok_or(PublishError::Closed)?;
        let result = Self::publish_on(session, queue_name, &payload).await;

        if let Err(ref err) = result {
            let broken = match err {
                PublishError::Broker(_) => true,
                PublishError::Queue(e) => e.is_broker(),
                _ => false,
            };
            if broken {
                *guard = None;
            }
        }

        result
    }
}

/// In-memory sink that records everything published to it
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<(String, RawRecord)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in publish order
    pub async fn records(&self) -> Vec<(String, RawRecord)> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn publish(&self, queue_name: &str, record: &RawRecord) -> Result<(), PublishError> {
        self.records
            .lock()
            .await
            .push((queue_name.to_string(), record.clone()));
        Ok(())
    }
}
