//! File → queue pipeline

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::publisher::{PublishError, RecordSink};
use crate::reader::{ReaderError, RecordStream};

/// Why a file could not be ingested
///
/// Records published before the failure stay on the queue; no partial count is reported.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read records: {0}")]
    Read(#[from] ReaderError),

    #[error("failed to publish record #{record}: {source}")]
    Publish {
        /// 1-based position of the record in the file
        record: usize,
        #[source]
        source: PublishError,
    },
}

/// Stream every record of `path` onto `queue`, one message per record, in file order
///
/// Returns the number of records published. Reading stops at the first read or publish error.
#[tracing::instrument(skip(sink, path), fields(path = %path.display()))]
pub async fn process_file(
    path: &Path,
    queue: &str,
    sink: &dyn RecordSink,
) -> Result<usize, IngestError> {
    let result = publish_all(path, queue, sink).await;

    match &result {
        Ok(records) => info!(records, "File ingested"),
        Err(err) => error!(error = %err, "Error processing file"),
    }

    result
}

async fn publish_all(path: &Path, queue: &str, sink: &dyn RecordSink) -> Result<usize, IngestError> {
    let mut total_records = 0;

    for record in RecordStream::open(path)? {
        let record = record?;
        sink.publish(queue, &record)
            .await
            .map_err(|source| IngestError::Publish {
                record: total_records + 1,
                source,
            })?;
        total_records += 1;
        debug!(record = total_records, "Record published");
    }

    Ok(total_records)
}
