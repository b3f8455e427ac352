use futures::stream::{self, StreamExt};
use shared::{BatchItemOutcome, BatchOutcome, BatchRequest, RequestError, TransferAction};
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::TransferEngine;
use crate::error::TransferResult;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Applies one transition to many transfers. Every item runs in its own
/// engine transaction; a failing item is recorded and never affects the
/// others. Only structurally invalid requests fail as a whole.
pub struct BatchProcessor {
    engine: Arc<TransferEngine>,
    max_batch_size: usize,
    concurrency: usize,
}

impl BatchProcessor {
    pub fn new(engine: Arc<TransferEngine>, max_batch_size: usize, concurrency: usize) -> Self {
        Self {
            engine,
            max_batch_size,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn process(&self, request: BatchRequest) -> TransferResult<BatchOutcome> {
        let action: TransferAction = request.action.parse()?;
        if request.transfer_ids.is_empty() {
            return Err(RequestError::EmptyBatch.into());
        }
        if request.transfer_ids.len() > self.max_batch_size {
            return Err(RequestError::BatchTooLarge {
                max: self.max_batch_size,
                actual: request.transfer_ids.len(),
            }
            .into());
        }

        let engine = &self.engine;
        let results: Vec<BatchItemOutcome> = stream::iter(request.transfer_ids)
            .map(|id| async move {
                match engine.transition(id, action).await {
                    Ok(record) => BatchItemOutcome::succeeded(id, record.status),
                    Err(e) => {
                        warn!(transfer_id = %id, action = %action, code = e.code(), error = %e, "batch item failed");
                        BatchItemOutcome::failed(id, e.public_message())
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let outcome = BatchOutcome::new(action, results);
        info!(
            action = %action,
            total = outcome.summary.total,
            succeeded = outcome.summary.succeeded,
            failed = outcome.summary.failed,
            "batch processed"
        );
        Ok(outcome)
    }
}
