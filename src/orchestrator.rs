use std::collections::HashSet;

use log::{error, info, warn};

use crate::error::EtlError;
use crate::loader::ChunkLoader;
use crate::reader::Reader;
use crate::transform::TransformerPipeline;

/// Drives reader -> transformer -> loader for one run, consulting the
/// ledger to skip already-`success` chunks and retrying the rest up to
/// `max_retries`. A permanently-failed chunk does not abort the run -- the
/// ledger keeps its `failed` status for a future run (or operator) to
/// revisit.
pub struct Orchestrator<R: Reader, L: ChunkLoader> {
    reader: R,
    transformer: TransformerPipeline,
    loader: L,
    run_id: String,
    max_retries: u32,
}

impl<R: Reader, L: ChunkLoader> Orchestrator<R, L> {
    pub fn new(
        reader: R,
        transformer: TransformerPipeline,
        loader: L,
        run_id: String,
        max_retries: u32,
    ) -> Self {
        Self {
            reader,
            transformer,
            loader,
            run_id,
            max_retries,
        }
    }

    pub async fn run(&self) -> Result<(), EtlError> {
        info!("run {} started", self.run_id);

        let processed_chunks: HashSet<u64> = self
            .loader
            .processed_chunks(&self.run_id)
            .await?
            .into_iter()
            .map(|id| id as u64)
            .collect();

        for chunk in self.reader.chunks()? {
            let chunk = chunk?;

            if processed_chunks.contains(&chunk.chunk_id) {
                info!("run {} chunk {} already succeeded, skipping", self.run_id, chunk.chunk_id);
                continue;
            }

            self.process_with_retry(chunk).await;
        }

        info!("run {} finished", self.run_id);
        Ok(())
    }

    /// Up to `max_retries` attempts (0 means exactly one attempt). Only a
    /// load failure triggers a retry -- the transform step is total and
    /// never fails. Retries are immediate; no backoff is implemented here
    /// (see DESIGN.md for the deferred backoff knob).
    async fn process_with_retry(&self, chunk: crate::reader::Chunk) {
        let chunk_id = chunk.chunk_id;
        let attempts_allowed = self.max_retries.max(1);

        for attempt in 1..=attempts_allowed {
            let transformed = self.transformer.process_chunk(&chunk);

            match self.loader.load_chunk(&self.run_id, &transformed).await {
                Ok(()) => {
                    info!(
                        "run {} chunk {} processed successfully (attempt {})",
                        self.run_id, chunk_id, attempt
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        "run {} chunk {} attempt {}/{} failed: {}",
                        self.run_id, chunk_id, attempt, attempts_allowed, e
                    );
                }
            }
        }

        error!(
            "run {} chunk {} permanently failed after {} attempts",
            self.run_id, chunk_id, attempts_allowed
        );
    }
}
