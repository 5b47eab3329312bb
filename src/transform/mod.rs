mod steps;

pub use steps::{CleanStep, EnrichStep, NormalizeStep};

use crate::reader::Chunk;
use crate::record::Record;

/// One quarantined record: the absolute row index it came from, why it
/// failed, and the record as it looked at the failing step's entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformError {
    pub row_index: u64,
    pub reason: String,
    pub raw_record: Record,
}

/// The output of running one `Chunk` through the pipeline. Invariant:
/// `records.len() + errors.len() == <input Chunk.records.len()>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedChunk {
    pub chunk_id: u64,
    pub records: Vec<Record>,
    pub errors: Vec<TransformError>,
}

/// A single step in the pipeline. Pure function of the record and whatever
/// immutable configuration the step was built with.
pub trait TransformStep: Send + Sync {
    fn process(&self, record: &Record) -> Result<Record, String>;
}

/// An ordered, fixed list of steps applied to every record in a chunk.
/// Total: `process_chunk` never fails -- per-record failures are caught and
/// quarantined, never propagated.
pub struct TransformerPipeline {
    steps: Vec<Box<dyn TransformStep>>,
}

impl TransformerPipeline {
    pub fn new(steps: Vec<Box<dyn TransformStep>>) -> Self {
        Self { steps }
    }

    pub fn process_chunk(&self, chunk: &Chunk) -> TransformedChunk {
        let mut records = Vec::with_capacity(chunk.records.len());
        let mut errors = Vec::new();

        for (i, record) in chunk.records.iter().enumerate() {
            match self.run_steps(record) {
                Ok(transformed) => records.push(transformed),
                Err((reason, raw_record)) => errors.push(TransformError {
                    row_index: chunk.row_start + i as u64,
                    reason,
                    raw_record,
                }),
            }
        }

        TransformedChunk {
            chunk_id: chunk.chunk_id,
            records,
            errors,
        }
    }

    /// Runs every step in order, returning the record as it stood at the
    /// entry of whichever step failed (not the original chunk record).
    fn run_steps(&self, record: &Record) -> Result<Record, (String, Record)> {
        let mut current = record.clone();
        for step in &self.steps {
            match step.process(&current) {
                Ok(next) => current = next,
                Err(reason) => return Err((reason, current)),
            }
        }
        Ok(current)
    }
}
