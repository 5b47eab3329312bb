pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod reader;
pub mod record;
pub mod transform;

pub use config::EtlConfig;
pub use db::Database;
pub use error::EtlError;
pub use loader::{ChunkLoader, Column, Loader, TargetTable};
pub use orchestrator::Orchestrator;
pub use reader::{Chunk, DelimitedReader, JsonLinesReader, Reader};
pub use record::{Record, Value};
pub use transform::{
    CleanStep, EnrichStep, NormalizeStep, TransformError, TransformStep, TransformedChunk,
    TransformerPipeline,
};
