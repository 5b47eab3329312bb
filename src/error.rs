use thiserror::Error;

/// Unified error type for the engine. Record-level transform failures never
/// become an `EtlError` -- they are quarantined into `TransformedChunk.errors`
/// instead, per the transformer's total contract.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("setup error: {0}")]
    Setup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("reader error: {0}")]
    Reader(String),

    #[error("load error: {0}")]
    Load(String),
}
