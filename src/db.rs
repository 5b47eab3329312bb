use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::Row;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::error::EtlError;

/// A pooled, TLS-enabled `tokio-postgres` handle. Cheap to clone -- the pool
/// itself is reference-counted, so the orchestrator hands a clone to the
/// loader rather than fighting over a borrow.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Builds a pool from a `postgres://` DSN.
    pub fn connect(dsn: &str) -> Result<Self, EtlError> {
        let parsed =
            url::Url::parse(dsn).map_err(|e| EtlError::Setup(format!("invalid DSN: {}", e)))?;

        let mut pool_config = PoolConfig::new();
        pool_config.host = parsed.host_str().map(str::to_string);
        pool_config.port = parsed.port();
        pool_config.dbname = Some(parsed.path().trim_start_matches('/').to_string());
        pool_config.user = Some(parsed.username().to_string());
        pool_config.password = parsed.password().map(str::to_string);
        pool_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let tls = MakeRustlsConnect::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(rustls::RootCertStore::from_iter(
                    webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
                ))
                .with_no_client_auth(),
        );

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| EtlError::Setup(format!("failed to create pool: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn client(&self) -> Result<deadpool_postgres::Client, EtlError> {
        Ok(self.pool.get().await?)
    }

    pub async fn query(
        &self,
        query: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>, EtlError> {
        let client = self.client().await?;
        Ok(client.query(query, params).await?)
    }

    pub async fn query_one(
        &self,
        query: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Row, EtlError> {
        let client = self.client().await?;
        Ok(client.query_one(query, params).await?)
    }

    pub async fn query_opt(
        &self,
        query: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Option<Row>, EtlError> {
        let client = self.client().await?;
        Ok(client.query_opt(query, params).await?)
    }

    pub async fn execute(
        &self,
        query: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, EtlError> {
        let client = self.client().await?;
        Ok(client.execute(query, params).await?)
    }

    pub async fn close(&self) {
        self.pool.close();
    }
}
