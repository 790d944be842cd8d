use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum ResolveError {
    #[error("not found")]
    NotFound,

    #[error("credential store request failed: {0}")]
    Communication(String),

    #[error("stored credential is unreadable: {0}")]
    Corrupt(String),
}

/// Looks up a plaintext credential by name, table and version.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, name: &str, table: &str, version: &str)
    -> Result<Vec<u8>, ResolveError>;
}
