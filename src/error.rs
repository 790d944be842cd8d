use kube::core::ErrorResponse;
use thiserror::Error;

use crate::resolver::ResolveError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("secret item #{index} is malformed: {source}")]
    MalformedItem {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to resolve '{name}' version {version} from table '{table}': {source}")]
    Resolve {
        name: String,
        version: String,
        table: String,
        #[source]
        source: ResolveError,
    },

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch stream failed: {0}")]
    Watch(#[source] ErrorResponse),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
