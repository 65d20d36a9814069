//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when reading or writing cluster objects
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes client/transport error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because the object changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server rejected the request
    #[error("Cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    /// Whether the object was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the write lost an optimistic concurrency race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => match response.code {
                404 => Self::NotFound(response.message.clone()),
                409 => Self::Conflict(response.message.clone()),
                code => Self::Api(format!("{} (HTTP {})", response.message, code)),
            },
            other => Self::Kube(other),
        }
    }
}
