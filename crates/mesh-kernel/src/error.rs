//! Common error vocabulary for the mesh.
//!
//! Every failure surfaced across a component boundary maps to one of these
//! kinds; the registry translates them to HTTP statuses and the CLI to exit
//! codes and human-readable lines.

use thiserror::Error;

/// The mesh-wide error kinds.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MeshError {
    /// A malformed payload, query parameter, or configuration value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced agent, capability, or process does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A registration violated a security rule.
    #[error("security validation failed: {0}")]
    SecurityValidation(String),

    /// The persistent store rejected or lost a write.
    #[error("store failure: {0}")]
    StoreFailure(String),

    /// A spawned process exited during its settle window.
    #[error("{name} failed to start (exit code {exit_code:?}): {stderr}")]
    StartupFailure {
        name: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A process survived both graceful and forced termination.
    #[error("termination failed: {0}")]
    TerminationFailure(String),

    /// The registry could not be reached.
    #[error("registry connection error: {0}")]
    RegistryConnection(String),

    /// A registry call exceeded its deadline.
    #[error("registry timeout: {0}")]
    RegistryTimeout(String),

    /// A declared dependency could not be resolved remotely or locally.
    #[error("failed to resolve dependency '{dependency}': {reason}")]
    DependencyResolution { dependency: String, reason: String },

    /// The operation was cancelled before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

pub type MeshResult<T> = Result<T, MeshError>;

impl MeshError {
    /// Short machine-readable code for JSON error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            MeshError::InvalidInput(_) => "INVALID_INPUT",
            MeshError::NotFound(_) => "NOT_FOUND",
            MeshError::SecurityValidation(_) => "SECURITY_VALIDATION",
            MeshError::StoreFailure(_) => "STORE_FAILURE",
            MeshError::StartupFailure { .. } => "STARTUP_FAILURE",
            MeshError::TerminationFailure(_) => "TERMINATION_FAILURE",
            MeshError::RegistryConnection(_) => "REGISTRY_CONNECTION",
            MeshError::RegistryTimeout(_) => "REGISTRY_TIMEOUT",
            MeshError::DependencyResolution { .. } => "DEPENDENCY_RESOLUTION",
            MeshError::Cancelled(_) => "CANCELLED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_failure_formats_context() {
        let err = MeshError::StartupFailure {
            name: "hello-world".into(),
            exit_code: Some(1),
            stderr: "missing module".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("hello-world"));
        assert!(msg.contains("missing module"));
        assert_eq!(err.code(), "STARTUP_FAILURE");
    }
}
