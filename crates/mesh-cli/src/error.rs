//! CLI error types and exit-code mapping.

use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    /// A problem loading, parsing, or validating CLI configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced process or agent does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A spawned process exited during its settle window.
    #[error("{name} failed to start (exit code {exit_code:?}): {stderr}")]
    Startup {
        name: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A process survived both graceful and forced termination.
    #[error("Termination failed: {0}")]
    Termination(String),

    /// The registry could not be reached or answered with an error.
    #[error("Registry error: {0}")]
    Registry(String),

    /// A long operation hit its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The user interrupted the operation.
    #[error("Interrupted")]
    Cancelled,

    /// An operating-system I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization / deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Process exit code for this failure: 130 for interruption, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Cancelled => 130,
            _ => 1,
        }
    }
}

impl From<mesh_kernel::MeshError> for CliError {
    fn from(err: mesh_kernel::MeshError) -> Self {
        use mesh_kernel::MeshError;
        match err {
            MeshError::NotFound(what) => CliError::NotFound(what),
            MeshError::StartupFailure { name, exit_code, stderr } => {
                CliError::Startup { name, exit_code, stderr }
            }
            MeshError::TerminationFailure(msg) => CliError::Termination(msg),
            MeshError::RegistryTimeout(msg) => CliError::Timeout(msg),
            MeshError::Cancelled(_) => CliError::Cancelled,
            other => CliError::Registry(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_130() {
        assert_eq!(CliError::Cancelled.exit_code(), 130);
        assert_eq!(CliError::Config("x".into()).exit_code(), 1);
    }
}
