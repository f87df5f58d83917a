//! Error types for devflow
//!
//! Each external boundary gets its own closed error enum so callers can
//! assert on the failure kind rather than string-matching. Failures at the
//! phase-agent and participant boundaries are recovered into data
//! (`PhaseResult` statuses, placeholder strings); only configuration
//! problems terminate the process, before any phase runs.

use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Failure of a completion-service call.
///
/// Always recovered at the call site: a failed advisory call degrades to a
/// placeholder string, a failed blocking call degrades the owning phase
/// into a `Failure` result. Never propagated past the agent boundary.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Network-level failure (DNS, connect, TLS, malformed response body).
    #[error("completion transport error: {0}")]
    Transport(String),

    /// The service rejected the credential.
    #[error("completion service rejected the API key: {0}")]
    Auth(String),

    /// Non-success HTTP status from the service (rate limits, outages).
    #[error("completion service returned status {status}: {message}")]
    Provider { status: u16, message: String },

    /// The call did not complete within the configured timeout.
    #[error("completion call timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// The service answered but produced no usable text.
    #[error("completion response contained no text content")]
    EmptyResponse,

    /// The backend could not be constructed from the configuration.
    #[error("completion backend misconfigured: {0}")]
    Misconfiguration(String),
}

/// Failure of a local subprocess invocation.
///
/// A non-zero exit code is NOT an error at this level — it is reported via
/// `ProcessOutput::exit_code` so phases can fold it into their own result.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command had no program to execute.
    #[error("empty command: no program to execute")]
    EmptyCommand,

    /// The program could not be spawned (missing executable, permissions).
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The process did not finish within the configured timeout.
    #[error("command timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// Waiting on the spawned process failed.
    #[error("failed to wait for process: {reason}")]
    Wait { reason: String },
}

/// Configuration errors. Fatal at startup: the process exits with code 2
/// before any phase runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "API key not provided. Pass --api-key or set one of the environment variables: {env_vars}"
    )]
    MissingCredential { env_vars: String },

    #[error("unsupported LLM backend '{backend}'. Supported backends: {supported}")]
    UnsupportedBackend { backend: String, supported: String },

    #[error("invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Top-level error type for the devflow library.
#[derive(Error, Debug)]
pub enum DevFlowError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("command error: {0}")]
    Command(#[from] CommandError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevFlowError {
    /// Map this error to the CLI exit code table.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CONFIG,
            Self::Completion(_) | Self::Command(_) | Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_display() {
        let err = CompletionError::Provider {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));

        let err = CompletionError::Timeout { timeout_seconds: 60 };
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::Spawn {
            program: "pytest".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert!(err.to_string().contains("pytest"));
    }

    #[test]
    fn test_config_error_mentions_remediation() {
        let err = ConfigError::MissingCredential {
            env_vars: "DEVFLOW_API_KEY / OPENAI_API_KEY".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("--api-key"));
        assert!(msg.contains("DEVFLOW_API_KEY"));
    }

    #[test]
    fn test_exit_code_mapping() {
        let config_err: DevFlowError = ConfigError::InvalidValue {
            key: "rounds".to_string(),
            value: "0".to_string(),
        }
        .into();
        assert_eq!(config_err.to_exit_code(), ExitCode::CONFIG);

        let completion_err: DevFlowError = CompletionError::EmptyResponse.into();
        assert_eq!(completion_err.to_exit_code(), ExitCode::INTERNAL);
    }
}
