//! Error types for the Stratus provisioning system.
//!
//! This module provides a comprehensive error hierarchy for all phases
//! of a deployment pass: configuration, graph construction, planning,
//! execution, state management, and the provisioning backend.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Stratus provisioning system.
#[derive(Debug, Error)]
pub enum StratusError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dependency graph errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Execution errors.
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Provisioning backend errors.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource declaration.
    #[error("Duplicate resource id: {id}")]
    DuplicateId {
        /// The duplicated logical id.
        id: String,
    },

    /// A reference placeholder could not be parsed.
    #[error("Invalid reference '{reference}' in resource '{id}': {message}")]
    InvalidReference {
        /// Logical id of the resource holding the reference.
        id: String,
        /// The raw reference text.
        reference: String,
        /// Description of the problem.
        message: String,
    },
}

/// Dependency graph errors.
///
/// These abort planning entirely; nothing is applied when one occurs.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The declared references form a cycle.
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected {
        /// Logical ids forming the cycle, in traversal order.
        cycle: Vec<String>,
    },

    /// A resource references an id that is neither declared nor recorded.
    #[error("Resource '{id}' references unknown resource '{target}'")]
    UnresolvedReference {
        /// Logical id of the referencing resource.
        id: String,
        /// The missing target id.
        target: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan contains replacements that were not confirmed.
    ///
    /// Changing an immutable attribute forces a new physical identity,
    /// which would orphan dependents if applied silently.
    #[error(
        "Resource '{id}' requires replacement (immutable attributes changed: {})",
        fields.join(", ")
    )]
    ReplaceRequiresNewId {
        /// Logical id of the resource.
        id: String,
        /// Immutable attributes whose values changed.
        fields: Vec<String>,
    },

    /// Conflicting operations in plan.
    #[error("Conflicting operations in plan: {message}")]
    ConflictingOperations {
        /// Description of the conflict.
        message: String,
    },
}

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecError {
    /// An output was read before its producer completed.
    ///
    /// Structurally impossible under correct scheduling; indicates a
    /// scheduler invariant violation rather than a user mistake.
    #[error("Output '{output}' of resource '{id}' read before it was produced")]
    OutputUnavailable {
        /// Logical id of the producing resource.
        id: String,
        /// Name of the missing output.
        output: String,
    },

    /// The pass was cancelled before all operations started.
    #[error("Deployment pass incomplete: {abandoned} operations abandoned after cancellation")]
    Incomplete {
        /// Number of operations never started.
        abandoned: usize,
    },
}

/// Provisioning backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Authentication failed.
    #[error("Backend authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The backend rejected or failed an apply operation.
    #[error("Apply failed for {kind} '{id}': {message}")]
    ApplyFailed {
        /// Resource kind being applied.
        kind: String,
        /// Logical id of the resource.
        id: String,
        /// Error message from the backend.
        message: String,
    },

    /// The backend rejected or failed a delete operation.
    #[error("Delete failed for physical resource '{physical_id}': {message}")]
    DeleteFailed {
        /// Physical identifier being deleted.
        physical_id: String,
        /// Error message from the backend.
        message: String,
    },

    /// Rate limited.
    #[error("Backend rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Physical resource not found.
    #[error("Physical resource not found: {physical_id}")]
    NotFound {
        /// The missing physical identifier.
        physical_id: String,
    },

    /// Network error.
    #[error("Network error communicating with backend: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the backend.
    #[error("Invalid response from backend: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Storage backend error.
    #[error("State backend error: {message}")]
    StoreError {
        /// Description of the storage error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for Stratus operations.
pub type Result<T> = std::result::Result<T, StratusError>;

impl StratusError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend(
                BackendError::RateLimited { .. } | BackendError::NetworkError { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Backend(BackendError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Backend(BackendError::NetworkError { .. }) => Some(5),
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a storage backend error with the given message.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl BackendError {
    /// Creates an apply failure for a resource.
    #[must_use]
    pub fn apply_failed(
        kind: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ApplyFailed {
            kind: kind.into(),
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a delete failure for a physical resource.
    #[must_use]
    pub fn delete_failed(physical_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeleteFailed {
            physical_id: physical_id.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
