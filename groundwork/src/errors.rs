//! Error types shared across groundwork.
//!
//! All fatal errors stop the current lifecycle phase immediately; no partial
//! state is treated as valid. The only deliberately non-fatal class is
//! [`GroundworkError::Annotation`], which callers log and ignore.

use thiserror::Error;

pub type GroundworkResult<T> = Result<T, GroundworkError>;

#[derive(Debug, Error)]
pub enum GroundworkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    /// A required capability could not be installed. Fatal: the dependent
    /// service must not start against a database missing it.
    #[error("capability '{name}' install failed: {reason}")]
    Capability { name: String, reason: String },

    /// A descriptive annotation could not be recorded. Non-fatal.
    #[error("annotation failed: {0}")]
    Annotation(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    /// A declared package could not be resolved at build time. Fatal; no
    /// image is produced.
    #[error("stage '{stage}': dependency resolution failed: {reason}")]
    DependencyResolution { stage: String, reason: String },

    /// A declared carried-forward artifact is missing, or an import names an
    /// artifact the prior stage never exported. Indicates a manifest or
    /// ordering bug.
    #[error("stage '{stage}': carried-forward artifact error: {reason}")]
    StageCopy { stage: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("launch error: {0}")]
    Launch(String),

    /// A transport operation exceeded the keep-alive budget and was
    /// terminated rather than left hanging.
    #[error("operation exceeded keep-alive budget of {budget_secs}s")]
    Timeout { budget_secs: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
