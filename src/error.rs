use crate::types::report::Stage;

use std::time::Duration;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by unitinstall APIs.
///
/// Variants are classifiable (callers branch on them, the CLI maps them to exit codes) and carry
/// enough context to tell an operator what to fix.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The service descriptor violates an invariant (empty name, empty command, negative delay,
    /// relative path, control characters).
    #[error("invalid input: {context}")]
    InvalidInput { context: String },

    /// Elevation was refused, or the OS denied access to the target directory.
    #[error("permission denied for {action}: {detail}")]
    PermissionDenied {
        action: &'static str,
        detail: String,
    },

    /// Writing the unit file failed.
    #[error("io error: {context}")]
    IoError { context: String },

    /// A different unit file already exists and the overwrite policy is `Refuse`.
    #[error("unit file already exists with different content: {path}")]
    AlreadyExists { path: String },

    /// The service manager could not be reached, refused the request, or did not answer in time.
    #[error("service manager unavailable ({action}): {detail}")]
    ManagerUnavailable {
        action: &'static str,
        detail: String,
    },

    /// The manager does not know the unit (it was never installed).
    #[error("unit not found: {unit}")]
    UnitNotFound { unit: String },
}

impl Error {
    pub(crate) fn invalid_input(context: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: context.into(),
        }
    }

    pub(crate) fn manager_unavailable(action: &'static str, detail: impl Into<String>) -> Self {
        Self::ManagerUnavailable {
            action,
            detail: detail.into(),
        }
    }

    pub(crate) fn manager_timeout(action: &'static str, timeout: Duration) -> Self {
        Self::ManagerUnavailable {
            action,
            detail: format!("no answer within {timeout:?}"),
        }
    }

    /// Process exit code for this error class.
    ///
    /// `1` validation, `2` permission, `3` I/O, `4` service manager.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InvalidInput { .. } => 1,
            Error::PermissionDenied { .. } => 2,
            Error::IoError { .. } | Error::AlreadyExists { .. } => 3,
            Error::ManagerUnavailable { .. } | Error::UnitNotFound { .. } => 4,
        }
    }
}

/// Failure of the install pipeline, naming the stage that stopped it.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
#[non_exhaustive]
pub struct InstallFailure {
    pub stage: Stage,
    #[source]
    pub source: Error,
    /// Unit name as far as it could be determined (empty if the name itself was invalid).
    pub unit: String,
    /// Where the unit file was (or would have been) written.
    pub path: Option<String>,
    /// Whether a unit file exists at `path` after the failure. Nothing is rolled back.
    pub file_left_on_disk: bool,
}

impl InstallFailure {
    pub fn exit_code(&self) -> u8 {
        self.source.exit_code()
    }
}
