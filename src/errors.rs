use thiserror::Error;

/// Terminal failures of a renewal attempt. Each kind carries the
/// user-visible message and maps to a stable process exit code; the binary
/// reports the code of the most recent failure.
#[derive(Debug, Error)]
pub enum RenewalError {
    #[error("No {0} plugin could be selected")]
    PluginUnavailable(&'static str),
    #[error("Renewal target not found")]
    TargetGone,
    #[error("Authorization failed")]
    AuthorizationFailed,
    #[error("No certificate generated")]
    CertificateMissing,
    #[error("Store failed: {0}")]
    StoreFailed(String),
    #[error("Install failed: {0}")]
    InstallFailed(String),
    #[error("Delete failed: {0}")]
    PruneFailed(String),
    #[error("Invalid {0} input")]
    InvalidInput(&'static str),
    #[error("{0}")]
    Unexpected(String),
}

impl RenewalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RenewalError::PluginUnavailable(_) => 2,
            RenewalError::TargetGone => 3,
            RenewalError::AuthorizationFailed => 4,
            RenewalError::CertificateMissing => 5,
            RenewalError::StoreFailed(_) => 6,
            RenewalError::InstallFailed(_) => 7,
            RenewalError::PruneFailed(_) => 8,
            RenewalError::InvalidInput(_) => 9,
            RenewalError::Unexpected(_) => 1,
        }
    }

    /// Recovers the exit code from a persisted result message. Results carry
    /// the user-visible wording, so the prefixes here mirror the `#[error]`
    /// strings above.
    pub fn code_for_message(message: &str) -> i32 {
        if message.ends_with("plugin could be selected") {
            RenewalError::PluginUnavailable("").exit_code()
        } else if message == "Renewal target not found" {
            RenewalError::TargetGone.exit_code()
        } else if message == "Authorization failed" {
            RenewalError::AuthorizationFailed.exit_code()
        } else if message == "No certificate generated" {
            RenewalError::CertificateMissing.exit_code()
        } else if message.starts_with("Store failed:") {
            RenewalError::StoreFailed(String::new()).exit_code()
        } else if message.starts_with("Install failed:") {
            RenewalError::InstallFailed(String::new()).exit_code()
        } else if message.starts_with("Delete failed:") {
            RenewalError::PruneFailed(String::new()).exit_code()
        } else if message.starts_with("Invalid ") && message.ends_with(" input") {
            RenewalError::InvalidInput("").exit_code()
        } else {
            RenewalError::Unexpected(String::new()).exit_code()
        }
    }
}
