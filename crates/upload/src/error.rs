//! Upload errors. Every network-facing variant names the stage it came from.

use std::fmt;

use crate::signer::SigningError;

/// The four round trips of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Token,
    Apply,
    Transfer,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Token => "token",
            Stage::Apply => "apply",
            Stage::Transfer => "transfer",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Network failure or transport timeout.
    #[error("{stage} stage failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx HTTP status.
    #[error("{stage} stage returned HTTP {status}: {body}")]
    Http { stage: Stage, status: u16, body: String },

    /// Well-formed response carrying a provider-level failure.
    #[error("{stage} stage rejected by provider ({code}): {message}")]
    Provider {
        stage: Stage,
        code: String,
        message: String,
    },

    /// Expected field missing or wrong shape.
    #[error("{stage} stage response is malformed: {message}")]
    Malformed { stage: Stage, message: String },

    /// Refresh-token exchange refused.
    #[error("token stage rejected (ret={ret}): {message}")]
    Token { ret: String, message: String },

    #[error("transfer stage checksum mismatch: sent {expected}, provider reported {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("audio duration {seconds}s is outside the allowed range [{min}s, {max}s]")]
    AudioDuration { seconds: f64, min: f64, max: f64 },

    #[error("request signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("invalid upload URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Config(#[from] genjobs_core::CoreError),
}

impl UploadError {
    pub(crate) fn malformed(stage: Stage, message: impl Into<String>) -> Self {
        Self::Malformed {
            stage,
            message: message.into(),
        }
    }

    /// Stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UploadError::Transport { stage, .. }
            | UploadError::Http { stage, .. }
            | UploadError::Provider { stage, .. }
            | UploadError::Malformed { stage, .. } => Some(*stage),
            UploadError::Token { .. } => Some(Stage::Token),
            UploadError::ChecksumMismatch { .. } => Some(Stage::Transfer),
            UploadError::AudioDuration { .. } => Some(Stage::Commit),
            UploadError::Signing(_)
            | UploadError::Url(_)
            | UploadError::Client(_)
            | UploadError::Config(_) => None,
        }
    }
}
