//! Error types for the stripe pipelines

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or repairing a stream.
///
/// The type is `Clone` because an operation broadcasts its single terminal
/// error to every live output lane and also hands it back through
/// [`crate::ec::OperationHandle`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Erasure Coding Errors
    // =========================================================================
    /// Fewer than k usable lanes at the start of a decode or repair
    #[error("Insufficient shards: {available} < {required} (available < k)")]
    InsufficientShards { available: usize, required: usize },

    /// An input channel failed or ended early
    #[error("Upstream error on {}: {}", lane_label(.lane), .reason)]
    Upstream { lane: Option<usize>, reason: String },

    /// An output channel rejected a write or end-of-stream
    #[error("Downstream error on {}: {}", lane_label(.lane), .reason)]
    Downstream { lane: Option<usize>, reason: String },

    /// The coding primitive failed for a stripe
    #[error("Coding primitive failed: {0}")]
    CodingPrimitive(String),

    /// Bad k/m, geometry or lane-array arguments
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl Error {
    /// Re-attribute an error raised by an input channel to its lane.
    pub(crate) fn upstream(lane: Option<usize>, err: Error) -> Self {
        match err {
            Error::Upstream { reason, .. } => Error::Upstream { lane, reason },
            other => Error::Upstream {
                lane,
                reason: other.to_string(),
            },
        }
    }

    /// Re-attribute an error raised by an output channel to its lane.
    pub(crate) fn downstream(lane: Option<usize>, err: Error) -> Self {
        match err {
            Error::Downstream { reason, .. } => Error::Downstream { lane, reason },
            other => Error::Downstream {
                lane,
                reason: other.to_string(),
            },
        }
    }

    /// Short label used for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::InsufficientShards { .. } => "insufficient_shards",
            Error::Upstream { .. } => "upstream",
            Error::Downstream { .. } => "downstream",
            Error::CodingPrimitive(_) => "coding_primitive",
            Error::ContractViolation(_) => "contract_violation",
            Error::Io { .. } => "io",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }
}

fn lane_label(lane: &Option<usize>) -> String {
    match lane {
        Some(lane) => format!("lane {}", lane),
        None => "stream".to_string(),
    }
}
