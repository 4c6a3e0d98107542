//! Typed errors for the places where callers branch on the failure kind.
//! Everything else flows through `anyhow::Result`.

/// Rejected writes. The prior valid value is always retained by the caller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("thresholds must be strictly increasing (yellow {yellow_ms}ms, red {red_ms}ms, gone {gone_ms}ms)")]
    ThresholdOrder {
        yellow_ms: u64,
        red_ms: u64,
        gone_ms: u64,
    },

    #[error("threshold must be greater than zero")]
    ZeroThreshold,

    #[error("archive folder name must not be empty when archiving is enabled")]
    EmptyArchiveFolder,

    #[error("persisted blob '{key}' has version {found}, expected {expected}")]
    BlobVersion {
        key: String,
        found: u32,
        expected: u32,
    },

    #[error("persisted blob '{key}' is malformed: {details}")]
    MalformedBlob { key: String, details: String },
}
