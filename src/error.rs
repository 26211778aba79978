//! Error taxonomy for footprint and shift calculations
//!
//! Library code returns typed errors; the binary wraps them with `anyhow`
//! context. A footprint computed against a wrong or defaulted carbon
//! intensity is worse than failing, so CI lookups never fall back silently.

use thiserror::Error;

/// Errors raised by the core footprint, partitioning and shift logic
#[derive(Error, Debug)]
pub enum IchnosError {
    /// A required time key is absent from the carbon intensity series.
    /// Fatal: the CI data does not cover the workflow's execution window.
    #[error("no carbon intensity value for time key {key}")]
    MissingCarbonIntensity { key: String },

    /// The CI series does not extend far enough to cover a requested
    /// shift window. The caller may skip that window but must report it.
    #[error(
        "carbon intensity series too short for a {window}-slot shift window \
         (candidate range {lo}..={hi}, series has {len} slots)"
    )]
    InsufficientShiftCoverage {
        window: usize,
        lo: i64,
        hi: i64,
        len: usize,
    },

    /// A task with `start > complete`; rejected at ingestion, before the
    /// partitioner sees it.
    #[error("task {id} has start {start} after completion {complete}")]
    InvalidTaskSpan { id: String, start: i64, complete: i64 },

    /// Unrecognized power-model identifier, malformed node profile, or an
    /// otherwise unusable parameter. Model resolution fails closed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A trace or CI row that cannot be coerced into the expected types.
    #[error("malformed {file}: {reason}")]
    Malformed { file: String, reason: String },

    /// The Boavizta embodied-carbon lookup failed (network or payload).
    #[error("embodied carbon lookup for '{cpu_model}' failed: {reason}")]
    EmbodiedLookup { cpu_model: String, reason: String },

    /// A timestamp that cannot be mapped to a calendar time key.
    #[error("timestamp {ms}ms is outside the representable range")]
    TimestampOutOfRange { ms: i64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IchnosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ci_message_names_key() {
        let err = IchnosError::MissingCarbonIntensity {
            key: "01/15-09:00".to_string(),
        };
        assert!(err.to_string().contains("01/15-09:00"));
    }

    #[test]
    fn test_invalid_span_message() {
        let err = IchnosError::InvalidTaskSpan {
            id: "t1".to_string(),
            start: 100,
            complete: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("t1"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: IchnosError = io.into();
        assert!(matches!(err, IchnosError::Io(_)));
    }
}
