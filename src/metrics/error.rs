//! Sampler error types

use thiserror::Error;

/// Errors a sampler may report for a whole sample.
///
/// Failures of single sub-metrics are not errors; they leave the field at
/// its zero value.
#[derive(Error, Debug)]
pub enum SampleError {
    /// The probe could not produce any data at all
    #[error("Probe unavailable: {0}")]
    Unavailable(String),

    /// The probe panicked or returned inconsistent data
    #[error("Probe failed: {0}")]
    Probe(String),
}

/// Result type for sampling operations
pub type SampleResult<T> = Result<T, SampleError>;
