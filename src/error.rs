//! Shared error types for model construction, data import, solving and
//! output queries.

use thiserror::Error;

/// Top-level error type for the crate.
///
/// Every failure carries enough context (element tag, frequency index) to
/// localize the cause. There are no retries anywhere: builder and data
/// failures leave the model unmodified, solver failures abort the sweep.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed, duplicate or missing identifiers, wrong parameter shapes,
    /// or an operation that is illegal in the model's current state.
    /// Raised at the builder call before any mutation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Ill-formed or insufficient-coverage cross-section file, or a
    /// malformed response from the external Mie solver.
    #[error("data error: {0}")]
    Data(String),

    /// Singular or indeterminate linear system at one frequency.
    #[error("solver error at frequency index {freq_index} ({freq} Hz): {reason}")]
    Solver {
        freq_index: usize,
        freq: f64,
        reason: String,
    },

    /// Output requested before a successful solve, after an invalidating
    /// mutation, or for an unknown element/quantity name.
    #[error("query error: {0}")]
    Query(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Error::Query(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
