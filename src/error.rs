// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for softener-metrics
//!
//! Errors only exist at the edges of the engine: configuration, persisted
//! state and decoding of poll records. Processing a poll cycle never fails.

use thiserror::Error;

/// Result type alias for softener-metrics operations
pub type Result<T> = std::result::Result<T, SoftenerError>;

/// Main error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoftenerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted state error
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Input decoding error
    #[error("Input error: {0}")]
    Input(#[from] InputError),
}

/// Invalid engine configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Hardness must be finite and non-negative
    #[error("Invalid hardness for {field}: {value}")]
    InvalidHardness { field: &'static str, value: f64 },

    /// Residual hardness cannot exceed the raw water it was softened from
    #[error("Softened hardness {softened} °dH exceeds raw hardness {raw} °dH")]
    SoftenedAboveRaw { softened: f64, raw: f64 },

    /// Sodium baseline outside the accepted range
    #[error("Raw sodium {value} mg/L outside 0..={max}")]
    SodiumOutOfRange { value: f64, max: f64 },

    /// Meter factor must be strictly positive
    #[error("House meter factor must be > 0, got {0}")]
    InvalidFactor(f64),

    /// Regeneration self-consumption must be finite and non-negative
    #[error("Invalid regeneration self-consumption: {0} L")]
    InvalidRegenOffset(f64),

    /// Degraded diagnostics would be logged more often than allowed
    #[error("Degraded log interval {value} s below minimum {min} s")]
    LogIntervalTooShort { value: i64, min: i64 },

    /// Unknown unit mode string
    #[error("Unknown house meter unit mode: {0}")]
    UnknownUnitMode(String),

    /// Config document could not be parsed
    #[error("Malformed config: {0}")]
    Malformed(String),
}

/// Persisted state could not be read or written
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    /// Filesystem failure
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// State document could not be parsed
    #[error("Malformed state: {0}")]
    Malformed(String),

    /// State written by a newer format
    #[error("Unsupported state version {found}, expected at most {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// A poll record could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Record is not valid JSON for the expected shape
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Unknown source status keyword
    #[error("Unknown {source_name} status: {value}")]
    UnknownStatus {
        source_name: &'static str,
        value: String,
    },
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Malformed(err.to_string())
    }
}
