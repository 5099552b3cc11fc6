//! Error types for pcbprobe.
//!
//! Every fallible core operation returns [`ProbeError`]. Operations validate
//! their inputs completely before mutating anything, so an `Err` always means
//! the project state is exactly what it was before the call.

use std::path::PathBuf;

use thiserror::Error;

use crate::value::ValueError;

/// Result type alias using [`ProbeError`].
pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    // ============ Pin and connection errors ============
    /// Pin text that does not follow `REF`, `REF-N` or `REF-TAB`
    #[error("Malformed pin '{text}': {reason}")]
    MalformedPin { text: String, reason: String },

    /// Connection whose two ends are the same pin
    #[error("Cannot connect {pin} to itself")]
    SelfConnection { pin: String },

    /// Merge whose source and target are the same pin
    #[error("Cannot merge {pin} into itself")]
    SelfMerge { pin: String },

    /// Delete of a specific connection that is not recorded
    #[error("Connection not found: {a} <-> {b}")]
    EdgeNotFound { a: String, b: String },

    /// Reference that is not in the component store
    #[error("Component {reference} not found")]
    UnknownComponent { reference: String },

    /// Pin number larger than the component's pin count
    #[error("Pin {pin} is out of range ({reference} has {pin_count} pins)")]
    PinIndexOutOfRange {
        pin: String,
        reference: String,
        pin_count: u32,
    },

    /// Net naming through a pin that has no connections
    #[error("Pin {pin} is not in any net")]
    PinNotConnected { pin: String },

    // ============ Component errors ============
    /// Edit of a field that components do not have
    #[error("Unknown component field '{field}' (use pins/value/package/description)")]
    UnknownField { field: String },

    /// Measurement kind that is not recognised
    #[error("Unknown measurement type '{kind}'")]
    UnknownMeasurement { kind: String },

    /// Measurement text that does not parse for its kind
    #[error("Invalid {kind} measurement '{input}'")]
    InvalidMeasurement { kind: String, input: String },

    /// Value parsing failure
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Export format that is not recognised
    #[error("Unknown export '{kind}' (use bom/csv/parts/kicad/named/all)")]
    UnknownExport { kind: String },

    // ============ State errors ============
    /// A persisted state file that cannot be interpreted
    #[error("Corrupt state file '{}': {message}", path.display())]
    CorruptState { path: PathBuf, message: String },

    /// Derived nets disagree with a from-scratch traversal
    #[error("Net audit failed: {message}")]
    Inconsistent { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ProbeError {
    /// Create a malformed pin error
    pub fn malformed_pin(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPin {
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt state error
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            message: message.into(),
        }
    }
}
