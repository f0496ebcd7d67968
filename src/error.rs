//! Error taxonomy for the graphics pipeline.

use std::io;
use thiserror::Error;

/// Result type alias using [`GraphicError`].
pub type Result<T> = std::result::Result<T, GraphicError>;

/// Errors raised while building or rendering a graphic.
#[derive(Error, Debug)]
pub enum GraphicError {
    /// Unknown geometry, statistic, scale type or facet type, or a malformed
    /// parameter. Raised at construction; nothing is rendered.
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// A scale was used before both its domain and range were set.
    #[error("Scale for aesthetic '{aesthetic}' used before training")]
    ScaleNotTrained { aesthetic: String },

    /// A mapped field is absent from a record. Layers absorb it per datum
    /// and drop the mark.
    #[error("Field '{field}' not found in record")]
    MissingField { field: String },

    /// A statistic received no usable values. Absorbed into a degenerate
    /// output (zero-count bins, no box).
    #[error("Statistic '{statistic}' received an empty dataset")]
    EmptyDataset { statistic: String },

    /// Input data could not be interpreted as a dataset.
    #[error("Data error: {0}")]
    Data(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GraphicError {
    pub(crate) fn invalid_spec(msg: impl Into<String>) -> Self {
        GraphicError::InvalidSpec(msg.into())
    }
}
