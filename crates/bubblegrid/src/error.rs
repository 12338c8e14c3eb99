//! Engine error taxonomy.
//!
//! Per-file variants mark a single batch slot as failed without aborting the
//! run; configuration and template variants abort before any file is
//! dispatched. Degenerate data (empty fields, no confident gap) is not an
//! error and is resolved by the documented fallback policies instead.

use std::path::PathBuf;

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The sheet image could not be loaded.
    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Batch-start contract violation in the engine configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Batch-start contract violation in the sheet template.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    /// Template file I/O or JSON parsing failure.
    #[error("failed to load template {path}: {reason}")]
    TemplateLoad { path: PathBuf, reason: String },
}
