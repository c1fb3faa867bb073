///! Error types for the scrape pipeline
///!
///! Unit-level problems (a bad row, a header without labels) are not errors;
///! see `RowSkip` / `SectionSkip` in the parser. Everything here aborts a pass.

use thiserror::Error;

/// The rendered page yielded no usable server snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// No server header matched; the page layout is not recognized.
    #[error("no server sections found (page structure not recognized)")]
    NoServerHeaders,

    /// Headers were present but every section was skipped.
    #[error("no server sections found ({headers} headers matched, none had valid sietch rows)")]
    NoValidSections { headers: usize },

    #[error("invalid selector '{0}'")]
    Selector(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to load {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("failed to read page content: {0}")]
    Content(String),

    #[error("render task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{field} value {value} does not fit the column type")]
    ValueOutOfRange { field: &'static str, value: u32 },

    #[error("store lock poisoned")]
    Poisoned,
}

/// A failed pass, as reported to whoever triggered it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("render failed: {0}")]
    RenderFailure(#[from] RenderError),

    #[error("extraction failed: {0}")]
    ExtractionEmpty(#[from] ExtractError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}
