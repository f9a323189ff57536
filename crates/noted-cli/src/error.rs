use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] noted_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("Notebook not found: {0}")]
    NotebookNotFound(String),
    #[error("Tag not found: {0}")]
    TagNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error(
        "Sync is not configured. Set NOTED_SYNC_URL and NOTED_SYNC_TOKEN to enable `noted sync`."
    )]
    SyncNotConfigured,
}
