use camino::Utf8PathBuf;
use thiserror::Error;

/// Shape problems in a parsed diff document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("top-level value must be an array of diff records, found {found}")]
    NotAnArray { found: &'static str },
    #[error("record {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("record {index} has no `DiffType` key")]
    MissingDiffType { index: usize },
    #[error("record {index} ({diff_type}) has no `Diff` key")]
    MissingDiff { index: usize, diff_type: String },
    #[error("record {index} ({diff_type}) has a malformed `Diff` payload: {source}")]
    Payload {
        index: usize,
        diff_type: String,
        source: serde_json::Error,
    },
}

/// Failures turning document text into normalized text.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("unexpected diff layout: {0}")]
    Schema(#[from] SchemaError),
    #[error("failed to render: {0}")]
    Render(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to access {path}: {source}")]
    Io {
        source: std::io::Error,
        path: Utf8PathBuf,
    },
    #[error("failed to normalize {path}: {source}")]
    Document {
        source: DocumentError,
        path: Utf8PathBuf,
    },
}

impl NormalizeError {
    /// The fixture the error relates to.
    pub fn path(&self) -> &Utf8PathBuf {
        match self {
            Self::Io { path, .. } | Self::Document { path, .. } => path,
        }
    }
}
