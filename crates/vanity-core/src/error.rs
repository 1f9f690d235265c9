//! Error types for the fetch pipeline.
//!
//! Every failure carries the chain of operations it travelled through, so a
//! caller sees `SubdirFetcher.fetch: resolver.resolve: revision not found ...`
//! while still being able to branch on [`ErrorKind`].

use std::fmt;
use std::path::PathBuf;

/// What went wrong, independent of where.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The requested version cannot be mapped to any revision.
    #[error("revision not found: {query} ({detail})")]
    RevisionNotFound { query: String, detail: String },

    /// The requested version matches several incompatible candidates.
    #[error("ambiguous version {query}: matches {}", candidates.join(", "))]
    AmbiguousVersion {
        query: String,
        candidates: Vec<String>,
    },

    /// No manifest at the module root for the resolved revision.
    #[error("manifest not found: {path} at {revision}")]
    ManifestNotFound { path: String, revision: String },

    /// Symlinks, submodules and other non-regular entries.
    #[error("unsupported file type for {path}: {file_type}")]
    UnsupportedFileType { path: String, file_type: String },

    /// A tree entry name that cannot be placed in an archive.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The archive or one of its files exceeds a configured ceiling.
    #[error("archive too large: {detail}")]
    ArchiveTooLarge { detail: String },

    /// Two entries differ only by letter case.
    #[error("case-insensitive path collision: {first} and {second}")]
    CaseCollision { first: String, second: String },

    /// The temporary workspace could not be created.
    #[error("workspace unavailable at {}: {source}", root.display())]
    WorkspaceUnavailable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport or authentication failure while opening a repository.
    #[error("repository unreachable: {location}: {detail}")]
    RepositoryUnreachable { location: String, detail: String },

    /// The caller cancelled the fetch or its deadline passed.
    #[error("fetch cancelled")]
    Cancelled,

    /// Unexpected failure reading an already opened repository.
    #[error("repository error: {0}")]
    Repository(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive write error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure talking to the upstream module proxy.
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// A failure tagged with the operations that raised and propagated it.
#[derive(Debug)]
pub struct Error {
    ops: Vec<&'static str>,
    kind: ErrorKind,
}

impl Error {
    pub fn new(op: &'static str, kind: ErrorKind) -> Self {
        Self {
            ops: vec![op],
            kind,
        }
    }

    /// Tag the error with an enclosing operation. The kind is unchanged.
    pub fn op(mut self, op: &'static str) -> Self {
        self.ops.push(op);
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// Operations from innermost to outermost.
    pub fn ops(&self) -> &[&'static str] {
        &self.ops
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in self.ops.iter().rev() {
            write!(f, "{op}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Attach an operation name to any error convertible into [`ErrorKind`].
pub trait ResultExt<T> {
    fn op(self, op: &'static str) -> Result<T>;
}

impl<T, E: Into<ErrorKind>> ResultExt<T> for std::result::Result<T, E> {
    fn op(self, op: &'static str) -> Result<T> {
        self.map_err(|e| Error::new(op, e.into()))
    }
}

/// Re-tag an already typed error with an enclosing operation.
pub trait WrapOp<T> {
    fn wrap(self, op: &'static str) -> Result<T>;
}

impl<T> WrapOp<T> for Result<T> {
    fn wrap(self, op: &'static str) -> Result<T> {
        self.map_err(|e| e.op(op))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
