use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reading message rows out of the store. Always fatal.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open message database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to snapshot message database {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create snapshot file: {0}")]
    SnapshotFile(#[source] io::Error),
    #[error("message query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Failure materializing a single attachment. Logged, never fatal.
#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("message {id} claims an attachment but the store has no filename for it")]
    MissingSource { id: i64 },
    #[error("unable to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure loading or binding the conversation template. Always fatal.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to load stylesheet {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Anything that aborts an export run.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExportError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
