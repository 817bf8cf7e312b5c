use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {}: {source}", path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid directory layout: {0}")]
    Layout(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntakeError {
    pub fn at_path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntakeError::PathIo {
            path: path.into(),
            source,
        }
    }

    /// True when the underlying I/O failure means the file is simply gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            IntakeError::Io(err) | IntakeError::PathIo { source: err, .. } => {
                err.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

#[cfg(feature = "watch")]
impl From<notify::Error> for IntakeError {
    fn from(err: notify::Error) -> Self {
        IntakeError::Watch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IntakeError>;
