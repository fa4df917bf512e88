use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JitError {
    #[error("failed to create execution engine for `{symbol}`: {message}")]
    EngineCreation { symbol: String, message: String },

    #[error("module does not define entry function `{0}`")]
    UnknownEntry(String),

    #[error("invalid entry symbol name {0:?}")]
    InvalidEntrySymbol(String),

    #[error("failed to parse IR: {0}")]
    InvalidIr(String),

    #[error("invalid module: {0}")]
    InvalidModule(String),

    #[error("failed to open {} to dump intermediate representation", path.display())]
    CouldNotOpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid cache metadata")]
    Metadata(#[from] serde_json::Error),
}
