use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while reading the daemon's KDL configuration.
#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(chordmap::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(chordmap::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(chordmap::config::missing_field))]
    MissingField { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw event or combination could not be constructed from its source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot create an event from {input:?}: {reason}")]
pub struct CreationError {
    pub input: String,
    pub reason: String,
}

impl CreationError {
    pub fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// A mapping does not satisfy the rules required for injection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid mapping for {combination}: {message}")]
pub struct ValidationError {
    pub combination: String,
    pub message: String,
}

/// Inserting or renaming would make two mappings share a trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("a mapping for {combination} already exists")]
pub struct DuplicateCombinationError {
    pub combination: String,
}

/// Failures of preset container and preset directory operations.
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("preset has no path")]
    NoPath,

    #[error("preset file {0} does not exist")]
    Missing(PathBuf),

    #[error("no mapping for {0}")]
    NotFound(String),

    #[error(transparent)]
    Duplicate(#[from] DuplicateCombinationError),

    #[error("preset {0} already exists")]
    AlreadyExists(String),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode preset: {0}")]
    Json(#[from] serde_json::Error),
}

impl PresetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A macro string could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroParseError {
    #[error("empty macro")]
    Empty,

    #[error("unknown macro function {0:?}")]
    UnknownFunction(String),

    #[error("unknown key symbol {0:?}")]
    UnknownSymbol(String),

    #[error("{function}() {message}")]
    Arguments { function: String, message: String },

    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },
}
