use std::io;
use thiserror::Error;

/// Result type for asar operations
pub type Result<T> = std::result::Result<T, AsarError>;

/// Unified error type for all asar operations
#[derive(Debug, Error)]
pub enum AsarError {
    // Header errors
    #[error("Truncated archive: {0}")]
    TruncatedArchive(String),

    #[error("Malformed archive header: {0}")]
    MalformedHeader(String),

    // Filesystem errors
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Too many levels of symbolic links ({hops}): {path}")]
    SymlinkLoop { path: String, hops: usize },

    #[error("Cannot read unpacked file: {0}")]
    ExternalFileUnavailable(String),

    #[error("Integrity check failed for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    // Module errors
    #[error("Cannot find module '{request}'{}", format_require_stack(.require_stack))]
    ModuleNotFound {
        request: String,
        require_stack: Vec<String>,
    },

    #[error("No evaluator registered for extension '{0}'")]
    UnsupportedExtension(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid package descriptor {path}: {reason}")]
    InvalidPackage { path: String, reason: String },

    #[error("Failed to evaluate {filename}: {source}")]
    Evaluation {
        filename: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for AsarError {
    fn from(err: toml::de::Error) -> Self {
        AsarError::Config(err.to_string())
    }
}

fn format_require_stack(stack: &[String]) -> String {
    if stack.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nRequire stack:");
    for filename in stack {
        out.push_str("\n- ");
        out.push_str(filename);
    }
    out
}
