use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur across the amitrace crates.
///
/// Library crates return this type directly; the binary converts it into a
/// `miette` diagnostic at the boundary.
///
/// # Examples
///
/// ```
/// use amitrace_core::AmitraceError;
///
/// let err = AmitraceError::NotExist { id: "deadbeef".into(), rel_path: None };
/// assert!(err.is_not_exist());
/// assert!(err.to_string().contains("deadbeef"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AmitraceError {
    /// Filesystem or pipe I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A git subprocess exited unsuccessfully.
    #[error("git error: {0}")]
    Git(String),

    /// The requested object or ref does not exist.
    #[error("object does not exist [id: {id}, rel_path: {}]", .rel_path.as_deref().unwrap_or(""))]
    NotExist {
        /// Object id or revision that was looked up.
        id: String,
        /// Path inside the tree, when the lookup was path based.
        rel_path: Option<String>,
    },

    /// A subprocess ran past its time budget and was killed.
    #[error("execution timed out after {duration:?}")]
    ExecTimeout {
        /// The budget that was exceeded.
        duration: Duration,
    },

    /// An argument was rejected before the command was spawned.
    #[error("broken command: {reason} (argument {arg:?})")]
    #[diagnostic(help("revisions and paths from user input must not start with '-'"))]
    BrokenCommand {
        /// The offending argument.
        arg: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The installed git is too old for a requested feature.
    #[error("{feature} requires git >= {required}, found {actual}")]
    #[diagnostic(help("upgrade git or drop the option that needs it"))]
    UnsupportedVersion {
        /// Feature that needed the newer version.
        feature: String,
        /// Minimum version, dotted.
        required: String,
        /// Detected version, dotted.
        actual: String,
    },

    /// Malformed git object framing.
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed diff or input text.
    #[error("parse error: {0}")]
    Parse(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The occurrence log did not pass validation.
    #[error("schema error: {0}")]
    #[diagnostic(help("regenerate the log with `amitrace scan`"))]
    Schema(String),
}

impl AmitraceError {
    /// Whether this error means "object or ref absent".
    pub fn is_not_exist(&self) -> bool {
        matches!(self, AmitraceError::NotExist { .. })
    }

    /// Whether this error is a subprocess timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AmitraceError::ExecTimeout { .. })
    }

    /// Shorthand for a [`AmitraceError::NotExist`] without a path.
    pub fn not_exist(id: impl Into<String>) -> Self {
        AmitraceError::NotExist {
            id: id.into(),
            rel_path: None,
        }
    }
}
