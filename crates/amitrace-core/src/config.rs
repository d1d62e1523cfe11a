use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AmitraceError;
use crate::types::Whitespace;

/// Top-level configuration loaded from `.amitrace.toml`.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration. CLI flags override what is loaded here.
///
/// # Examples
///
/// ```
/// use amitrace_core::AmitraceConfig;
///
/// let config = AmitraceConfig::default();
/// assert_eq!(config.diff.max_lines, 4000);
/// assert_eq!(config.git.timeout_secs, 360);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmitraceConfig {
    /// Subprocess settings.
    #[serde(default)]
    pub git: GitConfig,
    /// Diff limits and detection overrides.
    #[serde(default)]
    pub diff: DiffConfig,
    /// Charset detection hints.
    #[serde(default)]
    pub encoding: EncodingConfig,
    /// Occurrence scan settings.
    #[serde(default)]
    pub scan: ScanConfig,
}

impl AmitraceConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AmitraceError::Io`] if the file cannot be read, or
    /// [`AmitraceError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use amitrace_core::AmitraceConfig;
    /// use std::path::Path;
    ///
    /// let config = AmitraceConfig::from_file(Path::new(".amitrace.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, AmitraceError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AmitraceError::Toml`] if parsing fails, or
    /// [`AmitraceError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use amitrace_core::AmitraceConfig;
    ///
    /// let toml = r#"
    /// [diff]
    /// max_files = 50
    /// "#;
    /// let config = AmitraceConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.diff.max_files, 50);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, AmitraceError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AmitraceError> {
        if self.git.executable.trim().is_empty() {
            return Err(AmitraceError::Config("git.executable must not be empty".into()));
        }
        if self.git.timeout_secs == 0 || self.git.diff_timeout_secs == 0 {
            return Err(AmitraceError::Config("git timeouts must be positive".into()));
        }
        Ok(())
    }
}

/// How git subprocesses are spawned.
///
/// # Examples
///
/// ```
/// use amitrace_core::GitConfig;
///
/// let config = GitConfig::default();
/// assert_eq!(config.executable, "git");
/// assert_eq!(config.pass_through_env, vec!["GNUPGHOME".to_string()]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Binary to run (default: `"git"`).
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Budget for ordinary commands in seconds (default: 360).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Budget for `git diff` in seconds (default: 60).
    #[serde(default = "default_diff_timeout_secs")]
    pub diff_timeout_secs: u64,
    /// Exported as `HOME` for every subprocess (default: `/tmp`).
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Variables copied from the parent environment when set.
    #[serde(default = "default_pass_through_env")]
    pub pass_through_env: Vec<String>,
}

fn default_executable() -> String {
    "git".into()
}

fn default_timeout_secs() -> u64 {
    360
}

fn default_diff_timeout_secs() -> u64 {
    60
}

fn default_home_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_pass_through_env() -> Vec<String> {
    vec!["GNUPGHOME".into()]
}

impl GitConfig {
    /// Default per-command budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Budget for `git diff`.
    pub fn diff_timeout(&self) -> Duration {
        Duration::from_secs(self.diff_timeout_secs)
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            timeout_secs: default_timeout_secs(),
            diff_timeout_secs: default_diff_timeout_secs(),
            home_dir: default_home_dir(),
            pass_through_env: default_pass_through_env(),
        }
    }
}

/// Limits applied while parsing diffs.
///
/// Hitting a limit truncates the output and flags it incomplete; it is never
/// an error.
///
/// # Examples
///
/// ```
/// use amitrace_core::DiffConfig;
///
/// let config = DiffConfig::default();
/// assert_eq!(config.max_lines, 4000);
/// assert_eq!(config.max_line_characters, 5000);
/// assert_eq!(config.max_files, 1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Maximum lines per file before it is flagged incomplete (default: 4000).
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Maximum characters per line before it is truncated (default: 5000).
    #[serde(default = "default_max_line_characters")]
    pub max_line_characters: usize,
    /// Maximum files per diff (default: 1000).
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Whitespace handling passed to `git diff`.
    #[serde(default)]
    pub whitespace: Whitespace,
    /// Extra glob patterns treated as vendored.
    #[serde(default)]
    pub vendored_patterns: Vec<String>,
    /// Extra glob patterns treated as generated.
    #[serde(default)]
    pub generated_patterns: Vec<String>,
}

fn default_max_lines() -> usize {
    4000
}

fn default_max_line_characters() -> usize {
    5000
}

fn default_max_files() -> usize {
    1000
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_line_characters: default_max_line_characters(),
            max_files: default_max_files(),
            whitespace: Whitespace::default(),
            vendored_patterns: Vec::new(),
            generated_patterns: Vec::new(),
        }
    }
}

/// Charset detection hints for non-UTF-8 diffs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Charset labels in tie-break order.
    #[serde(default)]
    pub charset_priority: Vec<String>,
    /// Label used when detection yields nothing usable.
    #[serde(default)]
    pub ansi_charset: String,
}

/// Occurrence scan settings.
///
/// # Examples
///
/// ```
/// use amitrace_core::ScanConfig;
///
/// let config = ScanConfig::default();
/// assert_eq!(config.since_margin_days, 30);
/// assert_eq!(config.creation_margin_days, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Name recorded on every occurrence (default: repository directory name).
    #[serde(default)]
    pub repo_name: String,
    /// Days subtracted from the oldest creation date to form `since`.
    #[serde(default = "default_since_margin_days")]
    pub since_margin_days: i64,
    /// Days subtracted from each creation date before comparing commit dates.
    #[serde(default = "default_creation_margin_days")]
    pub creation_margin_days: i64,
    /// Where `amitrace scan` writes the occurrence log.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_since_margin_days() -> i64 {
    30
}

fn default_creation_margin_days() -> i64 {
    1
}

fn default_output() -> PathBuf {
    PathBuf::from("ami-occurrences.json")
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            repo_name: String::new(),
            since_margin_days: default_since_margin_days(),
            creation_margin_days: default_creation_margin_days(),
            output: default_output(),
        }
    }
}
