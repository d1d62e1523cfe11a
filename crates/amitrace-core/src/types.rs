use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Final verdict for a tracked image.
///
/// Serialized by name. Legacy logs that stored the numeric code
/// (0 through 3) are accepted on read.
///
/// # Examples
///
/// ```
/// use amitrace_core::ImageStatus;
///
/// let status: ImageStatus = "in-use".parse().unwrap();
/// assert_eq!(status, ImageStatus::InUse);
/// assert_eq!(status.to_string(), "InUse");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ImageStatus {
    /// Not classified yet.
    #[default]
    Unknown,
    /// Still referenced somewhere in the repository.
    InUse,
    /// Never appeared in any diff after its creation date.
    NeverUsed,
    /// Appeared once and has since been removed everywhere.
    NoLongerUsed,
}

impl ImageStatus {
    /// All statuses in report order.
    pub const ALL: [ImageStatus; 4] = [
        ImageStatus::InUse,
        ImageStatus::NoLongerUsed,
        ImageStatus::NeverUsed,
        ImageStatus::Unknown,
    ];

    /// Map a legacy numeric code to a status.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ImageStatus::Unknown),
            1 => Some(ImageStatus::InUse),
            2 => Some(ImageStatus::NeverUsed),
            3 => Some(ImageStatus::NoLongerUsed),
            _ => None,
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageStatus::Unknown => write!(f, "Unknown"),
            ImageStatus::InUse => write!(f, "InUse"),
            ImageStatus::NeverUsed => write!(f, "NeverUsed"),
            ImageStatus::NoLongerUsed => write!(f, "NoLongerUsed"),
        }
    }
}

impl FromStr for ImageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "unknown" => Ok(ImageStatus::Unknown),
            "inuse" => Ok(ImageStatus::InUse),
            "neverused" => Ok(ImageStatus::NeverUsed),
            "nolongerused" => Ok(ImageStatus::NoLongerUsed),
            other => Err(format!("unknown image status: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for ImageStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(u8),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => ImageStatus::from_code(code)
                .ok_or_else(|| D::Error::custom(format!("unknown image status code: {code}"))),
            Repr::Name(name) => name.parse().map_err(D::Error::custom),
        }
    }
}

/// Whitespace handling passed to `git diff`.
///
/// # Examples
///
/// ```
/// use amitrace_core::Whitespace;
///
/// assert_eq!(Whitespace::IgnoreAll.git_flag(), Some("-w"));
/// assert_eq!(Whitespace::None.git_flag(), None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Whitespace {
    /// Whitespace changes are shown.
    #[default]
    None,
    /// `-w`
    IgnoreAll,
    /// `-b`
    IgnoreChange,
    /// `--ignore-space-at-eol`
    IgnoreEol,
}

impl Whitespace {
    /// The flag to pass to `git diff`, if any.
    pub fn git_flag(self) -> Option<&'static str> {
        match self {
            Whitespace::None => None,
            Whitespace::IgnoreAll => Some("-w"),
            Whitespace::IgnoreChange => Some("-b"),
            Whitespace::IgnoreEol => Some("--ignore-space-at-eol"),
        }
    }
}

impl FromStr for Whitespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" | "show-all" => Ok(Whitespace::None),
            "ignore-all" => Ok(Whitespace::IgnoreAll),
            "ignore-change" => Ok(Whitespace::IgnoreChange),
            "ignore-eol" => Ok(Whitespace::IgnoreEol),
            other => Err(format!("unknown whitespace mode: {other}")),
        }
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use amitrace_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown tables.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
