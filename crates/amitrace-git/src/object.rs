use std::fmt;
use std::str::FromStr;

use amitrace_core::AmitraceError;

/// Kind of a git object as reported by `cat-file`.
///
/// # Examples
///
/// ```
/// use amitrace_git::ObjectType;
///
/// assert_eq!("tree".parse::<ObjectType>().unwrap(), ObjectType::Tree);
/// assert_eq!(ObjectType::Blob.to_string(), "blob");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        })
    }
}

impl FromStr for ObjectType {
    type Err = AmitraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(ObjectType::Commit),
            "tree" => Ok(ObjectType::Tree),
            "blob" => Ok(ObjectType::Blob),
            "tag" => Ok(ObjectType::Tag),
            other => Err(AmitraceError::Decode(format!("unknown object type: {other}"))),
        }
    }
}
