use std::fmt;

use amitrace_core::{AmitraceError, GitConfig};

use crate::command::{GitCommand, RunOpts};

/// A dotted `major.minor.patch` git version.
///
/// # Examples
///
/// ```
/// use amitrace_git::GitVersion;
///
/// let v = GitVersion::parse("git version 2.40.1.windows.1\n").unwrap();
/// assert_eq!(v, GitVersion::new(2, 40, 1));
/// assert!(v.at_least(GitVersion::SKIP_TO));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// First release that understands `git diff --skip-to`.
    pub const SKIP_TO: GitVersion = GitVersion::new(2, 31, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the output of `git version`.
    ///
    /// Only the third whitespace-separated field is read. A vendor suffix
    /// such as `.windows.1` is cut off, and non-numeric tails on a component
    /// (`2.39.3-rc1`) are ignored.
    pub fn parse(output: &str) -> Result<Self, AmitraceError> {
        let raw = output
            .split_whitespace()
            .nth(2)
            .ok_or_else(|| AmitraceError::Parse(format!("unexpected `git version` output: {output:?}")))?;
        let raw = match raw.find("windows") {
            Some(i) if i >= 1 => &raw[..i - 1],
            _ => raw,
        };

        let mut parts = raw.split('.').map(leading_number);
        let major = parts
            .next()
            .flatten()
            .ok_or_else(|| AmitraceError::Parse(format!("git version without major number: {raw}")))?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Ok(Self::new(major, minor, patch))
    }

    /// Run `git version` and parse it.
    pub fn detect(config: &GitConfig) -> Result<Self, AmitraceError> {
        let out = GitCommand::new(config, &["version"]).run_std_string(RunOpts::default())?;
        Self::parse(&out)
    }

    pub fn at_least(&self, required: GitVersion) -> bool {
        *self >= required
    }

    /// Fail with [`AmitraceError::UnsupportedVersion`] when older than `required`.
    pub fn check_at_least(&self, required: GitVersion, feature: &str) -> Result<(), AmitraceError> {
        if self.at_least(required) {
            return Ok(());
        }
        Err(AmitraceError::UnsupportedVersion {
            feature: feature.to_string(),
            required: required.to_string(),
            actual: self.to_string(),
        })
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().ok()
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_linux_output() {
        assert_eq!(
            GitVersion::parse("git version 2.34.1").unwrap(),
            GitVersion::new(2, 34, 1)
        );
    }

    #[test]
    fn apple_suffix_is_a_separate_field() {
        assert_eq!(
            GitVersion::parse("git version 2.39.3 (Apple Git-146)").unwrap(),
            GitVersion::new(2, 39, 3)
        );
    }

    #[test]
    fn two_component_version() {
        assert_eq!(
            GitVersion::parse("git version 2.31").unwrap(),
            GitVersion::new(2, 31, 0)
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(GitVersion::parse("git").is_err());
        assert!(GitVersion::parse("git version x.y").is_err());
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(GitVersion::new(2, 100, 0) > GitVersion::new(2, 31, 0));
        assert!(!GitVersion::new(2, 30, 9).at_least(GitVersion::SKIP_TO));
    }

    #[test]
    fn check_reports_both_versions() {
        let err = GitVersion::new(2, 20, 1)
            .check_at_least(GitVersion::SKIP_TO, "--skip-to")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2.31.0"));
        assert!(msg.contains("2.20.1"));
    }
}
