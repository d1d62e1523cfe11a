//! Diff of two revisions: `git diff` parsed, then annotated with
//! attributes, tail sections and (optionally) shortstat totals.

use std::collections::HashMap;
use std::sync::OnceLock;

use amitrace_core::{AmitraceConfig, AmitraceError, DiffConfig, Whitespace};
use amitrace_git::attributes::check_attributes;
use amitrace_git::{GitVersion, ObjectId, Repository};
use regex::Regex;

use crate::encoding::CharsetDetector;
use crate::model::{Diff, DiffFile, DiffFileKind, DiffLine, DiffLineKind, DiffSection, SectionInfo};
use crate::parser::{ParseLimits, PatchParser};
use crate::vendor::PathClassifier;

/// What to diff and how much of it to keep.
///
/// # Examples
///
/// ```
/// use amitrace_difflens::diff::DiffOptions;
///
/// let opts = DiffOptions::new("HEAD")
///     .with_before("HEAD~3")
///     .with_files(vec!["main.tf".into()])
///     .with_shortstat(true);
/// assert_eq!(opts.before.as_deref(), Some("HEAD~3"));
/// assert_eq!(opts.max_files, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Left side. Defaults to the first parent, or the empty tree for a
    /// root commit.
    pub before: Option<String>,
    pub after: String,
    /// Resume at this file name.
    pub skip_to: Option<String>,
    /// Restrict to these paths.
    pub files: Vec<String>,
    pub max_lines: usize,
    pub max_line_characters: usize,
    pub max_files: usize,
    pub whitespace: Whitespace,
    /// Replace parsed totals with `git diff --shortstat` over the whole range.
    pub shortstat: bool,
    /// Compare `before..after` directly instead of from their merge base.
    pub direct_comparison: bool,
}

impl DiffOptions {
    pub fn new(after: impl Into<String>) -> Self {
        Self::from_config(&DiffConfig::default(), after)
    }

    /// Limits and whitespace mode taken from `config`.
    pub fn from_config(config: &DiffConfig, after: impl Into<String>) -> Self {
        Self {
            before: None,
            after: after.into(),
            skip_to: None,
            files: Vec::new(),
            max_lines: config.max_lines,
            max_line_characters: config.max_line_characters,
            max_files: config.max_files,
            whitespace: config.whitespace,
            shortstat: false,
            direct_comparison: false,
        }
    }

    pub fn with_before(mut self, before: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self
    }

    pub fn with_skip_to(mut self, name: impl Into<String>) -> Self {
        self.skip_to = Some(name.into());
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_shortstat(mut self, enabled: bool) -> Self {
        self.shortstat = enabled;
        self
    }

    pub fn with_direct_comparison(mut self, enabled: bool) -> Self {
        self.direct_comparison = enabled;
        self
    }

    pub fn limits(&self) -> ParseLimits {
        ParseLimits::from_counts(self.max_lines, self.max_line_characters, self.max_files)
    }
}

/// Computes diffs for one repository.
#[derive(Debug)]
pub struct DiffEngine<'r> {
    repo: &'r Repository,
    classifier: PathClassifier,
    charsets: CharsetDetector,
}

/// Totals reported by `git diff --shortstat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortStat {
    pub files: usize,
    pub additions: usize,
    pub deletions: usize,
}

impl<'r> DiffEngine<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self {
            repo,
            classifier: PathClassifier::default(),
            charsets: CharsetDetector::default(),
        }
    }

    /// Glob patterns and charset hints from `config`.
    pub fn from_config(repo: &'r Repository, config: &AmitraceConfig) -> Self {
        Self {
            repo,
            classifier: PathClassifier::from_config(&config.diff),
            charsets: CharsetDetector::from_config(&config.encoding),
        }
    }

    pub fn repository(&self) -> &'r Repository {
        self.repo
    }

    /// Diff `opts.before` against `opts.after`.
    ///
    /// Output of `git diff` is parsed as it streams. A file list that cannot
    /// be checked against `.gitattributes` falls back to path rules alone.
    ///
    /// # Errors
    ///
    /// [`AmitraceError::NotExist`] when `after` does not resolve to a commit,
    /// [`AmitraceError::ExecTimeout`] when `git diff` overruns its budget,
    /// and [`AmitraceError::Parse`] for output the parser rejects.
    pub fn get_diff(&self, opts: &DiffOptions) -> Result<Diff, AmitraceError> {
        let commit = self.repo.get_commit(&opts.after)?;
        let after = commit.id.to_hex();
        let before = match opts.before.as_deref().filter(|b| !b.is_empty()) {
            Some(b) if b != ObjectId::NULL.to_hex() => b.to_string(),
            _ => commit
                .first_parent()
                .unwrap_or(ObjectId::EMPTY_TREE)
                .to_hex(),
        };

        let mut cmd = self
            .repo
            .command(&["diff", "--src-prefix=\\a/", "--dst-prefix=\\b/", "-M"]);
        if let Some(flag) = opts.whitespace.git_flag() {
            cmd.add_arguments(&[flag]);
        }
        cmd.add_dynamic_arguments(&[before.as_str(), after.as_str()]);

        let skip_to = opts.skip_to.as_deref().filter(|s| !s.is_empty());
        let mut parser_skip = None;
        if let Some(name) = skip_to {
            let native = self
                .repo
                .version()
                .map(|v| v.at_least(GitVersion::SKIP_TO))
                .unwrap_or(false);
            if native {
                cmd.add_option_value("--skip-to", name);
            } else {
                parser_skip = Some(name);
            }
        }
        if !opts.files.is_empty() {
            cmd.add_dashes_and_list(&opts.files);
        }

        let parser = PatchParser::new(opts.limits()).with_charsets(self.charsets.clone());
        let run = self
            .repo
            .run_opts()
            .with_timeout(self.repo.config().diff_timeout());
        let mut diff = cmd.run_with_stdout(run, |out| parser.parse(out, parser_skip))?;
        diff.start = skip_to.map(str::to_string);

        let names: Vec<String> = diff.files.iter().map(|f| f.name.clone()).collect();
        let attrs = check_attributes(self.repo, &after, &names).unwrap_or_else(|err| {
            tracing::warn!(revision = %after, error = %err, "attribute check failed, using path rules");
            HashMap::new()
        });

        for file in &mut diff.files {
            let attr = attrs.get(&file.name);
            file.is_vendored = attr
                .and_then(|a| a.vendored)
                .unwrap_or_else(|| self.classifier.is_vendored(&file.name));
            file.is_generated = attr
                .and_then(|a| a.generated)
                .unwrap_or_else(|| self.classifier.is_generated(&file.name));
            file.language = attr.and_then(|a| a.language.clone());

            if let Some(tail) = self.tail_section(&before, &after, file) {
                file.sections.push(tail);
            }
        }

        if opts.shortstat {
            let stat = self.shortstat(&before, &after, &opts.files, opts.direct_comparison)?;
            diff.num_files = stat.files;
            diff.total_addition = stat.additions;
            diff.total_deletion = stat.deletions;
        }

        tracing::debug!(
            before = %before,
            after = %after,
            files = diff.files.len(),
            incomplete = diff.is_incomplete,
            "computed diff"
        );
        Ok(diff)
    }

    /// Section covering the unchanged lines after the last hunk, so a
    /// viewer can offer to expand them.
    fn tail_section(&self, before: &str, after: &str, file: &DiffFile) -> Option<DiffSection> {
        if file.kind != DiffFileKind::Change || file.is_bin || file.is_lfs_file {
            return None;
        }
        let last = file.sections.last()?.lines.last()?;
        let count = |rev: &str, path: &str| match self.repo.blob_line_count(rev, path) {
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(rev, path, error = %err, "could not count blob lines");
                0
            }
        };
        let left_count = count(before, &file.old_name);
        let right_count = count(after, &file.name);
        if left_count <= last.left_idx || right_count <= last.right_idx {
            return None;
        }

        let info = SectionInfo {
            path: file.name.clone(),
            last_left_idx: last.left_idx,
            last_right_idx: last.right_idx,
            left_idx: left_count,
            right_idx: right_count,
            left_hunk_size: 0,
            right_hunk_size: 0,
        };
        Some(DiffSection {
            file_name: file.name.clone(),
            lines: vec![DiffLine {
                left_idx: 0,
                right_idx: 0,
                match_idx: None,
                kind: DiffLineKind::Section,
                content: " ".into(),
                section_info: Some(info),
            }],
        })
    }

    /// Totals for `before...after` (or `before..after` when `direct`).
    ///
    /// Unrelated histories have no merge base; those are compared directly.
    pub fn shortstat(
        &self,
        before: &str,
        after: &str,
        files: &[String],
        direct: bool,
    ) -> Result<ShortStat, AmitraceError> {
        let empty_tree = ObjectId::EMPTY_TREE.to_hex();
        let range = if before == empty_tree {
            vec![empty_tree, after.to_string()]
        } else {
            let dots = if direct { ".." } else { "..." };
            vec![format!("{before}{dots}{after}")]
        };

        match self.run_shortstat(&range, files) {
            Err(AmitraceError::Git(msg)) if msg.contains("no merge base") => {
                self.run_shortstat(&[before.to_string(), after.to_string()], files)
            }
            other => other,
        }
    }

    fn run_shortstat(&self, revs: &[String], files: &[String]) -> Result<ShortStat, AmitraceError> {
        let mut cmd = self.repo.command(&["diff", "--shortstat"]);
        cmd.add_dynamic_arguments(revs);
        if !files.is_empty() {
            cmd.add_dashes_and_list(files);
        }
        let out = cmd.run_std_string(self.repo.run_opts())?;
        parse_shortstat(&out)
    }
}

/// Parse the one-line summary of `git diff --shortstat`.
///
/// # Examples
///
/// ```
/// use amitrace_difflens::diff::{parse_shortstat, ShortStat};
///
/// let stat = parse_shortstat(" 3 files changed, 10 insertions(+), 2 deletions(-)\n").unwrap();
/// assert_eq!(stat, ShortStat { files: 3, additions: 10, deletions: 2 });
/// assert_eq!(parse_shortstat("").unwrap(), ShortStat::default());
/// ```
pub fn parse_shortstat(output: &str) -> Result<ShortStat, AmitraceError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

    let output = output.trim();
    if output.is_empty() {
        return Ok(ShortStat::default());
    }
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r"\s*(\d+) files? changed(?:, (\d+) insertions?\(\+\))?(?:, (\d+) deletions?\(-\))?")
        })
        .as_ref()
        .map_err(|err| AmitraceError::Parse(err.to_string()))?;
    let caps = pattern
        .captures(output)
        .ok_or_else(|| AmitraceError::Parse(format!("unexpected shortstat output: {output}")))?;
    let number = |i: usize| -> Result<usize, AmitraceError> {
        match caps.get(i) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|e| AmitraceError::Parse(format!("bad shortstat count {}: {e}", m.as_str()))),
            None => Ok(0),
        }
    };
    Ok(ShortStat {
        files: number(1)?,
        additions: number(2)?,
        deletions: number(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortstat_variants() {
        let only_ins = parse_shortstat(" 1 file changed, 1 insertion(+)").unwrap();
        assert_eq!(only_ins, ShortStat { files: 1, additions: 1, deletions: 0 });
        let only_del = parse_shortstat(" 2 files changed, 5 deletions(-)").unwrap();
        assert_eq!(only_del, ShortStat { files: 2, additions: 0, deletions: 5 });
        assert!(parse_shortstat("garbage").is_err());
    }

    #[test]
    fn options_zero_limits_are_unlimited() {
        let mut opts = DiffOptions::new("HEAD");
        opts.max_lines = 0;
        opts.max_files = 0;
        let limits = opts.limits();
        assert_eq!(limits.max_lines, None);
        assert_eq!(limits.max_files, None);
        assert_eq!(limits.max_line_characters, 5000);
    }
}
