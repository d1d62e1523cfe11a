//! Cross-commit occurrence scan.
//!
//! Commits are visited oldest-first and each is diffed against its first
//! parent. Every added or removed line mentioning a tracked image name is
//! recorded against that image.

use amitrace_core::{AmiNameAndData, AmiOccurrence, AmitraceConfig, AmitraceError, OccurrenceLog};
use amitrace_difflens::{Diff, DiffEngine, DiffLineKind, DiffOptions};
use amitrace_git::log::list_commits;
use amitrace_git::{CommitInfo, Repository};
use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::images::oldest_creation;

/// Counters reported after a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Commits returned by the log, the oldest included.
    pub commits: usize,
    /// Commits whose diff was examined.
    pub scanned: usize,
    /// Commits whose diff could not be computed.
    pub skipped: usize,
    pub occurrences: usize,
}

/// Accumulates occurrences for a fixed set of images.
pub struct Scanner<'r> {
    engine: DiffEngine<'r>,
    config: AmitraceConfig,
    repo_name: String,
    images: Vec<AmiNameAndData>,
    until: Option<DateTime<FixedOffset>>,
    summary: ScanSummary,
}

impl<'r> Scanner<'r> {
    /// The repository name defaults to the name of its directory.
    pub fn new(repo: &'r Repository, config: &AmitraceConfig, images: Vec<AmiNameAndData>) -> Self {
        let repo_name = if config.scan.repo_name.is_empty() {
            // `.` and `..` have no file name of their own.
            let path = repo.path().canonicalize().unwrap_or_else(|_| repo.path().to_path_buf());
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            config.scan.repo_name.clone()
        };
        Self {
            engine: DiffEngine::from_config(repo, config),
            config: config.clone(),
            repo_name,
            images,
            until: None,
            summary: ScanSummary::default(),
        }
    }

    /// Stop at this date instead of now.
    pub fn with_until(mut self, until: DateTime<FixedOffset>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn images(&self) -> &[AmiNameAndData] {
        &self.images
    }

    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    /// `since` is the oldest creation date minus the configured margin.
    pub fn commit_range(&self) -> (Option<DateTime<FixedOffset>>, DateTime<FixedOffset>) {
        let margin = Duration::days(self.config.scan.since_margin_days);
        let since = oldest_creation(&self.images).map(|d| d - margin);
        let until = self.until.unwrap_or_else(|| Utc::now().fixed_offset());
        (since, until)
    }

    /// Commits in range, oldest first.
    pub fn commits(&self) -> Result<Vec<CommitInfo>, AmitraceError> {
        let (since, until) = self.commit_range();
        list_commits(self.engine.repository(), since, Some(until))
    }

    /// Scan every commit in range.
    ///
    /// `progress` is called before each commit with its position and the
    /// total. A commit whose diff fails is logged and counted as skipped.
    ///
    /// # Errors
    ///
    /// Only a failure to list the commits is returned.
    pub fn scan<F>(&mut self, mut progress: F) -> Result<ScanSummary, AmitraceError>
    where
        F: FnMut(usize, usize, &CommitInfo),
    {
        if self.images.is_empty() {
            tracing::info!("no images to track, nothing to scan");
            return Ok(self.summary);
        }
        let commits = self.commits()?;
        self.summary.commits = commits.len();
        tracing::info!(repo = %self.repo_name, commits = commits.len(), images = self.images.len(), "scanning history");

        // The oldest commit in range is only a baseline.
        let total = commits.len().saturating_sub(1);
        for (i, commit) in commits.iter().skip(1).enumerate() {
            progress(i + 1, total, commit);
            let opts = DiffOptions::from_config(&self.config.diff, commit.id.to_hex());
            match self.engine.get_diff(&opts) {
                Ok(diff) => {
                    self.record_diff(commit, &diff);
                    self.summary.scanned += 1;
                }
                Err(err) => {
                    tracing::warn!(commit = %commit.id, error = %err, "skipping commit whose diff failed");
                    self.summary.skipped += 1;
                }
            }
        }

        tracing::info!(
            scanned = self.summary.scanned,
            skipped = self.summary.skipped,
            occurrences = self.summary.occurrences,
            "scan finished"
        );
        Ok(self.summary)
    }

    /// Record the occurrences in one commit's diff.
    ///
    /// Only images whose converted date precedes the commit are matched.
    pub fn record_diff(&mut self, commit: &CommitInfo, diff: &Diff) {
        let hash = commit.id.to_hex();
        for file in &diff.files {
            for image in &mut self.images {
                if commit.date <= image.converted_date {
                    continue;
                }
                for (section_index, section) in file.sections.iter().enumerate() {
                    for line in &section.lines {
                        let line_index = match line.kind {
                            DiffLineKind::Add => line.right_idx,
                            DiffLineKind::Delete => line.left_idx,
                            _ => continue,
                        };
                        if !line.content.contains(&image.name) {
                            continue;
                        }
                        tracing::debug!(image = %image.name, file = %file.name, line = %line.content, "occurrence");
                        image.add_item(AmiOccurrence {
                            file_path_and_name: file.name.clone(),
                            line: line.content.clone(),
                            line_index,
                            section_index,
                            commit_hash: hash.clone(),
                            commit_date: commit.date,
                            repo_name: self.repo_name.clone(),
                        });
                        self.summary.occurrences += 1;
                    }
                }
            }
        }
    }

    /// The versioned log for everything recorded so far.
    pub fn into_log(self) -> OccurrenceLog {
        OccurrenceLog::new(Some(self.repo_name), self.images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amitrace_core::GitConfig;
    use amitrace_difflens::PatchParser;
    use amitrace_git::ObjectId;

    fn date(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn commit(date_str: &str) -> CommitInfo {
        CommitInfo {
            id: ObjectId::from_hex("1111111111111111111111111111111111111111").unwrap(),
            date: date(date_str),
        }
    }

    const DIFF: &str = "\
diff --git a/prod.tfvars b/prod.tfvars
--- a/prod.tfvars
+++ b/prod.tfvars
@@ -3,3 +3,3 @@
 region = \"eu-west-2\"
-ami = \"web-2023\"
+ami = \"web-2024\"
 size = 2
";

    fn scanner_for(repo: &Repository, images: Vec<AmiNameAndData>) -> Scanner<'_> {
        let mut config = AmitraceConfig::default();
        config.scan.repo_name = "infra".into();
        Scanner::new(repo, &config, images)
    }

    #[test]
    fn records_additions_and_removals_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        let repo = Repository::open(dir.path(), GitConfig::default()).unwrap();
        let images = vec![
            AmiNameAndData::new("web-2023", "ami-1", date("2023-01-02T00:00:00Z"), date("2023-01-01T00:00:00Z")),
            AmiNameAndData::new("web-2024", "ami-2", date("2024-01-02T00:00:00Z"), date("2024-01-01T00:00:00Z")),
            AmiNameAndData::new("web-2025", "ami-3", date("2025-01-02T00:00:00Z"), date("2025-01-01T00:00:00Z")),
        ];
        let mut scanner = scanner_for(&repo, images);
        let diff = PatchParser::default().parse_str(DIFF, None).unwrap();
        scanner.record_diff(&commit("2024-06-01T00:00:00Z"), &diff);

        let images = scanner.images();
        assert_eq!(images[0].occurrences.len(), 1);
        let removal = &images[0].occurrences[0];
        assert!(removal.is_removal());
        assert_eq!(removal.line_index, 4);
        assert_eq!(removal.repo_name, "infra");
        assert_eq!(removal.section_index, 0);

        let addition = &images[1].occurrences[0];
        assert!(addition.is_addition());
        assert_eq!(addition.line_index, 4);

        // Created after the commit.
        assert!(images[2].occurrences.is_empty());
        assert_eq!(scanner.summary().occurrences, 2);
    }

    #[test]
    fn since_subtracts_margin_from_oldest_image() {
        let dir = tempfile::tempdir().unwrap();
        std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        let repo = Repository::open(dir.path(), GitConfig::default()).unwrap();
        let images = vec![
            AmiNameAndData::new("b", "ami-2", date("2024-03-01T00:00:00Z"), date("2024-02-29T00:00:00Z")),
            AmiNameAndData::new("a", "ami-1", date("2024-02-01T00:00:00Z"), date("2024-01-31T00:00:00Z")),
        ];
        let until = date("2024-12-01T00:00:00Z");
        let scanner = scanner_for(&repo, images).with_until(until);
        let (since, end) = scanner.commit_range();
        assert_eq!(since, Some(date("2024-01-02T00:00:00Z")));
        assert_eq!(end, until);
    }
}
