//! Final status of each tracked image from its occurrence history.

use std::path::{Path, PathBuf};

use amitrace_core::{AmiNameAndData, AmiOccurrence, AmitraceError, ImageStatus};
use amitrace_git::worktree::first_file_containing;
use chrono::{DateTime, FixedOffset};

/// Looks for an image name in the current contents of files.
///
/// Consulted only when the recorded additions and removals do not balance,
/// which happens when a name is removed in one place of a file but still
/// present elsewhere in it.
pub trait WorkingTreeProbe {
    /// First of `files` that still contains `needle`.
    fn first_file_containing(&self, files: &[&str], needle: &str) -> Result<Option<String>, AmitraceError>;
}

/// Searches a checked-out working tree on disk.
#[derive(Debug, Clone)]
pub struct FsProbe {
    root: PathBuf,
}

impl FsProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WorkingTreeProbe for FsProbe {
    fn first_file_containing(&self, files: &[&str], needle: &str) -> Result<Option<String>, AmitraceError> {
        first_file_containing(&self.root, files.iter().copied(), needle)
    }
}

/// A probe that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl WorkingTreeProbe for NoProbe {
    fn first_file_containing(&self, _files: &[&str], _needle: &str) -> Result<Option<String>, AmitraceError> {
        Ok(None)
    }
}

/// Per-file view of an image's history.
#[derive(Debug, Clone)]
struct FileHistory<'a> {
    file: &'a str,
    latest: &'a AmiOccurrence,
    /// The commit of `latest` added the name to this file.
    still_present: bool,
}

fn file_histories(occurrences: &[AmiOccurrence]) -> Vec<FileHistory<'_>> {
    let mut files: Vec<&str> = Vec::new();
    for occ in occurrences {
        if !files.contains(&occ.file_path_and_name.as_str()) {
            files.push(&occ.file_path_and_name);
        }
    }

    files
        .into_iter()
        .filter_map(|file| {
            let in_file = move || occurrences.iter().filter(move |o| o.file_path_and_name == file);
            // Later entries win ties, matching scan order.
            let latest = in_file().fold(None::<&AmiOccurrence>, |best, occ| match best {
                Some(b) if b.commit_date > occ.commit_date => Some(b),
                _ => Some(occ),
            })?;
            let still_present = in_file()
                .filter(|o| o.commit_hash == latest.commit_hash)
                .any(AmiOccurrence::is_addition);
            Some(FileHistory {
                file,
                latest,
                still_present,
            })
        })
        .collect()
}

/// Classify one image, filling in `status` and the last-used fields.
///
/// * no occurrences: [`ImageStatus::NeverUsed`]
/// * the latest commit touching some file added the name there:
///   [`ImageStatus::InUse`]
/// * additions and removals do not balance and `probe` still finds the
///   name in one of the touched files: [`ImageStatus::InUse`]
/// * otherwise [`ImageStatus::NoLongerUsed`], with the newest removal as
///   the last use
///
/// # Examples
///
/// ```
/// use amitrace_core::{AmiNameAndData, AmiOccurrence, ImageStatus};
/// use amitrace_history::classify::{classify_image, NoProbe};
///
/// let created = "2024-01-01T00:00:00Z".parse().unwrap();
/// let mut image = AmiNameAndData::new("web-2024", "ami-1", created, created);
/// assert_eq!(classify_image(&mut image, &NoProbe).unwrap(), ImageStatus::NeverUsed);
///
/// image.add_item(AmiOccurrence {
///     file_path_and_name: "main.tf".into(),
///     line: "+ami = \"web-2024\"".into(),
///     line_index: 1,
///     section_index: 0,
///     commit_hash: "c1".into(),
///     commit_date: "2024-02-01T00:00:00Z".parse().unwrap(),
///     repo_name: "infra".into(),
/// });
/// assert_eq!(classify_image(&mut image, &NoProbe).unwrap(), ImageStatus::InUse);
/// ```
pub fn classify_image(image: &mut AmiNameAndData, probe: &dyn WorkingTreeProbe) -> Result<ImageStatus, AmitraceError> {
    image.last_used_date = None;
    image.last_used_file.clear();

    if image.occurrences.is_empty() {
        image.status = ImageStatus::NeverUsed;
        return Ok(image.status);
    }

    let histories = file_histories(&image.occurrences);
    if let Some(h) = histories.iter().find(|h| h.still_present) {
        tracing::debug!(image = %image.name, file = h.file, "still referenced");
        image.status = ImageStatus::InUse;
        return Ok(image.status);
    }

    let additions = image.occurrences.iter().filter(|o| o.is_addition()).count();
    let removals = image.occurrences.iter().filter(|o| o.is_removal()).count();
    if additions != removals {
        let files: Vec<&str> = histories.iter().map(|h| h.file).collect();
        if let Some(found) = probe.first_file_containing(&files, &image.name)? {
            tracing::debug!(image = %image.name, file = %found, additions, removals, "found by working tree search");
            image.status = ImageStatus::InUse;
            return Ok(image.status);
        }
    }

    let last: Option<(DateTime<FixedOffset>, String)> = histories
        .iter()
        .map(|h| (h.latest.commit_date, h.file.to_string()))
        .max_by_key(|(date, _)| *date);
    if let Some((date, file)) = last {
        image.last_used_date = Some(date);
        image.last_used_file = file;
    }
    image.status = ImageStatus::NoLongerUsed;
    Ok(image.status)
}

/// Image counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub in_use: usize,
    pub never_used: usize,
    pub no_longer_used: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn tally<'a>(images: impl IntoIterator<Item = &'a AmiNameAndData>) -> Self {
        let mut counts = Self::default();
        for image in images {
            match image.status {
                ImageStatus::InUse => counts.in_use += 1,
                ImageStatus::NeverUsed => counts.never_used += 1,
                ImageStatus::NoLongerUsed => counts.no_longer_used += 1,
                ImageStatus::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn get(&self, status: ImageStatus) -> usize {
        match status {
            ImageStatus::InUse => self.in_use,
            ImageStatus::NeverUsed => self.never_used,
            ImageStatus::NoLongerUsed => self.no_longer_used,
            ImageStatus::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.in_use + self.never_used + self.no_longer_used + self.unknown
    }
}

/// Classify every image.
///
/// # Errors
///
/// Only an I/O failure of the working tree probe stops classification.
pub fn classify_all(images: &mut [AmiNameAndData], probe: &dyn WorkingTreeProbe) -> Result<StatusCounts, AmitraceError> {
    for image in images.iter_mut() {
        classify_image(image, probe)?;
    }
    let counts = StatusCounts::tally(images.iter());
    tracing::info!(
        images = counts.total(),
        in_use = counts.in_use,
        no_longer_used = counts.no_longer_used,
        never_used = counts.never_used,
        "classified"
    );
    Ok(counts)
}
