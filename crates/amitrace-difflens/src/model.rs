use std::fmt;

use serde::Serialize;

/// What a [`DiffLine`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffLineKind {
    /// Context line, present on both sides.
    Plain,
    Add,
    Delete,
    /// Synthetic line carrying a hunk header.
    Section,
}

/// Ranges of a hunk header, plus where the previous hunk ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
    pub path: String,
    pub last_left_idx: usize,
    pub last_right_idx: usize,
    pub left_idx: usize,
    pub right_idx: usize,
    pub left_hunk_size: usize,
    pub right_hunk_size: usize,
}

/// One line of a hunk.
///
/// `content` keeps the leading `+`, `-` or space marker. Line numbers are
/// 1-based and zero when the line has no position on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub left_idx: usize,
    pub right_idx: usize,
    /// For a paired delete/add, the index of the other half within the section.
    pub match_idx: Option<usize>,
    pub kind: DiffLineKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_info: Option<SectionInfo>,
}

impl DiffLine {
    /// Content without the marker byte.
    pub fn text(&self) -> &str {
        match self.kind {
            DiffLineKind::Section => &self.content,
            _ => self.content.get(1..).unwrap_or(""),
        }
    }

    /// Whether this is an added or removed line.
    pub fn is_change(&self) -> bool {
        matches!(self.kind, DiffLineKind::Add | DiffLineKind::Delete)
    }
}

/// One hunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSection {
    pub file_name: String,
    pub lines: Vec<DiffLine>,
}

/// How a file changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiffFileKind {
    Add = 1,
    Change,
    Delete,
    Rename,
    Copy,
}

impl fmt::Display for DiffFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffFileKind::Add => "added",
            DiffFileKind::Change => "modified",
            DiffFileKind::Delete => "deleted",
            DiffFileKind::Rename => "renamed",
            DiffFileKind::Copy => "copied",
        };
        f.write_str(s)
    }
}

/// One file entry of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffFile {
    pub name: String,
    pub old_name: String,
    /// SHA-1 hex of `name`, usable as a stable anchor.
    pub name_hash: String,
    /// 1-based position in the diff.
    pub index: usize,
    pub addition: usize,
    pub deletion: usize,
    pub kind: DiffFileKind,
    pub is_created: bool,
    pub is_deleted: bool,
    pub is_bin: bool,
    pub is_lfs_file: bool,
    pub is_renamed: bool,
    /// Header names could not be split unambiguously and are still unresolved.
    pub is_ambiguous: bool,
    pub is_submodule: bool,
    pub is_vendored: bool,
    pub is_generated: bool,
    /// Some lines or hunks were dropped by a limit.
    pub is_incomplete: bool,
    pub is_incomplete_line_too_long: bool,
    pub is_protected: bool,
    pub language: Option<String>,
    pub sections: Vec<DiffSection>,
}

impl DiffFile {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            name: String::new(),
            old_name: String::new(),
            name_hash: String::new(),
            index,
            addition: 0,
            deletion: 0,
            kind: DiffFileKind::Change,
            is_created: false,
            is_deleted: false,
            is_bin: false,
            is_lfs_file: false,
            is_renamed: false,
            is_ambiguous: false,
            is_submodule: false,
            is_vendored: false,
            is_generated: false,
            is_incomplete: false,
            is_incomplete_line_too_long: false,
            is_protected: false,
            language: None,
            sections: Vec::new(),
        }
    }

    /// Whether the file's lines can be shown as text.
    pub fn is_text(&self) -> bool {
        !self.is_bin && !self.is_submodule
    }

    /// Numeric change kind, 1 (add) to 5 (copy).
    pub fn get_type(&self) -> u8 {
        self.kind as u8
    }

    /// All non-section lines, in order.
    pub fn changed_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.sections
            .iter()
            .flat_map(|s| s.lines.iter())
            .filter(|l| l.kind != DiffLineKind::Section)
    }
}

impl fmt::Display for DiffFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_renamed && self.old_name != self.name {
            write!(f, "{} -> {}", self.old_name, self.name)?;
        } else {
            f.write_str(&self.name)?;
        }
        write!(f, " ({}, +{} -{})", self.kind, self.addition, self.deletion)
    }
}

/// A parsed diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    /// File the output was resumed at, when skipping.
    pub start: Option<String>,
    /// First file that was cut off by the file limit.
    pub end: Option<String>,
    pub num_files: usize,
    pub total_addition: usize,
    pub total_deletion: usize,
    pub is_incomplete: bool,
    pub files: Vec<DiffFile>,
}

impl Diff {
    pub fn file(&self, name: &str) -> Option<&DiffFile> {
        self.files.iter().find(|f| f.name == name)
    }
}
