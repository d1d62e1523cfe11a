//! Streaming parser for `git diff` output.
//!
//! Input is read line by line from any [`BufRead`], so a diff piped from a
//! subprocess is never held in memory whole. Limits truncate rather than
//! fail: whatever is dropped leaves an `is_incomplete` flag behind.

use std::collections::HashMap;
use std::io::{self, BufRead};

use amitrace_core::{AmitraceError, DiffConfig};
use amitrace_git::quote::{quoted_len, unquote};
use encoding_rs::Encoding;
use sha1::{Digest, Sha1};

use crate::encoding::{decode, CharsetDetector};
use crate::model::{Diff, DiffFile, DiffFileKind, DiffLine, DiffLineKind, DiffSection, SectionInfo};

/// Prefix of every file header.
pub const DIFF_HEAD: &str = "diff --git ";

/// First line of a Git LFS pointer file.
pub const LFS_META_IDENTIFIER: &str = "version https://git-lfs.github.com/spec/v1";

/// Prefix of the pointer's object id line.
pub const LFS_OID_PREFIX: &str = "oid sha256:";

const NO_NEWLINE_MARKER: &[u8] = b"\\ No newline at end of file";

/// Truncation limits. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Lines per file; the line that reaches the limit and all after it are dropped.
    pub max_lines: Option<usize>,
    /// Bytes per line, marker included.
    pub max_line_characters: usize,
    pub max_files: Option<usize>,
}

impl ParseLimits {
    pub fn unlimited() -> Self {
        Self {
            max_lines: None,
            max_line_characters: usize::MAX,
            max_files: None,
        }
    }
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&DiffConfig::default())
    }
}

impl ParseLimits {
    /// Limits from configured counts, where zero means "no limit".
    pub fn from_counts(max_lines: usize, max_line_characters: usize, max_files: usize) -> Self {
        let nonzero = |n: usize| (n > 0).then_some(n);
        Self {
            max_lines: nonzero(max_lines),
            max_line_characters: nonzero(max_line_characters).unwrap_or(usize::MAX),
            max_files: nonzero(max_files),
        }
    }
}

impl From<&DiffConfig> for ParseLimits {
    fn from(config: &DiffConfig) -> Self {
        Self::from_counts(config.max_lines, config.max_line_characters, config.max_files)
    }
}

/// Parses unified diffs produced with `--src-prefix=\a/ --dst-prefix=\b/`
/// (or the plain `a/`, `b/` prefixes).
///
/// # Examples
///
/// ```
/// use amitrace_difflens::parser::{PatchParser, ParseLimits};
///
/// let text = "diff --git a/x.txt b/x.txt\n--- a/x.txt\n+++ b/x.txt\n@@ -1,1 +1,2 @@\n-old\n+new\n+added\n";
/// let diff = PatchParser::new(ParseLimits::unlimited()).parse_str(text, None).unwrap();
/// assert_eq!(diff.files[0].name, "x.txt");
/// assert_eq!(diff.total_addition, 2);
/// assert_eq!(diff.total_deletion, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatchParser {
    limits: ParseLimits,
    charsets: CharsetDetector,
}

impl PatchParser {
    pub fn new(limits: ParseLimits) -> Self {
        Self {
            limits,
            charsets: CharsetDetector::default(),
        }
    }

    pub fn with_charsets(mut self, charsets: CharsetDetector) -> Self {
        self.charsets = charsets;
        self
    }

    pub fn limits(&self) -> &ParseLimits {
        &self.limits
    }

    /// Parse diff text held in memory.
    pub fn parse_str(&self, text: &str, skip_to: Option<&str>) -> Result<Diff, AmitraceError> {
        self.parse(text.as_bytes(), skip_to)
    }

    /// Parse a diff stream.
    ///
    /// With `skip_to`, files before the one named are skipped without being
    /// parsed. Once `max_files` entries are collected the name of the next
    /// file is recorded in [`Diff::end`] and the rest of the input is drained.
    ///
    /// # Errors
    ///
    /// [`AmitraceError::Parse`] when the input does not start with a file
    /// header, or a hunk contains a line with an unknown marker.
    pub fn parse<R: BufRead>(&self, mut input: R, skip_to: Option<&str>) -> Result<Diff, AmitraceError> {
        let mut diff = Diff::default();
        let skip_to = skip_to.filter(|s| !s.is_empty());
        let mut skipping = skip_to.is_some();

        let Some(mut line) = read_line(&mut input)? else {
            return Ok(diff);
        };

        'files: loop {
            let header = header_text(&line);
            if !header.starts_with(DIFF_HEAD) {
                return Err(AmitraceError::Parse(format!("invalid first file line: {header}")));
            }

            if self.limits.max_files.is_some_and(|max| diff.files.len() >= max) {
                let last = create_diff_file(diff.files.len() + 1, &header);
                diff.end = Some(last.name);
                diff.is_incomplete = true;
                io::copy(&mut input, &mut io::sink())?;
                break;
            }

            let file = create_diff_file(diff.files.len() + 1, &header);
            if skipping {
                if Some(file.name.as_str()) != skip_to {
                    match skip_to_next_diff_head(&mut input)? {
                        Some(next) => {
                            line = next;
                            continue;
                        }
                        None => break,
                    }
                }
                skipping = false;
            }

            let mut builder = FileBuilder::new(file);
            loop {
                let Some(next) = read_line(&mut input)? else {
                    diff.files.push(builder.finish(&self.charsets));
                    break 'files;
                };
                let text = String::from_utf8_lossy(&next);
                if text.starts_with(DIFF_HEAD) {
                    diff.files.push(builder.finish(&self.charsets));
                    line = next;
                    continue 'files;
                }
                if !text.starts_with("+++ ") {
                    apply_extended_header(&mut builder.file, &text);
                    continue;
                }

                resolve_new_name(&mut builder.file, &text);
                let after = self.parse_hunks(&mut builder, &mut input);
                diff.total_addition += builder.file.addition;
                diff.total_deletion += builder.file.deletion;
                let after = after?;
                diff.files.push(builder.finish(&self.charsets));
                match after {
                    Some(next) => {
                        line = next;
                        continue 'files;
                    }
                    None => break 'files,
                }
            }
        }

        diff.num_files = diff.files.len();
        Ok(diff)
    }

    /// Consume hunks until the next file header (returned) or end of input.
    fn parse_hunks<R: BufRead>(
        &self,
        builder: &mut FileBuilder,
        input: &mut R,
    ) -> Result<Option<Vec<u8>>, AmitraceError> {
        let max_lines = self.limits.max_lines;
        let at_limit = |count: usize| max_lines.is_some_and(|max| count >= max);

        let mut section: Option<usize> = None;
        let mut line_count = 0usize;
        let mut lfs_prefix = false;
        let mut last_left_idx: Option<usize> = None;
        let mut left_line = 1usize;
        let mut right_line = 1usize;

        loop {
            let Some(mut raw) = read_line(input)? else {
                return Ok(None);
            };
            trim_eol(&mut raw);
            let Some(&marker) = raw.first() else {
                return Err(AmitraceError::Parse("unexpected empty line in hunk".into()));
            };

            let file = &mut builder.file;
            let mut line = match marker {
                b'd' => return Ok(Some(raw)),
                b'@' => {
                    if at_limit(line_count) {
                        file.is_incomplete = true;
                        continue;
                    }
                    let header = String::from_utf8_lossy(&raw).into_owned();
                    let info = section_info(
                        &file.name,
                        &header,
                        left_line.saturating_sub(1),
                        right_line.saturating_sub(1),
                    )?;
                    left_line = info.left_idx;
                    right_line = info.right_idx;
                    last_left_idx = None;
                    builder.open_section();
                    section = Some(builder.file.sections.len() - 1);
                    builder.push_line(
                        DiffLine {
                            left_idx: 0,
                            right_idx: 0,
                            match_idx: None,
                            kind: DiffLineKind::Section,
                            content: header,
                            section_info: Some(info),
                        },
                        Vec::new(),
                    );
                    continue;
                }
                b'\\' => {
                    if at_limit(line_count) {
                        file.is_incomplete = true;
                        continue;
                    }
                    if raw != NO_NEWLINE_MARKER {
                        return Err(unexpected_line(&raw));
                    }
                    continue;
                }
                b'+' => {
                    line_count += 1;
                    file.addition += 1;
                    if at_limit(line_count) {
                        file.is_incomplete = true;
                        continue;
                    }
                    let line = DiffLine {
                        left_idx: 0,
                        right_idx: right_line,
                        match_idx: None,
                        kind: DiffLineKind::Add,
                        content: String::new(),
                        section_info: None,
                    };
                    right_line += 1;
                    line
                }
                b'-' => {
                    line_count += 1;
                    file.deletion += 1;
                    if at_limit(line_count) {
                        file.is_incomplete = true;
                        continue;
                    }
                    let line = DiffLine {
                        left_idx: left_line,
                        right_idx: 0,
                        match_idx: None,
                        kind: DiffLineKind::Delete,
                        content: String::new(),
                        section_info: None,
                    };
                    if left_line > 0 {
                        left_line += 1;
                    }
                    line
                }
                b' ' => {
                    line_count += 1;
                    if at_limit(line_count) {
                        file.is_incomplete = true;
                        continue;
                    }
                    let line = DiffLine {
                        left_idx: left_line,
                        right_idx: right_line,
                        match_idx: None,
                        kind: DiffLineKind::Plain,
                        content: String::new(),
                        section_info: None,
                    };
                    left_line += 1;
                    right_line += 1;
                    last_left_idx = None;
                    line
                }
                _ => return Err(unexpected_line(&raw)),
            };

            let idx = match section {
                Some(idx) => idx,
                None => {
                    builder.open_section();
                    last_left_idx = None;
                    let idx = builder.file.sections.len() - 1;
                    section = Some(idx);
                    idx
                }
            };
            let lines = &mut builder.file.sections[idx].lines;
            match line.kind {
                DiffLineKind::Add => {
                    if let Some(del) = last_left_idx {
                        let own = lines.len();
                        line.match_idx = Some(del);
                        lines[del].match_idx = Some(own);
                        let next = del + 1;
                        last_left_idx = (next < lines.len()
                            && lines[next].kind == DiffLineKind::Delete)
                            .then_some(next);
                    }
                }
                DiffLineKind::Delete => {
                    if lines.last().map_or(true, |l| l.kind != DiffLineKind::Delete) {
                        last_left_idx = Some(lines.len());
                    }
                }
                _ => {}
            }

            if raw.len() > self.limits.max_line_characters {
                builder.file.is_incomplete = true;
                builder.file.is_incomplete_line_too_long = true;
                raw.truncate(self.limits.max_line_characters);
            }

            let body = raw.get(1..).unwrap_or_default();
            if body == LFS_META_IDENTIFIER.as_bytes() {
                lfs_prefix = true;
            } else if lfs_prefix {
                if let Some(oid) = body.strip_prefix(LFS_OID_PREFIX.as_bytes()) {
                    if oid.len() == 64 && oid.iter().all(u8::is_ascii_hexdigit) {
                        builder.file.is_lfs_file = true;
                    }
                }
            }

            builder.push_line(line, raw);
        }
    }
}

/// Parse with default limits and charset handling.
pub fn parse_patch<R: BufRead>(input: R, skip_to: Option<&str>) -> Result<Diff, AmitraceError> {
    PatchParser::default().parse(input, skip_to)
}

/// A file under construction, with each line's raw bytes kept until the
/// charset of the file is known.
struct FileBuilder {
    file: DiffFile,
    raw: Vec<Vec<Vec<u8>>>,
}

impl FileBuilder {
    fn new(file: DiffFile) -> Self {
        Self {
            file,
            raw: Vec::new(),
        }
    }

    fn open_section(&mut self) {
        self.file.sections.push(DiffSection {
            file_name: self.file.name.clone(),
            lines: Vec::new(),
        });
        self.raw.push(Vec::new());
    }

    fn push_line(&mut self, line: DiffLine, raw: Vec<u8>) {
        if let (Some(section), Some(raw_section)) = (self.file.sections.last_mut(), self.raw.last_mut()) {
            section.lines.push(line);
            raw_section.push(raw);
        }
    }

    /// Transcode each line kind's content and compute the name hash.
    ///
    /// Added, deleted and context lines are probed separately: a commit
    /// may convert a file from one charset to another.
    fn finish(mut self, charsets: &CharsetDetector) -> DiffFile {
        self.file.name_hash = sha1_hex(&self.file.name);

        let mut buffers: HashMap<DiffLineKind, Vec<u8>> = HashMap::new();
        for (section, raws) in self.file.sections.iter().zip(&self.raw) {
            for (line, raw) in section.lines.iter().zip(raws) {
                if line.kind == DiffLineKind::Section {
                    continue;
                }
                let buf = buffers.entry(line.kind).or_default();
                buf.extend_from_slice(raw.get(1..).unwrap_or_default());
                buf.push(b'\n');
            }
        }
        let encodings: HashMap<DiffLineKind, &'static Encoding> = buffers
            .iter()
            .map(|(kind, buf)| (*kind, charsets.detect(buf)))
            .collect();

        for (section, raws) in self.file.sections.iter_mut().zip(self.raw) {
            for (line, raw) in section.lines.iter_mut().zip(raws) {
                if line.kind == DiffLineKind::Section {
                    continue;
                }
                let Some((marker, body)) = raw.split_first() else {
                    continue;
                };
                let enc = encodings.get(&line.kind).copied().unwrap_or(encoding_rs::UTF_8);
                let mut content = String::with_capacity(raw.len());
                content.push(char::from(*marker));
                content.push_str(&decode(enc, body));
                line.content = content;
            }
        }
        self.file
    }
}

fn sha1_hex(s: &str) -> String {
    let digest = Sha1::digest(s.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn unexpected_line(raw: &[u8]) -> AmitraceError {
    AmitraceError::Parse(format!(
        "unexpected line in hunk: {}",
        String::from_utf8_lossy(raw)
    ))
}

fn read_line<R: BufRead>(input: &mut R) -> Result<Option<Vec<u8>>, AmitraceError> {
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(buf))
}

fn trim_eol(raw: &mut Vec<u8>) {
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
}

fn header_text(raw: &[u8]) -> String {
    let mut raw = raw.to_vec();
    trim_eol(&mut raw);
    String::from_utf8_lossy(&raw).into_owned()
}

fn skip_to_next_diff_head<R: BufRead>(input: &mut R) -> Result<Option<Vec<u8>>, AmitraceError> {
    while let Some(line) = read_line(input)? {
        if line.starts_with(DIFF_HEAD.as_bytes()) {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

/// Read one path token off the front of `rest`, dropping its two-character
/// `a/` or `b/` prefix.
///
/// Quoted names are exact. Unquoted names extend over following words until
/// one starts with `"` or `b`, which can split a name containing spaces in
/// the wrong place; the second value reports that ambiguity.
fn read_file_name(rest: &mut &str) -> (String, bool) {
    let mut ambiguous = false;
    let input: &str = *rest;
    let name = if input.starts_with('"') {
        let Some(len) = quoted_len(input) else {
            *rest = "";
            return (String::new(), true);
        };
        let token = &input[..len];
        *rest = input[len..].trim_start();
        let mut name = match unquote(token) {
            Ok(name) => name,
            Err(_) => return (String::new(), true),
        };
        if name.is_empty() {
            return (String::new(), true);
        }
        if name.starts_with('\\') {
            name.remove(0);
        }
        name
    } else {
        ambiguous = true;
        let mut name = next_word(rest).to_string();
        while let Some(c) = rest.chars().next() {
            if c == '"' || c == 'b' {
                break;
            }
            let suffix = next_word(rest);
            name.push(' ');
            name.push_str(suffix);
        }
        name
    };
    match name.get(2..) {
        Some(stripped) if name.len() >= 2 => (stripped.to_string(), ambiguous),
        _ => (String::new(), true),
    }
}

fn next_word<'a>(rest: &mut &'a str) -> &'a str {
    let s: &'a str = *rest;
    let s = s.trim_start();
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (word, tail) = s.split_at(end);
    *rest = tail.trim_start();
    word
}

/// Start a file entry from its `diff --git` header (without line ending).
fn create_diff_file(index: usize, header: &str) -> DiffFile {
    let mut file = DiffFile::new(index);
    let body = &header[DIFF_HEAD.len()..];
    let padded = format!("{body} ");
    let mut rest = padded.as_str();

    let (old_name, old_ambiguous) = read_file_name(&mut rest);
    let (name, new_ambiguous) = read_file_name(&mut rest);
    file.old_name = old_name;
    file.name = name;

    if old_ambiguous && new_ambiguous {
        file.is_ambiguous = true;
        // `a/<name> b/<name>` splits evenly when both sides are the same
        // name; what cannot be split here is resolved from `---`/`+++`.
        if !body.is_empty() && (body.len() - 1) % 2 == 0 {
            let mid = (body.len() - 1) / 2;
            if let (Some(left), Some(right)) = (body.get(..mid), body.get(mid + 1..)) {
                match (left.get(2..), right.get(2..)) {
                    (Some(l), Some(r)) if left.len() > 2 && right.len() > 2 && l == r => {
                        file.old_name = r.to_string();
                        file.name = r.to_string();
                    }
                    _ => {}
                }
            }
        }
    }

    file.is_renamed = file.name != file.old_name;
    file
}

fn apply_extended_header(file: &mut DiffFile, line: &str) {
    let body = line.trim_end_matches(['\r', '\n']);
    let submodule = body.ends_with(" 160000");

    if body.starts_with("old mode ") || body.starts_with("new mode ") {
        if submodule {
            file.is_submodule = true;
        }
    } else if let Some(from) = body.strip_prefix("rename from ") {
        file.is_renamed = true;
        file.kind = DiffFileKind::Rename;
        if file.is_ambiguous {
            file.old_name = from.to_string();
        }
    } else if let Some(to) = body.strip_prefix("rename to ") {
        file.is_renamed = true;
        file.kind = DiffFileKind::Rename;
        if file.is_ambiguous {
            file.name = to.to_string();
            file.is_ambiguous = false;
        }
    } else if let Some(from) = body.strip_prefix("copy from ") {
        file.is_renamed = true;
        file.kind = DiffFileKind::Copy;
        if file.is_ambiguous {
            file.old_name = from.to_string();
        }
    } else if let Some(to) = body.strip_prefix("copy to ") {
        file.is_renamed = true;
        file.kind = DiffFileKind::Copy;
        if file.is_ambiguous {
            file.name = to.to_string();
            file.is_ambiguous = false;
        }
    } else if body.starts_with("new file") {
        file.kind = DiffFileKind::Add;
        file.is_created = true;
        file.is_submodule |= submodule;
    } else if body.starts_with("deleted") {
        file.kind = DiffFileKind::Delete;
        file.is_deleted = true;
        file.is_submodule |= submodule;
    } else if body.starts_with("index") {
        file.is_submodule |= submodule;
    } else if body.starts_with("similarity index 100%") {
        file.kind = DiffFileKind::Rename;
    } else if body.starts_with("Binary") {
        file.is_bin = true;
    } else if body.starts_with("--- ") && file.is_ambiguous {
        let bytes = body.as_bytes();
        file.old_name = if bytes.len() > 6 && bytes[4] == b'a' {
            strip_tab(body.get(6..).unwrap_or_default()).to_string()
        } else {
            String::new()
        };
    }
}

/// Settle the new name from `+++ b/<name>` if the header left it ambiguous.
fn resolve_new_name(file: &mut DiffFile, line: &str) {
    if !file.is_ambiguous {
        return;
    }
    let body = line.trim_end_matches(['\r', '\n']);
    let bytes = body.as_bytes();
    if bytes.len() > 5 && bytes[4] == b'b' {
        file.name = strip_tab(body.get(6..).unwrap_or_default()).to_string();
        if file.old_name.is_empty() {
            file.old_name = file.name.clone();
        }
    } else {
        file.name = file.old_name.clone();
    }
    file.is_ambiguous = false;
}

fn strip_tab(s: &str) -> &str {
    s.strip_suffix('\t').unwrap_or(s)
}

/// Split `@@ -l,s +l,s @@ ...` into its four numbers.
///
/// A missing count is zero. A header with only one range uses it for both
/// sides.
///
/// # Examples
///
/// ```
/// use amitrace_difflens::parser::parse_hunk_header;
///
/// assert_eq!(parse_hunk_header("@@ -10,7 +12,9 @@ resource").unwrap(), (10, 7, 12, 9));
/// assert_eq!(parse_hunk_header("@@ -1 +1 @@").unwrap(), (1, 0, 1, 0));
/// ```
pub fn parse_hunk_header(header: &str) -> Result<(usize, usize, usize, usize), AmitraceError> {
    let mut parts = header.split("@@");
    let ranges = match (parts.next(), parts.next()) {
        (Some(_), Some(ranges)) => ranges,
        _ => return Err(AmitraceError::Parse(format!("malformed hunk header: {header}"))),
    };
    let ranges = ranges.strip_prefix(' ').unwrap_or(ranges);
    let mut ranges = ranges.split(' ');

    let left = ranges.next().unwrap_or_default();
    let (left_line, left_hunk) = parse_range(left.get(1..).unwrap_or_default());
    match ranges.next() {
        Some(right) => {
            let (right_line, right_hunk) = parse_range(right);
            Ok((left_line, left_hunk, right_line, right_hunk))
        }
        None => Ok((left_line, left_hunk, left_line, left_hunk)),
    }
}

fn parse_range(range: &str) -> (usize, usize) {
    let mut it = range.split(',');
    let start = it.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let count = it.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (start, count)
}

fn section_info(
    path: &str,
    header: &str,
    last_left_idx: usize,
    last_right_idx: usize,
) -> Result<SectionInfo, AmitraceError> {
    let (left_idx, left_hunk_size, right_idx, right_hunk_size) = parse_hunk_header(header)?;
    Ok(SectionInfo {
        path: path.to_string(),
        last_left_idx,
        last_right_idx,
        left_idx,
        right_idx,
        left_hunk_size,
        right_hunk_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Diff {
        PatchParser::new(ParseLimits::unlimited())
            .parse_str(text, None)
            .unwrap()
    }

    #[test]
    fn empty_input_is_empty_diff() {
        let diff = parse("");
        assert!(diff.files.is_empty());
        assert_eq!(diff.num_files, 0);
    }

    #[test]
    fn replace_pairs_first_delete_with_first_add() {
        let diff = parse(
            "diff --git a/x.txt b/x.txt\n--- a/x.txt\n+++ b/x.txt\n@@ -1,1 +1,2 @@\n-old\n+new\n+added\n",
        );
        assert_eq!(diff.files.len(), 1);
        let file = &diff.files[0];
        assert_eq!(file.name, "x.txt");
        assert_eq!(file.old_name, "x.txt");
        assert!(!file.is_renamed);
        assert_eq!((file.addition, file.deletion), (2, 1));
        assert_eq!(file.sections.len(), 1);

        let lines = &file.sections[0].lines;
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].kind, DiffLineKind::Section);
        assert_eq!(lines[1].kind, DiffLineKind::Delete);
        assert_eq!(lines[1].content, "-old");
        assert_eq!(lines[1].left_idx, 1);
        assert_eq!(lines[1].match_idx, Some(2));
        assert_eq!(lines[2].content, "+new");
        assert_eq!(lines[2].match_idx, Some(1));
        assert_eq!(lines[2].right_idx, 1);
        assert_eq!(lines[3].match_idx, None);
        assert_eq!(lines[3].right_idx, 2);
    }

    #[test]
    fn multi_line_replace_pairs_positionally() {
        let diff = parse(
            "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n ctx\n-a\n-b\n+A\n+B\n",
        );
        let lines = &diff.files[0].sections[0].lines;
        // [section, ctx, -a, -b, +A, +B]
        assert_eq!(lines[2].match_idx, Some(4));
        assert_eq!(lines[3].match_idx, Some(5));
        assert_eq!(lines[4].match_idx, Some(2));
        assert_eq!(lines[5].match_idx, Some(3));
        assert_eq!(lines[1].left_idx, 1);
        assert_eq!(lines[3].left_idx, 3);
        assert_eq!(lines[5].right_idx, 3);
    }

    #[test]
    fn section_info_tracks_previous_hunk() {
        let diff = parse(
            "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n-b\n+c\n@@ -10,2 +10,3 @@ fn x\n k\n+l\n m\n",
        );
        let sections = &diff.files[0].sections;
        assert_eq!(sections.len(), 2);
        let info = sections[1].lines[0].section_info.as_ref().unwrap();
        assert_eq!(info.last_left_idx, 2);
        assert_eq!(info.last_right_idx, 2);
        assert_eq!(info.left_idx, 10);
        assert_eq!((info.left_hunk_size, info.right_hunk_size), (2, 3));
        assert_eq!(sections[1].lines[0].content, "@@ -10,2 +10,3 @@ fn x");
    }

    #[test]
    fn totals_match_sum_over_files() {
        let text = "\
diff --git a/a.tf b/a.tf
--- a/a.tf
+++ b/a.tf
@@ -1,2 +1,3 @@
 x
+y
+z
diff --git a/b.tf b/b.tf
deleted file mode 100644
--- a/b.tf
+++ /dev/null
@@ -1,2 +0,0 @@
-p
-q
";
        let diff = parse(text);
        assert_eq!(diff.num_files, 2);
        let adds: usize = diff.files.iter().map(|f| f.addition).sum();
        let dels: usize = diff.files.iter().map(|f| f.deletion).sum();
        assert_eq!(adds, diff.total_addition);
        assert_eq!(dels, diff.total_deletion);
        assert_eq!(diff.files[1].kind, DiffFileKind::Delete);
        assert!(diff.files[1].is_deleted);
        assert_eq!(diff.files[1].index, 2);
    }

    #[test]
    fn parsing_is_repeatable() {
        let text = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-1\n+2\n";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn quoted_names_with_backslash_prefix() {
        let text = "diff --git \"\\\\a/my file.tf\" \"\\\\b/my file.tf\"\n--- \"\\\\a/my file.tf\"\n+++ \"\\\\b/my file.tf\"\n@@ -1 +1 @@\n-a\n+b\n";
        let file = &parse(text).files[0];
        assert_eq!(file.name, "my file.tf");
        assert_eq!(file.old_name, "my file.tf");
        assert!(!file.is_ambiguous);
    }

    #[test]
    fn symmetric_unquoted_name_with_spaces() {
        let text = "diff --git a/foo bar.txt b/foo bar.txt\nBinary files a/foo bar.txt and b/foo bar.txt differ\n";
        let file = &parse(text).files[0];
        assert_eq!(file.name, "foo bar.txt");
        assert_eq!(file.old_name, "foo bar.txt");
        assert!(file.is_bin);
        assert!(!file.is_text());
    }

    #[test]
    fn ambiguous_rename_resolved_from_minus_plus_lines() {
        let text = "\
diff --git a/old name.tf b/new name here.tf
--- a/old name.tf
+++ b/new name here.tf
@@ -1 +1 @@
-x
+y
";
        let file = &parse(text).files[0];
        assert_eq!(file.old_name, "old name.tf");
        assert_eq!(file.name, "new name here.tf");
        assert!(!file.is_ambiguous);
        assert!(file.is_renamed);
    }

    #[test]
    fn crlf_names_lose_their_carriage_return() {
        let text = "diff --git a/old name.tf b/new name here.tf\r\n\
--- a/old name.tf\r\n\
+++ b/new name here.tf\r\n\
@@ -1 +1 @@\r\n\
-x\r\n\
+y\r\n";
        let file = &parse(text).files[0];
        assert_eq!(file.old_name, "old name.tf");
        assert_eq!(file.name, "new name here.tf");
        assert!(!file.is_ambiguous);

        let text = "diff --git a/a x.tf b/c d.tf\r\nrename from a x.tf\r\nrename to c d.tf\r\n";
        let file = &parse(text).files[0];
        assert_eq!(file.old_name, "a x.tf");
        assert_eq!(file.name, "c d.tf");
    }

    #[test]
    fn rename_headers_set_kind() {
        let text = "\
diff --git a/a.tf b/b.tf
similarity index 100%
rename from a.tf
rename to b.tf
";
        let file = &parse(text).files[0];
        assert_eq!(file.kind, DiffFileKind::Rename);
        assert!(file.is_renamed);
        assert_eq!(file.name, "b.tf");
        assert_eq!(file.old_name, "a.tf");
    }

    #[test]
    fn submodule_mode_is_flagged() {
        let text = "\
diff --git a/mods b/mods
new file mode 160000
index 0000000..1234567
--- /dev/null
+++ b/mods
@@ -0,0 +1 @@
+Subproject commit 1234567890123456789012345678901234567890
";
        let file = &parse(text).files[0];
        assert!(file.is_submodule);
        assert!(file.is_created);
        assert_eq!(file.kind, DiffFileKind::Add);
    }

    #[test]
    fn no_newline_marker_is_consumed() {
        let text = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n\\ No newline at end of file\n+b\n\\ No newline at end of file\n";
        let file = &parse(text).files[0];
        assert_eq!(file.sections[0].lines.len(), 3);
    }

    #[test]
    fn unexpected_lines_are_errors() {
        let parser = PatchParser::new(ParseLimits::unlimited());
        let bad_marker = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n*oops\n";
        assert!(matches!(parser.parse_str(bad_marker, None), Err(AmitraceError::Parse(_))));
        let bad_backslash = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n\\ something else\n";
        assert!(parser.parse_str(bad_backslash, None).is_err());
        assert!(parser.parse_str("not a diff\n", None).is_err());
    }

    #[test]
    fn max_lines_flags_incomplete() {
        let limits = ParseLimits {
            max_lines: Some(3),
            ..ParseLimits::unlimited()
        };
        let text = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -0,0 +1,5 @@\n+1\n+2\n+3\n+4\n+5\n";
        let diff = PatchParser::new(limits).parse_str(text, None).unwrap();
        let file = &diff.files[0];
        assert!(file.is_incomplete);
        assert_eq!(file.addition, 5);
        // Section line plus the two lines before the limit.
        assert_eq!(file.sections[0].lines.len(), 3);
    }

    #[test]
    fn long_lines_are_truncated() {
        let limits = ParseLimits {
            max_line_characters: 5,
            ..ParseLimits::unlimited()
        };
        let text = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -0,0 +1 @@\n+abcdefghij\n";
        let diff = PatchParser::new(limits).parse_str(text, None).unwrap();
        let file = &diff.files[0];
        assert!(file.is_incomplete_line_too_long);
        assert_eq!(file.sections[0].lines[1].content, "+abcd");
    }

    #[test]
    fn max_files_records_end() {
        let limits = ParseLimits {
            max_files: Some(1),
            ..ParseLimits::unlimited()
        };
        let text = "\
diff --git a/one b/one
--- a/one
+++ b/one
@@ -0,0 +1 @@
+1
diff --git a/two b/two
--- a/two
+++ b/two
@@ -0,0 +1 @@
+2
";
        let diff = PatchParser::new(limits).parse_str(text, None).unwrap();
        assert_eq!(diff.files.len(), 1);
        assert!(diff.is_incomplete);
        assert_eq!(diff.end.as_deref(), Some("two"));
    }

    #[test]
    fn skip_to_resumes_at_named_file() {
        let text = "\
diff --git a/one b/one
--- a/one
+++ b/one
@@ -0,0 +1 @@
+1
diff --git a/two b/two
--- a/two
+++ b/two
@@ -0,0 +1 @@
+2
";
        let diff = PatchParser::new(ParseLimits::unlimited())
            .parse_str(text, Some("two"))
            .unwrap();
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].name, "two");
        assert_eq!(diff.files[0].index, 1);
    }

    #[test]
    fn lfs_pointer_is_detected() {
        let oid = "a".repeat(64);
        let text = format!(
            "diff --git a/big.bin b/big.bin\nnew file mode 100644\n--- /dev/null\n+++ b/big.bin\n@@ -0,0 +1,3 @@\n+{LFS_META_IDENTIFIER}\n+{LFS_OID_PREFIX}{oid}\n+size 12345\n"
        );
        let file = &parse(&text).files[0];
        assert!(file.is_lfs_file);
        assert!(!file.is_bin);
    }

    #[test]
    fn name_hash_is_sha1_of_name() {
        let diff = parse("diff --git a/abc b/abc\n--- a/abc\n+++ b/abc\n@@ -1 +1 @@\n-x\n+y\n");
        assert_eq!(diff.files[0].name_hash, "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn non_utf8_additions_are_transcoded() {
        let mut raw = b"diff --git a/d.txt b/d.txt\n--- a/d.txt\n+++ b/d.txt\n@@ -1 +1 @@\n-plain\n+".to_vec();
        raw.extend_from_slice(b"Gr\xf6\xdfe des Abbilds f\xfcr die Produktion");
        raw.push(b'\n');
        let diff = PatchParser::new(ParseLimits::unlimited()).parse(&raw[..], None).unwrap();
        let lines = &diff.files[0].sections[0].lines;
        assert_eq!(lines[1].content, "-plain");
        assert!(lines[2].content.starts_with("+Gr\u{f6}\u{df}e"));
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let diff = parse("diff --git a/w b/w\r\n--- a/w\r\n+++ b/w\r\n@@ -1 +1 @@\r\n-a\r\n+b\r\n");
        let lines = &diff.files[0].sections[0].lines;
        assert_eq!(lines[2].content, "+b");
    }

    #[test]
    fn hunk_header_with_single_range() {
        assert_eq!(parse_hunk_header("@@ -3,2 @@").unwrap(), (3, 2, 3, 2));
        assert!(parse_hunk_header("no markers").is_err());
    }
}
