//! Literal searches in a checked-out working tree.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use amitrace_core::AmitraceError;

/// Whether `root/rel_path` contains `needle` on any line.
///
/// A file that does not exist (it was deleted after the commit that last
/// touched it) simply does not match. Invalid UTF-8 is read lossily.
pub fn file_contains(root: &Path, rel_path: &str, needle: &str) -> Result<bool, AmitraceError> {
    let path = root.join(rel_path);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };
    if !file.metadata()?.is_file() {
        return Ok(false);
    }

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(false);
        }
        if String::from_utf8_lossy(&line).contains(needle) {
            return Ok(true);
        }
    }
}

/// First of `files` (relative to `root`) that still contains `needle`.
pub fn first_file_containing<'a, I>(
    root: &Path,
    files: I,
    needle: &str,
) -> Result<Option<String>, AmitraceError>
where
    I: IntoIterator<Item = &'a str>,
{
    for rel in files {
        if file_contains(root, rel, needle)? {
            tracing::debug!(target: "amitrace::worktree", file = rel, needle, "found in working tree");
            return Ok(Some(rel.to_string()));
        }
    }
    Ok(None)
}
