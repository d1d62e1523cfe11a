//! Tracked image list.
//!
//! One image per line: `amiId, creationDate, name`, with the creation date
//! in RFC 3339. Blank lines and `#` comments are ignored.

use std::path::Path;

use amitrace_core::{AmiNameAndData, AmitraceError};
use chrono::{DateTime, Duration, FixedOffset};

/// Parse an image list, computing each `converted_date` as the creation
/// date minus `creation_margin_days`.
///
/// # Errors
///
/// [`AmitraceError::Parse`] naming the 1-based line number of the first
/// line that does not have three fields or has an invalid date.
///
/// # Examples
///
/// ```
/// use amitrace_history::images::parse_image_list;
///
/// let text = "# id, created, name\nami-0abc, 2024-01-10T08:00:00Z, base-image-2024\n";
/// let images = parse_image_list(text, 1).unwrap();
/// assert_eq!(images.len(), 1);
/// assert_eq!(images[0].name, "base-image-2024");
/// assert_eq!(images[0].converted_date.to_rfc3339(), "2024-01-09T08:00:00+00:00");
/// ```
pub fn parse_image_list(text: &str, creation_margin_days: i64) -> Result<Vec<AmiNameAndData>, AmitraceError> {
    let margin = Duration::days(creation_margin_days);
    let mut images = Vec::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        let [image_id, created, name] = fields[..] else {
            return Err(AmitraceError::Parse(format!(
                "line {}: expected 'amiId, creationDate, name', got {line:?}",
                i + 1
            )));
        };
        let creation_date = DateTime::parse_from_rfc3339(created)
            .map_err(|e| AmitraceError::Parse(format!("line {}: bad creation date {created:?}: {e}", i + 1)))?;
        images.push(AmiNameAndData::new(name, image_id, creation_date, creation_date - margin));
    }
    Ok(images)
}

/// Read and parse an image list file.
pub fn read_image_list(path: &Path, creation_margin_days: i64) -> Result<Vec<AmiNameAndData>, AmitraceError> {
    if !path.exists() {
        return Err(AmitraceError::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_image_list(&text, creation_margin_days)
}

/// Oldest creation date in `images`.
pub fn oldest_creation(images: &[AmiNameAndData]) -> Option<DateTime<FixedOffset>> {
    images.iter().map(|i| i.creation_date).min()
}
