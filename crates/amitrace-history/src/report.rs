//! Rendering of a classified occurrence log.

use std::fmt::Write;

use amitrace_core::{AmiNameAndData, AmitraceError, ImageStatus, OccurrenceLog, OutputFormat};
use chrono::{DateTime, FixedOffset, Months};

use crate::classify::StatusCounts;

/// Render `log` in `format`. Images are grouped by age relative to `now`.
pub fn render(log: &OccurrenceLog, format: OutputFormat, now: DateTime<FixedOffset>) -> Result<String, AmitraceError> {
    match format {
        OutputFormat::Text => Ok(format_text(log, now)),
        OutputFormat::Json => log.to_json_pretty(),
        OutputFormat::Markdown => Ok(format_markdown(log)),
    }
}

/// Age bucket headings, oldest first, with the cutoff (in months) above
/// which an image belongs to the next bucket.
const AGE_BUCKETS: [(u32, &str); 3] = [
    (24, "Created 24 to 12 months ago"),
    (12, "Created 12 to 6 months ago"),
    (6, "Created in the last 6 months"),
];

fn status_label(image: &AmiNameAndData) -> String {
    match image.status {
        ImageStatus::InUse => "In use".into(),
        ImageStatus::NeverUsed => "Never used".into(),
        ImageStatus::Unknown => "Unknown".into(),
        ImageStatus::NoLongerUsed => match image.last_used_date {
            Some(date) => format!(
                "No longer used since {} in {}",
                date.format("%Y-%m-%d"),
                image.last_used_file
            ),
            None => "No longer used".into(),
        },
    }
}

/// Summary line with the number of images per status.
///
/// # Examples
///
/// ```
/// use amitrace_history::classify::StatusCounts;
/// use amitrace_history::report::summary_line;
///
/// let counts = StatusCounts { in_use: 2, never_used: 1, no_longer_used: 0, unknown: 0 };
/// assert_eq!(summary_line(&counts), "3 images: 2 in use, 0 no longer used, 1 never used");
/// ```
pub fn summary_line(counts: &StatusCounts) -> String {
    let mut line = format!(
        "{} images: {} in use, {} no longer used, {} never used",
        counts.total(),
        counts.in_use,
        counts.no_longer_used,
        counts.never_used
    );
    if counts.unknown > 0 {
        let _ = write!(line, ", {} unknown", counts.unknown);
    }
    line
}

/// Plain text report.
///
/// Images are listed in creation order under age headings; images older
/// than the first bucket come before any heading.
pub fn format_text(log: &OccurrenceLog, now: DateTime<FixedOffset>) -> String {
    let mut images: Vec<&AmiNameAndData> = log.images.iter().collect();
    images.sort_by_key(|i| i.converted_date);

    let mut out = String::new();
    match &log.repo_name {
        Some(repo) => {
            let _ = writeln!(out, "Image usage in {repo}:");
        }
        None => out.push_str("Image usage:\n"),
    }

    let cutoffs: Vec<(Option<DateTime<FixedOffset>>, &str)> = AGE_BUCKETS
        .iter()
        .map(|(months, title)| (now.checked_sub_months(Months::new(*months)), *title))
        .collect();
    let mut next_bucket = 0;
    for image in images {
        while let Some((cutoff, title)) = cutoffs.get(next_bucket) {
            if !cutoff.is_some_and(|c| image.converted_date > c) {
                break;
            }
            let _ = writeln!(out, "{title}:");
            next_bucket += 1;
        }
        let _ = writeln!(
            out,
            "  {} ({}) created {}: {}",
            image.name,
            image.image_id,
            image.creation_date.format("%Y-%m-%d"),
            status_label(image)
        );
    }

    out.push('\n');
    out.push_str(&summary_line(&StatusCounts::tally(&log.images)));
    out.push('\n');
    out
}

/// Markdown table, one row per image.
pub fn format_markdown(log: &OccurrenceLog) -> String {
    let mut out = String::new();
    match &log.repo_name {
        Some(repo) => {
            let _ = writeln!(out, "# Image usage in `{repo}`\n");
        }
        None => out.push_str("# Image usage\n\n"),
    }
    out.push_str("| Name | Image id | Created | Status | Last used | Last file |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for image in &log.images {
        let last_used = image
            .last_used_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "| {} | `{}` | {} | {} | {} | {} |",
            image.name,
            image.image_id,
            image.creation_date.format("%Y-%m-%d"),
            image.status,
            last_used,
            image.last_used_file
        );
    }
    out.push('\n');
    let _ = writeln!(out, "_{}_", summary_line(&StatusCounts::tally(&log.images)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn image(name: &str, created: &str, status: ImageStatus) -> AmiNameAndData {
        let mut img = AmiNameAndData::new(name, format!("ami-{name}"), date(created), date(created));
        img.status = status;
        img
    }

    fn log() -> OccurrenceLog {
        let mut gone = image("gone", "2024-05-01T00:00:00Z", ImageStatus::NoLongerUsed);
        gone.last_used_date = Some(date("2024-09-15T10:00:00Z"));
        gone.last_used_file = "envs/prod.tfvars".into();
        OccurrenceLog::new(
            Some("infra".into()),
            vec![
                image("fresh", "2024-11-01T00:00:00Z", ImageStatus::InUse),
                gone,
                image("ancient", "2021-01-01T00:00:00Z", ImageStatus::NeverUsed),
            ],
        )
    }

    #[test]
    fn text_groups_by_age() {
        let out = format_text(&log(), date("2024-12-01T00:00:00Z"));
        let ancient = out.find("ancient").unwrap();
        let year = out.find("Created 24 to 12 months ago").unwrap();
        let half = out.find("Created 12 to 6 months ago").unwrap();
        let gone = out.find("gone").unwrap();
        let recent = out.find("Created in the last 6 months").unwrap();
        let fresh = out.find("fresh").unwrap();
        assert!(ancient < year && year < half && half < gone && gone < recent && recent < fresh);
        assert!(out.contains("No longer used since 2024-09-15 in envs/prod.tfvars"));
        assert!(out.contains("3 images: 1 in use, 1 no longer used, 1 never used"));
    }

    #[test]
    fn markdown_has_a_row_per_image() {
        let out = format_markdown(&log());
        assert!(out.starts_with("# Image usage in `infra`"));
        assert_eq!(out.lines().filter(|l| l.starts_with("| ") && l.contains("`ami-")).count(), 3);
        assert!(out.contains("| NoLongerUsed | 2024-09-15 | envs/prod.tfvars |"));
    }

    #[test]
    fn json_is_the_log() {
        let out = render(&log(), OutputFormat::Json, date("2024-12-01T00:00:00Z")).unwrap();
        let back = OccurrenceLog::from_json(&out).unwrap();
        assert_eq!(back, log());
    }
}
