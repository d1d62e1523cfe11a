use chrono::{DateTime, FixedOffset, SecondsFormat};

use amitrace_core::AmitraceError;

use crate::oid::ObjectId;
use crate::repository::Repository;

/// One line of `git log --format=%H %aI`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: ObjectId,
    pub date: DateTime<FixedOffset>,
}

/// Parse `<sha> <iso8601 author date>` lines.
pub fn parse_log_lines(text: &str) -> Result<Vec<CommitInfo>, AmitraceError> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let (sha, date) = line
                .trim()
                .split_once(' ')
                .ok_or_else(|| AmitraceError::Parse(format!("malformed log line: {line}")))?;
            let date = DateTime::parse_from_rfc3339(date.trim())
                .map_err(|e| AmitraceError::Parse(format!("bad commit date in {line:?}: {e}")))?;
            Ok(CommitInfo {
                id: ObjectId::from_hex(sha)?,
                date,
            })
        })
        .collect()
}

/// Commits reachable from HEAD whose author date lies in `since..=until`,
/// oldest first.
///
/// Log order follows commit topology, not time, so the list is re-sorted by
/// author date. The sort is stable: commits sharing a timestamp keep
/// git's relative order.
pub fn list_commits(
    repo: &Repository,
    since: Option<DateTime<FixedOffset>>,
    until: Option<DateTime<FixedOffset>>,
) -> Result<Vec<CommitInfo>, AmitraceError> {
    let mut cmd = repo.command(&["log", "--format=%H %aI"]);
    if let Some(since) = since {
        cmd.add_option_value("--since", &since.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Some(until) = until {
        cmd.add_option_value("--until", &until.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    let out = cmd.run_std_string(repo.run_opts())?;

    let mut commits = parse_log_lines(&out)?;
    // `git log` lists newest first; reverse before the stable sort so ties
    // come out in ancestry order.
    commits.reverse();
    commits.sort_by_key(|c| c.date);
    tracing::debug!(target: "amitrace::git", count = commits.len(), "listed commits");
    Ok(commits)
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn parses_iso_dates_with_offsets() {
        let text = format!("{A} 2023-05-01T10:00:00+02:00\n{B} 2023-04-30T23:00:00-05:00\n");
        let commits = parse_log_lines(&text).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].date.offset().local_minus_utc(), 7200);
        assert!(commits[1].date > commits[0].date);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let text = format!("\n{A} 2023-05-01T10:00:00Z\n\n");
        assert_eq!(parse_log_lines(&text).unwrap().len(), 1);
    }

    #[test]
    fn malformed_line_is_a_parse_error() {
        assert!(matches!(
            parse_log_lines("not-a-log-line"),
            Err(AmitraceError::Parse(_))
        ));
        assert!(parse_log_lines(&format!("{A} yesterday")).is_err());
    }
}
