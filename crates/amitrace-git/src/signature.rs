use std::fmt;

use chrono::{DateTime, FixedOffset, TimeZone};

/// `Mon Jan 2 15:04:05 2006 -0700`, used by some old tooling instead of epoch seconds.
const GIT_TIME_LAYOUT: &str = "%a %b %e %H:%M:%S %Y %z";

/// Author, committer or tagger identity with a timestamp.
///
/// # Examples
///
/// ```
/// use amitrace_git::Signature;
///
/// let sig = Signature::decode(b"Jane Doe <jane@example.com> 1700000000 +0130");
/// assert_eq!(sig.name, "Jane Doe");
/// assert_eq!(sig.email, "jane@example.com");
/// assert_eq!(sig.when.timestamp(), 1700000000);
/// assert_eq!(sig.when.offset().local_minus_utc(), 90 * 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            when: DateTime::UNIX_EPOCH.fixed_offset(),
        }
    }
}

impl Signature {
    /// Parse `name <email> seconds +zzzz`.
    ///
    /// Never fails: whatever cannot be read is left at its zero value, since
    /// identity lines are user-controlled and often carry encoding noise.
    pub fn decode(line: &[u8]) -> Self {
        let mut sig = Signature::default();

        let (Some(email_start), Some(email_end)) = (
            line.iter().rposition(|&b| b == b'<'),
            line.iter().rposition(|&b| b == b'>'),
        ) else {
            return sig;
        };
        if email_end < email_start {
            return sig;
        }

        if email_start > 0 {
            sig.name = String::from_utf8_lossy(&line[..email_start - 1])
                .trim()
                .to_string();
        }
        sig.email = String::from_utf8_lossy(&line[email_start + 1..email_end]).into_owned();

        let time_start = email_end + 2;
        if time_start >= line.len() {
            return sig;
        }
        let rest = &line[time_start..];

        if rest[0].is_ascii_digit() {
            let Some(space) = rest.iter().position(|&b| b == b' ') else {
                return sig;
            };
            let seconds: i64 = std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let utc = chrono::Utc
                .timestamp_opt(seconds, 0)
                .single()
                .unwrap_or(DateTime::UNIX_EPOCH);
            sig.when = utc.fixed_offset();

            let zone = &rest[space + 1..];
            if let Some(offset) = zone.get(..5).and_then(parse_offset) {
                sig.when = utc.with_timezone(&offset);
            }
        } else if let Some(when) = std::str::from_utf8(rest)
            .ok()
            .and_then(|s| DateTime::parse_from_str(s.trim(), GIT_TIME_LAYOUT).ok())
        {
            sig.when = when;
        }
        sig
    }
}

/// Parse `+hhmm` / `-hhmm`.
fn parse_offset(zone: &[u8]) -> Option<FixedOffset> {
    let s = std::str::from_utf8(zone).ok()?;
    let hours: i32 = s.get(0..3)?.parse().ok()?;
    let mut minutes: i32 = s.get(3..5)?.parse().ok()?;
    if s.starts_with('-') {
        minutes = -minutes;
    }
    FixedOffset::east_opt(hours * 3600 + minutes * 60)
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.when.timestamp(),
            self.when.format("%z")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_offset_applies_to_minutes() {
        let sig = Signature::decode(b"A <a@b> 0 -0230");
        assert_eq!(sig.when.offset().local_minus_utc(), -(2 * 3600 + 30 * 60));
    }

    #[test]
    fn missing_email_yields_zero_value() {
        let sig = Signature::decode(b"no email here 12345 +0000");
        assert_eq!(sig, Signature::default());
    }

    #[test]
    fn missing_time_keeps_identity() {
        let sig = Signature::decode(b"Bob <bob@x>");
        assert_eq!(sig.name, "Bob");
        assert_eq!(sig.email, "bob@x");
        assert_eq!(sig.when.timestamp(), 0);
    }

    #[test]
    fn empty_name_is_tolerated() {
        let sig = Signature::decode(b"<ghost@x> 10 +0000");
        assert_eq!(sig.name, "");
        assert_eq!(sig.email, "ghost@x");
        assert_eq!(sig.when.timestamp(), 10);
    }

    #[test]
    fn bad_zone_keeps_utc_time() {
        let sig = Signature::decode(b"C <c@d> 86400 +zz");
        assert_eq!(sig.when.timestamp(), 86400);
        assert_eq!(sig.when.offset().local_minus_utc(), 0);
    }

    #[test]
    fn textual_date_layout() {
        let sig = Signature::decode(b"D <d@e> Mon Jan  2 15:04:05 2006 -0700");
        assert_eq!(sig.when.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(sig.when.timestamp(), 1136239445);
    }

    #[test]
    fn display_round_trips() {
        let raw = "Jane <j@x> 1700000000 +0100";
        assert_eq!(Signature::decode(raw.as_bytes()).to_string(), raw);
    }
}
