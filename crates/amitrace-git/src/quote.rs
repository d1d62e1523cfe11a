//! Git's C-style path quoting (`core.quotePath`).

use amitrace_core::AmitraceError;

/// Undo git's quoting of a path.
///
/// Accepts the text with or without the surrounding double quotes. Octal
/// escapes produce raw bytes, which are then read as UTF-8 (lossily).
///
/// # Examples
///
/// ```
/// use amitrace_git::quote::unquote;
///
/// assert_eq!(unquote(r#""a\tb""#).unwrap(), "a\tb");
/// assert_eq!(unquote(r#""caf\303\251.txt""#).unwrap(), "café.txt");
/// assert_eq!(unquote("plain").unwrap(), "plain");
/// ```
pub fn unquote(input: &str) -> Result<String, AmitraceError> {
    let inner = match input.strip_prefix('"') {
        Some(rest) => rest
            .strip_suffix('"')
            .ok_or_else(|| AmitraceError::Parse(format!("unterminated quoted name: {input}")))?,
        None => return Ok(input.to_string()),
    };

    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let esc = *bytes
            .get(i + 1)
            .ok_or_else(|| AmitraceError::Parse(format!("dangling escape in: {input}")))?;
        i += 2;
        match esc {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b't' => out.push(b'\t'),
            b'n' => out.push(b'\n'),
            b'v' => out.push(0x0b),
            b'f' => out.push(0x0c),
            b'r' => out.push(b'\r'),
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'0'..=b'7' => {
                let digits = bytes
                    .get(i - 1..i + 2)
                    .filter(|d| d.iter().all(|c| (b'0'..=b'7').contains(c)))
                    .ok_or_else(|| AmitraceError::Parse(format!("bad octal escape in: {input}")))?;
                let value = digits
                    .iter()
                    .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
                let byte = u8::try_from(value)
                    .map_err(|_| AmitraceError::Parse(format!("octal escape out of range in: {input}")))?;
                out.push(byte);
                i += 2;
            }
            other => {
                return Err(AmitraceError::Parse(format!(
                    "unknown escape \\{} in: {input}",
                    other as char
                )))
            }
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Length in bytes of the quoted token at the start of `s`, quotes included.
pub fn quoted_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'"') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_are_decoded() {
        assert_eq!(unquote(r#""a\"b\\c""#).unwrap(), "a\"b\\c");
        assert_eq!(unquote(r#""line\nbreak""#).unwrap(), "line\nbreak");
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(unquote("\"open").is_err());
        assert!(unquote(r#""bad\q""#).is_err());
        assert!(unquote(r#""short\12""#).is_err());
    }

    #[test]
    fn quoted_len_skips_escaped_quotes() {
        assert_eq!(quoted_len(r#""a\"b" rest"#), Some(6));
        assert_eq!(quoted_len("plain"), None);
        assert_eq!(quoted_len("\"open"), None);
    }
}
