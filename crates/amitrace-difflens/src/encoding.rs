//! Charset detection for diff content that is not valid UTF-8.

use amitrace_core::EncodingConfig;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

/// Tie-break order used when no priority list is configured.
pub const DEFAULT_CHARSET_PRIORITY: &[&str] = &[
    "UTF-8",
    "ISO-8859-1",
    "windows-1252",
    "ISO-8859-2",
    "windows-1250",
    "ISO-8859-5",
    "ISO-8859-6",
    "ISO-8859-7",
    "windows-1253",
    "ISO-8859-8-I",
    "windows-1255",
    "ISO-8859-8",
    "windows-1251",
    "windows-1256",
    "KOI8-R",
    "ISO-8859-9",
    "windows-1254",
    "Shift_JIS",
    "GB18030",
    "EUC-JP",
    "EUC-KR",
    "Big5",
];

/// Whether `content` is UTF-8, tolerating one multi-byte sequence cut off at
/// the very end (lines are truncated at a byte limit).
///
/// # Examples
///
/// ```
/// use amitrace_difflens::encoding::is_utf8_allowing_truncated_tail;
///
/// let mut bytes = "caf\u{e9}".as_bytes().to_vec();
/// assert!(is_utf8_allowing_truncated_tail(&bytes));
/// bytes.pop();
/// assert!(is_utf8_allowing_truncated_tail(&bytes));
/// assert!(!is_utf8_allowing_truncated_tail(b"caf\xe9 au lait"));
/// ```
pub fn is_utf8_allowing_truncated_tail(content: &[u8]) -> bool {
    match std::str::from_utf8(content) {
        Ok(_) => true,
        // `error_len() == None` means the input ended inside a sequence.
        Err(err) => err.error_len().is_none(),
    }
}

/// Picks the charset of a buffer.
#[derive(Debug, Clone)]
pub struct CharsetDetector {
    priority: Vec<&'static Encoding>,
    ansi: Option<&'static Encoding>,
}

impl Default for CharsetDetector {
    fn default() -> Self {
        Self::from_config(&EncodingConfig::default())
    }
}

impl CharsetDetector {
    /// Unknown labels in the configuration are ignored.
    pub fn from_config(config: &EncodingConfig) -> Self {
        let labels: Vec<&str> = if config.charset_priority.is_empty() {
            DEFAULT_CHARSET_PRIORITY.to_vec()
        } else {
            config.charset_priority.iter().map(String::as_str).collect()
        };
        let mut priority = Vec::new();
        for label in labels {
            match Encoding::for_label(label.trim().as_bytes()) {
                Some(enc) if !priority.contains(&enc) => priority.push(enc),
                Some(_) => {}
                None => tracing::warn!(target: "amitrace::encoding", label, "unknown charset label"),
            }
        }
        let ansi = match config.ansi_charset.trim() {
            "" => None,
            label => Encoding::for_label(label.as_bytes()),
        };
        Self { priority, ansi }
    }

    /// Charset of `content`. [`UTF_8`] means no transcoding is needed.
    ///
    /// A configured ANSI charset replaces every non-UTF-8 result. Without
    /// one, the statistical guess wins when it decodes `content` cleanly,
    /// then the first priority charset that does, then the guess regardless.
    pub fn detect(&self, content: &[u8]) -> &'static Encoding {
        if content.is_empty() || is_utf8_allowing_truncated_tail(content) {
            return UTF_8;
        }

        if let Some(ansi) = self.ansi {
            return ansi;
        }

        let mut detector = EncodingDetector::new();
        detector.feed(content, true);
        let guess = detector.guess(None, false);

        if decodes_cleanly(guess, content) {
            return guess;
        }
        if let Some(enc) = self
            .priority
            .iter()
            .copied()
            .filter(|enc| *enc != UTF_8)
            .find(|enc| decodes_cleanly(*enc, content))
        {
            return enc;
        }
        guess
    }
}

fn decodes_cleanly(enc: &'static Encoding, content: &[u8]) -> bool {
    enc.decode_without_bom_handling_and_without_replacement(content)
        .is_some()
}

/// Decode `bytes` as `enc`, replacing malformed sequences.
pub fn decode(enc: &'static Encoding, bytes: &[u8]) -> String {
    if enc == UTF_8 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let (text, _) = enc.decode_without_bom_handling(bytes);
    text.into_owned()
}
