//! Occurrence log model shared by the scan and classify passes.
//!
//! Field names are PascalCase on the wire so logs written by older tooling
//! (a bare JSON array of images) stay readable.

use std::path::Path;

use chrono::{DateTime, Datelike, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::AmitraceError;
use crate::types::ImageStatus;

/// Current version of the serialized occurrence log.
pub const SCHEMA_VERSION: u32 = 1;

/// One added or removed diff line that mentions a tracked image.
///
/// # Examples
///
/// ```
/// use amitrace_core::AmiOccurrence;
///
/// let occ = AmiOccurrence {
///     file_path_and_name: "envs/prod.tfvars".into(),
///     line: "+ami = \"base-image-2024\"".into(),
///     line_index: 12,
///     section_index: 0,
///     commit_hash: "a1b2c3".into(),
///     commit_date: "2024-05-01T10:00:00+00:00".parse().unwrap(),
///     repo_name: "infra".into(),
/// };
/// assert!(occ.is_addition());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmiOccurrence {
    /// Path of the file in the commit's new tree.
    pub file_path_and_name: String,
    /// The raw diff line, marker byte included.
    pub line: String,
    /// Right-hand line number for additions, left-hand for removals.
    pub line_index: usize,
    /// Index of the hunk inside the file.
    pub section_index: usize,
    /// Full commit hash.
    pub commit_hash: String,
    /// Author date of the commit.
    pub commit_date: DateTime<FixedOffset>,
    /// Repository the commit belongs to.
    #[serde(default)]
    pub repo_name: String,
}

impl AmiOccurrence {
    /// Line starts with `+`.
    pub fn is_addition(&self) -> bool {
        self.line.starts_with('+')
    }

    /// Line starts with `-`.
    pub fn is_removal(&self) -> bool {
        self.line.starts_with('-')
    }
}

/// A tracked image with every occurrence found for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmiNameAndData {
    /// Image name searched for in diff lines.
    pub name: String,
    /// Provider image id, e.g. `ami-0abc...`.
    pub image_id: String,
    /// When the image was created.
    pub creation_date: DateTime<FixedOffset>,
    /// Creation date minus the configured margin; commits must be newer.
    pub converted_date: DateTime<FixedOffset>,
    /// Classification result.
    #[serde(default)]
    pub status: ImageStatus,
    /// Newest removal-only commit date.
    #[serde(default)]
    pub last_used_date: Option<DateTime<FixedOffset>>,
    /// File of that newest removal.
    #[serde(default)]
    pub last_used_file: String,
    /// Occurrences in scan order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub occurrences: Vec<AmiOccurrence>,
}

impl AmiNameAndData {
    /// Create an unclassified entry with no occurrences.
    pub fn new(
        name: impl Into<String>,
        image_id: impl Into<String>,
        creation_date: DateTime<FixedOffset>,
        converted_date: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            image_id: image_id.into(),
            creation_date,
            converted_date,
            status: ImageStatus::Unknown,
            last_used_date: None,
            last_used_file: String::new(),
            occurrences: Vec::new(),
        }
    }

    /// Append an occurrence.
    pub fn add_item(&mut self, occurrence: AmiOccurrence) {
        self.occurrences.push(occurrence);
    }
}

/// The versioned document written by `amitrace scan`.
///
/// # Examples
///
/// ```
/// use amitrace_core::OccurrenceLog;
///
/// let log = OccurrenceLog::from_json("[]").unwrap();
/// assert_eq!(log.schema_version, 1);
/// assert!(log.images.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OccurrenceLog {
    /// Always [`SCHEMA_VERSION`] when written by this version.
    pub schema_version: u32,
    /// Repository that was scanned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// Tracked images in input order.
    pub images: Vec<AmiNameAndData>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogRepr {
    Versioned(OccurrenceLog),
    Legacy(Vec<AmiNameAndData>),
}

impl OccurrenceLog {
    /// Wrap images in a current-version document.
    pub fn new(repo_name: Option<String>, images: Vec<AmiNameAndData>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            repo_name,
            images,
        }
    }

    /// Parse and validate a log, accepting the legacy bare-array shape.
    ///
    /// # Errors
    ///
    /// Returns [`AmitraceError::Serialization`] for malformed JSON and
    /// [`AmitraceError::Schema`] when validation fails.
    pub fn from_json(content: &str) -> Result<Self, AmitraceError> {
        let mut log = match serde_json::from_str::<LogRepr>(content)? {
            LogRepr::Versioned(log) => log,
            LogRepr::Legacy(images) => Self::new(None, images),
        };
        log.normalize();
        log.validate()?;
        Ok(log)
    }

    /// Read and validate a log file.
    pub fn read_from(path: &Path) -> Result<Self, AmitraceError> {
        if !path.exists() {
            return Err(AmitraceError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, AmitraceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the log as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), AmitraceError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Check structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`AmitraceError::Schema`] describing the first violation.
    pub fn validate(&self) -> Result<(), AmitraceError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(AmitraceError::Schema(format!(
                "unsupported schema version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        for (i, image) in self.images.iter().enumerate() {
            if image.name.trim().is_empty() {
                return Err(AmitraceError::Schema(format!("image #{i} has an empty name")));
            }
            if image.converted_date > image.creation_date {
                return Err(AmitraceError::Schema(format!(
                    "image {}: converted date is after creation date",
                    image.name
                )));
            }
            for occ in &image.occurrences {
                if !occ.is_addition() && !occ.is_removal() {
                    return Err(AmitraceError::Schema(format!(
                        "image {}: occurrence in {} at commit {} is neither an addition nor a removal",
                        image.name, occ.file_path_and_name, occ.commit_hash
                    )));
                }
            }
        }
        Ok(())
    }

    // Legacy logs encode "never" as the zero time.
    fn normalize(&mut self) {
        for image in &mut self.images {
            if image.last_used_date.is_some_and(|d| d.year() <= 1) {
                image.last_used_date = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn image() -> AmiNameAndData {
        let mut img = AmiNameAndData::new(
            "base-image-2024",
            "ami-0123456789abcdef0",
            date("2024-01-10T00:00:00Z"),
            date("2024-01-09T00:00:00Z"),
        );
        img.add_item(AmiOccurrence {
            file_path_and_name: "main.tf".into(),
            line: "+  ami = \"base-image-2024\"".into(),
            line_index: 4,
            section_index: 0,
            commit_hash: "c0ffee".into(),
            commit_date: date("2024-02-01T12:00:00+01:00"),
            repo_name: "infra".into(),
        });
        img
    }

    #[test]
    fn writes_pascal_case_fields() {
        let log = OccurrenceLog::new(Some("infra".into()), vec![image()]);
        let json = log.to_json_pretty().unwrap();
        assert!(json.contains("\"SchemaVersion\": 1"));
        assert!(json.contains("\"FilePathAndName\": \"main.tf\""));
        assert!(json.contains("\"Status\": \"Unknown\""));
        let back = OccurrenceLog::from_json(&json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn reads_legacy_array_with_zero_time() {
        let json = r#"[{
            "Name": "old-image",
            "ImageId": "ami-1",
            "CreationDate": "2023-03-01T00:00:00Z",
            "ConvertedDate": "2023-02-28T00:00:00Z",
            "Status": 2,
            "LastUsedDate": "0001-01-01T00:00:00Z",
            "Occurrences": null
        }]"#;
        let log = OccurrenceLog::from_json(json).unwrap();
        assert_eq!(log.images.len(), 1);
        assert_eq!(log.images[0].status, ImageStatus::NeverUsed);
        assert!(log.images[0].last_used_date.is_none());
        assert!(log.repo_name.is_none());
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let json = r#"{"SchemaVersion": 7, "Images": []}"#;
        let err = OccurrenceLog::from_json(json).unwrap_err();
        assert!(matches!(err, AmitraceError::Schema(_)));
    }

    #[test]
    fn rejects_context_line_occurrence() {
        let mut img = image();
        img.occurrences[0].line = " unchanged".into();
        let log = OccurrenceLog::new(None, vec![img]);
        assert!(matches!(log.validate(), Err(AmitraceError::Schema(_))));
    }

    #[test]
    fn rejects_converted_after_creation() {
        let mut img = image();
        img.converted_date = date("2024-06-01T00:00:00Z");
        let log = OccurrenceLog::new(None, vec![img]);
        assert!(log.validate().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = OccurrenceLog::read_from(Path::new("/nonexistent/log.json")).unwrap_err();
        assert!(matches!(err, AmitraceError::FileNotFound(_)));
    }
}
