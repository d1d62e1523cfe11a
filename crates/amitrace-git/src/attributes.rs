use std::collections::HashMap;

use amitrace_core::AmitraceError;

use crate::repository::Repository;

/// Attributes queried for every diffed path.
pub const LINGUIST_ATTRIBUTES: [&str; 4] = [
    "linguist-vendored",
    "linguist-generated",
    "linguist-language",
    "gitlab-language",
];

/// What `.gitattributes` says about one path.
///
/// `None` means the attribute is unspecified and detection should fall back
/// to path heuristics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub vendored: Option<bool>,
    pub generated: Option<bool>,
    pub language: Option<String>,
}

impl Attributes {
    fn apply(&mut self, attr: &str, value: &str) {
        match attr {
            "linguist-vendored" => self.vendored = flag(value),
            "linguist-generated" => self.generated = flag(value),
            "linguist-language" => {
                if let Some(lang) = language(value) {
                    self.language = Some(lang);
                }
            }
            // Only a fallback for linguist-language.
            "gitlab-language" => {
                if self.language.is_none() {
                    self.language = language(value);
                }
            }
            _ => {}
        }
    }
}

fn flag(value: &str) -> Option<bool> {
    match value {
        "set" | "true" => Some(true),
        "unset" | "false" => Some(false),
        _ => None,
    }
}

fn language(value: &str) -> Option<String> {
    match value {
        "" | "unspecified" | "set" | "unset" => None,
        lang => Some(lang.to_string()),
    }
}

/// Parse `git check-attr -z` output: `path\0attr\0value\0` repeated.
///
/// # Examples
///
/// ```
/// use amitrace_git::attributes::parse_check_attr_output;
///
/// let raw = b"vendor/x.js\0linguist-vendored\0set\0vendor/x.js\0linguist-language\0unspecified\0";
/// let attrs = parse_check_attr_output(raw).unwrap();
/// assert_eq!(attrs["vendor/x.js"].vendored, Some(true));
/// assert_eq!(attrs["vendor/x.js"].language, None);
/// ```
pub fn parse_check_attr_output(raw: &[u8]) -> Result<HashMap<String, Attributes>, AmitraceError> {
    let mut fields = raw.split(|&b| b == 0);
    let mut out: HashMap<String, Attributes> = HashMap::new();
    loop {
        let Some(path) = fields.next() else { break };
        if path.is_empty() {
            break;
        }
        let (Some(attr), Some(value)) = (fields.next(), fields.next()) else {
            return Err(AmitraceError::Parse(format!(
                "truncated check-attr record for {}",
                String::from_utf8_lossy(path)
            )));
        };
        let path = String::from_utf8_lossy(path).into_owned();
        out.entry(path)
            .or_default()
            .apply(&String::from_utf8_lossy(attr), &String::from_utf8_lossy(value));
    }
    Ok(out)
}

/// Look up [`LINGUIST_ATTRIBUTES`] for `paths` as of `treeish`.
///
/// The tree is loaded into a throwaway index so that attributes come from
/// the revision being diffed rather than from the working tree.
pub fn check_attributes(
    repo: &Repository,
    treeish: &str,
    paths: &[String],
) -> Result<HashMap<String, Attributes>, AmitraceError> {
    if paths.is_empty() {
        return Ok(HashMap::new());
    }

    let scratch = tempfile::tempdir()?;
    let index = scratch.path().join("index");
    let index_env = index.display().to_string();

    let mut read_tree = repo.command(&["read-tree"]);
    read_tree.add_dynamic_arguments(&[treeish]);
    read_tree.run(repo.run_opts().with_extra_env("GIT_INDEX_FILE", index_env.clone()))?;

    let mut stdin = Vec::new();
    for path in paths {
        stdin.extend_from_slice(path.as_bytes());
        stdin.push(0);
    }

    let mut check = repo.command(&["check-attr", "--stdin", "-z", "--cached"]);
    check.add_arguments(&LINGUIST_ATTRIBUTES);
    check.add_arguments(&["--"]);
    let out = check.run_std_bytes(
        repo.run_opts()
            .with_extra_env("GIT_INDEX_FILE", index_env)
            .with_extra_env("GIT_FLUSH", "1")
            .with_stdin(stdin),
    )?;
    let attrs = parse_check_attr_output(&out)?;
    tracing::debug!(target: "amitrace::git", treeish, paths = paths.len(), "checked attributes");
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, attr: &str, value: &str) -> Vec<u8> {
        format!("{path}\0{attr}\0{value}\0").into_bytes()
    }

    #[test]
    fn vendored_and_generated_flags() {
        let mut raw = record("a.js", "linguist-vendored", "false");
        raw.extend(record("a.js", "linguist-generated", "true"));
        raw.extend(record("b.js", "linguist-vendored", "unspecified"));
        let attrs = parse_check_attr_output(&raw).unwrap();
        assert_eq!(attrs["a.js"].vendored, Some(false));
        assert_eq!(attrs["a.js"].generated, Some(true));
        assert_eq!(attrs["b.js"], Attributes::default());
    }

    #[test]
    fn gitlab_language_is_a_fallback() {
        let mut raw = record("x.tmpl", "linguist-language", "unspecified");
        raw.extend(record("x.tmpl", "gitlab-language", "HCL"));
        raw.extend(record("y.tmpl", "linguist-language", "Go"));
        raw.extend(record("y.tmpl", "gitlab-language", "HCL"));
        let attrs = parse_check_attr_output(&raw).unwrap();
        assert_eq!(attrs["x.tmpl"].language.as_deref(), Some("HCL"));
        assert_eq!(attrs["y.tmpl"].language.as_deref(), Some("Go"));
    }

    #[test]
    fn truncated_record_is_an_error() {
        assert!(parse_check_attr_output(b"a.js\0linguist-vendored").is_err());
    }

    #[test]
    fn empty_output_is_empty_map() {
        assert!(parse_check_attr_output(b"").unwrap().is_empty());
    }
}
