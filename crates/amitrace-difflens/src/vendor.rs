//! Path-based vendored and generated file detection.
//!
//! Used when `.gitattributes` does not say either way.

use amitrace_core::DiffConfig;

const VENDORED_DIRS: &[&str] = &[
    "vendor",
    "vendors",
    "node_modules",
    "bower_components",
    "third_party",
    "third-party",
    ".terraform",
    "Carthage",
    "Pods",
];

const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "go.sum",
    "composer.lock",
    "poetry.lock",
    "Pipfile.lock",
    "Gemfile.lock",
    ".terraform.lock.hcl",
];

const GENERATED_SUFFIXES: &[&str] = &[
    ".pb.go",
    ".pb.rs",
    "_pb2.py",
    "_pb2_grpc.py",
    ".designer.cs",
    ".g.dart",
    ".nib",
    ".xcworkspacedata",
    ".xcuserstate",
];

/// Classifies paths as vendored or generated from built-in rules plus the
/// configured glob patterns.
///
/// # Examples
///
/// ```
/// use amitrace_difflens::vendor::PathClassifier;
///
/// let classifier = PathClassifier::default();
/// assert!(classifier.is_vendored("modules/vendor/aws/main.tf"));
/// assert!(classifier.is_generated("api/service.pb.go"));
/// assert!(!classifier.is_vendored("envs/prod/main.tf"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    vendored: Vec<glob::Pattern>,
    generated: Vec<glob::Pattern>,
}

impl PathClassifier {
    /// Invalid patterns are logged and skipped.
    pub fn from_config(config: &DiffConfig) -> Self {
        Self {
            vendored: compile(&config.vendored_patterns),
            generated: compile(&config.generated_patterns),
        }
    }

    pub fn is_vendored(&self, path: &str) -> bool {
        let file_name = file_name(path);
        if file_name.ends_with(".min.js") || file_name.ends_with(".min.css") {
            return true;
        }
        if path.split('/').any(|part| VENDORED_DIRS.contains(&part)) {
            return true;
        }
        if path.contains("Godeps/_workspace/") {
            return true;
        }
        self.vendored.iter().any(|p| p.matches(path))
    }

    pub fn is_generated(&self, path: &str) -> bool {
        let file_name = file_name(path);
        if LOCK_FILES.contains(&file_name) || file_name.contains(".generated.") {
            return true;
        }
        if GENERATED_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
            return true;
        }
        self.generated.iter().any(|p| p.matches(path))
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn compile(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|pat| match glob::Pattern::new(pat) {
            Ok(p) => Some(p),
            Err(err) => {
                tracing::warn!(pattern = %pat, error = %err, "ignoring invalid glob pattern");
                None
            }
        })
        .collect()
}
