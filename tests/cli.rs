use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn git(dir: &Path, args: &[&str], date: &str) {
    let status = Command::new("git")
        .args(["-c", "user.name=Test User", "-c", "user.email=test@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

fn commit_all(dir: &Path, message: &str, date: &str) {
    git(dir, &["add", "-A"], date);
    git(dir, &["commit", "-q", "-m", message], date);
}

fn infra_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    git(p, &["init", "-q"], "@1704067200 +0000");
    fs::write(p.join("README.md"), "infra\n").unwrap();
    commit_all(p, "baseline", "@1704067200 +0000");
    fs::write(p.join("main.tf"), "ami = \"web-2024-01\"\n").unwrap();
    commit_all(p, "adopt", "@1704844800 +0000");
    fs::write(p.join("main.tf"), "ami = \"web-2024-02\"\n").unwrap();
    commit_all(p, "upgrade", "@1707523200 +0000");
    fs::write(
        p.join("images.txt"),
        "ami-1, 2024-01-05T00:00:00Z, web-2024-01\nami-2, 2024-02-05T00:00:00Z, web-2024-02\nami-3, 2024-03-05T00:00:00Z, web-2024-03\n",
    )
    .unwrap();
    dir
}

fn amitrace(dir: &Path, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_amitrace"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "amitrace {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

#[test]
fn scan_writes_log_and_classify_reads_it() {
    let dir = infra_repo();
    let out = amitrace(dir.path(), &["scan", "--repo", ".", "--images", "images.txt", "--output", "log.json"]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Scanned 2 of 3 commits (0 skipped), 3 occurrences"), "{stdout}");

    let log = amitrace_core::OccurrenceLog::read_from(&dir.path().join("log.json")).unwrap();
    assert_eq!(log.images.len(), 3);
    assert_eq!(log.images[0].occurrences.len(), 2);

    let out = amitrace(dir.path(), &["classify", "--input", "log.json", "--worktree", ".", "--format", "json"]);
    let classified = amitrace_core::OccurrenceLog::from_json(&String::from_utf8_lossy(&out.stdout)).unwrap();
    let statuses: Vec<String> = classified.images.iter().map(|i| i.status.to_string()).collect();
    assert_eq!(statuses, ["NoLongerUsed", "InUse", "NeverUsed"]);
}

#[test]
fn scan_with_classify_prints_report() {
    let dir = infra_repo();
    let out = amitrace(
        dir.path(),
        &["scan", "--images", "images.txt", "--output", "log.json", "--classify", "--format", "markdown"],
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("| web-2024-01 | `ami-1` |"), "{stdout}");
    assert!(stdout.contains("3 images: 1 in use, 1 no longer used, 1 never used"), "{stdout}");
}

#[test]
fn diff_prints_json() {
    let dir = infra_repo();
    let out = amitrace(dir.path(), &["diff", "HEAD", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["num_files"], 1);
    assert_eq!(value["files"][0]["name"], "main.tf");
    assert_eq!(value["files"][0]["addition"], 1);
    assert_eq!(value["files"][0]["deletion"], 1);
}

#[test]
fn missing_image_list_fails() {
    let dir = infra_repo();
    let output = Command::new(env!("CARGO_BIN_EXE_amitrace"))
        .args(["scan", "--images", "nope.txt"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.txt"));
}
