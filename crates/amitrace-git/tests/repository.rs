//! Integration tests against a scratch repository built with the real git binary.

use std::fs;
use std::path::Path;
use std::process::Command;

use amitrace_core::{AmitraceError, GitConfig};
use amitrace_git::batch::BatchKind;
use amitrace_git::{EntryMode, GitVersion, ObjectType, Repository};

const JAN_1: &str = "@1672531200 +0000";
const JAN_2: &str = "@1672617600 +0000";
const FEB_1: &str = "@1675209600 +0000";
const MAR_1: &str = "@1677628800 +0000";

fn git(dir: &Path, args: &[&str], date: &str) {
    let status = Command::new("git")
        .args(["-c", "user.name=Test User", "-c", "user.email=test@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .status()
        .expect("git runs");
    assert!(status.success(), "git {args:?} failed");
}

fn scratch_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    git(p, &["init", "-q"], JAN_1);
    git(p, &["symbolic-ref", "HEAD", "refs/heads/main"], JAN_1);
    fs::write(p.join("main.tf"), "a\nb\nc\n").unwrap();
    fs::create_dir(p.join("modules")).unwrap();
    fs::write(p.join("modules/vm.tf"), "ami = \"base\"\n").unwrap();
    git(p, &["add", "."], JAN_1);
    git(p, &["commit", "-q", "-m", "first"], JAN_1);
    git(p, &["tag", "-a", "v1", "-m", "release one"], JAN_2);
    fs::write(p.join("main.tf"), "a\nb\nc\nd").unwrap();
    git(p, &["commit", "-q", "-am", "second"], FEB_1);
    dir
}

fn open(dir: &Path) -> Repository {
    Repository::open(dir, GitConfig::default()).unwrap()
}

#[test]
fn head_commit_decodes() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    let head = repo.get_commit("HEAD").unwrap();
    assert_eq!(head.summary(), "second");
    assert_eq!(head.parent_count(), 1);
    assert_eq!(head.author.name, "Test User");
    assert_eq!(head.author_date().timestamp(), 1675209600);

    let again = repo.get_commit(&head.id.to_hex()).unwrap();
    assert_eq!(again.id, head.id);
}

#[test]
fn annotated_tag_is_followed_to_its_commit() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    let tagged = repo.get_commit("v1").unwrap();
    let first = repo.get_commit("HEAD~1").unwrap();
    assert_eq!(tagged.id, first.id);
    assert_eq!(tagged.message, "release one");
    assert_eq!(tagged.author.email, "test@example.com");
}

#[test]
fn missing_objects_do_not_break_the_session() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    for name in ["HEAD:nope.tf", "0000000000000000000000000000000000000001"] {
        let err = repo.get_commit(name).unwrap_err();
        assert!(err.is_not_exist(), "{name}: {err:?}");
    }
    // A blob is not a commit.
    assert!(repo.get_commit("HEAD:main.tf").unwrap_err().is_not_exist());
    assert_eq!(repo.get_commit("HEAD").unwrap().summary(), "second");
}

#[test]
fn blob_lines_are_counted_without_trailing_newline() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    assert_eq!(repo.blob_line_count("HEAD", "main.tf").unwrap(), 4);
    assert_eq!(repo.blob_line_count("HEAD~1", "main.tf").unwrap(), 3);
    match repo.blob_line_count("HEAD", "absent.tf").unwrap_err() {
        AmitraceError::NotExist { rel_path, .. } => assert_eq!(rel_path.as_deref(), Some("absent.tf")),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(repo.read_blob("HEAD~1", "main.tf").unwrap(), b"a\nb\nc\n");
}

#[test]
fn tree_walk_lists_nested_entries() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    let head = repo.get_commit("HEAD").unwrap();
    let entries = head.tree.list_entries_recursive(&repo).unwrap();
    let paths: Vec<_> = entries.iter().map(|(p, _)| p.as_str()).collect();
    assert!(paths.contains(&"main.tf"));
    assert!(paths.contains(&"modules"));
    assert!(paths.contains(&"modules/vm.tf"));
    assert!(head.tree.is_parsed());

    let listed = repo.ls_tree_long("HEAD", None).unwrap();
    let main = listed.iter().find(|e| e.name == "main.tf").unwrap();
    assert_eq!(main.size, Some(7));
    let modules = listed.iter().find(|e| e.name == "modules").unwrap();
    assert_eq!(modules.mode, EntryMode::Tree);
}

#[test]
fn nested_batch_use_opens_a_temporary_session() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    let inner = repo
        .with_batch(BatchKind::Content, |outer| {
            let header = outer.request("HEAD")?;
            // The shared session is mid-response here.
            let nested = repo.object_header("HEAD:main.tf")?;
            let content = repo.read_object_of_type("HEAD:main.tf", ObjectType::Blob)?;
            outer.skip_content(&header)?;
            Ok((nested.kind, content))
        })
        .unwrap();
    assert_eq!(inner.0, ObjectType::Blob);
    assert_eq!(inner.1, b"a\nb\nc\nd");
}

#[test]
fn rev_parse_rejects_option_like_revisions() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    assert!(matches!(
        repo.rev_parse_verify("--all"),
        Err(AmitraceError::BrokenCommand { .. })
    ));
    assert!(repo.rev_parse_verify("no-such-branch").unwrap_err().is_not_exist());
    assert!(repo.rev_parse_verify("main").is_ok());
}

#[test]
fn commits_are_listed_oldest_first() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    let commits = amitrace_git::log::list_commits(&repo, None, None).unwrap();
    assert_eq!(commits.len(), 2);
    assert!(commits[0].date < commits[1].date);
    assert_eq!(commits[1].id, repo.rev_parse_verify("HEAD").unwrap());
}

#[test]
fn attributes_come_from_the_revision() {
    let dir = scratch_repo();
    let p = dir.path();
    fs::write(
        p.join(".gitattributes"),
        "modules/** linguist-vendored\n*.tf linguist-language=HCL\n",
    )
    .unwrap();
    git(p, &["add", ".gitattributes"], MAR_1);
    git(p, &["commit", "-q", "-m", "attrs"], MAR_1);

    let repo = open(p);
    let paths = vec!["modules/vm.tf".to_string(), "main.tf".to_string()];
    let attrs = amitrace_git::attributes::check_attributes(&repo, "HEAD", &paths).unwrap();
    assert_eq!(attrs["modules/vm.tf"].vendored, Some(true));
    assert_eq!(attrs["main.tf"].vendored, None);
    assert_eq!(attrs["main.tf"].language.as_deref(), Some("HCL"));
}

#[test]
fn version_is_detected_once() {
    let dir = scratch_repo();
    let repo = open(dir.path());
    let v = repo.version().unwrap();
    assert!(v >= GitVersion::new(2, 0, 0));
    assert_eq!(repo.version().unwrap(), v);
}
