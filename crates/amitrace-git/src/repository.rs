//! A handle on one local repository.
//!
//! The handle owns at most one shared `cat-file --batch` session and one
//! shared `--batch-check` session. Callers never see them directly: they go
//! through [`Repository::with_batch`], which guarantees that no two requests
//! interleave on the same pipe.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};

use amitrace_core::{AmitraceError, GitConfig};

use crate::batch::{count_lines, BatchHeader, BatchKind, BatchSession};
use crate::command::{GitCommand, RunOpts};
use crate::commit::{decode_commit, Commit};
use crate::object::ObjectType;
use crate::oid::ObjectId;
use crate::tag::{decode_tag, Tag};
use crate::tree::{parse_ls_tree_long, Tree, TreeEntry};
use crate::version::GitVersion;

/// An opened repository.
///
/// # Examples
///
/// ```no_run
/// use amitrace_core::GitConfig;
/// use amitrace_git::Repository;
///
/// let repo = Repository::open(".", GitConfig::default()).unwrap();
/// let head = repo.get_commit("HEAD").unwrap();
/// println!("{} {}", head.id.short(8), head.summary());
/// ```
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    git_dir: PathBuf,
    config: GitConfig,
    batch: Mutex<Option<BatchSession>>,
    batch_check: Mutex<Option<BatchSession>>,
    commits: Mutex<HashMap<ObjectId, Commit>>,
    version: OnceLock<GitVersion>,
}

enum Fetched {
    Commit(Commit),
    Tag(Tag),
}

impl Repository {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// [`AmitraceError::Git`] when `git rev-parse --git-dir` fails there.
    pub fn open(path: impl AsRef<Path>, config: GitConfig) -> Result<Self, AmitraceError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(AmitraceError::FileNotFound(path));
        }
        let out = GitCommand::new(&config, &["rev-parse", "--git-dir"])
            .run_std_string(RunOpts::in_dir(&path))?;
        let git_dir = path.join(out.trim());
        tracing::debug!(target: "amitrace::git", repo = %path.display(), git_dir = %git_dir.display(), "opened repository");
        Ok(Self {
            path,
            git_dir,
            config,
            batch: Mutex::new(None),
            batch_check: Mutex::new(None),
            commits: Mutex::new(HashMap::new()),
            version: OnceLock::new(),
        })
    }

    /// Working directory the handle was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn config(&self) -> &GitConfig {
        &self.config
    }

    /// Start a git command bound to this repository's configuration.
    pub fn command(&self, args: &[&str]) -> GitCommand {
        GitCommand::new(&self.config, args)
    }

    /// Run options with the working directory set to the repository.
    pub fn run_opts(&self) -> RunOpts<'_> {
        RunOpts::in_dir(&self.path)
    }

    /// Installed git version, detected once per handle.
    pub fn version(&self) -> Result<GitVersion, AmitraceError> {
        if let Some(v) = self.version.get() {
            return Ok(*v);
        }
        let detected = GitVersion::detect(&self.config)?;
        let _ = self.version.set(detected);
        Ok(detected)
    }

    /// Resolve `rev` with `git rev-parse --verify`.
    ///
    /// Any failure to resolve is reported as [`AmitraceError::NotExist`].
    pub fn rev_parse_verify(&self, rev: &str) -> Result<ObjectId, AmitraceError> {
        let mut cmd = self.command(&["rev-parse", "--verify"]);
        cmd.add_dynamic_arguments(&[rev]);
        match cmd.run_std_string(self.run_opts()) {
            Ok(out) => ObjectId::from_hex(out.trim()),
            Err(AmitraceError::Git(_)) => Err(AmitraceError::not_exist(rev)),
            Err(err) => Err(err),
        }
    }

    /// Run `f` against a batch session of `kind`.
    ///
    /// The shared session is used whenever it is free. If another caller
    /// holds it, a temporary session is opened for this call and closed
    /// afterwards. A shared session is reset after any error other than
    /// [`AmitraceError::NotExist`], since the stream may no longer be aligned
    /// on a response boundary.
    pub fn with_batch<T, F>(&self, kind: BatchKind, f: F) -> Result<T, AmitraceError>
    where
        F: FnOnce(&mut BatchSession) -> Result<T, AmitraceError>,
    {
        let slot = match kind {
            BatchKind::Content => &self.batch,
            BatchKind::Check => &self.batch_check,
        };
        let guard = match slot.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => {
                let mut guard = poisoned.into_inner();
                *guard = None;
                guard
            }
            Err(TryLockError::WouldBlock) => {
                tracing::debug!(target: "amitrace::batch", ?kind, "shared session busy, opening a temporary one");
                let mut temp = BatchSession::open(&self.config, &self.path, kind)?;
                let result = f(&mut temp);
                temp.close();
                return result;
            }
        };
        self.run_shared(guard, kind, f)
    }

    fn run_shared<T, F>(
        &self,
        mut guard: MutexGuard<'_, Option<BatchSession>>,
        kind: BatchKind,
        f: F,
    ) -> Result<T, AmitraceError>
    where
        F: FnOnce(&mut BatchSession) -> Result<T, AmitraceError>,
    {
        if guard.as_ref().is_some_and(BatchSession::has_buffered) {
            tracing::warn!(target: "amitrace::batch", ?kind, "shared session had unread bytes, reopening");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(BatchSession::open(&self.config, &self.path, kind)?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(AmitraceError::Git("batch session failed to start".into()));
        };
        let result = f(session);
        if matches!(&result, Err(err) if !err.is_not_exist()) {
            *guard = None;
        }
        result
    }

    /// Look up a commit by id, ref or any revision expression.
    ///
    /// Annotated tags are followed to the commit they point at; the
    /// returned commit then carries the tag's message, tagger and signature.
    /// Plain commits are cached by id.
    pub fn get_commit(&self, rev: &str) -> Result<Commit, AmitraceError> {
        if let Ok(id) = ObjectId::from_hex(rev) {
            if let Some(cached) = self.cached_commit(&id) {
                return Ok(cached);
            }
        }

        let fetched = self
            .with_batch(BatchKind::Content, |session| {
                let header = session.request(rev)?;
                match header.kind {
                    ObjectType::Commit => {
                        let data = session.read_content(&header)?;
                        Ok(Fetched::Commit(decode_commit(header.id, &data)?))
                    }
                    ObjectType::Tag => {
                        let data = session.read_content(&header)?;
                        Ok(Fetched::Tag(decode_tag(&data)?))
                    }
                    _ => {
                        session.skip_content(&header)?;
                        Err(AmitraceError::not_exist(rev))
                    }
                }
            })
            .map_err(|err| eof_as_not_exist(err, rev))?;

        match fetched {
            Fetched::Commit(commit) => {
                self.commits_lock().insert(commit.id, commit.clone());
                Ok(commit)
            }
            Fetched::Tag(tag) => {
                let mut commit = self.get_commit(&tag.object.to_hex())?;
                commit.message = tag.message.trim().to_string();
                commit.author = tag.tagger;
                commit.signature = tag.signature;
                Ok(commit)
            }
        }
    }

    fn cached_commit(&self, id: &ObjectId) -> Option<Commit> {
        self.commits_lock().get(id).cloned()
    }

    fn commits_lock(&self) -> MutexGuard<'_, HashMap<ObjectId, Commit>> {
        self.commits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the raw content of `name`, which must be an object of `kind`.
    pub fn read_object_of_type(&self, name: &str, kind: ObjectType) -> Result<Vec<u8>, AmitraceError> {
        self.with_batch(BatchKind::Content, |session| {
            let header = session.request(name)?;
            if header.kind != kind {
                session.skip_content(&header)?;
                return Err(AmitraceError::Decode(format!(
                    "{name} is a {}, expected a {kind}",
                    header.kind
                )));
            }
            session.read_content(&header)
        })
        .map_err(|err| eof_as_not_exist(err, name))
    }

    /// Type and size of `name` without reading its content.
    pub fn object_header(&self, name: &str) -> Result<BatchHeader, AmitraceError> {
        self.with_batch(BatchKind::Check, |session| session.request(name))
            .map_err(|err| eof_as_not_exist(err, name))
    }

    /// Content of the blob at `rev:path`.
    pub fn read_blob(&self, rev: &str, path: &str) -> Result<Vec<u8>, AmitraceError> {
        self.read_object_of_type(&format!("{rev}:{path}"), ObjectType::Blob)
            .map_err(|err| with_rel_path(err, rev, path))
    }

    /// Number of lines in the blob at `rev:path`.
    ///
    /// The blob is streamed, never held in memory whole.
    pub fn blob_line_count(&self, rev: &str, path: &str) -> Result<usize, AmitraceError> {
        let name = format!("{rev}:{path}");
        self.with_batch(BatchKind::Content, |session| {
            let header = session.request(&name)?;
            if header.kind != ObjectType::Blob {
                session.skip_content(&header)?;
                return Err(AmitraceError::not_exist(&name));
            }
            let reader = session.blob_reader(&header)?;
            count_lines(reader)
        })
        .map_err(|err| with_rel_path(eof_as_not_exist(err, &name), rev, path))
    }

    /// A lazily loaded tree.
    pub fn get_tree(&self, id: ObjectId) -> Tree {
        Tree::new(id)
    }

    /// Entries listed by `git ls-tree -l <rev> [-- <path>]`.
    pub fn ls_tree_long(&self, rev: &str, path: Option<&str>) -> Result<Vec<TreeEntry>, AmitraceError> {
        let mut cmd = self.command(&["ls-tree", "-l"]);
        cmd.add_dynamic_arguments(&[rev]);
        if let Some(path) = path {
            cmd.add_dashes_and_list(&[path]);
        }
        let out = cmd.run_std_string(self.run_opts())?;
        parse_ls_tree_long(&out)
    }

    /// Stop the shared batch sessions. Later lookups reopen them.
    pub fn close(&self) {
        for slot in [&self.batch, &self.batch_check] {
            let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(session) = guard.take() {
                session.close();
            }
        }
    }
}

fn eof_as_not_exist(err: AmitraceError, name: &str) -> AmitraceError {
    match err {
        AmitraceError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
            AmitraceError::not_exist(name)
        }
        other => other,
    }
}

fn with_rel_path(err: AmitraceError, rev: &str, path: &str) -> AmitraceError {
    match err {
        AmitraceError::NotExist { .. } => AmitraceError::NotExist {
            id: rev.to_string(),
            rel_path: Some(path.to_string()),
        },
        other => other,
    }
}
