use std::fmt;
use std::sync::OnceLock;

use amitrace_core::AmitraceError;

use crate::oid::ObjectId;
use crate::quote::unquote;
use crate::repository::Repository;

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// 100644
    Blob,
    /// 100755
    Exec,
    /// 120000
    Symlink,
    /// 160000, a submodule; never recursed into.
    Commit,
    /// 040000
    Tree,
}

impl EntryMode {
    /// Map a mode string. Unknown modes are a decode error.
    ///
    /// # Examples
    ///
    /// ```
    /// use amitrace_git::EntryMode;
    ///
    /// assert_eq!(EntryMode::parse("40000").unwrap(), EntryMode::Tree);
    /// assert_eq!(EntryMode::parse("040000").unwrap(), EntryMode::Tree);
    /// assert!(EntryMode::parse("100664").is_err());
    /// assert!(EntryMode::parse("40755").is_err());
    /// ```
    pub fn parse(mode: &str) -> Result<Self, AmitraceError> {
        match mode {
            "100644" => Ok(EntryMode::Blob),
            "100755" => Ok(EntryMode::Exec),
            "120000" => Ok(EntryMode::Symlink),
            "160000" => Ok(EntryMode::Commit),
            "40000" | "040000" => Ok(EntryMode::Tree),
            other => Err(AmitraceError::Decode(format!("unknown tree entry mode: {other}"))),
        }
    }

    /// Canonical octal form.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryMode::Blob => "100644",
            EntryMode::Exec => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Commit => "160000",
            EntryMode::Tree => "040000",
        }
    }

    pub fn is_tree(self) -> bool {
        self == EntryMode::Tree
    }

    pub fn is_submodule(self) -> bool {
        self == EntryMode::Commit
    }

    /// Regular or executable file.
    pub fn is_regular(self) -> bool {
        matches!(self, EntryMode::Blob | EntryMode::Exec)
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: EntryMode,
    pub id: ObjectId,
    /// Blob size, when known (`ls-tree -l`).
    pub size: Option<u64>,
}

/// Decode a raw tree object: `<mode> <name>\0<20-byte id>` repeated.
///
/// # Examples
///
/// ```
/// use amitrace_git::tree::decode_tree;
/// use amitrace_git::EntryMode;
///
/// let mut raw = b"100644 main.tf\0".to_vec();
/// raw.extend_from_slice(&[0xab; 20]);
/// let entries = decode_tree(&raw).unwrap();
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].name, "main.tf");
/// assert_eq!(entries[0].mode, EntryMode::Blob);
/// ```
pub fn decode_tree(data: &[u8]) -> Result<Vec<TreeEntry>, AmitraceError> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let space = data[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| AmitraceError::Decode("tree entry without mode separator".into()))?;
        let mode = std::str::from_utf8(&data[pos..pos + space])
            .map_err(|_| AmitraceError::Decode("tree entry mode is not ASCII".into()))?;
        let mode = EntryMode::parse(mode)?;
        pos += space + 1;

        let nul = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| AmitraceError::Decode("tree entry name is not terminated".into()))?;
        let name = String::from_utf8_lossy(&data[pos..pos + nul]).into_owned();
        pos += nul + 1;

        let id_bytes = data
            .get(pos..pos + ObjectId::LEN)
            .ok_or_else(|| AmitraceError::Decode(format!("tree entry {name} has a short id")))?;
        let id = ObjectId::from_bytes(id_bytes)?;
        pos += ObjectId::LEN;

        entries.push(TreeEntry {
            name,
            mode,
            id,
            size: None,
        });
    }
    Ok(entries)
}

/// Parse `git ls-tree -l` output: `<mode> <type> <sha> <size>\t<name>` per line.
///
/// Size is `-` for trees and submodules. Names may be C-quoted.
pub fn parse_ls_tree_long(text: &str) -> Result<Vec<TreeEntry>, AmitraceError> {
    let mut entries = Vec::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        let (meta, name) = line
            .split_once('\t')
            .ok_or_else(|| AmitraceError::Decode(format!("ls-tree line without tab: {line}")))?;
        let mut fields = meta.split_whitespace();
        let (Some(mode), Some(_kind), Some(sha), Some(size)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(AmitraceError::Decode(format!("malformed ls-tree line: {line}")));
        };
        let size = match size {
            "-" => None,
            s => Some(
                s.parse()
                    .map_err(|_| AmitraceError::Decode(format!("bad size in ls-tree line: {line}")))?,
            ),
        };
        entries.push(TreeEntry {
            name: unquote(name)?,
            mode: EntryMode::parse(mode)?,
            id: ObjectId::from_hex(sha)?,
            size,
        });
    }
    Ok(entries)
}

/// A tree whose entries are read on first use.
///
/// Once loaded the entry list never changes: tree ids are content hashes.
#[derive(Debug, Clone)]
pub struct Tree {
    pub id: ObjectId,
    entries: OnceLock<Vec<TreeEntry>>,
}

impl Tree {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            entries: OnceLock::new(),
        }
    }

    /// Wrap entries that were already decoded.
    pub fn with_entries(id: ObjectId, entries: Vec<TreeEntry>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(entries);
        Self { id, entries: cell }
    }

    /// Whether [`Tree::entries`] has already loaded.
    pub fn is_parsed(&self) -> bool {
        self.entries.get().is_some()
    }

    /// Entries in tree order, loading them through `repo` the first time.
    pub fn entries(&self, repo: &Repository) -> Result<&[TreeEntry], AmitraceError> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }
        let raw = repo.read_object_of_type(&self.id.to_hex(), crate::ObjectType::Tree)?;
        let _ = self.entries.set(decode_tree(&raw)?);
        self.entries
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| AmitraceError::Decode("tree entries failed to load".into()))
    }

    /// Walk every entry below this tree, with `/`-joined paths.
    ///
    /// Submodule entries are listed but never descended into.
    pub fn list_entries_recursive(
        &self,
        repo: &Repository,
    ) -> Result<Vec<(String, TreeEntry)>, AmitraceError> {
        let mut out = Vec::new();
        self.walk(repo, "", &mut out)?;
        Ok(out)
    }

    fn walk(
        &self,
        repo: &Repository,
        prefix: &str,
        out: &mut Vec<(String, TreeEntry)>,
    ) -> Result<(), AmitraceError> {
        for entry in self.entries(repo)? {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_tree() {
                Tree::new(entry.id).walk(repo, &path, out)?;
            }
            out.push((path, entry.clone()));
        }
        Ok(())
    }
}
