use amitrace_core::AmitraceError;
use chrono::{DateTime, FixedOffset};

use crate::oid::ObjectId;
use crate::signature::Signature;
use crate::tree::Tree;

/// A detached signature plus the exact bytes it signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpgSignature {
    pub signature: String,
    pub payload: String,
}

/// A decoded commit object.
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: ObjectId,
    pub tree: Tree,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    pub signature: Option<GpgSignature>,
}

impl Commit {
    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    pub fn author_date(&self) -> DateTime<FixedOffset> {
        self.author.when
    }
}

/// Decode the canonical text of a commit object.
///
/// Headers are `tree`, any number of `parent`, `author`, `committer`, and an
/// optional `gpgsig` whose continuation lines start with one space. A blank
/// line separates headers from the message. Unknown headers are skipped.
///
/// # Errors
///
/// Returns [`AmitraceError::Decode`] when a `tree` or `parent` id is not
/// valid hex, or when there is no `tree` header.
///
/// # Examples
///
/// ```
/// use amitrace_git::commit::decode_commit;
/// use amitrace_git::ObjectId;
///
/// let raw = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
/// author A <a@x> 1700000000 +0000\n\
/// committer A <a@x> 1700000000 +0000\n\
/// \n\
/// initial\n";
/// let commit = decode_commit(ObjectId::NULL, raw).unwrap();
/// assert_eq!(commit.tree.id, ObjectId::EMPTY_TREE);
/// assert!(commit.parents.is_empty());
/// assert_eq!(commit.message, "initial\n");
/// ```
pub fn decode_commit(id: ObjectId, data: &[u8]) -> Result<Commit, AmitraceError> {
    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = Signature::default();
    let mut committer = Signature::default();
    let mut payload: Vec<u8> = Vec::with_capacity(data.len());
    let mut signature: Vec<u8> = Vec::new();
    let mut message: Vec<u8> = Vec::new();
    let mut in_message = false;
    let mut in_sig = false;
    let mut in_other_header = false;

    for line in data.split_inclusive(|&b| b == b'\n') {
        if in_message {
            message.extend_from_slice(line);
            payload.extend_from_slice(line);
            continue;
        }

        if line.first() == Some(&b' ') {
            if in_sig {
                signature.extend_from_slice(&line[1..]);
                continue;
            }
            if in_other_header {
                payload.extend_from_slice(line);
                continue;
            }
        }
        in_sig = false;
        in_other_header = false;

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            in_message = true;
            payload.extend_from_slice(line);
            continue;
        }

        let (key, value) = match trimmed.iter().position(|&b| b == b' ') {
            Some(sp) => (&trimmed[..sp], &trimmed[sp + 1..]),
            None => (trimmed, &b""[..]),
        };
        match key {
            b"tree" => {
                tree = Some(parse_id(value, "tree")?);
                payload.extend_from_slice(line);
            }
            b"parent" => {
                parents.push(parse_id(value, "parent")?);
                payload.extend_from_slice(line);
            }
            b"author" => {
                author = Signature::decode(value);
                payload.extend_from_slice(line);
            }
            b"committer" => {
                committer = Signature::decode(value);
                payload.extend_from_slice(line);
            }
            b"gpgsig" | b"gpgsig-sha256" => {
                signature.extend_from_slice(value);
                signature.push(b'\n');
                in_sig = true;
            }
            _ => {
                payload.extend_from_slice(line);
                in_other_header = true;
            }
        }
    }

    let tree = tree.ok_or_else(|| AmitraceError::Decode(format!("commit {id} has no tree")))?;
    let signature = (!signature.is_empty()).then(|| GpgSignature {
        signature: String::from_utf8_lossy(&signature).into_owned(),
        payload: String::from_utf8_lossy(&payload).into_owned(),
    });

    Ok(Commit {
        id,
        tree: Tree::new(tree),
        parents,
        author,
        committer,
        message: String::from_utf8_lossy(&message).into_owned(),
        signature,
    })
}

fn parse_id(value: &[u8], what: &str) -> Result<ObjectId, AmitraceError> {
    std::str::from_utf8(value)
        .map_err(|_| AmitraceError::Decode(format!("{what} id is not ASCII")))
        .and_then(ObjectId::from_hex)
}
