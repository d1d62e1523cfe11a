//! Read-only access to a local git repository through the `git` binary.
//!
//! Commands run with a fixed environment and a time budget, arguments from
//! user input are checked against option injection, and object lookups share
//! one long-lived `cat-file --batch` process per repository handle.

pub mod attributes;
pub mod batch;
pub mod command;
pub mod commit;
pub mod log;
pub mod object;
pub mod oid;
pub mod quote;
pub mod repository;
pub mod sanitize;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod version;
pub mod worktree;

pub use attributes::Attributes;
pub use batch::{BatchHeader, BatchKind};
pub use command::{GitCommand, RunOpts};
pub use commit::{Commit, GpgSignature};
pub use log::CommitInfo;
pub use object::ObjectType;
pub use oid::ObjectId;
pub use repository::Repository;
pub use signature::Signature;
pub use tag::Tag;
pub use tree::{EntryMode, Tree, TreeEntry};
pub use version::GitVersion;
