//! Unified diff parsing and annotation.
//!
//! [`parser`] turns `git diff` output into the [`model`] tree. [`diff`]
//! drives git to produce that output for two revisions and adds what the
//! text alone cannot say: vendored and generated flags, language, the
//! trailing context range and shortstat totals.

pub mod diff;
pub mod encoding;
pub mod model;
pub mod parser;
pub mod vendor;

pub use diff::{DiffEngine, DiffOptions, ShortStat};
pub use model::{Diff, DiffFile, DiffFileKind, DiffLine, DiffLineKind, DiffSection, SectionInfo};
pub use parser::{parse_patch, ParseLimits, PatchParser};
