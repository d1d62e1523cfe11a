//! Core types, configuration, and error handling for amitrace.
//!
//! This crate provides the shared foundation used by the other crates:
//! - [`AmitraceError`]: unified error type using `thiserror`
//! - [`AmitraceConfig`]: configuration loaded from `.amitrace.toml`
//! - The occurrence log model: [`AmiOccurrence`], [`AmiNameAndData`],
//!   [`OccurrenceLog`], [`ImageStatus`]
//! - Shared enums: [`OutputFormat`], [`Whitespace`]

mod config;
mod error;
mod occurrence;
mod types;

pub use config::{AmitraceConfig, DiffConfig, EncodingConfig, GitConfig, ScanConfig};
pub use error::AmitraceError;
pub use occurrence::{AmiNameAndData, AmiOccurrence, OccurrenceLog, SCHEMA_VERSION};
pub use types::{ImageStatus, OutputFormat, Whitespace};

/// A convenience `Result` type for amitrace operations.
pub type Result<T> = std::result::Result<T, AmitraceError>;
