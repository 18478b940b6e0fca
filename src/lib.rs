//! # Protoref - Proto/Textproto Cross-Reference Indexer
//!
//! Protoref turns Protocol-Buffer schemas and textproto instances into a
//! semantic cross-reference graph consumed by code search and navigation:
//!
//! - Compilation extraction: resolve the transitive import closure of
//!   top-level `.proto` files through a remappable virtual file system and
//!   produce a self-contained, content-addressed compilation record
//! - Textproto analysis: parse an instance against a dynamically loaded
//!   message descriptor and emit an anchor + reference edge for every field
//!   occurrence, linked to the schema symbol it refers to
//! - Stable identities (VNames) for files, anchors and schema elements

pub mod vname;
pub mod paths;
pub mod rules;
pub mod source_tree;
pub mod schema;
pub mod extractor;
pub mod line_index;
pub mod location;
pub mod recorder;
pub mod analyzer;

// Re-exports for convenient access
pub use vname::VName;
pub use paths::PathSubstitution;
pub use rules::VNameRules;
pub use source_tree::{PreloadedSourceTree, SourceTree};
pub use schema::SchemaPool;
pub use extractor::{CompilationRecord, ProtoExtractor};
pub use line_index::LineIndex;
pub use recorder::GraphRecorder;
pub use analyzer::TextprotoAnalyzer;

/// Result type alias for Protoref operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Protoref operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed identity-rule file or missing required input. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A logical path could not be resolved through any configured substitution.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The proto grammar rejected a `.proto` file.
    #[error("Import error: {0}")]
    Import(String),

    /// The requested fully-qualified message type is absent from the schema pool.
    #[error("Message type not found: {0}")]
    SchemaNotFound(String),

    /// The textproto instance does not parse against the resolved schema.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A parse-location lookup failed for a field known to be present.
    /// This is a defect in the indexer, not a recoverable condition.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
