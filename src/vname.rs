//! VName - Global, stable identity for every graph node
//!
//! A VName is the tuple `{corpus, root, path, signature, language}`. Two
//! VNames name the same node iff all five fields match. Files get VNames
//! from their resolved path (via the identity rules); schema elements and
//! anchors derive theirs from a file VName plus a signature suffix:
//!
//! - schema element: the structural path into the file, e.g. `4.0.2.1`
//! - anchor: the byte range, e.g. `@12:16`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable symbolic name for a node in the cross-reference graph.
///
/// Serves as the primary key for files, anchors and schema symbols. Within
/// one run, the same logical file always maps to the same VName.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VName {
    /// Namespace identifying which codebase this node belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub corpus: String,
    /// Corpus-relative root (e.g. a generated-files tree)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root: String,
    /// File path, relative to the corpus root
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Disambiguator within a file (structural path or `@start:end` range)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// Language tag (e.g. `protobuf`, `protobuf_textformat`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
}

impl VName {
    /// Create a VName naming a file
    pub fn for_file(corpus: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            corpus: corpus.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Return a copy with the given signature
    pub fn with_signature(&self, signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            ..self.clone()
        }
    }

    /// Return a copy with the given language tag
    pub fn with_language(&self, language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for VName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}#{}:{}",
            self.corpus, self.root, self.path, self.signature, self.language
        )
    }
}
