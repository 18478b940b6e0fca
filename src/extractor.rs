//! Compilation extraction - one self-contained record per set of protos
//!
//! Given one or more top-level `.proto` files, the extractor resolves their
//! full transitive import closure through a recording source tree,
//! content-addresses every file opened along the way, and produces a
//! compilation record that downstream indexers can replay without access to
//! the original file system.

use crate::paths::{relativize_path, substitutions_to_args, PathSubstitution};
use crate::rules::VNameRules;
use crate::schema;
use crate::source_tree::SourceTree;
use crate::vname::VName;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Path and content digest of one required input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub digest: String,
}

/// One file in the transitive closure of a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredInput {
    pub v_name: VName,
    pub info: FileInfo,
}

/// Self-contained description of one build input.
///
/// `required_input` contains exactly the transitive closure of files opened
/// while resolving `source_files`, each listed once (deduplicated by
/// canonical on-disk path), in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationRecord {
    pub working_directory: String,
    pub arguments: Vec<String>,
    pub source_files: Vec<String>,
    #[serde(rename = "required_input")]
    pub required_inputs: Vec<RequiredInput>,
}

/// Environment variable naming the fallback corpus.
pub const ENV_CORPUS: &str = "PROTOREF_CORPUS";
/// Environment variable naming the directory recorded paths are relative to.
pub const ENV_ROOT_DIRECTORY: &str = "PROTOREF_ROOT_DIRECTORY";
/// Environment variable naming the identity-rule configuration file.
pub const ENV_VNAME_RULES: &str = "PROTOREF_VNAMES";

/// Drives dependency resolution, identity assignment and content digesting
/// for one extraction.
#[derive(Debug, Default)]
pub struct ProtoExtractor {
    /// Fallback corpus for files whose identity rule leaves corpus empty
    pub corpus: String,
    /// All recorded paths are relativized against this directory
    pub root_directory: String,
    /// Identity rules mapping file paths to VNames
    pub rules: VNameRules,
    /// Include-path substitutions, tried in order
    pub substitutions: Vec<PathSubstitution>,
}

impl ProtoExtractor {
    /// Configure corpus, root directory and identity rules from the process
    /// environment. All three are optional: the fallbacks are an empty
    /// corpus, the current directory, and no rules. A rules file that is
    /// present but malformed is fatal.
    pub fn from_env() -> Result<Self> {
        let mut extractor = Self {
            root_directory: ".".to_string(),
            ..Self::default()
        };

        if let Ok(corpus) = std::env::var(ENV_CORPUS) {
            extractor.corpus = corpus;
        }
        if let Ok(root) = std::env::var(ENV_ROOT_DIRECTORY) {
            extractor.root_directory = root;
        }
        if let Ok(rules_path) = std::env::var(ENV_VNAME_RULES) {
            if !rules_path.is_empty() {
                extractor.rules = VNameRules::from_file(&rules_path)?;
            }
        }

        Ok(extractor)
    }

    /// Produce one compilation record for a set of top-level `.proto` files.
    ///
    /// Any unresolvable import, unreadable file, or digesting failure is
    /// fatal to the whole extraction; there is no partial record.
    pub fn extract(&self, proto_files: &[String]) -> Result<CompilationRecord> {
        let working_directory = std::env::current_dir()?
            .to_string_lossy()
            .into_owned();

        // Echo the input filenames, then (if any non-trivial substitutions
        // exist) a literal `--` and the substitution flags, so the record's
        // arguments alone can reproduce this resolution.
        let mut arguments: Vec<String> = proto_files.to_vec();
        if !self.substitutions.is_empty() {
            arguments.push("--".to_string());
            arguments.extend(substitutions_to_args(&self.substitutions));
        }

        // The current directory itself is always a resolvable root.
        let mut substitutions = vec![PathSubstitution::new("", "")];
        substitutions.extend(self.substitutions.iter().cloned());
        let tree = SourceTree::new(substitutions);

        // Import each top-level proto with an independent compiler instance
        // (shared transitive dependencies would be double-registered
        // otherwise); this populates the tree's opened-file record.
        let mut source_files = Vec::with_capacity(proto_files.len());
        for file in proto_files {
            schema::compile_file(tree.clone(), file)?;
            source_files.push(relativize_path(file, &self.root_directory));
        }

        // Every canonical path opened during the imports becomes one
        // required input, in the record's sorted order.
        let mut required_inputs = Vec::new();
        for canonical in tree.opened_files() {
            let content = std::fs::read(&canonical)?;
            let digest = blake3::hash(&content).to_hex().to_string();

            let path = relativize_path(&canonical, &self.root_directory);
            let mut v_name = self.rules.lookup(&path);
            if v_name.corpus.is_empty() {
                v_name.corpus = self.corpus.clone();
            }

            required_inputs.push(RequiredInput {
                v_name,
                info: FileInfo { path, digest },
            });
        }

        tracing::info!(
            "extracted {} source file(s), {} required input(s)",
            source_files.len(),
            required_inputs.len()
        );

        Ok(CompilationRecord {
            working_directory,
            arguments,
            source_files,
            required_inputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    // a.proto imports b.proto; c.proto imports both again transitively.
    fn shared_dep_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b.proto",
            "syntax = \"proto2\";\npackage b;\nmessage B { optional int32 x = 1; }\n",
        );
        write(
            dir.path(),
            "a.proto",
            "syntax = \"proto2\";\npackage a;\nimport \"b.proto\";\n\
             message A { optional b.B b = 1; }\n",
        );
        write(
            dir.path(),
            "c.proto",
            "syntax = \"proto2\";\npackage c;\nimport \"a.proto\";\nimport \"b.proto\";\n\
             message C { optional a.A a = 1; optional b.B b = 2; }\n",
        );
        dir
    }

    fn extractor_for(dir: &Path) -> ProtoExtractor {
        ProtoExtractor {
            corpus: "testcorpus".to_string(),
            root_directory: dir.to_str().unwrap().to_string(),
            rules: VNameRules::default(),
            substitutions: vec![PathSubstitution::new("", dir.to_str().unwrap())],
        }
    }

    #[test]
    fn test_shared_dependency_listed_once() {
        let dir = shared_dep_tree();
        let extractor = extractor_for(dir.path());

        let record = extractor
            .extract(&["a.proto".to_string(), "c.proto".to_string()])
            .unwrap();

        // Closure is exactly {a, b, c}; b is reachable through both roots
        // but deduplicated by canonical path.
        let paths: Vec<&str> = record
            .required_inputs
            .iter()
            .map(|i| i.info.path.as_str())
            .collect();
        assert_eq!(paths, vec!["a.proto", "b.proto", "c.proto"]);
    }

    #[test]
    fn test_digests_match_content() {
        let dir = shared_dep_tree();
        let extractor = extractor_for(dir.path());
        let record = extractor.extract(&["a.proto".to_string()]).unwrap();

        for input in &record.required_inputs {
            let content = fs::read(dir.path().join(&input.info.path)).unwrap();
            assert_eq!(input.info.digest, blake3::hash(&content).to_hex().to_string());
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let dir = shared_dep_tree();
        let extractor = extractor_for(dir.path());
        let files = vec!["a.proto".to_string(), "c.proto".to_string()];

        let first = extractor.extract(&files).unwrap();
        let second = extractor.extract(&files).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_corpus_fallback_applied() {
        let dir = shared_dep_tree();
        let extractor = extractor_for(dir.path());
        let record = extractor.extract(&["a.proto".to_string()]).unwrap();

        for input in &record.required_inputs {
            assert_eq!(input.v_name.corpus, "testcorpus");
            assert_eq!(input.v_name.path, input.info.path);
        }
    }

    #[test]
    fn test_arguments_echo_substitutions() {
        let dir = shared_dep_tree();
        let extractor = extractor_for(dir.path());
        let record = extractor.extract(&["a.proto".to_string()]).unwrap();

        let dir_str = dir.path().to_str().unwrap();
        assert_eq!(
            record.arguments,
            vec![
                "a.proto".to_string(),
                "--".to_string(),
                format!("--proto_path={}", dir_str),
            ]
        );
        assert_eq!(record.source_files, vec!["a.proto".to_string()]);
    }

    #[test]
    fn test_no_separator_without_substitutions() {
        // With no configured substitutions the record must not grow a `--`.
        let dir = shared_dep_tree();
        let extractor = ProtoExtractor {
            corpus: String::new(),
            root_directory: String::new(),
            rules: VNameRules::default(),
            substitutions: Vec::new(),
        };
        // Resolution happens relative to the current directory here, so use
        // an absolute path to an import-free file to reach into the temp tree.
        let b = dir.path().join("b.proto").to_str().unwrap().to_string();
        let record = extractor.extract(&[b.clone()]).unwrap();
        assert_eq!(record.arguments, vec![b]);
    }

    #[test]
    fn test_unresolvable_import_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "broken.proto",
            "syntax = \"proto2\";\nimport \"missing.proto\";\n",
        );
        let extractor = extractor_for(dir.path());

        let result = extractor.extract(&["broken.proto".to_string()]);
        assert!(matches!(result, Err(crate::Error::Import(_))));
    }
}
