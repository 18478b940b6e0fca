//! Source trees - virtual file systems the proto compiler reads through
//!
//! Two variants share one contract (serve content by logical path, expose
//! the canonical resolution):
//!
//! - [`SourceTree`]: disk-backed, resolves logical paths through ordered
//!   prefix substitutions and records the canonical path of every file it
//!   actually opens. The record is what turns "import the top-level protos"
//!   into "the exact transitive closure of this compilation".
//! - [`PreloadedSourceTree`]: pre-populated with exact `(path, content)`
//!   pairs for files delivered out-of-band (e.g. from a compilation record),
//!   never touching disk.
//!
//! Both implement `protox::file::FileResolver`, so a compiler instance reads
//! all imports through them.

use crate::paths::{clean_path, join_path, PathSubstitution};
use crate::{Error, Result};
use protox::file::{File, FileResolver};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct SourceTreeInner {
    substitutions: Vec<PathSubstitution>,
    // Canonical on-disk paths opened so far. BTreeSet keeps the record
    // deduplicated and sorted, which the compilation record's ordering
    // invariant depends on.
    opened: Mutex<BTreeSet<String>>,
}

/// Disk-backed source tree that records every file it opens.
///
/// Cloning is cheap and clones share the opened-file record, so one tree can
/// back several independent compiler instances within a single extraction.
#[derive(Debug, Clone)]
pub struct SourceTree {
    inner: Arc<SourceTreeInner>,
}

impl SourceTree {
    /// Create a tree resolving through the given substitutions, in order.
    pub fn new(substitutions: Vec<PathSubstitution>) -> Self {
        Self {
            inner: Arc::new(SourceTreeInner {
                substitutions,
                opened: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    /// Resolve a logical path to its canonical on-disk path without opening.
    ///
    /// Substitutions are tried in the order supplied; the first one whose
    /// mapped candidate exists on disk wins.
    pub fn canonical_path(&self, logical: &str) -> Result<String> {
        for sub in &self.inner.substitutions {
            let remainder = if sub.prefix.is_empty() {
                Some(logical)
            } else if logical == sub.prefix {
                Some("")
            } else {
                logical.strip_prefix(&format!("{}/", sub.prefix))
            };

            if let Some(rest) = remainder {
                let candidate = join_path(&sub.path, rest);
                if Path::new(&candidate).is_file() {
                    return Ok(clean_path(&candidate));
                }
            }
        }

        Err(Error::Resolution(format!(
            "no substitution resolves {:?} to an existing file",
            logical
        )))
    }

    /// Open a logical path, recording its canonical path on first success.
    ///
    /// The same file opened again through a different logical alias is not
    /// recorded twice.
    pub fn open(&self, logical: &str) -> Result<String> {
        let canonical = self.canonical_path(logical)?;
        let content = std::fs::read_to_string(&canonical)?;

        let mut opened = self
            .inner
            .opened
            .lock()
            .map_err(|_| Error::Resolution("opened-file record poisoned".to_string()))?;
        if opened.insert(canonical.clone()) {
            tracing::debug!("opened {} (canonical {})", logical, canonical);
        }

        Ok(content)
    }

    /// Canonical paths of every file opened so far, in sorted order.
    pub fn opened_files(&self) -> Vec<String> {
        match self.inner.opened.lock() {
            Ok(opened) => opened.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl FileResolver for SourceTree {
    // Top-level files may be named by absolute paths; keep the logical name
    // exactly as supplied and let `open_file` resolve it.
    fn resolve_path(&self, path: &Path) -> Option<String> {
        Some(path.to_string_lossy().into_owned())
    }

    fn open_file(&self, name: &str) -> std::result::Result<File, protox::Error> {
        match self.open(name) {
            Ok(content) => File::from_source(name, &content),
            Err(err) => {
                tracing::debug!("resolver miss for {}: {}", name, err);
                Err(protox::Error::file_not_found(name))
            }
        }
    }
}

/// In-memory source tree pre-populated with exact file contents.
#[derive(Debug, Default, Clone)]
pub struct PreloadedSourceTree {
    files: HashMap<String, String>,
}

impl PreloadedSourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file. Re-registering the same path is an error; the caller
    /// delivered conflicting contents for one logical file.
    pub fn add_file(&mut self, path: impl Into<String>, content: impl Into<String>) -> Result<()> {
        let path = path.into();
        if self.files.contains_key(&path) {
            return Err(Error::Config(format!("duplicate file registered: {}", path)));
        }
        self.files.insert(path, content.into());
        Ok(())
    }

    /// Serve a registered file's content.
    pub fn open(&self, path: &str) -> Result<&str> {
        self.files
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| Error::Resolution(format!("file not registered: {}", path)))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

impl FileResolver for PreloadedSourceTree {
    fn open_file(&self, name: &str) -> std::result::Result<File, protox::Error> {
        match self.files.get(name) {
            Some(content) => File::from_source(name, content),
            None => Err(protox::Error::file_not_found(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolution_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(first.path(), "a.proto", "// first");
        write(second.path(), "a.proto", "// second");

        let tree = SourceTree::new(vec![
            PathSubstitution::new("", first.path().to_str().unwrap()),
            PathSubstitution::new("", second.path().to_str().unwrap()),
        ]);

        assert_eq!(tree.open("a.proto").unwrap(), "// first");
    }

    #[test]
    fn test_prefix_substitution() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "nested/b.proto", "// b");

        let tree = SourceTree::new(vec![PathSubstitution::new(
            "virt",
            root.path().to_str().unwrap(),
        )]);

        assert_eq!(tree.open("virt/nested/b.proto").unwrap(), "// b");
        // The prefix must match a whole component.
        assert!(tree.open("virtual/nested/b.proto").is_err());
    }

    #[test]
    fn test_aliases_recorded_once() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "a.proto", "// a");
        let root_str = root.path().to_str().unwrap();

        let tree = SourceTree::new(vec![
            PathSubstitution::new("", root_str),
            PathSubstitution::new("virt", root_str),
        ]);

        tree.open("a.proto").unwrap();
        tree.open("virt/a.proto").unwrap();

        let opened = tree.opened_files();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].ends_with("a.proto"));
    }

    #[test]
    fn test_opened_files_sorted() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "z.proto", "");
        write(root.path(), "a.proto", "");
        let tree = SourceTree::new(vec![PathSubstitution::new(
            "",
            root.path().to_str().unwrap(),
        )]);

        tree.open("z.proto").unwrap();
        tree.open("a.proto").unwrap();

        let opened = tree.opened_files();
        assert_eq!(opened.len(), 2);
        assert!(opened[0] < opened[1]);
    }

    #[test]
    fn test_unresolvable_path() {
        let tree = SourceTree::new(vec![PathSubstitution::new("", "/nonexistent-root")]);
        assert!(matches!(tree.open("a.proto"), Err(Error::Resolution(_))));
    }

    #[test]
    fn test_clones_share_record() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "a.proto", "");
        let tree = SourceTree::new(vec![PathSubstitution::new(
            "",
            root.path().to_str().unwrap(),
        )]);

        tree.clone().open("a.proto").unwrap();
        assert_eq!(tree.opened_files().len(), 1);
    }

    #[test]
    fn test_preloaded_tree() {
        let mut tree = PreloadedSourceTree::new();
        tree.add_file("x.proto", "syntax = \"proto3\";").unwrap();

        assert!(tree.contains("x.proto"));
        assert_eq!(tree.open("x.proto").unwrap(), "syntax = \"proto3\";");
        assert!(tree.add_file("x.proto", "other").is_err());
        assert!(matches!(tree.open("missing.proto"), Err(Error::Resolution(_))));
    }
}
