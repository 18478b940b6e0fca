//! Path substitutions - mapping logical search prefixes to on-disk roots
//!
//! Proto compiler invocations name their include roots with `-I` /
//! `--proto_path` flags, optionally as colon-separated `prefix=dir` lists.
//! This module parses those flags into the ordered substitution list the
//! virtual file system resolves through, and renders them back to flags so
//! an extraction is reproducible from its own argument echo.

use serde::{Deserialize, Serialize};

/// One ordered `(logical_prefix, physical_root)` pair.
///
/// An empty prefix matches unprefixed paths (a plain include root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSubstitution {
    /// Logical prefix a virtual path must start with
    pub prefix: String,
    /// On-disk root the prefix maps to
    pub path: String,
}

impl PathSubstitution {
    pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
        }
    }
}

/// Lexically clean a path: collapse redundant separators and `.` segments.
///
/// `..` segments are kept as-is; resolving them would change the symbolic
/// meaning of paths that cross symlinks.
pub fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let mut cleaned = String::new();
    if absolute {
        cleaned.push('/');
    }
    cleaned.push_str(&segments.join("/"));

    if cleaned.is_empty() {
        ".".to_string()
    } else {
        cleaned
    }
}

/// Join a root directory and a relative path, cleaning the result.
pub fn join_path(root: &str, rel: &str) -> String {
    if root.is_empty() {
        rel.to_string()
    } else if rel.is_empty() {
        root.to_string()
    } else {
        clean_path(&format!("{}/{}", root, rel))
    }
}

/// Make `path` relative to `base` if it lies under it; otherwise return it
/// unchanged. Both sides are cleaned before comparison.
pub fn relativize_path(path: &str, base: &str) -> String {
    let path = clean_path(path);
    if base.is_empty() || base == "." {
        return path;
    }
    let base = clean_path(base);
    if path == base {
        return ".".to_string();
    }
    match path.strip_prefix(&format!("{}/", base)) {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

// Splits one flag value: a colon-separated list of `dir` or `prefix=dir`.
fn add_path_substitutions(value: &str, substitutions: &mut Vec<PathSubstitution>) {
    for part in value.split(':').filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((prefix, dir)) => {
                substitutions.push(PathSubstitution::new(clean_path(prefix), clean_path(dir)));
            }
            None => {
                substitutions.push(PathSubstitution::new("", clean_path(part)));
            }
        }
    }
}

/// Parse include-path behavior from compiler-style arguments.
///
/// Supports the two-token forms `-I dir` / `--proto_path dir` and the
/// single-token forms `-Idir` / `--proto_path=dir`. If no substitution flags
/// are present but a working directory is known, a single identity
/// substitution mapping `""` to the cleaned working directory is synthesized
/// so every extraction has at least one resolvable root.
pub fn parse_path_substitutions(
    arguments: &[String],
    working_directory: Option<&str>,
) -> Vec<PathSubstitution> {
    let mut substitutions = Vec::new();
    let mut have_paths = false;
    let mut expecting_path_arg = false;

    for argument in arguments {
        if expecting_path_arg {
            expecting_path_arg = false;
            add_path_substitutions(argument, &mut substitutions);
            have_paths = true;
        } else if argument == "-I" || argument == "--proto_path" {
            expecting_path_arg = true;
        } else if let Some(value) = argument.strip_prefix("--proto_path=") {
            add_path_substitutions(value, &mut substitutions);
            have_paths = true;
        } else if let Some(value) = argument.strip_prefix("-I") {
            add_path_substitutions(value, &mut substitutions);
            have_paths = true;
        }
    }

    if !have_paths {
        if let Some(wd) = working_directory {
            if !wd.is_empty() {
                substitutions.push(PathSubstitution::new("", clean_path(wd)));
            }
        }
    }

    substitutions
}

/// Render substitutions back to `--proto_path=` flags.
///
/// Round-trips through [`parse_path_substitutions`], which is what makes the
/// argument echo in a compilation record reproducible.
pub fn substitutions_to_args(substitutions: &[PathSubstitution]) -> Vec<String> {
    substitutions
        .iter()
        .map(|sub| {
            if sub.prefix.is_empty() {
                format!("--proto_path={}", sub.path)
            } else {
                format!("--proto_path={}={}", sub.prefix, sub.path)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("a//b/./c"), "a/b/c");
        assert_eq!(clean_path("./a/b/"), "a/b");
        assert_eq!(clean_path("/x//y"), "/x/y");
        assert_eq!(clean_path("a/../b"), "a/../b"); // `..` untouched
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("."), ".");
    }

    #[test]
    fn test_relativize_path() {
        assert_eq!(relativize_path("/root/dir/a.proto", "/root/dir"), "a.proto");
        assert_eq!(relativize_path("/root/dir", "/root/dir"), ".");
        assert_eq!(relativize_path("/other/a.proto", "/root"), "/other/a.proto");
        assert_eq!(relativize_path("a/b.proto", ""), "a/b.proto");
        assert_eq!(relativize_path("a/b.proto", "."), "a/b.proto");
    }

    #[test]
    fn test_two_token_forms() {
        let subs = parse_path_substitutions(&args(&["-I", "foo", "--proto_path", "bar"]), None);
        assert_eq!(
            subs,
            vec![
                PathSubstitution::new("", "foo"),
                PathSubstitution::new("", "bar"),
            ]
        );
    }

    #[test]
    fn test_single_token_forms() {
        let subs =
            parse_path_substitutions(&args(&["-Ifoo//baz", "--proto_path=bar/./qux"]), None);
        assert_eq!(
            subs,
            vec![
                PathSubstitution::new("", "foo/baz"),
                PathSubstitution::new("", "bar/qux"),
            ]
        );
    }

    #[test]
    fn test_colon_list_with_prefixes() {
        let subs = parse_path_substitutions(&args(&["-Ivirt=real:plain::x=y/z"]), None);
        assert_eq!(
            subs,
            vec![
                PathSubstitution::new("virt", "real"),
                PathSubstitution::new("", "plain"),
                PathSubstitution::new("x", "y/z"),
            ]
        );
    }

    #[test]
    fn test_fallback_to_working_directory() {
        let subs = parse_path_substitutions(&args(&["a.proto"]), Some("/work//dir/"));
        assert_eq!(subs, vec![PathSubstitution::new("", "/work/dir")]);
    }

    #[test]
    fn test_no_fallback_when_paths_present() {
        let subs = parse_path_substitutions(&args(&["-I", "foo"]), Some("/work"));
        assert_eq!(subs, vec![PathSubstitution::new("", "foo")]);
    }

    #[test]
    fn test_args_roundtrip() {
        let subs = vec![
            PathSubstitution::new("virt", "/real/root"),
            PathSubstitution::new("", "include"),
        ];
        let rendered = substitutions_to_args(&subs);
        assert_eq!(
            rendered,
            vec!["--proto_path=virt=/real/root", "--proto_path=include"]
        );
        let reparsed = parse_path_substitutions(&rendered, None);
        assert_eq!(reparsed, subs);
    }
}
