//! Identity rules - configurable mapping from file paths to VNames
//!
//! Rules are supplied as a JSON array of `{pattern, vname}` objects. The
//! pattern is a regular expression that must match the whole path; the vname
//! templates may splice in capture groups with `@N@`:
//!
//! ```json
//! [
//!   {
//!     "pattern": "third_party/([^/]+)/(.*\\.proto)",
//!     "vname": { "corpus": "third_party", "root": "@1@", "path": "@2@" }
//!   }
//! ]
//! ```
//!
//! Rules are tried in order; the first whole-path match wins. When nothing
//! matches, the lookup returns a default VName with an empty corpus and the
//! input path, and the caller decides the fallback corpus.

use crate::vname::VName;
use crate::{Error, Result};
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawRule {
    pattern: String,
    vname: RawVNameTemplate,
}

#[derive(Debug, Default, Deserialize)]
struct RawVNameTemplate {
    #[serde(default)]
    corpus: String,
    #[serde(default)]
    root: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug)]
struct Rule {
    pattern: Regex,
    corpus: String,
    root: String,
    path: String,
}

/// Ordered table of path-pattern -> VName-template rules.
#[derive(Debug, Default)]
pub struct VNameRules {
    rules: Vec<Rule>,
}

impl VNameRules {
    /// Parse rules from JSON. Malformed JSON or an invalid pattern is a
    /// configuration error; rule loading happens once at process start and
    /// failures there are fatal.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawRule> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid vname rules: {}", e)))?;

        let mut rules = Vec::with_capacity(raw.len());
        for rule in raw {
            // Anchor so the pattern must cover the whole path.
            let anchored = format!("^(?:{})$", rule.pattern);
            let pattern = Regex::new(&anchored).map_err(|e| {
                Error::Config(format!("invalid vname rule pattern {:?}: {}", rule.pattern, e))
            })?;
            rules.push(Rule {
                pattern,
                corpus: rule.vname.corpus,
                root: rule.vname.root,
                path: rule.vname.path,
            });
        }

        Ok(Self { rules })
    }

    /// Load rules from a file on disk.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("can't read vname rules {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Map a file path to a VName.
    ///
    /// Applies the first matching rule's templates; if the resulting path is
    /// empty (rule without a path template, or no rule at all), it defaults
    /// to the input path. The corpus may come back empty - callers fill in
    /// their fallback corpus.
    pub fn lookup(&self, path: &str) -> VName {
        for rule in &self.rules {
            if let Some(captures) = rule.pattern.captures(path) {
                let mut vname = VName {
                    corpus: expand_template(&rule.corpus, &captures),
                    root: expand_template(&rule.root, &captures),
                    path: expand_template(&rule.path, &captures),
                    ..VName::default()
                };
                if vname.path.is_empty() {
                    vname.path = path.to_string();
                }
                return vname;
            }
        }
        VName::for_file("", path)
    }
}

// Replaces `@N@` markers with the corresponding capture group.
fn expand_template(template: &str, captures: &regex::Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('@') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        match tail.find('@') {
            Some(end) => {
                let marker = &tail[..end];
                match marker.parse::<usize>().ok().and_then(|n| captures.get(n)) {
                    Some(group) => out.push_str(group.as_str()),
                    None => {
                        // Not a capture marker; keep the literal text.
                        out.push('@');
                        out.push_str(marker);
                        out.push('@');
                    }
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let rules = VNameRules::from_json(
            r#"[
                {"pattern": "a/.*", "vname": {"corpus": "first"}},
                {"pattern": ".*", "vname": {"corpus": "second"}}
            ]"#,
        )
        .unwrap();

        assert_eq!(rules.lookup("a/x.proto").corpus, "first");
        assert_eq!(rules.lookup("b/x.proto").corpus, "second");
    }

    #[test]
    fn test_capture_group_templates() {
        let rules = VNameRules::from_json(
            r#"[{
                "pattern": "third_party/([^/]+)/(.*)",
                "vname": {"corpus": "tp", "root": "@1@", "path": "@2@"}
            }]"#,
        )
        .unwrap();

        let vname = rules.lookup("third_party/absl/strings.proto");
        assert_eq!(vname.corpus, "tp");
        assert_eq!(vname.root, "absl");
        assert_eq!(vname.path, "strings.proto");
    }

    #[test]
    fn test_whole_path_match_required() {
        let rules = VNameRules::from_json(
            r#"[{"pattern": "gen/", "vname": {"corpus": "gen"}}]"#,
        )
        .unwrap();
        // Pattern only covers a prefix, so it must not match.
        assert_eq!(rules.lookup("gen/x.proto").corpus, "");
    }

    #[test]
    fn test_default_when_no_rule_matches() {
        let rules = VNameRules::default();
        let vname = rules.lookup("some/file.proto");
        assert_eq!(vname.corpus, "");
        assert_eq!(vname.path, "some/file.proto");
    }

    #[test]
    fn test_path_defaults_to_input() {
        let rules = VNameRules::from_json(
            r#"[{"pattern": ".*", "vname": {"corpus": "c"}}]"#,
        )
        .unwrap();
        let vname = rules.lookup("x/y.proto");
        assert_eq!(vname.corpus, "c");
        assert_eq!(vname.path, "x/y.proto");
    }

    #[test]
    fn test_malformed_config_is_fatal() {
        assert!(matches!(
            VNameRules::from_json("{not json"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            VNameRules::from_json(r#"[{"pattern": "(unclosed", "vname": {}}]"#),
            Err(Error::Config(_))
        ));
    }
}
