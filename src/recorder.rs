//! Graph fact recorder - node/edge entries for the downstream graph store
//!
//! Facts are `(identity, property, value)` triples; edges are
//! `(source, edge_kind, target)` triples. The recorder buffers entries for
//! the duration of one run and serializes them (one JSON object per line)
//! only after the run succeeds, so an aborted analysis never leaves partial
//! output behind.

use crate::vname::VName;
use crate::Result;
use serde::Serialize;
use std::io::Write;

/// Node kinds emitted by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Anchor,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Anchor => "anchor",
        }
    }
}

/// Property names for node facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    NodeKind,
    Text,
    LocationStart,
    LocationEnd,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::NodeKind => "/kythe/node/kind",
            Property::Text => "/kythe/text",
            Property::LocationStart => "/kythe/loc/start",
            Property::LocationEnd => "/kythe/loc/end",
        }
    }
}

/// Edge kinds emitted by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// An anchor references the schema symbol it names
    Ref,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Ref => "/kythe/edge/ref",
        }
    }
}

/// One graph entry: a node fact, or an edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub source: VName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<VName>,
    pub fact_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fact_value: String,
}

/// Buffering recorder for one analysis run.
#[derive(Debug, Default)]
pub struct GraphRecorder {
    entries: Vec<Entry>,
}

impl GraphRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's kind fact.
    pub fn add_node(&mut self, node: &VName, kind: NodeKind) {
        tracing::debug!("node {}:{} [{}]", node.path, node.signature, kind.as_str());
        self.add_fact(node, Property::NodeKind, kind.as_str());
    }

    /// Record a `(node, property, value)` fact.
    pub fn add_fact(&mut self, node: &VName, property: Property, value: impl Into<String>) {
        self.entries.push(Entry {
            source: node.clone(),
            edge_kind: None,
            target: None,
            fact_name: property.as_str().to_string(),
            fact_value: value.into(),
        });
    }

    /// Record a `(source, kind, target)` edge.
    pub fn add_edge(&mut self, source: &VName, kind: EdgeKind, target: &VName) {
        tracing::debug!(
            "edge {}:{} -[{}]-> {}:{}",
            source.path,
            source.signature,
            kind.as_str(),
            target.path,
            target.signature
        );
        self.entries.push(Entry {
            source: source.clone(),
            edge_kind: Some(kind.as_str().to_string()),
            target: Some(target.clone()),
            // Edge entries carry the empty fact, spelled "/".
            fact_name: "/".to_string(),
            fact_value: String::new(),
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize all buffered entries, one JSON object per line.
    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<()> {
        for entry in &self.entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| crate::Error::Config(format!("can't serialize entry: {}", e)))?;
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_entry_shape() {
        let mut recorder = GraphRecorder::new();
        let file = VName::for_file("c", "f.textproto");
        recorder.add_node(&file, NodeKind::File);

        let json = serde_json::to_string(&recorder.entries()[0]).unwrap();
        assert_eq!(
            json,
            r#"{"source":{"corpus":"c","path":"f.textproto"},"fact_name":"/kythe/node/kind","fact_value":"file"}"#
        );
    }

    #[test]
    fn test_edge_entry_shape() {
        let mut recorder = GraphRecorder::new();
        let anchor = VName::for_file("c", "f.textproto").with_signature("@0:4");
        let field = VName::for_file("c", "s.proto").with_signature("4.0.2.0");
        recorder.add_edge(&anchor, EdgeKind::Ref, &field);

        let json = serde_json::to_string(&recorder.entries()[0]).unwrap();
        assert!(json.contains(r#""edge_kind":"/kythe/edge/ref""#));
        assert!(json.contains(r#""fact_name":"/""#));
        assert!(json.contains(r#""signature":"4.0.2.0""#));
    }

    #[test]
    fn test_write_json_one_line_per_entry() {
        let mut recorder = GraphRecorder::new();
        let node = VName::for_file("c", "f");
        recorder.add_node(&node, NodeKind::Anchor);
        recorder.add_fact(&node, Property::LocationStart, "0");
        recorder.add_fact(&node, Property::LocationEnd, "4");

        let mut out = Vec::new();
        recorder.write_json(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("source").is_some());
        }
    }
}
