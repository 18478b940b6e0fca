//! Textproto analysis - anchors and reference edges for field occurrences
//!
//! Parses a textproto instance against a dynamically loaded message
//! descriptor, then walks every declared field (and set extension) of the
//! message tree. Each occurrence found in the input yields one anchor node
//! spanning the field-name token and one `ref` edge from that anchor to the
//! schema element's VName. Nested and repeated message values are recursed
//! into with the matching parse-location subtree.

use crate::line_index::LineIndex;
use crate::location::{ParseInfoTree, ParseLocation};
use crate::recorder::{EdgeKind, GraphRecorder, NodeKind, Property};
use crate::rules::VNameRules;
use crate::schema::{self, SchemaPool};
use crate::vname::VName;
use crate::{Error, Result};
use prost_reflect::{DynamicMessage, Kind, MessageDescriptor};

/// The canonical language tag for textproto anchors.
pub const TEXTPROTO_LANGUAGE: &str = "protobuf_textformat";

/// Analyzes a single textproto instance against its schema pool.
pub struct TextprotoAnalyzer<'a> {
    schema: &'a SchemaPool,
    rules: &'a VNameRules,
    /// Fallback corpus for files whose identity rule leaves corpus empty
    corpus: &'a str,
    /// Language tag stamped on anchor VNames
    language: String,
}

impl<'a> TextprotoAnalyzer<'a> {
    pub fn new(
        schema: &'a SchemaPool,
        rules: &'a VNameRules,
        corpus: &'a str,
        language: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            rules,
            corpus,
            language: language.into(),
        }
    }

    /// Analyze one textproto buffer as an instance of `message_name`,
    /// recording all graph facts into `recorder`.
    ///
    /// No facts are recorded unless the schema resolves and the instance
    /// parses. A failure later in the walk can leave earlier entries in the
    /// buffer; callers serialize the buffer only after `analyze` succeeds,
    /// so an aborted run still produces no output.
    pub fn analyze(
        &self,
        textproto_path: &str,
        content: &str,
        message_name: &str,
        recorder: &mut GraphRecorder,
    ) -> Result<()> {
        let descriptor = self
            .schema
            .find_message(message_name)
            .ok_or_else(|| Error::SchemaNotFound(message_name.to_string()))?;

        let message = DynamicMessage::parse_text_format(descriptor.clone(), content)
            .map_err(|e| Error::Parse(format!("{}: {}", textproto_path, e)))?;
        let location_tree = ParseInfoTree::parse(content)?;
        let line_index = LineIndex::new(content);

        // The file's own node carries the full source text.
        let file_vname = self.file_vname(textproto_path);
        recorder.add_node(&file_vname, NodeKind::File);
        recorder.add_fact(&file_vname, Property::Text, content);

        let mut walker = Walker {
            file_vname: &file_vname,
            line_index: &line_index,
            language: &self.language,
            rules: self.rules,
            corpus: self.corpus,
            recorder,
        };
        walker.walk_message(&message, &descriptor, &location_tree)
    }

    fn file_vname(&self, path: &str) -> VName {
        let mut vname = self.rules.lookup(path);
        if vname.corpus.is_empty() {
            vname.corpus = self.corpus.to_string();
        }
        vname
    }
}

// Recursion state for one analysis run: the output sink and line index are
// owned at the top of the call stack and borrowed all the way down.
struct Walker<'w> {
    file_vname: &'w VName,
    line_index: &'w LineIndex<'w>,
    language: &'w str,
    rules: &'w VNameRules,
    corpus: &'w str,
    recorder: &'w mut GraphRecorder,
}

impl Walker<'_> {
    fn walk_message(
        &mut self,
        message: &DynamicMessage,
        descriptor: &MessageDescriptor,
        tree: &ParseInfoTree,
    ) -> Result<()> {
        // Every declared field is visited, not only set ones: proto3
        // messages carry no presence bits, so enumeration over set fields
        // would miss scalar occurrences. Absent fields fall out of the
        // location lookup instead.
        for field in descriptor.fields() {
            let target = schema::vname_for_path(
                &self.proto_file_vname(descriptor),
                &schema::field_path(descriptor, &field)?,
            );

            if field.is_map() {
                // One anchor per entry occurrence, counted from the input
                // rather than the map value so duplicate keys still anchor
                // every textual occurrence. Synthetic map-entry messages are
                // not descended into.
                let count = tree.occurrence_count(field.name());
                for index in 0..count {
                    let location = self.expect_location(tree, field.name(), index)?;
                    let anchor = self.add_anchor(location, field.name().len())?;
                    self.recorder.add_edge(&anchor, EdgeKind::Ref, &target);
                }
            } else if field.is_list() {
                let value = message.get_field(&field);
                let count = value.as_list().map_or(0, |l| l.len());
                for index in 0..count {
                    let location = self.expect_location(tree, field.name(), index)?;
                    let anchor = self.add_anchor(location, field.name().len())?;
                    self.recorder.add_edge(&anchor, EdgeKind::Ref, &target);

                    if let Kind::Message(sub_descriptor) = field.kind() {
                        let element = value
                            .as_list()
                            .and_then(|l| l.get(index))
                            .and_then(|v| v.as_message())
                            .ok_or_else(|| {
                                Error::InvariantViolation(format!(
                                    "repeated field {}[{}] has no message value",
                                    field.name(),
                                    index
                                ))
                            })?;
                        let subtree = tree.child(field.name(), index).ok_or_else(|| {
                            Error::InvariantViolation(format!(
                                "no location subtree for {}[{}]",
                                field.name(),
                                index
                            ))
                        })?;
                        self.walk_message(element, &sub_descriptor, subtree)?;
                    }
                }
            } else {
                // Singular: a missing location means the field is absent
                // from the input.
                let Some(location) = tree.location(field.name(), None) else {
                    continue;
                };
                let anchor = self.add_anchor(location, field.name().len())?;
                self.recorder.add_edge(&anchor, EdgeKind::Ref, &target);

                if let Kind::Message(sub_descriptor) = field.kind() {
                    if message.has_field(&field) {
                        let value = message.get_field(&field);
                        let sub_message = value.as_message().ok_or_else(|| {
                            Error::InvariantViolation(format!(
                                "field {} has no message value",
                                field.name()
                            ))
                        })?;
                        let subtree = tree.child(field.name(), 0).ok_or_else(|| {
                            Error::InvariantViolation(format!(
                                "no location subtree for {}",
                                field.name()
                            ))
                        })?;
                        self.walk_message(sub_message, &sub_descriptor, subtree)?;
                    }
                }
            }
        }

        // Extensions have no static declaration on the base descriptor, so
        // they are enumerated over what the instance actually set.
        for extension in descriptor.extensions() {
            if !message.has_extension(&extension) {
                continue;
            }
            // The location tree places extension occurrences at the
            // qualified name inside the brackets; a miss for a set
            // extension is a defect, same as a repeated-index miss.
            let location = tree.location(extension.full_name(), None).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "no parse location for set extension {}",
                    extension.full_name()
                ))
            })?;

            let target = schema::vname_for_path(
                &self.extension_file_vname(&extension),
                &schema::extension_path(&extension)?,
            );
            let anchor = self.add_anchor(location, extension.full_name().len())?;
            self.recorder.add_edge(&anchor, EdgeKind::Ref, &target);

            if let Kind::Message(sub_descriptor) = extension.kind() {
                let value = message.get_extension(&extension);
                if let Some(sub_message) = value.as_message() {
                    let subtree = tree.child(extension.full_name(), 0).ok_or_else(|| {
                        Error::InvariantViolation(format!(
                            "no location subtree for extension {}",
                            extension.full_name()
                        ))
                    })?;
                    self.walk_message(sub_message, &sub_descriptor, subtree)?;
                }
            }
        }

        Ok(())
    }

    // A repeated-field location lookup must succeed for every index the
    // reflection count reports; a miss is a defect, not a recoverable case.
    fn expect_location(
        &self,
        tree: &ParseInfoTree,
        field_name: &str,
        index: usize,
    ) -> Result<ParseLocation> {
        tree.location(field_name, Some(index)).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "no parse location for {}[{}] (reflection reports it present)",
                field_name, index
            ))
        })
    }

    /// Emit an anchor node spanning the name token at `location`.
    ///
    /// Parse locations are 0-indexed; the line index is 1-indexed.
    fn add_anchor(&mut self, location: ParseLocation, name_length: usize) -> Result<VName> {
        let begin = self
            .line_index
            .byte_offset(location.line + 1, location.column)
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "parse location {}:{} is outside the buffer",
                    location.line, location.column
                ))
            })?;
        let end = begin + name_length;

        let anchor = self
            .file_vname
            .with_signature(format!("@{}:{}", begin, end))
            .with_language(self.language);
        self.recorder.add_node(&anchor, NodeKind::Anchor);
        self.recorder
            .add_fact(&anchor, Property::LocationStart, begin.to_string());
        self.recorder
            .add_fact(&anchor, Property::LocationEnd, end.to_string());
        Ok(anchor)
    }

    fn proto_file_vname(&self, descriptor: &MessageDescriptor) -> VName {
        self.lookup_file(descriptor.parent_file().name())
    }

    fn extension_file_vname(&self, extension: &prost_reflect::ExtensionDescriptor) -> VName {
        self.lookup_file(extension.parent_file().name())
    }

    fn lookup_file(&self, path: &str) -> VName {
        let mut vname = self.rules.lookup(path);
        if vname.corpus.is_empty() {
            vname.corpus = self.corpus.to_string();
        }
        vname
    }
}
