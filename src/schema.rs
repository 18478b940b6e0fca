//! Schema pool - descriptors imported from a set of `.proto` files
//!
//! Builds a `prost_reflect::DescriptorPool` from top-level proto files read
//! through a source tree, and derives stable identities for schema elements
//! from their *structural path*: the sequence of descriptor-proto field
//! numbers and indices locating the element within its file, the same
//! sequence protoc emits in `GeneratedCodeInfo.Annotation.path`. Computing
//! the path from public descriptor reflection (index within parent,
//! recursively to the file root) replaces the annotation-collector
//! side-channel the C++ ecosystem leans on.

use crate::vname::VName;
use crate::{Error, Result};
use prost_reflect::{DescriptorPool, ExtensionDescriptor, FieldDescriptor, MessageDescriptor};
use prost_types::{DescriptorProto, FileDescriptorProto, FileDescriptorSet};
use protox::file::FileResolver;

/// The canonical language tag for proto schema elements.
pub const PROTO_LANGUAGE: &str = "protobuf";

// Field numbers inside FileDescriptorProto / DescriptorProto, as used by
// GeneratedCodeInfo annotation paths.
const FILE_MESSAGE_TYPE: i32 = 4;
const FILE_EXTENSION: i32 = 7;
const MESSAGE_FIELD: i32 = 2;
const MESSAGE_NESTED_TYPE: i32 = 3;
const MESSAGE_EXTENSION: i32 = 6;

/// Compile one top-level file (plus transitive imports) through a resolver.
///
/// Each call uses its own compiler instance; sharing one across top-level
/// roots would re-register dependencies that two roots import transitively.
pub(crate) fn compile_file<R>(resolver: R, file: &str) -> Result<FileDescriptorSet>
where
    R: FileResolver + 'static,
{
    tracing::debug!("importing {}", file);
    let mut compiler = protox::Compiler::with_file_resolver(resolver);
    compiler.include_imports(true);
    compiler
        .open_file(file)
        .map_err(|e| Error::Import(format!("failed to import {}: {}", file, e)))?;
    Ok(compiler.file_descriptor_set())
}

/// The set of message/field descriptors produced by importing a fixed set of
/// `.proto` files.
#[derive(Debug)]
pub struct SchemaPool {
    pool: DescriptorPool,
}

impl SchemaPool {
    /// Import each top-level file with an independent compiler instance and
    /// merge the results, skipping files a previous root already registered.
    /// A grammar failure in any required file fails the whole build.
    pub fn build<R>(resolver: R, top_level_files: &[String]) -> Result<Self>
    where
        R: FileResolver + Clone + 'static,
    {
        let mut pool = DescriptorPool::new();

        for file in top_level_files {
            let set = compile_file(resolver.clone(), file)?;
            // Duplicate transitive imports are expected when two top-level
            // files share a dependency; only register each file once.
            let fresh: Vec<FileDescriptorProto> = set
                .file
                .into_iter()
                .filter(|fd| pool.get_file_by_name(fd.name()).is_none())
                .collect();
            pool.add_file_descriptor_protos(fresh)
                .map_err(|e| Error::Import(format!("failed to register {}: {}", file, e)))?;
        }

        Ok(Self { pool })
    }

    /// Look up a message type by fully-qualified name (a leading `.` is
    /// accepted). Absence is not an error here; the caller decides.
    pub fn find_message(&self, fully_qualified_name: &str) -> Option<MessageDescriptor> {
        self.pool
            .get_message_by_name(fully_qualified_name.trim_start_matches('.'))
    }

    /// Look up an extension field by fully-qualified name.
    pub fn find_extension(&self, fully_qualified_name: &str) -> Option<ExtensionDescriptor> {
        self.pool
            .get_extension_by_name(fully_qualified_name.trim_start_matches('.'))
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

// Walks a FileDescriptorProto down to `message`, returning the structural
// path so far and the message's own DescriptorProto.
fn message_proto_path<'a>(
    file: &'a FileDescriptorProto,
    message: &MessageDescriptor,
) -> Option<(Vec<i32>, &'a DescriptorProto)> {
    let package = file.package();
    let full_name = message.full_name();
    let relative = if package.is_empty() {
        full_name
    } else {
        full_name.strip_prefix(&format!("{}.", package))?
    };

    let mut path = Vec::new();
    let mut candidates = &file.message_type;
    let mut current: Option<&DescriptorProto> = None;

    for (depth, name) in relative.split('.').enumerate() {
        let index = candidates.iter().position(|m| m.name() == name)?;
        path.push(if depth == 0 { FILE_MESSAGE_TYPE } else { MESSAGE_NESTED_TYPE });
        path.push(index as i32);
        let descriptor = &candidates[index];
        candidates = &descriptor.nested_type;
        current = Some(descriptor);
    }

    current.map(|descriptor| (path, descriptor))
}

/// Structural path of a message from its file root, e.g. `[4, 0, 3, 1]`.
pub fn message_path(message: &MessageDescriptor) -> Result<Vec<i32>> {
    let file = message.parent_file();
    let proto = file.file_descriptor_proto();
    message_proto_path(proto, message)
        .map(|(path, _)| path)
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "message {} not found in descriptor of {}",
                message.full_name(),
                proto.name()
            ))
        })
}

/// Structural path of a field declared in `message`.
pub fn field_path(message: &MessageDescriptor, field: &FieldDescriptor) -> Result<Vec<i32>> {
    let file = message.parent_file();
    let proto = file.file_descriptor_proto();
    let (mut path, descriptor) = message_proto_path(proto, message).ok_or_else(|| {
        Error::InvariantViolation(format!(
            "message {} not found in descriptor of {}",
            message.full_name(),
            proto.name()
        ))
    })?;

    let index = descriptor
        .field
        .iter()
        .position(|f| f.number() == field.number() as i32)
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "field {} not found in {}",
                field.name(),
                message.full_name()
            ))
        })?;

    path.push(MESSAGE_FIELD);
    path.push(index as i32);
    Ok(path)
}

/// Structural path of an extension field (file-level or message-scoped).
pub fn extension_path(extension: &ExtensionDescriptor) -> Result<Vec<i32>> {
    let file = extension.parent_file();
    let proto = file.file_descriptor_proto();

    let (mut path, extensions) = match extension.parent_message() {
        Some(scope) => {
            let (path, descriptor) = message_proto_path(proto, &scope).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "message {} not found in descriptor of {}",
                    scope.full_name(),
                    proto.name()
                ))
            })?;
            let mut path = path;
            path.push(MESSAGE_EXTENSION);
            (path, &descriptor.extension)
        }
        None => (vec![FILE_EXTENSION], &proto.extension),
    };

    // Extension numbers are only unique per extendee; names are unique
    // within the declaring scope.
    let index = extensions
        .iter()
        .position(|f| f.name() == extension.name())
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "extension {} not found in {}",
                extension.full_name(),
                proto.name()
            ))
        })?;

    path.push(index as i32);
    Ok(path)
}

/// Derive a schema element's VName from its file VName and structural path:
/// signature is the dotted path, language is [`PROTO_LANGUAGE`].
pub fn vname_for_path(file_vname: &VName, path: &[i32]) -> VName {
    let signature = path
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(".");
    file_vname
        .with_signature(signature)
        .with_language(PROTO_LANGUAGE)
}
