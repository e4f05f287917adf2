//! # Reflected Descriptors
//!
//! Raw file descriptors as returned by the reflection service, and the immutable set
//! produced by one resolution.
//!
//! Descriptors are kept as the exact bytes the server sent. Only the file name and its
//! imports are peeked at, which is all the dependency walk needs; turning the bytes into
//! a usable schema is deferred to a [`SchemaLoader`].
use crate::reflection::error::ReflectionResolveError;
use bytes::Bytes;
use prost::Message;
use prost_reflect::{DescriptorError, DescriptorPool};
use prost_types::{FileDescriptorProto, FileDescriptorSet};

/// The two fields of a `FileDescriptorProto` needed to walk the dependency graph.
///
/// Decoding into this message skips every other field of the descriptor.
#[derive(Clone, PartialEq, ::prost::Message)]
struct FileDescriptorHeader {
    #[prost(string, optional, tag = "1")]
    name: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "3")]
    dependency: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Same wire format as `google.protobuf.FileDescriptorSet`, with each file kept encoded.
#[derive(Clone, PartialEq, ::prost::Message)]
struct EncodedFileDescriptorSet {
    #[prost(bytes = "bytes", repeated, tag = "1")]
    file: ::prost::alloc::vec::Vec<Bytes>,
}

/// One serialized schema file, with its name and imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptorBytes {
    name: String,
    dependencies: Vec<String>,
    raw: Bytes,
}

impl FileDescriptorBytes {
    /// Peeks into a serialized `FileDescriptorProto`.
    ///
    /// # Returns
    ///
    /// * `Ok(FileDescriptorBytes)` - The blob, its file name, and its imports in declaration order.
    /// * `Err(ReflectionResolveError)` - The blob is not a descriptor, or it has no file name.
    pub fn peek(raw: Bytes) -> Result<Self, ReflectionResolveError> {
        let header = FileDescriptorHeader::decode(raw.clone())?;

        let name = header
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ReflectionResolveError::ProtocolViolation(
                    "received a file descriptor without a file name".into(),
                )
            })?;

        Ok(Self {
            name,
            dependencies: header.dependency,
            raw,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The exact bytes sent by the server.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Fully decodes the descriptor.
    pub fn decode(&self) -> Result<FileDescriptorProto, prost::DecodeError> {
        FileDescriptorProto::decode(self.raw.clone())
    }
}

/// Turns a closed set of raw file descriptors into an invokable schema.
pub trait SchemaLoader {
    type Package;
    type Error;

    fn load(&self, files: &[FileDescriptorBytes]) -> Result<Self::Package, Self::Error>;
}

/// A [`SchemaLoader`] producing a `prost_reflect::DescriptorPool`.
///
/// The resolved files are added on top of a base pool, which is empty by default.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolLoader {
    base: DescriptorPool,
}

impl DescriptorPoolLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extends `base` instead of an empty pool, e.g. `DescriptorPool::global()`.
    pub fn with_base_pool(base: DescriptorPool) -> Self {
        Self { base }
    }
}

impl SchemaLoader for DescriptorPoolLoader {
    type Package = DescriptorPool;
    type Error = DescriptorError;

    fn load(&self, files: &[FileDescriptorBytes]) -> Result<DescriptorPool, DescriptorError> {
        let mut pool = self.base.clone();
        pool.decode_file_descriptor_set(encode_set(files).as_slice())?;
        Ok(pool)
    }
}

/// The closed set of file descriptors describing a symbol.
///
/// Every file reachable from the resolved symbol appears exactly once, in breadth-first
/// discovery order starting from the file(s) that define the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedDescriptor {
    files: Vec<FileDescriptorBytes>,
}

impl ReflectedDescriptor {
    pub(crate) fn new(files: Vec<FileDescriptorBytes>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[FileDescriptorBytes] {
        &self.files
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(FileDescriptorBytes::name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Hands the raw files to a schema loader.
    pub fn to_schema_package<L: SchemaLoader>(&self, loader: &L) -> Result<L::Package, L::Error> {
        loader.load(&self.files)
    }

    /// Decodes every file, for inspection. Pure and repeatable, nothing is cached.
    pub fn file_descriptor_set(&self) -> Result<FileDescriptorSet, prost::DecodeError> {
        let file = self
            .files
            .iter()
            .map(FileDescriptorBytes::decode)
            .collect::<Result<_, _>>()?;

        Ok(FileDescriptorSet { file })
    }

    /// Encodes the files as a binary `FileDescriptorSet` (the `protoc --descriptor_set_out` format).
    pub fn encode_file_descriptor_set(&self) -> Vec<u8> {
        encode_set(&self.files)
    }
}

fn encode_set(files: &[FileDescriptorBytes]) -> Vec<u8> {
    EncodedFileDescriptorSet {
        file: files.iter().map(|f| f.raw.clone()).collect(),
    }
    .encode_to_vec()
}
