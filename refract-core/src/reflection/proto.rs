//! # Reflection wire messages
//!
//! Protobuf messages of `grpc/reflection/v1/reflection.proto`.
//!
//! `grpc.reflection.v1` and `grpc.reflection.v1alpha` are wire compatible: both revisions
//! share these exact message shapes and only differ in the routing path of the RPC
//! (see [`super::revision::ProtocolRevision::path`]). That is why a single set of types
//! serves both.

/// The message sent by the client when calling `ServerReflectionInfo`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerReflectionRequest {
    #[prost(string, tag = "1")]
    pub host: ::prost::alloc::string::String,
    /// Exactly one of these fields is populated per request.
    #[prost(
        oneof = "server_reflection_request::MessageRequest",
        tags = "3, 4, 5, 6, 7"
    )]
    pub message_request: ::core::option::Option<server_reflection_request::MessageRequest>,
}

/// Nested message and enum types in `ServerReflectionRequest`.
pub mod server_reflection_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum MessageRequest {
        /// Find a proto file by the file name.
        #[prost(string, tag = "3")]
        FileByFilename(::prost::alloc::string::String),
        /// Find the proto file that declares the given fully-qualified symbol name.
        #[prost(string, tag = "4")]
        FileContainingSymbol(::prost::alloc::string::String),
        /// Find the proto file which defines an extension extending the given
        /// message type with the given field number.
        #[prost(message, tag = "5")]
        FileContainingExtension(super::ExtensionRequest),
        /// Finds the tag numbers used by all known extensions of the given message type.
        #[prost(string, tag = "6")]
        AllExtensionNumbersOfType(::prost::alloc::string::String),
        /// List the full names of registered services. The content will not be checked.
        #[prost(string, tag = "7")]
        ListServices(::prost::alloc::string::String),
    }
}

/// The type name and extension number sent by the client when requesting
/// `file_containing_extension`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtensionRequest {
    /// Fully-qualified type name. The format should be `<package>.<type>`
    #[prost(string, tag = "1")]
    pub containing_type: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub extension_number: i32,
}

/// The message sent by the server to answer `ServerReflectionInfo`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerReflectionResponse {
    #[prost(string, tag = "1")]
    pub valid_host: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub original_request: ::core::option::Option<ServerReflectionRequest>,
    /// The server sets one of the following fields according to the `message_request`
    /// in the request.
    #[prost(
        oneof = "server_reflection_response::MessageResponse",
        tags = "4, 5, 6, 7"
    )]
    pub message_response: ::core::option::Option<server_reflection_response::MessageResponse>,
}

/// Nested message and enum types in `ServerReflectionResponse`.
pub mod server_reflection_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum MessageResponse {
        /// This message is used to answer `file_by_filename`, `file_containing_symbol`,
        /// `file_containing_extension` requests with transitive dependencies.
        /// As the repeated label is not allowed in oneof fields, we use a
        /// `FileDescriptorResponse` message to encapsulate the repeated fields.
        #[prost(message, tag = "4")]
        FileDescriptorResponse(super::FileDescriptorResponse),
        /// This message is used to answer `all_extension_numbers_of_type` requests.
        #[prost(message, tag = "5")]
        AllExtensionNumbersResponse(super::ExtensionNumberResponse),
        /// This message is used to answer `list_services` requests.
        #[prost(message, tag = "6")]
        ListServicesResponse(super::ListServiceResponse),
        /// This message is used when an error occurs.
        #[prost(message, tag = "7")]
        ErrorResponse(super::ErrorResponse),
    }
}

/// Serialized `FileDescriptorProto` messages sent by the server answering
/// a `file_by_filename`, `file_containing_symbol`, or `file_containing_extension` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileDescriptorResponse {
    #[prost(bytes = "bytes", repeated, tag = "1")]
    pub file_descriptor_proto: ::prost::alloc::vec::Vec<::prost::bytes::Bytes>,
}

/// A list of extension numbers sent by the server answering
/// `all_extension_numbers_of_type` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExtensionNumberResponse {
    /// Full name of the base type, including the package name. The format
    /// is `<package>.<type>`
    #[prost(string, tag = "1")]
    pub base_type_name: ::prost::alloc::string::String,
    #[prost(int32, repeated, tag = "2")]
    pub extension_number: ::prost::alloc::vec::Vec<i32>,
}

/// A list of `ServiceResponse` sent by the server answering `list_services` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListServiceResponse {
    #[prost(message, repeated, tag = "1")]
    pub service: ::prost::alloc::vec::Vec<ServiceResponse>,
}

/// The information of a single service used by `ListServiceResponse` to answer
/// `list_services` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceResponse {
    /// Full name of a registered service, including its package name.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

/// The error code and error message sent by the server when an error occurs.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorResponse {
    /// This field uses the error codes defined in `grpc::StatusCode`.
    #[prost(int32, tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub error_message: ::prost::alloc::string::String,
}

// The host defined in the reflection requests doesn't seem to be a mandatory field
// and there is no documentation about what it is about.
impl ServerReflectionRequest {
    pub fn new(host: &str, message_request: server_reflection_request::MessageRequest) -> Self {
        Self {
            host: host.to_string(),
            message_request: Some(message_request),
        }
    }
}
