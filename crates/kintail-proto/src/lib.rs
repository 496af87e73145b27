//! Protocol types for Kintail Local
//!
//! This crate defines the wire protocol spoken across the three execution
//! contexts involved in a local-file request: the page issuing a fetch, the
//! service worker intercepting it, and the page-side bridge answering it.
//!
//! # Architecture
//!
//! ```text
//! Page code
//!        │
//!        │ fetch("https://kintail/local/file/read", body)
//!        ▼
//! ┌─────────────────┐
//! │ Service Worker  │  ◄── Intercepts the reserved virtual origin
//! └────────┬────────┘
//!          │
//!          │ RelayRequest {path, body} + transfer of a reply port
//!          ▼
//! ┌─────────────────┐
//! │  Page Bridge    │  ◄── Validates against the live <input type=file>
//! └────────┬────────┘
//!          │
//!          │ RelayResponse {status, statusText, body, contentType}
//!          ▼
//! ┌─────────────────┐
//! │ Service Worker  │  ◄── Synthesizes the HTTP response
//! └─────────────────┘
//! ```
//!
//! It is the single source of truth for the virtual-origin prefix, the route
//! names, and the JSON payload shapes, eliminating duplication between the
//! bridge and worker crates.

#![no_std]

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use serde::{Deserialize, Serialize};

// =============================================================================
// Virtual namespace
// =============================================================================

/// Reserved virtual origin. Fetches whose URL starts with this prefix are
/// never routed to the network; the remainder of the URL is the logical route.
pub const VIRTUAL_ORIGIN: &str = "https://kintail/local/";

/// Route handling a file-read request.
pub const ROUTE_FILE_READ: &str = "file/read";
/// Route handling a file-save request.
pub const ROUTE_FILE_SAVE: &str = "file/save";

/// Default content type for relayed responses.
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// Extract the logical route from an intercepted URL.
///
/// Returns `None` for URLs outside the virtual namespace; those must be
/// passed through to the real network fetch.
pub fn virtual_path(url: &str) -> Option<&str> {
    url.strip_prefix(VIRTUAL_ORIGIN)
}

// =============================================================================
// Relay request / response
// =============================================================================

/// Request relayed from the worker to the owning page.
///
/// Immutable once constructed: created at the intercepting boundary and
/// consumed exactly once by the page-side dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Logical route (the URL suffix after the virtual origin)
    pub path: String,
    /// JSON-encoded payload specific to the route
    pub body: String,
}

/// Response relayed from the page back to the worker.
///
/// Produced by exactly one handler invocation and consumed exactly once to
/// build the outgoing HTTP response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    /// HTTP status code (200, 404, etc.)
    pub status: u16,
    /// HTTP status text
    pub status_text: String,
    /// Response body
    pub body: String,
    /// Content type for the single `Content-Type` header of the synthesized
    /// response. Defaults to `text/plain; charset=utf-8` when absent.
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    String::from(TEXT_PLAIN_UTF8)
}

impl RelayResponse {
    fn with_status(status: u16, status_text: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: String::from(status_text),
            body: body.into(),
            content_type: default_content_type(),
        }
    }

    /// 200 OK with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, "OK", body)
    }

    /// 400 Bad Request with a descriptive body.
    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::with_status(400, "Bad Request", description)
    }

    /// 404 Not Found with a descriptive body.
    pub fn not_found(description: impl Into<String>) -> Self {
        Self::with_status(404, "Not Found", description)
    }

    /// 500 Internal Server Error with a descriptive body.
    pub fn internal_error(description: impl Into<String>) -> Self {
        Self::with_status(500, "Internal Server Error", description)
    }

    /// 502 Bad Gateway with a descriptive body. Used by the worker when the
    /// relay round trip itself fails.
    pub fn bad_gateway(description: impl Into<String>) -> Self {
        Self::with_status(502, "Bad Gateway", description)
    }

    /// Override the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Check if the response was successful (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// =============================================================================
// Route payloads
// =============================================================================

/// Snapshot of a file the caller believes is selected on a `<input type=file>`
/// element. Used only for structural equality validation against the live DOM
/// file object; carries no identity beyond its fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// DOM id of the file-input element
    pub element_id: String,
    /// Index into the element's file list. Signed so that negative indices
    /// deserialize and are rejected by the bounds check, not by the codec.
    pub index: i64,
    /// Expected file name
    pub name: String,
    /// Expected size in bytes
    pub size: u64,
    /// Expected last-modified time, milliseconds since the Unix epoch
    pub last_modified: i64,
    /// Expected MIME type
    pub mime_type: String,
}

/// Payload of a file-save request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    /// Text contents to save
    pub contents: String,
    /// Suggested file name for the save dialog
    pub filename: String,
}

// =============================================================================
// Typed routes
// =============================================================================

/// The routes of the virtual namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Read a selected local file as text
    FileRead,
    /// Trigger a file-save dialog
    FileSave,
}

impl Route {
    /// Resolve a logical path to a route.
    ///
    /// Returns `None` for unrecognized paths.
    pub fn parse(path: &str) -> Option<Self> {
        match path {
            ROUTE_FILE_READ => Some(Route::FileRead),
            ROUTE_FILE_SAVE => Some(Route::FileSave),
            _ => None,
        }
    }

    /// The wire name of this route.
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::FileRead => ROUTE_FILE_READ,
            Route::FileSave => ROUTE_FILE_SAVE,
        }
    }
}

/// A relay request resolved to its route with the payload decoded.
///
/// Resolution happens once, at the dispatch boundary; handlers receive the
/// strongly typed payload and never see raw path strings.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayCommand {
    /// `file/read` with its descriptor payload
    ReadFile(FileDescriptor),
    /// `file/save` with its save payload
    SaveFile(SaveRequest),
}

impl RelayCommand {
    /// Resolve a raw relay request into a typed command.
    pub fn parse(request: &RelayRequest) -> Result<Self, CommandError> {
        match Route::parse(&request.path) {
            Some(Route::FileRead) => serde_json::from_str(&request.body)
                .map(RelayCommand::ReadFile)
                .map_err(|err| CommandError::MalformedPayload {
                    route: Route::FileRead,
                    detail: err.to_string(),
                }),
            Some(Route::FileSave) => serde_json::from_str(&request.body)
                .map(RelayCommand::SaveFile)
                .map_err(|err| CommandError::MalformedPayload {
                    route: Route::FileSave,
                    detail: err.to_string(),
                }),
            None => Err(CommandError::UnknownRoute(request.path.clone())),
        }
    }
}

/// Errors resolving a relay request into a command.
///
/// These are request-shaped problems, so they all map to 400 Bad Request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// The path matched no known route
    UnknownRoute(String),
    /// The route was known but its JSON payload did not decode
    MalformedPayload {
        /// The route whose payload failed to decode
        route: Route,
        /// Decoder error detail
        detail: String,
    },
}

impl CommandError {
    /// Convert into the structured response delivered back to the worker.
    pub fn into_response(self) -> RelayResponse {
        match self {
            CommandError::UnknownRoute(_) => RelayResponse::bad_request("Unrecognized request"),
            CommandError::MalformedPayload { route, detail } => RelayResponse::bad_request(
                format!("Could not parse {} request: {}", route.as_str(), detail),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_virtual_origin_is_22_chars() {
        // The worker slices the route off a fixed-length prefix; the prefix
        // length is part of the protocol.
        assert_eq!(VIRTUAL_ORIGIN.len(), 22);
    }

    #[test]
    fn test_virtual_path_extraction() {
        assert_eq!(
            virtual_path("https://kintail/local/file/read"),
            Some("file/read")
        );
        assert_eq!(virtual_path("https://kintail/local/"), Some(""));
        assert_eq!(virtual_path("https://example.com/file/read"), None);
        assert_eq!(virtual_path("http://kintail/local/file/read"), None);
    }

    #[test]
    fn test_route_parse_roundtrip() {
        for route in [Route::FileRead, Route::FileSave] {
            assert_eq!(Route::parse(route.as_str()), Some(route));
        }
        assert_eq!(Route::parse("file/delete"), None);
        assert_eq!(Route::parse(""), None);
    }

    #[test]
    fn test_descriptor_wire_keys_are_camel_case() {
        let json = r#"{
            "elementId": "upload",
            "index": 0,
            "name": "notes.txt",
            "size": 11,
            "lastModified": 1700000000000,
            "mimeType": "text/plain"
        }"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).expect("valid descriptor");
        assert_eq!(descriptor.element_id, "upload");
        assert_eq!(descriptor.index, 0);
        assert_eq!(descriptor.last_modified, 1_700_000_000_000);
        assert_eq!(descriptor.mime_type, "text/plain");

        let encoded = serde_json::to_string(&descriptor).expect("encodes");
        assert!(encoded.contains("\"elementId\""));
        assert!(encoded.contains("\"lastModified\""));
        assert!(encoded.contains("\"mimeType\""));
    }

    #[test]
    fn test_descriptor_accepts_negative_index() {
        // Negative indices must survive decoding so the bounds check can
        // reject them with 404 instead of a codec error.
        let json = r#"{"elementId":"upload","index":-1,"name":"a","size":0,"lastModified":0,"mimeType":""}"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).expect("valid descriptor");
        assert_eq!(descriptor.index, -1);
    }

    #[test]
    fn test_response_constructors() {
        let ok = RelayResponse::ok("hello");
        assert_eq!(ok.status, 200);
        assert_eq!(ok.status_text, "OK");
        assert!(ok.is_success());
        assert_eq!(ok.content_type, TEXT_PLAIN_UTF8);

        let bad = RelayResponse::bad_request("nope");
        assert_eq!((bad.status, bad.status_text.as_str()), (400, "Bad Request"));
        assert!(!bad.is_success());

        let missing = RelayResponse::not_found("gone");
        assert_eq!((missing.status, missing.status_text.as_str()), (404, "Not Found"));

        let relay = RelayResponse::bad_gateway("Client not found");
        assert_eq!((relay.status, relay.status_text.as_str()), (502, "Bad Gateway"));
    }

    #[test]
    fn test_response_content_type_defaults_on_decode() {
        let json = r#"{"status":200,"statusText":"OK","body":"x"}"#;
        let response: RelayResponse = serde_json::from_str(json).expect("valid response");
        assert_eq!(response.content_type, TEXT_PLAIN_UTF8);

        let json = r#"{"status":200,"statusText":"OK","body":"x","contentType":"text/html"}"#;
        let response: RelayResponse = serde_json::from_str(json).expect("valid response");
        assert_eq!(response.content_type, "text/html");
    }

    #[test]
    fn test_command_parse_read() {
        let request = RelayRequest {
            path: ROUTE_FILE_READ.to_string(),
            body: r#"{"elementId":"upload","index":1,"name":"a.txt","size":3,"lastModified":5,"mimeType":"text/plain"}"#.to_string(),
        };
        match RelayCommand::parse(&request) {
            Ok(RelayCommand::ReadFile(descriptor)) => {
                assert_eq!(descriptor.element_id, "upload");
                assert_eq!(descriptor.index, 1);
            }
            other => panic!("expected ReadFile, got {:?}", other),
        }
    }

    #[test]
    fn test_command_parse_save() {
        let request = RelayRequest {
            path: ROUTE_FILE_SAVE.to_string(),
            body: r#"{"contents":"hello","filename":"out.txt"}"#.to_string(),
        };
        match RelayCommand::parse(&request) {
            Ok(RelayCommand::SaveFile(save)) => {
                assert_eq!(save.contents, "hello");
                assert_eq!(save.filename, "out.txt");
            }
            other => panic!("expected SaveFile, got {:?}", other),
        }
    }

    #[test]
    fn test_command_parse_unknown_route() {
        let request = RelayRequest {
            path: "file/delete".to_string(),
            body: String::new(),
        };
        let err = RelayCommand::parse(&request).expect_err("unknown route");
        assert_eq!(err, CommandError::UnknownRoute("file/delete".to_string()));
        let response = err.into_response();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, "Unrecognized request");
    }

    #[test]
    fn test_command_parse_malformed_payload() {
        let request = RelayRequest {
            path: ROUTE_FILE_READ.to_string(),
            body: "not json".to_string(),
        };
        let err = RelayCommand::parse(&request).expect_err("malformed payload");
        let response = err.into_response();
        assert_eq!(response.status, 400);
        assert!(response.body.starts_with("Could not parse file/read request"));
    }
}
