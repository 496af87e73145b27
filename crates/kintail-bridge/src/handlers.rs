//! Request handlers.
//!
//! Each relayed request produces exactly one [`RelayResponse`]. Handler-level
//! failures are converted into structured responses here, so dispatch is a
//! total function: nothing propagates to the worker except a response.

use kintail_proto::{FileDescriptor, RelayCommand, RelayRequest, RelayResponse, SaveRequest};

use crate::log;
use crate::save::SaveSink;
use crate::source::FileSource;

/// Validate a requested descriptor against the live file list and read the
/// file as text on a full match.
///
/// Checks short-circuit in order: element presence, index bounds, then
/// structural equality of name, size, last-modified time and MIME type. The
/// first failure wins; all validation failures are 404 with a distinct
/// message per check.
pub async fn read_file<S: FileSource>(source: &S, requested: &FileDescriptor) -> RelayResponse {
    if let Err(response) = validate(source, requested) {
        return response;
    }
    match source
        .read_text(&requested.element_id, requested.index as usize)
        .await
    {
        Ok(text) => RelayResponse::ok(text),
        Err(err) => {
            log(&format!(
                "[kintail-bridge] Read failed for '{}': {}",
                requested.element_id,
                err.message()
            ));
            RelayResponse::internal_error("Failed to read file contents")
        }
    }
}

fn validate<S: FileSource>(source: &S, requested: &FileDescriptor) -> Result<(), RelayResponse> {
    let count = source
        .file_count(&requested.element_id)
        .ok_or_else(|| RelayResponse::not_found("Could not find <file> element"))?;

    if requested.index < 0 || requested.index >= count as i64 {
        return Err(RelayResponse::not_found(
            "Invalid index for given <file> element",
        ));
    }

    let live = source
        .snapshot(&requested.element_id, requested.index as usize)
        .ok_or_else(|| RelayResponse::not_found("Invalid index for given <file> element"))?;

    if live.name != requested.name {
        return Err(RelayResponse::not_found("File name does not match"));
    }
    if live.size != requested.size {
        return Err(RelayResponse::not_found("File size does not match"));
    }
    if live.last_modified != requested.last_modified {
        return Err(RelayResponse::not_found(
            "File last-modified time does not match",
        ));
    }
    if live.mime_type != requested.mime_type {
        return Err(RelayResponse::not_found("File MIME type does not match"));
    }

    Ok(())
}

/// Hand the contents to the save capability.
///
/// Fire-and-forget: always 200 with an empty body. There is no confirmation
/// that the user accepted the save dialog, so a sink failure is logged rather
/// than surfaced.
pub fn save_file<K: SaveSink>(sink: &K, request: &SaveRequest) -> RelayResponse {
    if let Err(err) = sink.save_text(&request.filename, &request.contents) {
        log(&format!(
            "[kintail-bridge] Save of '{}' failed: {}",
            request.filename,
            err.message()
        ));
    }
    RelayResponse::ok("")
}

/// Dispatch a relayed request to its handler.
///
/// The route is resolved into a typed command once, at this boundary.
/// Unknown routes and malformed payloads become 400 responses; this function
/// never fails.
pub async fn handle_request<S: FileSource, K: SaveSink>(
    source: &S,
    sink: &K,
    request: &RelayRequest,
) -> RelayResponse {
    match RelayCommand::parse(request) {
        Ok(RelayCommand::ReadFile(descriptor)) => read_file(source, &descriptor).await,
        Ok(RelayCommand::SaveFile(save)) => save_file(sink, &save),
        Err(err) => err.into_response(),
    }
}
