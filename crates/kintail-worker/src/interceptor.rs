//! Fetch interception and HTTP response synthesis.

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{FetchEvent, Headers, Request, ResponseInit, ServiceWorkerGlobalScope};

use kintail_proto::{virtual_path, RelayRequest, RelayResponse};
use kintail_relay::{RelayError, RelayTable};

use crate::clients::request_from_client;
use crate::js_error_message;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

#[cfg(not(target_arch = "wasm32"))]
fn log(s: &str) {
    let _ = s;
}

/// Route a fetch: virtual-origin URLs are answered via the relay, everything
/// else passes through to the real network fetch unmodified.
pub(crate) fn handle_fetch(
    scope: &ServiceWorkerGlobalScope,
    table: &RelayTable<RelayResponse>,
    event: &FetchEvent,
) -> Result<(), JsValue> {
    let request = event.request();
    let url = request.url();

    match virtual_path(&url) {
        Some(path) => {
            let path = path.to_string();
            let client_id = event.client_id().unwrap_or_default();
            let scope = scope.clone();
            let table = table.clone();
            let responder = future_to_promise(async move {
                respond_virtual(&scope, &table, client_id, path, request)
                    .await
                    .map(JsValue::from)
            });
            event.respond_with(&responder)
        }
        None => event.respond_with(&scope.fetch_with_request(&request)),
    }
}

/// Run the relay round trip and synthesize the HTTP response.
///
/// A relay failure produces a 502 Bad Gateway response instead of leaving
/// the fetch unresolved; the failure is also logged here at the boundary.
async fn respond_virtual(
    scope: &ServiceWorkerGlobalScope,
    table: &RelayTable<RelayResponse>,
    client_id: String,
    path: String,
    request: Request,
) -> Result<web_sys::Response, JsValue> {
    let reply = match relay_round_trip(scope, table, &client_id, path, request).await {
        Ok(reply) => reply,
        Err(err) => {
            log(&format!(
                "[kintail-worker] Responding failed: {}",
                err.message()
            ));
            RelayResponse::bad_gateway(err.message())
        }
    };
    build_http_response(&reply)
}

async fn relay_round_trip(
    scope: &ServiceWorkerGlobalScope,
    table: &RelayTable<RelayResponse>,
    client_id: &str,
    path: String,
    request: Request,
) -> Result<RelayResponse, RelayError> {
    let body = read_body_text(&request).await?;
    let relay_request = RelayRequest { path, body };
    request_from_client(&scope.clients(), client_id, &relay_request, table).await
}

async fn read_body_text(request: &Request) -> Result<String, RelayError> {
    let promise = request
        .text()
        .map_err(|err| RelayError::Transport(js_error_message(&err)))?;
    let text = JsFuture::from(promise)
        .await
        .map_err(|err| RelayError::Transport(js_error_message(&err)))?;
    Ok(text.as_string().unwrap_or_default())
}

/// Build the outgoing HTTP response from a relayed one: status, status text,
/// body, and a single `Content-Type` header.
fn build_http_response(reply: &RelayResponse) -> Result<web_sys::Response, JsValue> {
    let headers = Headers::new()?;
    headers.append("Content-Type", &reply.content_type)?;

    let init = ResponseInit::new();
    init.set_status(reply.status);
    init.set_status_text(&reply.status_text);
    init.set_headers(&headers);

    web_sys::Response::new_with_opt_str_and_init(Some(&reply.body), &init)
}
