//! Relay of an intercepted request to the client that issued it.
//!
//! Each relay opens a dedicated two-ended message channel, sends the request
//! together with one end to the client, and waits for the single message
//! arriving on the other end. Correlation runs through a [`RelayTable`]
//! entry per relay; the port handler only settles that entry.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Client, Clients, MessageChannel, MessageEvent};

use kintail_proto::{RelayRequest, RelayResponse};
use kintail_relay::{RelayError, RelayTable};

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

/// Send `request` to the client with id `client_id` and wait for its reply.
///
/// Exactly one response per request: no retry, no timeout. Failing to locate
/// the client, to post the request, or to decode the reply fails the relay;
/// the caller maps that onto an HTTP error response.
pub(crate) async fn request_from_client(
    clients: &Clients,
    client_id: &str,
    request: &RelayRequest,
    table: &RelayTable<RelayResponse>,
) -> Result<RelayResponse, RelayError> {
    if client_id.is_empty() {
        return Err(RelayError::ClientNotFound);
    }

    let resolved = JsFuture::from(clients.get(client_id))
        .await
        .map_err(|err| RelayError::Transport(js_error_message(&err)))?;
    // clients.get resolves with undefined when the context is gone.
    let client: Client = resolved
        .dyn_into()
        .map_err(|_| RelayError::ClientNotFound)?;

    let channel =
        MessageChannel::new().map_err(|err| RelayError::Transport(js_error_message(&err)))?;

    let (correlation, ticket) = table.register();
    let reply_table = table.clone();
    let on_reply = Closure::once(move |event: MessageEvent| {
        let settled = match event.data().as_string() {
            Some(text) => match serde_json::from_str::<RelayResponse>(&text) {
                Ok(reply) => reply_table.resolve(correlation, reply),
                Err(err) => {
                    reply_table.reject(correlation, RelayError::MalformedReply(err.to_string()))
                }
            },
            None => reply_table.reject(
                correlation,
                RelayError::MalformedReply(String::from("reply was not a string")),
            ),
        };
        if !settled {
            log(&format!(
                "[kintail-worker] Stray reply for correlation {}",
                correlation
            ));
        }
    });
    channel.port1().set_onmessage(Some(on_reply.as_ref().unchecked_ref()));
    // The channel carries exactly one message pair; the handler lives with it.
    on_reply.forget();

    let payload =
        serde_json::to_string(request).map_err(|err| RelayError::Transport(err.to_string()))?;
    let transfer = js_sys::Array::of1(&channel.port2());
    client
        .post_message_with_transfer(&JsValue::from_str(&payload), &transfer)
        .map_err(|err| RelayError::Transport(js_error_message(&err)))?;

    ticket.await
}
