//! Page-side bridge for Kintail Local
//!
//! This crate runs in the page's main thread. It owns the service worker
//! lifecycle and answers the requests the worker relays back: the worker can
//! intercept fetches to the virtual origin, but only the page can reach the
//! DOM file inputs the requests are about.
//!
//! ## Module Structure
//!
//! - `source` - read access to `<input type=file>` elements (trait + DOM impl)
//! - `save` - the file-save capability (trait + DOM impl)
//! - `handlers` - request validation and dispatch
//! - `testing` - in-memory seam implementations for host tests
//!
//! Each inbound relay message carries a JSON request plus a reply port; the
//! bridge dispatches on its own task and always answers on that port, so
//! concurrent relays never interleave.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Document, MessageEvent, MessagePort, ServiceWorkerContainer, ServiceWorkerRegistration,
};

use kintail_proto::{RelayRequest, RelayResponse};

pub mod handlers;
pub mod save;
pub mod source;
pub mod testing;

pub use handlers::{handle_request, read_file, save_file};
pub use save::{DomSaveSink, SaveError, SaveSink};
pub use source::{DomFileSource, FileSnapshot, FileSource, ReadError};

/// Worker script the bridge registers when none is configured.
pub const DEFAULT_WORKER_URL: &str = "/kintail_worker.js";

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    pub(crate) fn log(s: &str);
}

/// Host stand-in so handler logic stays testable off the browser.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn log(s: &str) {
    let _ = s;
}

pub(crate) fn js_error_message(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

// =============================================================================
// Bridge lifecycle
// =============================================================================

/// Owns the worker registration and the inbound relay subscription.
///
/// Registration state lives here, not in ambient registry state:
/// `ensure_registered` is idempotent per bridge instance, and a fresh
/// instance always replaces whatever worker a previous page load left behind.
#[wasm_bindgen]
pub struct LocalFileBridge {
    worker_url: String,
    registered: bool,
    /// Stored to prevent the inbound handler from being garbage collected
    onmessage: Option<Closure<dyn FnMut(MessageEvent)>>,
}

#[wasm_bindgen]
impl LocalFileBridge {
    /// Create a bridge that will register the given worker script
    /// (defaults to [`DEFAULT_WORKER_URL`]).
    #[wasm_bindgen(constructor)]
    pub fn new(worker_url: Option<String>) -> Self {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        Self {
            worker_url: worker_url.unwrap_or_else(|| String::from(DEFAULT_WORKER_URL)),
            registered: false,
            onmessage: None,
        }
    }

    /// Register the worker and start answering relayed requests.
    ///
    /// Resolves only after registration completes and the subscription is
    /// installed. Calling it again is a no-op.
    pub async fn init(&mut self) -> Result<(), JsValue> {
        self.ensure_registered().await
    }

    /// Whether the worker is registered and the bridge is listening.
    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl LocalFileBridge {
    async fn ensure_registered(&mut self) -> Result<(), JsValue> {
        if self.registered {
            return Ok(());
        }

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let container = window.navigator().service_worker();

        // Never serve stale worker code: an existing registration is dropped
        // and replaced rather than reused.
        let existing = JsFuture::from(container.get_registration()).await?;
        if !existing.is_undefined() && !existing.is_null() {
            let registration: ServiceWorkerRegistration = existing.dyn_into()?;
            log("[kintail-bridge] Replacing existing worker registration");
            JsFuture::from(registration.unregister()?).await?;
        }

        JsFuture::from(container.register(&self.worker_url)).await?;
        log(&format!(
            "[kintail-bridge] Registered worker from '{}'",
            self.worker_url
        ));

        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        self.subscribe(&container, document);
        self.registered = true;
        Ok(())
    }

    /// Install the inbound relay subscription.
    fn subscribe(&mut self, container: &ServiceWorkerContainer, document: Document) {
        let source = DomFileSource::new(document.clone());
        let sink = DomSaveSink::new(document);

        let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
            let port: MessagePort = match event.ports().get(0).dyn_into() {
                Ok(port) => port,
                Err(_) => {
                    log("[kintail-bridge] Relay message arrived without a reply port");
                    return;
                }
            };

            let request = event
                .data()
                .as_string()
                .ok_or_else(|| String::from("relay message was not a string"))
                .and_then(|text| {
                    serde_json::from_str::<RelayRequest>(&text).map_err(|err| err.to_string())
                });

            // Each relay is answered independently on its own reply port.
            let source = source.clone();
            let sink = sink.clone();
            spawn_local(async move {
                let response = match request {
                    Ok(request) => handle_request(&source, &sink, &request).await,
                    Err(detail) => {
                        log(&format!("[kintail-bridge] Bad relay message: {}", detail));
                        RelayResponse::bad_request(format!(
                            "Could not parse relay request: {}",
                            detail
                        ))
                    }
                };
                post_reply(&port, &response);
            });
        }) as Box<dyn FnMut(MessageEvent)>);

        container.set_onmessage(Some(closure.as_ref().unchecked_ref()));
        self.onmessage = Some(closure);
    }
}

/// Post the response back on the reply port, success or failure alike.
fn post_reply(port: &MessagePort, response: &RelayResponse) {
    match serde_json::to_string(response) {
        Ok(json) => {
            if let Err(err) = port.post_message(&JsValue::from_str(&json)) {
                log(&format!(
                    "[kintail-bridge] Posting reply failed: {}",
                    js_error_message(&err)
                ));
            }
        }
        Err(err) => log(&format!("[kintail-bridge] Encoding reply failed: {}", err)),
    }
}
