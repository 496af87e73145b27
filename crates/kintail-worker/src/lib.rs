//! Service-worker interceptor for Kintail Local
//!
//! This crate runs inside the service worker. It intercepts fetches to the
//! reserved virtual origin (`https://kintail/local/`), relays them to the
//! page that issued them over a transient message channel, and turns the
//! relayed result back into an HTTP response. Everything else is passed
//! through to the network.
//!
//! ## Lifecycle
//!
//! `install -> skip waiting -> activate -> claim clients -> active`
//!
//! The worker activates immediately and claims all open clients so
//! interception applies without a page reload; the page-side bridge
//! guarantees freshness by re-registering on every load.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{ExtendableEvent, FetchEvent, ServiceWorkerGlobalScope};

use kintail_proto::RelayResponse;
use kintail_relay::RelayTable;

mod clients;
mod interceptor;

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

pub(crate) fn js_error_message(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// Attach the install/activate/fetch handlers on the worker global scope.
///
/// Called once by the worker script shim after the module is instantiated.
#[wasm_bindgen]
pub fn init_interceptor() -> Result<(), JsValue> {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    let scope: ServiceWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .map_err(|_| JsValue::from_str("not running in a service worker scope"))?;

    let table: RelayTable<RelayResponse> = RelayTable::new();

    // Force immediate activation instead of waiting for the previous worker
    // to finish serving existing pages.
    let install_scope = scope.clone();
    let on_install = Closure::wrap(Box::new(move |event: ExtendableEvent| {
        match install_scope.skip_waiting() {
            Ok(promise) => {
                if let Err(err) = event.wait_until(&promise) {
                    log(&format!(
                        "[kintail-worker] skipWaiting failed: {}",
                        js_error_message(&err)
                    ));
                }
            }
            Err(err) => log(&format!(
                "[kintail-worker] skipWaiting failed: {}",
                js_error_message(&err)
            )),
        }
    }) as Box<dyn FnMut(ExtendableEvent)>);
    scope.set_oninstall(Some(on_install.as_ref().unchecked_ref()));
    on_install.forget();

    // Claim all open clients so interception starts without a reload.
    let activate_scope = scope.clone();
    let on_activate = Closure::wrap(Box::new(move |event: ExtendableEvent| {
        if let Err(err) = event.wait_until(&activate_scope.clients().claim()) {
            log(&format!(
                "[kintail-worker] clients.claim failed: {}",
                js_error_message(&err)
            ));
        }
    }) as Box<dyn FnMut(ExtendableEvent)>);
    scope.set_onactivate(Some(on_activate.as_ref().unchecked_ref()));
    on_activate.forget();

    let fetch_scope = scope.clone();
    let on_fetch = Closure::wrap(Box::new(move |event: FetchEvent| {
        if let Err(err) = interceptor::handle_fetch(&fetch_scope, &table, &event) {
            log(&format!(
                "[kintail-worker] respondWith failed: {}",
                js_error_message(&err)
            ));
        }
    }) as Box<dyn FnMut(FetchEvent)>);
    scope.set_onfetch(Some(on_fetch.as_ref().unchecked_ref()));
    // Handlers live for the whole worker lifetime.
    on_fetch.forget();

    log("[kintail-worker] Interceptor installed");
    Ok(())
}
