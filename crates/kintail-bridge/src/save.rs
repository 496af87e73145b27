//! File-save seam.
//!
//! Saving delegates to an external capability (a blob write plus a browser
//! download) behind the [`SaveSink`] trait. The save is fire-and-forget:
//! there is no signal whether the user accepted the resulting dialog, so
//! handlers treat delivery to the sink as success.

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Blob, BlobPropertyBag, Document, HtmlAnchorElement, Url};

use kintail_proto::TEXT_PLAIN_UTF8;

/// Failure handing contents to the save capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveError {
    /// The save capability was unavailable or rejected the blob
    Unavailable(String),
}

impl SaveError {
    /// Convert to a user-facing error message.
    pub fn message(&self) -> &str {
        match self {
            SaveError::Unavailable(detail) => detail,
        }
    }
}

/// Capability that writes text contents to a user-visible file.
pub trait SaveSink {
    /// Offer `contents` to the user as a download named `filename`.
    fn save_text(&self, filename: &str, contents: &str) -> Result<(), SaveError>;
}

// =============================================================================
// DOM implementation
// =============================================================================

/// [`SaveSink`] that builds a text blob and triggers a browser download
/// through a synthetic anchor click.
#[derive(Clone)]
pub struct DomSaveSink {
    document: Document,
}

impl DomSaveSink {
    /// Create a sink saving through the given document.
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl SaveSink for DomSaveSink {
    fn save_text(&self, filename: &str, contents: &str) -> Result<(), SaveError> {
        let parts = js_sys::Array::of1(&JsValue::from_str(contents));
        let options = BlobPropertyBag::new();
        options.set_type(TEXT_PLAIN_UTF8);
        let blob = Blob::new_with_str_sequence_and_options(&parts, &options)
            .map_err(|err| SaveError::Unavailable(crate::js_error_message(&err)))?;

        let url = Url::create_object_url_with_blob(&blob)
            .map_err(|err| SaveError::Unavailable(crate::js_error_message(&err)))?;

        let anchor = self
            .document
            .create_element("a")
            .map_err(|err| SaveError::Unavailable(crate::js_error_message(&err)))?
            .dyn_into::<HtmlAnchorElement>()
            .map_err(|_| SaveError::Unavailable(String::from("could not create anchor")))?;
        anchor.set_href(&url);
        anchor.set_download(filename);
        anchor.click();

        let _ = Url::revoke_object_url(&url);
        Ok(())
    }
}
