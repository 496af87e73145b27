//! File-input access seam.
//!
//! Handlers validate a requested descriptor against whatever the live
//! `<input type=file>` element currently holds. That access goes through the
//! [`FileSource`] trait so validation and dispatch are testable without a DOM;
//! [`DomFileSource`] is the browser implementation.

use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, File, HtmlInputElement};

/// Metadata snapshot of a live file, in the shape validation compares.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSnapshot {
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Last-modified time, milliseconds since the Unix epoch
    pub last_modified: i64,
    /// MIME type
    pub mime_type: String,
}

/// Failure reading a file's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadError {
    /// The file could not be read as text
    Unreadable(String),
}

impl ReadError {
    /// Convert to a user-facing error message.
    pub fn message(&self) -> &str {
        match self {
            ReadError::Unreadable(detail) => detail,
        }
    }
}

/// Read-only access to the file-input elements of the page.
#[allow(async_fn_in_trait)]
pub trait FileSource {
    /// Number of files selected on the element, or `None` if no file-input
    /// element with that id exists.
    fn file_count(&self, element_id: &str) -> Option<usize>;

    /// Metadata snapshot of the file at `index` on the element.
    fn snapshot(&self, element_id: &str, index: usize) -> Option<FileSnapshot>;

    /// Read the file at `index` as text. Suspends until the read completes.
    async fn read_text(&self, element_id: &str, index: usize) -> Result<String, ReadError>;
}

// =============================================================================
// DOM implementation
// =============================================================================

/// [`FileSource`] backed by the page's document.
#[derive(Clone)]
pub struct DomFileSource {
    document: Document,
}

impl DomFileSource {
    /// Create a source reading from the given document.
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn input(&self, element_id: &str) -> Option<HtmlInputElement> {
        self.document
            .get_element_by_id(element_id)?
            .dyn_into::<HtmlInputElement>()
            .ok()
    }

    fn file(&self, element_id: &str, index: usize) -> Option<File> {
        let files = self.input(element_id)?.files()?;
        files.item(index as u32)
    }
}

impl FileSource for DomFileSource {
    fn file_count(&self, element_id: &str) -> Option<usize> {
        let files = self.input(element_id)?.files()?;
        Some(files.length() as usize)
    }

    fn snapshot(&self, element_id: &str, index: usize) -> Option<FileSnapshot> {
        let file = self.file(element_id, index)?;
        Some(FileSnapshot {
            name: file.name(),
            size: file.size() as u64,
            last_modified: file.last_modified() as i64,
            mime_type: file.type_(),
        })
    }

    async fn read_text(&self, element_id: &str, index: usize) -> Result<String, ReadError> {
        // Re-resolve the file: the selection may have changed between the
        // validation pass and this read.
        let file = self.file(element_id, index).ok_or_else(|| {
            ReadError::Unreadable(String::from("file input changed during read"))
        })?;
        let text = JsFuture::from(file.text())
            .await
            .map_err(|err| ReadError::Unreadable(crate::js_error_message(&err)))?;
        Ok(text.as_string().unwrap_or_default())
    }
}
