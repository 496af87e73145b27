//! In-memory implementations of the bridge seams for testing.
//!
//! Nothing here touches a DOM: file inputs are a map of element ids to file
//! lists, saves are recorded. The handler and dispatch logic runs against
//! these on the host.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use kintail_proto::FileDescriptor;

use crate::save::{SaveError, SaveSink};
use crate::source::{FileSnapshot, FileSource, ReadError};

/// A file "selected" on an in-memory element.
#[derive(Clone, Debug)]
pub struct MemoryFile {
    /// Metadata as validation sees it
    pub snapshot: FileSnapshot,
    /// Text contents returned by a read
    pub contents: String,
    /// When false, reads of this file fail
    pub readable: bool,
}

impl MemoryFile {
    /// A readable text file; size is derived from the contents.
    pub fn text(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: i64,
        contents: impl Into<String>,
    ) -> Self {
        let contents = contents.into();
        Self {
            snapshot: FileSnapshot {
                name: name.into(),
                size: contents.len() as u64,
                last_modified,
                mime_type: mime_type.into(),
            },
            contents,
            readable: true,
        }
    }

    /// A file whose metadata validates but whose read fails.
    pub fn unreadable(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            snapshot: FileSnapshot {
                name: name.into(),
                size,
                last_modified: 0,
                mime_type: mime_type.into(),
            },
            contents: String::new(),
            readable: false,
        }
    }
}

/// In-memory [`FileSource`].
#[derive(Default)]
pub struct MemoryFileSource {
    elements: RefCell<BTreeMap<String, Vec<MemoryFile>>>,
}

impl MemoryFileSource {
    /// Create an empty source with no elements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a file-input element with the given selection.
    pub fn insert_element(&self, element_id: impl Into<String>, files: Vec<MemoryFile>) {
        self.elements.borrow_mut().insert(element_id.into(), files);
    }

    /// Build the descriptor that matches the live file at `index` exactly.
    pub fn descriptor(&self, element_id: &str, index: usize) -> Option<FileDescriptor> {
        let elements = self.elements.borrow();
        let file = elements.get(element_id)?.get(index)?;
        Some(FileDescriptor {
            element_id: String::from(element_id),
            index: index as i64,
            name: file.snapshot.name.clone(),
            size: file.snapshot.size,
            last_modified: file.snapshot.last_modified,
            mime_type: file.snapshot.mime_type.clone(),
        })
    }
}

impl FileSource for MemoryFileSource {
    fn file_count(&self, element_id: &str) -> Option<usize> {
        self.elements
            .borrow()
            .get(element_id)
            .map(|files| files.len())
    }

    fn snapshot(&self, element_id: &str, index: usize) -> Option<FileSnapshot> {
        self.elements
            .borrow()
            .get(element_id)?
            .get(index)
            .map(|file| file.snapshot.clone())
    }

    async fn read_text(&self, element_id: &str, index: usize) -> Result<String, ReadError> {
        let elements = self.elements.borrow();
        let file = elements
            .get(element_id)
            .and_then(|files| files.get(index))
            .ok_or_else(|| ReadError::Unreadable(String::from("no such file")))?;
        if !file.readable {
            return Err(ReadError::Unreadable(String::from("simulated read failure")));
        }
        Ok(file.contents.clone())
    }
}

/// [`SaveSink`] that records every save instead of touching the browser.
#[derive(Default)]
pub struct RecordingSaveSink {
    saves: RefCell<Vec<(String, String)>>,
    fail_next: Cell<bool>,
}

impl RecordingSaveSink {
    /// Create a sink with no recorded saves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next save fail.
    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    /// All recorded `(filename, contents)` pairs, in order.
    pub fn saves(&self) -> Vec<(String, String)> {
        self.saves.borrow().clone()
    }
}

impl SaveSink for RecordingSaveSink {
    fn save_text(&self, filename: &str, contents: &str) -> Result<(), SaveError> {
        if self.fail_next.replace(false) {
            return Err(SaveError::Unavailable(String::from("simulated sink failure")));
        }
        self.saves
            .borrow_mut()
            .push((String::from(filename), String::from(contents)));
        Ok(())
    }
}
