//! Page preview resources
//!
//! A preview is a displayable image handle published by a [`PreviewHost`]
//! (an object URL, a temp file, an in-memory blob). The cache owns every
//! handle it holds until the handle is released or superseded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::PreviewError;

/// Displayable image handle for one page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PreviewHandle {
    pub page: u32,
    pub locator: String,
}

/// Creates and frees preview resources.
///
/// Implementations must not call back into the workflow store.
pub trait PreviewHost: Send + Sync {
    /// Turn rendered image bytes into a displayable handle
    fn publish(&self, page: u32, image: &[u8]) -> Result<PreviewHandle, PreviewError>;

    /// Free the resource behind a handle
    fn release(&self, handle: &PreviewHandle) -> Result<(), PreviewError>;
}

/// Keeps preview images in memory, keyed by a `memory://` locator
#[derive(Debug, Default)]
pub struct MemoryPreviewHost {
    images: Mutex<HashMap<String, Arc<[u8]>>>,
}

impl MemoryPreviewHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image bytes behind a live handle
    pub fn image(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.images.lock().get(&handle.locator).cloned()
    }

    /// Number of handles published and not yet released
    pub fn live_count(&self) -> usize {
        self.images.lock().len()
    }
}

impl PreviewHost for MemoryPreviewHost {
    fn publish(&self, page: u32, image: &[u8]) -> Result<PreviewHandle, PreviewError> {
        let locator = format!("memory://page-{}/{}", page, Uuid::new_v4());
        self.images.lock().insert(locator.clone(), Arc::from(image));
        Ok(PreviewHandle { page, locator })
    }

    fn release(&self, handle: &PreviewHandle) -> Result<(), PreviewError> {
        match self.images.lock().remove(&handle.locator) {
            Some(_) => Ok(()),
            None => Err(PreviewError(format!(
                "{} is not a live preview",
                handle.locator
            ))),
        }
    }
}

/// Preview handles of the current page selection, by page number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePreviewCache {
    previews: BTreeMap<u32, PreviewHandle>,
}

impl PagePreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: u32) -> Option<&PreviewHandle> {
        self.previews.get(&page)
    }

    /// Store a handle, returning the handle it supersedes
    pub fn insert(&mut self, handle: PreviewHandle) -> Option<PreviewHandle> {
        self.previews.insert(handle.page, handle)
    }

    /// Remove every handle from the cache, leaving it empty
    pub fn take_all(&mut self) -> Vec<PreviewHandle> {
        std::mem::take(&mut self.previews).into_values().collect()
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.previews.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreviewHandle> {
        self.previews.values()
    }

    pub fn len(&self) -> usize {
        self.previews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }
}

/// Release handles through the host. Failures are logged, never raised.
///
/// Returns the pages whose handles were released.
pub fn release_all(host: &dyn PreviewHost, handles: Vec<PreviewHandle>) -> Vec<u32> {
    let mut released = Vec::with_capacity(handles.len());
    for handle in handles {
        match host.release(&handle) {
            Ok(()) => {
                debug!(page = handle.page, locator = %handle.locator, "Released preview");
            }
            Err(e) => {
                error!(page = handle.page, error = %e, "Failed to release preview");
            }
        }
        released.push(handle.page);
    }
    released
}
