//! Uploaded file and page selection state

use std::fmt;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::preview::PagePreviewCache;

/// Media type accepted for statement uploads
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Binary document plus its declared media type
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub media_type: String,
    bytes: Arc<[u8]>,
}

impl UploadedFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Shorthand for a PDF upload
    pub fn pdf(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(name, PDF_MEDIA_TYPE, bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// Pages of the uploaded file and which of them are selected
#[derive(Debug, Clone, PartialEq)]
pub struct PageSelection {
    /// Identifier issued by the page-count collaborator
    pub file_id: String,
    pub num_pages: u32,
    /// Selected pages in the order they were selected
    pub selected_pages: Vec<u32>,
    pub previews: PagePreviewCache,
}

impl PageSelection {
    pub fn new(file_id: impl Into<String>, num_pages: u32) -> Result<Self, WorkflowError> {
        if num_pages < 1 {
            return Err(WorkflowError::InvalidPageCount(num_pages));
        }
        Ok(Self {
            file_id: file_id.into(),
            num_pages,
            selected_pages: Vec::new(),
            previews: PagePreviewCache::new(),
        })
    }

    pub fn is_selected(&self, page: u32) -> bool {
        self.selected_pages.contains(&page)
    }

    /// Select an unselected page or deselect a selected one.
    ///
    /// Page numbers are not range-checked here.
    pub fn toggle(&mut self, page: u32) {
        if let Some(pos) = self.selected_pages.iter().position(|&p| p == page) {
            self.selected_pages.remove(pos);
        } else {
            self.selected_pages.push(page);
        }
    }

    /// Selected pages that fall outside `1..=num_pages`
    pub fn out_of_range(&self) -> Vec<u32> {
        self.selected_pages
            .iter()
            .copied()
            .filter(|&p| p == 0 || p > self.num_pages)
            .collect()
    }
}

/// The uploaded file and its page selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    file: Option<UploadedFile>,
    page_selection: Option<PageSelection>,
}

impl SelectionState {
    pub fn file(&self) -> Option<&UploadedFile> {
        self.file.as_ref()
    }

    pub fn page_selection(&self) -> Option<&PageSelection> {
        self.page_selection.as_ref()
    }

    pub fn page_selection_mut(&mut self) -> Option<&mut PageSelection> {
        self.page_selection.as_mut()
    }

    /// Replace the uploaded file, returning the previous one.
    ///
    /// The page selection is left alone; callers decide when to reset it.
    pub fn set_file(&mut self, file: Option<UploadedFile>) -> Option<UploadedFile> {
        std::mem::replace(&mut self.file, file)
    }

    /// Start a fresh selection with no selected pages and no previews,
    /// returning the selection it replaces
    pub fn init_selection(
        &mut self,
        file_id: impl Into<String>,
        num_pages: u32,
    ) -> Result<Option<PageSelection>, WorkflowError> {
        let selection = PageSelection::new(file_id, num_pages)?;
        Ok(self.page_selection.replace(selection))
    }

    /// Replace the whole selection, returning the previous one
    pub fn set_page_selection(&mut self, selection: Option<PageSelection>) -> Option<PageSelection> {
        std::mem::replace(&mut self.page_selection, selection)
    }

    /// Toggle a page. Returns false when there is no selection to update.
    pub fn toggle(&mut self, page: u32) -> bool {
        match self.page_selection.as_mut() {
            Some(selection) => {
                selection.toggle(page);
                true
            }
            None => false,
        }
    }

    /// Drop both file and selection, returning the selection
    pub fn clear(&mut self) -> Option<PageSelection> {
        self.file = None;
        self.page_selection.take()
    }
}

/// Parse a page list like "2,5,3" or "1-3, 7" keeping the given order.
///
/// Duplicates are dropped after their first occurrence and ranges expand in
/// ascending order.
pub fn parse_page_list(input: &str) -> Result<Vec<u32>, String> {
    let mut pages: Vec<u32> = Vec::new();

    let mut push = |page: u32| {
        if !pages.contains(&page) {
            pages.push(page);
        }
    };

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| format!("Invalid start: {}", start))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| format!("Invalid end: {}", end))?;

            if start == 0 {
                return Err("Page numbers must be >= 1".to_string());
            }
            if start > end {
                return Err(format!("Start {} > end {}", start, end));
            }

            for page in start..=end {
                push(page);
            }
        } else {
            let page: u32 = part
                .parse()
                .map_err(|_| format!("Invalid page: {}", part))?;
            if page == 0 {
                return Err("Page numbers must be >= 1".to_string());
            }
            push(page);
        }
    }

    Ok(pages)
}
