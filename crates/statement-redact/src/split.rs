//! Page extraction and page geometry
//!
//! Cuts a single page out of a statement, keeping only the objects that page
//! still references.

use crate::error::RedactError;
use lopdf::{Document, Object, ObjectId};

/// Page box in PDF user space: lower-left and upper-right corners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl PageBox {
    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }
}

pub(crate) fn load(bytes: &[u8]) -> Result<Document, RedactError> {
    Document::load_mem(bytes).map_err(|e| RedactError::ParseError(e.to_string()))
}

/// Object id of a 1-indexed page
pub(crate) fn page_id(doc: &Document, page: u32) -> Result<ObjectId, RedactError> {
    let pages = doc.get_pages();
    pages
        .get(&page)
        .copied()
        .ok_or(RedactError::PageNotFound {
            page,
            page_count: pages.len() as u32,
        })
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// MediaBox of a page, following the page tree for inherited values
pub fn media_box(doc: &Document, page: u32) -> Result<PageBox, RedactError> {
    let mut node = Some(page_id(doc, page)?);
    // Bounded walk up the page tree
    for _ in 0..32 {
        let Some(id) = node else { break };
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };

        if let Some(Object::Array(values)) = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|value| resolve(doc, value))
        {
            let coords: Vec<f64> = values
                .iter()
                .filter_map(|v| resolve(doc, v).and_then(number))
                .collect();
            if let [x0, y0, x1, y1] = coords[..] {
                return Ok(PageBox {
                    llx: x0.min(x1),
                    lly: y0.min(y1),
                    urx: x0.max(x1),
                    ury: y0.max(y1),
                });
            }
            return Err(RedactError::MissingMediaBox(page));
        }

        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Err(RedactError::MissingMediaBox(page))
}

/// Build a one-page document containing only `page` (1-indexed)
pub fn extract_page(doc: &Document, page: u32) -> Result<Document, RedactError> {
    let page_count = doc.get_pages().len() as u32;
    if page == 0 || page > page_count {
        return Err(RedactError::PageNotFound { page, page_count });
    }

    let mut single = doc.clone();

    // Delete in reverse order so remaining page numbers stay valid
    let others: Vec<u32> = (1..=page_count).rev().filter(|p| *p != page).collect();
    for page_num in others {
        single.delete_pages(&[page_num]);
    }

    single.prune_objects();
    Ok(single)
}

/// Serialize a document
pub(crate) fn save(mut doc: Document) -> Result<Vec<u8>, RedactError> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| RedactError::OperationError(format!("Save failed: {}", e)))?;
    Ok(buffer)
}
