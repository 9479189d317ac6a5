//! Input files for an import: redaction plans and transaction edits

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use statement_core::{Rect, Stretch, Transaction};

/// Size of the surface the regions were drawn on, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

/// One rectangle as the drawing surface reported it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlannedRegion {
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default)]
    pub stretch: Stretch,
}

/// Regions to redact, per page.
///
/// ```json
/// {
///   "surface": { "width": 800, "height": 1000 },
///   "pages": { "2": [{ "left": 40, "top": 120, "width": 300, "height": 24 }] }
/// }
/// ```
///
/// With a `surface`, rectangles are surface pixels and each page is fitted
/// into it to find the scale. Without one they are page units.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RedactionPlan {
    #[serde(default)]
    pub surface: Option<Surface>,
    pub pages: BTreeMap<u32, Vec<PlannedRegion>>,
}

impl RedactionPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let plan: Self = read_json(path)?;
        if plan.pages.contains_key(&0) {
            bail!("{}: pages are numbered from 1", path.display());
        }
        Ok(plan)
    }
}

/// Field overrides keyed by transaction position in the extracted statement
///
/// ```json
/// { "0": { "description": "Rent" }, "3": { "amount": -12.5 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct TransactionEdits(pub BTreeMap<usize, Map<String, Value>>);

impl TransactionEdits {
    pub fn load(path: &Path) -> Result<Self> {
        let edits: Self = read_json(path)?;
        for fields in edits.0.values() {
            if fields.contains_key("id") {
                bail!("{}: transaction ids cannot be edited", path.display());
            }
        }
        Ok(edits)
    }

    /// The edited version of `transaction` at `index`, if there are edits for it
    pub fn apply(&self, index: usize, transaction: &Transaction) -> Option<Transaction> {
        let fields = self.0.get(&index)?;
        let mut edited = transaction.clone();
        for (name, value) in fields {
            edited.set_field(name, value.clone());
        }
        Some(edited)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
