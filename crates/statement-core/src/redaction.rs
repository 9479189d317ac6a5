//! Redaction region capture for a single page
//!
//! The rendering surface owns move/resize interaction; this module keeps the
//! resulting rectangles in surface pixels and converts them to page units when
//! the user saves.

use serde::{Deserialize, Serialize};

use crate::coords::{self, Rect};
use crate::error::WorkflowError;

/// Placement and style of a freshly added region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDefaults {
    pub rect: Rect,
    pub color: String,
    pub opacity: f64,
}

impl Default for RegionDefaults {
    fn default() -> Self {
        Self {
            rect: Rect::new(100.0, 100.0, 400.0, 40.0),
            color: "#FF0000".to_string(),
            opacity: 0.5,
        }
    }
}

/// Independent stretch factors the surface applied to a shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stretch {
    pub x: f64,
    pub y: f64,
}

impl Default for Stretch {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// A rectangle drawn on the rendering surface, in surface pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawnRegion {
    pub rect: Rect,
    pub stretch: Stretch,
    pub color: String,
    pub opacity: f64,
}

/// A saved redaction rectangle in page units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionRegion {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub opacity: f64,
}

impl RedactionRegion {
    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width, self.height)
    }
}

/// Regions drawn on one page while drawing mode is active
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionCapture {
    page: u32,
    scale: Option<f64>,
    stale: bool,
    regions: Vec<DrawnRegion>,
    active: Option<usize>,
    defaults: RegionDefaults,
}

impl RedactionCapture {
    pub fn new(page: u32, defaults: RegionDefaults) -> Self {
        Self {
            page,
            scale: None,
            stale: false,
            regions: Vec::new(),
            active: None,
            defaults,
        }
    }

    /// Page being annotated
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Scale bound at the last render, if it is still valid
    pub fn scale(&self) -> Option<f64> {
        if self.stale {
            None
        } else {
            self.scale
        }
    }

    pub fn regions(&self) -> &[DrawnRegion] {
        &self.regions
    }

    /// Region currently selected for manipulation
    pub fn active_region(&self) -> Option<usize> {
        self.active
    }

    /// Bind the scale computed by the latest page render.
    ///
    /// Regions drawn under a previous scale are rescaled so that their page
    /// positions stay where the user put them.
    pub fn bind_render(&mut self, scale: f64) -> Result<(), WorkflowError> {
        let scale = coords::validate_scale(scale)?;

        if let Some(previous) = self.scale {
            if previous != scale {
                let ratio = scale / previous;
                for region in &mut self.regions {
                    region.rect = Rect::new(
                        region.rect.left * ratio,
                        region.rect.top * ratio,
                        region.rect.width * ratio,
                        region.rect.height * ratio,
                    );
                }
            }
        }

        self.scale = Some(scale);
        self.stale = false;
        Ok(())
    }

    /// Mark the bound scale as outdated (the surface was resized)
    pub fn invalidate_render(&mut self) {
        self.stale = true;
    }

    /// Append a region at the default placement and make it active
    pub fn add_region(&mut self) -> usize {
        self.regions.push(DrawnRegion {
            rect: self.defaults.rect,
            stretch: Stretch::default(),
            color: self.defaults.color.clone(),
            opacity: self.defaults.opacity,
        });
        let index = self.regions.len() - 1;
        self.active = Some(index);
        index
    }

    /// Record the geometry reported by the surface after a move or resize
    pub fn update_region(
        &mut self,
        index: usize,
        rect: Rect,
        stretch: Stretch,
    ) -> Result<(), WorkflowError> {
        let region = self
            .regions
            .get_mut(index)
            .ok_or(WorkflowError::RegionNotFound(index))?;
        region.rect = rect;
        region.stretch = stretch;
        self.active = Some(index);
        Ok(())
    }

    pub fn remove_region(&mut self, index: usize) -> Result<DrawnRegion, WorkflowError> {
        if index >= self.regions.len() {
            return Err(WorkflowError::RegionNotFound(index));
        }
        let removed = self.regions.remove(index);
        self.active = match self.active {
            Some(active) if active == index => None,
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        Ok(removed)
    }

    /// Convert every drawn region to page units, in drawing order
    pub fn save(&self) -> Result<Vec<RedactionRegion>, WorkflowError> {
        if self.regions.is_empty() {
            return Ok(Vec::new());
        }

        let scale = self.scale().ok_or(WorkflowError::RenderNotBound)?;

        self.regions
            .iter()
            .map(|region| {
                let native =
                    coords::to_native(region.rect.stretched(region.stretch.x, region.stretch.y), scale)?;
                Ok(RedactionRegion {
                    left: native.left,
                    top: native.top,
                    width: native.width,
                    height: native.height,
                    color: region.color.clone(),
                    opacity: region.opacity,
                })
            })
            .collect()
    }
}
