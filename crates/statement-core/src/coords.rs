//! Coordinate transformation between the rendering surface and the page
//!
//! Surface coordinates are pixels on the drawing surface, page coordinates are
//! the document's own units. Both use a top-left origin; the only difference is
//! the rendering scale, computed once per page render.

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Axis-aligned rectangle with a top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Apply independent horizontal/vertical stretch factors to the size
    pub fn stretched(self, stretch_x: f64, stretch_y: f64) -> Self {
        Self {
            width: self.width * stretch_x,
            height: self.height * stretch_y,
            ..self
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            left: f(self.left),
            top: f(self.top),
            width: f(self.width),
            height: f(self.height),
        }
    }
}

/// Check that a scale factor can be used for conversion
pub fn validate_scale(scale: f64) -> Result<f64, WorkflowError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(WorkflowError::InvalidScale(scale))
    }
}

/// Scale that fits a page inside a surface while preserving its aspect ratio
pub fn fit_scale(
    page_width: f64,
    page_height: f64,
    surface_width: f64,
    surface_height: f64,
) -> Result<f64, WorkflowError> {
    let scale = (surface_width / page_width).min(surface_height / page_height);

    let dims = [page_width, page_height, surface_width, surface_height];
    if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
        return Err(WorkflowError::InvalidScale(scale));
    }

    validate_scale(scale)
}

/// Convert a surface rectangle (pixels) to page units
pub fn to_native(rect: Rect, scale: f64) -> Result<Rect, WorkflowError> {
    let scale = validate_scale(scale)?;
    Ok(rect.map(|v| v / scale))
}

/// Convert a page rectangle to surface pixels
pub fn to_pixel(rect: Rect, scale: f64) -> Result<Rect, WorkflowError> {
    let scale = validate_scale(scale)?;
    Ok(rect.map(|v| v * scale))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn scale() -> impl Strategy<Value = f64> {
        // (0, 10]
        (1u32..=10_000).prop_map(|n| n as f64 / 1000.0)
    }

    fn coordinate() -> impl Strategy<Value = f64> {
        0.0f64..5000.0
    }

    proptest! {
        /// Property: page -> surface -> page returns the original rectangle
        #[test]
        fn roundtrip_pixel_to_native(
            s in scale(),
            left in coordinate(),
            top in coordinate(),
            width in coordinate(),
            height in coordinate(),
        ) {
            let rect = Rect::new(left, top, width, height);
            let back = to_native(to_pixel(rect, s).unwrap(), s).unwrap();

            let tolerance = 1e-9 * (1.0 + left.max(top).max(width).max(height));
            prop_assert!((back.left - rect.left).abs() < tolerance);
            prop_assert!((back.top - rect.top).abs() < tolerance);
            prop_assert!((back.width - rect.width).abs() < tolerance);
            prop_assert!((back.height - rect.height).abs() < tolerance);
        }

        /// Property: a fitted page never exceeds the surface on either axis
        #[test]
        fn fitted_page_stays_inside_surface(
            page_w in 1.0f64..2000.0,
            page_h in 1.0f64..2000.0,
            surface_w in 1.0f64..4000.0,
            surface_h in 1.0f64..4000.0,
        ) {
            let s = fit_scale(page_w, page_h, surface_w, surface_h).unwrap();
            prop_assert!(page_w * s <= surface_w * (1.0 + 1e-12));
            prop_assert!(page_h * s <= surface_h * (1.0 + 1e-12));
        }
    }
}
