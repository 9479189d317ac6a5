//! Painting redaction boxes into a page content stream

use crate::error::RedactError;
use crate::split::PageBox;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use statement_core::RedactionRegion;

/// Parse `#RRGGBB` into RGB components in 0..=1, black when unparseable
pub fn parse_hex_color(color: &str) -> (f32, f32, f32) {
    let hex = color.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .map(|value| value as f32 / 255.0)
    };
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => (r, g, b),
        _ => (0.0, 0.0, 0.0),
    }
}

/// Convert a top-left region in page units to a PDF rectangle `[x y w h]`
/// with the origin at the bottom-left of the page box
pub fn pdf_rect(region: &RedactionRegion, page_box: &PageBox) -> [f64; 4] {
    let x = page_box.llx + region.left;
    let y = page_box.ury - region.top - region.height;
    [x, y, region.width, region.height]
}

/// Filled, opaque rectangles for every region
pub fn region_operations(regions: &[RedactionRegion], page_box: &PageBox) -> Vec<Operation> {
    let mut ops = vec![Operation::new("q", vec![])];
    for region in regions {
        let (r, g, b) = parse_hex_color(&region.color);
        let [x, y, w, h] = pdf_rect(region, page_box);
        ops.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(x as f32),
                Object::Real(y as f32),
                Object::Real(w as f32),
                Object::Real(h as f32),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
    }
    ops.push(Operation::new("Q", vec![]));
    ops
}

fn add_stream(doc: &mut Document, operations: Vec<Operation>) -> Result<ObjectId, RedactError> {
    let bytes = Content { operations }
        .encode()
        .map_err(|e| RedactError::OperationError(e.to_string()))?;
    Ok(doc.add_object(Stream::new(Dictionary::new(), bytes)))
}

/// Paint `regions` on top of the existing page content.
///
/// The original content is wrapped in `q`/`Q` so its graphics state cannot
/// leak into the boxes painted after it.
pub fn paint_regions(
    doc: &mut Document,
    page_id: ObjectId,
    regions: &[RedactionRegion],
    page_box: &PageBox,
) -> Result<(), RedactError> {
    if regions.is_empty() {
        return Ok(());
    }

    let save_id = add_stream(doc, vec![Operation::new("q", vec![])])?;
    let mut boxes = vec![Operation::new("Q", vec![])];
    boxes.extend(region_operations(regions, page_box));
    let boxes_id = add_stream(doc, boxes)?;

    let page = doc
        .get_object_mut(page_id)
        .map_err(|e| RedactError::OperationError(e.to_string()))?;
    let Object::Dictionary(ref mut page_dict) = page else {
        return Err(RedactError::OperationError(format!(
            "Page object {:?} is not a dictionary",
            page_id
        )));
    };

    let existing = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(boxes_id));
    page_dict.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn letter() -> PageBox {
        PageBox {
            llx: 0.0,
            lly: 0.0,
            urx: 612.0,
            ury: 792.0,
        }
    }

    fn region(left: f64, top: f64, width: f64, height: f64) -> RedactionRegion {
        RedactionRegion {
            left,
            top,
            width,
            height,
            color: "#000000".to_string(),
            opacity: 0.5,
        }
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), (1.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("00FF00"), (0.0, 1.0, 0.0));
        assert_eq!(parse_hex_color("#abc"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("#zz0000"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("#00zz00"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("#+f0000"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_parse_hex_color_non_ascii_is_black() {
        assert_eq!(parse_hex_color("#aé1234"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("éééééé"), (0.0, 0.0, 0.0));
        assert_eq!(parse_hex_color("#00ff00é"), (0.0, 1.0, 0.0));
    }

    #[test]
    fn test_pdf_rect_flips_y() {
        let rect = pdf_rect(&region(100.0, 100.0, 200.0, 20.0), &letter());
        assert_eq!(rect, [100.0, 672.0, 200.0, 20.0]);
    }

    #[test]
    fn test_pdf_rect_respects_box_origin() {
        let page_box = PageBox {
            llx: 10.0,
            lly: 20.0,
            urx: 622.0,
            ury: 812.0,
        };
        let rect = pdf_rect(&region(0.0, 0.0, 50.0, 10.0), &page_box);
        assert_eq!(rect, [10.0, 802.0, 50.0, 10.0]);
    }

    #[test]
    fn test_region_operations_shape() {
        let ops = region_operations(&[region(0.0, 0.0, 1.0, 1.0), region(5.0, 5.0, 1.0, 1.0)], &letter());
        let names: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(names, vec!["q", "rg", "re", "f", "rg", "re", "f", "Q"]);
    }
}
