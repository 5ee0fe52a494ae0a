use anyhow::{Context, Result, anyhow};
use lopdf::{Document, Object, ObjectId};

use crate::proof::PageGeometry;

// Guards against cyclic Parent chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn load_document(pdf_bytes: &[u8]) -> Result<Document> {
    Document::load_mem(pdf_bytes).with_context(|| "failed to parse pdf")
}

pub fn page_count(pdf_bytes: &[u8]) -> Result<usize> {
    let doc = load_document(pdf_bytes)?;
    Ok(doc.get_pages().len())
}

/// Visible page box (CropBox, else MediaBox) of a zero-based page, in points.
pub fn page_geometry(pdf_bytes: &[u8], page_index: usize) -> Result<PageGeometry> {
    let doc = load_document(pdf_bytes)?;
    let page_id = page_id(&doc, page_index)?;
    page_geometry_in(&doc, page_id)
}

pub(crate) fn page_id(doc: &Document, page_index: usize) -> Result<ObjectId> {
    let pages = doc.get_pages();
    let number = u32::try_from(page_index + 1).with_context(|| "page index out of range")?;
    pages.get(&number).copied().ok_or_else(|| {
        anyhow!(
            "page {} not found (document has {} pages)",
            page_index + 1,
            pages.len()
        )
    })
}

pub(crate) fn page_geometry_in(doc: &Document, page_id: ObjectId) -> Result<PageGeometry> {
    let rect = inherited_attribute(doc, page_id, b"CropBox")
        .or_else(|| inherited_attribute(doc, page_id, b"MediaBox"))
        .ok_or_else(|| anyhow!("page has no MediaBox"))?;
    let [llx, lly, urx, ury] = parse_rect(doc, rect)?;
    let width = urx - llx;
    let height = ury - lly;
    if width <= 0.0 || height <= 0.0 {
        return Err(anyhow!("page box has no area ({}x{})", width, height));
    }
    Ok(PageGeometry::new(width, height)
        .with_origin(llx, lly)
        .with_rotation(page_rotation(doc, page_id)?))
}

fn page_rotation(doc: &Document, page_id: ObjectId) -> Result<u16> {
    let Some(value) = inherited_attribute(doc, page_id, b"Rotate") else {
        return Ok(0);
    };
    let degrees = match value {
        Object::Integer(value) => *value,
        Object::Real(value) if value.fract() == 0.0 => *value as i64,
        _ => return Err(anyhow!("page /Rotate is not a whole number")),
    };
    if degrees % 90 != 0 {
        return Err(anyhow!("page /Rotate must be a multiple of 90 (got {})", degrees));
    }
    Ok(degrees.rem_euclid(360) as u16)
}

/// Looks a page attribute up on the page, then on its ancestors.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value).ok();
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => doc
            .get_object(*id)
            .with_context(|| format!("dangling reference {} {}", id.0, id.1)),
        other => Ok(other),
    }
}

fn parse_rect(doc: &Document, object: &Object) -> Result<[f32; 4]> {
    let values = object
        .as_array()
        .map_err(|_| anyhow!("page box is not an array"))?;
    if values.len() != 4 {
        return Err(anyhow!("page box must have 4 numbers, found {}", values.len()));
    }
    let mut numbers = [0.0f32; 4];
    for (slot, value) in numbers.iter_mut().zip(values) {
        *slot = number(resolve(doc, value)?)
            .ok_or_else(|| anyhow!("page box entry is not a number"))?;
    }
    let [x0, y0, x1, y1] = numbers;
    Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
