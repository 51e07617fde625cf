//! Page tree helpers on top of `lopdf`.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::StructureError;

/// `[llx, lly, urx, ury]` of an A4 page in points.
pub const A4_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 595.28, 841.89];

const MAX_INHERITANCE_DEPTH: usize = 32;

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, StructureError> {
    let mut current = object;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            other => return Ok(other),
        }
    }
    Err(StructureError::Malformed("reference chain too deep"))
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

pub(crate) fn pages_root(doc: &Document) -> Result<ObjectId, StructureError> {
    let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
    let catalog = doc.get_object(catalog_id)?.as_dict()?;
    Ok(catalog.get(b"Pages")?.as_reference()?)
}

/// Looks `key` up on the page and then on its ancestors, following the PDF inheritance rules.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, StructureError> {
    let mut node_id = page_id;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        let node = doc.get_object(node_id)?.as_dict()?;
        if let Ok(value) = node.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => return Ok(None),
        }
    }
    Err(StructureError::Malformed("page tree too deep"))
}

/// The effective MediaBox of a page, normalized so that `llx <= urx` and `lly <= ury`.
pub fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let parsed = inherited(doc, page_id, b"MediaBox")
        .ok()
        .flatten()
        .and_then(|object| object.as_array().ok())
        .and_then(|values| {
            let numbers = values
                .iter()
                .map(|value| resolve(doc, value).ok().and_then(number))
                .collect::<Option<Vec<_>>>()?;
            match numbers.as_slice() {
                [a, b, c, d] => Some([a.min(*c), b.min(*d), a.max(*c), b.max(*d)]),
                _ => None,
            }
        });
    match parsed {
        Some(bounds) if bounds[2] > bounds[0] && bounds[3] > bounds[1] => bounds,
        _ => A4_MEDIA_BOX,
    }
}

pub(crate) fn media_box_object(bounds: [f32; 4]) -> Object {
    Object::Array(bounds.iter().map(|value| Object::Real(*value)).collect())
}

/// Appends an empty page at the end of the `root` page tree, which holds `total` pages before
/// the call.
pub(crate) fn append_blank_page(
    doc: &mut Document,
    root: ObjectId,
    total: usize,
    bounds: [f32; 4],
) -> Result<ObjectId, StructureError> {
    let contents_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => root,
        "MediaBox" => media_box_object(bounds),
        "Resources" => Dictionary::new(),
        "Contents" => contents_id,
    });

    let pages = doc.get_object_mut(root)?.as_dict_mut()?;
    pages.get_mut(b"Kids")?.as_array_mut()?.push(Object::Reference(page_id));
    pages.set("Count", Object::Integer(total as i64 + 1));
    Ok(page_id)
}

/// Appends blank pages until the document has at least `target` pages. Returns how many were
/// added. New pages copy the MediaBox of the last existing page.
pub(crate) fn grow_to(doc: &mut Document, target: usize) -> Result<usize, StructureError> {
    let pages = doc.get_pages();
    let current = pages.len();
    if current >= target {
        return Ok(0);
    }
    let bounds = pages
        .values()
        .next_back()
        .map(|last| media_box(doc, *last))
        .unwrap_or(A4_MEDIA_BOX);
    let root = pages_root(doc)?;
    for total in current..target {
        append_blank_page(doc, root, total, bounds)?;
    }
    Ok(target - current)
}
