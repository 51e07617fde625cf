//! Drawing a text run onto a page's content stream.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pdfeditor_core::{AnnotationReport, TextAnnotation};
use tracing::debug;

use crate::fonts::StandardFont;
use crate::pages::{self, grow_to, inherited, media_box, resolve};
use crate::StructureError;

const FONT_PREFIX: &str = "PEF";
const ALPHA_PREFIX: &str = "PEGS";

/// Grows the document to the annotation's page and draws the text on it.
pub(crate) fn apply(
    doc: &mut Document,
    annotation: &TextAnnotation,
) -> Result<AnnotationReport, StructureError> {
    let target = annotation.page as usize;
    let pages_appended = grow_to(doc, target)?;
    let page_id = *doc
        .get_pages()
        .get(&annotation.page)
        .ok_or(StructureError::Malformed("page missing after growth"))?;
    draw_text(doc, page_id, annotation)?;
    Ok(AnnotationReport {
        page_count: doc.get_pages().len(),
        pages_appended,
    })
}

fn draw_text(
    doc: &mut Document,
    page_id: ObjectId,
    annotation: &TextAnnotation,
) -> Result<(), StructureError> {
    let style = &annotation.style;
    let font = StandardFont::select(&style.font_family, style.bold, style.italic);
    let [llx, _, _, ury] = media_box(doc, page_id);

    let mut resources = page_resources(doc, page_id)?;
    let font_name = ensure_font(doc, &mut resources, font)?;
    let alpha_name = if style.color.is_opaque() {
        None
    } else {
        Some(ensure_alpha_state(doc, &mut resources, style.color.alpha_fraction())?)
    };
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", resources);

    let x = llx + annotation.x as f32;
    let y = ury - annotation.y as f32;
    let [r, g, b] = style.color.rgb_fractions();

    let mut operations = vec![Operation::new("q", vec![])];
    if let Some(name) = alpha_name {
        operations.push(Operation::new("gs", vec![Object::Name(name.into_bytes())]));
    }
    operations.extend([
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(font_name.into_bytes()),
                Object::Real(style.size as f32),
            ],
        ),
        Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
        Operation::new("Tj", vec![Object::string_literal(font.encode(&annotation.text))]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]);
    let encoded = Content { operations }.encode()?;
    append_content(doc, page_id, encoded)?;

    debug!(font = font.base_name(), x, y, "drew text run");
    Ok(())
}

/// The page's effective resources as an owned dictionary, with inherited and referenced
/// sub-dictionaries flattened so they can be extended without touching shared objects.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, StructureError> {
    let mut resources = match inherited(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    for key in [b"Font".as_slice(), b"ExtGState".as_slice()] {
        let owned = match resources.get(key) {
            Ok(value) => match resolve(doc, value)? {
                Object::Dictionary(dict) => Some(dict.clone()),
                _ => None,
            },
            Err(_) => None,
        };
        if let Some(dict) = owned {
            resources.set(key, dict);
        }
    }
    Ok(resources)
}

fn sub_dictionary<'a>(resources: &'a mut Dictionary, key: &[u8]) -> &'a mut Dictionary {
    if !matches!(resources.get(key), Ok(Object::Dictionary(_))) {
        resources.set(key, Dictionary::new());
    }
    match resources.get_mut(key) {
        Ok(Object::Dictionary(dict)) => dict,
        _ => unreachable!("sub-dictionary was just inserted"),
    }
}

fn unused_name(dict: &Dictionary, prefix: &str) -> String {
    (1..)
        .map(|n| format!("{prefix}{n}"))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| prefix.to_string())
}

/// Whether an existing font dictionary draws `font` with the byte encoding `StandardFont::encode`
/// produces: an unembedded Type1 font with the same BaseFont and the expected encoding.
fn matches_standard_font(doc: &Document, dict: &Dictionary, font: StandardFont) -> bool {
    let name_is = |key: &[u8], expected: &[u8]| {
        dict.get(key)
            .and_then(Object::as_name)
            .is_ok_and(|name| name == expected)
    };
    if !name_is(b"Subtype", b"Type1") || !name_is(b"BaseFont", font.base_name().as_bytes()) {
        return false;
    }
    let encoding_ok = if font.uses_win_ansi() {
        name_is(b"Encoding", b"WinAnsiEncoding")
    } else {
        !dict.has(b"Encoding")
    };
    let embedded = dict
        .get(b"FontDescriptor")
        .ok()
        .and_then(|value| resolve(doc, value).ok())
        .and_then(|value| value.as_dict().ok())
        .is_some_and(|descriptor| {
            [
                b"FontFile".as_slice(),
                b"FontFile2".as_slice(),
                b"FontFile3".as_slice(),
            ]
            .iter()
            .any(|key| descriptor.has(key))
        });
    encoding_ok && !embedded
}

/// Returns the resource name of `font`, reusing a matching entry when the page has one.
fn ensure_font(
    doc: &mut Document,
    resources: &mut Dictionary,
    font: StandardFont,
) -> Result<String, StructureError> {
    let base_name = font.base_name();
    let fonts = sub_dictionary(resources, b"Font");

    let lookup: &Document = doc;
    let existing = fonts.iter().find_map(|(name, value)| {
        let dict = resolve(lookup, value).ok()?.as_dict().ok()?;
        matches_standard_font(lookup, dict, font)
            .then(|| String::from_utf8_lossy(name).into_owned())
    });
    if let Some(name) = existing {
        return Ok(name);
    }

    let mut font_dict = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base_name.as_bytes().to_vec()),
    };
    if font.uses_win_ansi() {
        font_dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));
    }
    let font_id = doc.add_object(font_dict);
    let name = unused_name(fonts, FONT_PREFIX);
    fonts.set(name.as_bytes(), font_id);
    Ok(name)
}

fn ensure_alpha_state(
    doc: &mut Document,
    resources: &mut Dictionary,
    alpha: f32,
) -> Result<String, StructureError> {
    let states = sub_dictionary(resources, b"ExtGState");
    let state_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(alpha),
        "CA" => Object::Real(alpha),
    });
    let name = unused_name(states, ALPHA_PREFIX);
    states.set(name.as_bytes(), state_id);
    Ok(name)
}

/// Wraps the existing content in `q`/`Q` so its graphics state cannot leak into the new run, then
/// appends `content` as a separate stream.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), StructureError> {
    let existing = doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Contents")
        .ok()
        .cloned();

    let mut parts = match existing {
        None => Vec::new(),
        Some(Object::Array(items)) => items,
        Some(Object::Stream(stream)) => vec![Object::Reference(doc.add_object(stream))],
        Some(other) => vec![other],
    };
    if !parts.is_empty() {
        let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let close = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        parts.insert(0, Object::Reference(open));
        parts.push(Object::Reference(close));
    }
    let new_id = doc.add_object(Stream::new(Dictionary::new(), content));
    parts.push(Object::Reference(new_id));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(parts));
    Ok(())
}
