use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

use crate::pages::{media_box_object, A4_MEDIA_BOX};

pub(crate) const PRODUCER: &str = "pdfeditor";

/// Builds a PDF 1.4 document with a single empty A4 page and `title` in its Info dictionary.
pub fn blank_document(title: &str) -> Document {
    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();

    let contents_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box_object(A4_MEDIA_BOX),
        "Resources" => Dictionary::new(),
        "Contents" => contents_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => text_string(title),
        "Producer" => text_string(PRODUCER),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc
}

/// Encodes a PDF text string: plain bytes for ASCII, UTF-16BE with a byte order mark otherwise.
pub(crate) fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xfe, 0xff];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Inverse of [`text_string`], also accepting PDFDocEncoded bytes in their Latin-1 subset.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xfe, 0xff, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}
