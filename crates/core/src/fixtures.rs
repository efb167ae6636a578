//! Small PDFs built with lopdf for tests.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

type FixtureResult = Result<(), Box<dyn std::error::Error>>;

/// One page per entry, each carrying its string in the text layer.
pub fn write_text_pdf(path: &Path, pages: &[&str]) -> FixtureResult {
    let contents = pages
        .iter()
        .map(|text| {
            Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            }
            .encode()
        })
        .collect::<Result<Vec<_>, _>>()?;

    write_pdf(path, contents)
}

/// Pages that only paint a filled rectangle, like a scan without a text layer.
pub fn write_blank_pdf(path: &Path, page_count: usize) -> FixtureResult {
    let contents = (0..page_count)
        .map(|_| {
            Content {
                operations: vec![
                    Operation::new(
                        "re",
                        vec![72.into(), 72.into(), 200.into(), 100.into()],
                    ),
                    Operation::new("f", vec![]),
                ],
            }
            .encode()
        })
        .collect::<Result<Vec<_>, _>>()?;

    write_pdf(path, contents)
}

fn write_pdf(path: &Path, contents: Vec<Vec<u8>>) -> FixtureResult {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}
