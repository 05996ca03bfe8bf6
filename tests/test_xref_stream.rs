//! Cross-reference streams and incremental updates.

use pdf_loom::writer::{PdfOutput, XRefFormat};
use pdf_loom::{Dictionary, Error, Object, ObjectRef, PdfReader, PdfWriter, PdfWriterConfig, ReaderOptions};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stream_config() -> PdfWriterConfig {
    PdfWriterConfig::default().with_xref_format(XRefFormat::Stream)
}

#[test]
fn test_writer_emits_xref_stream() {
    init_logger();
    let mut writer = PdfWriter::with_config(stream_config().with_compress(false));
    let font = writer.register_standard_font("Courier").unwrap();
    writer.add_letter_page().unwrap();
    writer
        .write_content(format!("BT /{} 10 Tf (xref stream) Tj ET", font).as_bytes())
        .unwrap();
    let bytes = writer.finish().unwrap();

    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("\nxref\n"));
    assert!(text.contains("/Type /XRef"));

    let reader = PdfReader::from_bytes(bytes).unwrap();
    let size = reader.trailer().get_integer("Size").unwrap() as usize;
    assert_eq!(reader.len(), size - 1);

    let xref_object = reader.get(size as u32 - 1).unwrap();
    assert_eq!(xref_object.type_name(), Some("XRef"));

    let pages = reader.pages().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(
        reader.page_content(&pages[0]).unwrap(),
        b"BT /F1 10 Tf (xref stream) Tj ET\n"
    );
}

#[test]
fn test_object_streams_pack_dictionaries() {
    init_logger();
    let mut writer = PdfWriter::with_config(stream_config().with_object_streams(true));
    for font in ["Helvetica", "Times-Roman", "Courier"] {
        writer.register_standard_font(font).unwrap();
    }
    for _ in 0..3 {
        writer.add_letter_page().unwrap();
        writer.write_content(b"0 0 m 10 10 l S").unwrap();
    }
    let bytes = writer.finish().unwrap();
    let reader = PdfReader::from_bytes(bytes).unwrap();

    let packed: Vec<_> = reader.objects().filter(|o| o.container.is_some()).collect();
    assert!(!packed.is_empty());
    // Streams are never packed
    assert!(packed.iter().all(|o| !o.is_stream()));
    let containers: Vec<_> = reader
        .objects()
        .filter(|o| o.type_name() == Some("ObjStm"))
        .collect();
    assert!(!containers.is_empty());

    let catalog = reader.catalog().unwrap();
    assert_eq!(catalog.get_name("Type"), Some("Catalog"));
    assert!(reader.get(reader.trailer().get_reference("Root").unwrap().id).unwrap().container.is_some());

    let pages = reader.pages().unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].resources.get_dict("Font").map(|f| f.len()), Some(3));
}

#[test]
fn test_object_streams_ignored_with_table() {
    init_logger();
    let config = PdfWriterConfig::default().with_object_streams(true);
    let mut writer = PdfWriter::with_config(config);
    writer.add_letter_page().unwrap();
    let bytes = writer.finish().unwrap();

    let reader = PdfReader::from_bytes(bytes).unwrap();
    assert!(reader.objects().all(|o| o.container.is_none()));
}

/// Append an incremental update that redefines object 1 and adds object 3.
fn incremental_update(mut base: Vec<u8>, prev: usize) -> Vec<u8> {
    let redefined = base.len();
    base.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R /Lang (en) >>\nendobj\n");
    let added = base.len();
    base.extend_from_slice(b"3 0 obj\n(appended)\nendobj\n");
    let xref = base.len();
    base.extend_from_slice(
        format!(
            "xref\n1 1\n{:010} 00000 n \n3 1\n{:010} 00000 n \ntrailer\n<< /Size 4 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            redefined, added, prev, xref
        )
        .as_bytes(),
    );
    base
}

fn base_document() -> (Vec<u8>, usize) {
    let mut out = PdfOutput::new("1.7");
    let catalog = out.reserve();
    let pages = out.reserve();
    out.put_reserved(
        pages,
        &Dictionary::typed("Pages")
            .with("Kids", Object::Array(vec![]))
            .with("Count", 0i64)
            .into(),
    )
    .unwrap();
    out.put_reserved(catalog, &Dictionary::typed("Catalog").with("Pages", pages).into())
        .unwrap();
    let bytes = out
        .finish_with_table(Dictionary::new().with("Root", catalog))
        .unwrap();
    let text = String::from_utf8_lossy(&bytes);
    let startxref: usize = text
        .rsplit("startxref\n")
        .next()
        .and_then(|tail| tail.lines().next())
        .and_then(|n| n.parse().ok())
        .unwrap();
    (bytes, startxref)
}

#[test]
fn test_prev_chain_last_definition_wins() {
    init_logger();
    let (base, startxref) = base_document();
    let updated = incremental_update(base, startxref);

    let reader = PdfReader::from_bytes(updated).unwrap();
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.catalog().unwrap().get("Lang").and_then(Object::as_string), Some(&b"en"[..]));
    assert_eq!(reader.value(3).unwrap().as_string(), Some(&b"appended"[..]));
    assert_eq!(reader.trailer().get_integer("Size"), Some(4));
    assert_eq!(reader.trailer().get_reference("Root"), Some(ObjectRef::new(1, 0)));
}

#[test]
fn test_prev_outside_buffer_is_broken_chain() {
    init_logger();
    let (base, _) = base_document();
    let updated = incremental_update(base, 1_000_000);
    let err = PdfReader::from_bytes_with_options(updated, ReaderOptions::lenient()).unwrap_err();
    assert!(matches!(err, Error::BrokenReferenceChain { .. }));
}
