//! Copying objects and pages between documents.

use pdf_loom::writer::PdfOutput;
use pdf_loom::{
    Dictionary, Error, Object, ObjectRef, PdfReader, PdfWriter, PdfWriterConfig, ReaderOptions, ResourceImporter,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Donor whose object 5 is a font pointing at descriptor 6.
fn donor_with_font(base_font: &str) -> PdfReader {
    let mut out = PdfOutput::new("1.7");
    for i in 0..4i64 {
        out.put_object(&Object::Integer(i)).unwrap();
    }
    let font = out.reserve();
    let descriptor = out.reserve();
    assert_eq!(font, ObjectRef::new(5, 0));

    out.put_reserved(
        descriptor,
        &Dictionary::typed("FontDescriptor")
            .with("FontName", Object::name(base_font))
            .with("Flags", 32i64)
            .into(),
    )
    .unwrap();
    out.put_reserved(
        font,
        &Dictionary::typed("Font")
            .with("Subtype", Object::name("Type1"))
            .with("BaseFont", Object::name(base_font))
            .with("FontDescriptor", descriptor)
            .into(),
    )
    .unwrap();
    let catalog = out.put_object(&Dictionary::typed("Catalog").into()).unwrap();
    let bytes = out
        .finish_with_table(Dictionary::new().with("Root", catalog))
        .unwrap();
    PdfReader::from_bytes(bytes).unwrap()
}

fn donor_page(base_font: &str, text: &str) -> PdfReader {
    let mut writer = PdfWriter::new();
    let font = writer.register_standard_font(base_font).unwrap();
    writer.add_page(300.0, 200.0).unwrap();
    writer
        .write_content(format!("BT /{} 12 Tf 10 10 Td ({}) Tj ET", font, text).as_bytes())
        .unwrap();
    PdfReader::from_bytes(writer.finish().unwrap()).unwrap()
}

#[test]
fn test_two_donors_with_same_object_number() {
    init_logger();
    let alpha = donor_with_font("Alpha");
    let beta = donor_with_font("Beta");

    let mut writer = PdfWriter::with_config(PdfWriterConfig::default().with_compress(false));
    writer.register_standard_font("Helvetica").unwrap();

    let (from_alpha, from_beta) = {
        let mut importer = ResourceImporter::new(&mut writer);
        let closure = ResourceImporter::dependency_closure(&alpha, &[5]).unwrap();
        assert_eq!(closure, vec![5, 6]);
        let from_alpha = importer.import_objects(&alpha, &closure).unwrap();
        let closure = ResourceImporter::dependency_closure(&beta, &[5]).unwrap();
        let from_beta = importer.import_objects(&beta, &closure).unwrap();
        (from_alpha, from_beta)
    };
    assert_ne!(from_alpha[&5], from_beta[&5]);
    assert_ne!(from_alpha[&6], from_beta[&6]);

    let reader = PdfReader::from_bytes(writer.finish().unwrap()).unwrap();
    for (mapping, name) in [(&from_alpha, "Alpha"), (&from_beta, "Beta")] {
        let font = reader.value(mapping[&5].id).unwrap();
        let font = font.as_dict().unwrap();
        assert_eq!(font.get_name("BaseFont"), Some(name));
        assert_eq!(font.get_reference("FontDescriptor"), Some(mapping[&6]));

        let descriptor = reader.value(mapping[&6].id).unwrap();
        assert_eq!(descriptor.as_dict().and_then(|d| d.get_name("FontName")), Some(name));
    }
}

#[test]
fn test_imported_pages_get_distinct_font_names() {
    init_logger();
    let first = donor_page("Helvetica", "first");
    let second = donor_page("Times-Roman", "second");

    let mut writer = PdfWriter::new();
    {
        let mut importer = ResourceImporter::new(&mut writer);
        assert_eq!(importer.import_page(&first, 0).unwrap(), 0);
        assert_eq!(importer.import_page(&second, 0).unwrap(), 1);
    }
    let reader = PdfReader::from_bytes(writer.finish().unwrap()).unwrap();
    let pages = reader.pages().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].size(), Some((300.0, 200.0)));

    let fonts = pages[0].resources.get_dict("Font").unwrap();
    assert_eq!(fonts.len(), 2);
    let (renamed, target) = fonts
        .iter()
        .find(|(name, _)| name.as_str() != "F1")
        .map(|(name, value)| (name.clone(), value.as_reference().unwrap()))
        .unwrap();
    // Renamed resources are tagged with the new object number
    assert_eq!(renamed, format!("F{}", target.id));
    let base_font = reader.resolve_dict(&Object::Reference(target)).unwrap();
    assert_eq!(base_font.get_name("BaseFont"), Some("Times-Roman"));

    assert_eq!(
        reader.page_content(&pages[0]).unwrap(),
        b"BT /F1 12 Tf 10 10 Td (first) Tj ET\n"
    );
    assert_eq!(
        reader.page_content(&pages[1]).unwrap(),
        format!("BT /{} 12 Tf 10 10 Td (second) Tj ET\n", renamed).into_bytes()
    );
}

#[test]
fn test_import_then_write_own_content() {
    init_logger();
    let donor = donor_page("Courier", "donor");
    let mut writer = PdfWriter::new();
    let own = writer.register_standard_font("Courier").unwrap();
    ResourceImporter::new(&mut writer).import_page(&donor, 0).unwrap();

    writer.add_letter_page().unwrap();
    writer
        .write_content(format!("BT /{} 9 Tf (own) Tj ET", own).as_bytes())
        .unwrap();
    let reader = PdfReader::from_bytes(writer.finish().unwrap()).unwrap();
    assert_eq!(reader.pages().unwrap().len(), 2);
}

/// Donor whose object 2 declares a stream longer than the file.
fn corrupt_donor() -> Vec<u8> {
    let mut buf = b"%PDF-1.7\n".to_vec();
    let first = buf.len();
    buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
    let second = buf.len();
    buf.extend_from_slice(b"2 0 obj\n<< /Length 9999 >>\nstream\nshort\nendstream\nendobj\n");
    let xref = buf.len();
    buf.extend_from_slice(
        format!(
            "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            first, second, xref
        )
        .as_bytes(),
    );
    buf
}

#[test]
fn test_corrupt_donor_aborts_only_the_import() {
    init_logger();
    let strict = PdfReader::from_bytes_with_options(corrupt_donor(), ReaderOptions::strict());
    assert!(matches!(strict, Err(Error::MalformedObject { .. })));

    let donor = PdfReader::from_bytes_with_options(corrupt_donor(), ReaderOptions::lenient()).unwrap();
    assert!(donor.contains(1));
    assert!(!donor.contains(2));

    let mut writer = PdfWriter::new();
    writer.add_letter_page().unwrap();
    let before = writer.output().allocated();
    let err = ResourceImporter::new(&mut writer)
        .import_objects(&donor, &[1, 2])
        .unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound(2)));
    assert_eq!(writer.output().allocated(), before);

    let reader = PdfReader::from_bytes(writer.finish().unwrap()).unwrap();
    assert_eq!(reader.pages().unwrap().len(), 1);
}
