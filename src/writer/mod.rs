//! PDF writing module.
//!
//! ## Architecture
//!
//! ```text
//! fonts, images, page content, links, bookmarks, structure entries
//!     ↓
//! [PdfWriter] (registries, pending page, finalize/linking pass)
//!     ↓
//! [PdfOutput] (owned byte buffer, object numbers, offset table)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```
//!
//! ## Example
//!
//! ```
//! use pdf_loom::writer::{PdfWriter, PdfWriterConfig};
//!
//! let mut writer = PdfWriter::with_config(PdfWriterConfig::default().with_title("Hello"));
//! let font = writer.register_standard_font("Helvetica")?;
//! writer.add_letter_page()?;
//! writer.write_content(format!("BT /{} 12 Tf 72 720 Td (Hello, World!) Tj ET", font).as_bytes())?;
//! let bytes = writer.finish()?;
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! # Ok::<(), pdf_loom::Error>(())
//! ```

mod object_serializer;
mod outline_builder;
mod output;
mod pdf_writer;
mod resources;
mod structure;
mod xmp_metadata;

pub use object_serializer::ObjectSerializer;
pub use outline_builder::{
    Destination, FitMode, OutlineBuilder, OutlineDestination, OutlineItem, OutlineStyle,
};
pub use output::{format_xref_table, ObjectStreamBuilder, PdfOutput, Slot};
pub use pdf_writer::{
    pdf_date, Compliance, DocumentMetadata, FontDescriptor, FontProgram, ImageData, LinkAction,
    PdfWriter, PdfWriterConfig, XRefFormat,
};
pub use resources::{ResourceKind, ResourceRegistry};
pub use structure::{StructEntry, StructureTree};
pub use xmp_metadata::XmpWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _serializer = ObjectSerializer::new();
        let _config = PdfWriterConfig::default();
        assert_eq!(ResourceKind::Font.prefix(), "F");
    }
}
