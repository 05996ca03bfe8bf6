//! PDF document writer.
//!
//! `PdfWriter` has two phases. During construction, pages, fonts, images and
//! other resources are registered; every resource is written as soon as it is
//! registered, and a page's content is flushed when the next page is added.
//! [`PdfWriter::finish`] consumes the writer and runs the linking pass:
//! Resources, annotations, pages, the page tree, the structure tree, outlines,
//! destinations, Info and Catalog, then the cross-reference section.

use super::object_serializer::ObjectSerializer;
use super::outline_builder::{Destination, OutlineBuilder, OutlineDestination, OutlineItem, OutlineStyle};
use super::output::PdfOutput;
use super::resources::{ResourceKind, ResourceRegistry};
use super::structure::{StructEntry, StructureTree};
use super::xmp_metadata::XmpWriter;
use crate::decoders::flate_encode;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use chrono::{DateTime, FixedOffset, Local};
use indexmap::IndexMap;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cross-reference section written by [`PdfWriter::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum XRefFormat {
    /// Classic `xref` table and `trailer`
    #[default]
    Table,
    /// `/Type /XRef` stream (PDF 1.5)
    Stream,
}

/// Conformance level to produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Compliance {
    /// Plain PDF
    #[default]
    None,
    /// PDF/A with an embedded output intent
    PdfA {
        /// PDF/A part (1, 2 or 3)
        part: u8,
        /// Conformance level (`A`, `B` or `U`)
        conformance: String,
        /// RGB ICC profile bytes for the output intent
        #[serde(skip)]
        icc_profile: Vec<u8>,
        /// `/OutputConditionIdentifier`, e.g. `sRGB IEC61966-2.1`
        output_condition: String,
    },
}

/// Document information (Info dictionary and XMP).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    /// Document title
    pub title: Option<String>,
    /// Document author
    pub author: Option<String>,
    /// Document subject
    pub subject: Option<String>,
    /// Document keywords
    pub keywords: Option<String>,
    /// Creator application
    pub creator: Option<String>,
    /// Producing library
    pub producer: Option<String>,
}

/// Configuration for PDF generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfWriterConfig {
    /// PDF version (e.g., "1.7")
    pub version: String,
    /// Whether to Flate-compress page content and unfiltered images
    pub compress: bool,
    /// Cross-reference section format
    pub xref_format: XRefFormat,
    /// Pack non-stream objects into object streams (needs `XRefFormat::Stream`)
    pub object_streams: bool,
    /// Emit a logical structure tree
    pub tagged: bool,
    /// Document language (`/Lang`), e.g. `en-US`
    pub language: Option<String>,
    /// Conformance level
    pub compliance: Compliance,
    /// Document information
    pub metadata: DocumentMetadata,
}

impl Default for PdfWriterConfig {
    fn default() -> Self {
        Self {
            version: "1.7".to_string(),
            compress: true,
            xref_format: XRefFormat::Table,
            object_streams: false,
            tagged: false,
            language: None,
            compliance: Compliance::None,
            metadata: DocumentMetadata {
                producer: Some(format!("pdf_loom {}", env!("CARGO_PKG_VERSION"))),
                ..DocumentMetadata::default()
            },
        }
    }
}

impl PdfWriterConfig {
    /// Set the PDF version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    /// Set document author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.metadata.author = Some(author.into());
        self
    }

    /// Set document subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.metadata.subject = Some(subject.into());
        self
    }

    /// Set document keywords.
    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.metadata.keywords = Some(keywords.into());
        self
    }

    /// Set the creator application.
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.metadata.creator = Some(creator.into());
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Choose the cross-reference section format.
    pub fn with_xref_format(mut self, format: XRefFormat) -> Self {
        self.xref_format = format;
        self
    }

    /// Pack non-stream objects into object streams.
    pub fn with_object_streams(mut self, enabled: bool) -> Self {
        self.object_streams = enabled;
        self
    }

    /// Enable accessibility tagging.
    pub fn with_tagged(mut self, tagged: bool) -> Self {
        self.tagged = tagged;
        self
    }

    /// Set the document language.
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    /// Produce PDF/A with the given ICC profile as output intent.
    pub fn with_pdfa(
        mut self,
        part: u8,
        conformance: impl Into<String>,
        icc_profile: Vec<u8>,
        output_condition: impl Into<String>,
    ) -> Self {
        self.compliance = Compliance::PdfA {
            part,
            conformance: conformance.into(),
            icc_profile,
            output_condition: output_condition.into(),
        };
        self
    }
}

/// Embedded font program stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FontProgram {
    /// Descriptor key: `FontFile`, `FontFile2` or `FontFile3`
    pub key: String,
    /// Stream dictionary (`/Length1`, `/Subtype`, `/Filter`, ...)
    pub dict: Dictionary,
    /// Program bytes, already filtered as `dict` declares
    pub data: Vec<u8>,
}

/// Font descriptor plus optional embedded program.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    /// `/FontDescriptor` entries (`/FontName`, `/Flags`, `/FontBBox`, ...)
    pub dict: Dictionary,
    /// Embedded program
    pub program: Option<FontProgram>,
}

/// Image sample data with its description.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// `/ColorSpace`, a name or an array
    pub color_space: Object,
    /// Bits per component
    pub bits_per_component: u8,
    /// Filter the data is already encoded with (e.g. `DCTDecode`)
    pub filter: Option<String>,
    /// `/DecodeParms` for `filter`
    pub decode_parms: Option<Dictionary>,
    /// Sample bytes
    pub data: Vec<u8>,
    /// Alpha channel, written as `/SMask`
    pub soft_mask: Option<Box<ImageData>>,
}

impl ImageData {
    /// Unfiltered samples in a device colour space.
    pub fn raw(width: u32, height: u32, color_space: &str, bits_per_component: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color_space: Object::name(color_space),
            bits_per_component,
            filter: None,
            decode_parms: None,
            data,
            soft_mask: None,
        }
    }

    /// A baseline JPEG passed through as `DCTDecode`.
    pub fn jpeg(width: u32, height: u32, color_space: &str, data: Vec<u8>) -> Self {
        Self {
            filter: Some("DCTDecode".to_string()),
            ..Self::raw(width, height, color_space, 8, data)
        }
    }

    /// Attach an 8-bit `DeviceGray` alpha channel.
    pub fn with_soft_mask(mut self, alpha: Vec<u8>) -> Self {
        self.soft_mask = Some(Box::new(Self::raw(self.width, self.height, "DeviceGray", 8, alpha)));
        self
    }
}

/// Target of a link annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkAction {
    /// Open a URI
    Uri(String),
    /// Go to a named destination
    Named(String),
}

#[derive(Debug, Clone)]
struct Annotation {
    page: usize,
    rect: [f64; 4],
    action: LinkAction,
}

/// Internal page data.
#[derive(Debug, Clone)]
struct PageData {
    media_box: [f64; 4],
    contents: Vec<ObjectRef>,
    annotations: Vec<usize>,
}

/// PDF document writer.
#[derive(Debug)]
pub struct PdfWriter {
    config: PdfWriterConfig,
    out: PdfOutput,
    resources: ResourceRegistry,
    pages: Vec<PageData>,
    /// Content of the last page, flushed when the next page is added
    pending: Option<Vec<u8>>,
    annotations: Vec<Annotation>,
    named_destinations: IndexMap<String, Destination>,
    outline: OutlineBuilder,
    structure: StructureTree,
    open_marked_content: usize,
    standard_fonts: HashMap<String, String>,
    optional_content: Vec<ObjectRef>,
}

impl PdfWriter {
    /// Create a new PDF writer with default config.
    pub fn new() -> Self {
        Self::with_config(PdfWriterConfig::default())
    }

    /// Create a PDF writer with custom config.
    pub fn with_config(config: PdfWriterConfig) -> Self {
        let mut out = PdfOutput::new(&config.version);
        if config.object_streams {
            match config.xref_format {
                XRefFormat::Stream => out.enable_object_streams(config.compress),
                XRefFormat::Table => {
                    log::warn!("Object streams need a cross-reference stream; writing plain objects")
                },
            }
        }
        Self {
            config,
            out,
            resources: ResourceRegistry::new(),
            pages: Vec::new(),
            pending: None,
            annotations: Vec::new(),
            named_destinations: IndexMap::new(),
            outline: OutlineBuilder::new(),
            structure: StructureTree::new(),
            open_marked_content: 0,
            standard_fonts: HashMap::new(),
            optional_content: Vec::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &PdfWriterConfig {
        &self.config
    }

    /// The output written so far.
    pub fn output(&self) -> &PdfOutput {
        &self.out
    }

    pub(crate) fn output_mut(&mut self) -> &mut PdfOutput {
        &mut self.out
    }

    pub(crate) fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// The shared resource registry.
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Number of pages added so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Add a page with the given dimensions; returns its index.
    pub fn add_page(&mut self, width: f64, height: f64) -> Result<usize> {
        self.add_page_with_box([0.0, 0.0, width, height])
    }

    /// Add a US Letter sized page (8.5" x 11").
    pub fn add_letter_page(&mut self) -> Result<usize> {
        self.add_page(612.0, 792.0)
    }

    /// Add an A4 sized page (210mm x 297mm).
    pub fn add_a4_page(&mut self) -> Result<usize> {
        self.add_page(595.0, 842.0)
    }

    /// Add a page with an explicit `[llx lly urx ury]` media box.
    ///
    /// The previous page's content is compressed and written first.
    pub fn add_page_with_box(&mut self, media_box: [f64; 4]) -> Result<usize> {
        if self.open_marked_content > 0 {
            return Err(Error::ProgrammingSequence(
                "marked content is still open on the current page".to_string(),
            ));
        }
        self.flush_pending()?;
        self.pages.push(PageData {
            media_box,
            contents: Vec::new(),
            annotations: Vec::new(),
        });
        self.pending = Some(Vec::new());
        Ok(self.pages.len() - 1)
    }

    fn current_page(&self) -> Result<usize> {
        self.pages
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::ProgrammingSequence("no page has been added".to_string()))
    }

    fn flush_pending(&mut self) -> Result<()> {
        let Some(content) = self.pending.take() else {
            return Ok(());
        };
        let page = self.current_page()?;
        if content.is_empty() {
            return Ok(());
        }
        let r = if self.config.compress {
            let data = flate_encode(&content)?;
            self.out
                .put_stream(Dictionary::new().with("Filter", Object::name("FlateDecode")), &data)?
        } else {
            self.out.put_stream(Dictionary::new(), &content)?
        };
        log::trace!("Page {} content: {} bytes as object {}", page, content.len(), r.id);
        self.pages[page].contents.push(r);
        Ok(())
    }

    /// Append operators to the current page's content stream.
    pub fn write_content(&mut self, bytes: &[u8]) -> Result<()> {
        let content = self
            .pending
            .as_mut()
            .ok_or_else(|| Error::ProgrammingSequence("no page has been added".to_string()))?;
        content.extend_from_slice(bytes);
        if !bytes.ends_with(b"\n") {
            content.push(b'\n');
        }
        Ok(())
    }

    /// Register one of the 14 standard fonts; repeated calls share one object.
    pub fn register_standard_font(&mut self, base_font: &str) -> Result<String> {
        if let Some(name) = self.standard_fonts.get(base_font) {
            return Ok(name.clone());
        }
        let mut font = Dictionary::typed("Font")
            .with("Subtype", Object::name("Type1"))
            .with("BaseFont", Object::name(base_font));
        if !matches!(base_font, "Symbol" | "ZapfDingbats") {
            font.insert("Encoding", Object::name("WinAnsiEncoding"));
        }
        let name = self.register_font(font, None)?;
        self.standard_fonts.insert(base_font.to_string(), name.clone());
        Ok(name)
    }

    /// Register a font: program, then descriptor, then font dictionary.
    ///
    /// Returns the resource name (`F1`, `F2`, ...).
    pub fn register_font(&mut self, mut font: Dictionary, descriptor: Option<FontDescriptor>) -> Result<String> {
        if let Some(FontDescriptor { mut dict, program }) = descriptor {
            if let Some(program) = program {
                let r = self.out.put_stream(program.dict, &program.data)?;
                dict.insert(&program.key, r);
            }
            if !dict.contains_key("Type") {
                dict.insert("Type", Object::name("FontDescriptor"));
            }
            let r = self.out.put_object(&dict.into())?;
            font.insert("FontDescriptor", r);
        }
        let r = self.out.put_object(&font.into())?;
        Ok(self.resources.register(ResourceKind::Font, r))
    }

    /// Register an image XObject; its soft mask is written first.
    ///
    /// Returns the resource name (`I1`, `I2`, ...).
    pub fn register_image(&mut self, image: &ImageData) -> Result<String> {
        let r = self.write_image(image)?;
        Ok(self.resources.register(ResourceKind::XObject, r))
    }

    fn write_image(&mut self, image: &ImageData) -> Result<ObjectRef> {
        let smask = match &image.soft_mask {
            Some(mask) => Some(self.write_image(mask)?),
            None => None,
        };

        let mut dict = Dictionary::typed("XObject")
            .with("Subtype", Object::name("Image"))
            .with("Width", image.width as i64)
            .with("Height", image.height as i64)
            .with("ColorSpace", image.color_space.clone())
            .with("BitsPerComponent", image.bits_per_component as i64);
        if let Some(smask) = smask {
            dict.insert("SMask", smask);
        }

        match &image.filter {
            Some(filter) => {
                dict.insert("Filter", Object::name(filter.as_str()));
                if let Some(parms) = &image.decode_parms {
                    dict.insert("DecodeParms", parms.clone());
                }
                self.out.put_stream(dict, &image.data)
            },
            None if self.config.compress => {
                dict.insert("Filter", Object::name("FlateDecode"));
                let data = flate_encode(&image.data)?;
                self.out.put_stream(dict, &data)
            },
            None => self.out.put_stream(dict, &image.data),
        }
    }

    /// Register an ExtGState dictionary; returns its resource name (`GS1`, ...).
    pub fn register_ext_gstate(&mut self, mut state: Dictionary) -> Result<String> {
        if !state.contains_key("Type") {
            state.insert("Type", Object::name("ExtGState"));
        }
        let r = self.out.put_object(&state.into())?;
        Ok(self.resources.register(ResourceKind::ExtGState, r))
    }

    /// Register an optional-content group; returns its `/Properties` name.
    pub fn register_optional_content(&mut self, name: &str) -> Result<String> {
        let group = Dictionary::typed("OCG").with("Name", Object::text(name));
        let r = self.out.put_object(&group.into())?;
        self.optional_content.push(r);
        Ok(self.resources.register(ResourceKind::Properties, r))
    }

    /// Write any object and register it under a generated name.
    pub fn register_object(&mut self, kind: ResourceKind, obj: &Object) -> Result<String> {
        let r = self.out.put_object(obj)?;
        Ok(self.resources.register(kind, r))
    }

    /// Write a stream and register it under a generated name.
    pub fn register_stream(&mut self, kind: ResourceKind, dict: Dictionary, data: &[u8]) -> Result<String> {
        let r = self.out.put_stream(dict, data)?;
        Ok(self.resources.register(kind, r))
    }

    /// Add a link annotation on the current page.
    ///
    /// On a tagged document the link also gets a `/Link` struct element.
    pub fn add_link(&mut self, rect: [f64; 4], action: LinkAction) -> Result<()> {
        let page = self.current_page()?;
        let index = self.annotations.len();
        if self.config.tagged {
            let alt = match &action {
                LinkAction::Uri(uri) => uri.clone(),
                LinkAction::Named(name) => name.clone(),
            };
            self.structure
                .record_annotation(page, index, StructEntry::new("Link").with_alt(alt));
        }
        self.annotations.push(Annotation { page, rect, action });
        self.pages[page].annotations.push(index);
        Ok(())
    }

    /// Add a URI link on the current page.
    pub fn add_uri_link(&mut self, rect: [f64; 4], uri: impl Into<String>) -> Result<()> {
        self.add_link(rect, LinkAction::Uri(uri.into()))
    }

    /// Add a link to a named destination on the current page.
    pub fn add_named_link(&mut self, rect: [f64; 4], name: impl Into<String>) -> Result<()> {
        self.add_link(rect, LinkAction::Named(name.into()))
    }

    /// Define a named destination.
    pub fn add_named_destination(&mut self, name: impl Into<String>, dest: Destination) {
        self.named_destinations.insert(name.into(), dest);
    }

    /// Add a bookmark at a nesting level (0 = top level).
    pub fn add_bookmark(
        &mut self,
        title: impl Into<String>,
        level: usize,
        dest: impl Into<OutlineDestination>,
        style: OutlineStyle,
    ) {
        self.outline
            .add_at_level(level, OutlineItem::new(title, dest).with_style(style));
    }

    /// Add a prepared outline item at a nesting level.
    pub fn add_outline_item(&mut self, level: usize, item: OutlineItem) {
        self.outline.add_at_level(level, item);
    }

    /// Open a tagged marked-content sequence on the current page.
    ///
    /// Emits `/Tag <</MCID n>> BDC` and returns the MCID.
    pub fn begin_marked_content(&mut self, entry: StructEntry) -> Result<i64> {
        if !self.config.tagged {
            return Err(Error::ProgrammingSequence(
                "marked content requires a tagged document".to_string(),
            ));
        }
        let page = self.current_page()?;
        let mut op = ObjectSerializer::compact().serialize(&Object::name(entry.tag.as_str()));
        let mcid = self.structure.record_marked_content(page, entry);
        op.extend_from_slice(format!(" <</MCID {}>> BDC", mcid).as_bytes());
        self.write_content(&op)?;
        self.open_marked_content += 1;
        Ok(mcid)
    }

    /// Close the innermost marked-content sequence.
    pub fn end_marked_content(&mut self) -> Result<()> {
        if self.open_marked_content == 0 {
            return Err(Error::ProgrammingSequence(
                "end_marked_content without begin_marked_content".to_string(),
            ));
        }
        self.write_content(b"EMC")?;
        self.open_marked_content -= 1;
        Ok(())
    }

    /// Build the complete PDF document.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.finish_at(Local::now().into())
    }

    /// Build the document with an explicit creation time.
    pub fn finish_at(mut self, created: DateTime<FixedOffset>) -> Result<Vec<u8>> {
        if self.open_marked_content > 0 {
            return Err(Error::ProgrammingSequence(
                "marked content is still open at finish".to_string(),
            ));
        }
        self.flush_pending()?;

        let (metadata, output_intent) = self.write_compliance_objects(&created)?;

        let resources = self.out.put_object(&self.resources.to_dictionary().into())?;
        let pages_ref = self.out.reserve();
        let page_refs: Vec<ObjectRef> = self.pages.iter().map(|_| self.out.reserve()).collect();

        let annotation_keys = if self.config.tagged {
            self.structure.annotation_keys(self.pages.len())
        } else {
            Default::default()
        };
        let mut annotation_refs = Vec::with_capacity(self.annotations.len());
        for (index, annot) in self.annotations.iter().enumerate() {
            let mut dict = Dictionary::typed("Annot")
                .with("Subtype", Object::name("Link"))
                .with("Rect", Object::rect(annot.rect[0], annot.rect[1], annot.rect[2], annot.rect[3]))
                .with("Border", Object::Array(vec![0i64.into(), 0i64.into(), 0i64.into()]))
                .with("P", page_refs[annot.page]);
            match &annot.action {
                LinkAction::Uri(uri) => dict.insert(
                    "A",
                    Dictionary::new()
                        .with("S", Object::name("URI"))
                        .with("URI", Object::string(uri)),
                ),
                LinkAction::Named(name) => dict.insert("Dest", Object::name(name.as_str())),
            }
            if let Some(&key) = annotation_keys.get(&index) {
                dict.insert("StructParent", key);
            }
            annotation_refs.push(self.out.put_object(&dict.into())?);
        }

        for (index, page) in self.pages.iter().enumerate() {
            let [llx, lly, urx, ury] = page.media_box;
            let mut dict = Dictionary::typed("Page")
                .with("Parent", pages_ref)
                .with("MediaBox", Object::rect(llx, lly, urx, ury))
                .with("Resources", resources);
            match page.contents.as_slice() {
                [] => {},
                [single] => dict.insert("Contents", *single),
                many => dict.insert(
                    "Contents",
                    Object::Array(many.iter().copied().map(Object::Reference).collect()),
                ),
            }
            if !page.annotations.is_empty() {
                dict.insert(
                    "Annots",
                    Object::Array(
                        page.annotations
                            .iter()
                            .map(|&i| Object::Reference(annotation_refs[i]))
                            .collect(),
                    ),
                );
            }
            if self.config.tagged {
                dict.insert("StructParents", index as i64);
                dict.insert("Tabs", Object::name("S"));
            }
            self.out.put_reserved(page_refs[index], &dict.into())?;
        }

        let pages_dict = Dictionary::typed("Pages")
            .with(
                "Kids",
                Object::Array(page_refs.iter().copied().map(Object::Reference).collect()),
            )
            .with("Count", page_refs.len() as i64);
        self.out.put_reserved(pages_ref, &pages_dict.into())?;

        let struct_root = if self.config.tagged {
            Some(self.structure.write(
                &mut self.out,
                &page_refs,
                &annotation_refs,
                self.config.language.as_deref(),
            )?)
        } else {
            None
        };

        let outlines = self.outline.write(&mut self.out, &page_refs)?;

        let dests = if self.named_destinations.is_empty() {
            None
        } else {
            let mut dict = Dictionary::new();
            for (name, dest) in &self.named_destinations {
                dict.insert(name, dest.to_object(&page_refs)?);
            }
            Some(self.out.put_object(&dict.into())?)
        };

        let info_dict = self.info_dictionary(&created);
        let info = self.out.put_object(&info_dict.into())?;

        let mut catalog = Dictionary::typed("Catalog").with("Pages", pages_ref);
        if let Some(outlines) = outlines {
            catalog.insert("Outlines", outlines);
            catalog.insert("PageMode", Object::name("UseOutlines"));
        }
        if let Some(dests) = dests {
            catalog.insert("Dests", dests);
        }
        if let Some(struct_root) = struct_root {
            catalog.insert("MarkInfo", Dictionary::new().with("Marked", true));
            catalog.insert("StructTreeRoot", struct_root);
        }
        if let Some(lang) = &self.config.language {
            catalog.insert("Lang", Object::text(lang));
        }
        if !self.optional_content.is_empty() {
            let groups =
                Object::Array(self.optional_content.iter().copied().map(Object::Reference).collect());
            catalog.insert(
                "OCProperties",
                Dictionary::new().with("OCGs", groups.clone()).with(
                    "D",
                    Dictionary::new()
                        .with("Order", groups.clone())
                        .with("ON", groups),
                ),
            );
        }
        if let Some(metadata) = metadata {
            catalog.insert("Metadata", metadata);
        }
        if let Some(intent) = output_intent {
            catalog.insert("OutputIntents", Object::Array(vec![intent.into()]));
        }
        let root = self.out.put_object(&catalog.into())?;

        let id = Object::HexString(document_id(&created, self.config.metadata.title.as_deref()));
        let trailer = Dictionary::new()
            .with("Root", root)
            .with("Info", info)
            .with("ID", Object::Array(vec![id.clone(), id]));

        log::debug!(
            "Finishing document: {} pages, {} objects",
            self.pages.len(),
            self.out.allocated()
        );
        match self.config.xref_format {
            XRefFormat::Table => self.out.finish_with_table(trailer),
            XRefFormat::Stream => self.out.finish_with_xref_stream(trailer),
        }
    }

    /// XMP metadata, ICC profile and output intent for PDF/A.
    fn write_compliance_objects(
        &mut self,
        created: &DateTime<FixedOffset>,
    ) -> Result<(Option<ObjectRef>, Option<ObjectRef>)> {
        let Compliance::PdfA {
            part,
            conformance,
            icc_profile,
            output_condition,
        } = &self.config.compliance
        else {
            return Ok((None, None));
        };

        let meta = &self.config.metadata;
        let mut xmp = XmpWriter::new()
            .pdfa(*part, conformance.as_str())
            .create_date(created.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
            .document_id(format!("uuid:{}", uuid::Uuid::new_v4()));
        if let Some(title) = &meta.title {
            xmp = xmp.title(title.as_str());
        }
        if let Some(author) = &meta.author {
            xmp = xmp.creator(author.as_str());
        }
        if let Some(subject) = &meta.subject {
            xmp = xmp.description(subject.as_str());
        }
        if let Some(keywords) = &meta.keywords {
            xmp = xmp.keywords(keywords.as_str());
        }
        if let Some(creator) = &meta.creator {
            xmp = xmp.creator_tool(creator.as_str());
        }
        if let Some(producer) = &meta.producer {
            xmp = xmp.producer(producer.as_str());
        }
        if let Some(lang) = &self.config.language {
            xmp = xmp.language(lang.as_str());
        }
        let metadata = self.out.put_stream(
            Dictionary::typed("Metadata").with("Subtype", Object::name("XML")),
            &xmp.build_bytes(),
        )?;

        if icc_profile.is_empty() {
            log::warn!("PDF/A requested without an ICC profile; no output intent written");
            return Ok((Some(metadata), None));
        }
        let icc = if self.config.compress {
            self.out.put_stream(
                Dictionary::new()
                    .with("N", 3i64)
                    .with("Filter", Object::name("FlateDecode")),
                &flate_encode(icc_profile)?,
            )?
        } else {
            self.out
                .put_stream(Dictionary::new().with("N", 3i64), icc_profile)?
        };
        let intent = Dictionary::typed("OutputIntent")
            .with("S", Object::name("GTS_PDFA1"))
            .with("OutputConditionIdentifier", Object::text(output_condition))
            .with("Info", Object::text(output_condition))
            .with("DestOutputProfile", icc);
        let intent = self.out.put_object(&intent.into())?;
        Ok((Some(metadata), Some(intent)))
    }

    fn info_dictionary(&self, created: &DateTime<FixedOffset>) -> Dictionary {
        let meta = &self.config.metadata;
        let mut info = Dictionary::new();
        for (key, value) in [
            ("Title", &meta.title),
            ("Author", &meta.author),
            ("Subject", &meta.subject),
            ("Keywords", &meta.keywords),
            ("Creator", &meta.creator),
            ("Producer", &meta.producer),
        ] {
            if let Some(value) = value {
                info.insert(key, Object::text(value));
            }
        }
        let date = Object::string(pdf_date(created));
        info.insert("CreationDate", date.clone());
        info.insert("ModDate", date);
        info
    }

    /// Save the PDF to a file.
    pub fn save(self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.finish()?;
        std::fs::write(path.as_ref(), bytes)?;
        log::debug!("Saved {}", path.as_ref().display());
        Ok(())
    }
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a date as `D:YYYYMMDDHHmmSS+HH'mm'`.
pub fn pdf_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    format!(
        "D:{}{}{:02}'{:02}'",
        date.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    )
}

/// MD5 over a fresh UUID, the creation time and the title.
fn document_id(created: &DateTime<FixedOffset>, title: Option<&str>) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hasher.update(created.to_rfc3339().as_bytes());
    if let Some(title) = title {
        hasher.update(title.as_bytes());
    }
    hasher.finalize().to_vec()
}
