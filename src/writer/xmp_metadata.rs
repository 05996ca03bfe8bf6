//! XMP metadata packets.
//!
//! Generates the XMP (Extensible Metadata Platform) packet embedded as the
//! catalog `/Metadata` stream. PDF/A requires it, together with the
//! `pdfaid` identification schema. See ISO 32000-1:2008, Section 14.3.2.

/// XMP namespace URIs
const NS_X: &str = "adobe:ns:meta/";
const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
const NS_PDF: &str = "http://ns.adobe.com/pdf/1.3/";
const NS_XMP_MM: &str = "http://ns.adobe.com/xap/1.0/mm/";
const NS_PDFAID: &str = "http://www.aiim.org/pdfa/ns/id/";

/// XMP metadata writer/builder.
#[derive(Debug, Clone, Default)]
pub struct XmpWriter {
    title: Option<String>,
    creators: Vec<String>,
    description: Option<String>,
    language: Option<String>,
    creator_tool: Option<String>,
    create_date: Option<String>,
    producer: Option<String>,
    keywords: Option<String>,
    document_id: Option<String>,
    pdfa: Option<(u8, String)>,
}

impl XmpWriter {
    /// Create an empty packet builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a creator/author.
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creators.push(creator.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the document language.
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.language = Some(lang.into());
        self
    }

    /// Set the creator tool.
    pub fn creator_tool(mut self, tool: impl Into<String>) -> Self {
        self.creator_tool = Some(tool.into());
        self
    }

    /// Set the creation date (ISO 8601); also used as the modify and metadata date.
    pub fn create_date(mut self, date: impl Into<String>) -> Self {
        self.create_date = Some(date.into());
        self
    }

    /// Set the producer.
    pub fn producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Set the keywords.
    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// Set the `xmpMM:DocumentID` (a `uuid:` URN).
    pub fn document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// Declare PDF/A conformance (`pdfaid:part`, `pdfaid:conformance`).
    pub fn pdfa(mut self, part: u8, conformance: impl Into<String>) -> Self {
        self.pdfa = Some((part, conformance.into()));
        self
    }

    /// Build the XMP packet as a string.
    pub fn build(&self) -> String {
        let mut xml = String::with_capacity(4096);

        xml.push_str(r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>"#);
        xml.push('\n');
        xml.push_str(&format!("<x:xmpmeta xmlns:x=\"{}\">\n", NS_X));
        xml.push_str(&format!("  <rdf:RDF xmlns:rdf=\"{}\">\n", NS_RDF));

        xml.push_str("    <rdf:Description rdf:about=\"\"\n");
        xml.push_str(&format!("        xmlns:dc=\"{}\"\n", NS_DC));
        xml.push_str(&format!("        xmlns:xmp=\"{}\"\n", NS_XMP));
        xml.push_str(&format!("        xmlns:pdf=\"{}\"\n", NS_PDF));
        xml.push_str(&format!("        xmlns:xmpMM=\"{}\"\n", NS_XMP_MM));
        xml.push_str(&format!("        xmlns:pdfaid=\"{}\">\n", NS_PDFAID));

        if let Some((part, conformance)) = &self.pdfa {
            xml.push_str(&format!("      <pdfaid:part>{}</pdfaid:part>\n", part));
            xml.push_str(&format!(
                "      <pdfaid:conformance>{}</pdfaid:conformance>\n",
                escape_xml(conformance)
            ));
        }

        xml.push_str("      <dc:format>application/pdf</dc:format>\n");
        if let Some(title) = &self.title {
            push_alt(&mut xml, "dc:title", title);
        }
        if !self.creators.is_empty() {
            xml.push_str("      <dc:creator>\n        <rdf:Seq>\n");
            for creator in &self.creators {
                xml.push_str(&format!("          <rdf:li>{}</rdf:li>\n", escape_xml(creator)));
            }
            xml.push_str("        </rdf:Seq>\n      </dc:creator>\n");
        }
        if let Some(desc) = &self.description {
            push_alt(&mut xml, "dc:description", desc);
        }
        if let Some(lang) = &self.language {
            xml.push_str(&format!(
                "      <dc:language>\n        <rdf:Bag>\n          <rdf:li>{}</rdf:li>\n        </rdf:Bag>\n      </dc:language>\n",
                escape_xml(lang)
            ));
        }

        if let Some(tool) = &self.creator_tool {
            xml.push_str(&format!("      <xmp:CreatorTool>{}</xmp:CreatorTool>\n", escape_xml(tool)));
        }
        if let Some(date) = &self.create_date {
            let date = escape_xml(date);
            xml.push_str(&format!("      <xmp:CreateDate>{}</xmp:CreateDate>\n", date));
            xml.push_str(&format!("      <xmp:ModifyDate>{}</xmp:ModifyDate>\n", date));
            xml.push_str(&format!("      <xmp:MetadataDate>{}</xmp:MetadataDate>\n", date));
        }

        if let Some(producer) = &self.producer {
            xml.push_str(&format!("      <pdf:Producer>{}</pdf:Producer>\n", escape_xml(producer)));
        }
        if let Some(keywords) = &self.keywords {
            xml.push_str(&format!("      <pdf:Keywords>{}</pdf:Keywords>\n", escape_xml(keywords)));
        }

        if let Some(id) = &self.document_id {
            xml.push_str(&format!("      <xmpMM:DocumentID>{}</xmpMM:DocumentID>\n", escape_xml(id)));
        }

        xml.push_str("    </rdf:Description>\n");
        xml.push_str("  </rdf:RDF>\n");
        xml.push_str("</x:xmpmeta>\n");

        // Padding so the packet can be edited in place
        for _ in 0..20 {
            xml.push_str("                                                  \n");
        }
        xml.push_str(r#"<?xpacket end="w"?>"#);

        xml
    }

    /// Build the XMP packet as UTF-8 bytes.
    pub fn build_bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }
}

fn push_alt(xml: &mut String, tag: &str, value: &str) {
    xml.push_str(&format!("      <{}>\n        <rdf:Alt>\n", tag));
    xml.push_str(&format!(
        "          <rdf:li xml:lang=\"x-default\">{}</rdf:li>\n",
        escape_xml(value)
    ));
    xml.push_str(&format!("        </rdf:Alt>\n      </{}>\n", tag));
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
