//! Copying objects from a parsed donor document into a document being written.
//!
//! Copied objects get fresh numbers in the target. Every reference between
//! copied objects is rewritten to the new numbers; references to objects
//! outside the copied set are left as they are. Donor objects are copied in
//! ascending number order so output is deterministic.
//!
//! Page imports also register the donor's resources in the target's shared
//! Resources dictionary. When a resource name is already taken it is renamed,
//! and the donor content stream is rewritten so its operators use the new name.

use crate::error::{Error, Result};
use crate::lexer::{is_delimiter, is_whitespace};
use crate::object::{Dictionary, LowLevelObject, Object, ObjectRef};
use crate::parser::decode_name_escapes;
use crate::reader::PdfReader;
use crate::writer::{ObjectSerializer, PdfWriter, ResourceKind};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

lazy_static! {
    /// End of inline image data: `EI` delimited by whitespace
    static ref RE_INLINE_IMAGE_END: Regex = Regex::new(r"[\x00\t\n\x0C\r ]EI(?:[\x00\t\n\x0C\r ]|$)").unwrap();
}

/// Resource renames applied by a page import: (category, donor name) → target name.
pub type ResourceRenames = HashMap<(ResourceKind, String), String>;

/// Splices donor objects into a [`PdfWriter`].
#[derive(Debug)]
pub struct ResourceImporter<'w> {
    writer: &'w mut PdfWriter,
}

impl<'w> ResourceImporter<'w> {
    /// Import into `writer`.
    pub fn new(writer: &'w mut PdfWriter) -> Self {
        Self { writer }
    }

    /// The target writer.
    pub fn writer(&mut self) -> &mut PdfWriter {
        self.writer
    }

    /// Copy donor objects under fresh target numbers.
    ///
    /// Returns donor number → target reference. Every donor object is parsed
    /// and checked before the first target number is allocated, so a corrupt
    /// donor fails the import without touching the target.
    pub fn import_objects(&mut self, reader: &PdfReader, numbers: &[u32]) -> Result<BTreeMap<u32, ObjectRef>> {
        let wanted: BTreeSet<u32> = numbers.iter().copied().collect();
        let out = self.writer.output_mut();

        let mut prepared: Vec<(&LowLevelObject, Object)> = Vec::with_capacity(wanted.len());
        for &number in &wanted {
            let obj = reader.get(number)?;
            let value = obj.value()?;
            let mut refs = Vec::new();
            value.collect_references(&mut refs);
            if let Some(r) = refs
                .iter()
                .find(|r| !wanted.contains(&r.id) && (r.id == 0 || r.id > out.allocated()))
            {
                return Err(Error::ProgrammingSequence(format!(
                    "donor object {} references {} which is neither copied nor allocated in the target",
                    number, r
                )));
            }
            prepared.push((obj, value));
        }

        let mapping: BTreeMap<u32, ObjectRef> = wanted.iter().map(|&n| (n, out.reserve())).collect();
        let remap = |r: ObjectRef| mapping.get(&r.id).copied();

        for ((obj, mut value), target) in prepared.into_iter().zip(mapping.values().copied()) {
            value.remap_references(&remap);
            match (obj.stream_bytes(), value) {
                (Some(data), Object::Dictionary(mut dict)) => {
                    // Length is recomputed from the raw bytes
                    dict.remove("Length");
                    out.put_reserved_stream(target, dict, data)?;
                },
                (Some(_), other) => {
                    return Err(Error::InvalidObjectType {
                        expected: "Dictionary".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
                (None, value) => out.put_reserved(target, &value)?,
            }
            log::trace!("Imported donor object {} as {}", obj.number, target);
        }

        log::debug!("Imported {} donor objects", mapping.len());
        Ok(mapping)
    }

    /// Donor objects reachable from `roots`, ascending.
    ///
    /// `/Parent` links are not followed, so importing a page resource never
    /// drags in the donor's page tree. References to missing objects are
    /// skipped.
    pub fn dependency_closure(reader: &PdfReader, roots: &[u32]) -> Result<Vec<u32>> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<u32> = roots.iter().copied().collect();
        while let Some(number) = queue.pop_front() {
            if seen.contains(&number) {
                continue;
            }
            if !reader.contains(number) {
                log::warn!("Donor object {} is referenced but missing; not copied", number);
                continue;
            }
            seen.insert(number);
            let mut refs = Vec::new();
            collect_dependencies(&reader.value(number)?, &mut refs);
            queue.extend(refs.into_iter().map(|r| r.id).filter(|n| !seen.contains(n)));
        }
        Ok(seen.into_iter().collect())
    }

    /// Copy every resource a donor page uses into the target's shared Resources.
    ///
    /// Returns the names that had to change because the target already used them.
    pub fn import_page_resources(&mut self, reader: &PdfReader, page_index: usize) -> Result<ResourceRenames> {
        let page = reader.page(page_index)?;
        let entries = resource_entries(reader, &page.resources)?;

        let roots: Vec<u32> = entries
            .iter()
            .flat_map(|(_, _, value)| {
                let mut refs = Vec::new();
                value.collect_references(&mut refs);
                refs.into_iter().map(|r| r.id)
            })
            .collect();
        let closure = Self::dependency_closure(reader, &roots)?;
        let mapping = self.import_objects(reader, &closure)?;

        let mut renames = ResourceRenames::new();
        for (kind, name, mut value) in entries {
            value.remap_references(&|r: ObjectRef| mapping.get(&r.id).copied());
            let registered = self.writer.resources_mut().register_named(kind, &name, value);
            if registered != name {
                renames.insert((kind, name), registered);
            }
        }
        Ok(renames)
    }

    /// Import a donor page as a new page of the target.
    ///
    /// The donor content is decompressed, resource names renamed by the
    /// import are rewritten in it, and it is added with the donor's media box.
    /// Returns the new page index.
    pub fn import_page(&mut self, reader: &PdfReader, page_index: usize) -> Result<usize> {
        let page = reader.page(page_index)?;
        let content = reader.page_content(&page)?;
        let renames = self.import_page_resources(reader, page_index)?;

        let content = rewrite_resource_names(&content, &renames);
        let media_box = page.media_box.unwrap_or([0.0, 0.0, 612.0, 792.0]);
        let index = self.writer.add_page_with_box(media_box)?;
        if !content.is_empty() {
            self.writer.write_content(&content)?;
        }
        log::debug!(
            "Imported donor page {} as page {} ({} renamed resources)",
            page_index,
            index,
            renames.len()
        );
        Ok(index)
    }
}

/// References of a value, not following `/Parent` keys.
fn collect_dependencies(obj: &Object, out: &mut Vec<ObjectRef>) {
    match obj {
        Object::Reference(r) => out.push(*r),
        Object::Array(items) => items.iter().for_each(|item| collect_dependencies(item, out)),
        Object::Dictionary(dict) => {
            for (key, value) in dict.iter() {
                if key != "Parent" {
                    collect_dependencies(value, out);
                }
            }
        },
        _ => {},
    }
}

/// Flatten a Resources dictionary into (category, name, value) triples.
fn resource_entries(reader: &PdfReader, resources: &Dictionary) -> Result<Vec<(ResourceKind, String, Object)>> {
    let mut entries = Vec::new();
    for (key, value) in resources.iter() {
        let Some(kind) = ResourceKind::from_dict_key(key) else {
            continue;
        };
        let sub = reader.resolve_dict(value)?;
        entries.extend(sub.iter().map(|(name, value)| (kind, name.clone(), value.clone())));
    }
    Ok(entries)
}

/// Operator → (resource category, name operands to skip).
fn operator_resource(op: &[u8]) -> Option<(ResourceKind, usize)> {
    match op {
        b"Tf" => Some((ResourceKind::Font, 0)),
        b"Do" => Some((ResourceKind::XObject, 0)),
        b"gs" => Some((ResourceKind::ExtGState, 0)),
        b"cs" | b"CS" => Some((ResourceKind::ColorSpace, 0)),
        b"scn" | b"SCN" => Some((ResourceKind::Pattern, 0)),
        b"sh" => Some((ResourceKind::Shading, 0)),
        // The first name is the tag; a second one names a property list
        b"BDC" | b"DP" => Some((ResourceKind::Properties, 1)),
        _ => None,
    }
}

/// Rewrite resource-name operands of a content stream.
///
/// Only name tokens used as operands of resource operators change. Strings,
/// comments and inline image data are copied byte for byte.
pub fn rewrite_resource_names(content: &[u8], renames: &ResourceRenames) -> Vec<u8> {
    if renames.is_empty() {
        return content.to_vec();
    }

    let mut out = Vec::with_capacity(content.len() + 64);
    // Names since the last operator: (start in out, end in out, decoded name)
    let mut operands: Vec<(usize, usize, String)> = Vec::new();
    let mut dict_depth = 0usize;
    let mut i = 0;

    while i < content.len() {
        let b = content[i];
        match b {
            b'(' => {
                let end = literal_string_end(content, i);
                out.extend_from_slice(&content[i..end]);
                i = end;
            },
            b'<' if content.get(i + 1) == Some(&b'<') => {
                dict_depth += 1;
                out.extend_from_slice(b"<<");
                i += 2;
            },
            b'>' if content.get(i + 1) == Some(&b'>') => {
                dict_depth = dict_depth.saturating_sub(1);
                out.extend_from_slice(b">>");
                i += 2;
            },
            b'<' => {
                let end = content[i..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map_or(content.len(), |p| i + p + 1);
                out.extend_from_slice(&content[i..end]);
                i = end;
            },
            b'%' => {
                let end = content[i..]
                    .iter()
                    .position(|&c| c == b'\n' || c == b'\r')
                    .map_or(content.len(), |p| i + p);
                out.extend_from_slice(&content[i..end]);
                i = end;
            },
            b'/' => {
                let end = token_end(content, i + 1);
                let start = out.len();
                out.extend_from_slice(&content[i..end]);
                if dict_depth == 0 {
                    let raw = String::from_utf8_lossy(&content[i + 1..end]);
                    operands.push((start, out.len(), decode_name_escapes(&raw)));
                }
                i = end;
            },
            _ if is_whitespace(b) || is_delimiter(b) => {
                out.push(b);
                i += 1;
            },
            _ => {
                let end = token_end(content, i);
                let word = &content[i..end];
                out.extend_from_slice(word);
                i = end;

                let is_operand = matches!(word[0], b'0'..=b'9' | b'+' | b'-' | b'.')
                    || matches!(word, b"true" | b"false" | b"null");
                if is_operand {
                    continue;
                }
                if let Some((kind, skip)) = operator_resource(word) {
                    apply_renames(&mut out, &operands, skip, kind, renames);
                } else if word == b"ID" {
                    apply_inline_image_renames(&mut out, &operands, renames);
                }
                operands.clear();

                if word == b"ID" {
                    i = copy_inline_image(content, i, &mut out);
                }
            },
        }
    }
    out
}

/// Replace renamed operands in `out`, last first so earlier spans stay valid.
fn apply_renames(
    out: &mut Vec<u8>,
    operands: &[(usize, usize, String)],
    skip: usize,
    kind: ResourceKind,
    renames: &ResourceRenames,
) {
    for (start, end, name) in operands.iter().skip(skip).rev() {
        if let Some(new_name) = renames.get(&(kind, name.clone())) {
            let replacement = ObjectSerializer::compact().serialize(&Object::name(new_name.as_str()));
            out.splice(*start..*end, replacement);
        }
    }
}

/// Rename the colour space named by an inline image dictionary (`BI ... ID`).
///
/// Only the value following a `/CS` or `/ColorSpace` key is a resource name.
fn apply_inline_image_renames(out: &mut Vec<u8>, operands: &[(usize, usize, String)], renames: &ResourceRenames) {
    let values: Vec<(usize, usize, String)> = operands
        .windows(2)
        .filter(|pair| matches!(pair[0].2.as_str(), "CS" | "ColorSpace"))
        .map(|pair| pair[1].clone())
        .collect();
    apply_renames(out, &values, 0, ResourceKind::ColorSpace, renames);
}

/// Copy inline image data following `ID` verbatim, up to the whitespace before `EI`.
fn copy_inline_image(content: &[u8], from: usize, out: &mut Vec<u8>) -> usize {
    // Exactly one whitespace byte separates ID from the data
    let data_start = match content.get(from) {
        Some(&b) if is_whitespace(b) => {
            out.push(b);
            from + 1
        },
        _ => from,
    };
    let end = RE_INLINE_IMAGE_END
        .find_at(content, data_start)
        .map_or(content.len(), |m| m.start());
    out.extend_from_slice(&content[data_start..end]);
    end
}

fn token_end(content: &[u8], from: usize) -> usize {
    content[from..]
        .iter()
        .position(|&c| is_whitespace(c) || is_delimiter(c))
        .map_or(content.len(), |p| from + p)
}

/// End (exclusive) of the literal string starting at `start`.
fn literal_string_end(content: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < content.len() {
        match content[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            },
            _ => {},
        }
        i += 1;
    }
    content.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{PdfWriterConfig, XRefFormat};

    fn renames(entries: &[(ResourceKind, &str, &str)]) -> ResourceRenames {
        entries
            .iter()
            .map(|(k, old, new)| ((*k, old.to_string()), new.to_string()))
            .collect()
    }

    fn donor(font: &str) -> PdfReader {
        let mut writer = PdfWriter::with_config(PdfWriterConfig::default().with_compress(false));
        let name = writer.register_standard_font(font).unwrap();
        writer.add_page(300.0, 400.0).unwrap();
        writer
            .write_content(format!("BT /{} 12 Tf 10 10 Td (Hi /F1) Tj ET", name).as_bytes())
            .unwrap();
        PdfReader::from_bytes(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_rewrite_font_operand() {
        let map = renames(&[(ResourceKind::Font, "F1", "F7")]);
        let out = rewrite_resource_names(b"BT /F1 12 Tf (/F1 Tf) Tj ET", &map);
        assert_eq!(out, b"BT /F7 12 Tf (/F1 Tf) Tj ET");
    }

    #[test]
    fn test_rewrite_respects_operator_category() {
        let map = renames(&[(ResourceKind::XObject, "F1", "I9")]);
        let out = rewrite_resource_names(b"/F1 12 Tf /F1 Do", &map);
        assert_eq!(out, b"/F1 12 Tf /I9 Do");
    }

    #[test]
    fn test_rewrite_marked_content_properties() {
        let map = renames(&[(ResourceKind::Properties, "OC1", "OC4")]);
        let out = rewrite_resource_names(b"/OC /OC1 BDC q Q EMC /P <</MCID 0>> BDC EMC", &map);
        assert_eq!(out, b"/OC /OC4 BDC q Q EMC /P <</MCID 0>> BDC EMC");
    }

    #[test]
    fn test_inline_image_data_untouched() {
        let map = renames(&[(ResourceKind::XObject, "Im1", "I2")]);
        let content = b"BI /W 1 /H 1 /BPC 8 /CS /G ID \x2F\x49 /Im1 Do\nEI /Im1 Do";
        let out = rewrite_resource_names(content, &map);
        assert_eq!(out, b"BI /W 1 /H 1 /BPC 8 /CS /G ID \x2F\x49 /Im1 Do\nEI /I2 Do".to_vec());
    }

    #[test]
    fn test_inline_image_colour_space_renamed() {
        let renames = renames(&[(ResourceKind::ColorSpace, "CS0", "CS7"), (ResourceKind::ColorSpace, "CS", "CS9")]);
        let content = b"BI /W 1 /H 1 /BPC 8 /CS /CS0 ID \x00\nEI\nBI /ColorSpace /CS0 /W 1 /H 1 ID \x01\nEI\n/CS0 cs";
        let out = rewrite_resource_names(content, &renames);
        assert_eq!(
            out,
            b"BI /W 1 /H 1 /BPC 8 /CS /CS7 ID \x00\nEI\nBI /ColorSpace /CS7 /W 1 /H 1 ID \x01\nEI\n/CS7 cs".to_vec()
        );
    }

    #[test]
    fn test_no_renames_is_identity() {
        let content = b"q 1 0 0 1 0 0 cm /X Do Q";
        assert_eq!(rewrite_resource_names(content, &ResourceRenames::new()), content);
    }

    #[test]
    fn test_dependency_closure_skips_parent() {
        let reader = donor("Helvetica");
        let page = reader.page(0).unwrap();
        let closure = ResourceImporter::dependency_closure(&reader, &[page.reference.id]).unwrap();
        assert!(closure.contains(&page.reference.id));
        let parent = page.dict.get_reference("Parent").unwrap();
        assert!(!closure.contains(&parent.id));
    }

    #[test]
    fn test_import_objects_renumbers() {
        let reader = donor("Helvetica");
        let mut target = PdfWriter::new();
        target.register_standard_font("Courier").unwrap();

        let mut importer = ResourceImporter::new(&mut target);
        let mapping = importer.import_objects(&reader, &[1]).unwrap();
        assert_eq!(mapping.get(&1), Some(&ObjectRef::new(2, 0)));
    }

    #[test]
    fn test_import_page_renames_colliding_font() {
        let reader = donor("Times-Roman");
        let mut target = PdfWriter::with_config(
            PdfWriterConfig::default()
                .with_compress(false)
                .with_xref_format(XRefFormat::Table),
        );
        assert_eq!(target.register_standard_font("Helvetica").unwrap(), "F1");

        let index = ResourceImporter::new(&mut target).import_page(&reader, 0).unwrap();
        assert_eq!(index, 0);
        // Donor F1 lands as object 2 and is renamed after it
        assert!(target.resources().contains(ResourceKind::Font, "F2"));

        let bytes = target.finish().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("BT /F2 12 Tf 10 10 Td (Hi /F1) Tj ET"));
        assert!(text.contains("[0 0 300 400]"));
    }

    #[test]
    fn test_missing_donor_object_fails_before_allocation() {
        let reader = donor("Helvetica");
        let mut target = PdfWriter::new();
        let err = ResourceImporter::new(&mut target).import_objects(&reader, &[1, 99]).unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(99)));
        assert_eq!(target.output().allocated(), 0);
    }
}
