//! Cross-reference reading.
//!
//! Locates `startxref`, then walks the `/Prev` chain of classic `xref`
//! tables and cross-reference streams, materializing every in-use object.
//! Older sections are read first so that redefinitions in later revisions
//! replace them (last definition wins, keyed by object number).

use crate::decoders::{decode_stream_dict, DecodeParams};
use crate::error::{Error, Result};
use crate::lexer;
use crate::object::{Dictionary, LowLevelObject, Object, ObjectRef, Token};
use crate::objstm::parse_object_stream;
use crate::parser::{parse_indirect_object, parse_tokens};
use crate::parser_config::ReaderOptions;
use bytes::Bytes;
use nom::bytes::complete::tag;
use nom::character::complete::{digit1, multispace0, one_of, space1};
use nom::combinator::map_res;
use nom::IResult;
use regex::bytes::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One entry of a cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry
    Free,
    /// Object stored directly in the file
    InUse {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        generation: u16,
    },
    /// Object packed inside an object stream
    Compressed {
        /// Object number of the containing object stream
        container: u32,
        /// Index of the object inside the container
        index: u32,
    },
}

/// One cross-reference section (a classic table or an xref stream).
#[derive(Debug, Clone)]
pub struct XRefSection {
    /// Offset the section was read from
    pub offset: usize,
    /// Entries in file order
    pub entries: Vec<(u32, XRefEntry)>,
    /// Trailer dictionary (the stream dictionary for xref streams)
    pub trailer: Dictionary,
    /// The xref stream object itself, when the section is a stream
    pub stream_object: Option<LowLevelObject>,
}

impl XRefSection {
    /// `/Prev` offset, if any.
    pub fn prev(&self) -> Result<Option<usize>> {
        match self.trailer.get_integer("Prev") {
            None => Ok(None),
            Some(prev) => usize::try_from(prev)
                .map(Some)
                .map_err(|_| Error::broken_chain(self.offset, format!("negative /Prev {}", prev))),
        }
    }
}

/// Every object recovered from a document, plus its merged trailer.
#[derive(Debug, Clone, Default)]
pub struct RecoveredObjects {
    /// Objects keyed by number
    pub objects: BTreeMap<u32, LowLevelObject>,
    /// Trailer keys of all sections, newer sections overriding older ones
    pub trailer: Dictionary,
    /// Number of sections walked
    pub sections: usize,
}

/// Find the offset named by the last `startxref` in the buffer.
pub fn find_startxref(buf: &[u8]) -> Result<usize> {
    const MARKER: &[u8] = b"startxref";
    let pos = buf
        .windows(MARKER.len())
        .rposition(|w| w == MARKER)
        .ok_or_else(|| Error::UnsupportedXRefShape("no startxref marker".to_string()))?;

    let after = &buf[pos + MARKER.len()..];
    let digits: Vec<u8> = after
        .iter()
        .skip_while(|b| lexer::is_whitespace(**b))
        .take_while(|b| b.is_ascii_digit())
        .copied()
        .collect();
    let offset = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| Error::broken_chain(pos, "startxref is not followed by an offset"))?;

    if offset >= buf.len() {
        return Err(Error::broken_chain(
            offset,
            format!("startxref points beyond end of buffer ({} bytes)", buf.len()),
        ));
    }
    Ok(offset)
}

/// Read every object reachable from the last `startxref`.
pub fn read_objects(buf: &Bytes, options: &ReaderOptions) -> Result<RecoveredObjects> {
    let start = find_startxref(buf)?;
    log::debug!("startxref -> {}", start);

    let mut recovered = RecoveredObjects::default();
    let mut visited = HashSet::new();
    read_chain(buf, start, options, 0, &mut visited, &mut recovered)?;

    log::debug!(
        "Recovered {} objects from {} cross-reference sections",
        recovered.objects.len(),
        recovered.sections
    );
    Ok(recovered)
}

fn read_chain(
    buf: &Bytes,
    offset: usize,
    options: &ReaderOptions,
    depth: usize,
    visited: &mut HashSet<usize>,
    recovered: &mut RecoveredObjects,
) -> Result<()> {
    if depth > options.max_prev_depth {
        return Err(Error::broken_chain(
            offset,
            format!("/Prev chain deeper than {}", options.max_prev_depth),
        ));
    }
    if offset >= buf.len() {
        return Err(Error::broken_chain(
            offset,
            format!("/Prev points beyond end of buffer ({} bytes)", buf.len()),
        ));
    }
    if !visited.insert(offset) {
        return Err(Error::broken_chain(offset, "/Prev chain loops"));
    }

    let mut section = parse_section(buf, offset, options)?;
    log::debug!(
        "Cross-reference section at {}: {} entries, stream={}",
        offset,
        section.entries.len(),
        section.stream_object.is_some()
    );

    if let Some(prev) = section.prev()? {
        read_chain(buf, prev, options, depth + 1, visited, recovered)?;
    }
    if section.stream_object.is_none() {
        merge_hybrid_stream(buf, &mut section, options, visited)?;
    }

    materialize(buf, &section, options, recovered)?;
    for (key, value) in section.trailer.iter() {
        recovered.trailer.insert(key, value.clone());
    }
    recovered.sections += 1;
    Ok(())
}

/// Fold the `/XRefStm` stream of a hybrid file into its classic table.
///
/// Table entries in use take precedence. Objects the table lists as free
/// (typically those packed into object streams) come from the stream.
fn merge_hybrid_stream(
    buf: &Bytes,
    section: &mut XRefSection,
    options: &ReaderOptions,
    visited: &mut HashSet<usize>,
) -> Result<()> {
    let Some(at) = section.trailer.get_integer("XRefStm") else {
        return Ok(());
    };
    let at = usize::try_from(at)
        .ok()
        .filter(|&at| at < buf.len())
        .ok_or_else(|| Error::broken_chain(section.offset, format!("/XRefStm {} outside buffer", at)))?;
    if !visited.insert(at) {
        return Err(Error::broken_chain(at, "/XRefStm points at a section already read"));
    }

    let hidden = parse_stream_section(buf, at, options)?;
    let in_use: HashSet<u32> = section
        .entries
        .iter()
        .filter(|(_, e)| !matches!(e, XRefEntry::Free))
        .map(|(n, _)| *n)
        .collect();
    let from_stream: HashSet<u32> = hidden.entries.iter().map(|(n, _)| *n).collect();
    let before = section.entries.len();
    section
        .entries
        .retain(|(n, e)| !matches!(e, XRefEntry::Free) || !from_stream.contains(n));
    section
        .entries
        .extend(hidden.entries.into_iter().filter(|(n, _)| !in_use.contains(n)));
    section.stream_object = hidden.stream_object;
    log::debug!(
        "Hybrid section at {}: /XRefStm {} adds {} entries",
        section.offset,
        at,
        section.entries.len().saturating_sub(before)
    );
    Ok(())
}

/// Parse the section at `offset`, dispatching on its first token.
pub fn parse_section(buf: &Bytes, offset: usize, options: &ReaderOptions) -> Result<XRefSection> {
    let first = lexer::scan(buf, offset)?.tokens.into_iter().next();
    match first {
        Some(Token::Word(w)) if w == "xref" => parse_table(buf, offset),
        Some(Token::Word(w)) if w.bytes().all(|b| b.is_ascii_digit()) => {
            parse_stream_section(buf, offset, options)
        },
        other => Err(Error::UnsupportedXRefShape(format!(
            "expected 'xref' or an xref stream at byte {}, found {:?}",
            offset, other
        ))),
    }
}

fn number<T: std::str::FromStr>(input: &[u8]) -> IResult<&[u8], T> {
    map_res(digit1, |d: &[u8]| {
        std::str::from_utf8(d)
            .ok()
            .and_then(|s| s.parse::<T>().ok())
            .ok_or(())
    })(input)
}

fn subsection_header(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    let (input, start) = number::<u32>(input)?;
    let (input, _) = space1(input)?;
    let (input, count) = number::<u32>(input)?;
    Ok((input, (start, count)))
}

/// `nnnnnnnnnn ggggg n` with any surrounding whitespace.
fn table_entry(input: &[u8]) -> IResult<&[u8], (usize, u16, char)> {
    let (input, _) = multispace0(input)?;
    let (input, offset) = number::<usize>(input)?;
    let (input, _) = space1(input)?;
    let (input, generation) = number::<u16>(input)?;
    let (input, _) = space1(input)?;
    let (input, status) = one_of("nf")(input)?;
    Ok((input, (offset, generation, status)))
}

/// Parse a classic `xref` table and its `trailer`.
fn parse_table(buf: &Bytes, offset: usize) -> Result<XRefSection> {
    let shape_err = |what: &str| Error::UnsupportedXRefShape(format!("{} at byte {}", what, offset));

    let (input, _) = multispace0::<_, nom::error::Error<&[u8]>>(&buf[offset..])
        .map_err(|_| shape_err("unreadable xref table"))?;
    let (mut input, _) = tag::<_, _, nom::error::Error<&[u8]>>("xref")(input)
        .map_err(|_| shape_err("missing 'xref' keyword"))?;

    let mut entries = Vec::new();
    loop {
        let (rest, _) = multispace0::<_, nom::error::Error<&[u8]>>(input)
            .map_err(|_| shape_err("unreadable xref table"))?;
        if rest.starts_with(b"trailer") {
            input = rest;
            break;
        }
        let (rest, (start, count)) =
            subsection_header(rest).map_err(|_| shape_err("malformed xref subsection header"))?;
        let mut rest = rest;
        for i in 0..count {
            let (remaining, (obj_offset, generation, status)) =
                table_entry(rest).map_err(|_| shape_err("malformed xref entry"))?;
            let entry = if status == 'n' {
                XRefEntry::InUse {
                    offset: obj_offset,
                    generation,
                }
            } else {
                XRefEntry::Free
            };
            let number = start
                .checked_add(i)
                .ok_or_else(|| shape_err(&format!("xref subsection {} {} overflows object numbers", start, count)))?;
            entries.push((number, entry));
            rest = remaining;
        }
        input = rest;
    }

    let trailer_start = buf.len() - input.len() + "trailer".len();
    let scan = lexer::scan(buf, trailer_start)?;
    let trailer = match parse_tokens(&scan.tokens, trailer_start)? {
        Object::Dictionary(dict) => dict,
        other => {
            return Err(Error::UnsupportedXRefShape(format!(
                "trailer at byte {} is a {}",
                trailer_start,
                other.type_name()
            )))
        },
    };

    Ok(XRefSection {
        offset,
        entries,
        trailer,
        stream_object: None,
    })
}

/// Big-endian integer over `bytes`; an empty field reads as `default`.
fn read_field(bytes: &[u8], default: u64) -> u64 {
    if bytes.is_empty() {
        return default;
    }
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Offset of the last `N G obj` header for `r` anywhere in the buffer.
fn locate_object(buf: &[u8], r: ObjectRef) -> Option<usize> {
    let pattern = format!(
        r"(?:^|[\x00\t\n\x0C\r ])({}[\x00\t\n\x0C\r ]+{}[\x00\t\n\x0C\r ]+obj)",
        r.id, r.gen
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures_iter(buf)
        .filter_map(|c| c.get(1))
        .map(|m| m.start())
        .last()
}

/// Checked narrowing of an xref stream field.
///
/// Out-of-range values fail the read in strict mode and drop the row
/// otherwise.
fn narrow<T: TryFrom<u64>>(
    value: u64,
    what: &str,
    number: u32,
    options: &ReaderOptions,
    at: usize,
) -> Result<Option<T>> {
    match T::try_from(value) {
        Ok(v) => Ok(Some(v)),
        Err(_) => {
            let err = Error::malformed(at, format!("object {} {} {} out of range", number, what, value));
            if options.strict {
                return Err(err);
            }
            log::warn!("Skipping xref row: {}", err);
            Ok(None)
        },
    }
}

/// Parse a `/Type /XRef` stream.
fn parse_stream_section(buf: &Bytes, offset: usize, options: &ReaderOptions) -> Result<XRefSection> {
    // No offset table exists yet, so an indirect /Length is found by its header
    let resolve_length = |r: ObjectRef| -> Option<i64> {
        let at = locate_object(buf, r)?;
        parse_indirect_object(buf, at, &|_| None).ok()?.value().ok()?.as_integer()
    };
    let object = parse_indirect_object(buf, offset, &resolve_length)?;
    if object.type_name() != Some("XRef") {
        return Err(Error::UnsupportedXRefShape(format!(
            "object {} at byte {} is not an xref stream",
            object.number, offset
        )));
    }
    let dict = object.dictionary()?;

    let widths: Vec<usize> = dict
        .get_array("W")
        .ok_or_else(|| Error::UnsupportedXRefShape("xref stream missing /W".to_string()))?
        .iter()
        .map(|w| w.as_integer().and_then(|w| usize::try_from(w).ok()).filter(|&w| w <= 8))
        .collect::<Option<_>>()
        .filter(|w: &Vec<usize>| w.len() == 3)
        .ok_or_else(|| Error::UnsupportedXRefShape("xref stream /W is not three widths".to_string()))?;

    if let Some(params) = DecodeParams::from_stream_dict(&dict) {
        if params.predictor != 1 && params.predictor != 12 {
            return Err(Error::UnsupportedXRefShape(format!(
                "xref stream /Predictor {}",
                params.predictor
            )));
        }
    }

    let raw = object
        .stream_bytes()
        .ok_or_else(|| Error::UnsupportedXRefShape("xref stream has no data".to_string()))?;
    let data = decode_stream_dict(raw, &dict, options.max_decompressed_size)?;

    let size = dict.get_integer("Size").unwrap_or(0);
    let index: Vec<i64> = match dict.get_array("Index") {
        Some(items) => items.iter().filter_map(Object::as_integer).collect(),
        None => vec![0, size],
    };

    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(Error::UnsupportedXRefShape("xref stream /W is all zero".to_string()));
    }
    let mut rows = data.chunks_exact(row_len);
    let mut entries = Vec::new();

    for range in index.chunks_exact(2) {
        let (start, count) = (range[0], range[1]);
        if start < 0 || count < 0 {
            return Err(Error::UnsupportedXRefShape(format!("bad /Index range {} {}", start, count)));
        }
        for i in 0..count {
            let row = rows.next().ok_or_else(|| {
                Error::UnsupportedXRefShape(format!("xref stream at byte {} is truncated", offset))
            })?;
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);

            let number = start
                .checked_add(i)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    Error::UnsupportedXRefShape(format!("/Index range {} {} overflows object numbers", start, count))
                })?;
            let (f2, f3) = (read_field(f2, 0), read_field(f3, 0));
            let entry = match read_field(f1, 1) {
                0 => XRefEntry::Free,
                1 => match (
                    narrow::<usize>(f2, "offset", number, options, offset)?,
                    narrow::<u16>(f3, "generation", number, options, offset)?,
                ) {
                    (Some(offset), Some(generation)) => XRefEntry::InUse { offset, generation },
                    _ => continue,
                },
                2 => match (
                    narrow::<u32>(f2, "container", number, options, offset)?,
                    narrow::<u32>(f3, "index", number, options, offset)?,
                ) {
                    (Some(container), Some(index)) => XRefEntry::Compressed { container, index },
                    _ => continue,
                },
                other => {
                    log::trace!("Ignoring xref stream row of type {} for object {}", other, number);
                    continue;
                },
            };
            entries.push((number, entry));
        }
    }

    Ok(XRefSection {
        offset,
        entries,
        trailer: dict,
        stream_object: Some(object),
    })
}

/// Parse one in-use object, honoring lenient/strict mode for object-scoped errors.
fn parse_entry(
    buf: &Bytes,
    number: u32,
    offset: usize,
    options: &ReaderOptions,
    resolve_length: &dyn Fn(ObjectRef) -> Option<i64>,
) -> Result<Option<LowLevelObject>> {
    match parse_indirect_object(buf, offset, resolve_length) {
        Ok(object) => {
            if object.number != number {
                log::warn!(
                    "xref entry for object {} points at object {} (byte {})",
                    number,
                    object.number,
                    offset
                );
            }
            log::trace!("Object {} at byte {}", object.number, offset);
            Ok(Some(object))
        },
        Err(e) if e.is_object_scoped() && !options.strict => {
            log::warn!("Skipping object {}: {}", number, e);
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

/// Parse every entry of `section` into `recovered`.
fn materialize(
    buf: &Bytes,
    section: &XRefSection,
    options: &ReaderOptions,
    recovered: &mut RecoveredObjects,
) -> Result<()> {
    let section_offsets: HashMap<u32, usize> = section
        .entries
        .iter()
        .filter_map(|(n, e)| match e {
            XRefEntry::InUse { offset, .. } => Some((*n, *offset)),
            _ => None,
        })
        .collect();

    let parsed = {
        let known = &recovered.objects;
        // Indirect /Length: an object already read, else this section's offset table
        let resolve_length = |r: ObjectRef| -> Option<i64> {
            if let Some(obj) = known.get(&r.id) {
                return obj.value().ok()?.as_integer();
            }
            let at = *section_offsets.get(&r.id)?;
            parse_indirect_object(buf, at, &|_| None).ok()?.value().ok()?.as_integer()
        };

        let mut parsed = Vec::new();
        for (number, entry) in &section.entries {
            if let XRefEntry::InUse { offset, .. } = entry {
                if *offset == 0 || *offset >= buf.len() {
                    let err = Error::malformed(*offset, format!("object {} offset out of range", number));
                    if options.strict {
                        return Err(err);
                    }
                    log::warn!("Skipping object {}: {}", number, err);
                    continue;
                }
                if let Some(object) = parse_entry(buf, *number, *offset, options, &resolve_length)? {
                    parsed.push(object);
                }
            }
        }
        parsed
    };

    for object in parsed {
        recovered.objects.insert(object.number, object);
    }
    if let Some(stream_object) = &section.stream_object {
        recovered
            .objects
            .insert(stream_object.number, stream_object.clone());
    }

    // Object streams named by this section's compressed rows
    let mut by_container: BTreeMap<u32, HashSet<u32>> = BTreeMap::new();
    for (number, entry) in &section.entries {
        if let XRefEntry::Compressed { container, .. } = entry {
            by_container.entry(*container).or_default().insert(*number);
        }
    }

    for (container_number, wanted) in by_container {
        let Some(container) = recovered.objects.get(&container_number) else {
            let err = Error::malformed(0, format!("object stream {} not found", container_number));
            if options.strict {
                return Err(err);
            }
            log::warn!("{}", err);
            continue;
        };
        match parse_object_stream(container, options.max_decompressed_size) {
            Ok(objects) => {
                for object in objects.into_iter().filter(|o| wanted.contains(&o.number)) {
                    recovered.objects.insert(object.number, object);
                }
            },
            Err(e) if e.is_object_scoped() && !options.strict => {
                log::warn!("Skipping object stream {}: {}", container_number, e);
            },
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a small classic file; returns the bytes and object offsets.
    fn classic_file(bodies: &[&str], prev: Option<usize>, base: &[u8]) -> (Vec<u8>, Vec<usize>) {
        let mut buf = base.to_vec();
        if buf.is_empty() {
            buf.extend_from_slice(b"%PDF-1.7\n");
        }
        let mut offsets = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            offsets.push(buf.len());
            buf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = buf.len();
        buf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
        for off in &offsets {
            buf.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        let prev = prev.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
        buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
                bodies.len() + 1,
                prev,
                xref_at
            )
            .as_bytes(),
        );
        (buf, offsets)
    }

    #[test]
    fn test_find_startxref() {
        let buf = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\nstartxref\n9\n%%EOF\n";
        assert_eq!(find_startxref(buf).unwrap(), 9);
    }

    #[test]
    fn test_find_startxref_uses_last_marker() {
        let buf = b"startxref\n1\n%%EOF\n..........startxref\n5\n%%EOF";
        assert_eq!(find_startxref(buf).unwrap(), 5);
    }

    #[test]
    fn test_find_startxref_missing() {
        assert!(matches!(find_startxref(b"%PDF-1.7\n"), Err(Error::UnsupportedXRefShape(_))));
    }

    #[test]
    fn test_find_startxref_beyond_buffer() {
        let err = find_startxref(b"startxref\n99999\n%%EOF").unwrap_err();
        assert!(matches!(err, Error::BrokenReferenceChain { offset: 99999, .. }));
    }

    #[test]
    fn test_read_classic_table() {
        let (buf, _) = classic_file(&["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"], None, b"");
        let recovered = read_objects(&Bytes::from(buf), &ReaderOptions::default()).unwrap();
        assert_eq!(recovered.objects.len(), 2);
        assert_eq!(recovered.objects[&1].type_name(), Some("Catalog"));
        assert_eq!(recovered.trailer.get_reference("Root"), Some(ObjectRef::new(1, 0)));
        assert_eq!(recovered.sections, 1);
    }

    #[test]
    fn test_prev_chain_last_definition_wins() {
        let (base, _) = classic_file(&["<< /V 1 >>", "<< /Keep true >>"], None, b"");
        let first_xref = find_startxref(&base).unwrap();

        // Incremental update redefining object 1
        let mut buf = base.clone();
        let update_at = buf.len();
        buf.extend_from_slice(b"1 0 obj\n<< /V 2 >>\nendobj\n");
        let xref_at = buf.len();
        buf.extend_from_slice(
            format!(
                "xref\n1 1\n{:010} 00000 n \ntrailer\n<< /Size 3 /Prev {} >>\nstartxref\n{}\n%%EOF\n",
                update_at, first_xref, xref_at
            )
            .as_bytes(),
        );

        let recovered = read_objects(&Bytes::from(buf), &ReaderOptions::default()).unwrap();
        assert_eq!(recovered.sections, 2);
        assert_eq!(recovered.objects[&1].dictionary().unwrap().get_integer("V"), Some(2));
        assert!(recovered.objects.contains_key(&2));
        // Root comes from the older trailer
        assert_eq!(recovered.trailer.get_reference("Root"), Some(ObjectRef::new(1, 0)));
    }

    #[test]
    fn test_prev_beyond_buffer() {
        let (buf, _) = classic_file(&["<< >>"], Some(1_000_000), b"");
        let err = read_objects(&Bytes::from(buf), &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::BrokenReferenceChain { offset: 1_000_000, .. }));
    }

    #[test]
    fn test_prev_loop_detected() {
        let (mut buf, _) = classic_file(&["<< >>"], None, b"");
        let xref_at = find_startxref(&buf).unwrap();
        // Point /Prev back at the same section
        let text = String::from_utf8(buf.clone()).unwrap();
        let patched = text.replace("/Root 1 0 R >>", &format!("/Root 1 0 R /Prev {} >>", xref_at));
        buf = patched.into_bytes();
        let err = read_objects(&Bytes::from(buf), &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::BrokenReferenceChain { .. }));
    }

    #[test]
    fn test_unsupported_shape() {
        let buf = b"%PDF-1.7\n<< /Foo 1 >>\nstartxref\n9\n%%EOF";
        let err = read_objects(&Bytes::from_static(buf), &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedXRefShape(_)));
    }

    #[test]
    fn test_lenient_skips_malformed_object() {
        let (buf, _) = classic_file(&["<< /Length 9 0 R >>\nstream\nabc\nendstream", "<< /Ok true >>"], None, b"");
        let bytes = Bytes::from(buf);

        let recovered = read_objects(&bytes, &ReaderOptions::lenient()).unwrap();
        assert!(!recovered.objects.contains_key(&1));
        assert!(recovered.objects.contains_key(&2));

        let err = read_objects(&bytes, &ReaderOptions::strict()).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { .. }));
    }

    #[test]
    fn test_indirect_length_resolved_from_section() {
        let (buf, _) =
            classic_file(&["<< /Length 2 0 R >>\nstream\nabcd\nendstream", "4"], None, b"");
        let recovered = read_objects(&Bytes::from(buf), &ReaderOptions::strict()).unwrap();
        let data = recovered.objects[&1].stream_bytes().unwrap();
        assert_eq!(&data[..], b"abcd");
    }

    /// Catalog as object 1, then an uncompressed xref stream as object 2.
    ///
    /// `rows` receives the catalog offset and returns the stream payload.
    fn stream_file(dict_extra: &str, rows: impl Fn(usize) -> Vec<u8>) -> Vec<u8> {
        let mut buf = b"%PDF-1.7\n".to_vec();
        let catalog = buf.len();
        buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let xref_at = buf.len();
        let data = rows(catalog);
        buf.extend_from_slice(
            format!("2 0 obj\n<< /Type /XRef /Size 3 {} /Length {} >>\nstream\n", dict_extra, data.len()).as_bytes(),
        );
        buf.extend_from_slice(&data);
        buf.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_at).as_bytes());
        buf
    }

    fn catalog_rows(catalog: usize) -> Vec<u8> {
        vec![0, 0, 0, 0xFF, 1, (catalog >> 8) as u8, catalog as u8, 0]
    }

    fn read(buf: Vec<u8>) -> Result<RecoveredObjects> {
        read_objects(&Bytes::from(buf), &ReaderOptions::default())
    }

    #[test]
    fn test_read_plain_xref_stream() {
        let recovered = read(stream_file("/W [1 2 1] /Index [0 2]", catalog_rows)).unwrap();
        assert_eq!(recovered.objects[&1].type_name(), Some("Catalog"));
        assert_eq!(recovered.objects[&2].type_name(), Some("XRef"));
    }

    #[test]
    fn test_xref_stream_rejects_other_predictors() {
        let buf = stream_file("/W [1 2 1] /DecodeParms << /Predictor 15 /Columns 4 >>", catalog_rows);
        match read(buf) {
            Err(Error::UnsupportedXRefShape(reason)) => assert!(reason.contains("/Predictor 15")),
            other => panic!("expected UnsupportedXRefShape, got {:?}", other),
        }
    }

    #[test]
    fn test_xref_stream_needs_three_widths() {
        for extra in ["", "/W [1 2]", "/W [1 2 1 1]", "/W [1 /Two 1]", "/W [1 9 1]"] {
            let err = read(stream_file(extra, catalog_rows)).unwrap_err();
            assert!(matches!(err, Error::UnsupportedXRefShape(_)), "{:?}: {:?}", extra, err);
        }
    }

    #[test]
    fn test_huge_predictor_columns_is_an_error() {
        let extra = "/W [1 2 1] /DecodeParms << /Predictor 12 /Columns 4611686018427387904 /Colors 4 >>";
        let err = read(stream_file(extra, catalog_rows)).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "{:?}", err);
    }

    #[test]
    fn test_xref_stream_index_overflow() {
        let rows = |catalog: usize| {
            let rows = catalog_rows(catalog);
            [rows.clone(), rows].concat()
        };
        let err = read(stream_file("/W [1 2 1] /Index [4294967295 2]", rows)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedXRefShape(_)), "{:?}", err);
    }

    #[test]
    fn test_xref_stream_field_out_of_range() {
        // Generation 0x1_0000 does not fit u16
        let rows = |catalog: usize| {
            let mut rows = vec![0, 0, 0, 0, 0, 0xFF];
            rows.extend_from_slice(&[1, (catalog >> 8) as u8, catalog as u8, 0x01, 0x00, 0x00]);
            rows
        };
        let buf = stream_file("/W [1 2 3] /Index [0 2]", rows);
        let err = read_objects(&Bytes::from(buf.clone()), &ReaderOptions::strict()).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { .. }));

        let recovered = read(buf).unwrap();
        assert!(!recovered.objects.contains_key(&1));
    }

    #[test]
    fn test_table_subsection_overflow() {
        let buf = b"%PDF-1.7\n1 0 obj\n<< >>\nendobj\n\
            xref\n4294967295 2\n0000000009 00000 n \n0000000009 00000 n \n\
            trailer\n<< /Size 3 >>\nstartxref\n30\n%%EOF\n";
        let err = read(buf.to_vec()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedXRefShape(_)), "{:?}", err);
    }

    #[test]
    fn test_xref_stream_indirect_length() {
        let mut buf = b"%PDF-1.7\n".to_vec();
        let catalog = buf.len();
        buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let xref_at = buf.len();
        let data = catalog_rows(catalog);
        buf.extend_from_slice(b"2 0 obj\n<< /Type /XRef /Size 4 /W [1 2 1] /Index [0 2] /Length 3 0 R >>\nstream\n");
        buf.extend_from_slice(&data);
        buf.extend_from_slice(b"\nendstream\nendobj\n");
        buf.extend_from_slice(format!("3 0 obj\n{}\nendobj\nstartxref\n{}\n%%EOF\n", data.len(), xref_at).as_bytes());

        let recovered = read_objects(&Bytes::from(buf), &ReaderOptions::strict()).unwrap();
        assert_eq!(recovered.objects[&1].type_name(), Some("Catalog"));
    }

    #[test]
    fn test_hybrid_file_reads_hidden_objects() {
        let mut buf = b"%PDF-1.7\n".to_vec();
        let catalog = buf.len();
        buf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Extra 3 0 R >>\nendobj\n");
        let container = buf.len();
        let packed = b"3 0 << /Hidden true >>";
        buf.extend_from_slice(
            format!("2 0 obj\n<< /Type /ObjStm /N 1 /First 4 /Length {} >>\nstream\n", packed.len()).as_bytes(),
        );
        buf.extend_from_slice(packed);
        buf.extend_from_slice(b"\nendstream\nendobj\n");

        // Object 3 lives in object stream 2, index 0
        let xref_stream = buf.len();
        let row = [2u8, 0, 2, 0];
        buf.extend_from_slice(b"4 0 obj\n<< /Type /XRef /Size 5 /W [1 2 1] /Index [3 1] /Length 4 >>\nstream\n");
        buf.extend_from_slice(&row);
        buf.extend_from_slice(b"\nendstream\nendobj\n");

        let table = buf.len();
        buf.extend_from_slice(
            format!(
                "xref\n0 5\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \n0000000000 00000 f \n{:010} 00000 n \n\
                 trailer\n<< /Size 5 /Root 1 0 R /XRefStm {} >>\nstartxref\n{}\n%%EOF\n",
                catalog, container, xref_stream, xref_stream, table
            )
            .as_bytes(),
        );

        let recovered = read_objects(&Bytes::from(buf), &ReaderOptions::strict()).unwrap();
        let hidden = &recovered.objects[&3];
        assert_eq!(hidden.container, Some(2));
        assert_eq!(hidden.dictionary().unwrap().get("Hidden"), Some(&Object::Boolean(true)));
        assert_eq!(recovered.objects[&1].type_name(), Some("Catalog"));
        // The stream dictionary does not leak into the trailer
        assert_eq!(recovered.trailer.get_name("Type"), None);
    }

    #[test]
    fn test_hybrid_stream_outside_buffer() {
        let (buf, _) = classic_file(&["<< >>"], None, b"");
        let text = String::from_utf8(buf).unwrap().replace("/Root 1 0 R >>", "/Root 1 0 R /XRefStm 999999 >>");
        let err = read(text.into_bytes()).unwrap_err();
        assert!(matches!(err, Error::BrokenReferenceChain { .. }));
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field(&[0x01, 0x02], 0), 0x0102);
        assert_eq!(read_field(&[], 1), 1);
        assert_eq!(read_field(&[0, 0, 0, 0xFA], 0), 250);
    }

    #[test]
    fn test_table_entry_parser() {
        let (_, (offset, generation, status)) = table_entry(b"0000000250 00000 n \n").unwrap();
        assert_eq!((offset, generation, status), (250, 0, 'n'));
    }
}
