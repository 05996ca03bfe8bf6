//! Object stream parsing (PDF 1.5+).
//!
//! Object streams (/Type /ObjStm) pack several non-stream objects into one
//! compressed stream:
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode /Length ... >>
//! stream
//! 10 0 11 15 12 28    % pairs: (object number, offset relative to /First)
//! <dict> <array> ...  % object bodies
//! endstream
//! endobj
//! ```
//!
//! Each packed body is wrapped in a synthetic `N 0 obj ... endobj` so it runs
//! through the same scanner as a top-level object.

use crate::error::{Error, Result};
use crate::lexer;
use crate::object::LowLevelObject;
use crate::parser::parse_indirect_object;
use bytes::{BufMut, Bytes, BytesMut};

/// Upper bound on `/N`.
const MAX_OBJECTS_PER_STREAM: i64 = 1_000_000;

/// Unpack every object of an object stream container.
///
/// Returned objects carry `container = Some(container.number)` and a
/// `byte_offset` relative to the start of the decompressed data.
pub fn parse_object_stream(
    container: &LowLevelObject,
    max_decompressed_size: usize,
) -> Result<Vec<LowLevelObject>> {
    let at = container.byte_offset;
    let dict = container.dictionary()?;

    if let Some(type_name) = dict.get_name("Type") {
        if type_name != "ObjStm" {
            return Err(Error::malformed(
                at,
                format!("expected /Type /ObjStm, got /Type /{}", type_name),
            ));
        }
    }

    let n = dict
        .get_integer("N")
        .ok_or_else(|| Error::malformed(at, "object stream missing /N entry"))?;
    let first = dict
        .get_integer("First")
        .ok_or_else(|| Error::malformed(at, "object stream missing /First entry"))?;
    if !(0..=MAX_OBJECTS_PER_STREAM).contains(&n) {
        return Err(Error::malformed(at, format!("invalid object stream /N value: {}", n)));
    }
    let first = usize::try_from(first)
        .map_err(|_| Error::malformed(at, format!("invalid object stream /First value: {}", first)))?;

    let data = container.decompressed(max_decompressed_size)?;
    if data.len() < first {
        return Err(Error::malformed(
            at,
            format!("object stream data too short: {} bytes, /First is {}", data.len(), first),
        ));
    }

    let pairs = parse_object_number_pairs(&data[..first], n as usize, at)?;
    let body = &data[first..];

    let mut objects = Vec::with_capacity(pairs.len());
    for (i, &(number, rel_offset)) in pairs.iter().enumerate() {
        let end = pairs.get(i + 1).map_or(body.len(), |&(_, next)| next);
        if rel_offset > end || end > body.len() {
            return Err(Error::malformed(
                at,
                format!("object {} has range {}..{} outside the stream", number, rel_offset, end),
            ));
        }

        let wrapped = wrap_object(number, &body[rel_offset..end]);
        let mut object = parse_indirect_object(&wrapped, 0, &|_| None)?.in_container(container.number);
        object.byte_offset = first + rel_offset;
        objects.push(object);
    }

    log::debug!("Unpacked {} objects from object stream {}", objects.len(), container.number);
    Ok(objects)
}

/// Build `N 0 obj <body> endobj`.
fn wrap_object(number: u32, body: &[u8]) -> Bytes {
    let header = format!("{} 0 obj\n", number);
    let mut buf = BytesMut::with_capacity(header.len() + body.len() + 8);
    buf.put_slice(header.as_bytes());
    buf.put_slice(body);
    buf.put_slice(b"\nendobj");
    buf.freeze()
}

/// Parse the `num offset` header of an object stream.
fn parse_object_number_pairs(header: &[u8], n: usize, at: usize) -> Result<Vec<(u32, usize)>> {
    let tokens = lexer::tokenize(header)?;
    if tokens.len() < n * 2 {
        return Err(Error::malformed(
            at,
            format!("object stream header has {} integers, expected {}", tokens.len(), n * 2),
        ));
    }

    let mut pairs = Vec::with_capacity(n);
    for pair in tokens.chunks(2).take(n) {
        let number = pair[0].as_integer().and_then(|v| u32::try_from(v).ok());
        let offset = pair[1].as_integer().and_then(|v| usize::try_from(v).ok());
        match (number, offset) {
            (Some(number), Some(offset)) => pairs.push((number, offset)),
            _ => {
                return Err(Error::malformed(
                    at,
                    format!("bad object stream pair '{} {}'", pair[0], pair[1]),
                ))
            },
        }
    }
    Ok(pairs)
}
