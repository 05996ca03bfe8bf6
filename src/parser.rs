//! PDF object parser.
//!
//! Builds structured [`Object`] values from the flat token sequences produced
//! by the [`lexer`](crate::lexer), and recovers whole indirect objects
//! (including stream payloads) from a byte buffer.
//!
//! # Architecture
//!
//! Recursive descent over tokens:
//! 1. Look at the first token
//! 2. For composite types (arrays, dicts), recursively parse contents
//! 3. `int int R` is folded into a reference by look-ahead

use crate::error::{Error, Result};
use crate::lexer::{self, Terminator};
use crate::object::{Dictionary, LowLevelObject, Object, ObjectRef, Token};
use bytes::Bytes;

/// Resolves an indirect `/Length` to its integer value.
pub type LengthResolver<'a> = dyn Fn(ObjectRef) -> Option<i64> + 'a;

/// Recover one indirect object starting at `offset`.
///
/// The bytes at `offset` must begin with `N G obj`. Stream payloads are
/// delimited by `/Length` (a direct integer, or a reference looked up through
/// `resolve_length`), never by searching for `endstream`.
pub fn parse_indirect_object(
    buf: &Bytes,
    offset: usize,
    resolve_length: &LengthResolver<'_>,
) -> Result<LowLevelObject> {
    let scan = lexer::scan(buf, offset)?;

    let (number, generation) = match scan.tokens.as_slice() {
        [num, gen, obj, ..] if obj.is_word("obj") => {
            let number = num
                .as_integer()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| Error::malformed(offset, format!("bad object number '{}'", num)))?;
            let generation = gen
                .as_integer()
                .and_then(|g| u16::try_from(g).ok())
                .ok_or_else(|| Error::malformed(offset, format!("bad generation '{}'", gen)))?;
            (number, generation)
        },
        _ => return Err(Error::malformed(offset, "expected 'N G obj' header")),
    };

    let body = scan.tokens[3..].to_vec();
    let object = LowLevelObject::new(number, generation, offset, body);

    match scan.terminator {
        Terminator::EndObj => Ok(object),
        Terminator::StartXref | Terminator::EndOfInput => {
            log::debug!("Object {} at byte {} has no endobj", number, offset);
            Ok(object)
        },
        Terminator::Stream { data_start } => {
            let dict = object.dictionary()?;
            let length = match dict.get("Length") {
                Some(Object::Integer(n)) => *n,
                Some(Object::Reference(r)) => resolve_length(*r).ok_or_else(|| {
                    Error::malformed(offset, format!("unresolvable /Length {}", r))
                })?,
                Some(other) => {
                    return Err(Error::malformed(
                        offset,
                        format!("/Length is a {}", other.type_name()),
                    ))
                },
                None => return Err(Error::malformed(offset, "stream without /Length")),
            };
            let length = usize::try_from(length)
                .map_err(|_| Error::malformed(offset, format!("negative /Length {}", length)))?;
            let data_end = data_start
                .checked_add(length)
                .filter(|&end| end <= buf.len())
                .ok_or_else(|| {
                    Error::malformed(
                        offset,
                        format!("stream of {} bytes overruns buffer of {} bytes", length, buf.len()),
                    )
                })?;

            let after = &buf[data_end..];
            let skip = after.iter().take_while(|&&b| lexer::is_whitespace(b)).count();
            if !after[skip..].starts_with(b"endstream") {
                log::trace!("Object {}: 'endstream' not found right after payload", number);
            }
            Ok(object.with_stream(buf.slice(data_start..data_end)))
        },
    }
}

/// Parse a whole token sequence as one value. Trailing tokens are ignored.
pub fn parse_tokens(tokens: &[Token], offset: usize) -> Result<Object> {
    let (obj, rest) = parse_value(tokens, offset)?;
    if !rest.is_empty() {
        log::trace!("Ignoring {} trailing tokens at byte {}", rest.len(), offset);
    }
    Ok(obj)
}

/// Parse one value from the front of `tokens`, returning the remainder.
///
/// `offset` is only used for error context.
pub fn parse_value(tokens: &[Token], offset: usize) -> Result<(Object, &[Token])> {
    let (first, rest) = tokens
        .split_first()
        .ok_or_else(|| Error::malformed(offset, "unexpected end of tokens"))?;

    match first {
        Token::DictStart => {
            let (dict, rest) = parse_dictionary_body(rest, offset)?;
            Ok((Object::Dictionary(dict), rest))
        },
        Token::ArrayStart => {
            let mut items = Vec::new();
            let mut rest = rest;
            loop {
                match rest.first() {
                    Some(Token::ArrayEnd) => return Ok((Object::Array(items), &rest[1..])),
                    Some(_) => {
                        let (item, remaining) = parse_value(rest, offset)?;
                        items.push(item);
                        rest = remaining;
                    },
                    None => return Err(Error::malformed(offset, "unclosed array")),
                }
            }
        },
        Token::Name(raw) => Ok((Object::Name(decode_name_escapes(raw)), rest)),
        Token::LiteralString(raw) => {
            Ok((Object::String(decode_literal_string_escapes(raw)), rest))
        },
        Token::HexString(raw) => Ok((Object::String(decode_hex(raw, offset)?), rest)),
        Token::Word(word) => parse_word(word, rest, offset),
        other => Err(Error::malformed(offset, format!("unexpected '{}'", other))),
    }
}

fn parse_dictionary_body(tokens: &[Token], offset: usize) -> Result<(Dictionary, &[Token])> {
    let mut dict = Dictionary::new();
    let mut rest = tokens;
    loop {
        match rest.split_first() {
            Some((Token::DictEnd, remaining)) => return Ok((dict, remaining)),
            Some((Token::Name(key), remaining)) => {
                let (value, remaining) = parse_value(remaining, offset)?;
                dict.insert(&decode_name_escapes(key), value);
                rest = remaining;
            },
            Some((other, _)) => {
                return Err(Error::malformed(
                    offset,
                    format!("dictionary key must be a name, found '{}'", other),
                ))
            },
            None => return Err(Error::malformed(offset, "unclosed dictionary")),
        }
    }
}

fn parse_word<'t>(word: &str, rest: &'t [Token], offset: usize) -> Result<(Object, &'t [Token])> {
    match word {
        "true" => return Ok((Object::Boolean(true), rest)),
        "false" => return Ok((Object::Boolean(false), rest)),
        "null" => return Ok((Object::Null, rest)),
        _ => {},
    }

    if let Ok(int) = word.parse::<i64>() {
        // `id gen R`
        if let [gen, r, remaining @ ..] = rest {
            if r.is_word("R") {
                if let (Ok(id), Some(Ok(gen))) =
                    (u32::try_from(int), gen.as_integer().map(u16::try_from))
                {
                    return Ok((Object::Reference(ObjectRef::new(id, gen)), remaining));
                }
            }
        }
        return Ok((Object::Integer(int), rest));
    }

    if word.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+')) {
        if let Ok(real) = word.parse::<f64>() {
            return Ok((Object::Real(real), rest));
        }
    }

    Err(Error::malformed(offset, format!("unexpected keyword '{}'", word)))
}

/// Decode escape sequences in PDF literal strings (ISO 32000-1 7.3.4.2).
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` and line continuations.
/// Unknown escapes keep the backslash.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        let simple = match escaped {
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'b' => Some(8),
            b'f' => Some(12),
            b'(' | b')' | b'\\' => Some(escaped),
            _ => None,
        };
        if let Some(byte) = simple {
            result.push(byte);
            i += 2;
            continue;
        }

        match escaped {
            b'\n' => i += 2,
            b'\r' => {
                i += 2;
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let digits = raw[i + 1..]
                    .iter()
                    .take(3)
                    .take_while(|d| (b'0'..=b'7').contains(*d))
                    .count();
                let value = raw[i + 1..i + 1 + digits]
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + (d - b'0') as u32);
                result.push((value & 0xFF) as u8);
                i += 1 + digits;
            },
            _ => {
                result.push(b'\\');
                i += 1;
            },
        }
    }

    result
}

/// Decode a hex string body. Whitespace is ignored; an odd trailing digit is
/// padded with `0`.
pub fn decode_hex(hex_bytes: &[u8], offset: usize) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|&c| {
            (c as char)
                .to_digit(16)
                .map(|d| d as u8)
                .ok_or_else(|| Error::malformed(offset, format!("invalid hex digit '{}'", c as char)))
        })
        .collect::<Result<_>>()?;

    Ok(digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect())
}

/// Decode `#xx` escapes in a raw name.
///
/// Invalid escapes are kept literally. Decoded bytes that are not UTF-8 fall
/// back to Latin-1.
pub fn decode_name_escapes(raw: &str) -> String {
    if !raw.contains('#') {
        return raw.to_string();
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        let tokens = lexer::tokenize(input).unwrap();
        parse_tokens(&tokens, 0).unwrap()
    }

    fn no_lengths(_: ObjectRef) -> Option<i64> {
        None
    }

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"-42"), Object::Integer(-42));
        assert_eq!(parse(b"3.25"), Object::Real(3.25));
        assert_eq!(parse(b".5"), Object::Real(0.5));
        assert_eq!(parse(b"/Type"), Object::Name("Type".into()));
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse(b"12 0 R"), Object::Reference(ObjectRef::new(12, 0)));
    }

    #[test]
    fn test_parse_array_of_integers_not_reference() {
        let obj = parse(b"[0 0 612 792]");
        assert_eq!(
            obj,
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ])
        );
    }

    #[test]
    fn test_parse_array_with_references() {
        let obj = parse(b"[3 0 R 4 0 R]");
        assert_eq!(
            obj,
            Object::Array(vec![
                Object::Reference(ObjectRef::new(3, 0)),
                Object::Reference(ObjectRef::new(4, 0)),
            ])
        );
    }

    #[test]
    fn test_parse_nested_dictionary() {
        let obj = parse(b"<< /Type /Page /Resources << /Font << /F1 5 0 R >> >> >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_name("Type"), Some("Page"));
        let font = dict.get_dict("Resources").unwrap().get_dict("Font").unwrap();
        assert_eq!(font.get_reference("F1"), Some(ObjectRef::new(5, 0)));
    }

    #[test]
    fn test_parse_strings() {
        assert_eq!(parse(b"(a\\(b\\))"), Object::String(b"a(b)".to_vec()));
        assert_eq!(parse(b"<48656C6C6F>"), Object::String(b"Hello".to_vec()));
        assert_eq!(parse(b"<4>"), Object::String(vec![0x40]));
    }

    #[test]
    fn test_dictionary_key_must_be_name() {
        let tokens = lexer::tokenize(b"<< 1 2 >>").unwrap();
        assert!(matches!(parse_tokens(&tokens, 7), Err(Error::MalformedObject { offset: 7, .. })));
    }

    #[test]
    fn test_unclosed_array() {
        let tokens = lexer::tokenize(b"[1 2").unwrap();
        assert!(parse_tokens(&tokens, 0).is_err());
    }

    #[test]
    fn test_decode_literal_string_escapes() {
        assert_eq!(decode_literal_string_escapes(b"a\\nb"), b"a\nb");
        assert_eq!(decode_literal_string_escapes(b"Section \\247"), b"Section \xa7");
        assert_eq!(decode_literal_string_escapes(b"\\101\\102"), b"AB");
        assert_eq!(decode_literal_string_escapes(b"line\\\ncont"), b"linecont");
        assert_eq!(decode_literal_string_escapes(b"\\q"), b"\\q");
    }

    #[test]
    fn test_decode_name_escapes() {
        assert_eq!(decode_name_escapes("Name"), "Name");
        assert_eq!(decode_name_escapes("A#20B"), "A B");
        assert_eq!(decode_name_escapes("Bad#ZZ"), "Bad#ZZ");
        assert_eq!(decode_name_escapes("End#"), "End#");
    }

    #[test]
    fn test_decode_hex_invalid() {
        assert!(decode_hex(b"4G", 0).is_err());
    }

    #[test]
    fn test_parse_indirect_object() {
        let buf = Bytes::from_static(b"7 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let obj = parse_indirect_object(&buf, 0, &no_lengths).unwrap();
        assert_eq!(obj.number, 7);
        assert_eq!(obj.byte_offset, 0);
        assert!(!obj.is_stream());
        assert_eq!(obj.type_name(), Some("Catalog"));
    }

    #[test]
    fn test_parse_stream_direct_length() {
        let buf = Bytes::from_static(b"5 0 obj << /Length 5 >>\nstream\nhello\nendstream\nendobj");
        let obj = parse_indirect_object(&buf, 0, &no_lengths).unwrap();
        assert_eq!(obj.stream_bytes().map(|b| &b[..]), Some(&b"hello"[..]));
    }

    #[test]
    fn test_parse_stream_payload_containing_endstream() {
        let buf =
            Bytes::from_static(b"5 0 obj << /Length 9 >>\nstream\nendstreamendstream\nendobj");
        let obj = parse_indirect_object(&buf, 0, &no_lengths).unwrap();
        assert_eq!(obj.stream_bytes().map(|b| &b[..]), Some(&b"endstream"[..]));
    }

    #[test]
    fn test_parse_stream_indirect_length() {
        let buf = Bytes::from_static(b"5 0 obj << /Length 6 0 R >>\nstream\nabc\nendstream\nendobj");
        let resolver = |r: ObjectRef| (r.id == 6).then_some(3);
        let obj = parse_indirect_object(&buf, 0, &resolver).unwrap();
        assert_eq!(obj.stream_bytes().map(|b| &b[..]), Some(&b"abc"[..]));
    }

    #[test]
    fn test_parse_stream_unresolvable_length() {
        let buf = Bytes::from_static(b"5 0 obj << /Length 6 0 R >>\nstream\nabc\nendstream\nendobj");
        let err = parse_indirect_object(&buf, 0, &no_lengths).unwrap_err();
        assert!(matches!(err, Error::MalformedObject { offset: 0, .. }));
    }

    #[test]
    fn test_parse_stream_length_overruns() {
        let buf = Bytes::from_static(b"5 0 obj << /Length 500 >>\nstream\nabc\nendstream\nendobj");
        assert!(parse_indirect_object(&buf, 0, &no_lengths).is_err());
    }

    #[test]
    fn test_missing_header() {
        let buf = Bytes::from_static(b"<< /A 1 >> endobj");
        assert!(parse_indirect_object(&buf, 0, &no_lengths).is_err());
    }
}
