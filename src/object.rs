//! PDF object types.
//!
//! Two views of the same data live here:
//!
//! - [`LowLevelObject`]: an indirect object exactly as scanned from bytes
//!   (number, offset, flat token sequence, raw stream bytes).
//! - [`Object`] / [`Dictionary`]: the structured value built from those tokens
//!   (or by the writer), with an insertion-ordered key map so dictionaries
//!   serialize in the order they were built.

use crate::error::{Error, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use std::sync::OnceLock;
use std::fmt;

/// A lexical token of the PDF object grammar.
///
/// Nested dictionaries and arrays are flattened into one linear sequence with
/// balancing delimiter tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `{`
    BraceOpen,
    /// `}`
    BraceClose,
    /// Name without its leading `/`; `#xx` escapes are kept as written
    Name(String),
    /// Raw bytes between the outer parentheses; escapes are kept as written
    LiteralString(Vec<u8>),
    /// Raw bytes between `<` and `>`
    HexString(Vec<u8>),
    /// Any other run of regular characters: numbers, `R`, `true`, `obj`, operators
    Word(String),
}

impl Token {
    /// Build a word token.
    pub fn word(s: impl Into<String>) -> Self {
        Token::Word(s.into())
    }

    /// Parse this token as an integer, if it is a numeric word.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Token::Word(w) => w.parse().ok(),
            _ => None,
        }
    }

    /// Whether this token is the given bare word.
    pub fn is_word(&self, expected: &str) -> bool {
        matches!(self, Token::Word(w) if w == expected)
    }

    /// Whether this token is the given name (compared without the slash).
    pub fn is_name(&self, expected: &str) -> bool {
        matches!(self, Token::Name(n) if n == expected)
    }

    /// Append the byte form of this token to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Token::DictStart => out.extend_from_slice(b"<<"),
            Token::DictEnd => out.extend_from_slice(b">>"),
            Token::ArrayStart => out.push(b'['),
            Token::ArrayEnd => out.push(b']'),
            Token::BraceOpen => out.push(b'{'),
            Token::BraceClose => out.push(b'}'),
            Token::Name(n) => {
                out.push(b'/');
                out.extend_from_slice(n.as_bytes());
            },
            Token::LiteralString(s) => {
                out.push(b'(');
                out.extend_from_slice(s);
                out.push(b')');
            },
            Token::HexString(s) => {
                out.push(b'<');
                out.extend_from_slice(s);
                out.push(b'>');
            },
            Token::Word(w) => out.extend_from_slice(w.as_bytes()),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

/// Join tokens with single spaces.
pub fn tokens_to_bytes(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        tok.write_to(&mut out);
    }
    out
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

/// Structured PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (decoded bytes)
    String(Vec<u8>),
    /// String always written in hex syntax (`<...>`)
    HexString(Vec<u8>),
    /// Name (decoded, without the slash)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary
    Dictionary(Dictionary),
    /// Indirect object reference
    Reference(ObjectRef),
}

impl Object {
    /// Build a name object.
    pub fn name(s: impl Into<String>) -> Self {
        Object::Name(s.into())
    }

    /// Build a string object from text.
    pub fn string(s: impl AsRef<str>) -> Self {
        Object::String(s.as_ref().as_bytes().to_vec())
    }

    /// Build a text string: plain bytes for ASCII, UTF-16BE with BOM otherwise.
    pub fn text(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        if s.is_ascii() {
            return Object::String(s.as_bytes().to_vec());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes)
    }

    /// Build a reference object.
    pub fn reference(r: ObjectRef) -> Self {
        Object::Reference(r)
    }

    /// Build a `[llx lly urx ury]` rectangle.
    pub fn rect(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Object::Array(vec![
            Object::Real(llx),
            Object::Real(lly),
            Object::Real(urx),
            Object::Real(ury),
        ])
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) | Object::HexString(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a number, accepting integers and reals.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) | Object::HexString(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Collect every indirect reference reachable inside this value.
    pub fn collect_references(&self, out: &mut Vec<ObjectRef>) {
        match self {
            Object::Reference(r) => out.push(*r),
            Object::Array(items) => items.iter().for_each(|o| o.collect_references(out)),
            Object::Dictionary(dict) => dict.collect_references(out),
            _ => {},
        }
    }

    /// Rewrite references in place; `map` returns the replacement or `None`
    /// to leave a reference untouched.
    pub fn remap_references(&mut self, map: &dyn Fn(ObjectRef) -> Option<ObjectRef>) {
        match self {
            Object::Reference(r) => {
                if let Some(new_ref) = map(*r) {
                    *r = new_ref;
                }
            },
            Object::Array(items) => items.iter_mut().for_each(|o| o.remap_references(map)),
            Object::Dictionary(dict) => dict.remap_references(map),
            _ => {},
        }
    }
}

impl From<Dictionary> for Object {
    fn from(dict: Dictionary) -> Self {
        Object::Dictionary(dict)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

/// Ordered key → value dictionary.
///
/// Built once and serialized last: callers never patch serialized bytes by
/// position, they edit entries here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<String, Object>);

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Create a dictionary with a `/Type` entry.
    pub fn typed(type_name: &str) -> Self {
        Self::new().with("Type", Object::name(type_name))
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Object>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace an entry, keeping the original position on replace.
    pub fn insert(&mut self, key: &str, value: impl Into<Object>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Remove an entry, preserving the order of the others.
    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.0.shift_remove(key)
    }

    /// Get an entry.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.0.get(key)
    }

    /// Get an entry mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.0.get_mut(key)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Integer entry.
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Object::as_integer)
    }

    /// Name entry.
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Object::as_name)
    }

    /// Reference entry.
    pub fn get_reference(&self, key: &str) -> Option<ObjectRef> {
        self.get(key).and_then(Object::as_reference)
    }

    /// Nested dictionary entry.
    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Object::as_dict)
    }

    /// Array entry.
    pub fn get_array(&self, key: &str) -> Option<&Vec<Object>> {
        self.get(key).and_then(Object::as_array)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Object)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the dictionary has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collect every indirect reference reachable inside this dictionary.
    pub fn collect_references(&self, out: &mut Vec<ObjectRef>) {
        for value in self.0.values() {
            value.collect_references(out);
        }
    }

    /// Rewrite references in place (see [`Object::remap_references`]).
    pub fn remap_references(&mut self, map: &dyn Fn(ObjectRef) -> Option<ObjectRef>) {
        for value in self.0.values_mut() {
            value.remap_references(map);
        }
    }
}

impl FromIterator<(String, Object)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (String, Object)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An indirect object as recovered from a byte buffer.
#[derive(Debug, Clone)]
pub struct LowLevelObject {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
    /// Offset of the `N G obj` marker: in the file, or inside the decompressed
    /// container when `container` is set
    pub byte_offset: usize,
    /// Object stream this object was unpacked from
    pub container: Option<u32>,
    tokens: Vec<Token>,
    stream: Option<Bytes>,
    decompressed: OnceLock<Vec<u8>>,
}

impl LowLevelObject {
    /// Create an object from its parts.
    pub fn new(number: u32, generation: u16, byte_offset: usize, tokens: Vec<Token>) -> Self {
        Self {
            number,
            generation,
            byte_offset,
            container: None,
            tokens,
            stream: None,
            decompressed: OnceLock::new(),
        }
    }

    /// Attach raw stream bytes.
    pub fn with_stream(mut self, data: Bytes) -> Self {
        self.stream = Some(data);
        self
    }

    /// Mark this object as unpacked from an object stream.
    pub fn in_container(mut self, container: u32) -> Self {
        self.container = Some(container);
        self
    }

    /// Reference to this object.
    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.number, self.generation)
    }

    /// Body tokens (without the `N G obj` header and the terminator).
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Raw (still filtered) stream bytes.
    pub fn stream_bytes(&self) -> Option<&Bytes> {
        self.stream.as_ref()
    }

    /// Whether this is a stream object.
    pub fn is_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Parse the body into a structured value.
    pub fn value(&self) -> Result<Object> {
        crate::parser::parse_tokens(&self.tokens, self.byte_offset)
    }

    /// Parse the body as a dictionary (the stream dictionary for streams).
    pub fn dictionary(&self) -> Result<Dictionary> {
        match self.value()? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Value of the top-level `/Type` entry, read straight from the tokens.
    pub fn type_name(&self) -> Option<&str> {
        let mut depth = 0usize;
        let mut iter = self.tokens.iter().peekable();
        while let Some(tok) = iter.next() {
            match tok {
                Token::DictStart | Token::ArrayStart => depth += 1,
                Token::DictEnd | Token::ArrayEnd => depth = depth.saturating_sub(1),
                Token::Name(key) if depth == 1 && key == "Type" => {
                    if let Some(Token::Name(value)) = iter.peek() {
                        return Some(value.as_str());
                    }
                },
                _ => {},
            }
        }
        None
    }

    /// Decompressed stream payload, derived once on first access.
    pub fn decompressed(&self, max_size: usize) -> Result<&[u8]> {
        if let Some(data) = self.decompressed.get() {
            return Ok(data);
        }
        let raw = self.stream.as_ref().ok_or_else(|| Error::InvalidObjectType {
            expected: "Stream".to_string(),
            found: "Dictionary".to_string(),
        })?;
        let dict = self.dictionary()?;
        let decoded = crate::decoders::decode_stream_dict(raw, &dict, max_size)?;
        Ok(self.decompressed.get_or_init(|| decoded))
    }
}

impl PartialEq for LowLevelObject {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.generation == other.generation
            && self.tokens == other.tokens
            && self.stream == other.stream
    }
}
