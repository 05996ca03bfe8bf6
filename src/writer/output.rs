//! The output byte buffer and its offset table.
//!
//! `PdfOutput` is the single owner of the bytes being produced and of the
//! object-number → offset table. Every object number is handed out exactly
//! once, either by opening an object directly or by reserving a number that
//! a later object will fill. The running buffer length is the only source
//! of offsets.

use super::object_serializer::ObjectSerializer;
use crate::decoders::{encode_up, flate_encode};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};

/// Binary marker comment following the version line.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Field widths of the cross-reference streams we emit.
const XREF_STREAM_WIDTHS: [usize; 3] = [1, 4, 2];

/// Objects packed into one object stream before it is flushed.
const MAX_OBJECTS_PER_STREAM: usize = 100;

/// State of one object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Allocated, not yet written
    Reserved,
    /// Written at this byte offset
    Written(usize),
    /// Packed into an object stream
    Compressed {
        /// Container object number
        container: u32,
        /// Index inside the container
        index: u32,
    },
}

/// Owned output buffer with object bookkeeping.
#[derive(Debug)]
pub struct PdfOutput {
    buf: Vec<u8>,
    slots: Vec<Slot>,
    open: Option<u32>,
    serializer: ObjectSerializer,
    /// When set, `put_object`/`put_reserved` pack into object streams
    object_stream: Option<ObjectStreamBuilder>,
}

impl PdfOutput {
    /// Start a document: version comment line plus binary marker comment.
    pub fn new(version: &str) -> Self {
        let mut buf = format!("%PDF-{}\n", version).into_bytes();
        buf.extend_from_slice(BINARY_MARKER);
        Self {
            buf,
            slots: Vec::new(),
            open: None,
            serializer: ObjectSerializer::new(),
            object_stream: None,
        }
    }

    /// Route later non-stream objects into object streams.
    ///
    /// Only a cross-reference stream can address them, see
    /// [`PdfOutput::finish_with_xref_stream`].
    pub fn enable_object_streams(&mut self, compress: bool) {
        if self.object_stream.is_none() {
            self.object_stream = Some(ObjectStreamBuilder::new(compress));
        }
    }

    /// Whether non-stream objects are being packed into object streams.
    pub fn uses_object_streams(&self) -> bool {
        self.object_stream.is_some()
    }

    /// Current byte count.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Highest object number handed out so far.
    pub fn allocated(&self) -> u32 {
        self.slots.len() as u32
    }

    /// The bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// State of an object number.
    pub fn slot(&self, number: u32) -> Option<Slot> {
        number
            .checked_sub(1)
            .and_then(|i| self.slots.get(i as usize))
            .copied()
    }

    /// Byte offset of a written object.
    pub fn offset_of(&self, number: u32) -> Option<usize> {
        match self.slot(number)? {
            Slot::Written(offset) => Some(offset),
            _ => None,
        }
    }

    /// Whether an object is currently open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Allocate a number to be written later.
    pub fn reserve(&mut self) -> ObjectRef {
        self.slots.push(Slot::Reserved);
        let number = self.allocated();
        log::trace!("Reserved object {}", number);
        ObjectRef::new(number, 0)
    }

    /// Allocate the next number and open it at the current offset.
    pub fn open_object(&mut self) -> Result<ObjectRef> {
        self.ensure_closed("open a new object")?;
        self.slots.push(Slot::Written(self.buf.len()));
        let number = self.allocated();
        self.write_header(number);
        Ok(ObjectRef::new(number, 0))
    }

    /// Open a previously reserved number at the current offset.
    pub fn open_reserved(&mut self, r: ObjectRef) -> Result<()> {
        self.ensure_closed("open a reserved object")?;
        let index = r
            .id
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|&i| i < self.slots.len())
            .ok_or_else(|| Error::ProgrammingSequence(format!("object {} was never reserved", r.id)))?;
        if self.slots[index] != Slot::Reserved {
            return Err(Error::ProgrammingSequence(format!("object {} was already written", r.id)));
        }
        self.slots[index] = Slot::Written(self.buf.len());
        self.write_header(r.id);
        Ok(())
    }

    fn write_header(&mut self, number: u32) {
        log::trace!("Object {} at byte {}", number, self.buf.len());
        self.buf
            .extend_from_slice(format!("{} 0 obj\n", number).as_bytes());
        self.open = Some(number);
    }

    /// Emit the closing marker of the open object.
    pub fn close_object(&mut self) -> Result<()> {
        if self.open.take().is_none() {
            return Err(Error::ProgrammingSequence("no object is open".to_string()));
        }
        self.buf.extend_from_slice(b"\nendobj\n");
        Ok(())
    }

    fn ensure_closed(&self, action: &str) -> Result<()> {
        match self.open {
            Some(open) => Err(Error::ProgrammingSequence(format!(
                "cannot {} while object {} is open",
                action, open
            ))),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.is_none() {
            return Err(Error::ProgrammingSequence("no object is open".to_string()));
        }
        Ok(())
    }

    /// Fail if `obj` references a number that has not been handed out.
    pub fn check_references(&self, obj: &Object) -> Result<()> {
        let mut refs = Vec::new();
        obj.collect_references(&mut refs);
        match refs.iter().find(|r| r.id == 0 || r.id > self.allocated()) {
            Some(r) => Err(Error::ProgrammingSequence(format!(
                "reference to unallocated object {} (highest allocated is {})",
                r,
                self.allocated()
            ))),
            None => Ok(()),
        }
    }

    /// Append raw bytes to the open object.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Serialize a value into the open object.
    pub fn write_value(&mut self, obj: &Object) -> Result<()> {
        self.ensure_open()?;
        self.check_references(obj)?;
        self.serializer.write_object(&mut self.buf, obj);
        Ok(())
    }

    /// Write a stream body into the open object; `/Length` is set from `data`.
    pub fn write_stream(&mut self, mut dict: Dictionary, data: &[u8]) -> Result<()> {
        dict.insert("Length", data.len() as i64);
        self.write_value(&Object::Dictionary(dict))?;
        self.buf.extend_from_slice(b"\nstream\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream");
        Ok(())
    }

    /// Write a complete non-stream object under a fresh number.
    pub fn put_object(&mut self, obj: &Object) -> Result<ObjectRef> {
        self.check_references(obj)?;
        if self.object_stream.is_some() {
            self.ensure_closed("queue an object")?;
            let r = self.reserve();
            self.queue_packed(r, obj)?;
            return Ok(r);
        }
        let r = self.open_object()?;
        self.write_value(obj)?;
        self.close_object()?;
        Ok(r)
    }

    /// Write a complete non-stream object under a reserved number.
    pub fn put_reserved(&mut self, r: ObjectRef, obj: &Object) -> Result<()> {
        self.check_references(obj)?;
        if self.object_stream.is_some() {
            self.ensure_closed("queue an object")?;
            if self.slot(r.id) != Some(Slot::Reserved) {
                return Err(Error::ProgrammingSequence(format!("object {} is not reserved", r.id)));
            }
            if self.object_stream.iter().any(|b| b.numbers().any(|n| n == r.id)) {
                return Err(Error::ProgrammingSequence(format!("object {} was already written", r.id)));
            }
            return self.queue_packed(r, obj);
        }
        self.open_reserved(r)?;
        self.write_value(obj)?;
        self.close_object()
    }

    /// Write a complete stream object under a fresh number.
    pub fn put_stream(&mut self, dict: Dictionary, data: &[u8]) -> Result<ObjectRef> {
        self.check_references(&Object::Dictionary(dict.clone()))?;
        let r = self.open_object()?;
        self.write_stream(dict, data)?;
        self.close_object()?;
        Ok(r)
    }

    /// Write a complete stream object under a reserved number.
    pub fn put_reserved_stream(&mut self, r: ObjectRef, dict: Dictionary, data: &[u8]) -> Result<()> {
        self.check_references(&Object::Dictionary(dict.clone()))?;
        self.open_reserved(r)?;
        self.write_stream(dict, data)?;
        self.close_object()
    }

    /// Reserve a number for `obj` and queue it in `builder`.
    pub fn compress_object(&mut self, builder: &mut ObjectStreamBuilder, obj: &Object) -> Result<ObjectRef> {
        self.check_references(obj)?;
        let r = self.reserve();
        builder.add(r, obj);
        Ok(r)
    }

    /// Queue an already reserved number in `builder`.
    pub fn compress_reserved(
        &mut self,
        builder: &mut ObjectStreamBuilder,
        r: ObjectRef,
        obj: &Object,
    ) -> Result<()> {
        self.check_references(obj)?;
        if self.slot(r.id) != Some(Slot::Reserved) {
            return Err(Error::ProgrammingSequence(format!("object {} is not reserved", r.id)));
        }
        builder.add(r, obj);
        Ok(())
    }

    fn queue_packed(&mut self, r: ObjectRef, obj: &Object) -> Result<()> {
        let full = match self.object_stream.as_mut() {
            Some(builder) => {
                builder.add(r, obj);
                builder.len() >= MAX_OBJECTS_PER_STREAM
            },
            None => false,
        };
        if full {
            self.flush_packed()?;
        }
        Ok(())
    }

    /// Flush objects queued by `put_object`/`put_reserved` in object-stream mode.
    pub fn flush_packed(&mut self) -> Result<Option<ObjectRef>> {
        let Some(mut builder) = self.object_stream.take() else {
            return Ok(None);
        };
        let result = self.flush_object_stream(&mut builder);
        self.object_stream = Some(builder);
        result
    }

    /// Write the object stream container and mark its members as compressed.
    pub fn flush_object_stream(&mut self, builder: &mut ObjectStreamBuilder) -> Result<Option<ObjectRef>> {
        if builder.is_empty() {
            return Ok(None);
        }
        let (dict, data) = builder.build()?;
        let container = self.put_stream(dict, &data)?;
        for (index, number) in builder.numbers().enumerate() {
            if let Some(slot) = number.checked_sub(1).and_then(|i| self.slots.get_mut(i as usize)) {
                *slot = Slot::Compressed {
                    container: container.id,
                    index: index as u32,
                };
            }
        }
        log::debug!("Object stream {} holds {} objects", container.id, builder.len());
        builder.clear();
        Ok(Some(container))
    }

    fn ensure_complete(&self) -> Result<()> {
        self.ensure_closed("finish the document")?;
        match self.slots.iter().position(|s| *s == Slot::Reserved) {
            Some(i) => Err(Error::ProgrammingSequence(format!(
                "object {} was reserved but never written",
                i + 1
            ))),
            None => Ok(()),
        }
    }

    /// Finish with a classic xref table and trailer.
    ///
    /// `trailer` supplies every key except `/Size`, which is computed.
    pub fn finish_with_table(mut self, trailer: Dictionary) -> Result<Vec<u8>> {
        self.flush_packed()?;
        self.ensure_complete()?;
        let offsets = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Slot::Written(offset) => Ok(*offset),
                _ => Err(Error::ProgrammingSequence(format!(
                    "object {} is compressed; a classic xref table cannot address it",
                    i + 1
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let startxref = self.buf.len();
        let (table, size) = format_xref_table(&offsets);
        self.buf.extend_from_slice(&table);

        let mut full = Dictionary::new().with("Size", size);
        for (key, value) in trailer.iter() {
            full.insert(key, value.clone());
        }
        self.buf.extend_from_slice(b"trailer\n");
        self.serializer.write_dictionary(&mut self.buf, &full);
        self.buf
            .extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", startxref).as_bytes());

        log::debug!("Wrote {} objects, {} bytes", offsets.len(), self.buf.len());
        Ok(self.buf)
    }

    /// Finish with a cross-reference stream (`/W [1 4 2]`, Flate + Up predictor).
    ///
    /// The xref stream takes the next object number and lists itself.
    pub fn finish_with_xref_stream(mut self, trailer: Dictionary) -> Result<Vec<u8>> {
        self.flush_packed()?;
        self.ensure_complete()?;
        let startxref = self.buf.len();
        self.slots.push(Slot::Written(startxref));
        let own_number = self.allocated();
        let size = own_number as i64 + 1;

        let columns: usize = XREF_STREAM_WIDTHS.iter().sum();
        let mut rows = Vec::with_capacity(size as usize * columns);
        push_row(&mut rows, 0, 0, 0xFFFF);
        for (i, slot) in self.slots.iter().enumerate() {
            match *slot {
                Slot::Written(offset) => {
                    let offset = u32::try_from(offset).map_err(|_| {
                        Error::ProgrammingSequence(format!(
                            "object {} offset {} does not fit a 4-byte xref field",
                            i + 1,
                            offset
                        ))
                    })?;
                    push_row(&mut rows, 1, offset, 0);
                },
                Slot::Compressed { container, index } => {
                    let index = u16::try_from(index).map_err(|_| {
                        Error::ProgrammingSequence(format!("object stream index {} too large", index))
                    })?;
                    push_row(&mut rows, 2, container, index);
                },
                Slot::Reserved => push_row(&mut rows, 0, 0, 0),
            }
        }

        let data = flate_encode(&encode_up(&rows, columns)?)?;
        let mut dict = Dictionary::typed("XRef")
            .with("Size", size)
            .with(
                "W",
                Object::Array(XREF_STREAM_WIDTHS.iter().map(|&w| Object::Integer(w as i64)).collect()),
            );
        for (key, value) in trailer.iter() {
            dict.insert(key, value.clone());
        }
        dict.insert("Filter", Object::name("FlateDecode"));
        dict.insert(
            "DecodeParms",
            Dictionary::new()
                .with("Predictor", 12i64)
                .with("Columns", columns as i64),
        );

        self.check_references(&Object::Dictionary(dict.clone()))?;
        self.write_header(own_number);
        self.write_stream(dict, &data)?;
        self.close_object()?;
        self.buf
            .extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", startxref).as_bytes());

        log::debug!("Wrote {} objects with an xref stream, {} bytes", own_number, self.buf.len());
        Ok(self.buf)
    }
}

fn push_row(rows: &mut Vec<u8>, kind: u8, field2: u32, field3: u16) {
    rows.push(kind);
    rows.extend_from_slice(&field2.to_be_bytes());
    rows.extend_from_slice(&field3.to_be_bytes());
}

/// Format a classic xref table for objects `1..=offsets.len()`.
///
/// Returns the bytes and the trailer `/Size` (highest number + 1).
pub fn format_xref_table(offsets: &[usize]) -> (Vec<u8>, i64) {
    let size = offsets.len() + 1;
    let mut out = Vec::with_capacity(20 * size + 16);
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    (out, size as i64)
}

/// Packs non-stream objects into one `/Type /ObjStm` container.
#[derive(Debug, Default)]
pub struct ObjectStreamBuilder {
    entries: Vec<(u32, Vec<u8>)>,
    compress: bool,
}

impl ObjectStreamBuilder {
    /// Create a builder; `compress` applies FlateDecode to the container.
    pub fn new(compress: bool) -> Self {
        Self {
            entries: Vec::new(),
            compress,
        }
    }

    /// Queue an object body.
    pub fn add(&mut self, r: ObjectRef, obj: &Object) {
        self.entries
            .push((r.id, ObjectSerializer::compact().serialize(obj)));
    }

    /// Number of queued objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued object numbers, in container order.
    pub fn numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    /// Build the container dictionary (without `/Length`) and payload.
    pub fn build(&self) -> Result<(Dictionary, Vec<u8>)> {
        let mut header = Vec::new();
        let mut body = Vec::new();
        for (number, bytes) in &self.entries {
            header.extend_from_slice(format!("{} {} ", number, body.len()).as_bytes());
            body.extend_from_slice(bytes);
            body.push(b'\n');
        }

        let first = header.len();
        let mut data = header;
        data.extend_from_slice(&body);

        let mut dict = Dictionary::typed("ObjStm")
            .with("N", self.entries.len() as i64)
            .with("First", first as i64);
        if self.compress {
            data = flate_encode(&data)?;
            dict.insert("Filter", Object::name("FlateDecode"));
        }
        Ok((dict, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        let out = PdfOutput::new("1.7");
        assert!(out.bytes().starts_with(b"%PDF-1.7\n%"));
        assert_eq!(&out.bytes()[9..], BINARY_MARKER);
        assert_eq!(BINARY_MARKER.len() - 1, 5);
    }

    #[test]
    fn test_xref_table_example() {
        let (table, size) = format_xref_table(&[9, 112, 250, 340]);
        let text = String::from_utf8(table).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "xref");
        assert_eq!(lines[1], "0 5");
        assert_eq!(lines[2], "0000000000 65535 f ");
        assert_eq!(lines[5].trim_end(), "0000000250 00000 n");
        assert_eq!(size, 5);
        // Every entry is exactly 20 bytes
        assert!(text.split_inclusive('\n').skip(2).all(|l| l.len() == 20));
    }

    #[test]
    fn test_offsets_point_at_markers() {
        let mut out = PdfOutput::new("1.7");
        let a = out.put_object(&Object::Integer(1)).unwrap();
        let b = out.put_object(&Object::Reference(a)).unwrap();
        for r in [a, b] {
            let at = out.offset_of(r.id).unwrap();
            assert!(out.bytes()[at..].starts_with(format!("{} 0 obj", r.id).as_bytes()));
        }
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let mut out = PdfOutput::new("1.7");
        out.open_object().unwrap();
        assert!(matches!(out.open_object(), Err(Error::ProgrammingSequence(_))));
        out.close_object().unwrap();
        assert!(out.close_object().is_err());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut out = PdfOutput::new("1.7");
        let err = out.put_object(&Object::Reference(ObjectRef::new(2, 0))).unwrap_err();
        assert!(matches!(err, Error::ProgrammingSequence(_)));
        // Nothing was allocated by the failed write
        assert_eq!(out.allocated(), 0);
    }

    #[test]
    fn test_reserved_reference_allowed() {
        let mut out = PdfOutput::new("1.7");
        let parent = out.reserve();
        let child = out
            .put_object(&Dictionary::new().with("Parent", parent).into())
            .unwrap();
        out.put_reserved(parent, &Dictionary::new().with("Kids", Object::Array(vec![child.into()])).into())
            .unwrap();
        assert!(out.offset_of(parent.id).unwrap() > out.offset_of(child.id).unwrap());
    }

    #[test]
    fn test_unwritten_reservation_fails_finish() {
        let mut out = PdfOutput::new("1.7");
        out.reserve();
        let err = out.finish_with_table(Dictionary::new()).unwrap_err();
        assert!(matches!(err, Error::ProgrammingSequence(_)));
    }

    #[test]
    fn test_reserved_written_twice() {
        let mut out = PdfOutput::new("1.7");
        let r = out.reserve();
        out.put_reserved(r, &Object::Null).unwrap();
        assert!(out.put_reserved(r, &Object::Null).is_err());
        assert!(out.open_reserved(ObjectRef::new(9, 0)).is_err());
    }

    #[test]
    fn test_finish_with_table() {
        let mut out = PdfOutput::new("1.7");
        let root = out.put_object(&Dictionary::typed("Catalog").into()).unwrap();
        let bytes = out
            .finish_with_table(Dictionary::new().with("Root", root))
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Size 2"));
        assert!(text.contains("/Root 1 0 R"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_stream_sets_length() {
        let mut out = PdfOutput::new("1.7");
        out.put_stream(Dictionary::new(), b"12345").unwrap();
        let text = String::from_utf8_lossy(out.bytes());
        assert!(text.contains("/Length 5"));
        assert!(text.contains("stream\n12345\nendstream"));
    }

    #[test]
    fn test_object_stream_builder_layout() {
        let mut builder = ObjectStreamBuilder::new(false);
        builder.add(ObjectRef::new(4, 0), &Object::Integer(7));
        builder.add(ObjectRef::new(5, 0), &Object::name("X"));
        let (dict, data) = builder.build().unwrap();
        assert_eq!(dict.get_integer("N"), Some(2));
        assert_eq!(data, b"4 0 5 2 7\n/X\n");
        assert_eq!(dict.get_integer("First"), Some(8));
    }

    #[test]
    fn test_object_stream_mode_packs_dictionaries() {
        let mut out = PdfOutput::new("1.7");
        out.enable_object_streams(false);
        let parent = out.reserve();
        let child = out.put_object(&Dictionary::new().with("Parent", parent).into()).unwrap();
        out.put_reserved(parent, &Dictionary::typed("Pages").into()).unwrap();
        out.put_stream(Dictionary::new(), b"q Q").unwrap();
        assert!(out.put_reserved(parent, &Object::Null).is_err());

        let bytes = out.finish_with_xref_stream(Dictionary::new()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Type /ObjStm"));
        assert!(text.contains("/Type /XRef"));
        assert!(child.id > parent.id);
    }

    #[test]
    fn test_compressed_objects_need_xref_stream() {
        let mut out = PdfOutput::new("1.7");
        let mut builder = ObjectStreamBuilder::new(true);
        out.compress_object(&mut builder, &Object::Integer(1)).unwrap();
        out.flush_object_stream(&mut builder).unwrap();
        assert!(matches!(out.slot(1), Some(Slot::Compressed { container: 2, index: 0 })));
        assert!(out.finish_with_table(Dictionary::new()).is_err());
    }
}
