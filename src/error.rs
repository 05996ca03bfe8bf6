//! Error types for the PDF engine.
//!
//! The first four variants are the engine's own failure taxonomy; the rest
//! wrap lower-level failures (I/O, decompression) that surface through it.

/// Result type alias for PDF engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while writing or reading a PDF.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The scanner could not resolve a stream length or an offset.
    ///
    /// Scoped to one object: a lenient reader skips the object, a strict one
    /// aborts the read.
    #[error("Malformed object at byte {offset}: {reason}")]
    MalformedObject {
        /// Byte offset of the object (or of the failing token)
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Neither a classic xref table nor a supported xref stream was found.
    #[error("Unsupported cross-reference shape: {0}")]
    UnsupportedXRefShape(String),

    /// A `startxref` or `/Prev` offset points outside the buffer or loops.
    #[error("Broken cross-reference chain at byte {offset}: {reason}")]
    BrokenReferenceChain {
        /// Offending offset
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// The writer was driven out of order (object opened twice, reference to
    /// an unallocated number, content written with no page, ...).
    #[error("Programming sequence error: {0}")]
    ProgrammingSequence(String),

    /// Referenced object is not present in the parsed document
    #[error("Object not found: {0} 0 R")]
    ObjectNotFound(u32),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),
}

impl Error {
    /// Shorthand for [`Error::MalformedObject`].
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedObject {
            offset,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::BrokenReferenceChain`].
    pub(crate) fn broken_chain(offset: usize, reason: impl Into<String>) -> Self {
        Error::BrokenReferenceChain {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether this error is scoped to a single object rather than the whole read.
    pub fn is_object_scoped(&self) -> bool {
        matches!(self, Error::MalformedObject { .. } | Error::Decode(_) | Error::UnsupportedFilter(_))
    }
}
