//! Reader configuration for controlling lenient/strict parsing modes.

use serde::{Deserialize, Serialize};

/// Default cap on `/Prev` chain length.
pub const DEFAULT_MAX_PREV_DEPTH: usize = 100;

/// Default cap on the size of one decompressed stream (100 MB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Reader options for controlling error handling and recovery behavior.
///
/// # Example
///
/// ```
/// use pdf_loom::parser_config::ReaderOptions;
///
/// // Lenient mode - skip malformed objects and continue (default)
/// let lenient = ReaderOptions::lenient();
/// assert!(!lenient.strict);
///
/// // Strict mode - fail on the first malformed object
/// let strict = ReaderOptions::strict();
/// assert!(strict.strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Fail the whole read on a malformed object (true) or log and skip it (false).
    ///
    /// Chain-level failures (unsupported xref shape, broken `/Prev`) abort the
    /// read in both modes.
    pub strict: bool,

    /// Maximum number of cross-reference sections followed through `/Prev`.
    pub max_prev_depth: usize,

    /// Maximum decompressed stream size in bytes.
    ///
    /// Protects against decompression bombs in object and xref streams.
    pub max_decompressed_size: usize,
}

impl ReaderOptions {
    /// Strict parsing: any malformed object fails the read.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Lenient parsing: malformed objects are logged and skipped.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_prev_depth: DEFAULT_MAX_PREV_DEPTH,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Set the `/Prev` depth limit.
    pub fn with_max_prev_depth(mut self, depth: usize) -> Self {
        self.max_prev_depth = depth;
        self
    }

    /// Set the decompressed size limit.
    pub fn with_max_decompressed_size(mut self, size: usize) -> Self {
        self.max_decompressed_size = size;
        self
    }
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self::lenient()
    }
}
