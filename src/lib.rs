// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Loom
//!
//! PDF object graph and serialization engine: read the indirect objects of an
//! existing file, write new documents object by object, and splice objects
//! from one document into another.
//!
//! ## Core Features
//!
//! ### Reading
//! - **Token-level objects**: every indirect object is kept as its token
//!   sequence ([`LowLevelObject`]) and parsed into an [`Object`] on demand
//! - **Cross-reference data**: classic xref tables, xref streams (PDF 1.5),
//!   hybrid files (`/XRefStm`) and `/Prev` chains of incremental updates
//! - **Object streams**: compressed objects are expanded into ordinary objects
//! - **Lenient mode**: objects that cannot be parsed are logged and skipped;
//!   a damaged cross-reference chain still fails the read
//!
//! ### Writing
//! - **Object-by-object output**: objects are numbered and written in the
//!   order they are produced, with reservations for forward references
//! - **Pages and resources**: one shared Resources dictionary, standard and
//!   embedded fonts, images with soft masks, graphics states, optional content
//! - **Navigation**: bookmarks, named destinations and link annotations
//! - **Tagged PDF**: marked content, structure tree and parent tree
//! - **PDF/A**: XMP metadata packet and output intent
//! - **Cross-reference formats**: xref table or compressed xref stream with
//!   object streams
//!
//! ### Merging
//! - **Resource import**: copy donor objects under fresh numbers, rename
//!   colliding resources and rewrite content streams to match
//!
//! ## Quick Start
//!
//! ```
//! use pdf_loom::{PdfReader, PdfWriter, PdfWriterConfig};
//!
//! # fn main() -> pdf_loom::Result<()> {
//! let mut writer = PdfWriter::with_config(PdfWriterConfig::default().with_compress(false));
//! let font = writer.register_standard_font("Helvetica")?;
//! writer.add_letter_page()?;
//! writer.write_content(format!("BT /{} 24 Tf 72 700 Td (Hello) Tj ET", font).as_bytes())?;
//! let bytes = writer.finish()?;
//!
//! let reader = PdfReader::from_bytes(bytes)?;
//! assert_eq!(reader.pages()?.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Objects and tokens
pub mod lexer;
pub mod object;
pub mod parser;

// Stream decoders
pub mod decoders;

// Reading
/// Reader configuration options
pub mod parser_config;
pub mod objstm;
pub mod reader;
pub mod xref;

// Writing
pub mod writer;

// Merging
pub mod import;

// Re-exports
pub use error::{Error, Result};
pub use import::{ResourceImporter, ResourceRenames};
pub use object::{Dictionary, LowLevelObject, Object, ObjectRef, Token};
pub use parser_config::ReaderOptions;
pub use reader::{PageInfo, PdfReader};
pub use writer::{PdfWriter, PdfWriterConfig, XRefFormat};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
