//! FlateDecode (zlib/deflate) implementation.
//!
//! Uses the flate2 crate in both directions: the writer compresses page
//! content and cross-reference streams, the reader inflates them.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
#[derive(Debug, Clone, Copy)]
pub struct FlateDecoder {
    /// Largest output accepted before the stream is rejected
    pub max_output: usize,
}

impl FlateDecoder {
    /// Create a decoder that refuses to inflate more than `max_output` bytes.
    pub fn new(max_output: usize) -> Self {
        Self { max_output }
    }

    fn read_limited<R: Read>(&self, reader: R, output: &mut Vec<u8>) -> std::io::Result<()> {
        // One extra byte tells an exact fit apart from an overrun
        reader
            .take(self.max_output as u64 + 1)
            .read_to_end(output)
            .map(|_| ())
    }

    fn check_size(&self, output: &[u8]) -> Result<()> {
        if output.len() > self.max_output {
            return Err(Error::Decode(format!(
                "Decompressed size exceeds limit of {} bytes",
                self.max_output
            )));
        }
        Ok(())
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();

        match self.read_limited(ZlibDecoder::new(input), &mut output) {
            Ok(()) => {
                self.check_size(&output)?;
                Ok(output)
            },
            Err(e) => {
                if !output.is_empty() {
                    log::warn!(
                        "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                        output.len(),
                        e
                    );
                    self.check_size(&output)?;
                    return Ok(output);
                }

                // Some writers emit raw deflate data without the zlib wrapper
                log::info!("Zlib decode failed, trying raw deflate");
                output.clear();
                match self.read_limited(DeflateDecoder::new(input), &mut output) {
                    Ok(()) if !output.is_empty() => {
                        self.check_size(&output)?;
                        Ok(output)
                    },
                    _ => Err(Error::Decode(format!("FlateDecode failed: {}", e))),
                }
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress `data` with zlib at the default level.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
