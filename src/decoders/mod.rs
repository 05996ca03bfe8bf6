//! Stream decoder implementations for PDF filters.
//!
//! Only FlateDecode is handled, optionally followed by a PNG predictor
//! from `/DecodeParms`. Any other filter name is reported as
//! [`Error::UnsupportedFilter`].

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

mod flate;
mod predictor;

pub use flate::{flate_encode, FlateDecoder};
pub use predictor::{decode_predictor, encode_up, DecodeParams};

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Filter names from a stream dictionary's `/Filter` (a name or an array of names).
pub fn extract_filter_names(dict: &Dictionary) -> Vec<String> {
    match dict.get("Filter") {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode stream data through a filter pipeline, then reverse the predictor.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
    max_size: usize,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder: Box<dyn StreamDecoder> = match filter_name.as_str() {
            "FlateDecode" | "Fl" => Box::new(FlateDecoder::new(max_size)),
            _ => return Err(Error::UnsupportedFilter(filter_name.clone())),
        };
        current = decoder.decode(&current)?;
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

/// Decode a stream payload according to its own dictionary.
pub fn decode_stream_dict(data: &[u8], dict: &Dictionary, max_size: usize) -> Result<Vec<u8>> {
    let filters = extract_filter_names(dict);
    let params = DecodeParams::from_stream_dict(dict);
    decode_stream_with_params(data, &filters, params.as_ref(), max_size)
}
