//! PNG predictors for PDF streams.
//!
//! Each encoded row is `columns + 1` bytes: a tag byte naming the row's
//! filter, then the filtered bytes. Cross-reference streams use the Up
//! filter (`/Predictor 12`), where each byte is stored as its difference from
//! the byte above it, modulo 256.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

/// Row tag for the Up filter.
const TAG_UP: u8 = 2;

/// Decode parameters for stream decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (bytes per row for 8-bit single-component data)
    pub columns: usize,
    /// Number of color components per sample (default 1)
    pub colors: usize,
    /// Bits per component (default 8)
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read `/Predictor`, `/Columns`, `/Colors` and `/BitsPerComponent` from a
    /// `/DecodeParms` dictionary. Missing entries keep their defaults.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let defaults = Self::default();
        let positive = |key: &str, default: usize| {
            dict.get_integer(key)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v > 0)
                .unwrap_or(default)
        };
        Self {
            predictor: dict.get_integer("Predictor").unwrap_or(defaults.predictor),
            columns: positive("Columns", defaults.columns),
            colors: positive("Colors", defaults.colors),
            bits_per_component: positive("BitsPerComponent", defaults.bits_per_component),
        }
    }

    /// Read decode parameters from a stream dictionary's `/DecodeParms`
    /// (a dictionary, or an array whose first dictionary is used).
    pub fn from_stream_dict(dict: &Dictionary) -> Option<Self> {
        match dict.get("DecodeParms") {
            Some(Object::Dictionary(params)) => Some(Self::from_dict(params)),
            Some(Object::Array(items)) => items.iter().find_map(Object::as_dict).map(Self::from_dict),
            _ => None,
        }
    }

    /// Data bytes per row, without the tag byte.
    ///
    /// Fails when `/Columns`, `/Colors` and `/BitsPerComponent` multiply past
    /// `usize`.
    pub fn row_bytes(&self) -> Result<usize> {
        self.bits_per_pixel()?
            .checked_mul(self.columns)
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(|| Error::Decode(format!("predictor row of {} columns overflows", self.columns)))
    }

    fn bits_per_pixel(&self) -> Result<usize> {
        self.colors.checked_mul(self.bits_per_component).ok_or_else(|| {
            Error::Decode(format!(
                "predictor pixel of {} colors at {} bits overflows",
                self.colors, self.bits_per_component
            ))
        })
    }

    fn bytes_per_pixel(&self) -> Result<usize> {
        Ok(self.bits_per_pixel()?.div_ceil(8).max(1))
    }
}

/// Reverse the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// Undo PNG row filtering. The tag byte of each row selects its filter.
fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_bytes = params.row_bytes()?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    // A row wider than the whole payload can never tile it
    let stride = row_bytes
        .checked_add(1)
        .filter(|&stride| stride <= data.len())
        .ok_or_else(|| {
            Error::Decode(format!(
                "Predictor row of {} bytes exceeds data of {} bytes",
                row_bytes,
                data.len()
            ))
        })?;
    if data.len() % stride != 0 {
        return Err(Error::Decode(format!(
            "Data length {} is not a multiple of row size {}",
            data.len(),
            stride
        )));
    }

    let bpp = params.bytes_per_pixel()?;
    let mut output = Vec::with_capacity(data.len() / stride * row_bytes);
    let mut prev = vec![0u8; row_bytes];

    for row in data.chunks(stride) {
        let (tag, encoded) = (row[0], &row[1..]);
        let mut cur = vec![0u8; row_bytes];
        for i in 0..row_bytes {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                TAG_UP => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", tag))),
            };
            cur[i] = encoded[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&cur);
        prev = cur;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Apply the Up filter to rows of `columns` bytes, prefixing each row with
/// its tag byte. The first row is differenced against a row of zeros.
pub fn encode_up(data: &[u8], columns: usize) -> Result<Vec<u8>> {
    if columns == 0 || data.len() % columns != 0 {
        return Err(Error::Decode(format!(
            "Data length {} is not a multiple of row size {}",
            data.len(),
            columns
        )));
    }

    let mut output = Vec::with_capacity(data.len() / columns * (columns + 1));
    let zeros = vec![0u8; columns];
    let mut prev: &[u8] = &zeros;
    for row in data.chunks(columns) {
        output.push(TAG_UP);
        output.extend(row.iter().zip(prev).map(|(cur, up)| cur.wrapping_sub(*up)));
        prev = row;
    }
    Ok(output)
}
