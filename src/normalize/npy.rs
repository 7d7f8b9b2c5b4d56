//! Minimal reader for NumPy `.npy` label arrays.
//!
//! Supports format versions 1 to 3, C-ordered arrays of bool, signed,
//! unsigned and floating point dtypes in either byte order.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::EvalError;
use crate::models::LabelArray;

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Uint,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

#[derive(Debug, PartialEq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

pub fn read_npy(path: &Path) -> Result<LabelArray> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_npy(&bytes).map_err(|reason| {
        EvalError::UnsupportedArray {
            path: path.to_path_buf(),
            reason,
        }
        .into()
    })
}

/// Decode an in-memory `.npy` payload
pub fn parse_npy(bytes: &[u8]) -> std::result::Result<LabelArray, String> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err("missing NUMPY magic".to_string());
    }
    let major = bytes[6];
    let (header_len, offset) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated header".to_string());
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        v => return Err(format!("unsupported format version {}", v)),
    };
    let end = offset + header_len;
    if bytes.len() < end {
        return Err("truncated header".to_string());
    }
    let text = std::str::from_utf8(&bytes[offset..end]).map_err(|e| e.to_string())?;
    let header = parse_header(text)?;
    if header.fortran_order && header.shape.len() > 1 {
        return Err("fortran-ordered arrays are not supported".to_string());
    }

    let needed = header
        .shape
        .iter()
        .try_fold(header.dtype.size, |acc, &dim| acc.checked_mul(dim))
        .ok_or("array too large")?;
    let payload = &bytes[end..];
    if payload.len() < needed {
        return Err(format!("expected {} data bytes, found {}", needed, payload.len()));
    }

    let data = payload[..needed]
        .chunks_exact(header.dtype.size)
        .map(|chunk| decode_value(chunk, header.dtype))
        .collect::<std::result::Result<Vec<u32>, String>>()?;

    Ok(LabelArray::new(header.shape, data))
}

fn decode_value(chunk: &[u8], dtype: Dtype) -> std::result::Result<u32, String> {
    let mut buf = [0u8; 8];
    if dtype.big_endian {
        buf[8 - dtype.size..].copy_from_slice(chunk);
        buf.reverse();
    } else {
        buf[..dtype.size].copy_from_slice(chunk);
    }
    let raw = u64::from_le_bytes(buf);

    match dtype.kind {
        Kind::Bool => Ok((raw != 0) as u32),
        Kind::Uint => u32::try_from(raw).map_err(|_| format!("label {} exceeds u32", raw)),
        Kind::Int => {
            let shift = 64 - 8 * dtype.size as u32;
            let value = ((raw << shift) as i64) >> shift;
            u32::try_from(value).map_err(|_| format!("label {} is out of range", value))
        }
        Kind::Float => {
            let value = match dtype.size {
                4 => f32::from_bits(raw as u32) as f64,
                8 => f64::from_bits(raw),
                _ => return Err("unsupported float width".to_string()),
            };
            float_label(value)
        }
    }
}

/// Non-negative finite float within `u32`, truncated to an integer label
pub(crate) fn float_label(value: f64) -> std::result::Result<u32, String> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(format!("label {} is out of range", value));
    }
    Ok(value as u32)
}

fn parse_header(text: &str) -> std::result::Result<Header, String> {
    let descr = quoted_value(text, "descr").ok_or("missing descr")?;
    let dtype = parse_dtype(&descr)?;

    let fortran_order = value_after(text, "fortran_order")
        .map(|rest| rest.trim_start().starts_with("True"))
        .ok_or("missing fortran_order")?;

    let shape_text = value_after(text, "shape").ok_or("missing shape")?;
    let open = shape_text.find('(').ok_or("malformed shape")?;
    let close = shape_text.find(')').ok_or("malformed shape")?;
    let shape = shape_text[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| e.to_string()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Header {
        dtype,
        fortran_order,
        shape,
    })
}

fn value_after<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}'", key);
    let start = text.find(&pattern)? + pattern.len();
    let rest = &text[start..];
    let colon = rest.find(':')?;
    Some(&rest[colon + 1..])
}

fn quoted_value(text: &str, key: &str) -> Option<String> {
    let rest = value_after(text, key)?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}

fn parse_dtype(descr: &str) -> std::result::Result<Dtype, String> {
    let mut chars = descr.chars();
    let (big_endian, rest) = match chars.next() {
        Some('<') | Some('|') | Some('=') => (false, chars.as_str()),
        Some('>') => (true, chars.as_str()),
        _ => (false, descr),
    };
    let kind = match rest.chars().next() {
        Some('b') => Kind::Bool,
        Some('i') => Kind::Int,
        Some('u') => Kind::Uint,
        Some('f') => Kind::Float,
        _ => return Err(format!("unsupported dtype {}", descr)),
    };
    let size: usize = rest[1..]
        .parse()
        .map_err(|_| format!("unsupported dtype {}", descr))?;
    if !matches!(size, 1 | 2 | 4 | 8) {
        return Err(format!("unsupported dtype {}", descr));
    }
    Ok(Dtype {
        kind,
        size,
        big_endian,
    })
}

/// Encode a C-ordered little-endian `<u4` array; used to write fixtures.
pub fn write_npy_u32(path: &Path, array: &LabelArray) -> Result<()> {
    let shape = match array.shape.as_slice() {
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '<u4', 'fortran_order': False, 'shape': {}, }}",
        shape
    );
    // Pad so that magic + len + header + newline is a multiple of 64
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut bytes = Vec::with_capacity(10 + header.len() + array.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for v in &array.data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))
}
