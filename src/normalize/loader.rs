use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use tiff::decoder::{Decoder, DecodingResult};

use crate::error::EvalError;
use crate::models::LabelArray;
use crate::normalize::npy;
use crate::normalize::npy::float_label;

/// On-disk mask formats, chosen from the file extension alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Npy,
    Tiff,
    Other,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase());
        match ext.as_deref() {
            Some("npy") => ImageKind::Npy,
            Some("tif") | Some("tiff") => ImageKind::Tiff,
            _ => ImageKind::Other,
        }
    }
}

/// Load a mask file as an array of label values
pub fn load_array(path: &Path) -> Result<LabelArray> {
    match ImageKind::from_path(path) {
        ImageKind::Npy => npy::read_npy(path),
        ImageKind::Tiff => load_tiff(path),
        ImageKind::Other => load_raster(path),
    }
}

/// First frame of a (possibly multi-page) TIFF.
///
/// Decoded with `tiff` directly so 32-bit integer label masks load; only the
/// first sample of each pixel is kept.
pub fn load_tiff(path: &Path) -> Result<LabelArray> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| anyhow::anyhow!("Failed to decode TIFF {:?}: {}", path, e))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| anyhow::anyhow!("Failed to decode TIFF {:?}: {}", path, e))?;
    let frame = decoder
        .read_image()
        .map_err(|e| anyhow::anyhow!("Failed to decode TIFF {:?}: {}", path, e))?;

    let data = tiff_labels(frame).map_err(|reason| EvalError::UnsupportedArray {
        path: path.to_path_buf(),
        reason,
    })?;
    let pixels = width as usize * height as usize;
    if pixels == 0 || data.len() % pixels != 0 {
        return Err(EvalError::UnsupportedArray {
            path: path.to_path_buf(),
            reason: format!("{} samples for a {}x{} frame", data.len(), width, height),
        }
        .into());
    }
    let samples = data.len() / pixels;
    let data = data.into_iter().step_by(samples).collect();
    Ok(LabelArray::new(vec![height as usize, width as usize], data))
}

fn tiff_labels(frame: DecodingResult) -> std::result::Result<Vec<u32>, String> {
    fn ints<T: Copy + std::fmt::Display>(values: Vec<T>) -> std::result::Result<Vec<u32>, String>
    where
        u32: TryFrom<T>,
    {
        values
            .into_iter()
            .map(|v| u32::try_from(v).map_err(|_| format!("label {} is out of range", v)))
            .collect()
    }

    match frame {
        DecodingResult::U8(v) => Ok(v.into_iter().map(u32::from).collect()),
        DecodingResult::U16(v) => Ok(v.into_iter().map(u32::from).collect()),
        DecodingResult::U32(v) => Ok(v),
        DecodingResult::U64(v) => ints(v),
        DecodingResult::I8(v) => ints(v),
        DecodingResult::I16(v) => ints(v),
        DecodingResult::I32(v) => ints(v),
        DecodingResult::I64(v) => ints(v),
        DecodingResult::F32(v) => v.into_iter().map(|x| float_label(x as f64)).collect(),
        DecodingResult::F64(v) => v.into_iter().map(float_label).collect(),
        #[allow(unreachable_patterns)]
        _ => Err("unsupported TIFF sample type".to_string()),
    }
}

/// Any raster format the image crate can sniff
pub fn load_raster(path: &Path) -> Result<LabelArray> {
    let img = ImageReader::open(path)
        .with_context(|| format!("Failed to open {:?}", path))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read {:?}", path))?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image {:?}: {}", path, e))?;
    Ok(to_label_array(img))
}

/// Keep integer grey levels as labels; color images go through luma.
fn to_label_array(img: DynamicImage) -> LabelArray {
    let shape = vec![img.height() as usize, img.width() as usize];
    let data: Vec<u32> = match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(u32::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(u32::from).collect(),
        DynamicImage::ImageLumaA8(buf) => buf.pixels().map(|p| u32::from(p[0])).collect(),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().map(|p| u32::from(p[0])).collect(),
        other => other.to_luma16().into_raw().into_iter().map(u32::from).collect(),
    };
    LabelArray::new(shape, data)
}
