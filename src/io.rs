//! Decoding of height-field and texture inputs.
//!
//! The STM format is one ASCII header line, `width height`, followed by
//! H·W big-endian 16-bit elevations in row-major order. The value 65535
//! marks samples with no data and passes through unchanged. Textures
//! are ordinary RGB images of the same dimensions, normalized to [0, 1].

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

use crate::heightfield::{HeightField, Texture};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed height-field header: {0}")]
    Header(String),

    #[error("texture error: {0}")]
    Image(#[from] image::ImageError),

    #[error("texture is {tw}x{th} but the height field is {w}x{h}")]
    DimensionMismatch {
        tw: u32,
        th: u32,
        w: usize,
        h: usize,
    },
}

fn read_stm_raw<R: Read>(r: R) -> Result<(usize, usize, Vec<u16>), LoadError> {
    let mut r = BufReader::new(r);
    let mut header = String::new();
    r.read_line(&mut header)?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .map(|t| t.parse())
        .collect::<Result<_, _>>()
        .map_err(|_| LoadError::Header(format!("expected `width height`, got {:?}", header.trim())))?;
    if dims.len() != 2 {
        return Err(LoadError::Header(format!(
            "expected two dimensions, got {}",
            dims.len()
        )));
    }
    let (w, h) = (dims[0], dims[1]);
    if w < 2 || h < 2 {
        return Err(LoadError::Header(format!("grid {}x{} is too small", w, h)));
    }
    let mut z = vec![0u16; w * h];
    r.read_u16_into::<BigEndian>(&mut z)?;
    Ok((w, h, z))
}

/// Read an STM height field without a texture.
pub fn read_stm<R: Read>(r: R) -> Result<HeightField, LoadError> {
    let (w, h, z) = read_stm_raw(r)?;
    Ok(HeightField::new(w, h, z, None))
}

/// Load an RGB texture and check it against the grid dimensions.
pub fn load_texture(path: &Path, w: usize, h: usize) -> Result<Texture, LoadError> {
    let img = image::open(path)?.to_rgb8();
    if (img.width() as usize, img.height() as usize) != (w, h) {
        return Err(LoadError::DimensionMismatch {
            tw: img.width(),
            th: img.height(),
            w,
            h,
        });
    }
    let data = img
        .pixels()
        .map(|p| {
            [
                p.0[0] as f64 / 255.0,
                p.0[1] as f64 / 255.0,
                p.0[2] as f64 / 255.0,
            ]
        })
        .collect();
    Ok(Texture::new(w, h, data))
}

/// Load a height field from disk, with an optional matching texture.
pub fn load(stm: &Path, texture: Option<&Path>) -> Result<HeightField, LoadError> {
    let (w, h, z) = read_stm_raw(File::open(stm)?)?;
    let tex = match texture {
        Some(p) => Some(load_texture(p, w, h)?),
        None => None,
    };
    Ok(HeightField::new(w, h, z, tex))
}
