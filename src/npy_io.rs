//! NumPy `.npy` v1.0 reading and writing for the dataset arrays.
//!
//! Only the two layouts the pipeline produces are supported: 2-D little-
//! endian float32 (`<f4`) and 1-D little-endian int64 (`<i8`), row-major.

use anyhow::{bail, Context};
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::Result;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Write a 2-D float32 array. Zero-row arrays keep their column count in
/// the header.
pub fn write_f32_2d<P: AsRef<Path>>(path: P, array: &Array2<f32>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&header_bytes("<f4", array.shape()))?;
    for &value in array.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a 1-D int64 array.
pub fn write_i64_1d<P: AsRef<Path>>(path: P, array: &Array1<i64>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&header_bytes("<i8", array.shape()))?;
    for &value in array.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_f32_2d<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let raw = read_raw(path.as_ref())?;
    if raw.descr != "<f4" {
        bail!("Expected <f4 array, got {}", raw.descr);
    }
    if raw.shape.len() != 2 {
        bail!("Expected 2-D array, got shape {:?}", raw.shape);
    }

    let values: Vec<f32> = raw
        .data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Array2::from_shape_vec((raw.shape[0], raw.shape[1]), values)?)
}

pub fn read_i64_1d<P: AsRef<Path>>(path: P) -> Result<Array1<i64>> {
    let raw = read_raw(path.as_ref())?;
    if raw.descr != "<i8" {
        bail!("Expected <i8 array, got {}", raw.descr);
    }
    if raw.shape.len() != 1 {
        bail!("Expected 1-D array, got shape {:?}", raw.shape);
    }

    let values: Vec<i64> = raw
        .data
        .chunks_exact(8)
        .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();

    Ok(Array1::from(values))
}

/// Magic, version 1.0, u16 header length, then the dict header padded with
/// spaces so the payload starts on a 64-byte boundary.
fn header_bytes(descr: &str, shape: &[usize]) -> Vec<u8> {
    let shape_str = match shape.len() {
        1 => format!("({},)", shape[0]),
        _ => {
            let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", dims.join(", "))
        }
    };

    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape_str
    );
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + header.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes
}

struct RawArray {
    shape: Vec<usize>,
    descr: String,
    data: Vec<u8>,
}

fn read_raw(path: &Path) -> Result<RawArray> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        bail!("Not an npy file: {}", path.display());
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = if version[0] == 1 {
        let mut len = [0u8; 2];
        reader.read_exact(&mut len)?;
        u16::from_le_bytes(len) as usize
    } else {
        let mut len = [0u8; 4];
        reader.read_exact(&mut len)?;
        u32::from_le_bytes(len) as usize
    };

    let mut raw_header = vec![0u8; header_len];
    reader.read_exact(&mut raw_header)?;
    let header = String::from_utf8_lossy(&raw_header).into_owned();

    let descr = parse_descr(&header)?;
    let shape = parse_shape(&header)?;

    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    Ok(RawArray { shape, descr, data })
}

fn parse_descr(header: &str) -> Result<String> {
    let key = "'descr':";
    let start = header
        .find(key)
        .context("npy header missing descr field")?
        + key.len();
    let rest = &header[start..];
    let open = rest.find('\'').context("malformed descr field")?;
    let rest = &rest[open + 1..];
    let close = rest.find('\'').context("malformed descr field")?;
    Ok(rest[..close].to_string())
}

fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let start = header.find('(').context("npy header missing shape tuple")?;
    let end = header[start..]
        .find(')')
        .context("malformed shape tuple")?
        + start;

    header[start + 1..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(anyhow::Error::from))
        .collect()
}
