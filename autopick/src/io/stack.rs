//! Binary image stacks.
//!
//! File layout:
//! - Header: [`StackHeader`] (magic, slice count, height, width; little-endian u64)
//! - Data: f64 pixels, slice-major then row-major, little-endian
//!
//! Every slice in a stack has the same dimensions. [`append`] checks this
//! and rewrites the slice count in place.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use common::Buffer2;

use crate::error::{Error, Result};

const STACK_MAGIC: [u8; 8] = *b"APSTACK1";

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct StackHeader {
    magic: [u8; 8],
    count: u64,
    height: u64,
    width: u64,
}

impl StackHeader {
    fn new(count: usize, width: usize, height: usize) -> Self {
        Self {
            magic: STACK_MAGIC,
            count: (count as u64).to_le(),
            height: (height as u64).to_le(),
            width: (width as u64).to_le(),
        }
    }

    fn count(&self) -> usize {
        u64::from_le(self.count) as usize
    }

    fn dimensions(&self) -> (usize, usize) {
        (
            u64::from_le(self.width) as usize,
            u64::from_le(self.height) as usize,
        )
    }
}

/// Slice count and dimensions of a stack file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackInfo {
    pub count: usize,
    pub width: usize,
    pub height: usize,
}

/// Writes `slices` to `path`, replacing any existing file.
pub fn write(path: &Path, slices: &[Buffer2<f64>]) -> Result<()> {
    let (width, height) = common_dimensions(slices)?;
    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(write_err)?;
    let header = StackHeader::new(slices.len(), width, height);
    file.write_all(bytemuck::bytes_of(&header)).map_err(write_err)?;
    for slice in slices {
        write_pixels(&mut file, slice.pixels()).map_err(write_err)?;
    }
    file.flush().map_err(write_err)
}

/// Writes a single image.
pub fn write_image(path: &Path, image: &Buffer2<f64>) -> Result<()> {
    write(path, std::slice::from_ref(image))
}

/// Appends `slices` to the stack at `path`, creating it if missing.
pub fn append(path: &Path, slices: &[Buffer2<f64>]) -> Result<()> {
    if !path.exists() {
        return write(path, slices);
    }
    if slices.is_empty() {
        return Ok(());
    }

    let (width, height) = common_dimensions(slices)?;
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })?;

    let header = read_header(&mut file, path)?;
    let existing = header.count();
    if existing > 0 && header.dimensions() != (width, height) {
        return Err(Error::mismatch(
            format!("stack '{}' slice size", path.display()),
            format!("{:?}", header.dimensions()),
            format!("{:?}", (width, height)),
        ));
    }

    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    let data_end = size_of::<StackHeader>() + existing * width * height * size_of::<f64>();
    file.seek(SeekFrom::Start(data_end as u64)).map_err(write_err)?;
    for slice in slices {
        write_pixels(&mut file, slice.pixels()).map_err(write_err)?;
    }

    let header = StackHeader::new(existing + slices.len(), width, height);
    file.seek(SeekFrom::Start(0)).map_err(write_err)?;
    file.write_all(bytemuck::bytes_of(&header)).map_err(write_err)?;
    file.flush().map_err(write_err)
}

/// Reads slice count and dimensions without loading pixel data.
pub fn info(path: &Path) -> Result<StackInfo> {
    let mut file = open(path)?;
    let header = read_header(&mut file, path)?;
    let (width, height) = header.dimensions();
    Ok(StackInfo {
        count: header.count(),
        width,
        height,
    })
}

/// Reads every slice of a stack.
pub fn read(path: &Path) -> Result<Vec<Buffer2<f64>>> {
    let mut file = open(path)?;
    let header = read_header(&mut file, path)?;
    let (width, height) = header.dimensions();
    let count = header.count();

    let mut slices = Vec::with_capacity(count);
    for index in 0..count {
        let mut pixels = vec![0.0f64; width * height];
        file.read_exact(bytemuck::cast_slice_mut(&mut pixels))
            .map_err(|_| Error::malformed(path, format!("truncated data in slice {index} of {count}")))?;
        pixels.iter_mut().for_each(|v| *v = f64::from_bits(u64::from_le(v.to_bits())));
        slices.push(Buffer2::new(width, height, pixels));
    }
    Ok(slices)
}

/// Reads the first slice of a stack.
pub fn read_image(path: &Path) -> Result<Buffer2<f64>> {
    read(path)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed(path, "stack holds no images"))
}

fn open(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    File::open(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_header(file: &mut File, path: &Path) -> Result<StackHeader> {
    let mut bytes = [0u8; size_of::<StackHeader>()];
    file.read_exact(&mut bytes)
        .map_err(|_| Error::malformed(path, "file too short for a stack header"))?;
    let header: StackHeader = bytemuck::pod_read_unaligned(&bytes);
    if header.magic != STACK_MAGIC {
        return Err(Error::malformed(path, "not an image stack (bad magic)"));
    }

    let (width, height) = header.dimensions();
    let count = header.count();
    let expected = count
        .checked_mul(width)
        .and_then(|n| n.checked_mul(height))
        .and_then(|n| n.checked_mul(size_of::<f64>()))
        .and_then(|n| n.checked_add(size_of::<StackHeader>()))
        .ok_or_else(|| {
            Error::malformed(path, format!("header size {count} x {width}x{height} overflows"))
        })?;
    let actual = file
        .metadata()
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if actual != expected as u64 {
        return Err(Error::malformed(
            path,
            format!("header announces {expected} bytes, file holds {actual}"),
        ));
    }
    Ok(header)
}

fn common_dimensions(slices: &[Buffer2<f64>]) -> Result<(usize, usize)> {
    let Some(first) = slices.first() else {
        return Ok((0, 0));
    };
    let dims = first.dimensions();
    for (index, slice) in slices.iter().enumerate().skip(1) {
        if slice.dimensions() != dims {
            return Err(Error::mismatch(
                format!("stack slice {index} size"),
                format!("{dims:?}"),
                format!("{:?}", slice.dimensions()),
            ));
        }
    }
    Ok(dims)
}

fn write_pixels(file: &mut File, pixels: &[f64]) -> std::io::Result<()> {
    if cfg!(target_endian = "little") {
        file.write_all(bytemuck::cast_slice(pixels))
    } else {
        let bytes: Vec<u8> = pixels.iter().flat_map(|v| v.to_le_bytes()).collect();
        file.write_all(&bytes)
    }
}
