// ============================================================
// Layer 6 — .npy Writer
// ============================================================
// Minimal NumPy format (version 1.0) writer for the final test
// outputs. Little-endian float32 / float64, C order.
//
//   \x93NUMPY  1 0  <u16 header len>  {'descr': '<f4', ...}  data
//
// The header is padded with spaces so that magic + header is a
// multiple of 64 bytes and ends with '\n'.

use anyhow::{ensure, Context, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

fn header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let dims = match shape {
        [n] => format!("({n},)"),
        _ => format!("({})", shape.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
    };
    let mut dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {dims}, }}");
    // magic (6) + version (2) + length (2) + dict + '\n'
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    dict.push_str(&" ".repeat((ALIGN - unpadded % ALIGN) % ALIGN));
    dict.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + dict.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

fn write(path: &Path, descr: &str, shape: &[usize], bytes: impl Iterator<Item = u8>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut w = BufWriter::new(file);
    w.write_all(&header(descr, shape))?;
    for b in bytes {
        w.write_all(&[b])?;
    }
    w.flush().with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(())
}

pub fn write_f32(path: impl AsRef<Path>, shape: &[usize], data: &[f32]) -> Result<()> {
    ensure!(shape.iter().product::<usize>() == data.len(), "shape {shape:?} does not match {} values", data.len());
    write(path.as_ref(), "<f4", shape, data.iter().flat_map(|v| v.to_le_bytes()))
}

pub fn write_f64(path: impl AsRef<Path>, shape: &[usize], data: &[f64]) -> Result<()> {
    ensure!(shape.iter().product::<usize>() == data.len(), "shape {shape:?} does not match {} values", data.len());
    write(path.as_ref(), "<f8", shape, data.iter().flat_map(|v| v.to_le_bytes()))
}
