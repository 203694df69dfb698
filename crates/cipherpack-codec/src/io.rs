//! Chunked source driving and output cleanup.
//!
//! `read_stream` owns the reusable chunk buffers (zeroizing, since they may
//! carry plaintext) and hands each chunk to a consumer together with an
//! `is_final` flag. Finality is detected by one chunk of lookahead, never
//! inferred from a short read, so the consumer's final call happens exactly
//! once — with an empty buffer when the source itself is empty.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use cipherpack_core::CpackResult;

/// Drive `reader` to EOF in `buffer_size` chunks. Returns total bytes read.
pub fn read_stream<R, F>(reader: &mut R, buffer_size: usize, mut consume: F) -> CpackResult<u64>
where
    R: Read,
    F: FnMut(&mut Vec<u8>, bool) -> CpackResult<()>,
{
    let mut current = Zeroizing::new(Vec::with_capacity(buffer_size));
    let mut next = Zeroizing::new(Vec::with_capacity(buffer_size));
    let mut total = 0u64;

    let mut current_len = read_chunk(reader, &mut current, buffer_size)?;
    loop {
        let next_len = read_chunk(reader, &mut next, buffer_size)?;
        current.truncate(current_len);
        total += current_len as u64;

        let is_final = next_len == 0;
        consume(&mut *current, is_final)?;
        if is_final {
            break;
        }
        std::mem::swap(&mut current, &mut next);
        current_len = next_len;
    }
    Ok(total)
}

/// `read_stream` over a file path.
pub fn read_file<F>(path: &Path, buffer_size: usize, consume: F) -> CpackResult<u64>
where
    F: FnMut(&mut Vec<u8>, bool) -> CpackResult<()>,
{
    let mut file = File::open(path)?;
    read_stream(&mut file, buffer_size, consume)
}

fn read_chunk<R: Read>(
    reader: &mut R,
    buf: &mut Zeroizing<Vec<u8>>,
    buffer_size: usize,
) -> CpackResult<usize> {
    buf.resize(buffer_size, 0);
    let mut filled = 0;
    while filled < buffer_size {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Removes the output file on drop unless the operation committed first.
/// Every pipeline holds one of these from sink creation to success, so no
/// error path can leave a partial output behind.
pub struct CleanupGuard {
    path: PathBuf,
    armed: bool,
}

impl CleanupGuard {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    /// The operation succeeded; keep the output file.
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "could not remove partial output");
            }
        }
    }
}
