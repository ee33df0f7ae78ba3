//! Chunked byte-stream adapter and streamed archive extraction.
//!
//! The container engine returns a result archive as a lazy sequence of
//! binary chunks rather than one buffer. [`ChunkReader`] bridges such a
//! sequence into a pull-based [`Read`], buffering only the unread remainder
//! of a single chunk between calls, so a streaming tar reader can consume
//! the archive without an intermediate temporary file or a full in-memory
//! copy.
//!
//! [`extract_archive`] unpacks each archived entry with its single leading
//! path component (the archive's implicit top-level directory) stripped
//! before writing under the destination.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;

// =============================================================================
// Chunk Reader
// =============================================================================

/// A byte stream backed by an iterator of binary chunks.
///
/// Each read serves bytes from the buffered remainder or pulls the next
/// chunk on demand; once the iterator is exhausted, reads return zero
/// bytes. The whole sequence is never materialized at once.
pub struct ChunkReader<I> {
    chunks: I,
    remainder: Bytes,
}

impl<I> ChunkReader<I>
where
    I: Iterator<Item = io::Result<Bytes>>,
{
    pub fn new(chunks: I) -> Self {
        Self {
            chunks,
            remainder: Bytes::new(),
        }
    }
}

impl<I> Read for ChunkReader<I>
where
    I: Iterator<Item = io::Result<Bytes>>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Empty chunks are skipped so that Ok(0) only ever means exhaustion.
        while self.remainder.is_empty() {
            match self.chunks.next() {
                Some(Ok(chunk)) => self.remainder = chunk,
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }
        let n = self.remainder.len().min(buf.len());
        buf[..n].copy_from_slice(&self.remainder[..n]);
        self.remainder.advance(n);
        Ok(n)
    }
}

// =============================================================================
// Streamed Extraction
// =============================================================================

/// Extracts a tar archive from `reader` under `dest`, stripping the single
/// leading path component of every entry.
///
/// # Errors
///
/// [`Error::Extraction`] for entries whose stripped path escapes `dest`
/// (absolute paths or `..` components), [`Error::Io`] for read/unpack
/// failures.
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(stripped) = strip_leading_component(&path)? else {
            // The top-level directory entry itself maps to dest.
            continue;
        };
        let target = dest.join(&stripped);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("extracting {}", stripped.display());
        entry.unpack(&target)?;
    }
    Ok(())
}

/// Drops the first path component, validating the rest against traversal.
fn strip_leading_component(path: &Path) -> Result<Option<PathBuf>> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        Some(_) => {
            return Err(Error::Extraction(format!(
                "unsafe archive entry path: {}",
                path.display()
            )))
        }
        None => return Ok(None),
    }
    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::Extraction(format!(
                    "unsafe archive entry path: {}",
                    path.display()
                )))
            }
        }
    }
    if stripped.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(stripped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_across_chunk_boundaries() {
        let chunks = ["123", "456", "789", "abc"]
            .into_iter()
            .map(|c| Ok(Bytes::from(c)));
        let mut reader = ChunkReader::new(chunks);
        let mut buf = [0u8; 5];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"123");
    }

    #[test]
    fn empty_chunks_do_not_end_the_stream() {
        let chunks = vec![
            Ok(Bytes::from("ab")),
            Ok(Bytes::new()),
            Ok(Bytes::from("cd")),
        ];
        let mut reader = ChunkReader::new(chunks.into_iter());
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "abcd");
    }

    #[test]
    fn strips_exactly_one_component() {
        let stripped = strip_leading_component(Path::new("output/a/b.zarr"))
            .unwrap()
            .unwrap();
        assert_eq!(stripped, PathBuf::from("a/b.zarr"));
        assert!(strip_leading_component(Path::new("output")).unwrap().is_none());
    }

    #[test]
    fn rejects_traversal() {
        assert!(strip_leading_component(Path::new("output/../etc/passwd")).is_err());
        assert!(strip_leading_component(Path::new("/etc/passwd")).is_err());
    }
}
