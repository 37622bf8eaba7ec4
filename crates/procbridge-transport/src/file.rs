use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{ChunkSink, ChunkSource};

/// File-backed data buffer shared between host and worker.
///
/// Every chunk is written at offset 0, overwriting the previous one. Both
/// sides open the same path; the control channel orders access so reads
/// and writes never overlap.
#[derive(Debug)]
pub struct SharedFile {
    file: File,
    path: PathBuf,
}

impl SharedFile {
    /// Create (or truncate) the buffer file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| TransportError::Buffer {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "created shared data buffer");
        Ok(Self { file, path })
    }

    /// Open an existing buffer file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| TransportError::Buffer {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "opened shared data buffer");
        Ok(Self { file, path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSink for SharedFile {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(chunk)?;
        self.file.flush()?;
        Ok(())
    }
}

impl ChunkSource for SharedFile {
    fn read_chunk(&mut self, len: usize, dst: &mut BytesMut) -> Result<()> {
        // The size comes from the peer; never allocate beyond what was written.
        let available = self.file.metadata()?.len();
        if len as u64 > available {
            return Err(TransportError::ShortChunk {
                len: usize::try_from(available).unwrap_or(usize::MAX),
                expected: len,
            });
        }

        self.file.seek(SeekFrom::Start(0))?;
        let start = dst.len();
        dst.resize(start + len, 0);
        if let Err(err) = self.file.read_exact(&mut dst[start..]) {
            dst.truncate(start);
            if err.kind() == ErrorKind::UnexpectedEof {
                return Err(TransportError::ShortChunk {
                    len: usize::try_from(available).unwrap_or(usize::MAX),
                    expected: len,
                });
            }
            return Err(TransportError::Io(err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "procbridge-file-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn chunk_written_by_one_side_is_read_by_the_other() {
        let path = temp_path("roundtrip");
        let mut writer = SharedFile::create(&path).unwrap();
        let mut reader = SharedFile::open(&path).unwrap();

        writer.write_chunk(b"hello chunk").unwrap();

        let mut dst = BytesMut::new();
        reader.read_chunk(11, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), b"hello chunk");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn later_chunk_overwrites_earlier_one() {
        let path = temp_path("overwrite");
        let mut writer = SharedFile::create(&path).unwrap();
        let mut reader = SharedFile::open(&path).unwrap();

        writer.write_chunk(b"first-long-chunk").unwrap();
        writer.write_chunk(b"second").unwrap();

        let mut dst = BytesMut::new();
        reader.read_chunk(6, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), b"second");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn read_appends_to_existing_bytes() {
        let path = temp_path("append");
        let mut file = SharedFile::create(&path).unwrap();
        file.write_chunk(b"tail").unwrap();

        let mut dst = BytesMut::from(&b"head-"[..]);
        file.read_chunk(4, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), b"head-tail");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reading_past_end_reports_size_mismatch() {
        let path = temp_path("short");
        let mut file = SharedFile::create(&path).unwrap();
        file.write_chunk(b"abc").unwrap();

        let mut dst = BytesMut::new();
        let err = file.read_chunk(10, &mut dst).unwrap_err();
        assert!(matches!(err, TransportError::ShortChunk { expected: 10, .. }));
        assert!(dst.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn oversized_announcement_is_rejected_before_allocating() {
        let path = temp_path("oversized");
        let mut file = SharedFile::create(&path).unwrap();
        file.write_chunk(b"abc").unwrap();

        let announced = i32::MAX as usize;
        let mut dst = BytesMut::new();
        let err = file.read_chunk(announced, &mut dst).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortChunk { len: 3, expected } if expected == announced
        ));
        assert!(dst.capacity() < announced);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_missing_file_fails() {
        let path = temp_path("missing");
        let err = SharedFile::open(&path).unwrap_err();
        assert!(matches!(err, TransportError::Buffer { .. }));
    }
}
