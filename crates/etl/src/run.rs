//! On-disk sorted run format: a sequence of length-prefixed `(key, value)` records
//! followed by a 4-byte trailing CRC32 of the record stream.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use crc32fast::Hasher;

use crate::error::{classify_io, CollectorError};

/// Writes one sorted run, computing its trailing checksum incrementally so the
/// whole run never needs to be held in memory twice.
pub(crate) struct RunWriter {
    writer: BufWriter<File>,
    hasher: Hasher,
}

impl RunWriter {
    pub(crate) fn create(path: &Path) -> Result<Self, CollectorError> {
        let file = File::create(path).map_err(classify_io)?;
        Ok(Self { writer: BufWriter::new(file), hasher: Hasher::new() })
    }

    pub(crate) fn write_entry(&mut self, key: &[u8], value: &[u8]) -> Result<(), CollectorError> {
        self.write_field(key)?;
        self.write_field(value)?;
        Ok(())
    }

    fn write_field(&mut self, field: &[u8]) -> Result<(), CollectorError> {
        let len = u32::try_from(field.len()).expect("entries are bounded well under u32::MAX");
        let len_bytes = len.to_le_bytes();
        self.hasher.update(&len_bytes);
        self.hasher.update(field);
        self.writer.write_all(&len_bytes).map_err(classify_io)?;
        self.writer.write_all(field).map_err(classify_io)?;
        Ok(())
    }

    /// Flushes the record stream and appends the trailing checksum.
    pub(crate) fn finish(mut self) -> Result<(), CollectorError> {
        let checksum = self.hasher.finalize();
        self.writer.write_all(&checksum.to_le_bytes()).map_err(classify_io)?;
        self.writer.flush().map_err(classify_io)?;
        Ok(())
    }
}

/// Reads one sorted run back in order, verifying the trailing checksum once the
/// last record has been read.
pub(crate) struct RunReader {
    reader: BufReader<File>,
    hasher: Hasher,
    remaining: u64,
    path: PathBuf,
}

impl RunReader {
    pub(crate) fn open(path: &Path) -> Result<Self, CollectorError> {
        let file = File::open(path).map_err(classify_io)?;
        let len = file.metadata().map_err(classify_io)?.len();
        if len < 4 {
            return Err(CollectorError::CorruptTemp(format!("run {} is shorter than its own checksum trailer", path.display())));
        }
        Ok(Self { reader: BufReader::new(file), hasher: Hasher::new(), remaining: len - 4, path: path.to_path_buf() })
    }

    /// Reads the next `(key, value)` pair, or `None` once only the trailer is left
    /// — at which point the trailer is read and checked against the accumulated
    /// hash of everything read so far.
    pub(crate) fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>, CollectorError> {
        if self.remaining == 0 {
            return self.verify_trailer().map(|()| None);
        }
        let key = self.read_field()?;
        let value = self.read_field()?;
        Ok(Some((key, value)))
    }

    fn read_field(&mut self) -> Result<Vec<u8>, CollectorError> {
        let len = self.read_u32()?;
        let mut buf = vec![0u8; len as usize];
        self.read_exact_counted(&mut buf)?;
        self.hasher.update(&buf);
        Ok(buf)
    }

    fn read_u32(&mut self) -> Result<u32, CollectorError> {
        let mut buf = [0u8; 4];
        self.read_exact_counted(&mut buf)?;
        self.hasher.update(&buf);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_exact_counted(&mut self, buf: &mut [u8]) -> Result<(), CollectorError> {
        let needed = buf.len() as u64;
        if needed > self.remaining {
            return Err(self.corrupt("short read: record extends past the expected end of stream"));
        }
        self.reader.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                CollectorError::CorruptTemp(format!("run {}: unexpected EOF", self.path.display()))
            } else {
                classify_io(err)
            }
        })?;
        self.remaining -= needed;
        Ok(())
    }

    fn verify_trailer(&mut self) -> Result<(), CollectorError> {
        let mut trailer = [0u8; 4];
        self.reader.read_exact(&mut trailer).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                CollectorError::CorruptTemp(format!("run {}: missing checksum trailer", self.path.display()))
            } else {
                classify_io(err)
            }
        })?;
        let expected = u32::from_le_bytes(trailer);
        let actual = std::mem::replace(&mut self.hasher, Hasher::new()).finalize();
        if expected != actual {
            return Err(CollectorError::CorruptTemp(format!("run {}: checksum mismatch", self.path.display())));
        }
        Ok(())
    }

    fn corrupt(&self, msg: &str) -> CollectorError {
        CollectorError::CorruptTemp(format!("run {}: {msg}", self.path.display()))
    }
}
