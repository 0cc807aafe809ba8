//! # Write-ahead log
//!
//! Append-only binary journal of every mutation. Each record is flushed to
//! the OS buffer before the engine acknowledges the write, and the whole
//! file is replayed at startup to rebuild the memtable.
//!
//! ## Record format
//!
//! ```text
//! [op: u8]                     0x01 = SET, 0x02 = DEL
//! [key_len: u32 LE][key]
//! [val_len: u32 LE][value]     SET only
//! [crc32: u32 LE]              over all preceding bytes of the record
//! ```
//!
//! Replay is deliberately forgiving: a short read at the tail (torn final
//! record), an unknown op byte, an absurd length, or a CRC mismatch all end
//! replay at the prior good boundary. A missing file is a clean start.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Op byte for an insertion.
pub const OP_SET: u8 = 0x01;
/// Op byte for a deletion.
pub const OP_DEL: u8 = 0x02;

/// Replay refuses keys/values longer than this; such a length prefix only
/// appears when the log is damaged.
const MAX_FIELD_BYTES: u32 = 64 * 1024 * 1024;

/// Errors surfaced by WAL operations. Replay tolerates damage silently, so
/// in practice callers only ever see `Io`.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("record field too large: {0} bytes")]
    FieldTooLarge(u64),
}

/// A mutation recovered during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    Set { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

/// The journal file: append-only writer plus the rotation primitive.
///
/// Records are framed into a reusable scratch buffer, checksummed, and
/// written with a single `write_all` so a crash can only tear the final
/// record.
pub struct Wal {
    file: File,
    path: PathBuf,
    sync: bool,
    buf: Vec<u8>,
}

impl Wal {
    /// Opens (or creates) the journal at `path` in append mode.
    ///
    /// When `sync` is true every append is followed by `fsync`; otherwise
    /// records are only flushed to the OS buffer.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file,
            path,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Appends a SET record.
    pub fn log_set(&mut self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        self.check_len(key)?;
        self.check_len(value)?;
        self.buf.clear();
        self.buf.write_u8(OP_SET)?;
        self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
        self.buf.extend_from_slice(key);
        self.buf.write_u32::<LittleEndian>(value.len() as u32)?;
        self.buf.extend_from_slice(value);
        self.finish_record()
    }

    /// Appends a DEL record.
    pub fn log_del(&mut self, key: &[u8]) -> Result<(), WalError> {
        self.check_len(key)?;
        self.buf.clear();
        self.buf.write_u8(OP_DEL)?;
        self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
        self.buf.extend_from_slice(key);
        self.finish_record()
    }

    /// Rotation primitive: close the current file, remove it, and reopen
    /// truncated. The engine re-logs surviving memtable entries afterwards
    /// while still holding its memtable lock.
    pub fn reset(&mut self) -> Result<(), WalError> {
        let _ = fs::remove_file(&self.path);
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_len(&self, field: &[u8]) -> Result<(), WalError> {
        if field.len() as u64 > MAX_FIELD_BYTES as u64 {
            return Err(WalError::FieldTooLarge(field.len() as u64));
        }
        Ok(())
    }

    /// Appends the checksum, writes the frame, and flushes.
    fn finish_record(&mut self) -> Result<(), WalError> {
        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        let crc = hasher.finalize();
        self.buf.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&self.buf)?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

/// Replays every intact record at `path`, calling `apply` for each.
///
/// Returns the number of records applied. A missing file yields `Ok(0)`.
/// Replay stops silently at the first torn or malformed record; everything
/// before it is still applied.
pub fn replay<P, F>(path: P, mut apply: F) -> Result<usize, WalError>
where
    P: AsRef<Path>,
    F: FnMut(WalRecord),
{
    let file = match File::open(path.as_ref()) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(WalError::Io(e)),
    };
    let mut rdr = BufReader::new(file);
    let mut applied = 0usize;

    loop {
        let record = match read_record(&mut rdr) {
            Some(r) => r,
            None => return Ok(applied),
        };
        apply(record);
        applied += 1;
    }
}

/// Reads one record, returning `None` at EOF or on any damage.
fn read_record<R: Read>(rdr: &mut R) -> Option<WalRecord> {
    let op = match rdr.read_u8() {
        Ok(b) => b,
        Err(_) => return None,
    };
    if op != OP_SET && op != OP_DEL {
        return None;
    }

    let mut body = vec![op];

    let key = read_field(rdr, &mut body)?;
    let value = if op == OP_SET {
        Some(read_field(rdr, &mut body)?)
    } else {
        None
    };

    let stored_crc = rdr.read_u32::<LittleEndian>().ok()?;
    let mut hasher = Crc32::new();
    hasher.update(&body);
    if hasher.finalize() != stored_crc {
        return None;
    }

    Some(match value {
        Some(value) => WalRecord::Set { key, value },
        None => WalRecord::Del { key },
    })
}

/// Reads a length-prefixed field, mirroring the raw bytes into `body` for
/// the checksum.
fn read_field<R: Read>(rdr: &mut R, body: &mut Vec<u8>) -> Option<Vec<u8>> {
    let len = rdr.read_u32::<LittleEndian>().ok()?;
    if len > MAX_FIELD_BYTES {
        return None;
    }
    let mut field = vec![0u8; len as usize];
    rdr.read_exact(&mut field).ok()?;

    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&field);
    Some(field)
}

#[cfg(test)]
mod tests;
