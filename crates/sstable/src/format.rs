use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::Record;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Largest key we will allocate while reading (64 KiB).
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Largest value we will allocate while reading (10 MiB).
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Sidecar path for a data file: `table_<ts>.sst` → `table_<ts>.sst.index`.
pub fn index_path(data_path: &Path) -> PathBuf {
    let mut os = data_path.as_os_str().to_os_string();
    os.push(".index");
    PathBuf::from(os)
}

/// Scratch path used while a file is being written, renamed away on success.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Serializes one data record, returning the number of bytes written.
pub fn write_record<W: Write>(w: &mut W, rec: &Record) -> Result<u64> {
    let mut buf = Vec::with_capacity(4 + rec.key.len() + 4 + rec.value.len() + 8 + 1 + 4);
    buf.write_u32::<LittleEndian>(rec.key.len() as u32)?;
    buf.extend_from_slice(&rec.key);
    buf.write_u32::<LittleEndian>(rec.value.len() as u32)?;
    buf.extend_from_slice(&rec.value);
    buf.write_u64::<LittleEndian>(rec.timestamp)?;
    buf.write_u8(rec.tombstone as u8)?;

    let mut hasher = Crc32::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());

    w.write_all(&buf)?;
    Ok(buf.len() as u64)
}

/// Reads one data record, verifying length sanity and the checksum.
pub fn read_record<R: Read>(r: &mut R) -> Result<Record> {
    let mut body = Vec::with_capacity(64);

    let key_len = r.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES {
        bail!("corrupt record: key_len {} exceeds {}", key_len, MAX_KEY_BYTES);
    }
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;

    let val_len = r.read_u32::<LittleEndian>()? as usize;
    if val_len > MAX_VALUE_BYTES {
        bail!("corrupt record: val_len {} exceeds {}", val_len, MAX_VALUE_BYTES);
    }
    let mut value = vec![0u8; val_len];
    r.read_exact(&mut value)?;

    let timestamp = r.read_u64::<LittleEndian>()?;
    let tombstone = r.read_u8()?;
    let stored_crc = r.read_u32::<LittleEndian>()?;

    body.extend_from_slice(&(key_len as u32).to_le_bytes());
    body.extend_from_slice(&key);
    body.extend_from_slice(&(val_len as u32).to_le_bytes());
    body.extend_from_slice(&value);
    body.extend_from_slice(&timestamp.to_le_bytes());
    body.push(tombstone);

    let mut hasher = Crc32::new();
    hasher.update(&body);
    if hasher.finalize() != stored_crc {
        bail!("crc mismatch in data record");
    }

    Ok(Record {
        key,
        value,
        timestamp,
        tombstone: tombstone != 0,
    })
}
