//! # SSTable: sorted string table
//!
//! Immutable on-disk runs produced by memtable flushes and compactions.
//! Each run is a pair of files inside its level directory:
//!
//! ```text
//! L<i>/table_<ts>.sst          data file
//! L<i>/table_<ts>.sst.index    sidecar
//! ```
//!
//! ## Data file
//!
//! Records in ascending key order, no padding, all integers little-endian:
//!
//! ```text
//! [key_len: u32][key][val_len: u32][value][timestamp: u64][tombstone: u8][crc32: u32]
//! ```
//!
//! The CRC covers the record bytes before it and catches silent disk
//! corruption on point lookups.
//!
//! ## Index sidecar
//!
//! ```text
//! [entry_count: u64]
//! [min_key_len: u32][min_key]
//! [max_key_len: u32][max_key]
//! [bit_count: u64][hash_count: u8][bits ...]      bloom filter section
//! [key_len: u32][key][offset: u64]                × entry_count
//! ```
//!
//! A sidecar that fails to parse makes the whole table unloadable; the
//! engine skips it with a warning and leaves the data file on disk.

mod format;
mod reader;
mod writer;

pub use format::{index_path, MAX_KEY_BYTES, MAX_VALUE_BYTES};
pub use reader::{parse_file_id, SsTable};
pub use writer::TableWriter;

#[cfg(test)]
mod tests;
