use anyhow::{ensure, Context, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use memtable::Record;
use std::collections::BTreeMap;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::{self, index_path, tmp_path};
use crate::reader::SsTable;

/// Bloom sizing: bits per stored entry.
const BLOOM_BITS_PER_ENTRY: u64 = 10;
/// Bloom sizing: hash probes per key.
const BLOOM_NUM_HASHES: u8 = 7;

/// Writes immutable runs.
pub struct TableWriter;

impl TableWriter {
    /// Writes a table at `data_path` from `records`, which must arrive in
    /// ascending key order with exactly `entry_count` items (the count sizes
    /// the bloom filter up front).
    ///
    /// Both files are written to `.tmp` scratch paths, fsynced, and renamed
    /// into place, so a crash mid-write leaves only orphans for startup to
    /// sweep. Returns the opened handle for the new run.
    pub fn write<'a, I>(
        data_path: &Path,
        level: usize,
        entry_count: usize,
        records: I,
    ) -> Result<SsTable>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        ensure!(entry_count > 0, "refusing to write an empty sstable");

        let data_tmp = tmp_path(data_path);
        let mut data_file = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&data_tmp)
                .with_context(|| format!("creating {}", data_tmp.display()))?,
        );

        let mut bloom = BloomFilter::new(entry_count as u64 * BLOOM_BITS_PER_ENTRY, BLOOM_NUM_HASHES);
        let mut index: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        let mut min_key: Option<Vec<u8>> = None;
        let mut max_key: Vec<u8> = Vec::new();
        let mut offset = 0u64;

        for rec in records {
            bloom.add(&rec.key);
            index.insert(rec.key.clone(), offset);
            offset += format::write_record(&mut data_file, rec)?;

            if min_key.is_none() {
                min_key = Some(rec.key.clone());
            }
            max_key = rec.key.clone();
        }

        let min_key = min_key.ok_or_else(|| anyhow::anyhow!("record iterator was empty"))?;
        ensure!(
            index.len() == entry_count,
            "record iterator yielded {} entries, expected {}",
            index.len(),
            entry_count
        );

        data_file.flush()?;
        data_file.get_ref().sync_all()?;
        drop(data_file);

        // Sidecar: counts and key range, bloom section, then the offsets.
        let idx_path = index_path(data_path);
        let idx_tmp = tmp_path(&idx_path);
        let mut idx_file = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&idx_tmp)
                .with_context(|| format!("creating {}", idx_tmp.display()))?,
        );

        idx_file.write_u64::<LittleEndian>(index.len() as u64)?;
        idx_file.write_u32::<LittleEndian>(min_key.len() as u32)?;
        idx_file.write_all(&min_key)?;
        idx_file.write_u32::<LittleEndian>(max_key.len() as u32)?;
        idx_file.write_all(&max_key)?;
        bloom.write_to(&mut idx_file)?;
        for (key, data_offset) in &index {
            idx_file.write_u32::<LittleEndian>(key.len() as u32)?;
            idx_file.write_all(key)?;
            idx_file.write_u64::<LittleEndian>(*data_offset)?;
        }

        idx_file.flush()?;
        idx_file.get_ref().sync_all()?;
        drop(idx_file);

        rename(&data_tmp, data_path)?;
        rename(&idx_tmp, &idx_path)?;

        SsTable::from_parts(
            data_path.to_path_buf(),
            level,
            index,
            min_key,
            max_key,
            Some(bloom),
        )
    }
}
