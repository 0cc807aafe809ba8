use anyhow::{anyhow, bail, Context, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use memtable::Record;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{self, index_path, MAX_KEY_BYTES};

/// Handle to one immutable on-disk run.
///
/// [`open`](SsTable::open) loads the whole index sidecar into memory: the
/// key range, the bloom filter (when present and sane), and the key→offset
/// map. A persistent file handle to the data file is kept behind a `Mutex`
/// so `get` works through `&self`; each lookup is one seek + one read.
pub struct SsTable {
    data_path: PathBuf,
    level: usize,
    index: BTreeMap<Vec<u8>, u64>,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    bloom: Option<BloomFilter>,
    file: Mutex<BufReader<File>>,
}

impl SsTable {
    /// Opens the table at `data_path`, parsing its `.index` sidecar.
    ///
    /// Fails when either file is missing or the sidecar does not parse; the
    /// caller decides whether that is fatal (the engine skips the table).
    pub fn open<P: AsRef<Path>>(data_path: P, level: usize) -> Result<Self> {
        let data_path = data_path.as_ref().to_path_buf();
        let idx_path = index_path(&data_path);
        let idx_file = File::open(&idx_path)
            .with_context(|| format!("opening index {}", idx_path.display()))?;
        let mut r = BufReader::new(idx_file);

        let entry_count = r.read_u64::<LittleEndian>()?;
        let min_key = read_keyed_field(&mut r)?;
        let max_key = read_keyed_field(&mut r)?;

        // An oversized or zero bit count is an old/foreign filter section;
        // the table is served without a filter in that case.
        let bloom = BloomFilter::read_from(&mut r)?;

        let mut index = BTreeMap::new();
        for _ in 0..entry_count {
            let key = read_keyed_field(&mut r)?;
            let offset = r.read_u64::<LittleEndian>()?;
            index.insert(key, offset);
        }

        if index.len() as u64 != entry_count {
            bail!(
                "index {} advertises {} entries, parsed {}",
                idx_path.display(),
                entry_count,
                index.len()
            );
        }

        Self::from_parts(data_path, level, index, min_key, max_key, bloom)
    }

    /// Builds a handle from freshly written parts, opening the data file.
    pub(crate) fn from_parts(
        data_path: PathBuf,
        level: usize,
        index: BTreeMap<Vec<u8>, u64>,
        min_key: Vec<u8>,
        max_key: Vec<u8>,
        bloom: Option<BloomFilter>,
    ) -> Result<Self> {
        let file = File::open(&data_path)
            .with_context(|| format!("opening data file {}", data_path.display()))?;
        Ok(Self {
            data_path,
            level,
            index,
            min_key,
            max_key,
            bloom,
            file: Mutex::new(BufReader::new(file)),
        })
    }

    /// Point lookup.
    ///
    /// The bloom filter short-circuits definite misses; the offset map
    /// decides the rest. The record read back must carry the requested key:
    /// a mismatch means the index lied, and the lookup reports absent
    /// rather than serving foreign data.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        if let Some(ref bf) = self.bloom {
            if !bf.possibly_contains(key) {
                return Ok(None);
            }
        }

        let offset = match self.index.get(key) {
            Some(&o) => o,
            None => return Ok(None),
        };

        let rec = self.record_at(offset)?;
        if rec.key != key {
            return Ok(None);
        }
        Ok(Some(rec))
    }

    /// Reads the record stored at `offset` in the data file.
    pub fn record_at(&self, offset: u64) -> Result<Record> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow!("sstable file lock poisoned: {}", e))?;
        f.seek(SeekFrom::Start(offset))?;
        format::read_record(&mut *f)
    }

    /// Iterates `(key, offset)` pairs in ascending key order.
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.index.iter().map(|(k, &o)| (k.as_slice(), o))
    }

    /// True when `key` falls inside this table's `[min_key, max_key]` span.
    #[must_use]
    pub fn covers(&self, key: &[u8]) -> bool {
        self.min_key.as_slice() <= key && key <= self.max_key.as_slice()
    }

    #[must_use]
    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Identifier parsed from the file name, when it follows the
    /// `table_<id>.sst` convention.
    #[must_use]
    pub fn file_id(&self) -> Option<u64> {
        parse_file_id(&self.data_path)
    }

    /// Removes both files of the run. Called only after a successor
    /// compaction output has been installed.
    pub fn delete_files(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.data_path)?;
        std::fs::remove_file(index_path(&self.data_path))?;
        Ok(())
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("path", &self.data_path)
            .field("level", &self.level)
            .field("entries", &self.index.len())
            .field("bloom", &self.bloom.is_some())
            .finish()
    }
}

/// Parses the numeric id out of a `table_<id>.sst` file name.
pub fn parse_file_id(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix("table_")?
        .strip_suffix(".sst")?
        .parse()
        .ok()
}

/// Reads a `u32`-length-prefixed byte field with a sanity cap.
fn read_keyed_field<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_KEY_BYTES {
        bail!("corrupt index: field length {} exceeds {}", len, MAX_KEY_BYTES);
    }
    let mut field = vec![0u8; len];
    r.read_exact(&mut field)?;
    Ok(field)
}
