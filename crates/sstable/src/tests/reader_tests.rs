use crate::*;
use anyhow::Result;
use memtable::{Memtable, Record};
use tempfile::tempdir;

fn write_sample(dir: &std::path::Path, n: u64) -> Result<std::path::PathBuf> {
    let mut mem = Memtable::new();
    for i in 0..n {
        mem.put(Record::put(
            format!("key{:05}", i).into_bytes(),
            format!("val{}", i).into_bytes(),
            i + 1,
        ));
    }
    let path = dir.join("table_1.sst");
    TableWriter::write(&path, 0, mem.len(), mem.iter())?;
    Ok(path)
}

// -------------------- Reopen roundtrip --------------------

#[test]
fn reopened_table_returns_identical_records() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 200)?;

    let table = SsTable::open(&path, 0)?;
    assert_eq!(table.len(), 200);

    for i in 0..200u64 {
        let key = format!("key{:05}", i).into_bytes();
        let rec = table.get(&key)?.expect("key present");
        assert_eq!(rec.key, key);
        assert_eq!(rec.value, format!("val{}", i).into_bytes());
        assert_eq!(rec.timestamp, i + 1);
        assert!(!rec.tombstone);
    }
    Ok(())
}

#[test]
fn min_max_bound_every_key() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 50)?;

    let table = SsTable::open(&path, 0)?;
    for (key, _) in table.entries() {
        assert!(table.min_key() <= key && key <= table.max_key());
        assert!(table.covers(key));
    }
    assert!(!table.covers(b"zzz"));
    assert!(!table.covers(b"aaa"));
    Ok(())
}

#[test]
fn bloom_has_no_false_negatives_after_reload() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 1000)?;

    let table = SsTable::open(&path, 0)?;
    for i in 0..1000u64 {
        let key = format!("key{:05}", i).into_bytes();
        assert!(
            table.get(&key)?.is_some(),
            "bloom must never hide a stored key"
        );
    }
    Ok(())
}

#[test]
fn absent_key_is_none() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 10)?;

    let table = SsTable::open(&path, 0)?;
    assert!(table.get(b"nothere")?.is_none());
    Ok(())
}

#[test]
fn tombstone_roundtrips_as_record() -> Result<()> {
    let dir = tempdir().unwrap();
    let mut mem = Memtable::new();
    mem.put(Record::put(b"live".to_vec(), b"v".to_vec(), 1));
    mem.put(Record::tombstone(b"gone".to_vec(), 2));

    let path = dir.path().join("table_1.sst");
    TableWriter::write(&path, 0, mem.len(), mem.iter())?;

    let table = SsTable::open(&path, 0)?;
    let rec = table.get(b"gone")?.expect("tombstone stored");
    assert!(rec.tombstone);
    assert!(rec.value.is_empty());
    assert_eq!(rec.timestamp, 2);
    Ok(())
}

// -------------------- Corruption handling --------------------

#[test]
fn flipped_data_byte_fails_the_read() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 5)?;

    // Flip a byte inside the first record's value region.
    let mut data = std::fs::read(&path)?;
    // key_len(4) + key(8) + val_len(4) puts us at the first value byte.
    data[16] ^= 0xff;
    std::fs::write(&path, &data)?;

    let table = SsTable::open(&path, 0)?;
    let res = table.get(b"key00000");
    assert!(res.is_err(), "crc must catch the corruption");
    Ok(())
}

#[test]
fn missing_sidecar_fails_open() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 5)?;
    std::fs::remove_file(index_path(&path))?;

    assert!(SsTable::open(&path, 0).is_err());
    Ok(())
}

#[test]
fn truncated_sidecar_fails_open() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 20)?;

    let idx = index_path(&path);
    let data = std::fs::read(&idx)?;
    std::fs::write(&idx, &data[..data.len() / 2])?;

    assert!(SsTable::open(&path, 0).is_err());
    Ok(())
}

#[test]
fn delete_files_removes_both() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = write_sample(dir.path(), 5)?;

    let table = SsTable::open(&path, 0)?;
    table.delete_files()?;

    assert!(!path.exists());
    assert!(!index_path(&path).exists());
    Ok(())
}
