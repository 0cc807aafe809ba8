use super::*;
use tempfile::tempdir;

fn replay_all(path: &Path) -> Vec<WalRecord> {
    let mut recs = Vec::new();
    replay(path, |r| recs.push(r)).unwrap();
    recs
}

// -------------------- Roundtrip --------------------

#[test]
fn set_and_del_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = Wal::open(&path, true).unwrap();
        w.log_set(b"a", b"1").unwrap();
        w.log_set(b"b", b"2").unwrap();
        w.log_del(b"a").unwrap();
    }

    let recs = replay_all(&path);
    assert_eq!(
        recs,
        vec![
            WalRecord::Set {
                key: b"a".to_vec(),
                value: b"1".to_vec()
            },
            WalRecord::Set {
                key: b"b".to_vec(),
                value: b"2".to_vec()
            },
            WalRecord::Del { key: b"a".to_vec() },
        ]
    );
}

#[test]
fn empty_value_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = Wal::open(&path, true).unwrap();
        w.log_set(b"k", b"").unwrap();
    }

    let recs = replay_all(&path);
    assert_eq!(
        recs,
        vec![WalRecord::Set {
            key: b"k".to_vec(),
            value: Vec::new()
        }]
    );
}

// -------------------- Missing / empty files --------------------

#[test]
fn missing_file_is_clean_start() {
    let dir = tempdir().unwrap();
    let applied = replay(dir.path().join("nope.log"), |_| panic!()).unwrap();
    assert_eq!(applied, 0);
}

#[test]
fn empty_file_replays_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    std::fs::write(&path, b"").unwrap();
    assert_eq!(replay(&path, |_| panic!()).unwrap(), 0);
}

// -------------------- Damage tolerance --------------------

#[test]
fn truncated_tail_is_end_of_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = Wal::open(&path, true).unwrap();
        w.log_set(b"k1", b"v1").unwrap();
        w.log_set(b"k2", b"v2").unwrap();
    }

    // Tear a final record in half: op + key_len, no key bytes.
    let mut data = std::fs::read(&path).unwrap();
    data.push(OP_SET);
    data.extend_from_slice(&8u32.to_le_bytes());
    std::fs::write(&path, &data).unwrap();

    let recs = replay_all(&path);
    assert_eq!(recs.len(), 2, "intact records before the tear survive");
}

#[test]
fn crc_mismatch_stops_replay_at_prior_boundary() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = Wal::open(&path, true).unwrap();
        w.log_set(b"good", b"1").unwrap();
        w.log_set(b"bad", b"2").unwrap();
        w.log_set(b"after", b"3").unwrap();
    }

    // First record: op(1) + key_len(4) + "good"(4) + val_len(4) + "1"(1) + crc(4).
    let first_len = 1 + 4 + 4 + 4 + 1 + 4;
    // Flip the value byte of the middle record: op(1) + key_len(4) + "bad"(3) + val_len(4).
    let mut data = std::fs::read(&path).unwrap();
    let pos = first_len + 1 + 4 + 3 + 4;
    data[pos] ^= 0xff;
    std::fs::write(&path, &data).unwrap();

    let recs = replay_all(&path);
    assert_eq!(recs.len(), 1);
    assert_eq!(
        recs[0],
        WalRecord::Set {
            key: b"good".to_vec(),
            value: b"1".to_vec()
        }
    );
}

#[test]
fn unknown_op_stops_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = Wal::open(&path, true).unwrap();
        w.log_set(b"k", b"v").unwrap();
    }

    let mut data = std::fs::read(&path).unwrap();
    data.push(0x7f);
    data.extend_from_slice(&[0u8; 16]);
    std::fs::write(&path, &data).unwrap();

    assert_eq!(replay_all(&path).len(), 1);
}

#[test]
fn absurd_length_prefix_stops_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    let mut data = Vec::new();
    data.push(OP_SET);
    data.extend_from_slice(&u32::MAX.to_le_bytes());
    std::fs::write(&path, &data).unwrap();

    assert_eq!(replay_all(&path).len(), 0);
}

// -------------------- Rotation --------------------

#[test]
fn reset_truncates_and_accepts_new_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    let mut w = Wal::open(&path, true).unwrap();
    w.log_set(b"old", b"x").unwrap();
    w.reset().unwrap();
    w.log_set(b"new", b"y").unwrap();
    drop(w);

    let recs = replay_all(&path);
    assert_eq!(
        recs,
        vec![WalRecord::Set {
            key: b"new".to_vec(),
            value: b"y".to_vec()
        }]
    );
}
