// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tempfile::TempDir;

fn temp_wal_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal.jsonl");
    (dir, path)
}

fn put(key: &str) -> Operation {
    Operation::Put {
        key: key.to_string(),
        value: json!({"id": key}),
    }
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn append_then_replay() {
    let (_dir, path) = temp_wal_path();

    let mut wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.append(put("a")).unwrap().sequence, 0);
    assert_eq!(wal.append(put("b")).unwrap().sequence, 1);
    assert_eq!(wal.next_sequence(), 2);

    let recovered = Wal::replay(&path).unwrap();
    assert_eq!(recovered.entries.len(), 2);
    assert_eq!(recovered.truncated_bytes, 0);
    assert_eq!(recovered.entries[1].operation, put("b"));
}

#[test]
fn replay_missing_file_is_empty() {
    let (_dir, path) = temp_wal_path();
    let recovered = Wal::replay(&path).unwrap();
    assert!(recovered.entries.is_empty());
}

#[test]
fn replay_truncates_torn_tail() {
    let (_dir, path) = temp_wal_path();
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(put("a")).unwrap();
    }
    let good_len = std::fs::metadata(&path).unwrap().len();
    append_raw(&path, br#"{"sequence":1,"timestamp_mic"#);

    let recovered = Wal::replay(&path).unwrap();

    assert_eq!(recovered.entries.len(), 1);
    assert!(recovered.truncated_bytes > 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
}

#[test]
fn replay_stops_at_checksum_mismatch() {
    let (_dir, path) = temp_wal_path();
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(put("a")).unwrap();
    }
    let mut bad = WalEntry::new(1, put("b")).unwrap();
    bad.checksum ^= 0xffff;
    let mut line = bad.to_line().unwrap().into_bytes();
    line.push(b'\n');
    append_raw(&path, &line);
    {
        // A valid entry after the bad one is unreachable and dropped too
        let mut wal = Wal::open(&path, 2).unwrap();
        wal.append(put("c")).unwrap();
    }

    let recovered = Wal::replay(&path).unwrap();

    assert_eq!(recovered.entries.len(), 1);
    assert_eq!(recovered.entries[0].operation, put("a"));
}

#[test]
fn complete_json_without_newline_is_torn() {
    let (_dir, path) = temp_wal_path();
    let entry = WalEntry::new(0, put("a")).unwrap();
    std::fs::write(&path, entry.to_line().unwrap()).unwrap();

    let recovered = Wal::replay(&path).unwrap();

    assert!(recovered.entries.is_empty());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn appends_after_recovery_are_readable() {
    let (_dir, path) = temp_wal_path();
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(put("a")).unwrap();
    }
    append_raw(&path, b"garbage");

    let recovered = Wal::replay(&path).unwrap();
    let next = recovered.entries.last().map(|e| e.sequence + 1).unwrap_or(0);
    {
        let mut wal = Wal::open(&path, next).unwrap();
        wal.append(put("b")).unwrap();
    }

    let recovered = Wal::replay(&path).unwrap();
    let keys: Vec<_> = recovered
        .entries
        .iter()
        .map(|e| match &e.operation {
            Operation::Put { key, .. } => key.clone(),
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn reset_empties_file_but_keeps_sequence() {
    let (_dir, path) = temp_wal_path();
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(put("a")).unwrap();
    wal.append(put("b")).unwrap();

    wal.reset().unwrap();

    assert!(wal.is_empty());
    assert_eq!(wal.append(put("c")).unwrap().sequence, 2);
    assert_eq!(Wal::replay(&path).unwrap().entries.len(), 1);
}
