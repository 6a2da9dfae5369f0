mod common;

use std::fs;

use common::Scenario;
use image_dedup_core::{Config, NoProgress, ScanOutcome, Scanner, UndoLedger};
use tempfile::tempdir;

#[test]
fn test_delete_duplicates_then_undo_everything() {
    let photos = tempdir().unwrap();
    let backups = tempdir().unwrap();
    let s = Scenario::create(photos.path());
    let original_bytes: Vec<Vec<u8>> = s.all().iter().map(|p| fs::read(p).unwrap()).collect();

    let scanner = Scanner::new(Config::default()).unwrap();
    let ScanOutcome::Completed(report) = scanner.scan(photos.path(), &NoProgress).unwrap() else {
        panic!("scan did not complete");
    };

    let ledger = UndoLedger::new(backups.path(), 10);
    let outcome = ledger.delete_all(report.result.all_duplicates());

    assert!(outcome.is_complete());
    assert_eq!(outcome.success_count(), 2);
    assert!(!s.b.exists());
    assert!(!s.c.exists());
    assert!(s.a.exists());

    while ledger.undo_last() {}

    let restored: Vec<Vec<u8>> = s.all().iter().map(|p| fs::read(p).unwrap()).collect();
    assert_eq!(restored, original_bytes);
    assert_eq!(fs::read_dir(backups.path()).unwrap().count(), 0);
}

#[test]
fn test_rescan_after_delete_finds_nothing() {
    let photos = tempdir().unwrap();
    let backups = tempdir().unwrap();
    Scenario::create(photos.path());
    let config = Config {
        backup_dir: backups.path().to_path_buf(),
        ..Config::default()
    };
    let ledger = UndoLedger::from_config(&config);
    let scanner = Scanner::new(config).unwrap();

    let first = scanner.scan(photos.path(), &NoProgress).unwrap().result();
    ledger.delete_all(first.all_duplicates());

    let second = scanner.scan(photos.path(), &NoProgress).unwrap();
    assert!(second.result().is_empty());
    assert_eq!(second.summary(), "No duplicates found.");
}
