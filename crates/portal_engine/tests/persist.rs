use std::fs;

use portal_engine::{ensure_dir, AtomicFileWriter, PersistError};
use tempfile::TempDir;

#[test]
fn atomic_write_replaces_existing_content() {
    let dir = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(dir.path());

    writer.write("state.ron", "first").unwrap();
    let target = writer.write("state.ron", "second").unwrap();

    assert_eq!(fs::read_to_string(target).unwrap(), "second");
    let leftovers = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 1, "temp files must not linger");
}

#[test]
fn writer_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");

    AtomicFileWriter::new(&nested).write("x", "y").unwrap();

    assert!(nested.join("x").is_file());
}

#[test]
fn file_in_place_of_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain");
    fs::write(&file, "").unwrap();

    let err = ensure_dir(&file).unwrap_err();

    assert!(matches!(err, PersistError::Directory { .. }));
}
