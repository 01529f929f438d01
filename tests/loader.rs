mod support;

use std::sync::Arc;

use sink_buffers::queue::{FileLoader, RecordFactory};
use sink_buffers::Record;
use support::TestRecord;

fn factory() -> RecordFactory {
    Arc::new(|| Box::new(TestRecord::default()) as Box<dyn Record>)
}

fn hash_of(statement_key: &str) -> u32 {
    adler32::adler32(std::io::Cursor::new(statement_key.as_bytes())).unwrap()
}

#[test]
fn corrupt_active_file_is_rotated_aside_and_replaced_with_an_empty_one() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileLoader::with_default_history(dir.path());
    let key = "insert into t values (?)";
    let hash = hash_of(key);

    {
        let queue = loader.load(key, factory()).unwrap();
        queue.push(&TestRecord::new(key, 1)).unwrap();
    }

    let active_path = dir.path().join(format!("{hash}_0.bd"));
    let mut bytes = std::fs::read(&active_path).unwrap();
    bytes[0] ^= 0xFF;
    std::fs::write(&active_path, bytes).unwrap();

    let queue = loader.load(key, factory()).unwrap();
    assert!(queue.is_empty());

    let rotated_path = dir.path().join(format!("{hash}_0.carapted"));
    assert!(rotated_path.exists());
    assert!(active_path.exists());
}

#[test]
fn repeated_corruption_bumps_generations_up_to_max_history() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileLoader::new(dir.path(), 2);
    let key = "insert into t values (?)";
    let hash = hash_of(key);
    let active_path = dir.path().join(format!("{hash}_0.bd"));

    for _ in 0..3 {
        {
            let queue = loader.load(key, factory()).unwrap();
            queue.push(&TestRecord::new(key, 1)).unwrap();
        }
        let mut bytes = std::fs::read(&active_path).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&active_path, bytes).unwrap();
        let _ = loader.load(key, factory()).unwrap();
    }

    // max_history == 2: generations 0 and 1 are retained, nothing reaches generation 2.
    assert!(dir.path().join(format!("{hash}_0.carapted")).exists());
    assert!(dir.path().join(format!("{hash}_1.carapted")).exists());
    assert!(!dir.path().join(format!("{hash}_2.carapted")).exists());
}

#[test]
fn distinct_statement_keys_get_distinct_files() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileLoader::with_default_history(dir.path());

    let a = loader.load("insert into a values (?)", factory()).unwrap();
    let b = loader.load("insert into b values (?)", factory()).unwrap();

    a.push(&TestRecord::new("insert into a values (?)", 1)).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 0);
}
