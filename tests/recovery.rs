use tempfile::NamedTempFile;
use tinydb::storage::{Pager, PAGE_SIZE};
use tinydb::wal::Wal;

fn temp_db_path() -> std::path::PathBuf {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    drop(tmp);
    path
}

/// Simulates a crash between the WAL's COMMIT record reaching disk and the
/// checkpoint that applies it to the main file: a committed write lands in
/// the WAL via `Wal` directly (bypassing `Pager`, which would normally apply
/// it immediately on commit), then a fresh `Pager::open` must replay it.
#[test]
fn committed_wal_write_survives_reopen_without_pager_commit() {
    let path = temp_db_path();

    let page_id = {
        let mut pager = Pager::open(&path).unwrap();
        let page_id = pager.allocate_page().unwrap();
        pager.flush().unwrap();
        page_id
    };

    let mut after_image = vec![0u8; PAGE_SIZE];
    after_image[0..4].copy_from_slice(b"CRSH");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.begin().unwrap();
        wal.log_page_write(page_id, &after_image).unwrap();
        wal.commit().unwrap();
    }

    let mut pager = Pager::open(&path).unwrap();
    let recovered = pager.read_page(page_id).unwrap();
    assert_eq!(&recovered[0..4], b"CRSH");
}

/// An uncommitted WAL write (no COMMIT record, modeling a crash mid-write)
/// must never surface after reopening: the page keeps its prior contents.
#[test]
fn uncommitted_wal_write_is_discarded_on_reopen() {
    let path = temp_db_path();

    let page_id = {
        let mut pager = Pager::open(&path).unwrap();
        let page_id = pager.allocate_page().unwrap();
        pager.flush().unwrap();
        page_id
    };

    let mut after_image = vec![0u8; PAGE_SIZE];
    after_image[0..4].copy_from_slice(b"CRSH");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.begin().unwrap();
        wal.log_page_write(page_id, &after_image).unwrap();
        // No commit: the transaction is abandoned, as if the process died here.
    }

    let mut pager = Pager::open(&path).unwrap();
    let recovered = pager.read_page(page_id).unwrap();
    assert_ne!(&recovered[0..4], b"CRSH");
}
