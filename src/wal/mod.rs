mod record;

pub use record::WalRecord;

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use crate::error::{Error, Result};

/// The set of page writes recovered for one committed transaction, replayed
/// in log order.
pub struct ReplayedTxn {
    pub txn_id: u64,
    pub writes: Vec<(u64, Vec<u8>)>,
}

/// Append-only redo log. There is no undo log and no ABORT record: clearing
/// the in-memory "active" state is enough to make an aborted transaction's
/// writes invisible to recovery, because recovery only replays transactions
/// whose COMMIT record was observed.
pub struct Wal {
    path: PathBuf,
    file: File,
    active_txn: Option<u64>,
    next_txn_id: u64,
}

impl Wal {
    pub fn path_for(db_path: &Path) -> PathBuf {
        let mut p = db_path.as_os_str().to_owned();
        p.push(".wal");
        PathBuf::from(p)
    }

    pub fn open(db_path: &Path) -> Result<Wal> {
        let path = Self::path_for(db_path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Wal {
            path,
            file,
            active_txn: None,
            next_txn_id: 1,
        })
    }

    pub fn begin(&mut self) -> Result<u64> {
        if self.active_txn.is_some() {
            return Err(Error::Transaction("Transaction already active".into()));
        }
        let txn_id = self.next_txn_id;
        self.next_txn_id += 1;
        self.append(&WalRecord::Begin { txn_id })?;
        self.active_txn = Some(txn_id);
        Ok(txn_id)
    }

    pub fn log_page_write(&mut self, page_id: u64, after_image: &[u8]) -> Result<()> {
        let txn_id = self
            .active_txn
            .ok_or_else(|| Error::Wal("No active transaction".into()))?;
        self.append(&WalRecord::PageWrite {
            txn_id,
            page_id,
            after_image: B64.encode(after_image),
        })
    }

    pub fn commit(&mut self) -> Result<()> {
        let Some(txn_id) = self.active_txn else {
            return Ok(());
        };
        self.append(&WalRecord::Commit { txn_id })?;
        self.active_txn = None;
        Ok(())
    }

    pub fn abort(&mut self) {
        self.active_txn = None;
    }

    /// Truncate the log. Called once recovery has flushed every committed
    /// write into the main file, or after a checkpoint.
    pub fn reset(&mut self) -> Result<()> {
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        self.active_txn = None;
        Ok(())
    }

    fn append(&mut self, record: &WalRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Scan the log for committed transactions and return their page writes
    /// in commit order, oldest first. Any transaction lacking a COMMIT
    /// record (the process crashed mid-write or mid-commit) is dropped.
    pub fn recover(db_path: &Path) -> Result<Vec<ReplayedTxn>> {
        let path = Self::path_for(db_path);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)?;
        let reader = BufReader::new(file);

        let mut pending: BTreeMap<u64, Vec<(u64, Vec<u8>)>> = BTreeMap::new();
        let mut committed: HashSet<u64> = HashSet::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: WalRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                // A torn tail line (partial write at crash time) ends the log.
                Err(_) => break,
            };
            match record {
                WalRecord::Begin { txn_id } => {
                    pending.entry(txn_id).or_default();
                }
                WalRecord::PageWrite {
                    txn_id,
                    page_id,
                    after_image,
                } => {
                    let bytes = B64
                        .decode(after_image.as_bytes())
                        .map_err(|e| Error::Wal(format!("invalid base64 in WAL: {e}")))?;
                    pending.entry(txn_id).or_default().push((page_id, bytes));
                }
                WalRecord::Commit { txn_id } => {
                    committed.insert(txn_id);
                }
            }
        }

        Ok(committed
            .into_iter()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|txn_id| ReplayedTxn {
                txn_id,
                writes: pending.remove(&txn_id).unwrap_or_default(),
            })
            .collect())
    }

    pub fn remove_file_if_exists(db_path: &Path) -> Result<()> {
        let path = Self::path_for(db_path);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
