//! The bounded-memory external-sort collector: entries are buffered in memory up
//! to a byte budget, spilled to sorted runs on disk once the budget is exceeded,
//! and finally streamed out in global sorted order via a k-way merge, ready to
//! be loaded into a destination table.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    fs,
    path::{Path, PathBuf},
};

use esync_config::EtlConfig;
use esync_db_api::{cursor::DbCursorRW, tables::Table};
use tracing::debug;

use crate::{
    error::{classify_io, CollectorError},
    run::{RunReader, RunWriter},
};

/// How a sorted stream of entries is applied to its destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Every key must be strictly greater than the previous one. Rejects the load
    /// on the first violation.
    Append,
    /// Each entry overwrites whatever the destination already holds at that key.
    Upsert,
}

/// A buffer-then-spill external sort over raw `(key, value)` byte pairs.
///
/// Keys sort lexicographically as raw bytes, matching the ordering every
/// [`esync_db_api::codec`] key encoding is designed to produce. A `Collector` owns
/// a slice of a scratch directory for as long as it lives; dropping it removes any
/// runs it spilled.
pub struct Collector {
    dir: PathBuf,
    file_size: usize,
    buffer: Vec<(Vec<u8>, Vec<u8>)>,
    buffer_bytes: usize,
    runs: Vec<PathBuf>,
    prefix: String,
    next_run_id: u64,
    len: usize,
}

impl Collector {
    /// Creates a collector rooted at `config.dir` (or the system temp directory if
    /// unset), sweeping away any scratch files a prior crashed instance left behind
    /// under the same prefix.
    pub fn new(config: &EtlConfig) -> Result<Self, CollectorError> {
        let dir = match &config.dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir(),
        };
        fs::create_dir_all(&dir).map_err(classify_io)?;
        let instance_id: u64 = rand::random();
        let prefix = format!("esync-etl-{instance_id:016x}");
        sweep_stale_runs(&dir, &prefix);
        Ok(Self { dir, file_size: config.file_size.max(1), buffer: Vec::new(), buffer_bytes: 0, runs: Vec::new(), prefix, next_run_id: 0, len: 0 })
    }

    /// The number of entries collected so far, spilled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffers one `(key, value)` pair, spilling a sorted run to disk if the
    /// byte budget configured at construction is now exceeded.
    pub fn collect(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), CollectorError> {
        self.buffer_bytes += key.len() + value.len();
        self.buffer.push((key, value));
        self.len += 1;
        if self.buffer_bytes >= self.file_size {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<(), CollectorError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.sort_by(|a, b| a.cmp(b));
        let path = self.run_path(self.next_run_id);
        self.next_run_id += 1;
        let mut writer = RunWriter::create(&path)?;
        for (key, value) in &self.buffer {
            writer.write_entry(key, value)?;
        }
        writer.finish()?;
        self.runs.push(path);
        self.buffer.clear();
        self.buffer_bytes = 0;
        Ok(())
    }

    fn run_path(&self, run_id: u64) -> PathBuf {
        self.dir.join(format!("{}-{run_id}.etl", self.prefix))
    }

    /// Streams every collected entry in ascending key order into `cursor`,
    /// consuming the collector. `transform` turns a raw byte pair into the
    /// destination table's typed key/value, or `Ok(None)` to skip the entry
    /// entirely (e.g. a stage filtering out entries it decided not to persist).
    ///
    /// Emits a `tracing::debug!` progress line roughly every
    /// `log_every_percent` percent of total entries loaded, but never more than
    /// 100 lines regardless of how small `log_every_percent` is set.
    pub fn load<T, F>(mut self, cursor: &mut impl DbCursorRW<T>, mode: LoadMode, log_every_percent: u8, mut transform: F) -> Result<(), CollectorError>
    where
        T: Table,
        F: FnMut(Vec<u8>, Vec<u8>) -> Result<Option<(T::Key, T::Value)>, CollectorError>,
    {
        let total = self.len;
        let percent = usize::from(log_every_percent.max(1));
        let step = (total * percent / 100).max(1);
        let mut loaded = 0usize;
        let mut last_key: Option<T::Key> = None;

        let mut apply = |key: Vec<u8>, value: Vec<u8>, transform: &mut F| -> Result<(), CollectorError> {
            if let Some((key, value)) = transform(key, value)? {
                match mode {
                    LoadMode::Append => {
                        if let Some(last) = &last_key {
                            if !(*last < key) {
                                return Err(CollectorError::NonMonotoneKey);
                            }
                        }
                        cursor.append(key.clone(), value)?;
                        last_key = Some(key);
                    }
                    LoadMode::Upsert => {
                        cursor.upsert(key, value)?;
                    }
                }
            }
            loaded += 1;
            if loaded % step == 0 || loaded == total {
                debug!(loaded, total, "etl load progress");
            }
            Ok(())
        };

        if self.runs.is_empty() {
            self.buffer.sort_by(|a, b| a.cmp(b));
            for (key, value) in self.buffer.drain(..) {
                apply(key, value, &mut transform)?;
            }
            return Ok(());
        }

        self.spill()?;
        merge_runs(&self.runs, |key, value| apply(key, value, &mut transform))
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        for run in &self.runs {
            let _ = fs::remove_file(run);
        }
    }
}

/// Removes any leftover `{prefix}-*.etl` files under `dir`. Best-effort: a prior
/// instance's files being unreadable or already gone is not this instance's
/// problem to report.
fn sweep_stale_runs(dir: &Path, prefix: &str) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && name.ends_with(".etl") {
            let _ = fs::remove_file(entry.path());
        }
    }
}

struct HeapItem {
    key: Vec<u8>,
    value: Vec<u8>,
    run: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.run == other.run
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    /// Reversed so [`BinaryHeap`], normally a max-heap, pops the smallest key
    /// first. Ties break on `run` index to give interleaved duplicate keys a
    /// stable, deterministic order.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key).then_with(|| other.run.cmp(&self.run))
    }
}

/// Streams every run in `paths` through a k-way merge by key, invoking `visit`
/// once per entry in ascending order.
fn merge_runs(paths: &[PathBuf], mut visit: impl FnMut(Vec<u8>, Vec<u8>) -> Result<(), CollectorError>) -> Result<(), CollectorError> {
    let mut readers: Vec<RunReader> = paths.iter().map(|p| RunReader::open(p)).collect::<Result<_, _>>()?;
    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (run, reader) in readers.iter_mut().enumerate() {
        if let Some((key, value)) = reader.next_entry()? {
            heap.push(HeapItem { key, value, run });
        }
    }
    while let Some(HeapItem { key, value, run }) = heap.pop() {
        if let Some((next_key, next_value)) = readers[run].next_entry()? {
            heap.push(HeapItem { key: next_key, value: next_value, run });
        }
        visit(key, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use esync_db::MemDatabase;
    use esync_db_api::{Database, DbTx, DbTxMut, SyncStageProgress};

    use super::*;

    fn tiny_config() -> EtlConfig {
        EtlConfig { dir: Some(std::env::temp_dir().join("esync-etl-tests")), file_size: 32, log_every_percent: 10 }
    }

    fn decode(key: Vec<u8>, value: Vec<u8>) -> Result<Option<(Vec<u8>, u64)>, CollectorError> {
        let value: [u8; 8] = value.try_into().expect("test entries are always 8-byte big-endian u64s");
        Ok(Some((key, u64::from_be_bytes(value))))
    }

    #[test]
    fn distinct_keys_load_in_sorted_order_regardless_of_insertion_order() {
        let mut collector = Collector::new(&tiny_config()).unwrap();
        for n in [5u64, 1, 4, 2, 3] {
            collector.collect(n.to_be_bytes().to_vec(), n.to_be_bytes().to_vec()).unwrap();
        }

        let db = MemDatabase::default();
        let tx = db.tx_mut().unwrap();
        {
            let mut cursor = tx.cursor_write::<SyncStageProgress>().unwrap();
            collector.load(&mut cursor, LoadMode::Append, 10, decode).unwrap();
        }
        tx.commit().unwrap();

        let tx = db.tx().unwrap();
        let mut cursor = tx.cursor_read::<SyncStageProgress>().unwrap();
        let mut seen = Vec::new();
        let mut entry = cursor.first().unwrap();
        while let Some((key, value)) = entry {
            seen.push((key, value));
            entry = cursor.next().unwrap();
        }
        assert_eq!(seen, vec![
            (1u64.to_be_bytes().to_vec(), 1),
            (2u64.to_be_bytes().to_vec(), 2),
            (3u64.to_be_bytes().to_vec(), 3),
            (4u64.to_be_bytes().to_vec(), 4),
            (5u64.to_be_bytes().to_vec(), 5),
        ]);
    }

    #[test]
    fn append_rejects_a_duplicate_key_even_across_spilled_runs() {
        let mut collector = Collector::new(&tiny_config()).unwrap();
        for n in [1u64, 2, 2, 3] {
            collector.collect(n.to_be_bytes().to_vec(), n.to_be_bytes().to_vec()).unwrap();
        }

        let db = MemDatabase::default();
        let tx = db.tx_mut().unwrap();
        let mut cursor = tx.cursor_write::<SyncStageProgress>().unwrap();
        let err = collector.load(&mut cursor, LoadMode::Append, 10, decode).unwrap_err();
        assert!(matches!(err, CollectorError::NonMonotoneKey));
    }

    #[test]
    fn dropping_a_collector_removes_its_spilled_runs() {
        let config = tiny_config();
        let mut collector = Collector::new(&config).unwrap();
        for n in 0u64..20 {
            collector.collect(n.to_be_bytes().to_vec(), n.to_be_bytes().to_vec()).unwrap();
        }
        collector.spill().unwrap();
        let runs = collector.runs.clone();
        assert!(!runs.is_empty());
        for run in &runs {
            assert!(run.exists());
        }
        drop(collector);
        for run in &runs {
            assert!(!run.exists());
        }
    }
}
