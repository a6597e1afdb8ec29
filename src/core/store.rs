//! Durable inbox log with file-based persistence.
//!
//! Records are stored as newline-delimited JSON (JSONL) in arrival order, for
//! simplicity and easy inspection. Between compactions the log only grows:
//! `append` adds a record line and `mark_delivered` adds a
//! `{"delivered": <seq>}` line, each synced to disk before returning. State is
//! rebuilt by replaying the log. Every handle keeps its replayed image and
//! reads only the bytes added since its last operation, so the cost of a call
//! does not grow with the log.
//!
//! Compaction is the only rewrite. It goes through a temp file and an atomic
//! rename and bumps a generation number kept in the sidecar lock file, which
//! tells other handles to replay from scratch. An advisory lock on that
//! sidecar serializes processes that share the log.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::paths;
use crate::domain::{EventRecord, StoredRecord};

/// Errors that can occur with the inbox store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: sequence {0}")]
    NotFound(u64),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Counts derived from a scan of the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: usize,
    pub delivered: usize,
    pub undelivered: usize,
    /// Lines that could not be parsed (kept on disk, never delivered)
    pub corrupt: usize,
}

/// Durable record storage shared by producers and the consumer.
///
/// Implementations must make `append` and `mark_delivered` durable before
/// returning, and `list_undelivered` must observe every completed write.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new undelivered record and return it with its sequence
    async fn append(&self, sender: &str, body: &str) -> Result<EventRecord, StoreError>;

    /// Snapshot of all undelivered records in ascending sequence order
    async fn list_undelivered(&self) -> Result<Vec<EventRecord>, StoreError>;

    /// Flag a record as delivered (no-op if it already is)
    async fn mark_delivered(&self, record: &EventRecord) -> Result<(), StoreError>;

    /// The most recently appended record, delivered or not
    async fn last(&self) -> Result<Option<EventRecord>, StoreError>;

    /// Drop the oldest delivered records beyond `retain_delivered`.
    /// Returns the number of records removed.
    async fn compact(&self, retain_delivered: usize) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Appended once a record has been handed to the listener
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeliveryMark {
    delivered: u64,
}

/// Anything that can appear on a line of the log
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Mark(DeliveryMark),
    Record(StoredRecord),
}

/// One kept line of the log. Delivery marks are folded into their record.
#[derive(Debug, Clone)]
enum Line {
    Record(StoredRecord),
    /// Unparseable line, raw bytes written back verbatim on compaction
    Corrupt(Vec<u8>),
}

/// Replayed image of the log file
#[derive(Debug, Default)]
struct InboxLog {
    lines: Vec<Line>,

    /// Sequence -> position in `lines`
    index: HashMap<u64, usize>,

    last_sequence: u64,

    /// Bytes of the file already replayed
    offset: u64,

    /// Compaction generation the image was replayed from
    generation: u64,
}

impl InboxLog {
    fn empty(generation: u64) -> Self {
        Self {
            generation,
            ..Default::default()
        }
    }

    /// Replay whatever was written since the last call
    fn refresh(&mut self, path: &Path, generation: u64) -> Result<(), StoreError> {
        if generation != self.generation {
            debug!(path = %path.display(), generation, "Inbox log was compacted, replaying");
            *self = Self::empty(generation);
        }

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                *self = Self::empty(generation);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < self.offset {
            warn!(path = %path.display(), "Inbox log shrank outside compaction, replaying");
            *self = Self::empty(generation);
        }
        if len == self.offset {
            return Ok(());
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut tail = Vec::new();
        file.read_to_end(&mut tail)?;

        // A trailing fragment without a newline was torn by a crash. It stays
        // unreplayed until the next write terminates it.
        let complete = match tail.iter().rposition(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => return Ok(()),
        };

        let mut position = self.offset;
        for raw in tail[..complete - 1].split(|&b| b == b'\n') {
            self.apply(raw, position, path);
            position += raw.len() as u64 + 1;
        }
        self.offset += complete as u64;

        Ok(())
    }

    fn apply(&mut self, raw: &[u8], position: u64, path: &Path) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        match serde_json::from_slice::<Entry>(raw) {
            Ok(Entry::Record(mut stored)) => {
                // Entries written before sequences existed take the next
                // position after their predecessor.
                let sequence = match stored.seq {
                    Some(seq) if seq > self.last_sequence => seq,
                    _ => self.last_sequence + 1,
                };
                stored.seq = Some(sequence);
                self.last_sequence = sequence;
                self.index.insert(sequence, self.lines.len());
                self.lines.push(Line::Record(stored));
            }
            Ok(Entry::Mark(mark)) => match self.record_mut(mark.delivered) {
                Some(stored) => stored.emitted = true,
                None => debug!(sequence = mark.delivered, "Ignoring mark for unknown record"),
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    offset = position,
                    error = %e,
                    "Skipping corrupt inbox line"
                );
                self.lines.push(Line::Corrupt(raw.to_vec()));
            }
        }
    }

    /// Append one entry to the file and replay it
    fn write_entry<T: Serialize>(&mut self, path: &Path, entry: &T) -> Result<(), StoreError> {
        let mut buf = Vec::new();

        // Bytes past the replayed offset can only be a torn fragment
        let torn = match std::fs::metadata(path) {
            Ok(meta) => meta.len() > self.offset,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if torn {
            buf.push(b'\n');
        }

        serde_json::to_writer(&mut buf, entry)?;
        buf.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&buf)?;
        file.sync_data()?;

        self.refresh(path, self.generation)
    }

    fn records(&self) -> impl DoubleEndedIterator<Item = &StoredRecord> {
        self.lines.iter().filter_map(|line| match line {
            Line::Record(stored) => Some(stored),
            Line::Corrupt(_) => None,
        })
    }

    fn record(&self, sequence: u64) -> Option<&StoredRecord> {
        match self.lines.get(*self.index.get(&sequence)?)? {
            Line::Record(stored) => Some(stored),
            Line::Corrupt(_) => None,
        }
    }

    fn record_mut(&mut self, sequence: u64) -> Option<&mut StoredRecord> {
        match self.lines.get_mut(*self.index.get(&sequence)?)? {
            Line::Record(stored) => Some(stored),
            Line::Corrupt(_) => None,
        }
    }

    fn append(&mut self, path: &Path, sender: &str, body: &str) -> Result<EventRecord, StoreError> {
        let sequence = self.last_sequence + 1;
        self.write_entry(path, &StoredRecord::new(sequence, sender, body))?;

        self.record(sequence)
            .map(StoredRecord::to_record)
            .ok_or(StoreError::NotFound(sequence))
    }

    /// Sequences ascend with position, so this is already in delivery order
    fn undelivered(&self) -> Vec<EventRecord> {
        self.records()
            .filter(|stored| !stored.emitted)
            .map(StoredRecord::to_record)
            .collect()
    }

    fn mark_delivered(&mut self, path: &Path, sequence: u64) -> Result<(), StoreError> {
        let stored = self.record(sequence).ok_or(StoreError::NotFound(sequence))?;
        if stored.emitted {
            return Ok(());
        }

        self.write_entry(path, &DeliveryMark { delivered: sequence })
    }

    fn last(&self) -> Option<EventRecord> {
        self.records().next_back().map(StoredRecord::to_record)
    }

    /// Lines that survive keeping `retain_delivered` delivered records.
    ///
    /// The newest record is never removed: it carries the sequence
    /// high-water mark that the next append continues from.
    fn pruned(&self, retain_delivered: usize) -> (Vec<&Line>, usize) {
        let newest = self.records().next_back().and_then(|stored| stored.seq);
        let removable = |stored: &StoredRecord| stored.emitted && stored.seq != newest;

        let delivered = self.records().filter(|stored| removable(stored)).count();
        let mut excess = delivered.saturating_sub(retain_delivered);
        let removed = excess;

        let kept = self
            .lines
            .iter()
            .filter(|line| match line {
                Line::Record(stored) if removable(stored) && excess > 0 => {
                    excess -= 1;
                    false
                }
                _ => true,
            })
            .collect();

        (kept, removed)
    }

    /// Rewrite the file without the oldest delivered records
    fn compact(
        &mut self,
        path: &Path,
        lock: &FileLock,
        retain_delivered: usize,
    ) -> Result<usize, StoreError> {
        let (kept, removed) = self.pruned(retain_delivered);
        if removed == 0 {
            return Ok(0);
        }

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            for line in kept {
                match line {
                    Line::Record(stored) => serde_json::to_writer(&mut writer, stored)?,
                    Line::Corrupt(raw) => writer.write_all(raw)?,
                }
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        // Bump first: a crash after this point only costs other handles a
        // full replay.
        let generation = lock.bump_generation()?;
        tmp.persist(path).map_err(|e| e.error)?;

        *self = Self::empty(generation);
        self.refresh(path, generation)?;

        Ok(removed)
    }

    fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for line in &self.lines {
            match line {
                Line::Record(stored) => {
                    stats.total += 1;
                    if stored.emitted {
                        stats.delivered += 1;
                    } else {
                        stats.undelivered += 1;
                    }
                }
                Line::Corrupt(_) => stats.corrupt += 1,
            }
        }
        stats
    }
}

/// Advisory lock on the sidecar lock file, released on drop.
///
/// The sidecar's content is the log's compaction generation.
struct FileLock(File);

impl FileLock {
    fn open(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
    }

    fn exclusive(path: &Path) -> io::Result<Self> {
        let file = Self::open(path)?;
        file.lock_exclusive()?;
        Ok(Self(file))
    }

    fn shared(path: &Path) -> io::Result<Self> {
        let file = Self::open(path)?;
        FileExt::lock_shared(&file)?;
        Ok(Self(file))
    }

    fn generation(&self) -> io::Result<u64> {
        let mut file = &self.0;
        let mut content = String::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_string(&mut content)?;
        Ok(content.trim().parse().unwrap_or(0))
    }

    /// Requires the exclusive lock
    fn bump_generation(&self) -> io::Result<u64> {
        let next = self.generation()? + 1;
        let mut file = &self.0;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", next)?;
        file.sync_all()?;
        Ok(next)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

fn lock_image(image: &Mutex<InboxLog>) -> MutexGuard<'_, InboxLog> {
    image.lock().unwrap_or_else(|poisoned| {
        // A panic may have left the image half-applied; replay from disk
        image.clear_poison();
        let mut log = poisoned.into_inner();
        *log = InboxLog::default();
        log
    })
}

/// File-based inbox store using JSONL format
pub struct JsonlStore {
    /// Path to the inbox log
    path: PathBuf,

    /// Sidecar file used for cross-process locking
    lock_path: PathBuf,

    /// Replayed log, also serializing operations within this process
    image: Arc<Mutex<InboxLog>>,
}

impl JsonlStore {
    /// Open (or lazily create) a store at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let lock_path = paths::lock_path_for(&path);

        Ok(Self {
            path,
            lock_path,
            image: Arc::new(Mutex::new(InboxLog::default())),
        })
    }

    /// Open the store at the configured location (~/.courier/inbox.jsonl)
    pub async fn open_default() -> anyhow::Result<Self> {
        let path = crate::config::store_path()?;
        Ok(Self::open(path).await?)
    }

    /// Get the path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&InboxLog) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run(false, move |log, _, _| Ok(f(&*log))).await
    }

    async fn update<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut InboxLog, &Path, &FileLock) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.run(true, f).await
    }

    async fn run<T, F>(&self, exclusive: bool, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut InboxLog, &Path, &FileLock) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        let image = self.image.clone();

        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut log = lock_image(&image);
            let lock = if exclusive {
                FileLock::exclusive(&lock_path)?
            } else {
                FileLock::shared(&lock_path)?
            };

            log.refresh(&path, lock.generation()?)?;
            f(&mut log, &path, &lock)
        })
        .await?
    }
}

#[async_trait]
impl RecordStore for JsonlStore {
    async fn append(&self, sender: &str, body: &str) -> Result<EventRecord, StoreError> {
        let sender = sender.to_string();
        let body = body.to_string();

        let record = self
            .update(move |log, path, _| log.append(path, &sender, &body))
            .await?;
        debug!(sequence = record.sequence, sender = %record.sender, "Record appended");
        Ok(record)
    }

    async fn list_undelivered(&self) -> Result<Vec<EventRecord>, StoreError> {
        self.read(InboxLog::undelivered).await
    }

    async fn mark_delivered(&self, record: &EventRecord) -> Result<(), StoreError> {
        let sequence = record.sequence;
        self.update(move |log, path, _| log.mark_delivered(path, sequence))
            .await
    }

    async fn last(&self) -> Result<Option<EventRecord>, StoreError> {
        self.read(InboxLog::last).await
    }

    async fn compact(&self, retain_delivered: usize) -> Result<usize, StoreError> {
        let removed = self
            .update(move |log, path, lock| log.compact(path, lock, retain_delivered))
            .await?;
        if removed > 0 {
            debug!(removed, retain_delivered, "Compacted inbox log");
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.read(InboxLog::stats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (JsonlStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = JsonlStore::open(temp.path().join("inbox.jsonl"))
            .await
            .unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_sequences() {
        let (store, _temp) = create_test_store().await;

        let a = store.append("+1", "a").await.unwrap();
        let b = store.append("+1", "b").await.unwrap();

        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
        assert!(!a.delivered);
    }

    #[tokio::test]
    async fn test_list_undelivered_in_arrival_order() {
        let (store, _temp) = create_test_store().await;

        for body in ["A", "B", "C"] {
            store.append("+1555", body).await.unwrap();
        }

        let pending = store.list_undelivered().await.unwrap();
        let bodies: Vec<&str> = pending.iter().map(|r| r.body.as_str()).collect();
        assert_eq!(bodies, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent() {
        let (store, _temp) = create_test_store().await;

        let record = store.append("+1555", "hello").await.unwrap();
        store.mark_delivered(&record).await.unwrap();
        store.mark_delivered(&record).await.unwrap();

        assert!(store.list_undelivered().await.unwrap().is_empty());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_mark_unknown_record() {
        let (store, _temp) = create_test_store().await;
        let record = store.append("+1", "x").await.unwrap();

        let ghost = EventRecord {
            sequence: record.sequence + 10,
            ..record
        };
        let result = store.mark_delivered(&ghost).await;
        assert!(matches!(result, Err(StoreError::NotFound(11))));
    }

    #[tokio::test]
    async fn test_corrupt_line_is_skipped_and_kept() {
        let (store, _temp) = create_test_store().await;

        store.append("+1", "first").await.unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
            writeln!(file, "{{not json").unwrap();
        }
        store.append("+1", "second").await.unwrap();

        let pending = store.list_undelivered().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].body, "second");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.corrupt, 1);

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains("{not json"));
    }

    #[tokio::test]
    async fn test_legacy_log_gets_sequences() {
        let (store, _temp) = create_test_store().await;
        std::fs::write(
            store.path(),
            concat!(
                r#"{"from":"+1","body":"old","emitted":true}"#,
                "\n",
                r#"{"from":"+2","body":"pending","emitted":false}"#,
                "\n",
            ),
        )
        .unwrap();

        let pending = store.list_undelivered().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sequence, 2);
        assert_eq!(pending[0].sender, "+2");

        let next = store.append("+3", "new").await.unwrap();
        assert_eq!(next.sequence, 3);
    }

    #[tokio::test]
    async fn test_compact_keeps_undelivered() {
        let (store, _temp) = create_test_store().await;

        let mut records = Vec::new();
        for i in 0..5 {
            records.push(store.append("+1", &format!("m{}", i)).await.unwrap());
        }
        for record in &records[..3] {
            store.mark_delivered(record).await.unwrap();
        }

        let removed = store.compact(1).await.unwrap();
        assert_eq!(removed, 2);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.undelivered, 2);

        // Sequences survive compaction
        let pending = store.list_undelivered().await.unwrap();
        assert_eq!(pending[0].sequence, 4);
        assert_eq!(store.append("+1", "m5").await.unwrap().sequence, 6);
    }

    #[tokio::test]
    async fn test_last_record() {
        let (store, _temp) = create_test_store().await;
        assert!(store.last().await.unwrap().is_none());

        store.append("+1", "a").await.unwrap();
        let b = store.append("+2", "b").await.unwrap();
        store.mark_delivered(&b).await.unwrap();

        let last = store.last().await.unwrap().unwrap();
        assert_eq!(last.body, "b");
        assert!(last.delivered);
    }

    #[tokio::test]
    async fn test_compact_never_reuses_sequences() {
        let (store, _temp) = create_test_store().await;

        for body in ["a", "b"] {
            let record = store.append("+1", body).await.unwrap();
            store.mark_delivered(&record).await.unwrap();
        }

        assert_eq!(store.compact(0).await.unwrap(), 1);
        assert_eq!(store.append("+1", "c").await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_mark_appends_without_rewriting() {
        let (store, _temp) = create_test_store().await;

        let first = store.append("+1", "a").await.unwrap();
        store.append("+1", "b").await.unwrap();
        let before = std::fs::read(store.path()).unwrap();

        store.mark_delivered(&first).await.unwrap();

        let after = std::fs::read(store.path()).unwrap();
        assert!(after.starts_with(&before));
        assert_eq!(&after[before.len()..], b"{\"delivered\":1}\n");

        // Marking again writes nothing
        store.mark_delivered(&first).await.unwrap();
        assert_eq!(std::fs::read(store.path()).unwrap(), after);
    }

    #[tokio::test]
    async fn test_marks_replayed_by_fresh_handle() {
        let (store, _temp) = create_test_store().await;
        let a = store.append("+1", "a").await.unwrap();
        store.append("+1", "b").await.unwrap();
        store.mark_delivered(&a).await.unwrap();

        let reopened = JsonlStore::open(store.path()).await.unwrap();
        let pending = reopened.list_undelivered().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].body, "b");
        assert!(reopened.last().await.unwrap().is_some_and(|r| !r.delivered));
    }

    #[tokio::test]
    async fn test_other_handle_compaction_is_picked_up() {
        let (store, _temp) = create_test_store().await;
        let other = JsonlStore::open(store.path()).await.unwrap();

        for body in ["a", "b", "c"] {
            let record = store.append("+1", body).await.unwrap();
            store.mark_delivered(&record).await.unwrap();
        }
        assert_eq!(other.stats().await.unwrap().delivered, 3);

        assert_eq!(store.compact(0).await.unwrap(), 2);

        let stats = other.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(other.append("+1", "d").await.unwrap().sequence, 4);
        assert_eq!(store.list_undelivered().await.unwrap()[0].body, "d");
    }

    #[tokio::test]
    async fn test_torn_tail_is_isolated() {
        let (store, _temp) = create_test_store().await;
        store.append("+1", "a").await.unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
            file.write_all(br#"{"sender":"+9","bo"#).unwrap();
        }

        let reopened = JsonlStore::open(store.path()).await.unwrap();
        assert_eq!(reopened.list_undelivered().await.unwrap().len(), 1);

        let b = reopened.append("+1", "b").await.unwrap();
        assert_eq!(b.sequence, 2);

        let bodies: Vec<String> = store
            .list_undelivered()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.body)
            .collect();
        assert_eq!(bodies, vec!["a", "b"]);
        assert_eq!(store.stats().await.unwrap().corrupt, 1);
    }

    #[tokio::test]
    async fn test_non_utf8_line_survives_compaction() {
        let (store, _temp) = create_test_store().await;
        let mut content = Vec::new();
        content.extend_from_slice(br#"{"sender":"+1","body":"a","emitted":true,"seq":1}"#);
        content.extend_from_slice(b"\n\xff\xfe raw bytes\n");
        content.extend_from_slice(br#"{"sender":"+1","body":"b","emitted":true,"seq":2}"#);
        content.extend_from_slice(b"\n");
        content.extend_from_slice(br#"{"sender":"+1","body":"c","seq":3}"#);
        content.extend_from_slice(b"\n");
        std::fs::write(store.path(), &content).unwrap();

        assert_eq!(store.compact(0).await.unwrap(), 2);

        let after = std::fs::read(store.path()).unwrap();
        assert!(after.starts_with(b"\xff\xfe raw bytes\n"));
        assert_eq!(store.stats().await.unwrap().corrupt, 1);
        assert_eq!(store.list_undelivered().await.unwrap()[0].sequence, 3);
    }
}
