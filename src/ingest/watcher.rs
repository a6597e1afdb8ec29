//! Inbox log watcher.
//!
//! Receivers may run in a different process than the listener, sharing
//! nothing but the log file. The watcher notices writes to the log and asks
//! the courier to flush, so records appended elsewhere reach the listener
//! without waiting for the next lifecycle signal.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::Courier;

/// Errors that can occur with the watcher
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Store path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// Watches one inbox log file
pub struct StoreWatcher {
    store_path: PathBuf,
    debounce: Duration,
}

impl StoreWatcher {
    pub fn new(store_path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            store_path: store_path.into(),
            debounce,
        }
    }

    /// Start watching; every change to the log triggers `request_flush`
    pub fn spawn(&self, courier: Arc<Courier>) -> Result<WatchHandle, WatcherError> {
        let dir = self
            .store_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| WatcherError::NoParent(self.store_path.clone()))?
            .to_path_buf();
        let file_name = self
            .store_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| WatcherError::NoParent(self.store_path.clone()))?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        // The log is replaced by rename, so watch the directory, not the file
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            let _ = event_tx.send(result);
        })?;
        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!("Watching {} for new records", self.store_path.display());

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Store watcher stopping...");
                        break;
                    }
                    result = event_rx.recv() => match result {
                        Some(Ok(events)) => {
                            if events.iter().any(|event| touches(&event.path, &file_name)) {
                                tracing::debug!("Inbox log changed, requesting flush");
                                courier.request_flush().await;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Watcher error: {:?}", e);
                        }
                        None => {
                            tracing::error!("Watcher channel disconnected");
                            break;
                        }
                    }
                }
            }
        });

        Ok(WatchHandle {
            _debouncer: debouncer,
            stop_tx,
            task,
        })
    }
}

fn touches(path: &Path, file_name: &OsString) -> bool {
    path.file_name() == Some(file_name.as_os_str())
}

/// Handle to control the watcher
pub struct WatchHandle {
    _debouncer: Debouncer<RecommendedWatcher>,
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touches_only_store_file() {
        let name = OsString::from("inbox.jsonl");
        assert!(touches(Path::new("/data/inbox.jsonl"), &name));
        assert!(!touches(Path::new("/data/inbox.jsonl.lock"), &name));
        assert!(!touches(Path::new("/data/.tmpA1b2"), &name));
    }

    #[tokio::test]
    async fn test_bare_file_name_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = crate::core::JsonlStore::open(temp.path().join("inbox.jsonl"))
            .await
            .unwrap();
        let courier = Arc::new(Courier::new(Arc::new(store), &Default::default()));

        let watcher = StoreWatcher::new("inbox.jsonl", Duration::from_millis(10));
        let result = watcher.spawn(courier);
        assert!(matches!(result, Err(WatcherError::NoParent(_))));
    }
}
