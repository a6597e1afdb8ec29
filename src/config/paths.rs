//! Canonical paths for the courier inbox.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `$COURIER_HOME/inbox.jsonl` | shared | Durable inbox log |
//! | `$COURIER_HOME/inbox.jsonl.lock` | shared | Cross-process advisory lock |

use std::path::{Path, PathBuf};

/// File name of the inbox log inside the courier home
pub const STORE_FILE_NAME: &str = "inbox.jsonl";

/// Suffix appended to the log path to form its lock file
pub const LOCK_SUFFIX: &str = ".lock";

/// Default inbox log location for a given home
pub fn default_store(home: &Path) -> PathBuf {
    home.join(STORE_FILE_NAME)
}

/// Lock file guarding the log at `store`
pub fn lock_path_for(store: &Path) -> PathBuf {
    let mut name = store
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| STORE_FILE_NAME.into());
    name.push(LOCK_SUFFIX);
    store.with_file_name(name)
}
