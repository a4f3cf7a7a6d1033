//! Persisted key/value medium shared by every open view of a session.
//!
//! Reads are synchronous and never block on the network. Each write reports
//! which view performed it, so subscribers can tell their own echoes from
//! changes made elsewhere. A change made by another process carries no
//! origin.
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify::{Event, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const IDENTITY_KEY: &str = "portal.current_user";
pub const TOKEN_KEY: &str = "portal.token";

const SESSION_FILE: &str = "session.json";
const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub origin: Option<Uuid>,
}

/// A single entry change; `None` removes the entry.
pub type Change<'a> = (&'a str, Option<&'a str>);

pub trait SessionStorage: Send + Sync {
    /// Reads every key from one consistent view of the entries.
    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>>;

    fn get_item(&self, key: &str) -> Option<String> {
        self.get_items(&[key]).pop().flatten()
    }

    /// Applies every change or none of them and reports whether anything
    /// changed. Only entries whose value actually changes produce a
    /// [`StorageEvent`].
    fn apply(&self, changes: &[Change<'_>], origin: Uuid) -> anyhow::Result<bool>;

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

fn apply_changes(entries: &mut HashMap<String, String>, changes: &[Change<'_>]) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, value) in changes {
        let previous = match value {
            Some(value) => entries.insert(key.to_string(), value.to_string()),
            None => entries.remove(*key),
        };
        if previous.as_deref() != *value {
            changed.push(key.to_string());
        }
    }
    changed
}

fn publish(events: &broadcast::Sender<StorageEvent>, keys: Vec<String>, origin: Option<Uuid>) {
    for key in keys {
        // No receivers is fine.
        let _ = events.send(StorageEvent { key, origin });
    }
}

/// In-process storage. Clones share the same entries and event channel.
#[derive(Clone)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage for MemoryStorage {
    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>> {
        let entries = self.entries.lock();
        keys.iter().map(|key| entries.get(*key).cloned()).collect()
    }

    fn apply(&self, changes: &[Change<'_>], origin: Uuid) -> anyhow::Result<bool> {
        let changed = apply_changes(&mut self.entries.lock(), changes);
        let any = !changed.is_empty();
        publish(&self.events, changed, Some(origin));
        Ok(any)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

/// Storage backed by a JSON file, shared by every process using the same
/// state directory. A poll watcher turns writes from other processes into
/// events.
pub struct FileStorage {
    path: PathBuf,
    // Entries as last seen by this process, used to diff external writes.
    seen: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
    _watcher: PollWatcher,
}

impl FileStorage {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create state directory {}", dir.display()))?;
        let path = dir.join(SESSION_FILE);
        let seen = Arc::new(Mutex::new(read_entries(&path)));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let config = notify::Config::default()
            .with_poll_interval(Duration::from_millis(500))
            .with_compare_contents(true);
        let watch_path = path.clone();
        let watch_seen = Arc::clone(&seen);
        let watch_events = events.clone();
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| {
                if res.is_ok() {
                    reconcile(&watch_path, &watch_seen, &watch_events);
                }
            },
            config,
        )
        .context("create session file watcher")?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watch {}", dir.display()))?;

        Ok(Self {
            path,
            seen,
            events,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileStorage {
    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>> {
        let mut entries = read_entries(&self.path);
        keys.iter().map(|key| entries.remove(*key)).collect()
    }

    fn apply(&self, changes: &[Change<'_>], origin: Uuid) -> anyhow::Result<bool> {
        let mut seen = self.seen.lock();
        // Last writer wins: start from what is on disk now.
        let mut entries = read_entries(&self.path);
        let changed = apply_changes(&mut entries, changes);
        if changed.is_empty() {
            return Ok(false);
        }
        write_entries(&self.path, &entries)?;
        *seen = entries;
        drop(seen);
        publish(&self.events, changed, Some(origin));
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

fn read_entries(path: &Path) -> HashMap<String, String> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "session file unreadable");
            return HashMap::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "session file corrupt, ignoring");
            HashMap::new()
        }
    }
}

fn write_entries(path: &Path, entries: &HashMap<String, String>) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(entries)?;
    std::fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn reconcile(
    path: &Path,
    seen: &Mutex<HashMap<String, String>>,
    events: &broadcast::Sender<StorageEvent>,
) {
    let current = read_entries(path);
    let mut seen = seen.lock();
    let keys: BTreeSet<&String> = seen.keys().chain(current.keys()).collect();
    let changed: Vec<String> = keys
        .into_iter()
        .filter(|key| seen.get(*key) != current.get(*key))
        .cloned()
        .collect();
    if changed.is_empty() {
        return;
    }
    *seen = current;
    drop(seen);
    tracing::debug!(keys = ?changed, "session storage changed externally");
    publish(events, changed, None);
}
