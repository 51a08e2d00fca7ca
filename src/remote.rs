//! Remote document store.
//!
//! The journal treats the remote side as an unordered set of documents keyed
//! by id, scoped by owner. Subscribers receive the owner's full document set
//! once on subscription and again after every change; there are no deltas.
//! Everything here is single-threaded, so handles share state through
//! `Rc<RefCell<_>>` and callbacks run inline on the writer's stack.

use crate::model::{generate_server_id, Entry, EntryId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

pub type SnapshotCallback = Box<dyn FnMut(Vec<Entry>)>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("remote document not found: {0}")]
    NotFound(EntryId),
    #[error("remote document {id} is corrupt: {reason}")]
    Corrupt { id: EntryId, reason: String },
}

impl RemoteError {
    /// Connectivity failures put the journal into offline mode; the rest are
    /// per-document problems.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

pub trait RemoteStore {
    fn query(&self, owner_id: &str) -> Result<Vec<Entry>, RemoteError>;
    /// Stores a copy of `entry` under a new store-assigned id and returns it.
    fn add(&self, entry: &Entry) -> Result<EntryId, RemoteError>;
    fn update(&self, entry: &Entry) -> Result<(), RemoteError>;
    fn delete(&self, id: &str) -> Result<(), RemoteError>;
    fn subscribe(
        &self,
        owner_id: &str,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, RemoteError>;
}

struct Listener {
    id: u64,
    owner_id: String,
    callback: SnapshotCallback,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    active: Vec<Listener>,
    notifying: bool,
    cancelled: HashSet<u64>,
}

impl Listeners {
    fn remove(&mut self, id: u64) {
        let before = self.active.len();
        self.active.retain(|l| l.id != id);
        if self.active.len() == before && self.notifying {
            self.cancelled.insert(id);
        }
    }
}

#[derive(Clone, Default)]
struct Registry(Rc<RefCell<Listeners>>);

impl Registry {
    fn register(&self, owner_id: &str, callback: SnapshotCallback) -> Subscription {
        let mut listeners = self.0.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.active.push(Listener {
            id,
            owner_id: owner_id.to_string(),
            callback,
        });
        Subscription {
            registry: Rc::downgrade(&self.0),
            id,
        }
    }

    fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self
            .0
            .borrow()
            .active
            .iter()
            .map(|l| l.owner_id.clone())
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }

    /// Runs every listener with its owner's snapshot. Listeners are detached
    /// while they run so a callback may subscribe or unsubscribe freely.
    fn notify(&self, snapshots: &BTreeMap<String, Vec<Entry>>) {
        let mut running = {
            let mut listeners = self.0.borrow_mut();
            listeners.notifying = true;
            std::mem::take(&mut listeners.active)
        };
        for listener in running.iter_mut() {
            if let Some(snapshot) = snapshots.get(&listener.owner_id) {
                (listener.callback)(snapshot.clone());
            }
        }
        let mut listeners = self.0.borrow_mut();
        let cancelled = std::mem::take(&mut listeners.cancelled);
        running.retain(|l| !cancelled.contains(&l.id));
        let added = std::mem::replace(&mut listeners.active, running);
        listeners.active.extend(added);
        listeners.notifying = false;
    }
}

/// Handle for a live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<RefCell<Listeners>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut listeners) = registry.try_borrow_mut() {
                listeners.remove(self.id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn owned_by<'a>(docs: impl IntoIterator<Item = &'a Entry>, owner_id: &str) -> Vec<Entry> {
    docs.into_iter()
        .filter(|e| e.owner_id.as_deref() == Some(owner_id))
        .cloned()
        .collect()
}

struct MemoryDocs {
    docs: BTreeMap<EntryId, Entry>,
    available: bool,
}

/// Shared in-process store. Clones are handles onto the same documents, which
/// lets tests play a second device or take the store offline.
#[derive(Clone)]
pub struct MemoryRemote {
    docs: Rc<RefCell<MemoryDocs>>,
    listeners: Registry,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        MemoryRemote {
            docs: Rc::new(RefCell::new(MemoryDocs {
                docs: BTreeMap::new(),
                available: true,
            })),
            listeners: Registry::default(),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.docs.borrow_mut().available = available;
    }

    pub fn documents(&self) -> Vec<Entry> {
        self.docs.borrow().docs.values().cloned().collect()
    }

    /// Writes a document as another client would, keeping its id.
    pub fn put_external(&self, entry: Entry) {
        self.docs
            .borrow_mut()
            .docs
            .insert(entry.id.clone(), entry);
        self.broadcast();
    }

    pub fn remove_external(&self, id: &str) {
        self.docs.borrow_mut().docs.remove(id);
        self.broadcast();
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.docs.borrow().available {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory store switched off".into()))
        }
    }

    fn broadcast(&self) {
        if !self.docs.borrow().available {
            return;
        }
        let snapshots: BTreeMap<String, Vec<Entry>> = {
            let docs = self.docs.borrow();
            self.listeners
                .owners()
                .into_iter()
                .map(|owner| {
                    let snapshot = owned_by(docs.docs.values(), &owner);
                    (owner, snapshot)
                })
                .collect()
        };
        self.listeners.notify(&snapshots);
    }
}

impl RemoteStore for MemoryRemote {
    fn query(&self, owner_id: &str) -> Result<Vec<Entry>, RemoteError> {
        self.check_available()?;
        Ok(owned_by(self.docs.borrow().docs.values(), owner_id))
    }

    fn add(&self, entry: &Entry) -> Result<EntryId, RemoteError> {
        self.check_available()?;
        let id = generate_server_id();
        let doc = Entry {
            id: id.clone(),
            ..entry.clone()
        };
        self.docs.borrow_mut().docs.insert(id.clone(), doc);
        self.broadcast();
        Ok(id)
    }

    fn update(&self, entry: &Entry) -> Result<(), RemoteError> {
        self.check_available()?;
        {
            let mut docs = self.docs.borrow_mut();
            let slot = docs
                .docs
                .get_mut(&entry.id)
                .ok_or_else(|| RemoteError::NotFound(entry.id.clone()))?;
            *slot = entry.clone();
        }
        self.broadcast();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.check_available()?;
        self.docs.borrow_mut().docs.remove(id);
        self.broadcast();
        Ok(())
    }

    fn subscribe(
        &self,
        owner_id: &str,
        mut on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, RemoteError> {
        let initial = self.query(owner_id)?;
        on_snapshot(initial);
        Ok(self.listeners.register(owner_id, on_snapshot))
    }
}

/// Documents stored as `<id>.json` files under a directory, such as a folder
/// kept in sync between machines by a file-sync service. Subscribers see the
/// writes made through handles in this process.
#[derive(Clone)]
pub struct DirRemote {
    root: PathBuf,
    listeners: Registry,
}

fn unavailable(path: &Path, err: io::Error) -> RemoteError {
    RemoteError::Unavailable(format!("{}: {err}", path.display()))
}

impl DirRemote {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| unavailable(&root, err))?;
        Ok(DirRemote {
            root,
            listeners: Registry::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn check_root(&self) -> Result<(), RemoteError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(RemoteError::Unavailable(format!(
                "{} is not reachable",
                self.root.display()
            )))
        }
    }

    fn write_doc(&self, entry: &Entry) -> Result<(), RemoteError> {
        let path = self.doc_path(&entry.id);
        let body = serde_json::to_string_pretty(entry).map_err(|err| RemoteError::Corrupt {
            id: entry.id.clone(),
            reason: err.to_string(),
        })?;
        fs::write(&path, body).map_err(|err| unavailable(&path, err))
    }

    fn read_all(&self) -> Result<Vec<Entry>, RemoteError> {
        self.check_root()?;
        let mut docs = Vec::new();
        let dir = fs::read_dir(&self.root).map_err(|err| unavailable(&self.root, err))?;
        for item in dir {
            let path = item.map_err(|err| unavailable(&self.root, err))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|err| unavailable(&path, err))?;
            match serde_json::from_str::<Entry>(&raw) {
                Ok(entry) => docs.push(entry),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable remote document");
                }
            }
        }
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    fn broadcast(&self) {
        let owners = self.listeners.owners();
        if owners.is_empty() {
            return;
        }
        let docs = match self.read_all() {
            Ok(docs) => docs,
            Err(err) => {
                tracing::warn!(%err, "could not refresh remote snapshot");
                return;
            }
        };
        let snapshots: BTreeMap<String, Vec<Entry>> = owners
            .into_iter()
            .map(|owner| {
                let snapshot = owned_by(&docs, &owner);
                (owner, snapshot)
            })
            .collect();
        self.listeners.notify(&snapshots);
    }
}

impl RemoteStore for DirRemote {
    fn query(&self, owner_id: &str) -> Result<Vec<Entry>, RemoteError> {
        Ok(owned_by(&self.read_all()?, owner_id))
    }

    fn add(&self, entry: &Entry) -> Result<EntryId, RemoteError> {
        self.check_root()?;
        let id = generate_server_id();
        self.write_doc(&Entry {
            id: id.clone(),
            ..entry.clone()
        })?;
        self.broadcast();
        Ok(id)
    }

    fn update(&self, entry: &Entry) -> Result<(), RemoteError> {
        self.check_root()?;
        if !self.doc_path(&entry.id).exists() {
            return Err(RemoteError::NotFound(entry.id.clone()));
        }
        self.write_doc(entry)?;
        self.broadcast();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.check_root()?;
        let path = self.doc_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(unavailable(&path, err)),
        }
        self.broadcast();
        Ok(())
    }

    fn subscribe(
        &self,
        owner_id: &str,
        mut on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, RemoteError> {
        on_snapshot(self.query(owner_id)?);
        Ok(self.listeners.register(owner_id, on_snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry;

    fn owned(id: &str, title: &str, owner: &str) -> Entry {
        Entry {
            owner_id: Some(owner.to_string()),
            ..entry(id, title, 1)
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<Vec<Entry>>>>, SnapshotCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |snap| sink.borrow_mut().push(snap)))
    }

    #[test]
    fn memory_remote_scopes_by_owner_and_assigns_ids() {
        let remote = MemoryRemote::new();
        let id = remote.add(&owned("local_1_x", "T", "me")).unwrap();
        remote.add(&owned("local_2_y", "U", "you")).unwrap();
        assert!(!crate::model::is_local_id(&id));
        let mine = remote.query("me").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, id);
    }

    #[test]
    fn subscribers_get_initial_and_full_snapshots() {
        let remote = MemoryRemote::new();
        remote.put_external(owned("a", "A", "me"));
        let (seen, callback) = recorder();
        let sub = remote.subscribe("me", callback).unwrap();
        remote.put_external(owned("b", "B", "me"));
        remote.put_external(owned("c", "C", "other"));
        let seen_now = seen.borrow().clone();
        assert_eq!(seen_now.len(), 3);
        assert_eq!(seen_now[0].len(), 1);
        assert_eq!(seen_now[1].len(), 2);
        assert_eq!(seen_now[2].len(), 2);
        drop(sub);
        remote.put_external(owned("d", "D", "me"));
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn unavailable_store_rejects_calls() {
        let remote = MemoryRemote::new();
        remote.set_available(false);
        let err = remote.query("me").unwrap_err();
        assert!(err.is_unavailable());
        assert!(remote.add(&owned("local_1_x", "T", "me")).is_err());
    }

    #[test]
    fn update_of_unknown_document_is_not_found() {
        let remote = MemoryRemote::new();
        let err = remote.update(&owned("zzz", "T", "me")).unwrap_err();
        assert_eq!(err, RemoteError::NotFound("zzz".into()));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn dir_remote_persists_documents_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let remote = DirRemote::open(dir.path().join("remote")).unwrap();
        let (seen, callback) = recorder();
        let _sub = remote.subscribe("me", callback).unwrap();
        let id = remote.add(&owned("local_1_x", "T", "me")).unwrap();
        assert!(remote.root().join(format!("{id}.json")).exists());

        let mut doc = remote.query("me").unwrap().remove(0);
        doc.title = "Renamed".into();
        remote.update(&doc).unwrap();
        remote.delete(&id).unwrap();
        remote.delete(&id).unwrap();

        let snapshots = seen.borrow();
        let sizes: Vec<usize> = snapshots.iter().map(|s| s.len()).collect();
        assert_eq!(sizes, vec![0, 1, 1, 0, 0]);
        assert_eq!(snapshots[2][0].title, "Renamed");
    }

    #[test]
    fn dir_remote_reports_missing_root_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("remote");
        let remote = DirRemote::open(&root).unwrap();
        fs::remove_dir_all(&root).unwrap();
        assert!(remote.query("me").unwrap_err().is_unavailable());
    }
}
