//! The journal: sole owner of the in-memory entry collection.
//!
//! Every mutation follows the same sequence. The new collection is computed
//! and installed in memory, the local cache is written, and only then is the
//! remote store told. Remote failures never undo local state. A connectivity
//! failure leaves the journal degraded: offline until the next snapshot
//! arrives, [`Journal::go_online`] is called, or the next entry mutation
//! retries the connection.

use crate::cache::{Cache, ENTRIES_KEY, ORDER_INDEX_KEY, SELECTED_TAG_KEY, SORT_MODE_KEY};
use crate::model::{clean_tags, Entry, EntryId};
use crate::ordering::{self, OrderError, SortMode};
use crate::reconcile;
use crate::remote::{RemoteError, RemoteStore, Subscription};
use crate::tags::{self, TagNode};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum JournalError {
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("id prefix {0} matches more than one entry")]
    AmbiguousId(String),
    #[error("invalid tag path: {0:?}")]
    InvalidTag(String),
    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Fields supplied by the user when recording a dream.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    /// Overrides "now" when backfilling an older dream.
    pub created_at: Option<i64>,
}

type Inbox = Rc<RefCell<VecDeque<Vec<Entry>>>>;

struct RemoteLink {
    store: Box<dyn RemoteStore>,
    owner_id: String,
    online: bool,
    /// Went offline because the store was unreachable, not by request.
    degraded: bool,
    subscription: Option<Subscription>,
    inbox: Inbox,
}

pub struct Journal {
    entries: Vec<Entry>,
    order_index: Vec<EntryId>,
    sort_mode: SortMode,
    selected_tag: Option<String>,
    cache: Cache,
    remote: Option<RemoteLink>,
    /// Local ids replaced by server ids since the journal was opened.
    rekeyed: HashMap<EntryId, EntryId>,
}

impl Journal {
    pub fn open(cache: Cache) -> Self {
        let entries: Vec<Entry> = cache.load(ENTRIES_KEY, Vec::new());
        let order_index: Vec<EntryId> = cache.load(ORDER_INDEX_KEY, Vec::new());
        let selected_tag: Option<String> = cache.load(SELECTED_TAG_KEY, None);
        let sort_mode: SortMode = cache.load(SORT_MODE_KEY, SortMode::default());
        tracing::debug!(entries = entries.len(), %sort_mode, "journal opened");
        Journal {
            entries,
            order_index,
            sort_mode,
            selected_tag,
            cache,
            remote: None,
            rekeyed: HashMap::new(),
        }
    }

    /// Attaches a remote store. Nothing is sent until [`Journal::go_online`].
    pub fn attach_remote(&mut self, store: impl RemoteStore + 'static, owner_id: impl Into<String>) {
        self.remote = Some(RemoteLink {
            store: Box::new(store),
            owner_id: owner_id.into(),
            online: false,
            degraded: false,
            subscription: None,
            inbox: Inbox::default(),
        });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn order_index(&self) -> &[EntryId] {
        &self.order_index
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn selected_tag(&self) -> Option<&str> {
        self.selected_tag.as_deref()
    }

    pub fn is_online(&self) -> bool {
        self.remote.as_ref().is_some_and(|link| link.online)
    }

    /// The id an entry is known by now. Ids handed out while offline are
    /// replaced once the entry reaches the remote store.
    pub fn current_id(&self, id: &str) -> EntryId {
        self.rekeyed.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    /// Exact id, or a prefix matching exactly one entry.
    pub fn resolve(&self, key: &str) -> Result<EntryId, JournalError> {
        if self.get(key).is_some() {
            return Ok(key.to_string());
        }
        let mut matches = self.entries.iter().filter(|e| e.id.starts_with(key));
        match (matches.next(), matches.next()) {
            (Some(e), None) if !key.is_empty() => Ok(e.id.clone()),
            (Some(_), Some(_)) => Err(JournalError::AmbiguousId(key.to_string())),
            _ => Err(JournalError::EntryNotFound(key.to_string())),
        }
    }

    /// Entries under the selected tag, in the current sort mode.
    pub fn visible_entries(&self) -> Vec<Entry> {
        let filtered = match &self.selected_tag {
            Some(tag) => tags::filter_by_tag(&self.entries, tag),
            None => self.entries.clone(),
        };
        ordering::sort_for_mode(&filtered, self.sort_mode, &self.order_index)
    }

    pub fn tag_tree(&self) -> Vec<TagNode> {
        tags::build_hierarchy(&tags::collect_tags(&self.entries), &self.entries)
    }

    pub fn create_entry(&mut self, draft: EntryDraft) -> EntryId {
        self.retry_if_degraded();
        let mut entry = Entry::new(draft.title, draft.description, draft.tags);
        if let Some(created_at) = draft.created_at {
            entry.created_at = created_at;
        }
        entry.is_favorite = draft.is_favorite;
        let top = self.entries.iter().map(Entry::order_key).min().unwrap_or(0);
        entry.display_order = Some(top.saturating_sub(1));
        entry.owner_id = self.remote.as_ref().map(|link| link.owner_id.clone());
        let id = entry.id.clone();

        self.entries.push(entry);
        if !self.order_index.is_empty() {
            self.order_index.insert(0, id.clone());
            self.persist_order();
        }
        self.persist_entries();
        tracing::debug!(%id, "entry created");

        let id = self.upload(&id).unwrap_or(id);
        self.process_snapshots();
        id
    }

    /// Applies `f` to one entry. Id and creation time are fixed; the entry may
    /// be re-keyed by an upload, so the current id is returned.
    pub fn edit_entry<F>(&mut self, id: &str, f: F) -> Result<EntryId, JournalError>
    where
        F: FnOnce(&mut Entry),
    {
        self.retry_if_degraded();
        let id = self.current_id(id);
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| JournalError::EntryNotFound(id.clone()))?;
        let (keep_id, keep_created) = (entry.id.clone(), entry.created_at);
        f(entry);
        entry.id = keep_id;
        entry.created_at = keep_created;
        entry.tags = clean_tags(std::mem::take(&mut entry.tags));
        self.persist_entries();
        let id = self.push_change(&id);
        self.process_snapshots();
        Ok(id)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool, JournalError> {
        let id = self.edit_entry(id, |e| e.is_favorite = !e.is_favorite)?;
        Ok(self.get(&id).is_some_and(|e| e.is_favorite))
    }

    pub fn set_tags(&mut self, id: &str, new_tags: Vec<String>) -> Result<EntryId, JournalError> {
        self.edit_entry(id, |e| e.tags = new_tags)
    }

    pub fn delete_entry(&mut self, id: &str) -> Result<Entry, JournalError> {
        self.retry_if_degraded();
        let id = self.current_id(id);
        let id = id.as_str();
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| JournalError::EntryNotFound(id.to_string()))?;
        let removed = self.entries.remove(pos);
        let before = self.order_index.len();
        self.order_index.retain(|i| i != id);
        if self.order_index.len() != before {
            self.persist_order();
        }
        self.persist_entries();
        tracing::debug!(%id, "entry deleted");

        if !removed.is_local() {
            self.remote_call("delete", |store| store.delete(id));
        }
        self.process_snapshots();
        Ok(removed)
    }

    /// Renames a tag and everything beneath it across the whole journal.
    /// Returns how many entries changed.
    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<usize, JournalError> {
        let old = tags::normalize(old).ok_or_else(|| JournalError::InvalidTag(old.to_string()))?;
        let new = tags::normalize(new).ok_or_else(|| JournalError::InvalidTag(new.to_string()))?;
        self.retry_if_degraded();
        let updated = tags::rename_tag_cascade(&old, &new, &self.entries);
        let changed = self.install_retagged(updated);

        if let Some(selected) = self.selected_tag.take() {
            self.selected_tag = Some(tags::rebase(&selected, &old, &new).unwrap_or(selected));
            self.persist_view();
        }
        tracing::info!(%old, %new, changed, "tag renamed");
        Ok(changed)
    }

    /// Removes a tag and everything beneath it from every entry.
    pub fn remove_tag(&mut self, path: &str) -> Result<usize, JournalError> {
        let path = tags::normalize(path).ok_or_else(|| JournalError::InvalidTag(path.to_string()))?;
        self.retry_if_degraded();
        let updated = tags::remove_tag_cascade(&path, &self.entries);
        let changed = self.install_retagged(updated);
        if self
            .selected_tag
            .as_deref()
            .is_some_and(|selected| tags::is_under(selected, &path))
        {
            self.selected_tag = None;
            self.persist_view();
        }
        tracing::info!(%path, changed, "tag removed");
        Ok(changed)
    }

    fn install_retagged(&mut self, updated: Vec<Entry>) -> usize {
        let changed: Vec<EntryId> = self
            .entries
            .iter()
            .zip(&updated)
            .filter(|(before, after)| before.tags != after.tags)
            .map(|(_, after)| after.id.clone())
            .collect();
        if changed.is_empty() {
            return 0;
        }
        self.entries = updated;
        self.persist_entries();
        for id in &changed {
            self.push_change(id);
        }
        self.process_snapshots();
        changed.len()
    }

    /// Moves the entry shown at `from` to `to` (positions in
    /// [`Journal::visible_entries`]) and switches to manual order.
    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<(), JournalError> {
        let displayed = self.visible_entries();
        let reordered = ordering::move_entry(&displayed, from, to, &self.order_index)?;
        if from == to {
            return Ok(());
        }
        self.order_index = reordered.order_index;
        self.sort_mode = SortMode::Manual;
        self.persist_order();
        self.persist_view();
        tracing::debug!(from, to, "entry moved");
        Ok(())
    }

    pub fn cycle_sort_mode(&mut self) -> SortMode {
        self.set_sort_mode(self.sort_mode.next());
        self.sort_mode
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
        self.persist_view();
    }

    pub fn select_tag(&mut self, tag: Option<&str>) -> Result<(), JournalError> {
        self.selected_tag = match tag {
            Some(raw) => Some(tags::normalize(raw).ok_or_else(|| JournalError::InvalidTag(raw.to_string()))?),
            None => None,
        };
        self.persist_view();
        Ok(())
    }

    /// Fetches the owner's documents, merges them, uploads entries created
    /// offline and subscribes to further changes. Returns whether the journal
    /// ended up online.
    pub fn go_online(&mut self) -> bool {
        let Some(link) = self.remote.as_mut() else {
            return false;
        };
        let snapshot = match link.store.query(&link.owner_id) {
            Ok(docs) => docs,
            Err(err) => {
                link.online = false;
                link.degraded = err.is_unavailable();
                tracing::warn!(%err, "remote unavailable, staying offline");
                return false;
            }
        };
        link.online = true;
        link.degraded = false;
        tracing::info!(owner = %link.owner_id, remote = snapshot.len(), "journal online");
        self.apply_snapshot(snapshot);
        self.upload_pending();
        self.ensure_subscribed();
        self.process_snapshots();
        self.is_online()
    }

    pub fn go_offline(&mut self) {
        if let Some(link) = self.remote.as_mut() {
            link.online = false;
            link.degraded = false;
            if let Some(subscription) = link.subscription.take() {
                subscription.unsubscribe();
            }
            link.inbox.borrow_mut().clear();
        }
    }

    /// Merges a full remote snapshot into the collection and re-persists it.
    pub fn apply_snapshot(&mut self, remote: Vec<Entry>) {
        let merged = reconcile::reconcile_with_aliases(&remote, &self.entries);
        for (local_id, remote_id) in &merged.aliases {
            self.rekey(local_id, remote_id);
        }
        if !merged.aliases.is_empty() {
            self.persist_order();
        }
        self.entries = merged.entries;
        self.persist_entries();
        tracing::debug!(remote = remote.len(), merged = self.entries.len(), "snapshot applied");

        let reconnected = match self.remote.as_mut() {
            Some(link) if !link.online => {
                link.online = true;
                link.degraded = false;
                true
            }
            _ => false,
        };
        if reconnected {
            tracing::info!("remote reachable again");
            self.upload_pending();
        }
    }

    /// Drains snapshots queued by the subscription, oldest first.
    pub fn process_snapshots(&mut self) {
        let Some(inbox) = self.remote.as_ref().map(|link| link.inbox.clone()) else {
            return;
        };
        loop {
            let next = inbox.borrow_mut().pop_front();
            match next {
                Some(snapshot) => self.apply_snapshot(snapshot),
                None => break,
            }
        }
    }

    /// One reconnect attempt before a mutation when an earlier remote call
    /// found the store unreachable.
    fn retry_if_degraded(&mut self) {
        if self.remote.as_ref().is_some_and(|link| link.degraded) {
            tracing::debug!("retrying remote after earlier failure");
            self.go_online();
        }
    }

    fn ensure_subscribed(&mut self) {
        let Some(link) = self.remote.as_mut() else {
            return;
        };
        if link.subscription.is_some() {
            return;
        }
        let inbox = link.inbox.clone();
        let callback = Box::new(move |snapshot: Vec<Entry>| inbox.borrow_mut().push_back(snapshot));
        match link.store.subscribe(&link.owner_id, callback) {
            Ok(subscription) => link.subscription = Some(subscription),
            Err(err) => {
                if err.is_unavailable() {
                    link.online = false;
                    link.degraded = true;
                }
                tracing::warn!(%err, "subscribing to remote changes failed");
            }
        }
    }

    fn upload_pending(&mut self) {
        let pending: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|e| e.is_local())
            .map(|e| e.id.clone())
            .collect();
        for id in pending {
            if self.upload(&id).is_none() && !self.is_online() {
                break;
            }
        }
    }

    /// Sends a locally created entry to the remote store and adopts the id it
    /// was given there.
    fn upload(&mut self, local_id: &str) -> Option<EntryId> {
        let owner_id = self.remote.as_ref()?.owner_id.clone();
        let entry = self.entries.iter_mut().find(|e| e.id == local_id)?;
        entry.owner_id = Some(owner_id);
        let doc = entry.clone();
        let server_id = self.remote_call("add", |store| store.add(&doc))?;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == local_id) {
            entry.id = server_id.clone();
        }
        self.rekey(local_id, &server_id);
        self.persist_entries();
        self.persist_order();
        tracing::debug!(local = %local_id, remote = %server_id, "entry uploaded");
        Some(server_id)
    }

    /// Sends the current state of one entry upstream and returns its id
    /// afterwards.
    fn push_change(&mut self, id: &str) -> EntryId {
        let Some(entry) = self.get(id).cloned() else {
            return id.to_string();
        };
        if entry.is_local() {
            return self.upload(id).unwrap_or(entry.id);
        }
        self.remote_call("update", |store| store.update(&entry));
        entry.id
    }

    /// Runs a remote operation unless offline. Failures are logged and
    /// connectivity failures switch the journal offline.
    fn remote_call<T>(
        &mut self,
        action: &str,
        f: impl FnOnce(&dyn RemoteStore) -> Result<T, RemoteError>,
    ) -> Option<T> {
        let link = self.remote.as_mut()?;
        if !link.online {
            tracing::debug!(action, "offline, remote call skipped");
            return None;
        }
        match f(link.store.as_ref()) {
            Ok(value) => Some(value),
            Err(err) if err.is_unavailable() => {
                link.online = false;
                link.degraded = true;
                tracing::warn!(action, %err, "remote unavailable, working offline");
                None
            }
            Err(err) => {
                tracing::warn!(action, %err, "remote call failed");
                None
            }
        }
    }

    fn rekey(&mut self, from: &str, to: &str) {
        self.rekeyed.insert(from.to_string(), to.to_string());
        if self.order_index.iter().any(|id| id == to) {
            self.order_index.retain(|id| id != from);
        } else {
            for id in self.order_index.iter_mut().filter(|id| *id == from) {
                *id = to.to_string();
            }
        }
    }

    fn persist_entries(&self) {
        self.cache.save(ENTRIES_KEY, &self.entries);
    }

    fn persist_order(&self) {
        self.cache.save(ORDER_INDEX_KEY, &self.order_index);
    }

    fn persist_view(&self) {
        self.cache.save(SORT_MODE_KEY, &self.sort_mode);
        self.cache.save(SELECTED_TAG_KEY, &self.selected_tag);
    }
}
