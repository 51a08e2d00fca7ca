//! Merging a remote snapshot with the locally cached collection.
//!
//! The remote copy is authoritative for every id it knows. Local entries only
//! survive the merge when they were created offline (locally generated id)
//! and nothing in the snapshot looks like the same dream: same title, created
//! within [`MATCH_TOLERANCE_MS`] of each other. Two distinct dreams with the
//! same title recorded seconds apart collapse into one; that is accepted.

use crate::model::{Entry, EntryId};
use std::collections::HashSet;

pub const MATCH_TOLERANCE_MS: i64 = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub entries: Vec<Entry>,
    /// `(local_id, remote_id)` for local entries absorbed by a remote match.
    pub aliases: Vec<(EntryId, EntryId)>,
}

pub fn matches_remote(local: &Entry, remote: &Entry) -> bool {
    local.title == remote.title
        && local.created_at.abs_diff(remote.created_at) < MATCH_TOLERANCE_MS.unsigned_abs()
}

pub fn reconcile(remote: &[Entry], local: &[Entry]) -> Vec<Entry> {
    reconcile_with_aliases(remote, local).entries
}

pub fn reconcile_with_aliases(remote: &[Entry], local: &[Entry]) -> Reconciled {
    let mut merged = Vec::with_capacity(remote.len() + local.len());
    let mut seen: HashSet<&str> = HashSet::new();
    for entry in remote {
        if seen.insert(entry.id.as_str()) {
            merged.push(entry.clone());
        } else {
            tracing::warn!(id = %entry.id, "remote snapshot repeats an id, keeping the first");
        }
    }

    let mut aliases = Vec::new();
    for entry in local {
        if !entry.is_local() || seen.contains(entry.id.as_str()) {
            continue;
        }
        if let Some(twin) = remote.iter().find(|r| matches_remote(entry, r)) {
            tracing::debug!(local = %entry.id, remote = %twin.id, "local entry matched remote copy");
            aliases.push((entry.id.clone(), twin.id.clone()));
            continue;
        }
        seen.insert(entry.id.as_str());
        merged.push(entry.clone());
    }

    merged.sort_by(|a, b| {
        a.order_key()
            .cmp(&b.order_key())
            .then_with(|| a.id.cmp(&b.id))
    });
    Reconciled {
        entries: merged,
        aliases,
    }
}
