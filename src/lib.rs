//! Dream journal data layer: hierarchical tags, manual ordering, and
//! reconciliation between a local cache and a remote document store.

pub mod cache;
pub mod config;
pub mod journal;
pub mod logging;
pub mod model;
pub mod ordering;
pub mod reconcile;
pub mod remote;
pub mod storage;
pub mod tags;

pub use journal::{EntryDraft, Journal, JournalError};
pub use model::{Entry, EntryId};
