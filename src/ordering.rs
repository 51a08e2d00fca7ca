//! Display ordering for the journal.
//!
//! Two order representations coexist: the coarse per-entry `display_order`
//! and the local `order_index` list of ids written by manual moves. When the
//! index is non-empty it wins; `display_order` only places entries the index
//! does not know about.

use crate::model::{Entry, EntryId};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    #[default]
    Manual,
    NewestFirst,
    OldestFirst,
}

impl SortMode {
    /// manual -> newest-first -> oldest-first -> manual
    pub fn next(self) -> Self {
        match self {
            SortMode::Manual => SortMode::NewestFirst,
            SortMode::NewestFirst => SortMode::OldestFirst,
            SortMode::OldestFirst => SortMode::Manual,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortMode::Manual => "manual",
            SortMode::NewestFirst => "newest",
            SortMode::OldestFirst => "oldest",
        })
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(SortMode::Manual),
            "newest" | "newest-first" => Ok(SortMode::NewestFirst),
            "oldest" | "oldest-first" => Ok(SortMode::OldestFirst),
            other => Err(format!("unknown sort mode: {other}")),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum OrderError {
    #[error("index {index} out of range for {len} displayed entries")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reordered {
    pub entries: Vec<Entry>,
    pub order_index: Vec<EntryId>,
}

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b").expect("valid iso date pattern")
});
static US_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid us date pattern")
});

fn title_date(title: &str) -> Option<NaiveDate> {
    let from_parts = |y: &str, m: &str, d: &str| {
        NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
    };
    if let Some(date) = ISO_DATE
        .captures(title)
        .and_then(|c| from_parts(&c[1], &c[2], &c[3]))
    {
        return Some(date);
    }
    US_DATE
        .captures(title)
        .and_then(|c| from_parts(&c[3], &c[1], &c[2]))
}

/// Sort key for the timestamp modes: a date written in the title when one
/// parses, otherwise `created_at`.
pub fn effective_date(entry: &Entry) -> i64 {
    title_date(&entry.title)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(entry.created_at)
}

/// `display_order` ascending, missing as 0, ties newest first.
pub fn cmp_display_order(a: &Entry, b: &Entry) -> Ordering {
    a.order_key()
        .cmp(&b.order_key())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

pub fn sort_for_mode(entries: &[Entry], mode: SortMode, order_index: &[EntryId]) -> Vec<Entry> {
    let mut sorted = entries.to_vec();
    match mode {
        SortMode::NewestFirst => sorted.sort_by_key(|e| std::cmp::Reverse(effective_date(e))),
        SortMode::OldestFirst => sorted.sort_by_key(effective_date),
        SortMode::Manual if order_index.is_empty() => sorted.sort_by(cmp_display_order),
        SortMode::Manual => {
            let positions: HashMap<&str, usize> = order_index
                .iter()
                .enumerate()
                .rev()
                .map(|(pos, id)| (id.as_str(), pos))
                .collect();
            sorted.sort_by(|a, b| {
                match (positions.get(a.id.as_str()), positions.get(b.id.as_str())) {
                    (Some(pa), Some(pb)) => pa.cmp(pb),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => cmp_display_order(a, b),
                }
            });
        }
    }
    sorted
}

/// Relocates one entry of the displayed list and returns the new full index.
pub fn move_entry(
    displayed: &[Entry],
    from: usize,
    to: usize,
    order_index: &[EntryId],
) -> Result<Reordered, OrderError> {
    let len = displayed.len();
    for index in [from, to] {
        if index >= len {
            return Err(OrderError::OutOfRange { index, len });
        }
    }
    if from == to {
        return Ok(Reordered {
            entries: displayed.to_vec(),
            order_index: order_index.to_vec(),
        });
    }
    let mut entries = displayed.to_vec();
    let moved = entries.remove(from);
    entries.insert(to, moved);
    let order_index = entries.iter().map(|e| e.id.clone()).collect();
    Ok(Reordered {
        entries,
        order_index,
    })
}
