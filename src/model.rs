use crate::tags;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

pub type EntryId = String;

const LOCAL_ID_PREFIX: &str = "local";
const LOCAL_ID_SEPARATOR: char = '_';

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub title: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Entry {
    /// A fresh entry with a locally generated id, stamped with the current time.
    pub fn new(title: String, description: Option<String>, tags: Vec<String>) -> Self {
        let created_at = now_millis();
        Entry {
            id: generate_local_id(created_at),
            title,
            created_at,
            description,
            is_favorite: false,
            tags: clean_tags(tags),
            display_order: None,
            owner_id: None,
        }
    }

    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    pub fn order_key(&self) -> i64 {
        self.display_order.unwrap_or(0)
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Locally generated ids embed `_`, which server-assigned ids never contain.
pub fn is_local_id(id: &str) -> bool {
    id.contains(LOCAL_ID_SEPARATOR)
}

pub fn generate_local_id(created_at: i64) -> EntryId {
    format!(
        "{LOCAL_ID_PREFIX}{sep}{created_at}{sep}{suffix}",
        sep = LOCAL_ID_SEPARATOR,
        suffix = random_alphanumeric(6)
    )
}

pub fn generate_server_id() -> EntryId {
    random_alphanumeric(20)
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Normalizes tag paths, drops blanks and repeats, keeping first-seen order.
pub fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let Some(tag) = tags::normalize(tag.trim()) else {
            continue;
        };
        if !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

#[cfg(test)]
pub(crate) fn entry(id: &str, title: &str, created_at: i64) -> Entry {
    Entry {
        id: id.to_string(),
        title: title.to_string(),
        created_at,
        description: None,
        is_favorite: false,
        tags: Vec::new(),
        display_order: None,
        owner_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_distinguishable_from_server_ids() {
        let local = generate_local_id(1_700_000_000_000);
        assert!(local.starts_with("local_1700000000000_"));
        assert!(is_local_id(&local));
        for _ in 0..32 {
            assert!(!is_local_id(&generate_server_id()));
        }
    }

    #[test]
    fn new_entry_filters_blank_tags() {
        let e = Entry::new(
            "Flying".into(),
            None,
            vec![" People/Joe ".into(), "".into(), "  ".into(), "People/Joe".into()],
        );
        assert_eq!(e.tags, vec!["People/Joe".to_string()]);
        assert!(e.is_local());
        assert!(e.owner_id.is_none());
    }

    #[test]
    fn tags_are_stored_in_normalized_form() {
        let cleaned = clean_tags(vec![
            "People//Joe".into(),
            "/Places/Home/".into(),
            "People/Joe".into(),
            "///".into(),
        ]);
        assert_eq!(cleaned, vec!["People/Joe", "Places/Home"]);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let mut e = entry("abc", "T", 1000);
        e.display_order = Some(3);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"createdAt\":1000"));
        assert!(json.contains("\"displayOrder\":3"));
        assert!(json.contains("\"isFavorite\":false"));
        assert!(!json.contains("ownerId"));
    }

    #[test]
    fn deserializes_sparse_documents() {
        let e: Entry = serde_json::from_str(r#"{"id":"x","title":"T","createdAt":5}"#).unwrap();
        assert!(e.tags.is_empty());
        assert_eq!(e.order_key(), 0);
        assert!(!e.is_favorite);
    }
}
