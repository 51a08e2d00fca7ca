use dreamlog::cache::Cache;
use dreamlog::config::{Config, Overrides};
use dreamlog::journal::{EntryDraft, Journal};
use dreamlog::model::{Entry, EntryId};
use dreamlog::ordering::SortMode;
use dreamlog::remote::DirRemote;
use dreamlog::storage::{init_project_journal, JournalScope};
use dreamlog::tags::{self, TagNode};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::env;

const DATE_FORMAT: &str = "%Y.%m.%d@%H:%M";

pub fn init() -> Result<()> {
    let location = init_project_journal()?;
    println!("Initialized journal at {}", location.path.display());
    Ok(())
}

pub fn list(overrides: &Overrides, tag: Option<String>, favorites: bool) -> Result<()> {
    let tag = tag.as_deref().map(parse_tag).transpose()?;
    let (journal, config) = open_journal(overrides)?;
    println!(
        "Journal: {} ({}, {} order{})",
        config.location.path.display(),
        match config.location.scope {
            JournalScope::Project => "project",
            JournalScope::Global => "global",
        },
        journal.sort_mode(),
        journal
            .selected_tag()
            .map(|t| format!(", filtered by {t}"))
            .unwrap_or_default()
    );
    let shown: Vec<(usize, Entry)> = journal
        .visible_entries()
        .into_iter()
        .enumerate()
        .filter(|(_, e)| !favorites || e.is_favorite)
        .filter(|(_, e)| match &tag {
            Some(path) => e.tags.iter().any(|t| tags::is_under(t, path)),
            None => true,
        })
        .collect();
    if shown.is_empty() {
        println!("  (empty)");
    }
    for (pos, entry) in &shown {
        print_entry(pos + 1, entry);
    }
    Ok(())
}

pub fn add(
    overrides: &Overrides,
    title: String,
    description: Option<String>,
    tags: Vec<String>,
    favorite: bool,
    at: Option<String>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let (mut journal, _) = open_journal(overrides)?;
    let created_at = parse_at(at.as_deref())?.map(|dt| dt.timestamp_millis());
    let id = journal.create_entry(EntryDraft {
        title,
        description,
        tags,
        is_favorite: favorite,
        created_at,
    });
    println!("Added entry {}", id);
    Ok(())
}

pub fn edit(
    overrides: &Overrides,
    key: String,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    clear_tags: bool,
) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let id = resolve_entry(&journal, &key)?;
    let id = journal
        .edit_entry(&id, |entry| {
            if let Some(t) = title {
                entry.title = t;
            }
            if let Some(d) = description {
                entry.description = Some(d);
            }
            if clear_tags {
                entry.tags.clear();
            }
            if !tags.is_empty() {
                entry.tags = tags;
            }
        })
        .with_context(|| format!("editing entry {}", key))?;
    println!("Updated entry {}", id);
    Ok(())
}

pub fn favorite(overrides: &Overrides, key: String) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let id = resolve_entry(&journal, &key)?;
    let now_favorite = journal
        .toggle_favorite(&id)
        .with_context(|| format!("toggling favorite on {}", key))?;
    println!(
        "{} {}",
        if now_favorite { "Starred" } else { "Unstarred" },
        id
    );
    Ok(())
}

pub fn remove(overrides: &Overrides, key: String) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let id = resolve_entry(&journal, &key)?;
    let removed = journal
        .delete_entry(&id)
        .with_context(|| format!("deleting entry {}", key))?;
    println!("Deleted \"{}\"", removed.title);
    Ok(())
}

pub fn tags(overrides: &Overrides) -> Result<()> {
    let (journal, _) = open_journal(overrides)?;
    let tree = journal.tag_tree();
    if tree.is_empty() {
        println!("(no tags)");
    }
    for node in &tree {
        print_tag(node, 0);
    }
    Ok(())
}

pub fn rename_tag(overrides: &Overrides, old: String, new: String) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let changed = journal
        .rename_tag(&old, &new)
        .with_context(|| format!("renaming tag {} to {}", old, new))?;
    println!("Renamed {} to {} on {} entries", old, new, changed);
    Ok(())
}

pub fn drop_tag(overrides: &Overrides, path: String) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let changed = journal
        .remove_tag(&path)
        .with_context(|| format!("removing tag {}", path))?;
    println!("Removed {} from {} entries", path, changed);
    Ok(())
}

pub fn move_entry(overrides: &Overrides, from: usize, to: usize) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let from_idx = from.checked_sub(1).ok_or_else(|| anyhow!("positions start at 1"))?;
    let to_idx = to.checked_sub(1).ok_or_else(|| anyhow!("positions start at 1"))?;
    journal
        .move_entry(from_idx, to_idx)
        .with_context(|| format!("moving entry {} to {}", from, to))?;
    println!("Moved entry {} to {}", from, to);
    Ok(())
}

pub fn sort(overrides: &Overrides, mode: Option<String>) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    let mode = match mode {
        Some(raw) => {
            let mode: SortMode = raw.parse().map_err(|e: String| anyhow!(e))?;
            journal.set_sort_mode(mode);
            mode
        }
        None => journal.cycle_sort_mode(),
    };
    println!("Sorting: {}", mode);
    Ok(())
}

pub fn filter(overrides: &Overrides, tag: Option<String>) -> Result<()> {
    let (mut journal, _) = open_journal(overrides)?;
    journal
        .select_tag(tag.as_deref())
        .context("setting tag filter")?;
    match journal.selected_tag() {
        Some(t) => println!("Filtering by {}", t),
        None => println!("Filter cleared"),
    }
    Ok(())
}

pub fn sync(overrides: &Overrides) -> Result<()> {
    let (mut journal, config) = open_journal(overrides)?;
    let Some((dir, owner)) = config.remote() else {
        bail!("no remote configured (use --remote-dir and --owner, or config.yml)");
    };
    if !journal.is_online() && !journal.go_online() {
        bail!("remote store at {} is unreachable", dir.display());
    }
    let pending = journal.entries().iter().filter(|e| e.is_local()).count();
    println!(
        "Synced {} entries for {} ({} waiting for upload)",
        journal.entries().len(),
        owner,
        pending
    );
    Ok(())
}

fn open_journal(overrides: &Overrides) -> Result<(Journal, Config)> {
    let cwd = env::current_dir()?;
    let config = Config::load(&cwd, overrides.clone())?;
    let mut journal = Journal::open(Cache::in_dir(&config.location.path));
    if let Some((dir, owner)) = config.remote() {
        match DirRemote::open(dir) {
            Ok(remote) => {
                journal.attach_remote(remote, owner);
                journal.go_online();
            }
            Err(err) => tracing::warn!(%err, "remote store unavailable, working offline"),
        }
    }
    Ok((journal, config))
}

fn parse_tag(raw: &str) -> Result<String> {
    tags::normalize(raw).ok_or_else(|| anyhow!("invalid tag path: {:?}", raw))
}

/// A 1-based list position, an id, or a unique id prefix.
fn resolve_entry(journal: &Journal, key: &str) -> Result<EntryId> {
    if let Ok(pos) = key.parse::<usize>() {
        let visible = journal.visible_entries();
        if let Some(entry) = pos.checked_sub(1).and_then(|i| visible.get(i)) {
            return Ok(entry.id.clone());
        }
    }
    Ok(journal.resolve(key)?)
}

fn parse_at(input: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let raw = match input {
        Some(r) => r.trim(),
        None => return Ok(None),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let dt = NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| anyhow!("invalid date format (use YYYY.MM.DD@hh:mm): {}", raw))?;
    Ok(Some(Utc.from_utc_datetime(&dt)))
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_entry(pos: usize, entry: &Entry) {
    println!(
        "{:>3}. {}{}",
        pos,
        entry.title,
        if entry.is_favorite { " *" } else { "" }
    );
    println!("     {} [{}]", format_millis(entry.created_at), entry.id);
    if let Some(description) = &entry.description {
        println!("     {}", description);
    }
    if !entry.tags.is_empty() {
        println!("     tags: {}", entry.tags.join(", "));
    }
}

fn print_tag(node: &TagNode, depth: usize) {
    println!("{}{} ({})", "  ".repeat(depth), node.name, node.count);
    for child in &node.children {
        print_tag(child, depth + 1);
    }
}
