use dreamlog::cache::{Cache, MemoryStore};
use dreamlog::model::is_local_id;
use dreamlog::remote::{MemoryRemote, RemoteStore};
use dreamlog::{Entry, EntryDraft, Journal};

fn draft(title: &str, tags: &[&str]) -> EntryDraft {
    EntryDraft {
        title: title.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..EntryDraft::default()
    }
}

fn offline_journal() -> Journal {
    Journal::open(Cache::new(MemoryStore::new()))
}

fn online_journal(remote: &MemoryRemote) -> Journal {
    let mut journal = offline_journal();
    journal.attach_remote(remote.clone(), "me");
    assert!(journal.go_online());
    journal
}

fn remote_doc(id: &str, title: &str, created_at: i64) -> Entry {
    Entry {
        id: id.to_string(),
        title: title.to_string(),
        created_at,
        description: None,
        is_favorite: false,
        tags: Vec::new(),
        display_order: None,
        owner_id: Some("me".to_string()),
    }
}

#[test]
fn entries_created_online_reach_other_devices() {
    let remote = MemoryRemote::new();
    let mut phone = online_journal(&remote);
    let mut laptop = online_journal(&remote);

    let id = phone.create_entry(draft("Flying over the sea", &["Flying"]));
    assert!(!is_local_id(&id));
    assert_eq!(phone.entries().len(), 1);

    laptop.process_snapshots();
    assert_eq!(laptop.entries().len(), 1);
    assert_eq!(laptop.entries()[0].id, id);
    assert_eq!(laptop.entries()[0].tags, vec!["Flying"]);
}

#[test]
fn outage_keeps_local_entry_and_next_snapshot_uploads_it() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);

    remote.set_available(false);
    let id = journal.create_entry(draft("Lost keys", &[]));
    assert!(is_local_id(&id));
    assert!(!journal.is_online());
    assert_eq!(journal.entries().len(), 1);

    remote.set_available(true);
    remote.put_external(remote_doc("fromTablet", "Old house", 5));
    journal.process_snapshots();

    assert!(journal.is_online());
    assert_eq!(journal.entries().len(), 2);
    assert!(journal.entries().iter().all(|e| !e.is_local()));
    assert_eq!(remote.documents().len(), 2);
}

#[test]
fn offline_twin_is_merged_into_remote_copy() {
    let remote = MemoryRemote::new();
    let mut journal = offline_journal();
    let twin_id = journal.create_entry(draft("Teeth falling out", &[]));
    let other_id = journal.create_entry(draft("Exam I never studied for", &[]));
    journal.move_entry(0, 1).unwrap();
    let created = journal.get(&twin_id).unwrap().created_at;

    remote.put_external(remote_doc("remoteTwin", "Teeth falling out", created + 1_000));
    journal.attach_remote(remote.clone(), "me");
    assert!(journal.go_online());

    assert!(journal.get(&twin_id).is_none());
    assert!(journal.get("remoteTwin").is_some());
    assert!(journal.get(&other_id).is_none(), "uploaded under a server id");
    assert_eq!(journal.entries().len(), 2);
    assert_eq!(remote.documents().len(), 2);
    assert!(journal.order_index().iter().any(|id| id == "remoteTwin"));
    assert!(journal.order_index().iter().all(|id| !is_local_id(id)));
}

#[test]
fn remote_deletion_elsewhere_removes_entry() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);
    let id = journal.create_entry(draft("Falling", &[]));
    remote.remove_external(&id);
    journal.process_snapshots();
    assert!(journal.entries().is_empty());
}

#[test]
fn rename_cascade_is_pushed_to_remote() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);
    journal.create_entry(draft("Coffee with Joe", &["People/Joe", "Places/Cafe"]));
    journal.create_entry(draft("Crowd", &["People"]));
    journal.create_entry(draft("Ocean", &["Places/Sea"]));

    assert_eq!(journal.rename_tag("People", "Friends").unwrap(), 2);

    let mut remote_tags: Vec<String> = remote
        .documents()
        .into_iter()
        .flat_map(|e| e.tags)
        .collect();
    remote_tags.sort();
    assert_eq!(
        remote_tags,
        vec!["Friends", "Friends/Joe", "Places/Cafe", "Places/Sea"]
    );
    let tree = journal.tag_tree();
    let names: Vec<_> = tree.iter().map(|n| (n.name.as_str(), n.count)).collect();
    assert_eq!(names, vec![("Friends", 2), ("Places", 2)]);
}

#[test]
fn edits_and_deletes_reach_remote() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);
    let id = journal.create_entry(draft("Snakes", &[]));

    assert!(journal.toggle_favorite(&id).unwrap());
    assert!(remote.documents()[0].is_favorite);

    journal
        .edit_entry(&id, |e| e.description = Some("in the garden".into()))
        .unwrap();
    assert_eq!(
        remote.documents()[0].description.as_deref(),
        Some("in the garden")
    );

    journal.delete_entry(&id).unwrap();
    assert!(remote.documents().is_empty());
    assert!(journal.entries().is_empty());
}

#[test]
fn failed_connect_keeps_local_entries_until_reconnect() {
    let remote = MemoryRemote::new();
    let mut journal = offline_journal();
    let local_id = journal.create_entry(draft("Late night", &[]));
    journal.attach_remote(remote.clone(), "me");
    remote.set_available(false);
    assert!(!journal.go_online());
    assert!(journal.get(&local_id).is_some());

    remote.set_available(true);
    assert!(journal.go_online());
    let id = journal.entries()[0].id.clone();
    assert!(!is_local_id(&id));

    journal.set_tags(&id, vec!["Night".into()]).unwrap();
    assert_eq!(remote.query("me").unwrap()[0].tags, vec!["Night"]);
}

#[test]
fn going_offline_stops_snapshot_delivery() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);
    journal.go_offline();
    remote.put_external(remote_doc("elsewhere", "Far away", 1));
    journal.process_snapshots();
    assert!(journal.entries().is_empty());
    assert!(!journal.is_online());
}

#[test]
fn next_mutation_after_outage_reconnects_and_uploads() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);

    remote.set_available(false);
    let first = journal.create_entry(draft("Locked door", &[]));
    assert!(is_local_id(&first));
    assert!(!journal.is_online());

    remote.set_available(true);
    let second = journal.create_entry(draft("Open window", &[]));
    assert!(journal.is_online());
    assert!(!is_local_id(&second));
    assert_eq!(remote.documents().len(), 2);
    assert!(journal.entries().iter().all(|e| !e.is_local()));

    let first_now = journal.current_id(&first);
    assert!(!is_local_id(&first_now));
    assert!(journal.toggle_favorite(&first).unwrap());
    assert!(remote
        .documents()
        .iter()
        .any(|doc| doc.id == first_now && doc.is_favorite));
}

#[test]
fn going_offline_on_purpose_is_not_retried() {
    let remote = MemoryRemote::new();
    let mut journal = online_journal(&remote);
    journal.go_offline();
    let id = journal.create_entry(draft("Quiet night", &[]));
    assert!(is_local_id(&id));
    assert!(!journal.is_online());
    assert!(remote.documents().is_empty());
}
