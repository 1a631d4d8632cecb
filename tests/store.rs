use cart_watcher::{
	store::{MemorySlot, Revision, SnapshotSlot, SnapshotStore, StaleRevision},
	CartSnapshot,
};

mod scripted_transport_;
use scripted_transport_::{line, snapshot, with_plan};

#[test]
fn never_saved() {
	let store = SnapshotStore::new(MemorySlot::new());
	assert_eq!(store.load(), CartSnapshot::empty());
	assert_eq!(store.load_revision().0, Revision(0));
}

#[test]
fn unreadable_values_are_absent() {
	for raw in ["", "not json", "{\"revision\": \"x\"}", "[1, 2]"] {
		let store = SnapshotStore::new(MemorySlot::with_raw(raw));
		assert_eq!(store.load_revision(), (Revision(0), CartSnapshot::empty()), "{:?}", raw);
	}
}

#[test]
fn bare_cart_is_absent() {
	let store = SnapshotStore::new(MemorySlot::with_raw(r#"{"token": "t", "items": [{"key": "a", "quantity": 1}]}"#));
	assert!(store.load().items.is_empty());
}

#[test]
fn save_then_load() {
	let store = SnapshotStore::new(MemorySlot::new());
	let cart = snapshot(vec![line("a", 2), with_plan(line("b", 1), 42, "df:2 WEEK;bf:2 WEEK")]);

	assert_eq!(store.save(&cart), Revision(1));
	assert_eq!(store.load_revision(), (Revision(1), cart.clone()));
	assert_eq!(store.save(&cart), Revision(2));
}

#[test]
fn resaving_what_was_loaded_keeps_the_cart() {
	let store = SnapshotStore::new(MemorySlot::new());
	store.save(&snapshot(vec![line("a", 3)]));

	let first = store.load();
	for _ in 0..3 {
		store.save(&store.load());
	}
	assert_eq!(store.load(), first);
}

#[test]
fn compare_and_save() {
	let store = SnapshotStore::new(MemorySlot::new());
	let (revision, _) = store.load_revision();

	assert_eq!(store.compare_and_save(revision, &snapshot(vec![line("a", 1)])), Ok(Revision(1)));
	assert_eq!(
		store.compare_and_save(revision, &snapshot(vec![line("b", 1)])),
		Err(StaleRevision { expected: Revision(0), found: Revision(1) })
	);
	assert_eq!(store.load().items, vec![line("a", 1)]);
}

#[test]
fn shared_slot_last_write_wins() {
	let slot = MemorySlot::new();
	let first = SnapshotStore::new(slot.clone());
	let second = SnapshotStore::new(slot.clone());

	first.save(&snapshot(vec![line("a", 1)]));
	second.save(&snapshot(vec![line("b", 1)]));

	assert_eq!(first.load().items, vec![line("b", 1)]);
	assert_eq!(first.load_revision().0, Revision(2));
	assert!(slot.read().unwrap().contains("\"revision\":2"));
}
