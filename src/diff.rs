use crate::model::{CartSnapshot, LineItem};
use hashbrown::HashMap;
use serde::Serialize;
use tracing::{instrument, trace};

/// What changed between two [`CartSnapshot`]s, by line key and quantity only.
///
/// A line whose quantity went up appears in `added` with the increase as its quantity,
/// one whose quantity went down appears in `removed` with the decrease.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CartDiff {
	pub added: Vec<LineItem>,
	pub removed: Vec<LineItem>,
}

impl CartDiff {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}
}

/// Computes the line-level [`CartDiff`] from `old` to `new`.
///
/// Lines are matched by [`LineItem::key`]. Lines present on both sides with the same quantity contribute nothing,
/// even if other attributes (such as the selling plan allocation) differ.
///
/// Order: lines only in `new` (in `new`'s order), then quantity increases (in `old`'s order), for `added`;
/// lines only in `old` (in `old`'s order), then quantity decreases (in `old`'s order), for `removed`.
#[must_use]
#[instrument(skip_all, fields(old.len = old.items.len(), new.len = new.items.len()))]
pub fn diff(old: &CartSnapshot, new: &CartSnapshot) -> CartDiff {
	let old_index = index_by_key(&old.items);
	let new_index = index_by_key(&new.items);

	let mut added: Vec<LineItem> = new.items.iter().filter(|item| !old_index.contains_key(item.key.as_str())).cloned().collect();
	let mut removed: Vec<LineItem> = old.items.iter().filter(|item| !new_index.contains_key(item.key.as_str())).cloned().collect();

	for old_item in &old.items {
		let new_item = match new_index.get(old_item.key.as_str()) {
			Some(&new_item) if new_item.quantity != old_item.quantity => new_item,
			_ => continue,
		};

		if new_item.quantity > old_item.quantity {
			added.push(new_item.with_quantity(new_item.quantity - old_item.quantity));
		} else {
			removed.push(new_item.with_quantity(old_item.quantity - new_item.quantity));
		}
	}

	trace!("{} line(s) added, {} line(s) removed.", added.len(), removed.len());
	CartDiff { added, removed }
}

fn index_by_key(items: &[LineItem]) -> HashMap<&str, &LineItem> {
	let mut index = HashMap::with_capacity(items.len());
	for item in items {
		// Keys are unique within a snapshot. Should one repeat anyway, the first occurrence wins.
		index.entry(item.key.as_str()).or_insert(item);
	}
	index
}
