//! The single persisted "last known cart" slot.
//!
//! The slot is shared by every watcher on the page (and across navigations within the session), so writes carry a
//! monotonically increasing [`Revision`]. [`SnapshotStore::compare_and_save`] lets a slow reader refuse to overwrite a
//! newer write instead of clobbering it.

use crate::model::CartSnapshot;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, instrument, trace, warn};

/// Raw string storage for exactly one value.
pub trait SnapshotSlot {
	/// `None` if nothing was stored or the slot is unreadable.
	fn read(&self) -> Option<String>;
	/// Failures are logged, not returned: the slot is a cache.
	fn write(&self, value: &str);
}

/// Write counter of the stored snapshot. `Revision(0)` means "never written" (or unreadable).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
	#[must_use]
	pub fn next(self) -> Self {
		Self(self.0.saturating_add(1))
	}
}

/// Returned by [`SnapshotStore::compare_and_save`] when someone else wrote in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleRevision {
	pub expected: Revision,
	pub found: Revision,
}

#[derive(Serialize)]
struct StoredCartRef<'a> {
	revision: Revision,
	cart: &'a CartSnapshot,
}

#[derive(Deserialize)]
struct StoredCart {
	revision: Revision,
	cart: CartSnapshot,
}

pub struct SnapshotStore {
	slot: Box<dyn SnapshotSlot>,
}

impl SnapshotStore {
	#[must_use]
	pub fn new(slot: impl SnapshotSlot + 'static) -> Self {
		Self { slot: Box::new(slot) }
	}

	/// The last stored cart, or [`CartSnapshot::empty`]. Never fails.
	#[must_use]
	pub fn load(&self) -> CartSnapshot {
		self.load_revision().1
	}

	#[must_use]
	#[instrument(skip(self))]
	pub fn load_revision(&self) -> (Revision, CartSnapshot) {
		let raw = match self.slot.read() {
			Some(raw) => raw,
			None => return (Revision::default(), CartSnapshot::empty()),
		};
		match serde_json::from_str::<StoredCart>(&raw) {
			Ok(StoredCart { revision, cart }) => (revision, cart),
			Err(error) => {
				warn!("Ignoring unreadable stored cart: {}", error);
				(Revision::default(), CartSnapshot::empty())
			}
		}
	}

	/// Stores `cart` unconditionally (last write wins) and returns its new revision.
	#[instrument(skip_all)]
	pub fn save(&self, cart: &CartSnapshot) -> Revision {
		let revision = self.load_revision().0.next();
		self.write(revision, cart);
		revision
	}

	/// Stores `cart` only if the stored revision is still `expected`.
	///
	/// # Errors
	///
	/// Iff the slot was written since `expected` was read.
	#[instrument(skip(self, cart))]
	pub fn compare_and_save(&self, expected: Revision, cart: &CartSnapshot) -> Result<Revision, StaleRevision> {
		let found = self.load_revision().0;
		if found != expected {
			return Err(StaleRevision { expected, found });
		}
		let revision = expected.next();
		self.write(revision, cart);
		Ok(revision)
	}

	fn write(&self, revision: Revision, cart: &CartSnapshot) {
		match serde_json::to_string(&StoredCartRef { revision, cart }) {
			Ok(json) => {
				self.slot.write(&json);
				trace!("Stored cart at revision {}.", revision.0);
			}
			Err(error) => error!("Failed to serialize cart: {}", error),
		}
	}
}

/// In-memory slot. Clones share the same value, like two widgets sharing one `localStorage` key.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot(Rc<RefCell<Option<String>>>);

impl MemorySlot {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A slot pre-filled with arbitrary content (which need not be a valid stored cart).
	#[must_use]
	pub fn with_raw(raw: impl Into<String>) -> Self {
		Self(Rc::new(RefCell::new(Some(raw.into()))))
	}
}

impl SnapshotSlot for MemorySlot {
	fn read(&self) -> Option<String> {
		self.0.borrow().clone()
	}

	fn write(&self, value: &str) {
		*self.0.borrow_mut() = Some(value.to_owned());
	}
}

/// [***localStorage***](https://developer.mozilla.org/en-US/docs/Web/API/Window/localStorage) under one fixed key.
#[derive(Debug, Clone)]
pub struct LocalStorageSlot {
	key: String,
}

impl LocalStorageSlot {
	#[must_use]
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into() }
	}

	fn storage() -> Option<web_sys::Storage> {
		match web_sys::window()?.local_storage() {
			Ok(storage) => storage,
			Err(error) => {
				warn!("`localStorage` is unavailable: {:?}", error);
				None
			}
		}
	}
}

impl SnapshotSlot for LocalStorageSlot {
	fn read(&self) -> Option<String> {
		Self::storage()?.get_item(&self.key).unwrap_or_else(|error| {
			warn!("Failed to read {:?} from `localStorage`: {:?}", self.key, error);
			None
		})
	}

	fn write(&self, value: &str) {
		let storage = match Self::storage() {
			Some(storage) => storage,
			None => return error!("Dropping cart write: no `localStorage`."),
		};
		if let Err(error) = storage.set_item(&self.key, value) {
			// Typically `QuotaExceededError`.
			error!("Failed to write {:?} to `localStorage`: {:?}", self.key, error);
		}
	}
}
