use crate::{
	bus::ChangeBus,
	config::WatcherConfig,
	diff::{diff, CartDiff},
	error::CartResult,
	fetch::{CartClient, FetchTransport, Transport},
	model::CartSnapshot,
	monitor::{self, ChangeNotifier, MutationFilter, ResourceTimingMonitor, Trigger},
	store::{LocalStorageSlot, Revision, SnapshotStore, StaleRevision},
};
use futures::future::LocalBoxFuture;
use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};
use tracing::{error, info, instrument, trace, warn};

/// Runs a detached task on the current (single) thread.
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

/// [`wasm_bindgen_futures::spawn_local`].
#[must_use]
pub fn browser_spawner() -> Spawner {
	Rc::new(|future: LocalBoxFuture<'static, ()>| wasm_bindgen_futures::spawn_local(future))
}

/// Keeps the stored cart snapshot in agreement with the server and publishes each change on its [`ChangeBus`].
///
/// Clones are handles to the same watcher, so several widgets on one page can share it (and its bus).
///
/// # Correct Use
///
/// Call [`init`](`CartWatcher::init`) once per page. Calling it again re-runs the initial reconcile and restarts
/// monitoring.
pub struct CartWatcher<T: Transport + 'static> {
	inner: Rc<Inner<T>>,
}

impl<T: Transport + 'static> Clone for CartWatcher<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}

struct Inner<T: Transport> {
	client: CartClient<T>,
	store: SnapshotStore,
	bus: ChangeBus,
	notifier: RefCell<Box<dyn ChangeNotifier>>,
	spawner: Spawner,
	/// Bumped by every stop, so that reconciles started by an earlier monitoring run can tell.
	generation: Cell<u64>,
	/// Numbers fetches (and [`record`](`CartWatcher::record`)s) in the order they started.
	fetch_sequence: Cell<u64>,
	/// `fetch_sequence` of the newest state stored by this watcher.
	newest_stored: Cell<u64>,
}

impl CartWatcher<FetchTransport> {
	/// `fetch`, `localStorage` and resource timing, as configured.
	#[must_use]
	pub fn for_browser(config: &WatcherConfig) -> Self {
		Self::new(
			CartClient::new(FetchTransport, config.routes_root.clone()),
			SnapshotStore::new(LocalStorageSlot::new(config.storage_key.clone())),
			ResourceTimingMonitor::new(MutationFilter::from_config(config)),
			browser_spawner(),
		)
	}
}

impl<T: Transport + 'static> CartWatcher<T> {
	#[must_use]
	pub fn new(client: CartClient<T>, store: SnapshotStore, notifier: impl ChangeNotifier + 'static, spawner: Spawner) -> Self {
		Self {
			inner: Rc::new(Inner {
				client,
				store,
				bus: ChangeBus::new(),
				notifier: RefCell::new(Box::new(notifier)),
				spawner,
				generation: Cell::new(0),
				fetch_sequence: Cell::new(0),
				newest_stored: Cell::new(0),
			}),
		}
	}

	#[must_use]
	pub fn bus(&self) -> &ChangeBus {
		&self.inner.bus
	}

	#[must_use]
	pub fn client(&self) -> &CartClient<T> {
		&self.inner.client
	}

	/// Reconciles once, then starts monitoring.
	///
	/// Monitoring starts even if the initial reconcile fails.
	///
	/// # Errors
	///
	/// The initial reconcile's error, unchanged.
	#[instrument(skip(self))]
	pub async fn init(&self) -> CartResult<()> {
		let initial = self.reconcile().await;
		if let Err(error) = &initial {
			warn!("Initial reconcile failed: {}", error);
		}
		self.start_monitoring();
		initial.map(drop)
	}

	/// Runs [`init`](`CartWatcher::init`) in the background, logging its failure.
	pub fn spawn_init(&self) {
		let watcher = self.clone();
		(self.inner.spawner)(Box::pin(async move {
			// Already logged by `init`.
			let _ = watcher.init().await;
		}));
	}

	/// The last stored snapshot. No network access; never fails.
	#[must_use]
	pub fn cached_snapshot(&self) -> CartSnapshot {
		self.inner.store.load()
	}

	/// Reads the server's cart without touching the stored snapshot.
	///
	/// # Errors
	///
	/// See [`CartClient::read_cart`].
	pub async fn fetch_authoritative(&self) -> CartResult<CartSnapshot> {
		self.inner.client.read_cart().await
	}

	/// Stores `cart` as the latest known state without broadcasting, for consumers that just received it from a
	/// mutation. Reconciles that started before this are then discarded instead of overwriting it.
	pub fn record(&self, cart: &CartSnapshot) -> Revision {
		let sequence = self.inner.next_sequence();
		let revision = self.inner.store.save(cart);
		self.inner.newest_stored.set(sequence);
		revision
	}

	/// Runs `future` on this watcher's [`Spawner`].
	pub fn spawn(&self, future: LocalBoxFuture<'static, ()>) {
		(self.inner.spawner)(future);
	}

	/// Fetches the server's cart and diffs it against the stored one.
	///
	/// Only if something changed is the new cart stored and the diff published (and returned).
	///
	/// # Errors
	///
	/// Fetch errors, unchanged. The stored snapshot is left as is.
	pub async fn reconcile(&self) -> CartResult<Option<CartDiff>> {
		self.inner.reconcile(None).await
	}

	/// Starts the change notifier, wired to a background reconcile.
	#[instrument(skip(self))]
	pub fn start_monitoring(&self) {
		let generation = self.inner.generation.get();
		let weak = Rc::downgrade(&self.inner);
		let trigger: Trigger = Rc::new(move || Inner::spawn_reconcile(&weak, generation));
		monitor::start_logged(&mut **self.inner.notifier.borrow_mut(), trigger);
	}

	/// Stops the change notifier. No change is published by a monitor-triggered reconcile after this returns, even one
	/// that is already in flight.
	#[instrument(skip(self))]
	pub fn stop_monitoring(&self) {
		self.inner.notifier.borrow_mut().stop();
		self.inner.generation.set(self.inner.generation.get().wrapping_add(1));
		info!("Stopped monitoring.");
	}

	#[must_use]
	pub fn is_monitoring(&self) -> bool {
		self.inner.notifier.borrow().is_running()
	}
}

impl<T: Transport + 'static> Inner<T> {
	fn next_sequence(&self) -> u64 {
		let sequence = self.fetch_sequence.get().wrapping_add(1);
		self.fetch_sequence.set(sequence);
		sequence
	}

	fn spawn_reconcile(weak: &Weak<Self>, generation: u64) {
		let inner = match weak.upgrade() {
			Some(inner) => inner,
			None => return trace!("Watcher dropped. Ignoring trigger."),
		};
		let spawner = inner.spawner.clone();
		spawner(Box::pin(async move {
			if let Err(error) = inner.reconcile(Some(generation)).await {
				error!("Background reconcile failed: {}", error);
			}
		}));
	}

	/// `generation` is set for monitor-triggered reconciles.
	///
	/// If the store was written while fetching, the fetched cart is diffed again against what is stored now, unless
	/// this watcher already stored the result of a fetch that started later.
	#[instrument(skip(self))]
	async fn reconcile(&self, generation: Option<u64>) -> CartResult<Option<CartDiff>> {
		let sequence = self.next_sequence();
		let (mut revision, mut stored) = self.store.load_revision();
		let fetched = self.client.read_cart().await?;

		if generation.map_or(false, |generation| generation != self.generation.get()) {
			trace!("Monitoring stopped while fetching. Discarding result.");
			return Ok(None);
		}

		loop {
			if self.newest_stored.get() > sequence {
				trace!("A later fetch was stored already. Discarding result.");
				return Ok(None);
			}

			let changes = diff(&stored, &fetched);
			if changes.is_empty() {
				trace!("Cart unchanged.");
				return Ok(None);
			}

			match self.store.compare_and_save(revision, &fetched) {
				Ok(revision) => {
					self.newest_stored.set(sequence);
					info!(revision = revision.0, "Cart changed: {} line(s) added, {} line(s) removed.", changes.added.len(), changes.removed.len());
					self.bus.publish(&changes);
					return Ok(Some(changes));
				}
				Err(StaleRevision { expected, found }) => {
					warn!("Stored cart moved from revision {} to {} while fetching. Diffing again.", expected.0, found.0);
					(revision, stored) = self.store.load_revision();
				}
			}
		}
	}
}
