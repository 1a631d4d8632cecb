//! Explicit publish/subscribe for [`CartDiff`]s.
//!
//! A [`ChangeBus`] is owned by one [`CartWatcher`](`crate::watcher::CartWatcher`) and handed to consumers, instead of
//! everyone listening on `window`. [`WindowEventBridge`] re-dispatches onto `window` for scripts that still do.

use crate::diff::CartDiff;
use hashbrown::HashMap;
use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace};
use wasm_bindgen::JsValue;

type Handler = Rc<dyn Fn(&CartDiff)>;

#[derive(Default)]
struct Subscribers {
	next_id: u64,
	handlers: HashMap<u64, Handler>,
}

/// Cheap to clone; clones publish to the same subscribers.
#[derive(Clone, Default)]
pub struct ChangeBus {
	subscribers: Rc<RefCell<Subscribers>>,
}

impl ChangeBus {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` until the returned [`Subscription`] is dropped.
	#[must_use = "Dropping the `Subscription` unsubscribes immediately."]
	pub fn subscribe(&self, handler: impl Fn(&CartDiff) + 'static) -> Subscription {
		let mut subscribers = self.subscribers.borrow_mut();
		let id = subscribers.next_id;
		subscribers.next_id += 1;
		subscribers.handlers.insert(id, Rc::new(handler));
		trace!("Subscribed #{}.", id);
		Subscription { subscribers: Rc::downgrade(&self.subscribers), id }
	}

	/// Delivers `diff` once to every current subscriber (in unspecified order) and returns how many there were.
	///
	/// Handlers may subscribe or unsubscribe while being called. Such changes take effect from the next publish on.
	#[instrument(skip_all)]
	pub fn publish(&self, diff: &CartDiff) -> usize {
		let handlers: Vec<Handler> = self.subscribers.borrow().handlers.values().cloned().collect();
		for handler in &handlers {
			handler(diff);
		}
		trace!("Published to {} subscriber(s).", handlers.len());
		handlers.len()
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.subscribers.borrow().handlers.len()
	}
}

/// Unsubscribes on drop.
pub struct Subscription {
	subscribers: Weak<RefCell<Subscribers>>,
	id: u64,
}

impl Subscription {
	/// Keeps the handler subscribed for the bus's whole lifetime.
	pub fn detach(mut self) {
		self.subscribers = Weak::new();
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(subscribers) = self.subscribers.upgrade() {
			subscribers.borrow_mut().handlers.remove(&self.id);
			trace!("Unsubscribed #{}.", self.id);
		}
	}
}

/// Re-dispatches every published diff as a `CustomEvent` on `window`, with `{ added, removed }` as its `detail`.
pub struct WindowEventBridge;

impl WindowEventBridge {
	#[must_use = "Dropping the `Subscription` detaches the bridge immediately."]
	pub fn attach(bus: &ChangeBus, event_name: impl Into<String>) -> Subscription {
		let event_name = event_name.into();
		bus.subscribe(move |diff| {
			if let Err(error) = dispatch(&event_name, diff) {
				error!("Failed to dispatch {:?} on `window`: {:?}", event_name, error);
			}
		})
	}
}

fn dispatch(event_name: &str, diff: &CartDiff) -> Result<(), JsValue> {
	let window = web_sys::window().ok_or_else(|| JsValue::from_str("No `window`."))?;
	let detail = serde_wasm_bindgen::to_value(diff)?;
	let init = web_sys::CustomEventInit::new();
	init.set_detail(&detail);
	let event = web_sys::CustomEvent::new_with_event_init_dict(event_name, &init)?;
	window.dispatch_event(&event)?;
	Ok(())
}
