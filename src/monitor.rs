//! Detecting that the cart *may* have changed, without a push channel from the server.
//!
//! Notifiers are coarse: they never say what changed, only that reconciling is worthwhile. Over-triggering is
//! harmless (reconciling an unchanged cart is a no-op), under-triggering is accepted.

use crate::{config::WatcherConfig, error::CartResult};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, info, trace, trace_span};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

/// Called whenever a notifier suspects a cart change.
pub type Trigger = Rc<dyn Fn()>;

pub trait ChangeNotifier {
	/// Starts invoking `trigger`. Starting a running notifier replaces its trigger.
	///
	/// # Errors
	///
	/// Iff the underlying event source can't be attached.
	fn start(&mut self, trigger: Trigger) -> CartResult<()>;

	/// After this returns, the last trigger is never invoked again.
	fn stop(&mut self);

	fn is_running(&self) -> bool;
}

/// Decides which completed resource loads count as cart mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFilter {
	mutation_path: String,
	initiator_types: Vec<String>,
}

impl MutationFilter {
	#[must_use]
	pub fn new(mutation_path: impl Into<String>, initiator_types: Vec<String>) -> Self {
		Self { mutation_path: mutation_path.into(), initiator_types }
	}

	#[must_use]
	pub fn from_config(config: &WatcherConfig) -> Self {
		Self::new(config.mutation_path.clone(), config.initiator_types.clone())
	}

	/// Script-issued (not navigation or asset) requests whose URL contains the mutation path.
	#[must_use]
	pub fn matches(&self, initiator_type: &str, url: &str) -> bool {
		self.initiator_types.iter().any(|accepted| accepted == initiator_type) && url.contains(self.mutation_path.as_str())
	}
}

type ObserverCallback = Closure<dyn Fn(web_sys::PerformanceObserverEntryList, JsValue)>;

/// Watches [***Resource Timing***](https://developer.mozilla.org/en-US/docs/Web/API/PerformanceResourceTiming) entries
/// for requests any script on the page made to the cart's mutation endpoints.
///
/// Browsers may drop entries under load, so this is best effort.
pub struct ResourceTimingMonitor {
	filter: MutationFilter,
	running: Option<(web_sys::PerformanceObserver, ObserverCallback)>,
}

impl ResourceTimingMonitor {
	#[must_use]
	pub fn new(filter: MutationFilter) -> Self {
		Self { filter, running: None }
	}
}

impl ChangeNotifier for ResourceTimingMonitor {
	fn start(&mut self, trigger: Trigger) -> CartResult<()> {
		self.stop();

		let filter = self.filter.clone();
		let callback: ObserverCallback = Closure::wrap(Box::new(move |entries: web_sys::PerformanceObserverEntryList, _observer: JsValue| {
			let span = trace_span!("resource_timing_callback");
			let _enter = span.enter();

			let mutated = entries
				.get_entries()
				.iter()
				.filter_map(|entry| entry.dyn_into::<web_sys::PerformanceResourceTiming>().ok())
				.any(|timing| filter.matches(&timing.initiator_type(), &timing.name()));
			if mutated {
				trace!("Observed a cart mutation request.");
				trigger();
			}
		}));

		let observer = web_sys::PerformanceObserver::new(callback.as_ref().unchecked_ref())?;
		let options = js_sys::Object::new();
		js_sys::Reflect::set(&options, &JsValue::from_str("entryTypes"), &js_sys::Array::of1(&JsValue::from_str("resource")))?;
		// Called through `Reflect` because the `observe` binding's signature differs between `web-sys` releases.
		let observe: js_sys::Function = js_sys::Reflect::get(&observer, &JsValue::from_str("observe"))?.dyn_into()?;
		observe.call1(&observer, &options)?;

		info!("Observing resource timing for cart mutations.");
		self.running = Some((observer, callback));
		Ok(())
	}

	fn stop(&mut self) {
		if let Some((observer, callback)) = self.running.take() {
			observer.disconnect();
			drop(callback);
			info!("Stopped observing resource timing.");
		}
	}

	fn is_running(&self) -> bool {
		self.running.is_some()
	}
}

impl Drop for ResourceTimingMonitor {
	fn drop(&mut self) {
		self.stop();
	}
}

/// Direct subscription to this crate's own mutation calls: [`CartClient`](`crate::fetch::CartClient`)s carrying one
/// of its [`MutationSignal`]s fire it after each mutating request.
///
/// More precise than [`ResourceTimingMonitor`], but blind to mutations made by other scripts.
#[derive(Default)]
pub struct MutationFeed {
	trigger: Rc<RefCell<Option<Trigger>>>,
}

impl MutationFeed {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn signal(&self) -> MutationSignal {
		MutationSignal(self.trigger.clone())
	}
}

impl ChangeNotifier for MutationFeed {
	fn start(&mut self, trigger: Trigger) -> CartResult<()> {
		*self.trigger.borrow_mut() = Some(trigger);
		Ok(())
	}

	fn stop(&mut self) {
		self.trigger.borrow_mut().take();
	}

	fn is_running(&self) -> bool {
		self.trigger.borrow().is_some()
	}
}

/// Handle through which mutation call sites notify a [`MutationFeed`].
#[derive(Clone)]
pub struct MutationSignal(Rc<RefCell<Option<Trigger>>>);

impl MutationSignal {
	/// Fires the feed's trigger, if it is running.
	pub fn notify(&self) {
		// Cloned out so that the trigger may stop the feed.
		let trigger = self.0.borrow().clone();
		match trigger {
			Some(trigger) => trigger(),
			None => trace!("Mutation feed isn't running. Ignoring signal."),
		}
	}
}

/// Never fires. For pages that only reconcile explicitly.
#[derive(Debug, Default)]
pub struct NoopMonitor {
	running: bool,
}

impl ChangeNotifier for NoopMonitor {
	fn start(&mut self, _trigger: Trigger) -> CartResult<()> {
		self.running = true;
		Ok(())
	}

	fn stop(&mut self) {
		self.running = false;
	}

	fn is_running(&self) -> bool {
		self.running
	}
}

/// Starts `notifier`, logging instead of failing.
pub(crate) fn start_logged(notifier: &mut dyn ChangeNotifier, trigger: Trigger) {
	if let Err(error) = notifier.start(trigger) {
		error!("Failed to start change monitoring: {}", error);
	}
}
