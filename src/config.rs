use serde::Deserialize;
use tracing::{instrument, trace, warn};
use wasm_bindgen::JsValue;

/// Page-level settings shared by the watcher and its consumers.
///
/// Every field has a default, so an embedded JSON blob only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
	/// Storefront route prefix, always ending in `/`.
	pub routes_root: String,
	/// The single `localStorage` slot holding the last known cart.
	pub storage_key: String,
	/// URL fragment identifying cart-mutating requests.
	pub mutation_path: String,
	/// Resource timing initiator types that count as script-issued requests.
	pub initiator_types: Vec<String>,
	/// Section rendering the line key → selling plan id catalogue.
	pub selling_plans_section: String,
	/// Name of the `window` event re-dispatched by [`WindowEventBridge`](`crate::bus::WindowEventBridge`).
	pub event_name: String,
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			routes_root: "/".to_owned(),
			storage_key: "cart-watcher:cart".to_owned(),
			mutation_path: "/cart/".to_owned(),
			initiator_types: vec!["xmlhttprequest".to_owned(), "fetch".to_owned()],
			selling_plans_section: "selling-plans".to_owned(),
			event_name: "cart_changed".to_owned(),
		}
	}
}

impl WatcherConfig {
	/// Parses a (possibly partial) JSON configuration, for example from an inline `<script type="application/json">`.
	///
	/// # Errors
	///
	/// Iff `json` isn't a JSON object matching the configuration's shape.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str::<Self>(json).map(Self::normalized)
	}

	/// Defaults, with the route root taken from `window.Shopify.routes.root` where the page provides it.
	#[must_use]
	#[instrument]
	pub fn from_window() -> Self {
		let mut config = Self::default();
		match web_sys::window().map(|window| routes_root(&window)) {
			Some(Ok(Some(root))) => {
				trace!("Using route root {:?}.", root);
				config.routes_root = root;
			}
			Some(Ok(None)) => trace!("No storefront routes found on `window`. Keeping defaults."),
			Some(Err(error)) => warn!("Failed to read storefront routes: {:?}", error),
			None => warn!("No `window` available. Keeping defaults."),
		}
		config.normalized()
	}

	fn normalized(mut self) -> Self {
		if !self.routes_root.ends_with('/') {
			self.routes_root.push('/');
		}
		self
	}

	/// `path` resolved against [`routes_root`](`WatcherConfig::routes_root`). `path` must not start with `/`.
	#[must_use]
	pub fn route(&self, path: &str) -> String {
		format!("{}{}", self.routes_root, path)
	}
}

fn routes_root(window: &web_sys::Window) -> Result<Option<String>, JsValue> {
	let mut value: JsValue = window.clone().into();
	for name in ["Shopify", "routes", "root"] {
		if value.is_undefined() || value.is_null() {
			return Ok(None);
		}
		value = js_sys::Reflect::get(&value, &JsValue::from_str(name))?;
	}
	Ok(value.as_string())
}
