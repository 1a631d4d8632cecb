//! The storefront cart API, and the validation of what it returns.
//!
//! [`Transport`] is the only part that touches the network. [`CartClient`] builds requests on top of it and turns
//! responses into [`CartSnapshot`]s or typed [`CartError`]s. Nothing here retries.

use crate::{
	error::{CartError, CartResult},
	model::{CartSnapshot, LineProperties},
	monitor::MutationSignal,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, instrument, trace, warn};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Get,
	Post,
}

impl Method {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
	pub method: Method,
	pub url: String,
	/// JSON.
	pub body: Option<String>,
	/// Skip every intermediate HTTP cache, so that changes made by other agents are seen.
	pub bypass_cache: bool,
}

impl ApiRequest {
	#[must_use]
	pub fn get(url: String) -> Self {
		Self { method: Method::Get, url, body: None, bypass_cache: false }
	}

	#[must_use]
	pub fn post_json(url: String, body: String) -> Self {
		Self { method: Method::Post, url, body: Some(body), bypass_cache: false }
	}

	#[must_use]
	pub fn uncached(mut self) -> Self {
		self.bypass_cache = true;
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
	pub status: u16,
	pub body: String,
}

#[async_trait(?Send)]
pub trait Transport {
	/// Resolves with any response the server gave, including error statuses.
	///
	/// # Errors
	///
	/// Only if no response was received at all.
	async fn send(&self, request: ApiRequest) -> CartResult<RawResponse>;
}

/// [***fetch***](https://developer.mozilla.org/en-US/docs/Web/API/fetch) on the current `window`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTransport;

#[async_trait(?Send)]
impl Transport for FetchTransport {
	#[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
	async fn send(&self, request: ApiRequest) -> CartResult<RawResponse> {
		let window = web_sys::window().ok_or_else(|| CartError::Transport("No `window` to fetch from.".to_owned()))?;

		let init = web_sys::RequestInit::new();
		init.set_method(request.method.as_str());
		if request.bypass_cache {
			init.set_cache(web_sys::RequestCache::NoStore);
		}
		let headers = web_sys::Headers::new()?;
		headers.append("Accept", "application/json")?;
		if let Some(body) = &request.body {
			headers.append("Content-Type", "application/json")?;
			init.set_body(&JsValue::from_str(body));
		}
		init.set_headers(&headers);

		let response: web_sys::Response = JsFuture::from(window.fetch_with_str_and_init(&request.url, &init)).await?.dyn_into()?;
		let status = response.status();
		let body = JsFuture::from(response.text()?).await?.as_string().unwrap_or_default();
		trace!(status, "Received {} byte(s).", body.len());
		Ok(RawResponse { status, body })
	}
}

/// Body of `cart/change.js`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineChange {
	/// The line key.
	pub id: String,
	pub quantity: u32,
	/// Serialized as `null` when absent, which strips subscription pricing from the line.
	pub selling_plan: Option<u64>,
	pub properties: LineProperties,
}

/// Body of `cart/add.js`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddItems {
	pub attributes: BTreeMap<String, String>,
	pub items: Vec<AddItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddItem {
	/// The variant id.
	pub id: u64,
	pub quantity: u32,
	pub properties: LineProperties,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub selling_plan: Option<u64>,
}

/// Validates a cart read (or a mutation answered with the full cart).
///
/// The error status is taken from the body's `status` field where present (the storefront reports cart errors that
/// way), and from the HTTP status otherwise.
///
/// # Errors
///
/// - [`CartError::VariantNotFound`] on 404,
/// - [`CartError::InventoryUnavailable`] on 422, carrying the `description`,
/// - [`CartError::UnexpectedStatus`] on any other non-success status,
/// - [`CartError::Decode`] if the body isn't a cart,
/// - [`CartError::MalformedResponse`] if the body lacks a cart token.
pub fn check_response(response: &RawResponse) -> CartResult<CartSnapshot> {
	let body = match classify(response)? {
		Some(body) => body,
		None => serde_json::from_str::<Value>(&response.body)?,
	};
	match body.get("token").and_then(Value::as_str) {
		Some(token) if !token.is_empty() => Ok(serde_json::from_value(body)?),
		_ => Err(CartError::MalformedResponse),
	}
}

/// Like [`check_response`], but for endpoints whose body isn't needed.
///
/// # Errors
///
/// As [`check_response`], minus the body checks.
pub fn check_status(response: &RawResponse) -> CartResult<()> {
	classify(response).map(drop)
}

fn classify(response: &RawResponse) -> CartResult<Option<Value>> {
	let body = serde_json::from_str::<Value>(&response.body).ok();
	let status = body
		.as_ref()
		.and_then(|body| body.get("status"))
		.and_then(Value::as_u64)
		.and_then(|status| u16::try_from(status).ok())
		.filter(|status| !(200..300).contains(status))
		.unwrap_or(response.status);

	match status {
		200..=299 => Ok(body),
		404 => Err(CartError::VariantNotFound),
		422 => {
			let description = body
				.as_ref()
				.and_then(|body| body.get("description").or_else(|| body.get("message")))
				.and_then(Value::as_str)
				.unwrap_or_default();
			Err(CartError::InventoryUnavailable(description.to_owned()))
		}
		other => Err(CartError::UnexpectedStatus(other)),
	}
}

/// The storefront cart endpoints.
pub struct CartClient<T: Transport> {
	transport: T,
	routes_root: String,
	signal: Option<MutationSignal>,
}

impl<T: Transport> CartClient<T> {
	/// `routes_root` must end in `/`.
	#[must_use]
	pub fn new(transport: T, routes_root: impl Into<String>) -> Self {
		Self { transport, routes_root: routes_root.into(), signal: None }
	}

	/// Fires `signal` after every mutating call the server answered.
	#[must_use]
	pub fn with_signal(mut self, signal: MutationSignal) -> Self {
		self.signal = Some(signal);
		self
	}

	#[must_use]
	pub fn transport(&self) -> &T {
		&self.transport
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.routes_root, path)
	}

	/// Reads the authoritative cart, bypassing caches.
	///
	/// # Errors
	///
	/// See [`check_response`]; [`CartError::Transport`] if no response arrived.
	#[instrument(skip(self))]
	pub async fn read_cart(&self) -> CartResult<CartSnapshot> {
		let response = self.transport.send(ApiRequest::get(self.url("cart.js")).uncached()).await?;
		let cart = check_response(&response)?;
		log_cart(&cart);
		Ok(cart)
	}

	/// # Errors
	///
	/// See [`check_response`].
	#[instrument(skip(self, change), fields(quantity = change.quantity, selling_plan = ?change.selling_plan))]
	pub async fn change_line(&self, change: &LineChange) -> CartResult<CartSnapshot> {
		let request = ApiRequest::post_json(self.url("cart/change.js"), serde_json::to_string(change)?);
		let response = self.mutate(request).await?;
		check_response(&response)
	}

	/// # Errors
	///
	/// See [`check_status`].
	#[instrument(skip(self, add), fields(items = add.items.len()))]
	pub async fn add_items(&self, add: &AddItems) -> CartResult<()> {
		let request = ApiRequest::post_json(self.url("cart/add.js"), serde_json::to_string(add)?);
		let response = self.mutate(request).await?;
		check_status(&response)
	}

	/// Empties the cart.
	///
	/// # Errors
	///
	/// See [`check_status`].
	#[instrument(skip(self))]
	pub async fn clear(&self) -> CartResult<()> {
		let response = self.mutate(ApiRequest::get(self.url("cart/clear"))).await?;
		check_status(&response)
	}

	/// Fetches the server-rendered HTML of a single section.
	///
	/// # Errors
	///
	/// [`CartError::UnexpectedStatus`] on anything but 200.
	#[instrument(skip(self))]
	pub async fn section(&self, section_id: &str) -> CartResult<String> {
		let response = self.transport.send(ApiRequest::get(self.url(&format!("?section_id={}", section_id)))).await?;
		if response.status != 200 {
			warn!("Failed to load section: status {}", response.status);
			return Err(CartError::UnexpectedStatus(response.status));
		}
		Ok(response.body)
	}

	async fn mutate(&self, request: ApiRequest) -> CartResult<RawResponse> {
		let response = self.transport.send(request).await?;
		// The server answered, so the cart may have changed even if the status is an error (partial adds).
		if let Some(signal) = &self.signal {
			signal.notify();
		}
		Ok(response)
	}
}

#[cfg(feature = "dangerous-logging")]
fn log_cart(cart: &CartSnapshot) {
	debug!(token = %cart.token, keys = ?cart.items.iter().map(|item| item.key.as_str()).collect::<Vec<_>>(), "Read cart.");
}

#[cfg(not(feature = "dangerous-logging"))]
fn log_cart(cart: &CartSnapshot) {
	debug!(lines = cart.items.len(), item_count = cart.item_count, "Read cart.");
}
