use thiserror::Error;
use wasm_bindgen::JsValue;

/// Everything that can go wrong between this crate and the storefront's cart endpoints.
///
/// The first three variants mirror the storefront's own error payloads.
#[derive(Error, Debug)]
pub enum CartError {
	/// The endpoint answered with status 404.
	#[error("Cannot find variant")]
	VariantNotFound,

	/// The endpoint answered with status 422, usually because of stock limits.
	#[error("Inventory unavailable: {0}")]
	InventoryUnavailable(String),

	/// The response parsed, but carried no cart token.
	#[error("No token provided in the cart response")]
	MalformedResponse,

	/// Any other non-success status.
	#[error("Unexpected status {0}")]
	UnexpectedStatus(u16),

	/// `fetch` was rejected or threw.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The body wasn't the JSON it was supposed to be.
	#[error("Decode error: {0}")]
	Decode(#[from] serde_json::Error),

	/// The selling-plan section fragment couldn't be read.
	#[error("Malformed selling plan section: {0}")]
	MalformedSection(String),
}

impl From<JsValue> for CartError {
	fn from(js_val: JsValue) -> Self {
		let message = js_val.as_string().unwrap_or_else(|| format!("{:?}", js_val));
		CartError::Transport(message)
	}
}

impl From<CartError> for JsValue {
	fn from(err: CartError) -> Self {
		JsValue::from_str(&err.to_string())
	}
}

pub type CartResult<T> = Result<T, CartError>;
