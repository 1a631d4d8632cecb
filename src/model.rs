//! The cart as the storefront's `cart.js` endpoint describes it.
//!
//! Only the fields widgets actually read are modelled. Everything is defaulted on input so that a partial payload
//! (or the empty stored cart) still deserializes; whether a payload is a *real* cart is decided by
//! [`check_response`](`crate::fetch::check_response`), not here.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Line item properties. Values are always strings here: `null` entries are dropped and scalars stringified on input.
pub type LineProperties = BTreeMap<String, String>;

/// Marker property holding the selling plan a line had before a checkout switch.
pub const SELLING_PLAN_INTENT: &str = "_selling_plan_id";
/// Marker property holding the selling plan chosen through the cart subscription toggle.
pub const SUBSCRIBE_MARKER: &str = "_juo_subscribe_cart";
/// Marker property naming the widget that attached a selling plan.
pub const SOURCE_MARKER: &str = "_juo_source";
pub const SOURCE_SUBSCRIBE_CART: &str = "subscribe-cart";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartSnapshot {
	pub token: String,
	pub note: Option<String>,
	pub attributes: BTreeMap<String, String>,
	pub total_price: u64,
	pub total_weight: f64,
	pub item_count: u32,
	pub items: Vec<LineItem>,
	pub requires_shipping: bool,
	pub currency: String,
	pub items_subtotal_price: u64,
	pub original_total_price: u64,
	pub total_discount: u64,
	pub cart_level_discount_applications: Vec<DiscountApplication>,
}

impl CartSnapshot {
	/// A cart without items or token, which is what an untouched store holds.
	#[must_use]
	pub fn empty() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn line(&self, key: &str) -> Option<&LineItem> {
		self.items.iter().find(|item| item.key == key)
	}

	/// Lines that currently carry subscription pricing.
	pub fn subscription_lines(&self) -> impl Iterator<Item = &LineItem> {
		self.items.iter().filter(|item| item.selling_plan_allocation.is_some())
	}

	#[must_use]
	pub fn has_selling_plan(&self) -> bool {
		self.subscription_lines().next().is_some()
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItem {
	pub id: u64,
	/// Stable across quantity changes, but not across removal and re-adding.
	pub key: String,
	pub variant_id: u64,
	pub product_id: u64,
	pub quantity: u32,
	pub title: String,
	pub product_title: String,
	pub variant_title: Option<String>,
	pub sku: Option<String>,
	pub url: String,
	pub image: Option<String>,
	pub price: u64,
	pub line_price: u64,
	pub final_price: u64,
	pub final_line_price: u64,
	#[serde(deserialize_with = "string_properties")]
	pub properties: LineProperties,
	pub selling_plan_allocation: Option<SellingPlanAllocation>,
}

impl LineItem {
	/// A copy of this line with a different quantity, as used for partial diff entries.
	#[must_use]
	pub fn with_quantity(&self, quantity: u32) -> Self {
		Self { quantity, ..self.clone() }
	}

	/// The unit price the shopper pays, taking subscription pricing into account.
	#[must_use]
	pub fn effective_price(&self) -> u64 {
		self.selling_plan_allocation.as_ref().map_or(self.final_price, |allocation| allocation.price)
	}

	/// The non-empty selling plan intent marker left behind by a checkout switch, if any.
	#[must_use]
	pub fn selling_plan_intent(&self) -> Option<&str> {
		self.properties.get(SELLING_PLAN_INTENT).map(String::as_str).filter(|intent| !intent.is_empty())
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellingPlanAllocation {
	pub price: u64,
	pub compare_at_price: u64,
	pub per_delivery_price: u64,
	pub price_adjustments: Vec<AllocationPriceAdjustment>,
	pub selling_plan: SellingPlan,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPriceAdjustment {
	pub position: u32,
	pub price: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellingPlan {
	pub id: u64,
	pub name: String,
	pub description: Option<String>,
	pub options: Vec<SellingPlanOption>,
	pub recurring_deliveries: bool,
	pub fixed_selling_plan: bool,
	pub price_adjustments: Vec<PlanPriceAdjustment>,
}

impl SellingPlan {
	/// Parses the first option's `df:<n> <unit>;bf:<m> <unit>` encoding.
	#[must_use]
	pub fn frequencies(&self) -> PlanFrequencies {
		let Some(option) = self.options.first() else {
			return PlanFrequencies::default();
		};
		let mut tokens = option.value.split(';');
		PlanFrequencies {
			delivery: tokens.next().and_then(|token| frequency(token, "df:")),
			billing: tokens.next().and_then(|token| frequency(token, "bf:")),
		}
	}
}

fn frequency(token: &str, prefix: &str) -> Option<u32> {
	let count = token.trim().split(' ').next()?;
	count.strip_prefix(prefix).unwrap_or(count).parse().ok()
}

/// Delivery and billing intervals of a plan, in the plan's own unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanFrequencies {
	pub delivery: Option<u32>,
	pub billing: Option<u32>,
}

impl PlanFrequencies {
	/// Billed less often than delivered, i.e. paid up front.
	#[must_use]
	pub fn is_prepaid(self) -> bool {
		matches!((self.delivery, self.billing), (Some(delivery), Some(billing)) if delivery != billing)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellingPlanOption {
	pub name: String,
	pub position: u32,
	pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanPriceAdjustment {
	pub order_count: Option<u32>,
	pub position: u32,
	pub value_type: String,
	pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountApplication {
	#[serde(rename = "type")]
	pub kind: String,
	pub key: String,
	pub title: String,
	pub description: Option<String>,
	pub value: String,
	pub created_at: String,
	pub value_type: String,
	pub allocation_method: String,
	pub target_selection: String,
	pub target_type: String,
	pub total_allocated_amount: u64,
}

fn string_properties<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LineProperties, D::Error> {
	let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
	Ok(raw
		.unwrap_or_default()
		.into_iter()
		.filter_map(|(name, value)| match value {
			serde_json::Value::Null => None,
			serde_json::Value::String(value) => Some((name, value)),
			other => Some((name, other.to_string())),
		})
		.collect())
}
