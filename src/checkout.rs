//! Switching a subscription cart onto the storefront's alternative selling plans right before checkout, and back.
//!
//! The storefront renders a section containing a `<template>` with a JSON object mapping line keys to the selling plan
//! each line should be checked out with. Switching re-adds every line with its mapped plan and leaves its original plan
//! in the [`SELLING_PLAN_INTENT`] property, which [`revert_items`] uses to undo the switch on the next page load.

use crate::{
	bus::Subscription,
	config::WatcherConfig,
	error::{CartError, CartResult},
	fetch::{AddItem, AddItems, Transport},
	model::{CartSnapshot, SELLING_PLAN_INTENT},
	watcher::CartWatcher,
};
use hashbrown::HashMap;
use serde_json::Value;
use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};
use tracing::{error, info, instrument, trace, warn};

/// Line key → selling plan id to check out with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SellingPlanMap(HashMap<String, u64>);

impl SellingPlanMap {
	/// Reads the JSON object embedded in the first `<template>` of `html`. `null` entries are skipped.
	///
	/// A fragment without a template yields an empty map.
	///
	/// # Errors
	///
	/// [`CartError::MalformedSection`] iff the template doesn't hold a JSON object of plan ids.
	pub fn from_section_html(html: &str) -> CartResult<Self> {
		let json = match template_contents(html) {
			Some(json) if !json.trim().is_empty() => json,
			_ => return Ok(Self::default()),
		};
		let raw: serde_json::Map<String, Value> = serde_json::from_str(json).map_err(|error| CartError::MalformedSection(error.to_string()))?;

		let mut plans = HashMap::with_capacity(raw.len());
		for (key, value) in raw {
			let plan = match &value {
				Value::Null => continue,
				Value::Number(number) => number.as_u64(),
				Value::String(string) => string.parse().ok(),
				_ => None,
			};
			match plan {
				Some(plan) => {
					plans.insert(key, plan);
				}
				None => return Err(CartError::MalformedSection(format!("Not a selling plan id: {}", value))),
			}
		}
		Ok(Self(plans))
	}

	#[must_use]
	pub fn get(&self, line_key: &str) -> Option<u64> {
		self.0.get(line_key).copied()
	}

	#[must_use]
	pub fn contains(&self, line_key: &str) -> bool {
		self.0.contains_key(line_key)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl FromIterator<(String, u64)> for SellingPlanMap {
	fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

fn template_contents(html: &str) -> Option<&str> {
	let open = html.find("<template")?;
	let content_start = open + html[open..].find('>')? + 1;
	let content_len = html[content_start..].find("</template>")?;
	Some(&html[content_start..content_start + content_len])
}

/// Every subscription line has an alternative plan, so the switch can proceed.
#[must_use]
pub fn checkout_ready(cart: &CartSnapshot, plans: &SellingPlanMap) -> bool {
	cart.subscription_lines().count() == plans.len()
}

#[must_use]
pub fn needs_switch(cart: &CartSnapshot, plans: &SellingPlanMap) -> bool {
	cart.subscription_lines().any(|item| plans.contains(&item.key))
}

/// Some line is billed on a different interval than it's delivered on. Such carts keep the standard checkout.
#[must_use]
pub fn has_prepaid_plan(cart: &CartSnapshot) -> bool {
	cart.subscription_lines()
		.filter_map(|item| item.selling_plan_allocation.as_ref())
		.any(|allocation| allocation.selling_plan.frequencies().is_prepaid())
}

/// The whole cart re-added with mapped plans, remembering each replaced plan in [`SELLING_PLAN_INTENT`].
#[must_use]
pub fn switch_items(cart: &CartSnapshot, plans: &SellingPlanMap) -> AddItems {
	let items = cart
		.items
		.iter()
		.map(|item| {
			let mut properties = item.properties.clone();
			let selling_plan = item.selling_plan_allocation.as_ref().map(|allocation| {
				let current = allocation.selling_plan.id;
				match plans.get(&item.key) {
					Some(mapped) => {
						properties.insert(SELLING_PLAN_INTENT.to_owned(), current.to_string());
						mapped
					}
					None => current,
				}
			});
			AddItem { id: item.variant_id, quantity: item.quantity, properties, selling_plan }
		})
		.collect();
	AddItems { attributes: cart.attributes.clone(), items }
}

/// The whole cart re-added with each remembered plan restored and its intent marker blanked, or `None` if no line
/// carries an intent marker.
///
/// Lines without a marker keep whatever plan they currently have.
#[must_use]
pub fn revert_items(cart: &CartSnapshot) -> Option<AddItems> {
	if !cart.items.iter().any(|item| item.selling_plan_intent().is_some()) {
		return None;
	}

	let items = cart
		.items
		.iter()
		.map(|item| {
			let current = item.selling_plan_allocation.as_ref().map(|allocation| allocation.selling_plan.id);
			match item.selling_plan_intent() {
				Some(intent) => {
					let mut properties = item.properties.clone();
					properties.insert(SELLING_PLAN_INTENT.to_owned(), String::new());
					let selling_plan = intent.parse().ok().or_else(|| {
						warn!("Unreadable selling plan intent {:?}. Keeping the current plan.", intent);
						current
					});
					AddItem { id: item.variant_id, quantity: item.quantity, properties, selling_plan }
				}
				None => AddItem { id: item.variant_id, quantity: item.quantity, properties: item.properties.clone(), selling_plan: current },
			}
		})
		.collect();
	Some(AddItems { attributes: cart.attributes.clone(), items })
}

/// Where to send the shopper once the cart is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutTarget {
	/// Nothing needed switching.
	Standard,
	/// The cart was switched. Accelerated wallets don't support the switched plans.
	SkipShopPay,
}

impl CheckoutTarget {
	#[must_use]
	pub fn path(self) -> &'static str {
		match self {
			CheckoutTarget::Standard => "/checkout",
			CheckoutTarget::SkipShopPay => "/checkout?skip_shop_pay=true",
		}
	}

	/// Navigates the current window.
	///
	/// # Errors
	///
	/// Iff there is no `window` or navigation was refused.
	pub fn navigate(self) -> CartResult<()> {
		let window = web_sys::window().ok_or_else(|| CartError::Transport("No `window` to navigate.".to_owned()))?;
		window.location().set_href(self.path())?;
		Ok(())
	}
}

/// The checkout-link widget's cart logic.
///
/// Clones are handles to the same catalogue.
pub struct CheckoutSwitcher<T: Transport + 'static> {
	state: Rc<State<T>>,
}

impl<T: Transport + 'static> Clone for CheckoutSwitcher<T> {
	fn clone(&self) -> Self {
		Self { state: self.state.clone() }
	}
}

struct State<T: Transport + 'static> {
	watcher: CartWatcher<T>,
	section_id: String,
	plans: RefCell<SellingPlanMap>,
	ready: Cell<bool>,
}

impl<T: Transport + 'static> CheckoutSwitcher<T> {
	#[must_use]
	pub fn new(watcher: CartWatcher<T>, config: &WatcherConfig) -> Self {
		Self {
			state: Rc::new(State {
				watcher,
				section_id: config.selling_plans_section.clone(),
				plans: RefCell::default(),
				ready: Cell::new(false),
			}),
		}
	}

	#[must_use]
	pub fn selling_plans(&self) -> SellingPlanMap {
		self.state.plans.borrow().clone()
	}

	/// Whether the last catalogue refresh found a plan for every subscription line.
	#[must_use]
	pub fn is_ready(&self) -> bool {
		self.state.ready.get()
	}

	/// Refreshes the catalogue in the background after every published cart change that leaves subscription lines in
	/// the cart, since line keys change along with selling plans.
	#[must_use = "Dropping the `Subscription` stops watching immediately."]
	pub fn watch(&self) -> Subscription {
		let state = Rc::downgrade(&self.state);
		self.state.watcher.bus().subscribe(move |_| Self::refresh_in_background(&state))
	}

	fn refresh_in_background(state: &Weak<State<T>>) {
		let switcher = match state.upgrade() {
			Some(state) => Self { state },
			None => return trace!("Checkout switcher dropped. Ignoring cart change."),
		};
		if !switcher.state.watcher.cached_snapshot().has_selling_plan() {
			trace!("No subscription lines. Keeping the catalogue.");
			return;
		}
		let watcher = switcher.state.watcher.clone();
		watcher.spawn(Box::pin(async move {
			if let Err(error) = switcher.refresh_selling_plans().await {
				warn!("Background selling plan refresh failed: {}", error);
			}
		}));
	}

	/// Reloads the plan catalogue and reports whether the (stored) cart is [ready](`checkout_ready`).
	///
	/// # Errors
	///
	/// Section fetch or parse errors. The catalogue is left empty in that case.
	#[instrument(skip(self))]
	pub async fn refresh_selling_plans(&self) -> CartResult<bool> {
		let state = &self.state;
		state.plans.borrow_mut().0.clear();
		state.ready.set(false);
		let html = state.watcher.client().section(&state.section_id).await?;
		let plans = SellingPlanMap::from_section_html(&html).map_err(|error| {
			error!("Failed to load selling plans: {}", error);
			error
		})?;
		trace!("Loaded {} selling plan mapping(s).", plans.len());
		let ready = checkout_ready(&state.watcher.cached_snapshot(), &plans);
		*state.plans.borrow_mut() = plans;
		state.ready.set(ready);
		Ok(ready)
	}

	/// Switches the cart if any line has an alternative plan.
	///
	/// Monitoring is paused for the duration. On failure it is resumed and the error returned, so the shopper can
	/// retry; the cart may then be partially switched until the next [`revert`](`CheckoutSwitcher::revert`).
	///
	/// # Errors
	///
	/// Cart API errors, unchanged.
	#[instrument(skip(self))]
	pub async fn switch(&self) -> CartResult<CheckoutTarget> {
		let cart = self.state.watcher.cached_snapshot();
		let plans = self.selling_plans();
		if !needs_switch(&cart, &plans) {
			trace!("No line needs switching.");
			return Ok(CheckoutTarget::Standard);
		}

		let add = switch_items(&cart, &plans);
		self.state.watcher.stop_monitoring();
		match self.replace_cart(&add).await {
			Ok(()) => {
				info!("Switched {} line(s) for checkout.", add.items.len());
				Ok(CheckoutTarget::SkipShopPay)
			}
			Err(error) => {
				error!("Failed to switch the cart: {}", error);
				self.state.watcher.start_monitoring();
				Err(error)
			}
		}
	}

	/// Undoes an earlier switch that didn't end in a checkout. Returns whether anything was reverted.
	///
	/// # Errors
	///
	/// Cart API errors, unchanged.
	#[instrument(skip(self))]
	pub async fn revert(&self) -> CartResult<bool> {
		let cart = self.state.watcher.fetch_authoritative().await?;
		let add = match revert_items(&cart) {
			Some(add) => add,
			None => return Ok(false),
		};
		self.replace_cart(&add).await?;
		info!("Reverted {} line(s).", add.items.len());
		Ok(true)
	}

	async fn replace_cart(&self, add: &AddItems) -> CartResult<()> {
		self.state.watcher.client().clear().await?;
		self.state.watcher.client().add_items(add).await
	}
}
