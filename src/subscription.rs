use crate::{
	error::CartResult,
	fetch::{LineChange, Transport},
	model::{CartSnapshot, LineProperties, SOURCE_MARKER, SOURCE_SUBSCRIBE_CART, SUBSCRIBE_MARKER},
	watcher::CartWatcher,
};
use tracing::{instrument, trace, warn};

/// Attaches selling plans to (or strips them from) cart lines in place, for the cart page's subscribe toggles.
pub struct SubscriptionToggle<T: Transport + 'static> {
	watcher: CartWatcher<T>,
}

impl<T: Transport + 'static> SubscriptionToggle<T> {
	#[must_use]
	pub fn new(watcher: CartWatcher<T>) -> Self {
		Self { watcher }
	}

	/// Puts every line of `variant_id` on `selling_plan`.
	///
	/// Returns the cart as of the last change, or `None` if no line matched.
	///
	/// # Errors
	///
	/// Cart API errors, unchanged. Lines changed before the error stay changed.
	#[instrument(skip(self))]
	pub async fn set_selling_plan(&self, variant_id: u64, selling_plan: u64) -> CartResult<Option<CartSnapshot>> {
		self.change_variant(variant_id, Some(selling_plan), |properties| {
			properties.insert(SUBSCRIBE_MARKER.to_owned(), selling_plan.to_string());
			properties.insert(SOURCE_MARKER.to_owned(), SOURCE_SUBSCRIBE_CART.to_owned());
		})
		.await
	}

	/// Returns every line of `variant_id` to one-time purchase pricing.
	///
	/// # Errors
	///
	/// As [`set_selling_plan`](`SubscriptionToggle::set_selling_plan`).
	#[instrument(skip(self))]
	pub async fn remove_selling_plan(&self, variant_id: u64) -> CartResult<Option<CartSnapshot>> {
		self.change_variant(variant_id, None, |properties| {
			properties.remove(SUBSCRIBE_MARKER);
		})
		.await
	}

	async fn change_variant(&self, variant_id: u64, selling_plan: Option<u64>, edit: impl Fn(&mut LineProperties)) -> CartResult<Option<CartSnapshot>> {
		let cart = self.watcher.fetch_authoritative().await?;

		let mut latest = None;
		for item in cart.items.iter().filter(|item| item.variant_id == variant_id) {
			let mut properties = item.properties.clone();
			edit(&mut properties);
			let change = LineChange { id: item.key.clone(), quantity: item.quantity, selling_plan, properties };
			latest = Some(self.watcher.client().change_line(&change).await?);
		}

		if latest.is_none() {
			trace!("No line of this variant in the cart.");
			return Ok(None);
		}

		// Line keys depend on the selling plan, so the change is visible to the line diff.
		if let Err(error) = self.watcher.reconcile().await {
			warn!("Reconcile after changing selling plans failed: {}", error);
		}
		Ok(latest)
	}
}
