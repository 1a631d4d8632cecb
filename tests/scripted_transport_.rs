#![allow(dead_code)]

use async_trait::async_trait;
use cart_watcher::{
	error::{CartError, CartResult},
	fetch::{ApiRequest, CartClient, RawResponse, Transport},
	model::{CartSnapshot, LineItem, SellingPlan, SellingPlanAllocation, SellingPlanOption},
	store::{MemorySlot, SnapshotSlot},
	watcher::Spawner,
};
use futures::{channel::oneshot, executor::LocalPool, task::LocalSpawnExt};
use serde_json::{json, Value};
use std::{cell::RefCell, collections::VecDeque, rc::Rc};

/// Answers requests from per-URL queues. The last queued reply for a URL is repeated.
#[derive(Clone, Default)]
pub struct ScriptedTransport(Rc<RefCell<Script>>);

#[derive(Default)]
struct Script {
	routes: Vec<(String, VecDeque<Option<RawResponse>>)>,
	requests: Vec<ApiRequest>,
	before_send: Option<Rc<dyn Fn(&ApiRequest)>>,
}

impl ScriptedTransport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reply(&self, url: &str, status: u16, body: impl Into<String>) -> &Self {
		self.queue(url, Some(RawResponse { status, body: body.into() }))
	}

	pub fn reply_cart(&self, cart: &Value) -> &Self {
		self.reply("/cart.js", 200, cart.to_string())
	}

	pub fn unreachable(&self, url: &str) -> &Self {
		self.queue(url, None)
	}

	fn queue(&self, url: &str, reply: Option<RawResponse>) -> &Self {
		let mut script = self.0.borrow_mut();
		match script.routes.iter_mut().find(|(route, _)| route == url) {
			Some((_, replies)) => replies.push_back(reply),
			None => script.routes.push((url.to_owned(), VecDeque::from(vec![reply]))),
		}
		self
	}

	/// Runs `hook` while a request is "in flight", before its reply is produced.
	pub fn before_send(&self, hook: impl Fn(&ApiRequest) + 'static) {
		self.0.borrow_mut().before_send = Some(Rc::new(hook));
	}

	pub fn requests(&self) -> Vec<ApiRequest> {
		self.0.borrow().requests.clone()
	}

	pub fn urls(&self) -> Vec<String> {
		self.requests().into_iter().map(|request| request.url).collect()
	}

	pub fn count(&self, url: &str) -> usize {
		self.requests().iter().filter(|request| request.url == url).count()
	}

	/// The JSON body of the last request to `url`.
	pub fn last_body(&self, url: &str) -> Value {
		let request = self.requests().into_iter().rev().find(|request| request.url == url).expect("no request to this URL");
		serde_json::from_str(request.body.as_deref().expect("request without body")).expect("body isn't JSON")
	}
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
	async fn send(&self, request: ApiRequest) -> CartResult<RawResponse> {
		let hook = self.0.borrow().before_send.clone();
		if let Some(hook) = hook {
			hook(&request);
		}

		let mut script = self.0.borrow_mut();
		script.requests.push(request.clone());
		let replies = match script.routes.iter_mut().find(|(route, _)| *route == request.url) {
			Some((_, replies)) => replies,
			None => return Err(CartError::Transport(format!("No scripted reply for {}", request.url))),
		};
		let reply = if replies.len() > 1 { replies.pop_front().unwrap() } else { replies.front().cloned().unwrap() };
		reply.ok_or_else(|| CartError::Transport("Scripted network failure".to_owned()))
	}
}

/// Holds every request until the test answers it, so that fetches can overlap.
#[derive(Clone, Default)]
pub struct GatedTransport(Rc<RefCell<VecDeque<(ApiRequest, oneshot::Sender<RawResponse>)>>>);

impl GatedTransport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn pending(&self) -> Vec<String> {
		self.0.borrow().iter().map(|(request, _)| request.url.clone()).collect()
	}

	/// Answers the oldest pending request.
	pub fn answer_oldest(&self, status: u16, body: impl Into<String>) {
		let (_, reply) = self.0.borrow_mut().pop_front().expect("no pending request");
		reply.send(RawResponse { status, body: body.into() }).expect("request was dropped");
	}

	/// Answers the newest pending request.
	pub fn answer_newest(&self, status: u16, body: impl Into<String>) {
		let (_, reply) = self.0.borrow_mut().pop_back().expect("no pending request");
		reply.send(RawResponse { status, body: body.into() }).expect("request was dropped");
	}
}

#[async_trait(?Send)]
impl Transport for GatedTransport {
	async fn send(&self, request: ApiRequest) -> CartResult<RawResponse> {
		let (sender, receiver) = oneshot::channel();
		self.0.borrow_mut().push_back((request, sender));
		receiver.await.map_err(|_| CartError::Transport("Gate closed".to_owned()))
	}
}

pub fn client(transport: &ScriptedTransport) -> CartClient<ScriptedTransport> {
	CartClient::new(transport.clone(), "/")
}

/// A `MemorySlot` that counts writes.
#[derive(Clone, Default)]
pub struct CountingSlot {
	pub slot: MemorySlot,
	pub writes: Rc<RefCell<usize>>,
}

impl SnapshotSlot for CountingSlot {
	fn read(&self) -> Option<String> {
		self.slot.read()
	}

	fn write(&self, value: &str) {
		*self.writes.borrow_mut() += 1;
		self.slot.write(value);
	}
}

pub fn pool_spawner(pool: &LocalPool) -> Spawner {
	let spawner = pool.spawner();
	Rc::new(move |future| spawner.spawn_local(future).expect("Local pool is gone."))
}

pub fn line(key: &str, quantity: u32) -> LineItem {
	LineItem { key: key.to_owned(), quantity, ..LineItem::default() }
}

pub fn snapshot(items: Vec<LineItem>) -> CartSnapshot {
	CartSnapshot { token: "token-1".to_owned(), items, ..CartSnapshot::empty() }
}

pub fn with_plan(mut item: LineItem, plan_id: u64, option: &str) -> LineItem {
	item.selling_plan_allocation = Some(SellingPlanAllocation {
		price: 900,
		compare_at_price: 1000,
		selling_plan: SellingPlan {
			id: plan_id,
			name: format!("Plan {}", plan_id),
			options: vec![SellingPlanOption { name: "Frequency".to_owned(), position: 1, value: option.to_owned() }],
			recurring_deliveries: true,
			..SellingPlan::default()
		},
		..SellingPlanAllocation::default()
	});
	item
}

/// `cart.js`-shaped JSON for `items` given as `(key, variant_id, quantity)`.
pub fn cart_json(items: &[(&str, u64, u32)]) -> Value {
	json!({
		"token": "token-1",
		"note": null,
		"attributes": {},
		"currency": "EUR",
		"item_count": items.iter().map(|&(_, _, quantity)| quantity).sum::<u32>(),
		"items": items
			.iter()
			.map(|&(key, variant_id, quantity)| json!({
				"key": key,
				"id": variant_id,
				"variant_id": variant_id,
				"quantity": quantity,
				"price": 1000,
				"final_price": 1000,
				"properties": null,
			}))
			.collect::<Vec<_>>(),
	})
}
