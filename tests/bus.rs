use cart_watcher::{CartDiff, ChangeBus};
use std::{cell::RefCell, rc::Rc};

mod scripted_transport_;
use scripted_transport_::line;

fn added(key: &str) -> CartDiff {
	CartDiff { added: vec![line(key, 1)], removed: vec![] }
}

#[test]
fn every_subscriber_once_per_publish() {
	let bus = ChangeBus::new();
	let seen = Rc::new(RefCell::new(Vec::new()));

	let subscriptions: Vec<_> = (0..3)
		.map(|i| {
			let seen = seen.clone();
			bus.subscribe(move |diff| seen.borrow_mut().push((i, diff.added[0].key.clone())))
		})
		.collect();

	assert_eq!(bus.publish(&added("a")), 3);
	assert_eq!(bus.publish(&added("b")), 3);

	let mut seen = seen.borrow().clone();
	seen.sort();
	assert_eq!(
		seen,
		vec![(0, "a".to_owned()), (0, "b".to_owned()), (1, "a".to_owned()), (1, "b".to_owned()), (2, "a".to_owned()), (2, "b".to_owned())]
	);
	drop(subscriptions);
}

#[test]
fn dropping_the_subscription_unsubscribes() {
	let bus = ChangeBus::new();
	let count = Rc::new(RefCell::new(0));

	let subscription = bus.subscribe({
		let count = count.clone();
		move |_| *count.borrow_mut() += 1
	});
	bus.publish(&added("a"));
	drop(subscription);
	bus.publish(&added("b"));

	assert_eq!(*count.borrow(), 1);
	assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn detached_subscription_stays() {
	let bus = ChangeBus::new();
	let count = Rc::new(RefCell::new(0));

	bus.subscribe({
		let count = count.clone();
		move |_| *count.borrow_mut() += 1
	})
	.detach();
	bus.clone().publish(&added("a"));

	assert_eq!(*count.borrow(), 1);
	assert_eq!(bus.subscriber_count(), 1);
}

#[test]
fn subscribing_while_publishing() {
	let bus = ChangeBus::new();
	let late = Rc::new(RefCell::new(Vec::new()));

	let subscription = bus.subscribe({
		let bus = bus.clone();
		let late = late.clone();
		move |_| late.borrow_mut().push(bus.subscribe(|_| ()))
	});

	assert_eq!(bus.publish(&added("a")), 1);
	assert_eq!(bus.subscriber_count(), 2);
	drop(subscription);
	late.borrow_mut().clear();
	assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn subscription_outliving_the_bus() {
	let bus = ChangeBus::new();
	let subscription = bus.subscribe(|_| ());
	drop(bus);
	drop(subscription);
}
