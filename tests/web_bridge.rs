#![cfg(target_arch = "wasm32")]

use cart_watcher::{bus::WindowEventBridge, CartDiff, ChangeBus};
use js_sys::{Array, Reflect};
use std::{cell::RefCell, rc::Rc};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, CustomEvent};

mod scripted_transport_;
mod web_logging_;
use scripted_transport_::line;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn dispatches_custom_events() {
	web_logging_::init();
	let window = window().unwrap();
	let details = Rc::new(RefCell::new(Vec::<JsValue>::new()));

	let listener = Closure::wrap(Box::new({
		let details = details.clone();
		move |event: web_sys::Event| {
			let event = event.dyn_into::<CustomEvent>().expect("Expected CustomEvent but received something else.");
			details.borrow_mut().push(event.detail());
		}
	}) as Box<dyn FnMut(web_sys::Event)>);
	window.add_event_listener_with_callback("cart_changed_test", listener.as_ref().unchecked_ref()).unwrap();

	let bus = ChangeBus::new();
	let bridge = WindowEventBridge::attach(&bus, "cart_changed_test");
	bus.publish(&CartDiff { added: vec![line("a", 2)], removed: vec![line("b", 1), line("c", 1)] });

	{
		let details = details.borrow();
		assert_eq!(details.len(), 1);
		let added: Array = Reflect::get(&details[0], &"added".into()).unwrap().dyn_into().unwrap();
		let removed: Array = Reflect::get(&details[0], &"removed".into()).unwrap().dyn_into().unwrap();
		assert_eq!((added.length(), removed.length()), (1, 2));
		assert_eq!(Reflect::get(&added.get(0), &"key".into()).unwrap().as_string().as_deref(), Some("a"));
		assert_eq!(Reflect::get(&added.get(0), &"quantity".into()).unwrap().as_f64(), Some(2.));
	}

	drop(bridge);
	bus.publish(&CartDiff { added: vec![line("d", 1)], removed: vec![] });
	assert_eq!(details.borrow().len(), 1);

	window.remove_event_listener_with_callback("cart_changed_test", listener.as_ref().unchecked_ref()).unwrap();
}
