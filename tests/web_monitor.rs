#![cfg(target_arch = "wasm32")]

use cart_watcher::{
	config::WatcherConfig,
	fetch::{ApiRequest, FetchTransport, Transport},
	monitor::{ChangeNotifier, MutationFilter, ResourceTimingMonitor},
};
use std::rc::Rc;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

mod web_logging_;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn resource_timing_lifecycle() {
	web_logging_::init();
	let mut monitor = ResourceTimingMonitor::new(MutationFilter::from_config(&WatcherConfig::default()));
	assert!(!monitor.is_running());

	monitor.start(Rc::new(|| ())).unwrap();
	assert!(monitor.is_running());

	// Restarting replaces the observer.
	monitor.start(Rc::new(|| ())).unwrap();
	assert!(monitor.is_running());

	monitor.stop();
	assert!(!monitor.is_running());
	monitor.stop();
}

#[wasm_bindgen_test]
fn config_without_shopify_global() {
	web_logging_::init();
	assert_eq!(WatcherConfig::from_window().routes_root, "/");
}

#[wasm_bindgen_test]
async fn fetch_resolves_with_any_status() {
	web_logging_::init();
	let response = FetchTransport.send(ApiRequest::get("/cart-watcher-missing.js".to_owned()).uncached()).await.unwrap();
	assert!(response.status >= 200);
}
