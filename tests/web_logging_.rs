#![allow(dead_code)]

use std::sync::Once;

static LOG_INITIALIZED: Once = Once::new();

pub fn init() {
	//TODO: Fail on warnings and errors.
	LOG_INITIALIZED.call_once(tracing_wasm::set_as_global_default);
}
