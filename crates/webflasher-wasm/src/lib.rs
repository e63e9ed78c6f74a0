//! webflasher-wasm - Browser front-end for the webflasher installer
//!
//! This crate provides the browser-based installer panel: an egui wizard
//! over the core flow, WebSerial for port selection, and the hosting
//! page's flashing library for the bootloader protocol itself.

#![warn(missing_docs)]

mod app;
mod loader;
mod net;
mod serial;

pub use app::WebflasherApp;

use wasm_bindgen::prelude::*;

/// Initialize the web application
///
/// This is the entry point called from the HTML page.
#[wasm_bindgen(start)]
pub fn main() {
    // Set up panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging
    console_log::init_with_level(log::Level::Debug).expect("Failed to initialize logger");

    log::info!("webflasher-wasm starting...");

    // Start the egui app
    let web_options = eframe::WebOptions::default();

    wasm_bindgen_futures::spawn_local(async {
        let canvas = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id("webflasher_canvas"))
            .and_then(|e| e.dyn_into::<web_sys::HtmlCanvasElement>().ok())
            .expect("Failed to find canvas element 'webflasher_canvas'");

        let result = eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(|cc| Ok(Box::new(WebflasherApp::new(cc)))),
            )
            .await;

        if let Err(e) = result {
            log::error!("Failed to start eframe: {:?}", e);
        }
    });
}
