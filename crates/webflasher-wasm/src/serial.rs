//! WebSerial port selection
//!
//! Hand-written bindings for `navigator.serial`, which is not yet in
//! stable web-sys. Only the selection prompt is bound here; opening and
//! closing the port is the flashing library's job.

use maybe_async::maybe_async;
use wasm_bindgen::prelude::*;

use webflasher_core::error::TransportError;
use webflasher_core::transport::SerialPicker;

// WebSerial API bindings (not yet in stable web-sys)
#[wasm_bindgen]
extern "C" {
    /// Serial interface
    type Serial;

    #[wasm_bindgen(method, catch, js_name = requestPort)]
    async fn request_port(this: &Serial) -> Result<JsValue, JsValue>;
}

/// Serial picker backed by the browser's WebSerial prompt.
pub struct WebSerialPicker;

impl WebSerialPicker {
    /// Whether this browser exposes WebSerial at all.
    pub fn is_supported() -> bool {
        web_sys::window()
            .map(|w| {
                js_sys::Reflect::has(w.navigator().as_ref(), &JsValue::from_str("serial"))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// The `navigator.serial` object, when the browser provides one.
    fn serial() -> Option<Serial> {
        let navigator = web_sys::window()?.navigator();
        let serial = js_sys::Reflect::get(navigator.as_ref(), &JsValue::from_str("serial")).ok()?;
        if serial.is_undefined() || serial.is_null() {
            return None;
        }
        Some(serial.unchecked_into())
    }
}

/// The `name` property of a thrown DOMException.
fn error_name(error: &JsValue) -> String {
    js_sys::Reflect::get(error, &JsValue::from_str("name"))
        .ok()
        .and_then(|v| v.as_string())
        .unwrap_or_default()
}

#[maybe_async(AFIT)]
impl SerialPicker for WebSerialPicker {
    type Port = JsValue;

    async fn request_port(&mut self) -> Result<JsValue, TransportError> {
        let serial = Self::serial().ok_or_else(|| {
            TransportError::Unavailable("this browser does not support WebSerial".to_string())
        })?;

        match serial.request_port().await {
            Ok(port) => {
                log::info!("serial: port granted");
                Ok(port)
            }
            // The prompt rejects with NotFoundError when dismissed.
            Err(e) if error_name(&e) == "NotFoundError" => {
                Err(TransportError::SelectionCancelled)
            }
            Err(e) => Err(TransportError::Io(format!("{:?}", e))),
        }
    }
}
