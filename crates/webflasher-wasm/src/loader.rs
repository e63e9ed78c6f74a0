//! Bindings to the page-provided flashing library
//!
//! The serial bootloader protocol lives in a JavaScript library loaded by
//! the hosting page, which installs one global factory:
//!
//! ```text
//! createFlashLoader(port, baudRate) -> Promise<loader>
//! ```
//!
//! The resolved loader object must expose `chipName()`, `macAddr()`,
//! `eraseFlash()`, `writeFlash(bytes, offset, compress, onProgress)` and
//! `disconnect()`, all returning promises. `onProgress` is called with
//! `(bytesWritten, totalBytes)`.

use futures::channel::mpsc;
use futures::{FutureExt, StreamExt};
use js_sys::Uint8Array;
use maybe_async::maybe_async;
use wasm_bindgen::prelude::*;

use webflasher_core::error::FlashError;
use webflasher_core::flasher::{ChipIdentity, FlashProgress, Flasher, WriteOptions};

#[wasm_bindgen]
extern "C" {
    /// Loader object resolved by the page-provided factory.
    type FlashLoader;

    #[wasm_bindgen(catch, js_name = createFlashLoader)]
    async fn create_flash_loader(port: &JsValue, baud_rate: u32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = chipName)]
    async fn chip_name(this: &FlashLoader) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = macAddr)]
    async fn mac_addr(this: &FlashLoader) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = eraseFlash)]
    async fn erase_flash(this: &FlashLoader) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = writeFlash)]
    async fn write_flash(
        this: &FlashLoader,
        data: &Uint8Array,
        offset: u32,
        compress: bool,
        on_progress: &js_sys::Function,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    async fn disconnect(this: &FlashLoader) -> Result<(), JsValue>;
}

/// Readable text for a JS error value.
fn js_error_text(error: &JsValue) -> String {
    error
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(error, &JsValue::from_str("message"))
                .ok()
                .and_then(|v| v.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", error))
}

/// The external flashing capability, backed by the page's loader library.
pub struct EspLoader;

/// One open loader session.
pub struct LoaderSession {
    loader: FlashLoader,
}

#[maybe_async(AFIT)]
impl Flasher for EspLoader {
    type Port = JsValue;
    type Session = LoaderSession;

    async fn connect(&mut self, port: JsValue, baud: u32) -> Result<LoaderSession, FlashError> {
        let loader = create_flash_loader(&port, baud)
            .await
            .map_err(|e| FlashError::Connect(js_error_text(&e)))?;
        log::info!("loader: connected at {} baud", baud);
        Ok(LoaderSession {
            loader: loader.unchecked_into(),
        })
    }

    async fn chip_identity(
        &mut self,
        session: &mut LoaderSession,
    ) -> Result<ChipIdentity, FlashError> {
        let chip = session
            .loader
            .chip_name()
            .await
            .map_err(|e| FlashError::Probe(js_error_text(&e)))?
            .as_string()
            .ok_or_else(|| FlashError::Probe("chip name was not a string".to_string()))?;

        // The MAC is nice to have; a loader without it is still usable.
        let mac = match session.loader.mac_addr().await {
            Ok(value) => value.as_string(),
            Err(e) => {
                log::debug!("loader: mac read failed: {}", js_error_text(&e));
                None
            }
        };

        Ok(ChipIdentity { chip, mac })
    }

    async fn erase_flash(&mut self, session: &mut LoaderSession) -> Result<(), FlashError> {
        session
            .loader
            .erase_flash()
            .await
            .map_err(|e| FlashError::Erase(js_error_text(&e)))
    }

    async fn write_image<P: FlashProgress>(
        &mut self,
        session: &mut LoaderSession,
        image: &[u8],
        options: &WriteOptions,
        progress: &mut P,
    ) -> Result<(), FlashError> {
        let data = Uint8Array::from(image);

        // The JS callback must be 'static, so it feeds a channel that is
        // drained here while the write future is polled.
        let (tx, mut rx) = mpsc::unbounded::<(usize, usize)>();
        let callback = Closure::<dyn FnMut(f64, f64)>::new(move |written: f64, total: f64| {
            let _ = tx.unbounded_send((written as usize, total as usize));
        });

        let write = session
            .loader
            .write_flash(
                &data,
                options.offset,
                options.compress,
                callback.as_ref().unchecked_ref(),
            )
            .fuse();
        futures::pin_mut!(write);

        let result = loop {
            futures::select! {
                result = write => break result,
                update = rx.next() => {
                    if let Some((written, total)) = update {
                        progress.written(written, total);
                    }
                }
            }
        };

        // Deliver progress that raced with completion.
        while let Ok(Some((written, total))) = rx.try_next() {
            progress.written(written, total);
        }
        drop(callback);

        result.map_err(|e| FlashError::Write(js_error_text(&e)))
    }

    async fn disconnect(&mut self, session: LoaderSession) -> Result<(), FlashError> {
        session
            .loader
            .disconnect()
            .await
            .map_err(|e| FlashError::Disconnect(js_error_text(&e)))
    }
}
