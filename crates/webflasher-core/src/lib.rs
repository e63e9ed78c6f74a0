//! webflasher-core - Core logic for the webflasher firmware installer
//!
//! This crate holds everything the browser front-end drives: the firmware
//! manifest resolver with its TTL cache, the mirror-fallback download
//! pipeline, and the wizard state machine that sequences port selection,
//! device identity, confirmation, flashing, and teardown.
//!
//! The serial bootloader protocol itself is not implemented here. The flow
//! only talks to an external flashing capability through the narrow
//! [`flasher::Flasher`] trait (connect, identity probe, erase, write with
//! byte progress, disconnect), and to the platform through the
//! [`transport::SerialPicker`], [`fetch::ByteFetcher`], and
//! [`manifest::CacheStore`] seams.
//!
//! # Features
//!
//! - `is_sync` - Compile the async seams as synchronous. The browser build
//!   uses async mode; native test consumers enable `is_sync`.
//!
//! # Example
//!
//! ```ignore
//! use webflasher_core::flow::FlashFlow;
//!
//! let mut flow = FlashFlow::new(picker, flasher);
//! flow.select_release(asset);
//! if let ConnectOutcome::Connected(id) = flow.begin_connect().await? {
//!     println!("connected to {}", id.chip);
//!     flow.confirm_and_flash(&mut fetcher, &mut progress).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

pub mod error;
pub mod fetch;
pub mod flasher;
pub mod flow;
pub mod manifest;
pub mod transport;

pub use error::{FlowError, Result};
