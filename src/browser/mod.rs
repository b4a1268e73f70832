//! Browser automation module
//!
//! Launches and drives a Chrome/Chromium instance over the DevTools Protocol.
//! Sessions run headful; headlessness comes from the virtual display.

mod errors;
mod session;

pub use errors::BrowserError;
pub use session::{BrowserSession, BrowserSessionConfig};
