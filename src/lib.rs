//! Browser automation for hosted AI chat services.
//!
//! chorus drives real, logged-in web sessions of ChatGPT, Claude, Gemini,
//! Perplexity, and Grok over the Chrome DevTools Protocol. A small helper
//! bundle installed into each tab answers DOM queries; every decision
//! about which element to drive, what to type, and when a response is
//! finished stays in Rust.
//!
//! The crate is layered:
//!
//! * Strategy modules ([`locate`], [`extract`], [`inject`], [`submit`],
//!   [`detect`], [`wait`]) implement the interaction mechanics shared by
//!   every service, each with ordered fallbacks for hostile or revised
//!   DOMs.
//! * [`adapter`] binds those strategies to the five supported services,
//!   one stateless driver per site.
//! * [`client`] owns the browser session and the per-service tab
//!   registry, and exposes the send, broadcast, collect, and export
//!   operations; [`export`] renders captured conversations as markdown.
//!
//! Drive it with [`runtime::ChromiumoxideRuntime`] against a launched or
//! attached Chrome, or implement [`browser::BrowserRuntime`] to supply
//! another transport.

pub mod adapter;
pub mod browser;
pub mod client;
pub mod config;
pub mod context;
pub mod detect;
mod dom_scripts;
pub mod errors;
pub mod export;
pub mod extract;
pub mod inject;
pub mod locate;
pub mod logging;
pub mod metrics;
pub mod page;
pub mod runtime;
pub mod service;
pub mod submit;
pub mod types;
pub mod wait;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{ChorusClient, ChorusClientError, ExportOutcome, ServiceStatus};
pub use config::{BrowserMode, ChorusConfig, ChorusConfigOverrides, Verbosity};
pub use service::Service;
pub use types::{ConnectionStatus, ConversationSnapshot, ResponseWait, SendResult};
