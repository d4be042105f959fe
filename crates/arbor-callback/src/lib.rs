//! Arbor Callback
//!
//! The handler surface used by Arbor contexts: capability queries, handlers
//! that answer them, and ordered handler chains.

mod handler;
mod query;

pub use handler::{same_handler, Handler, HandlerChain, HandlerExt, Provider};
pub use query::{Answer, Capability, Query};
