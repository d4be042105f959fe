//! Arbor Context
//!
//! Hierarchical lifecycle scopes. Contexts form a tree, end children-first
//! with observer notifications, and answer capability queries locally,
//! through their ancestors, or along a selected traversal axis.

mod axis;
mod binding;
mod config;
mod context;
mod error;
mod logging;
mod observer;
mod publish;
mod state;

pub use axis::{Axis, AxisView};
pub use binding::{
    bind, bind_child, clear, new_in_child_context, new_in_context, require_context,
    resolve_context, set_context, ContextBinding, Contextual, HasContext,
};
pub use config::ContextConfig;
pub use context::{Context, ContextGuard, ContextId, ContextInfo, Scope};
pub use error::{ContextError, Result};
pub use logging::init_tracing;
pub use observer::{ContextObserver, LifecycleEvent, ObserverFn, Subscription, SubscriptionId};
pub use publish::{publish, publish_from_root};
pub use state::ContextState;

pub use arbor_callback::{Capability, Handler, HandlerChain, HandlerExt, Provider, Query};
