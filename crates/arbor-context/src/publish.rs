//! Broadcasting a query to every context in a subtree.

use crate::binding::{require_context, HasContext};
use crate::error::Result;
use arbor_callback::Query;
use tracing::debug;

/// Offer `query` to the context of `source` and all of its descendants,
/// greedily.
///
/// Fails with [`crate::ContextError::NotAContext`] when `source` has no
/// context. Returns whether anything answered.
pub fn publish<S: HasContext + ?Sized>(source: &S, query: &mut Query) -> Result<bool> {
    let context = require_context(source)?;
    debug!(context_id = context.id(), capability = query.capability().name(), "Publishing");
    Ok(context.via_self_or_descendant().handle(query, true))
}

/// Like [`publish`], starting from the root of `source`'s tree.
pub fn publish_from_root<S: HasContext + ?Sized>(source: &S, query: &mut Query) -> Result<bool> {
    let root = require_context(source)?.root();
    debug!(context_id = root.id(), capability = query.capability().name(), "Publishing from root");
    Ok(root.via_self_or_descendant().handle(query, true))
}
