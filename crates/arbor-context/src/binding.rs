//! Binding participants to contexts.
//!
//! A contextual participant is bound to at most one context at a time. While
//! bound it is registered at the front of that context's handlers, so it
//! answers queries for its own type ahead of stored values.

use crate::axis::AxisView;
use crate::context::Context;
use crate::error::{ContextError, Result};
use arbor_callback::{Handler, Query};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Anything a context can be obtained from.
pub trait HasContext {
    fn resolve_context(&self) -> Option<Context>;
}

/// A participant that can be bound to a context.
pub trait Contextual: Handler + Any {
    fn binding(&self) -> &ContextBinding;
}

impl HasContext for Context {
    fn resolve_context(&self) -> Option<Context> {
        Some(self.clone())
    }
}

impl HasContext for AxisView {
    fn resolve_context(&self) -> Option<Context> {
        Some(self.context().clone())
    }
}

impl HasContext for ContextBinding {
    fn resolve_context(&self) -> Option<Context> {
        self.context()
    }
}

impl<T: Contextual + ?Sized> HasContext for T {
    fn resolve_context(&self) -> Option<Context> {
        self.binding().context()
    }
}

/// The context a participant is currently bound to.
///
/// Dropping the binding, usually together with its participant, removes the
/// participant's handler from the bound context without ending it.
#[derive(Default)]
pub struct ContextBinding {
    slot: Mutex<Option<Bound>>,
}

struct Bound {
    context: Context,
    /// The exact handler registered on `context`, for removal.
    handler: Arc<dyn Handler>,
}

impl ContextBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<Context> {
        self.slot.lock().as_ref().map(|bound| bound.context.clone())
    }

    pub fn is_bound(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Whether the bound context exists and is active.
    pub fn is_active_context(&self) -> bool {
        self.context().map_or(false, |context| context.is_active())
    }

    /// End the bound context, leaving the binding in place.
    pub fn end_context(&self) {
        if let Some(context) = self.context() {
            context.end();
        }
    }
}

impl Drop for ContextBinding {
    fn drop(&mut self) {
        if let Some(bound) = self.slot.get_mut().take() {
            bound.context.remove_handler(&bound.handler);
        }
    }
}

/// Registered on a context on behalf of a participant.
struct ParticipantHandler<P> {
    participant: Weak<P>,
}

impl<P: Contextual> Handler for ParticipantHandler<P> {
    fn handle(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool {
        let Some(participant) = self.participant.upgrade() else {
            return false;
        };
        let mut handled = false;
        if query.wants::<P>() {
            handled = query.provide(participant.clone());
            if handled && !greedy {
                return true;
            }
        }
        handled |= participant.handle(query, greedy, composer);
        handled
    }
}

/// Get the context of `source`, if it has one.
pub fn resolve_context<S: HasContext + ?Sized>(source: &S) -> Option<Context> {
    source.resolve_context()
}

/// Get the context of `source`, failing with [`ContextError::NotAContext`]
/// when it has none.
pub fn require_context<S: HasContext + ?Sized>(source: &S) -> Result<Context> {
    source.resolve_context().ok_or(ContextError::NotAContext)
}

/// Point `participant` at `context`.
///
/// The participant leaves the handlers of its previous context and is
/// inserted at the front of the new one. The previous context is not ended.
pub fn set_context<P: Contextual>(participant: &Arc<P>, context: Option<Context>) {
    let mut slot = participant.binding().slot.lock();
    if slot.as_ref().map(|bound| &bound.context) == context.as_ref() {
        return;
    }

    if let Some(previous) = slot.take() {
        previous.context.remove_handler(&previous.handler);
        debug!(context_id = previous.context.id(), "Participant unbound");
    }

    if let Some(context) = context {
        let handler: Arc<dyn Handler> = Arc::new(ParticipantHandler {
            participant: Arc::downgrade(participant),
        });
        context.insert_handler(0, handler.clone());
        debug!(context_id = context.id(), "Participant bound");
        *slot = Some(Bound { context, handler });
    }
}

/// Bind `participant` to the context of `source`.
///
/// Does nothing if the participant is already bound and `replace` is false.
/// A `None` source, or one without a context, unbinds.
pub fn bind<P, S>(participant: &Arc<P>, source: Option<&S>, replace: bool)
where
    P: Contextual,
    S: HasContext + ?Sized,
{
    if replace || !participant.binding().is_bound() {
        set_context(participant, source.and_then(|s| s.resolve_context()));
    }
}

/// End the participant's context and unbind it.
///
/// The participant is unbound even if an observer panics while the context
/// ends.
pub fn clear<P: Contextual>(participant: &Arc<P>) {
    let Some(context) = participant.binding().context() else {
        return;
    };
    let _unbind = UnbindOnDrop { participant };
    context.end();
}

struct UnbindOnDrop<'a, P: Contextual> {
    participant: &'a Arc<P>,
}

impl<P: Contextual> Drop for UnbindOnDrop<'_, P> {
    fn drop(&mut self) {
        set_context(self.participant, None);
    }
}

/// Bind `child` to a new child of the first active context found on
/// `source`'s context or its ancestors.
///
/// Unless `replace` is set, a child already bound to an active context keeps
/// it. Returns `Ok(None)` when no active context exists on the chain.
pub fn bind_child<S, C>(source: &S, child: &Arc<C>, replace: bool) -> Result<Option<Context>>
where
    S: HasContext + ?Sized,
    C: Contextual,
{
    if !replace {
        if let Some(existing) = child.binding().context() {
            if existing.is_active() {
                return Ok(Some(existing));
            }
        }
    }

    let mut current = Some(require_context(source)?);
    while let Some(context) = current {
        if context.is_active() {
            let child_context = context.new_child()?;
            set_context(child, Some(child_context.clone()));
            return Ok(Some(child_context));
        }
        current = context.parent();
    }
    Ok(None)
}

/// Share `participant` and bind it to `context`.
pub fn new_in_context<P: Contextual>(context: &Context, participant: P) -> Arc<P> {
    let participant = Arc::new(participant);
    set_context(&participant, Some(context.clone()));
    participant
}

/// Share `participant` and bind it to a new child of `source`'s context.
pub fn new_in_child_context<S, P>(source: &S, participant: P) -> Result<Arc<P>>
where
    S: HasContext + ?Sized,
    P: Contextual,
{
    let participant = Arc::new(participant);
    bind_child(source, &participant, false)?;
    Ok(participant)
}
