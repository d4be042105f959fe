//! Lifecycle observers.
//!
//! Observers subscribe to a context and hear about it ending and about its
//! direct children ending. Every notification round works on a snapshot of
//! the subscribers taken when the round starts.

use crate::context::{Context, WeakContext};
use crate::error::Result;
use std::sync::Arc;

/// Identifier of a subscription within one context.
pub type SubscriptionId = u64;

/// Receives lifecycle notifications. Every method is optional.
pub trait ContextObserver: Send + Sync {
    /// Called when a context starts ending.
    fn context_ending(&self, _context: &Context) {}

    /// Called when a context has ended.
    fn context_ended(&self, _context: &Context) {}

    /// Called when a child context starts ending.
    fn child_context_ending(&self, _child: &Context) {}

    /// Called when a child context has ended.
    fn child_context_ended(&self, _child: &Context) {}
}

/// The single notification a closure observer listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Ending,
    Ended,
    ChildEnding,
    ChildEnded,
}

/// Observer that forwards one kind of notification to a closure.
pub struct ObserverFn<F> {
    event: LifecycleEvent,
    callback: F,
}

impl<F> ObserverFn<F>
where
    F: Fn(&Context) + Send + Sync,
{
    pub fn new(event: LifecycleEvent, callback: F) -> Self {
        Self { event, callback }
    }

    fn fire(&self, event: LifecycleEvent, context: &Context) {
        if self.event == event {
            (self.callback)(context);
        }
    }
}

impl<F> ContextObserver for ObserverFn<F>
where
    F: Fn(&Context) + Send + Sync,
{
    fn context_ending(&self, context: &Context) {
        self.fire(LifecycleEvent::Ending, context);
    }

    fn context_ended(&self, context: &Context) {
        self.fire(LifecycleEvent::Ended, context);
    }

    fn child_context_ending(&self, child: &Context) {
        self.fire(LifecycleEvent::ChildEnding, child);
    }

    fn child_context_ended(&self, child: &Context) {
        self.fire(LifecycleEvent::ChildEnded, child);
    }
}

impl Context {
    /// Run `callback` when this context starts ending.
    pub fn on_ending<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.observe(Arc::new(ObserverFn::new(LifecycleEvent::Ending, callback)))
    }

    /// Run `callback` when this context has ended.
    pub fn on_ended<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.observe(Arc::new(ObserverFn::new(LifecycleEvent::Ended, callback)))
    }

    /// Run `callback` when a child of this context starts ending.
    pub fn on_child_ending<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.observe(Arc::new(ObserverFn::new(
            LifecycleEvent::ChildEnding,
            callback,
        )))
    }

    /// Run `callback` when a child of this context has ended.
    pub fn on_child_ended<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.observe(Arc::new(ObserverFn::new(
            LifecycleEvent::ChildEnded,
            callback,
        )))
    }
}

/// Handle returned by [`Context::observe`].
///
/// Dropping it keeps the observer subscribed; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Clone)]
pub struct Subscription {
    context: WeakContext,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(context: WeakContext, id: SubscriptionId) -> Self {
        Self { context, id }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the observer. Calling this more than once has no further
    /// effect. Returns true if the observer was still subscribed.
    pub fn unsubscribe(&self) -> bool {
        match self.context.upgrade() {
            Some(context) => context.remove_observer(self.id),
            None => false,
        }
    }
}

/// Subscribers of one context, in subscription order.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: SubscriptionId,
    entries: Vec<(SubscriptionId, Arc<dyn ContextObserver>)>,
}

impl ObserverRegistry {
    pub(crate) fn add(&mut self, observer: Arc<dyn ContextObserver>) -> SubscriptionId {
        self.next_id += 1;
        self.entries.push((self.next_id, observer));
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot the current subscribers for one notification round.
    pub(crate) fn notifier(&self) -> Notifier {
        Notifier {
            observers: self
                .entries
                .iter()
                .map(|(_, observer)| observer.clone())
                .collect(),
        }
    }
}

/// A frozen list of observers to notify.
pub(crate) struct Notifier {
    observers: Vec<Arc<dyn ContextObserver>>,
}

impl Notifier {
    pub(crate) fn ending(&self, context: &Context) {
        for observer in &self.observers {
            observer.context_ending(context);
        }
    }

    pub(crate) fn ended(&self, context: &Context) {
        for observer in &self.observers {
            observer.context_ended(context);
        }
    }

    pub(crate) fn child_ending(&self, child: &Context) {
        for observer in &self.observers {
            observer.child_context_ending(child);
        }
    }

    pub(crate) fn child_ended(&self, child: &Context) {
        for observer in &self.observers {
            observer.child_context_ended(child);
        }
    }
}
