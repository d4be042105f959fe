//! Context nodes: the scope tree, its lifecycle and query delegation.
//!
//! A [`Context`] is a cheap handle to a node in a tree of scopes. Each node
//! owns its active children, keeps a chain of locally registered handlers and
//! notifies observers as it ends. Queries are answered locally first and then
//! escalate to the parent, unless an axis directive redirects them (see
//! [`crate::axis`]).

use crate::axis::Axis;
use crate::config::ContextConfig;
use crate::error::{ContextError, Result};
use crate::observer::{ContextObserver, ObserverRegistry, Subscription, SubscriptionId};
use crate::state::ContextState;
use arbor_callback::{Handler, HandlerChain, Provider, Query};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Process-unique identifier of a context.
pub type ContextId = u64;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a node in the scope tree.
///
/// Clones refer to the same node. Equality and hashing use the node id.
///
/// An active child and its parent keep each other alive, so a tree that is
/// never ended is never freed, together with everything stored in it. End
/// trees explicitly or hold them through [`Context::guard`].
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ContextId,
    /// Never reassigned
    parent: Option<Context>,
    config: Arc<ContextConfig>,
    created_at: DateTime<Utc>,
    handlers: HandlerChain,
    node: Mutex<Node>,
}

/// Mutable part of a context. Never locked while calling out to handlers
/// or observers.
struct Node {
    state: ContextState,
    /// Set by the first `end()` so reentrant calls become no-ops.
    terminating: bool,
    children: Vec<Context>,
    observers: ObserverRegistry,
    pending_axis: Option<Axis>,
}

impl Context {
    /// Create a new root context with default configuration.
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Create a new root context. Every descendant shares `config`.
    pub fn with_config(config: ContextConfig) -> Self {
        Self::create(None, Arc::new(config))
    }

    fn create(parent: Option<Context>, config: Arc<ContextConfig>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                parent,
                config,
                created_at: Utc::now(),
                handlers: HandlerChain::new(),
                node: Mutex::new(Node {
                    state: ContextState::Active,
                    terminating: false,
                    children: Vec::new(),
                    observers: ObserverRegistry::default(),
                    pending_axis: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn state(&self) -> ContextState {
        self.inner.node.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn parent(&self) -> Option<Context> {
        self.inner.parent.clone()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Snapshot of the current children, in creation order.
    pub fn children(&self) -> Vec<Context> {
        self.inner.node.lock().children.clone()
    }

    pub fn has_children(&self) -> bool {
        !self.inner.node.lock().children.is_empty()
    }

    /// The parentless ancestor of this context (itself for a root).
    pub fn root(&self) -> Context {
        let mut root = self.clone();
        while let Some(parent) = root.parent() {
            root = parent;
        }
        root
    }

    /// Create a child context.
    ///
    /// Fails with [`ContextError::InactiveContext`] unless this context is
    /// active.
    pub fn new_child(&self) -> Result<Context> {
        let mut node = self.inner.node.lock();
        if node.state != ContextState::Active {
            return Err(ContextError::InactiveContext {
                id: self.id(),
                state: node.state,
            });
        }
        let child = Self::create(Some(self.clone()), self.inner.config.clone());
        node.children.push(child.clone());
        drop(node);

        if self.inner.config.trace_lifecycle {
            debug!(context_id = self.id(), child_id = child.id(), "Child context created");
        }
        Ok(child)
    }

    /// Wrap this context in a guard that ends it when dropped.
    pub fn guard(&self) -> ContextGuard {
        ContextGuard {
            context: self.clone(),
        }
    }

    /// End this context, its children first.
    ///
    /// No-op unless the context is active. A child also notifies its
    /// parent's observers around its own termination and leaves the
    /// parent's children.
    pub fn end(&self) {
        {
            let mut node = self.inner.node.lock();
            if node.state != ContextState::Active || node.terminating {
                return;
            }
            node.terminating = true;
        }

        match &self.inner.parent {
            Some(parent) => parent.end_child(self),
            None => self.terminate(),
        }
    }

    /// Alias for [`Context::end`].
    pub fn dispose(&self) {
        self.end();
    }

    fn end_child(&self, child: &Context) {
        let notifier = {
            let node = self.inner.node.lock();
            if !node.children.contains(child) {
                return;
            }
            node.observers.notifier()
        };

        notifier.child_ending(child);
        self.inner.node.lock().children.retain(|c| c != child);
        child.terminate();
        notifier.child_ended(child);
    }

    fn terminate(&self) {
        let notifier = {
            let mut node = self.inner.node.lock();
            node.state = ContextState::Ending;
            node.observers.notifier()
        };
        if self.inner.config.trace_lifecycle {
            debug!(context_id = self.id(), "Context ending");
        }

        notifier.ending(self);
        self.unwind();

        {
            let mut node = self.inner.node.lock();
            node.state = ContextState::Ended;
            node.pending_axis = None;
        }
        notifier.ended(self);
        self.inner.node.lock().observers.clear();

        if self.inner.config.trace_lifecycle {
            debug!(context_id = self.id(), "Context ended");
        }
    }

    /// End every current child, in creation order. This context stays in
    /// its current state.
    pub fn unwind(&self) -> &Self {
        for child in self.children() {
            child.end();
        }
        self
    }

    /// Unwind the root of this tree and return it.
    pub fn unwind_to_root(&self) -> Context {
        let root = self.root();
        root.unwind();
        root
    }

    /// Subscribe to lifecycle notifications of this context and its
    /// children.
    ///
    /// Fails with [`ContextError::InactiveContext`] unless this context is
    /// active.
    pub fn observe(&self, observer: Arc<dyn ContextObserver>) -> Result<Subscription> {
        let mut node = self.inner.node.lock();
        if node.state != ContextState::Active {
            return Err(ContextError::InactiveContext {
                id: self.id(),
                state: node.state,
            });
        }
        let id = node.observers.add(observer);
        Ok(Subscription::new(self.downgrade(), id))
    }

    pub(crate) fn remove_observer(&self, id: SubscriptionId) -> bool {
        self.inner.node.lock().observers.remove(id)
    }

    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext(Arc::downgrade(&self.inner))
    }

    /// Register a handler after the existing ones.
    pub fn add_handler(&self, handler: Arc<dyn Handler>) -> &Self {
        self.inner.handlers.push(handler);
        self
    }

    /// Register a handler at `index` of the local chain.
    pub fn insert_handler(&self, index: usize, handler: Arc<dyn Handler>) -> &Self {
        self.inner.handlers.insert(index, handler);
        self
    }

    /// Unregister a handler by identity.
    pub fn remove_handler(&self, handler: &Arc<dyn Handler>) -> bool {
        self.inner.handlers.remove(handler)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Store a value so that queries for its type resolve to it.
    pub fn store<T: Any + Send + Sync>(&self, value: T) -> &Self {
        self.add_handler(Arc::new(Provider::new(value)))
    }

    /// Store a value that is already shared.
    pub fn store_shared<T: Any + Send + Sync>(&self, value: Arc<T>) -> &Self {
        self.add_handler(Arc::new(Provider::shared(value)))
    }

    /// Answer a query here, or along a pending axis, escalating to the
    /// parent when no axis is pending.
    pub fn handle(&self, query: &mut Query, greedy: bool) -> bool {
        self.dispatch(query, greedy, self)
    }

    /// Resolve the first value answering `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut query = Query::of::<T>();
        if self.handle(&mut query, false) {
            query.result::<T>()
        } else {
            None
        }
    }

    /// Resolve every value answering `T`.
    pub fn resolve_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        let mut query = Query::of::<T>();
        if self.handle(&mut query, true) {
            query.results::<T>()
        } else {
            Vec::new()
        }
    }

    pub(crate) fn set_pending_axis(&self, axis: Axis) {
        self.inner.node.lock().pending_axis = Some(axis);
    }

    #[cfg(test)]
    pub(crate) fn pending_axis(&self) -> Option<Axis> {
        self.inner.node.lock().pending_axis
    }

    pub(crate) fn dispatch(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool {
        if query.is_routed() {
            trace!(context_id = self.id(), "Routed query, axis ignored");
            return self.escalate(query, greedy, composer);
        }

        let axis = self.inner.node.lock().pending_axis.take();
        match axis {
            None => self.escalate(query, greedy, composer),
            Some(Axis::SelfOnly) => self.handle_local(query, greedy, composer),
            Some(axis) => self.handle_along(axis, query, greedy, composer),
        }
    }

    fn escalate(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool {
        let mut handled = self.handle_local(query, greedy, composer);
        if handled && !greedy {
            return true;
        }
        if let Some(parent) = &self.inner.parent {
            handled |= parent.dispatch(query, greedy, composer);
        }
        handled
    }

    fn handle_along(
        &self,
        axis: Axis,
        query: &mut Query,
        greedy: bool,
        composer: &dyn Handler,
    ) -> bool {
        trace!(context_id = self.id(), axis = %axis, greedy, "Dispatching along axis");

        let mut handled = false;
        for node in axis.nodes(self) {
            if self.inner.config.trace_dispatch {
                trace!(context_id = self.id(), axis = %axis, visiting = node.id(), "Axis visit");
            }
            handled |= node.handle_local(query, greedy, composer);
            if handled && !greedy {
                break;
            }
        }
        handled
    }

    /// Ask only this context: itself for the `Context` capability, then its
    /// local handlers.
    pub(crate) fn handle_local(
        &self,
        query: &mut Query,
        greedy: bool,
        composer: &dyn Handler,
    ) -> bool {
        let mut handled = false;
        if query.wants::<Context>() {
            handled = query.provide(Arc::new(self.clone()));
            if handled && !greedy {
                return true;
            }
        }
        handled |= self.inner.handlers.handle(query, greedy, composer);
        handled
    }

    /// Diagnostic snapshot of this context.
    pub fn info(&self) -> ContextInfo {
        let node = self.inner.node.lock();
        ContextInfo {
            id: self.id(),
            parent: self.inner.parent.as_ref().map(Context::id),
            state: node.state,
            children: node.children.iter().map(Context::id).collect(),
            observer_count: node.observers.len(),
            handler_count: self.inner.handlers.len(),
            created_at: self.inner.created_at,
        }
    }

    /// Render this context and its descendants as an ASCII tree.
    pub fn render_tree(&self) -> String {
        let mut output = String::new();
        self.render_node(&mut output, "", true, true);
        output
    }

    fn render_node(&self, output: &mut String, prefix: &str, is_last: bool, is_top: bool) {
        if is_top {
            output.push_str(&format!("#{} [{}]\n", self.id(), self.state()));
        } else {
            let connector = if is_last { "└── " } else { "├── " };
            output.push_str(&format!(
                "{}{}#{} [{}]\n",
                prefix,
                connector,
                self.id(),
                self.state()
            ));
        }

        let children = self.children();
        let child_count = children.len();
        for (i, child) in children.iter().enumerate() {
            let new_prefix = if is_top {
                String::new()
            } else {
                format!("{}{}   ", prefix, if is_last { " " } else { "│" })
            };
            child.render_node(output, &new_prefix, i == child_count - 1, false);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for Context {
    fn handle(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool {
        self.dispatch(query, greedy, composer)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id())
            .field("parent", &self.inner.parent.as_ref().map(Context::id))
            .field("state", &self.state())
            .finish()
    }
}

/// Non-owning reference to a context.
#[derive(Clone)]
pub(crate) struct WeakContext(Weak<ContextInner>);

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<Context> {
        self.0.upgrade().map(|inner| Context { inner })
    }
}

/// Ends its context when dropped.
pub struct ContextGuard {
    context: Context,
}

impl ContextGuard {
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl Deref for ContextGuard {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.end();
    }
}

/// A scope type built around a [`Context`].
///
/// Implementors wrap a context and must be able to build another instance of
/// their own concrete kind around a child context, so children keep the
/// parent's type.
pub trait Scope: Sized {
    /// The context this scope wraps.
    fn context(&self) -> &Context;

    /// Build an instance of this concrete kind around `child`.
    fn spawn(&self, child: Context) -> Self;

    /// Create a child scope of the same kind.
    fn new_child(&self) -> Result<Self> {
        let child = self.context().new_child()?;
        Ok(self.spawn(child))
    }
}

impl Scope for Context {
    fn context(&self) -> &Context {
        self
    }

    fn spawn(&self, child: Context) -> Self {
        child
    }
}

/// Diagnostic snapshot of a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    pub state: ContextState,
    pub children: Vec<ContextId>,
    pub observer_count: usize,
    pub handler_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug)]
    struct Dog;

    #[test]
    fn test_new_context_is_active_root() {
        let context = Context::new();
        assert_eq!(context.state(), ContextState::Active);
        assert!(context.parent().is_none());
        assert!(context.children().is_empty());
        assert!(!context.has_children());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Context::new();
        let b = Context::new();
        let c = a.new_child().unwrap();
        let ids: HashSet<_> = [a.id(), b.id(), c.id()].into_iter().collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_clone_is_same_context() {
        let context = Context::new();
        let clone = context.clone();
        assert_eq!(context, clone);
        assert_ne!(context, Context::new());
    }

    #[test]
    fn test_new_child_links_parent() {
        let context = Context::new();
        let child = context.new_child().unwrap();
        assert_eq!(child.parent(), Some(context.clone()));
        assert_eq!(context.children(), vec![child]);
    }

    #[test]
    fn test_new_child_inherits_config() {
        let config = ContextConfig {
            trace_dispatch: true,
            ..ContextConfig::default()
        };
        let root = Context::with_config(config);
        let grand_child = root.new_child().unwrap().new_child().unwrap();
        assert!(grand_child.config().trace_dispatch);
    }

    #[test]
    fn test_new_child_of_ended_fails() {
        let context = Context::new();
        context.end();
        let err = context.new_child().unwrap_err();
        assert!(matches!(
            err,
            ContextError::InactiveContext {
                state: ContextState::Ended,
                ..
            }
        ));
    }

    #[test]
    fn test_root() {
        let context = Context::new();
        assert_eq!(context.root(), context);

        let grand_child = context.new_child().unwrap().new_child().unwrap();
        assert_eq!(grand_child.root(), context);
    }

    #[test]
    fn test_end_removes_child_from_parent() {
        let context = Context::new();
        let child1 = context.new_child().unwrap();
        let child2 = context.new_child().unwrap();

        child1.end();
        assert_eq!(child1.state(), ContextState::Ended);
        assert_eq!(context.children(), vec![child2]);
        assert_eq!(child1.parent(), Some(context));
    }

    #[test]
    fn test_end_cascades() {
        let context = Context::new();
        let child = context.new_child().unwrap();
        let grand_child = child.new_child().unwrap();

        context.end();
        assert_eq!(context.state(), ContextState::Ended);
        assert_eq!(child.state(), ContextState::Ended);
        assert_eq!(grand_child.state(), ContextState::Ended);
        assert!(!context.has_children());
    }

    #[test]
    fn test_dispose_ends() {
        let context = Context::new();
        context.dispose();
        assert_eq!(context.state(), ContextState::Ended);
    }

    #[test]
    fn test_unwind_keeps_caller_active() {
        let context = Context::new();
        let child1 = context.new_child().unwrap();
        let child2 = context.new_child().unwrap();

        context.unwind();
        assert_eq!(context.state(), ContextState::Active);
        assert_eq!(child1.state(), ContextState::Ended);
        assert_eq!(child2.state(), ContextState::Ended);
    }

    #[test]
    fn test_unwind_ends_children_in_creation_order() {
        let context = Context::new();
        let children: Vec<_> = (0..4).map(|_| context.new_child().unwrap()).collect();
        let ended = Arc::new(Mutex::new(Vec::new()));
        let log = ended.clone();
        context
            .on_child_ending(move |child| log.lock().push(child.id()))
            .unwrap();

        context.unwind();
        let expected: Vec<_> = children.iter().map(Context::id).collect();
        assert_eq!(*ended.lock(), expected);
    }

    #[test]
    fn test_unwind_survives_child_added_to_active_sibling() {
        let context = Context::new();
        let first = context.new_child().unwrap();
        let second = context.new_child().unwrap();
        let third = context.new_child().unwrap();

        let added = Arc::new(Mutex::new(None));
        let slot = added.clone();
        let target = third.clone();
        first
            .on_ending(move |_| *slot.lock() = target.new_child().ok())
            .unwrap();

        let ended = Arc::new(Mutex::new(Vec::new()));
        let log = ended.clone();
        context
            .on_child_ending(move |child| log.lock().push(child.id()))
            .unwrap();

        context.unwind();
        assert_eq!(*ended.lock(), vec![first.id(), second.id(), third.id()]);

        let nested = added.lock().clone().unwrap();
        assert_eq!(nested.parent(), Some(third.clone()));
        assert_eq!(nested.state(), ContextState::Ended);
        assert!(!context.has_children());
        assert_eq!(context.state(), ContextState::Active);
    }

    #[test]
    fn test_guard_releases_unreferenced_tree() {
        struct Tracked(Arc<AtomicU64>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicU64::new(0));
        let guard = Context::new().guard();
        let child = guard.new_child().unwrap();
        child.store(Tracked(drops.clone()));

        drop(child);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(guard);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unwind_to_root() {
        let context = Context::new();
        let child1 = context.new_child().unwrap();
        let child2 = context.new_child().unwrap();
        let grand_child = child1.new_child().unwrap();

        let root = grand_child.unwind_to_root();
        assert_eq!(root, context);
        assert_eq!(context.state(), ContextState::Active);
        assert_eq!(child1.state(), ContextState::Ended);
        assert_eq!(child2.state(), ContextState::Ended);
        assert_eq!(grand_child.state(), ContextState::Ended);
    }

    #[test]
    fn test_guard_ends_on_drop() {
        let context = Context::new();
        let child = context.new_child().unwrap();
        {
            let guard = child.guard();
            assert_eq!(guard.state(), ContextState::Active);
            assert_eq!(guard.parent(), Some(context.clone()));
        }
        assert_eq!(child.state(), ContextState::Ended);
        assert!(!context.has_children());
    }

    #[test]
    fn test_store_and_resolve() {
        let context = Context::new();
        assert!(context.resolve::<Dog>().is_none());
        context.store(Dog);
        assert!(context.resolve::<Dog>().is_some());
    }

    #[test]
    fn test_resolve_self() {
        let context = Context::new();
        let resolved = context.resolve::<Context>().unwrap();
        assert_eq!(*resolved, context);
    }

    #[test]
    fn test_resolve_escalates_to_ancestors() {
        let context = Context::new();
        let child = context.new_child().unwrap();
        let grand_child = child.new_child().unwrap();
        context.store(Dog);

        assert!(grand_child.resolve::<Dog>().is_some());
    }

    #[test]
    fn test_resolve_all_collects_chain() {
        let context = Context::new();
        let child = context.new_child().unwrap();
        context.store(1_u32);
        child.store(2_u32);

        let values: Vec<u32> = child.resolve_all::<u32>().iter().map(|v| **v).collect();
        assert_eq!(values, vec![2, 1]);
    }

    #[test]
    fn test_remove_handler() {
        let context = Context::new();
        let handler: Arc<dyn Handler> = Arc::new(Provider::new(Dog));
        context.add_handler(handler.clone());
        assert_eq!(context.handler_count(), 1);

        assert!(context.remove_handler(&handler));
        assert!(context.resolve::<Dog>().is_none());
    }

    #[test]
    fn test_info_snapshot() {
        let context = Context::new();
        let child = context.new_child().unwrap();
        context.store(Dog);

        let info = context.info();
        assert_eq!(info.id, context.id());
        assert_eq!(info.parent, None);
        assert_eq!(info.children, vec![child.id()]);
        assert_eq!(info.handler_count, 1);

        let json = serde_json::to_string(&child.info()).unwrap();
        let parsed: ContextInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.parent, Some(context.id()));
        assert_eq!(parsed.state, ContextState::Active);
    }

    #[test]
    fn test_render_tree() {
        let root = Context::new();
        let child1 = root.new_child().unwrap();
        let child2 = root.new_child().unwrap();
        let grand_child = child1.new_child().unwrap();

        let rendered = root.render_tree();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], format!("#{} [active]", root.id()));
        assert_eq!(lines[1], format!("├── #{} [active]", child1.id()));
        assert_eq!(lines[2], format!("│   └── #{} [active]", grand_child.id()));
        assert_eq!(lines[3], format!("└── #{} [active]", child2.id()));
    }

    struct Session {
        context: Context,
        name: String,
    }

    impl Scope for Session {
        fn context(&self) -> &Context {
            &self.context
        }

        fn spawn(&self, child: Context) -> Self {
            Session {
                context: child,
                name: format!("{}/child", self.name),
            }
        }
    }

    #[test]
    fn test_scope_children_keep_kind() {
        let session = Session {
            context: Context::new(),
            name: "root".to_string(),
        };
        let child = Scope::new_child(&session).unwrap();
        assert_eq!(child.name, "root/child");
        assert_eq!(child.context().parent(), Some(session.context.clone()));

        session.context.end();
        assert!(Scope::new_child(&child).is_err());
    }
}
