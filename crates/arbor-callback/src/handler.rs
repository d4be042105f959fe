//! Handlers and handler chains.
//!
//! A [`Handler`] inspects a [`Query`] and answers it if it can. A
//! [`HandlerChain`] asks an ordered list of handlers in turn.

use crate::query::Query;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Something that can answer capability queries.
pub trait Handler: Send + Sync {
    /// Try to answer `query`.
    ///
    /// Returns true when the query was answered. A `greedy` caller wants
    /// every possible answer, so implementations should not stop early.
    /// `composer` is the handler the query entered through and may be used
    /// to issue nested queries.
    fn handle(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool;
}

/// Convenience resolution on any sized handler.
pub trait HandlerExt: Handler {
    /// Resolve the first value answering `T`.
    fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>>
    where
        Self: Sized,
    {
        let mut query = Query::of::<T>();
        if self.handle(&mut query, false, self) {
            query.result::<T>()
        } else {
            None
        }
    }

    /// Resolve every value answering `T`.
    fn resolve_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>>
    where
        Self: Sized,
    {
        let mut query = Query::of::<T>();
        if self.handle(&mut query, true, self) {
            query.results::<T>()
        } else {
            Vec::new()
        }
    }
}

impl<H: Handler + ?Sized> HandlerExt for H {}

/// Compare two handlers by allocation, ignoring vtables.
pub fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Answers queries for a single stored value.
pub struct Provider<T> {
    value: Arc<T>,
}

impl<T: Any + Send + Sync> Provider<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Wrap a value that is already shared.
    pub fn shared(value: Arc<T>) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }
}

impl<T: Any + Send + Sync> Handler for Provider<T> {
    fn handle(&self, query: &mut Query, _greedy: bool, _composer: &dyn Handler) -> bool {
        query.provide(self.value.clone())
    }
}

/// An ordered, shareable list of handlers asked one after another.
///
/// Dispatch works on a snapshot of the list, so handlers may add or remove
/// entries while a query is in flight.
#[derive(Default)]
pub struct HandlerChain {
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn push(&self, handler: Arc<dyn Handler>) {
        self.handlers.write().push(handler);
    }

    /// Insert a handler at `index`, clamped to the current length.
    pub fn insert(&self, index: usize, handler: Arc<dyn Handler>) {
        let mut handlers = self.handlers.write();
        let index = index.min(handlers.len());
        handlers.insert(index, handler);
    }

    /// Remove a handler by identity. Returns true if it was present.
    pub fn remove(&self, handler: &Arc<dyn Handler>) -> bool {
        let mut handlers = self.handlers.write();
        match handlers.iter().position(|h| same_handler(h, handler)) {
            Some(index) => {
                handlers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Check whether a handler is registered.
    pub fn contains(&self, handler: &Arc<dyn Handler>) -> bool {
        self.handlers.read().iter().any(|h| same_handler(h, handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Copy of the current handler list.
    pub fn snapshot(&self) -> Vec<Arc<dyn Handler>> {
        self.handlers.read().clone()
    }
}

impl Handler for HandlerChain {
    fn handle(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool {
        let mut handled = false;
        for handler in self.snapshot() {
            handled |= handler.handle(query, greedy, composer);
            if handled && !greedy {
                break;
            }
        }
        handled
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Dog(&'static str);

    struct Counter {
        hits: AtomicUsize,
    }

    impl Handler for Counter {
        fn handle(&self, query: &mut Query, _greedy: bool, _composer: &dyn Handler) -> bool {
            self.hits.fetch_add(1, Ordering::SeqCst);
            query.provide(Arc::new(Dog("counted")))
        }
    }

    #[test]
    fn test_provider_answers_own_type() {
        let provider = Provider::new(Dog("rex"));
        assert_eq!(provider.resolve::<Dog>().map(|d| d.0), Some("rex"));
        assert!(provider.resolve::<String>().is_none());
    }

    #[test]
    fn test_chain_stops_at_first_answer() {
        let chain = HandlerChain::new();
        chain.push(Arc::new(Provider::new(Dog("first"))));
        chain.push(Arc::new(Provider::new(Dog("second"))));

        assert_eq!(chain.resolve::<Dog>().map(|d| d.0), Some("first"));
    }

    #[test]
    fn test_chain_greedy_collects_all() {
        let chain = HandlerChain::new();
        chain.push(Arc::new(Provider::new(Dog("first"))));
        chain.push(Arc::new(Provider::new(Dog("second"))));

        let names: Vec<_> = chain.resolve_all::<Dog>().iter().map(|d| d.0).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_chain_insert_front() {
        let chain = HandlerChain::new();
        chain.push(Arc::new(Provider::new(Dog("stored"))));
        chain.insert(0, Arc::new(Provider::new(Dog("scoped"))));

        assert_eq!(chain.resolve::<Dog>().map(|d| d.0), Some("scoped"));
    }

    #[test]
    fn test_chain_insert_clamps_index() {
        let chain = HandlerChain::new();
        chain.insert(10, Arc::new(Provider::new(Dog("only"))));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_chain_remove_by_identity() {
        let chain = HandlerChain::new();
        let counter = Arc::new(Counter {
            hits: AtomicUsize::new(0),
        });
        let handler: Arc<dyn Handler> = counter.clone();
        let lookalike: Arc<dyn Handler> = Arc::new(Counter {
            hits: AtomicUsize::new(0),
        });

        chain.push(handler.clone());
        assert!(!chain.remove(&lookalike));
        assert!(chain.contains(&handler));
        assert!(chain.remove(&handler));
        assert!(!chain.remove(&handler));
        assert!(chain.is_empty());

        assert!(chain.resolve::<Dog>().is_none());
        assert_eq!(counter.hits.load(Ordering::SeqCst), 0);
    }
}
