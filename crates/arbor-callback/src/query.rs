//! Capability queries passed along handler chains.
//!
//! A query names the capability it wants (a Rust type) and collects the
//! answers handlers provide for it.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Type-erased answer carried by a query.
pub type Answer = Arc<dyn Any + Send + Sync>;

/// Identifies the capability a query asks for.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    type_id: TypeId,
    name: &'static str,
}

impl Capability {
    /// Capability answered by values of type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Full type name of the capability.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check whether this capability is answered by `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.name)
    }
}

/// A request for a capability, answered by zero or more handlers.
pub struct Query {
    capability: Capability,
    answers: Vec<Answer>,
    /// Set by a framework that forwards the query on someone else's behalf.
    routed: bool,
}

impl Query {
    /// Create a query for a capability.
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            answers: Vec::new(),
            routed: false,
        }
    }

    /// Create a query for values of type `T`.
    pub fn of<T: Any>() -> Self {
        Self::new(Capability::of::<T>())
    }

    /// Mark the query as already being routed.
    ///
    /// Routed queries are never redirected along a traversal axis.
    pub fn routed(mut self) -> Self {
        self.routed = true;
        self
    }

    pub fn is_routed(&self) -> bool {
        self.routed
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Check whether this query asks for `T`.
    pub fn wants<T: Any>(&self) -> bool {
        self.capability.is::<T>()
    }

    /// Offer an answer. Returns false if the value does not match the
    /// requested capability.
    pub fn provide<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> bool {
        if !self.wants::<T>() {
            return false;
        }
        self.answers.push(value);
        true
    }

    /// Offer an already type-erased answer.
    pub fn provide_answer(&mut self, answer: Answer) -> bool {
        if (*answer).type_id() != self.capability.type_id {
            return false;
        }
        self.answers.push(answer);
        true
    }

    /// Number of answers collected so far.
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// First answer, if any.
    pub fn result<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.answers
            .iter()
            .find_map(|answer| answer.clone().downcast::<T>().ok())
    }

    /// All answers in the order they were provided.
    pub fn results<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        self.answers
            .iter()
            .filter_map(|answer| answer.clone().downcast::<T>().ok())
            .collect()
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("capability", &self.capability)
            .field("answers", &self.answers.len())
            .field("routed", &self.routed)
            .finish()
    }
}
