//! Traversal axes and axis-scoped dispatch.
//!
//! An [`Axis`] names the nodes a redirected query visits, relative to a
//! start context. Selecting an axis on a context leaves a one-shot directive
//! on it; the next dispatch consumes the directive and asks each node of the
//! axis locally, in order, instead of escalating to the parent.
//!
//! Node sequences:
//!
//! | Axis | Nodes |
//! |---|---|
//! | `self` | the start node |
//! | `root` | the parentless ancestor (the start node if it is a root) |
//! | `child` | direct children, creation order |
//! | `sibling` | parent's other children, parent's order |
//! | `ancestor` | parent, grandparent, … |
//! | `descendant` | pre-order walk below the start node |
//! | `descendant_reverse` | post-order walk below the start node |
//! | `self_or_*` | the start node, then the base axis |
//! | `self_sibling_or_ancestor` | the start node, siblings, then ancestors |

use crate::context::Context;
use crate::error::{ContextError, Result};
use arbor_callback::{Handler, Query};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Direction along which a query is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Only the start node
    #[serde(rename = "self")]
    SelfOnly,
    Root,
    Child,
    Sibling,
    Ancestor,
    Descendant,
    DescendantReverse,
    SelfOrChild,
    SelfOrSibling,
    SelfOrAncestor,
    SelfOrDescendant,
    SelfOrDescendantReverse,
    SelfSiblingOrAncestor,
}

impl Axis {
    /// Every axis, in canonical order.
    pub const ALL: [Axis; 13] = [
        Axis::SelfOnly,
        Axis::Root,
        Axis::Child,
        Axis::Sibling,
        Axis::Ancestor,
        Axis::Descendant,
        Axis::DescendantReverse,
        Axis::SelfOrChild,
        Axis::SelfOrSibling,
        Axis::SelfOrAncestor,
        Axis::SelfOrDescendant,
        Axis::SelfOrDescendantReverse,
        Axis::SelfSiblingOrAncestor,
    ];

    /// Stable name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfOnly => "self",
            Self::Root => "root",
            Self::Child => "child",
            Self::Sibling => "sibling",
            Self::Ancestor => "ancestor",
            Self::Descendant => "descendant",
            Self::DescendantReverse => "descendant_reverse",
            Self::SelfOrChild => "self_or_child",
            Self::SelfOrSibling => "self_or_sibling",
            Self::SelfOrAncestor => "self_or_ancestor",
            Self::SelfOrDescendant => "self_or_descendant",
            Self::SelfOrDescendantReverse => "self_or_descendant_reverse",
            Self::SelfSiblingOrAncestor => "self_sibling_or_ancestor",
        }
    }

    /// Whether the start node is part of this axis.
    pub fn includes_self(self) -> bool {
        matches!(
            self,
            Self::SelfOnly
                | Self::SelfOrChild
                | Self::SelfOrSibling
                | Self::SelfOrAncestor
                | Self::SelfOrDescendant
                | Self::SelfOrDescendantReverse
                | Self::SelfSiblingOrAncestor
        )
    }

    /// The nodes this axis visits from `start`, in visiting order.
    ///
    /// Computed from snapshots of each node's children.
    pub fn nodes(self, start: &Context) -> Vec<Context> {
        let mut nodes = Vec::new();
        if self.includes_self() {
            nodes.push(start.clone());
        }
        match self {
            Self::SelfOnly => {}
            Self::Root => nodes.push(start.root()),
            Self::Child | Self::SelfOrChild => nodes.extend(start.children()),
            Self::Sibling | Self::SelfOrSibling => collect_siblings(start, &mut nodes),
            Self::Ancestor | Self::SelfOrAncestor => collect_ancestors(start, &mut nodes),
            Self::Descendant | Self::SelfOrDescendant => collect_pre_order(start, &mut nodes),
            Self::DescendantReverse | Self::SelfOrDescendantReverse => {
                collect_post_order(start, &mut nodes)
            }
            Self::SelfSiblingOrAncestor => {
                collect_siblings(start, &mut nodes);
                collect_ancestors(start, &mut nodes);
            }
        }
        nodes
    }
}

fn collect_siblings(start: &Context, nodes: &mut Vec<Context>) {
    if let Some(parent) = start.parent() {
        nodes.extend(parent.children().into_iter().filter(|c| c != start));
    }
}

fn collect_ancestors(start: &Context, nodes: &mut Vec<Context>) {
    let mut current = start.parent();
    while let Some(ancestor) = current {
        current = ancestor.parent();
        nodes.push(ancestor);
    }
}

fn collect_pre_order(node: &Context, nodes: &mut Vec<Context>) {
    for child in node.children() {
        nodes.push(child.clone());
        collect_pre_order(&child, nodes);
    }
}

fn collect_post_order(node: &Context, nodes: &mut Vec<Context>) {
    for child in node.children() {
        collect_post_order(&child, nodes);
        nodes.push(child);
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = ContextError;

    /// Parse an axis from its exact snake_case name.
    fn from_str(value: &str) -> Result<Self> {
        Axis::ALL
            .into_iter()
            .find(|axis| axis.as_str() == value)
            .ok_or_else(|| ContextError::InvalidAxis(value.to_string()))
    }
}

/// A context seen through an axis.
///
/// Queries handled through the view are routed along the axis. The view is
/// the same context as far as equality is concerned.
///
/// Creating the view arms the axis on the context at once, and a routed
/// query through the view neither uses nor clears it. Until a non-routed
/// dispatch consumes it, the next plain [`Context::handle`] on that context
/// follows the axis instead of escalating.
#[derive(Clone)]
pub struct AxisView {
    context: Context,
    axis: Axis,
}

impl AxisView {
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Handle a query along this view's axis.
    pub fn handle(&self, query: &mut Query, greedy: bool) -> bool {
        Handler::handle(self, query, greedy, self)
    }

    /// Resolve the first value answering `T` along the axis.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let mut query = Query::of::<T>();
        if self.handle(&mut query, false) {
            query.result::<T>()
        } else {
            None
        }
    }

    /// Resolve every value answering `T` along the axis.
    pub fn resolve_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        let mut query = Query::of::<T>();
        if self.handle(&mut query, true) {
            query.results::<T>()
        } else {
            Vec::new()
        }
    }

    /// Register a handler on the underlying context.
    pub fn add_handler(&self, handler: Arc<dyn Handler>) -> &Self {
        self.context.add_handler(handler);
        self
    }

    /// Store a value on the underlying context.
    pub fn store<T: Any + Send + Sync>(&self, value: T) -> &Self {
        self.context.store(value);
        self
    }
}

impl Handler for AxisView {
    fn handle(&self, query: &mut Query, greedy: bool, composer: &dyn Handler) -> bool {
        if !query.is_routed() {
            self.context.set_pending_axis(self.axis);
        }
        self.context.dispatch(query, greedy, composer)
    }
}

impl PartialEq for AxisView {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context
    }
}

impl Eq for AxisView {}

impl PartialEq<Context> for AxisView {
    fn eq(&self, other: &Context) -> bool {
        &self.context == other
    }
}

impl PartialEq<AxisView> for Context {
    fn eq(&self, other: &AxisView) -> bool {
        self == &other.context
    }
}

impl Hash for AxisView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.hash(state);
    }
}

impl fmt::Debug for AxisView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AxisView")
            .field("context", &self.context.id())
            .field("axis", &self.axis)
            .finish()
    }
}

impl Context {
    /// Select an axis for the next dispatch on this context and return a
    /// view that routes along it.
    pub fn axis(&self, axis: Axis) -> AxisView {
        self.set_pending_axis(axis);
        AxisView {
            context: self.clone(),
            axis,
        }
    }

    /// Handle a query along `axis`.
    pub fn handle_axis(&self, axis: Axis, query: &mut Query, greedy: bool) -> bool {
        self.axis(axis).handle(query, greedy)
    }

    /// Handle a query along the axis called `name`.
    ///
    /// Fails with [`ContextError::InvalidAxis`] for an unknown name.
    pub fn handle_axis_named(&self, name: &str, query: &mut Query, greedy: bool) -> Result<bool> {
        let axis: Axis = name.parse()?;
        Ok(self.handle_axis(axis, query, greedy))
    }

    /// Visit the nodes of `axis` until `visitor` returns true.
    pub fn traverse<F>(&self, axis: Axis, mut visitor: F)
    where
        F: FnMut(&Context) -> bool,
    {
        for node in axis.nodes(self) {
            if visitor(&node) {
                break;
            }
        }
    }

    pub fn via_self(&self) -> AxisView {
        self.axis(Axis::SelfOnly)
    }

    pub fn via_root(&self) -> AxisView {
        self.axis(Axis::Root)
    }

    pub fn via_child(&self) -> AxisView {
        self.axis(Axis::Child)
    }

    pub fn via_sibling(&self) -> AxisView {
        self.axis(Axis::Sibling)
    }

    pub fn via_ancestor(&self) -> AxisView {
        self.axis(Axis::Ancestor)
    }

    pub fn via_descendant(&self) -> AxisView {
        self.axis(Axis::Descendant)
    }

    pub fn via_descendant_reverse(&self) -> AxisView {
        self.axis(Axis::DescendantReverse)
    }

    pub fn via_self_or_child(&self) -> AxisView {
        self.axis(Axis::SelfOrChild)
    }

    pub fn via_self_or_sibling(&self) -> AxisView {
        self.axis(Axis::SelfOrSibling)
    }

    pub fn via_self_or_ancestor(&self) -> AxisView {
        self.axis(Axis::SelfOrAncestor)
    }

    pub fn via_self_or_descendant(&self) -> AxisView {
        self.axis(Axis::SelfOrDescendant)
    }

    pub fn via_self_or_descendant_reverse(&self) -> AxisView {
        self.axis(Axis::SelfOrDescendantReverse)
    }

    pub fn via_self_sibling_or_ancestor(&self) -> AxisView {
        self.axis(Axis::SelfSiblingOrAncestor)
    }
}
