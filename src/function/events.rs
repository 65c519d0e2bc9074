//! Function-level change events.
//!
//! The function multiplexes the mutations of all its variables into a single
//! synchronous stream consumed by the binding layer. Structural changes to
//! the argument/component collections themselves travel on a separate
//! stream, since the only sane reaction to those is a full rebuild.

use std::rc::Rc;

use crate::array::{ChangeAction, SubscriptionId};
use crate::value::Value;

/// Whether a variable acts as an axis or a value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableRole {
    Argument,
    Component,
}

/// One applied mutation of a function's values.
#[derive(Debug, Clone)]
pub struct FunctionEvent {
    /// What happened.
    pub action: ChangeAction,
    /// Name of the originating variable.
    pub variable: String,
    /// Role of the originating variable.
    pub role: VariableRole,
    /// For argument events, the axis number of the originating argument.
    pub axis: Option<usize>,
    /// Affected index: the position along the axis for argument events, the
    /// linear offset into the component array for component events.
    pub index: usize,
    /// The affected values, as dynamic cells.
    pub cells: Vec<Value>,
}

/// A change to the argument or component collections themselves.
#[derive(Debug, Clone)]
pub struct FunctionStructureEvent {
    pub role: VariableRole,
    pub index: usize,
    pub action: ChangeAction,
}

/// Ordered listener registry for one event type.
pub struct Listeners<E> {
    items: Vec<(SubscriptionId, Rc<dyn Fn(&E)>)>,
    next_id: usize,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Listeners {
            items: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId::from_raw(self.next_id);
        self.next_id += 1;
        self.items.push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.items.retain(|(key, _)| *key != id);
    }

    /// Snapshot of the current listeners, for dispatch outside the borrow.
    pub fn snapshot(&self) -> Vec<Rc<dyn Fn(&E)>> {
        self.items.iter().map(|(_, l)| Rc::clone(l)).collect()
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Listeners::new()
    }
}
