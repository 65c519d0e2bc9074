//! Two-phase change notification for array mutations.
//!
//! Every mutating array operation raises a *changing* event before storage is
//! touched and a *changed* event after. A changing listener may reject the
//! pending mutation by returning an error, which aborts the operation with
//! storage untouched. Delivery is synchronous, in mutation order.

use std::rc::Rc;

use thiserror::Error;

/// What a mutation did to the array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// Values were inserted.
    Add,
    /// Values were removed.
    Remove,
    /// A value was overwritten in place.
    Replace,
    /// The array was rebuilt wholesale (resize, clear).
    Reset,
}

/// Description of one pending or applied mutation.
#[derive(Debug, Clone)]
pub struct ArrayChange<T> {
    /// The kind of mutation.
    pub action: ChangeAction,
    /// Linear offset of the first affected slot, in the shape the action
    /// produces (for `Add`) or consumed (for `Remove`).
    pub index: usize,
    /// The affected values: inserted, removed, or the replacement.
    pub items: Vec<T>,
}

/// A changing-phase listener vetoed the mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pending change rejected: {reason}")]
pub struct ChangeRejected {
    /// Listener-supplied explanation.
    pub reason: String,
}

impl ChangeRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        ChangeRejected {
            reason: reason.into(),
        }
    }
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(usize);

impl SubscriptionId {
    pub(crate) fn from_raw(raw: usize) -> Self {
        SubscriptionId(raw)
    }
}

type ChangingListener<T> = Rc<dyn Fn(&ArrayChange<T>) -> Result<(), ChangeRejected>>;
type ChangedListener<T> = Rc<dyn Fn(&ArrayChange<T>)>;

/// Listener registry for one array.
pub struct ArrayEvents<T> {
    changing: Vec<(SubscriptionId, ChangingListener<T>)>,
    changed: Vec<(SubscriptionId, ChangedListener<T>)>,
    next_id: usize,
}

impl<T> ArrayEvents<T> {
    pub fn new() -> Self {
        ArrayEvents {
            changing: Vec::new(),
            changed: Vec::new(),
            next_id: 0,
        }
    }

    fn allocate(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers a changing-phase (veto) listener.
    pub fn on_changing(
        &mut self,
        listener: impl Fn(&ArrayChange<T>) -> Result<(), ChangeRejected> + 'static,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.changing.push((id, Rc::new(listener)));
        id
    }

    /// Registers a changed-phase (notify) listener.
    pub fn on_changed(&mut self, listener: impl Fn(&ArrayChange<T>) + 'static) -> SubscriptionId {
        let id = self.allocate();
        self.changed.push((id, Rc::new(listener)));
        id
    }

    /// Removes a listener from either phase.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.changing.retain(|(key, _)| *key != id);
        self.changed.retain(|(key, _)| *key != id);
    }

    /// Raises the changing phase; the first rejection aborts.
    pub fn raise_changing(&self, change: &ArrayChange<T>) -> Result<(), ChangeRejected> {
        for (_, listener) in &self.changing {
            listener(change)?;
        }
        Ok(())
    }

    /// Raises the changed phase.
    pub fn raise_changed(&self, change: &ArrayChange<T>) {
        for (_, listener) in &self.changed {
            listener(change);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changing.is_empty() && self.changed.is_empty()
    }
}

impl<T> Default for ArrayEvents<T> {
    fn default() -> Self {
        ArrayEvents::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_changed_listeners_run_in_registration_order() {
        let seen: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
        let mut events: ArrayEvents<i32> = ArrayEvents::new();

        let first = Rc::clone(&seen);
        events.on_changed(move |_| first.borrow_mut().push("first"));
        let second = Rc::clone(&seen);
        events.on_changed(move |_| second.borrow_mut().push("second"));

        events.raise_changed(&ArrayChange {
            action: ChangeAction::Add,
            index: 0,
            items: vec![1],
        });
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_changing_listener_can_veto() {
        let mut events: ArrayEvents<i32> = ArrayEvents::new();
        events.on_changing(|change| {
            if change.items.contains(&13) {
                Err(ChangeRejected::new("unlucky"))
            } else {
                Ok(())
            }
        });

        let allowed = ArrayChange {
            action: ChangeAction::Add,
            index: 0,
            items: vec![1],
        };
        assert!(events.raise_changing(&allowed).is_ok());

        let vetoed = ArrayChange {
            action: ChangeAction::Add,
            index: 0,
            items: vec![13],
        };
        assert!(events.raise_changing(&vetoed).is_err());
    }

    #[test]
    fn test_unsubscribe() {
        let seen: Rc<RefCell<usize>> = Rc::new(RefCell::new(0));
        let mut events: ArrayEvents<i32> = ArrayEvents::new();
        let counter = Rc::clone(&seen);
        let id = events.on_changed(move |_| *counter.borrow_mut() += 1);
        events.unsubscribe(id);
        events.raise_changed(&ArrayChange {
            action: ChangeAction::Reset,
            index: 0,
            items: Vec::new(),
        });
        assert_eq!(*seen.borrow(), 0);
    }
}
