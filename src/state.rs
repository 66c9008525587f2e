use std::{
    cell::{Ref, RefCell},
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;

use crate::core::{ActionContext, Observable, ObserverKey, Observers, SignalContext};


/// Similar to `Rc<RefCell<T>>`, but with added functionality to observe changes.
///
/// Reading through a [`SignalContext`] that belongs to an effect registers the effect
/// as an observer. Every write notifies all registered observers.
#[derive(Default)]
#[derive_ex(Clone, bound())]
pub struct State<T: 'static>(Rc<StateNode<T>>);

impl<T: 'static> State<T> {
    /// Create a new `State` with the given initial value.
    pub fn new(value: T) -> Self {
        Self(Rc::new(StateNode {
            observers: RefCell::new(Observers::default()),
            value: RefCell::new(value),
        }))
    }

    /// Obtains a reference to the current value and adds a dependency on this `State` to the specified `SignalContext`.
    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> Ref<'a, T> {
        self.0.track(sc);
        self.0.value.borrow()
    }

    /// Gets the current value and adds a dependency on this `State` to the specified `SignalContext`.
    pub fn get(&self, sc: &mut SignalContext) -> T
    where
        T: Clone,
    {
        self.borrow(sc).clone()
    }

    /// Sets the value of the state and notifies the dependencies.
    pub fn set(&self, value: T, ac: &mut ActionContext) {
        drop(self.0.value.replace(value));
        self.0.notify(ac);
    }

    /// Sets the value of the state and notifies the dependencies only if the current state is different from the specified value.
    pub fn set_dedup(&self, value: T, ac: &mut ActionContext)
    where
        T: PartialEq,
    {
        if *self.0.value.borrow() == value {
            return;
        }
        self.set(value, ac);
    }

    /// Modifies the value in place and notifies the dependencies.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R, ac: &mut ActionContext) -> R {
        let ret = f(&mut self.0.value.borrow_mut());
        self.0.notify(ac);
        ret
    }

    /// Number of observers currently registered on this state.
    pub fn observer_count(&self) -> usize {
        self.0.observers.borrow().len()
    }

    pub fn downgrade(&self) -> WeakState<T> {
        WeakState(Rc::downgrade(&self.0))
    }
}
impl<T: std::fmt::Debug> std::fmt::Debug for State<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => std::fmt::Debug::fmt(&*value, f),
            Err(_) => write!(f, "<borrowed>"),
        }
    }
}

/// A weak reference to a [`State`].
#[derive_ex(Clone, bound())]
pub struct WeakState<T: 'static>(Weak<StateNode<T>>);

impl<T: 'static> WeakState<T> {
    pub fn upgrade(&self) -> Option<State<T>> {
        self.0.upgrade().map(State)
    }
}

#[derive(Default)]
struct StateNode<T: 'static> {
    observers: RefCell<Observers>,
    value: RefCell<T>,
}
impl<T: 'static> StateNode<T> {
    fn track(self: &Rc<Self>, sc: &mut SignalContext) {
        self.observers.borrow_mut().track(self.clone(), sc);
    }
    fn notify(&self, ac: &mut ActionContext) {
        self.observers.borrow_mut().notify(ac)
    }
}

impl<T: 'static> Observable for StateNode<T> {
    fn forget(self: Rc<Self>, key: ObserverKey) {
        self.observers.borrow_mut().forget(key);
    }
}
