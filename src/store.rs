use std::{
    cell::RefCell,
    collections::VecDeque,
    rc::{Rc, Weak},
};

use log::debug;
use slabmap::SlabMap;

use crate::{
    core::{ActionContext, SignalContext, Task},
    Record, State, Subscription, WeakState,
};


/// The pair every consumer of a [`Store`] observes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreState {
    pub records: Rc<[Record]>,
    pub search: String,
}

impl StoreState {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            records: Rc::new([]),
            search: search.into(),
        }
    }
}

/// A change to a [`StoreState`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreAction {
    ReplaceDataset(Rc<[Record]>),
    SetSearchText(String),
}

impl StoreAction {
    fn reduce(self, state: &mut StoreState) {
        match self {
            StoreAction::ReplaceDataset(records) => {
                debug!("replace dataset with {} records", records.len());
                state.records = records;
            }
            StoreAction::SetSearchText(search) => {
                debug!("set search text to {search:?}");
                state.search = search;
            }
        }
    }
}

type Subscribers = RefCell<SlabMap<Weak<dyn Subscriber>>>;

/// Single source of truth for the loaded records and the current search text.
///
/// `Store` is a handle; clones share the same state. The store never filters
/// the records itself.
///
/// Effects reading the store re-run once per [`Runtime::update`](crate::core::Runtime::update)
/// and see the latest pair. Closures given to [`Store::subscribe`] receive every
/// intermediate pair.
#[derive(Clone)]
pub struct Store {
    state: State<StoreState>,
    subscribers: Rc<Subscribers>,
}

impl Store {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            state: State::new(StoreState::new(search)),
            subscribers: Rc::default(),
        }
    }

    /// Returns the current pair and adds a dependency on this store to `sc`.
    pub fn snapshot(&self, sc: &mut SignalContext) -> StoreState {
        self.state.get(sc)
    }
    pub fn records(&self, sc: &mut SignalContext) -> Rc<[Record]> {
        self.state.borrow(sc).records.clone()
    }
    pub fn search_text(&self, sc: &mut SignalContext) -> String {
        self.state.borrow(sc).search.clone()
    }

    /// Replaces the whole record sequence. The search text is left unchanged.
    pub fn replace_dataset(&self, records: impl Into<Rc<[Record]>>, ac: &mut ActionContext) {
        self.dispatch(StoreAction::ReplaceDataset(records.into()), ac)
    }

    /// Stores `text` verbatim. The records are left unchanged.
    pub fn set_search_text(&self, text: impl Into<String>, ac: &mut ActionContext) {
        self.dispatch(StoreAction::SetSearchText(text.into()), ac)
    }

    /// Applies `action` and notifies every consumer, even if nothing changed.
    pub fn dispatch(&self, action: StoreAction, ac: &mut ActionContext) {
        let state = self.state.update(
            |state| {
                action.reduce(state);
                state.clone()
            },
            ac,
        );
        let subscribers: Vec<_> = self
            .subscribers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for subscriber in subscribers {
            subscriber.push(&state);
        }
    }

    /// Calls `f` with the current pair, then once with the result of every later
    /// mutation, in order, until the returned [`Subscription`] is dropped.
    ///
    /// Calls happen inside [`Runtime::run_tasks`](crate::core::Runtime::run_tasks).
    pub fn subscribe(&self, f: impl FnMut(&StoreState) + 'static) -> Subscription {
        let node = Rc::new(SubscriberNode {
            f: RefCell::new(f),
            pending: RefCell::new(VecDeque::new()),
        });
        node.clone().push(&self.snapshot(&mut SignalContext::untracked()));
        let key = self
            .subscribers
            .borrow_mut()
            .insert(Rc::downgrade(&node) as Weak<dyn Subscriber>);
        let subscribers = Rc::downgrade(&self.subscribers);
        Subscription::from_fn(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.borrow_mut().remove(key);
            }
            drop(node);
        })
    }

    /// Number of consumers currently observing this store.
    pub fn observer_count(&self) -> usize {
        self.state.observer_count() + self.subscribers.borrow().len()
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            state: self.state.downgrade(),
            subscribers: Rc::downgrade(&self.subscribers),
        }
    }
}
impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Store").field(&self.state).finish()
    }
}

#[derive(Clone)]
pub struct WeakStore {
    state: WeakState<StoreState>,
    subscribers: Weak<Subscribers>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        Some(Store {
            state: self.state.upgrade()?,
            subscribers: self.subscribers.upgrade()?,
        })
    }
}

trait Subscriber {
    fn push(self: Rc<Self>, state: &StoreState);
}

struct SubscriberNode<F> {
    f: RefCell<F>,
    pending: RefCell<VecDeque<StoreState>>,
}

impl<F: FnMut(&StoreState) + 'static> SubscriberNode<F> {
    fn deliver(&self) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(state) = next else {
                break;
            };
            (self.f.borrow_mut())(&state);
        }
    }
}

impl<F: FnMut(&StoreState) + 'static> Subscriber for SubscriberNode<F> {
    fn push(self: Rc<Self>, state: &StoreState) {
        let mut pending = self.pending.borrow_mut();
        if pending.is_empty() {
            Task::for_weak(Rc::downgrade(&self), |this| this.deliver()).schedule();
        }
        pending.push_back(state.clone());
    }
}
