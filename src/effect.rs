use std::{cell::RefCell, rc::Rc};

use crate::{
    core::{ActionContext, Observer, SignalContext, Task, Tracker},
    Subscription,
};


/// Call `f` now and again whenever a state it read has changed.
///
/// Calls happen inside [`Runtime::run_tasks`](crate::core::Runtime::run_tasks). Any
/// number of changes between two runs lead to one call, which sees the latest values.
/// Only the states read during the previous call are watched.
///
/// Dropping the returned [`Subscription`] stops the calls.
pub fn effect(f: impl FnMut(&mut SignalContext) + 'static) -> Subscription {
    let effect = Rc::new_cyclic(|this| Effect {
        f: RefCell::new(f),
        tracker: RefCell::new(Tracker::new(this)),
    });
    effect.schedule();
    Subscription::from_rc(effect)
}

struct Effect<F> {
    f: RefCell<F>,
    tracker: RefCell<Tracker>,
}

impl<F: FnMut(&mut SignalContext) + 'static> Effect<F> {
    fn schedule(self: &Rc<Self>) {
        Task::for_weak(Rc::downgrade(self), |this| this.run()).schedule()
    }
    fn run(&self) {
        let mut tracker = self.tracker.borrow_mut();
        if tracker.is_stale() {
            tracker.run(&mut *self.f.borrow_mut());
        }
    }
}

impl<F: FnMut(&mut SignalContext) + 'static> Observer for Effect<F> {
    fn notify(self: Rc<Self>, _ac: &mut ActionContext) {
        if self.tracker.borrow_mut().mark_stale() {
            self.schedule();
        }
    }
}
