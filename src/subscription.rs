use std::{any::Any, mem::take, rc::Rc};


/// Keeps a consumer attached while alive.
///
/// Dropping a `Subscription` detaches the consumer it was created for.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }

    /// Calls `f` when the subscription is dropped.
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }

    /// Keeps `rc` alive until the subscription is dropped.
    pub fn from_rc(rc: Rc<dyn Any>) -> Self {
        Subscription(RawSubscription::Rc(rc))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0, RawSubscription::Empty)
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        if let RawSubscription::Fn(f) = take(&mut self.0) {
            f()
        }
    }
}
impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            RawSubscription::Empty => write!(f, "Subscription(empty)"),
            RawSubscription::Fn(_) => write!(f, "Subscription(fn)"),
            RawSubscription::Rc(_) => write!(f, "Subscription(rc)"),
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    Rc(#[allow(unused)] Rc<dyn Any>),
}
