use std::{
    cell::{Cell, RefCell},
    future::{poll_fn, Future},
    mem::{replace, swap, take},
    pin::Pin,
    ptr::null_mut,
    rc::{Rc, Weak},
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll, Wake, Waker},
    thread::AccessError,
};

use derive_ex::derive_ex;
use slabmap::SlabMap;


thread_local! {
    static QUEUES: RefCell<Queues> = RefCell::new(Queues::default());
}

/// Work waiting for the runtime of the current thread.
#[derive(Default)]
struct Queues {
    has_runtime: bool,
    actions: Vec<Action>,
    tasks: Vec<Task>,
    released: Vec<Vec<Dependency>>,
    is_parked: bool,
    wakers: WakerTable,
}

impl Queues {
    fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        QUEUES.with(|q| f(&mut q.borrow_mut()))
    }
    fn try_with<T>(f: impl FnOnce(&mut Self) -> T) -> Result<T, AccessError> {
        QUEUES.try_with(|q| f(&mut q.borrow_mut()))
    }

    fn push_action(&mut self, action: Action) {
        if !self.has_runtime {
            panic!("`Runtime` is not created.");
        }
        self.actions.push(action);
        self.unpark();
    }
    fn push_task(&mut self, task: Task) {
        self.tasks.push(task);
        self.unpark();
    }
    fn unpark(&mut self) {
        if replace(&mut self.is_parked, false) {
            self.wakers.inbox.lock().wake_outer();
        }
    }
    fn has_work(&self) -> bool {
        !self.actions.is_empty() || !self.tasks.is_empty() || !self.released.is_empty()
    }

    /// Queues every woken async action.
    ///
    /// Returns the actions whose wakers are all gone; the caller drops them
    /// once `QUEUES` is no longer borrowed.
    fn collect_woken(&mut self) -> Vec<Rc<AsyncAction>> {
        let mut inbox = self.wakers.inbox.lock();
        let gone = inbox
            .dropped
            .drain(..)
            .filter_map(|key| self.wakers.actions.remove(key))
            .collect();
        for key in inbox.woken.drain(..) {
            if let Some(action) = self.wakers.actions.get(key) {
                self.actions.push(Action::Resume(action.clone()));
            }
        }
        gone
    }

    fn poll_ready(&mut self, cx: &Context) -> Poll<()> {
        self.is_parked = false;
        if self.has_work() {
            return Poll::Ready(());
        }
        let mut inbox = self.wakers.inbox.lock();
        if inbox.has_pending() {
            return Poll::Ready(());
        }
        inbox.outer = Some(cx.waker().clone());
        self.is_parked = true;
        Poll::Pending
    }
}

/// Reactive runtime.
///
/// Only one `Runtime` can exist per thread. States are read through [`Runtime::sc`]
/// and changed through [`Runtime::ac`]. Spawned actions, effects, subscribers and
/// async actions run during [`Runtime::update`].
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    ac: ActionContext,
    actions: Vec<Action>,
    tasks: Vec<Task>,
    released: Vec<Vec<Dependency>>,
}

impl Runtime {
    pub fn new() -> Self {
        if Queues::with(|q| replace(&mut q.has_runtime, true)) {
            panic!("Only one `Runtime` can exist in the same thread at the same time.");
        }
        Self {
            ac: ActionContext {
                running: SlabMap::new(),
            },
            actions: Vec::new(),
            tasks: Vec::new(),
            released: Vec::new(),
        }
    }

    pub fn ac(&mut self) -> &mut ActionContext {
        &mut self.ac
    }
    pub fn sc(&mut self) -> SignalContext<'_> {
        self.release_dependencies();
        SignalContext::untracked()
    }

    /// Run spawned actions and resume woken async actions.
    ///
    /// Returns `true` if anything ran.
    pub fn run_actions(&mut self) -> bool {
        let mut actions = take(&mut self.actions);
        let mut ran = false;
        loop {
            let gone = Queues::with(|q| {
                let gone = q.collect_woken();
                swap(&mut actions, &mut q.actions);
                gone
            });
            drop(gone);
            if actions.is_empty() {
                break;
            }
            for action in actions.drain(..) {
                action.run(&mut self.ac);
            }
            ran = true;
        }
        self.actions = actions;
        ran
    }

    /// Run the effects and subscribers scheduled so far, in scheduling order.
    ///
    /// Returns `true` if anything ran.
    pub fn run_tasks(&mut self) -> bool {
        self.release_dependencies();
        let mut tasks = take(&mut self.tasks);
        Queues::with(|q| swap(&mut tasks, &mut q.tasks));
        let ran = !tasks.is_empty();
        for task in tasks.drain(..) {
            task.run();
        }
        self.tasks = tasks;
        ran
    }

    fn release_dependencies(&mut self) -> bool {
        let mut released = take(&mut self.released);
        let mut ran = false;
        loop {
            Queues::with(|q| swap(&mut released, &mut q.released));
            if released.is_empty() {
                break;
            }
            for dependency in released.drain(..).flatten() {
                dependency.release();
            }
            ran = true;
        }
        self.released = released;
        ran
    }

    /// Keep running actions and tasks until nothing is left.
    pub fn update(&mut self) {
        while self.run_actions() || self.run_tasks() || self.release_dependencies() {}
    }

    /// Sleep until [`update`](Self::update) has something to do.
    pub async fn wait_for_ready(&mut self) {
        poll_fn(|cx| Queues::with(|q| q.poll_ready(cx))).await
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let running: Vec<_> = self.ac.running.values().cloned().collect();
        for action in running {
            action.cancel(&mut self.ac);
        }
        let leftovers = Queues::try_with(|q| {
            q.has_runtime = false;
            (take(&mut q.actions), take(&mut q.tasks))
        });
        drop(leftovers);
    }
}

/// Context for changing state.
pub struct ActionContext {
    running: SlabMap<Rc<AsyncAction>>,
}

/// Context for reading state.
///
/// Inside an effect, every state read through it becomes a dependency of the effect.
pub struct SignalContext<'s> {
    collector: Option<&'s mut Collector>,
}

impl SignalContext<'_> {
    pub(crate) fn untracked() -> SignalContext<'static> {
        SignalContext { collector: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObserverKey(usize);

pub(crate) trait Observer: 'static {
    fn notify(self: Rc<Self>, ac: &mut ActionContext);
}

pub(crate) trait Observable: 'static {
    fn forget(self: Rc<Self>, key: ObserverKey);
}

struct Dependency {
    source: Rc<dyn Observable>,
    key: ObserverKey,
}

impl Dependency {
    fn points_to(&self, source: &Rc<dyn Observable>) -> bool {
        Rc::as_ptr(&self.source).cast::<()>() == Rc::as_ptr(source).cast::<()>()
    }
    fn release(self) {
        self.source.forget(self.key)
    }
}

struct Collector {
    observer: Weak<dyn Observer>,
    dependencies: Vec<Dependency>,
}

struct ObserverEntry {
    observer: Weak<dyn Observer>,
    is_notified: bool,
}

/// Observers registered on one observable.
#[derive(Default)]
pub(crate) struct Observers(SlabMap<ObserverEntry>);

impl Observers {
    /// Registers the observer that is collecting through `sc`, if any.
    pub fn track(&mut self, this: Rc<dyn Observable>, sc: &mut SignalContext) {
        let Some(collector) = &mut sc.collector else {
            return;
        };
        if collector.dependencies.iter().any(|d| d.points_to(&this)) {
            return;
        }
        let key = ObserverKey(self.0.insert(ObserverEntry {
            observer: collector.observer.clone(),
            is_notified: false,
        }));
        collector.dependencies.push(Dependency { source: this, key });
    }
    pub fn forget(&mut self, key: ObserverKey) {
        self.0.remove(key.0);
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Notifies each observer once until it reads again.
    pub fn notify(&mut self, ac: &mut ActionContext) {
        for entry in self.0.values_mut() {
            if replace(&mut entry.is_notified, true) {
                continue;
            }
            if let Some(observer) = entry.observer.upgrade() {
                observer.notify(ac);
            }
        }
    }
}

/// Dependencies of one observer and whether it has to run again.
pub(crate) struct Tracker {
    observer: Weak<dyn Observer>,
    dependencies: Vec<Dependency>,
    is_stale: bool,
}

impl Tracker {
    pub fn new(observer: &Weak<impl Observer>) -> Self {
        Self {
            observer: observer.clone(),
            dependencies: Vec::new(),
            is_stale: true,
        }
    }
    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// Returns `true` if the observer was up to date until now.
    pub fn mark_stale(&mut self) -> bool {
        !replace(&mut self.is_stale, true)
    }

    /// Calls `f` and replaces the dependencies with the states it read.
    pub fn run<T>(&mut self, f: impl FnOnce(&mut SignalContext) -> T) -> T {
        self.is_stale = false;
        let mut collector = Collector {
            observer: self.observer.clone(),
            dependencies: Vec::new(),
        };
        let ret = f(&mut SignalContext {
            collector: Some(&mut collector),
        });
        for dependency in replace(&mut self.dependencies, collector.dependencies) {
            dependency.release();
        }
        ret
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if !self.dependencies.is_empty() {
            let _ = Queues::try_with(|q| q.released.push(take(&mut self.dependencies)));
        }
    }
}

/// Spawns a new action.
///
/// The action runs the next time [`Runtime::run_actions`] is called.
///
/// # Panics
///
/// Panics if no [`Runtime`] exists on the current thread.
pub fn spawn_action(f: impl FnOnce(&mut ActionContext) + 'static) {
    Action::Once(Box::new(f)).schedule()
}

/// Spawns a new asynchronous action.
///
/// The future is polled by the [`Runtime`] and dropped without completing if the
/// `Runtime` is dropped first.
pub fn spawn_action_async<Fut>(f: impl FnOnce(AsyncActionContext) -> Fut + 'static)
where
    Fut: Future<Output = ()> + 'static,
{
    spawn_action(|ac| AsyncAction::start(ac, f))
}

enum Action {
    Once(Box<dyn FnOnce(&mut ActionContext)>),
    Resume(Rc<AsyncAction>),
}

impl Action {
    fn run(self, ac: &mut ActionContext) {
        match self {
            Action::Once(f) => f(ac),
            Action::Resume(action) => action.resume(ac),
        }
    }
    fn schedule(self) {
        let _ = Queues::try_with(|q| q.push_action(self));
    }
}

struct AsyncAction {
    context: Rc<Cell<*mut ActionContext>>,
    running: RefCell<Option<Running>>,
}

struct Running {
    id: usize,
    waker: Waker,
    future: Pin<Box<dyn Future<Output = ()>>>,
}

impl AsyncAction {
    fn start<Fut>(ac: &mut ActionContext, f: impl FnOnce(AsyncActionContext) -> Fut)
    where
        Fut: Future<Output = ()> + 'static,
    {
        let context = Rc::new(Cell::new(null_mut()));
        let aac = AsyncActionContext(context.clone());
        let future = enter(&context, ac, || f(aac));
        let action = Rc::new(Self {
            context,
            running: RefCell::new(None),
        });
        let id = ac.running.insert(action.clone());
        let waker = WakerTable::waker_for(action.clone());
        *action.running.borrow_mut() = Some(Running {
            id,
            waker,
            future: Box::pin(future),
        });
        action.resume(ac);
    }

    fn resume(&self, ac: &mut ActionContext) {
        let finished = enter(&self.context, ac, || {
            let mut running = self.running.borrow_mut();
            let r = running.as_mut()?;
            let mut cx = Context::from_waker(&r.waker);
            if r.future.as_mut().poll(&mut cx).is_pending() {
                return None;
            }
            running.take()
        });
        if let Some(finished) = finished {
            ac.running.remove(finished.id);
        }
    }

    fn cancel(&self, ac: &mut ActionContext) {
        let cancelled = enter(&self.context, ac, || self.running.borrow_mut().take());
        if let Some(cancelled) = cancelled {
            ac.running.remove(cancelled.id);
        }
    }
}

/// Makes `ac` reachable from the [`AsyncActionContext`] sharing `context` while `f` runs.
fn enter<T>(
    context: &Cell<*mut ActionContext>,
    ac: &mut ActionContext,
    f: impl FnOnce() -> T,
) -> T {
    assert!(context.get().is_null());
    context.set(ac as *mut ActionContext);
    let ret = f();
    context.set(null_mut());
    ret
}

/// Context for changing state from an async action.
///
/// Only usable while the [`Runtime`] is polling the action.
pub struct AsyncActionContext(Rc<Cell<*mut ActionContext>>);

impl AsyncActionContext {
    pub fn call<T>(&self, f: impl FnOnce(&mut ActionContext) -> T) -> T {
        let p = self.0.replace(null_mut());
        assert!(
            !p.is_null(),
            "`AsyncActionContext` can only be used while the action is being polled."
        );
        // SAFETY: `p` was set by `enter` from a live `&mut ActionContext` that is not
        // otherwise used until `enter` returns, and it is cleared while `f` runs.
        let ret = f(unsafe { &mut *p });
        self.0.set(p);
        ret
    }
}

#[derive(Default)]
struct WakerTable {
    actions: SlabMap<Rc<AsyncAction>>,
    inbox: Inbox,
}

impl WakerTable {
    fn waker_for(action: Rc<AsyncAction>) -> Waker {
        let waker = Queues::with(|q| ActionWaker {
            inbox: q.wakers.inbox.clone(),
            key: q.wakers.actions.insert(action),
        });
        Arc::new(waker).into()
    }
}

/// Wake-ups recorded by wakers, which may be used from any thread.
#[derive(Clone, Default)]
struct Inbox(Arc<Mutex<InboxState>>);

impl Inbox {
    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
struct InboxState {
    woken: Vec<usize>,
    dropped: Vec<usize>,
    outer: Option<Waker>,
}

impl InboxState {
    fn has_pending(&self) -> bool {
        !self.woken.is_empty() || !self.dropped.is_empty()
    }
    fn wake_outer(&mut self) {
        if let Some(waker) = self.outer.take() {
            waker.wake();
        }
    }
}

struct ActionWaker {
    inbox: Inbox,
    key: usize,
}

impl Wake for ActionWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }
    fn wake_by_ref(self: &Arc<Self>) {
        let mut inbox = self.inbox.lock();
        inbox.woken.push(self.key);
        inbox.wake_outer();
    }
}

impl Drop for ActionWaker {
    fn drop(&mut self) {
        self.inbox.lock().dropped.push(self.key);
    }
}

/// Deferred work run by [`Runtime::run_tasks`].
pub(crate) struct Task(Box<dyn FnOnce()>);

impl Task {
    /// A task that calls `f` if `this` is still alive when it runs.
    pub fn for_weak<T: 'static>(this: Weak<T>, f: impl FnOnce(Rc<T>) + 'static) -> Self {
        Task(Box::new(move || {
            if let Some(this) = this.upgrade() {
                f(this)
            }
        }))
    }
    pub fn schedule(self) {
        Queues::with(|q| q.push_task(self))
    }
    fn run(self) {
        (self.0)()
    }
}
