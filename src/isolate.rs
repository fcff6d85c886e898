use crate::callback::Registry;
use crate::config;
use crate::logging;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ContextRef, Durable};
use crate::platform::{self, TaskQueues};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type IsolatePtr = *mut Isolate;

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Isolates alive on this thread, by id. Tasks carry ids instead of pointers so that a task
    // outliving its isolate finds nothing here instead of a dangling pointer.
    static LIVE: RefCell<FxHashMap<u64, *const Isolate>> = RefCell::new(FxHashMap::default());
}

/// Back-pointer from the engine isolate to the bridge isolate that owns it.
struct Owner(*const Isolate);

/// A bridge-owned engine isolate.
///
/// Besides the engine isolate itself this holds everything the bridge keeps per isolate: the
/// callback registry, the stack of entered contexts, the default platform's task queues, and the
/// interface stack that lets forward calls made from inside a callback reuse that callback's
/// handle scope.
pub struct Isolate {
    id: u64,
    registry: Rc<RefCell<Registry>>,
    entered: RefCell<Vec<v8::Global<v8::Context>>>,
    pub(crate) queues: TaskQueues,
    pub(crate) promise_reject_callback: Cell<Option<PromiseRejectCallback>>,
    message_loop_scheduled: Cell<bool>,
    idle_scheduled: Cell<bool>,
    // usable from any thread, unlike everything else here
    handle: v8::IsolateHandle,
    // dropped last, everything above may hold engine handles
    interface: Interface,
}

/// Receives promise rejection events. All tokens are borrowed for the duration of the call.
pub type PromiseRejectCallback = unsafe extern "C" fn(
    isolate: IsolatePtr,
    event: crate::enums::PromiseRejectEvent,
    promise: crate::handle::ValueRef,
    value: crate::handle::ValueRef,
);

impl Isolate {
    pub fn new(allocator: v8::SharedRef<v8::Allocator>) -> Box<Isolate> {
        let config = config::current();
        let mut isolate =
            v8::Isolate::new(v8::CreateParams::default().array_buffer_allocator(allocator));
        isolate.set_oom_error_handler(logging::oom_error);
        if config.capture_stack_trace_frames > 0 {
            isolate.set_capture_stack_trace_for_uncaught_exceptions(
                true,
                config.capture_stack_trace_frames,
            );
        }
        let handle = isolate.thread_safe_handle();
        // the engine enters a new isolate on creation; bridge isolates are only entered while
        // the bridge works on them, so they can be disposed in any order
        unsafe { isolate.exit() };

        let id = NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed);
        let bridge = Box::new(Isolate {
            id,
            registry: Rc::new(RefCell::new(Registry::default())),
            entered: RefCell::new(Vec::new()),
            queues: TaskQueues::default(),
            promise_reject_callback: Cell::new(None),
            message_loop_scheduled: Cell::new(false),
            idle_scheduled: Cell::new(false),
            handle,
            interface: Interface::new(isolate),
        });

        let ptr = &*bridge as *const Isolate;
        bridge.with_isolate(|isolate| {
            isolate.set_slot(Owner(ptr));
        });
        LIVE.with(|live| live.borrow_mut().insert(id, ptr));
        debug!("created isolate {}", id);
        bridge
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn as_ptr(&self) -> IsolatePtr {
        self as *const Isolate as IsolatePtr
    }

    /// Finds the bridge isolate that owns an engine isolate, e.g. inside a callback.
    pub(crate) fn from_engine<'a>(isolate: &v8::Isolate) -> Option<&'a Isolate> {
        isolate
            .get_slot::<Owner>()
            .map(|owner| unsafe { &*owner.0 })
    }

    /// Runs `func` against a live isolate on this thread, if `id` still names one.
    pub(crate) fn with_live<F, T>(id: u64, func: F) -> Option<T>
    where
        F: FnOnce(&Isolate) -> T,
    {
        let ptr = LIVE.with(|live| live.borrow().get(&id).copied())?;
        Some(func(unsafe { &*ptr }))
    }

    pub(crate) fn registry(&self) -> Rc<RefCell<Registry>> {
        self.registry.clone()
    }

    /// Number of callbacks currently on the stack.
    pub fn callback_depth(&self) -> usize {
        self.interface.depth()
    }

    /// A handle for terminating execution from other threads.
    pub(crate) fn isolate_handle(&self) -> v8::IsolateHandle {
        self.handle.clone()
    }

    pub(crate) fn with_isolate<F, T>(&self, func: F) -> T
    where
        F: FnOnce(&mut v8::Isolate) -> T,
    {
        self.interface.top(|entry| entry.isolate(func))
    }

    /// Opens a handle scope without entering a context.
    pub(crate) fn scope<F, T>(&self, func: F) -> T
    where
        F: FnOnce(&mut v8::HandleScope<()>) -> T,
    {
        self.interface.top(|entry| entry.scope(func))
    }

    /// Opens a handle scope inside `context`. Without an explicit context this is the innermost
    /// entered context, or the current context of the running callback.
    pub(crate) fn context_scope<F, T>(&self, context: ContextRef, func: F) -> BridgeResult<T>
    where
        F: FnOnce(&mut v8::ContextScope<v8::HandleScope>) -> T,
    {
        let context = match unsafe { Durable::borrow(context) } {
            Some(context) => Some(context.global().clone()),
            None => self.entered.borrow().last().cloned(),
        };
        self.interface
            .top(|entry| entry.context_scope(context, func))
    }

    /// The context forward calls use by default.
    pub(crate) fn current_context(&self) -> Option<v8::Global<v8::Context>> {
        if let Some(context) = self.entered.borrow().last() {
            return Some(context.clone());
        }
        self.interface.top(|entry| entry.callback_context())
    }

    pub(crate) fn enter_context(&self, context: v8::Global<v8::Context>) {
        self.entered.borrow_mut().push(context);
    }

    /// Leaves the innermost entered context. Returns false if none was entered.
    pub(crate) fn exit_context(&self) -> bool {
        self.entered.borrow_mut().pop().is_some()
    }

    /// Makes the handle scope of a running callback the target of nested forward calls until the
    /// returned guard drops.
    pub(crate) fn enter_callback<'a>(&'a self, scope: &mut v8::HandleScope) -> EnteredCallback<'a> {
        let ptr = scope as *mut v8::HandleScope;
        // The lifetime can be erased because the pointer only lives on the interface stack
        // until the guard is dropped, inside the callback that owns the scope.
        let ptr: *mut v8::HandleScope<'static> = unsafe { std::mem::transmute(ptr) };
        self.interface.push(ptr);
        trace!("isolate {} entered callback (depth {})", self.id, self.interface.depth());
        EnteredCallback(self)
    }

    /// Queues one round of engine housekeeping on the installed platform: a message-loop pump
    /// and microtask checkpoint on the foreground, and an idle pass if the platform runs idle
    /// tasks for this isolate. Rounds already queued are not duplicated.
    pub(crate) fn schedule_engine_work(&self) {
        let Some(platform) = platform::installed() else {
            return;
        };
        if !self.message_loop_scheduled.replace(true) {
            platform.call_on_foreground_thread(
                self,
                Box::new(platform::MessageLoopTask::new(self.id)),
            );
        }
        if platform.idle_tasks_enabled(self) && !self.idle_scheduled.replace(true) {
            platform.call_idle_on_foreground_thread(
                self,
                Box::new(platform::EngineIdleTask::new(self.id)),
            );
        }
    }

    /// Re-arms housekeeping after a posted message loop task was destroyed without running.
    pub(crate) fn message_loop_dropped(&self) {
        self.message_loop_scheduled.set(false);
    }

    /// Re-arms housekeeping after a posted idle task was destroyed without running.
    pub(crate) fn idle_dropped(&self) {
        self.idle_scheduled.set(false);
    }

    pub(crate) fn pump_message_loop(&self) {
        self.message_loop_scheduled.set(false);
        if self.callback_depth() > 0 {
            trace!("isolate {} skipped message loop pump inside a callback", self.id);
            return;
        }
        let Some(engine) = platform::engine_platform() else {
            return;
        };
        self.with_isolate(|isolate| {
            while v8::Platform::pump_message_loop(&engine, isolate, false) {}
            isolate.perform_microtask_checkpoint();
        });
    }

    pub(crate) fn run_engine_idle_tasks(&self, idle_time_in_seconds: f64) {
        self.idle_scheduled.set(false);
        if self.callback_depth() > 0 {
            return;
        }
        let Some(engine) = platform::engine_platform() else {
            return;
        };
        self.with_isolate(|isolate| {
            v8::Platform::run_idle_tasks(&engine, isolate, idle_time_in_seconds)
        });
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        LIVE.with(|live| live.borrow_mut().remove(&self.id));
        self.entered.borrow_mut().clear();
        debug!("disposing isolate {}", self.id);
    }
}

/// Pops the callback scope pushed by `Isolate::enter_callback`.
pub(crate) struct EnteredCallback<'a>(&'a Isolate);

impl Drop for EnteredCallback<'_> {
    fn drop(&mut self) {
        self.0.interface.pop();
    }
}

struct Interface {
    root: Rc<RefCell<InterfaceEntry>>,
    callbacks: RefCell<Vec<Rc<RefCell<InterfaceEntry>>>>,
}

impl Drop for Interface {
    fn drop(&mut self) {
        // the engine only disposes the isolate entered on this thread
        if let InterfaceEntry::Isolate(isolate) = &mut *self.root.borrow_mut() {
            unsafe { isolate.enter() };
        }
    }
}

impl Interface {
    fn new(isolate: v8::OwnedIsolate) -> Interface {
        Interface {
            root: Rc::new(RefCell::new(InterfaceEntry::Isolate(isolate))),
            callbacks: RefCell::new(Vec::new()),
        }
    }

    fn depth(&self) -> usize {
        self.callbacks.borrow().len()
    }

    fn push(&self, handle_scope: *mut v8::HandleScope<'static>) {
        self.callbacks
            .borrow_mut()
            .push(Rc::new(RefCell::new(InterfaceEntry::HandleScope(
                handle_scope,
            ))));
    }

    fn pop(&self) {
        self.callbacks.borrow_mut().pop();
    }

    fn top<F, T>(&self, func: F) -> T
    where
        F: FnOnce(&mut InterfaceEntry) -> T,
    {
        let top = match self.callbacks.borrow().last() {
            Some(entry) => entry.clone(),
            None => self.root.clone(),
        };
        let mut top_mut = top.borrow_mut();
        func(&mut top_mut)
    }
}

enum InterfaceEntry {
    Isolate(v8::OwnedIsolate),
    HandleScope(*mut v8::HandleScope<'static>),
}

/// Enters `isolate` on this thread for the duration of `func`. Callback entries need no such
/// step, the call that led into the callback has entered the isolate already.
fn entered<F, T>(isolate: &mut v8::OwnedIsolate, func: F) -> T
where
    F: FnOnce(&mut v8::OwnedIsolate) -> T,
{
    unsafe { isolate.enter() };
    let result = func(isolate);
    unsafe { isolate.exit() };
    result
}

impl InterfaceEntry {
    fn isolate<F, T>(&mut self, func: F) -> T
    where
        F: FnOnce(&mut v8::Isolate) -> T,
    {
        match self {
            InterfaceEntry::Isolate(isolate) => entered(isolate, |isolate| func(isolate)),
            InterfaceEntry::HandleScope(ref ptr) => {
                let scope: &mut v8::HandleScope = unsafe { &mut **ptr };
                func(scope)
            }
        }
    }

    fn scope<F, T>(&mut self, func: F) -> T
    where
        F: FnOnce(&mut v8::HandleScope<()>) -> T,
    {
        match self {
            InterfaceEntry::Isolate(isolate) => {
                entered(isolate, |isolate| func(&mut v8::HandleScope::new(isolate)))
            }
            InterfaceEntry::HandleScope(ref ptr) => {
                let scope: &mut v8::HandleScope = unsafe { &mut **ptr };
                func(&mut v8::HandleScope::new(scope))
            }
        }
    }

    fn context_scope<F, T>(
        &mut self,
        context: Option<v8::Global<v8::Context>>,
        func: F,
    ) -> BridgeResult<T>
    where
        F: FnOnce(&mut v8::ContextScope<v8::HandleScope>) -> T,
    {
        match self {
            InterfaceEntry::Isolate(isolate) => {
                let context = context.ok_or(BridgeError::NoContext)?;
                Ok(entered(isolate, |isolate| {
                    let scope = &mut v8::HandleScope::new(isolate);
                    let context = v8::Local::new(scope, context);
                    let scope = &mut v8::ContextScope::new(scope, context);
                    func(scope)
                }))
            }
            InterfaceEntry::HandleScope(ref ptr) => {
                let scope: &mut v8::HandleScope = unsafe { &mut **ptr };
                let scope = &mut v8::HandleScope::new(scope);
                let context = match context {
                    Some(context) => v8::Local::new(scope, context),
                    None => scope.get_current_context(),
                };
                let scope = &mut v8::ContextScope::new(scope, context);
                Ok(func(scope))
            }
        }
    }

    fn callback_context(&mut self) -> Option<v8::Global<v8::Context>> {
        match self {
            InterfaceEntry::Isolate(_) => None,
            InterfaceEntry::HandleScope(ref ptr) => {
                let scope: &mut v8::HandleScope = unsafe { &mut **ptr };
                let context = scope.get_current_context();
                Some(v8::Global::new(scope, context))
            }
        }
    }
}
