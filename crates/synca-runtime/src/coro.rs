//! Execution context (stackful coroutine)
//!
//! A [`Coro`] owns a guarded stack and a saved register file. `start`
//! and `resume` transfer the calling thread into the context until it
//! yields or finishes; `yield_now` transfers back to whoever last
//! resumed it. The transfer is synchronous: the resumer's own flow
//! blocks until control comes back.
//!
//! ```text
//!   resumer stack                 coroutine stack
//!   -------------                 ---------------
//!   resume() --switch_context-->  body ... yield_now()
//!            <--switch_context--         |
//!   (returns Ok)                          v
//!   resume() --switch_context-->  ... body returns
//!            <--switch_context--  coro_entry: state = Completed
//!   (returns Ok, or re-raises the body's panic)
//! ```
//!
//! # Failure propagation
//!
//! A panic escaping the body is caught on the coroutine stack, so it
//! never unwinds through the switch frame, and is re-raised with
//! `resume_unwind` from the `start`/`resume` call that observed the
//! completion.
//!
//! # Teardown
//!
//! Dropping a suspended context forces a synchronous unwind of its
//! stack: the pending `yield_now` raises a private payload, destructors
//! run, and the context completes. A body that swallows the unwind and
//! suspends again gets its stack leaked with an error log.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::Weak;

use synca_core::error::{ContractViolation, SyncaResult};
use synca_core::{kdebug, kerror, kprint, kwarn, CoroId, CoroState};

use crate::current_arch::{self as arch, Registers};
use crate::memory::Stack;
use crate::task::Task;
use crate::{config, tls};

type Body = Box<dyn FnOnce() + Send + 'static>;

/// Runs on the resumer's stack right after the context switched out
pub(crate) type SuspendHook = Box<dyn FnOnce() + Send + 'static>;

/// Payload raised at a yield point to tear a dropped context down
struct ForcedUnwind;

/// Heap-pinned state of one context. Its address is handed to the
/// entry trampoline and stored in the thread-local current pointer.
pub(crate) struct Inner {
    id: CoroId,
    state: CoroState,
    stack_size: usize,
    stack: Option<Stack>,
    /// Saved registers of the coroutine while it is switched out
    regs: Registers,
    /// Saved registers of whoever switched in (the "return-to" point)
    caller: Registers,
    body: Option<Body>,
    panic: Option<Box<dyn Any + Send>>,
    on_suspend: Option<SuspendHook>,
    unwinding: bool,
    /// Owning task, when spawned through `go`
    task: Option<Weak<Task>>,
}

/// A resumable unit of computation with its own stack
pub struct Coro {
    inner: NonNull<Inner>,
}

// Safety: everything reachable from Inner is Send, and &mut self on
// start/resume keeps two threads from driving the same context.
unsafe impl Send for Coro {}

impl Coro {
    /// Idle context using the configured stack size
    pub fn new() -> Self {
        Self::with_stack_size(config::global().stack_size)
    }

    /// Idle context with an explicit stack size
    pub fn with_stack_size(stack_size: usize) -> Self {
        let inner = Box::new(Inner {
            id: CoroId::next(),
            state: CoroState::Idle,
            stack_size,
            stack: None,
            regs: Registers::default(),
            caller: Registers::default(),
            body: None,
            panic: None,
            on_suspend: None,
            unwinding: false,
            task: None,
        });
        Self {
            inner: NonNull::from(Box::leak(inner)),
        }
    }

    #[inline]
    pub fn id(&self) -> CoroId {
        unsafe { (*self.inner.as_ptr()).id }
    }

    #[inline]
    pub fn state(&self) -> CoroState {
        unsafe { (*self.inner.as_ptr()).state }
    }

    /// Started and not yet completed
    #[inline]
    pub fn is_started(&self) -> bool {
        self.state().is_in_flight()
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state().is_terminated()
    }

    /// Allocate a stack and run `body` on it until it first suspends
    /// or finishes.
    ///
    /// A completed context may be started again with a new body.
    pub fn start<F>(&mut self, body: F) -> SyncaResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let ptr = self.inner.as_ptr();
        unsafe {
            if (*ptr).state.is_in_flight() {
                return Err(ContractViolation::AlreadyStarted.into());
            }

            let stack = Stack::new((*ptr).stack_size)?;
            arch::init_context(&mut (*ptr).regs, stack.top(), coro_entry, ptr as usize);
            (*ptr).stack = Some(stack);
            (*ptr).body = Some(Box::new(body));
            (*ptr).panic = None;
            (*ptr).unwinding = false;
            (*ptr).state = CoroState::Started;
        }
        self.jump()
    }

    /// Continue a suspended context until it next suspends or finishes
    pub fn resume(&mut self) -> SyncaResult<()> {
        let state = self.state();
        if state.is_resumable() {
            return self.jump();
        }
        Err(match state {
            CoroState::Idle => ContractViolation::NotStarted,
            CoroState::Completed => ContractViolation::Completed,
            _ => ContractViolation::AlreadyRunning,
        }
        .into())
    }

    pub(crate) fn set_task(&mut self, task: Weak<Task>) {
        unsafe {
            (*self.inner.as_ptr()).task = Some(task);
        }
    }

    /// Switch into the context and handle whatever state it comes back in
    fn jump(&mut self) -> SyncaResult<()> {
        let ptr = self.inner.as_ptr();
        unsafe {
            (*ptr).state = CoroState::Running;
            let prev = tls::replace_current_coro(ptr as *mut u8);
            let prev_id = kprint::set_coro_id((*ptr).id);

            arch::switch_context(ptr::addr_of_mut!((*ptr).caller), ptr::addr_of!((*ptr).regs));

            kprint::set_coro_id(prev_id);
            tls::replace_current_coro(prev);

            match (*ptr).state {
                CoroState::Completed => {
                    // Nothing is live on the stack once coro_entry switched out
                    (*ptr).stack = None;
                    if let Some(payload) = (*ptr).panic.take() {
                        panic::resume_unwind(payload);
                    }
                }
                CoroState::Suspended => {
                    let hook = (*ptr).on_suspend.take();
                    if let Some(hook) = hook {
                        if !(*ptr).unwinding {
                            hook();
                        }
                    }
                }
                state => {
                    kerror!("coroutine {} switched out in state {}", (*ptr).id, state);
                }
            }
        }
        Ok(())
    }
}

impl Default for Coro {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coro")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Coro {
    fn drop(&mut self) {
        let ptr = self.inner.as_ptr();
        unsafe {
            match (*ptr).state {
                CoroState::Suspended => {
                    kwarn!("dropping suspended coroutine {}, forcing unwind", (*ptr).id);
                    (*ptr).unwinding = true;
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.jump())) {
                        kerror!(
                            "coroutine {} panicked during forced unwind: {}",
                            (*ptr).id,
                            panic_message(payload.as_ref())
                        );
                    }
                    if (*ptr).state != CoroState::Completed {
                        kerror!(
                            "coroutine {} suspended again while unwinding, leaking its stack",
                            (*ptr).id
                        );
                        std::mem::forget((*ptr).stack.take());
                        (*ptr).on_suspend = None;
                    }
                }
                CoroState::Started | CoroState::Running => {
                    // The body is still executing on this stack; nothing can be freed
                    kerror!("dropping running coroutine {}, leaking it", (*ptr).id);
                    return;
                }
                CoroState::Idle | CoroState::Completed => {}
            }
            kdebug!("coroutine {} released", (*ptr).id);
            drop(Box::from_raw(ptr));
        }
    }
}

/// First frame on every coroutine stack
extern "C" fn coro_entry(arg: usize) -> ! {
    let ptr = arg as *mut Inner;
    {
        let body = unsafe { (*ptr).body.take() };
        if let Some(body) = body {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                if !payload.is::<ForcedUnwind>() {
                    unsafe {
                        (*ptr).panic = Some(payload);
                    }
                }
            }
        }
    }
    unsafe {
        (*ptr).state = CoroState::Completed;
        arch::switch_context(ptr::addr_of_mut!((*ptr).regs), ptr::addr_of!((*ptr).caller));
    }
    // A completed context is never switched into again
    std::process::abort()
}

/// Suspend the current context, returning control to its resumer
///
/// Fails with `YieldOutsideCoro` when no context is running on this
/// thread.
pub fn yield_now() -> SyncaResult<()> {
    let ptr = tls::current_coro() as *mut Inner;
    if ptr.is_null() {
        return Err(ContractViolation::YieldOutsideCoro.into());
    }
    unsafe { suspend(ptr) };
    Ok(())
}

/// Suspend the current context and run `hook` on the resumer's side
/// once the switch has completed
pub(crate) fn suspend_with(hook: SuspendHook) -> SyncaResult<()> {
    let ptr = tls::current_coro() as *mut Inner;
    if ptr.is_null() {
        return Err(ContractViolation::YieldOutsideCoro.into());
    }
    unsafe {
        (*ptr).on_suspend = Some(hook);
        suspend(ptr);
    }
    Ok(())
}

unsafe fn suspend(ptr: *mut Inner) {
    (*ptr).state = CoroState::Suspended;
    arch::switch_context(ptr::addr_of_mut!((*ptr).regs), ptr::addr_of!((*ptr).caller));
    // Back in, possibly on another thread
    if (*ptr).unwinding {
        panic::resume_unwind(Box::new(ForcedUnwind));
    }
}

/// Check if the calling code runs inside an execution context
#[inline]
pub fn is_inside_coro() -> bool {
    tls::is_inside_coro()
}

/// Id of the context running on this thread, `CoroId::NONE` outside
pub fn current_id() -> CoroId {
    let ptr = tls::current_coro() as *mut Inner;
    if ptr.is_null() {
        CoroId::NONE
    } else {
        unsafe { (*ptr).id }
    }
}

/// Task owning the context running on this thread, if it was spawned
pub(crate) fn current_task() -> Option<std::sync::Arc<Task>> {
    let ptr = tls::current_coro() as *mut Inner;
    if ptr.is_null() {
        return None;
    }
    unsafe { (*ptr).task.as_ref().and_then(Weak::upgrade) }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
