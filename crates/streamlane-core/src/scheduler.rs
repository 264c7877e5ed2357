//! Deferred task scheduling.
//!
//! Lanes never report a cancellation inline with the `cancel` call. The
//! check is posted to a [`Scheduler`] so that a completion already in flight
//! on the stream's own context is observed first.
//!
//! The default [`TurnScheduler`] binds that deferral to the thread that is
//! delivering stream signals: a cancel issued while a [`DispatchTurn`] is open
//! runs its check when the outermost turn on that thread closes. A cancel
//! issued outside any turn goes to the [`background_scheduler`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use tracing::{error, info, trace, warn};

use crate::error::{LaneError, Result};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks after the current dispatch turn.
pub trait Scheduler: Send + Sync {
    /// Queue a task. Must not run it inline.
    fn schedule(&self, task: Task);

    /// Scheduler name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A scheduler shared by every subscription of a lane.
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Name of the background thread started by [`ThreadScheduler::global`].
pub const DEFERRED_THREAD_NAME: &str = "streamlane-deferred";

/// The scheduler used by lanes that do not configure one.
pub fn default_scheduler() -> SharedScheduler {
    static DEFAULT: OnceLock<SharedScheduler> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(TurnScheduler) as SharedScheduler))
}

/// Pick a scheduler for work issued outside any dispatch turn.
///
/// Inside a tokio runtime this posts onto that runtime. Everywhere else it
/// uses the process-wide [`ThreadScheduler`].
pub fn background_scheduler() -> SharedScheduler {
    #[cfg(feature = "tokio")]
    {
        if let Some(scheduler) = TokioScheduler::current() {
            return Arc::new(scheduler);
        }
    }

    ThreadScheduler::global()
}

struct TurnState {
    depth: usize,
    draining: bool,
    deferred: VecDeque<Task>,
}

// Open dispatch turns on this thread and the work waiting for them to close.
thread_local! {
    static TURN: RefCell<TurnState> = const {
        RefCell::new(TurnState {
            depth: 0,
            draining: false,
            deferred: VecDeque::new(),
        })
    };
}

/// Marks the calling thread as delivering stream signals until dropped.
///
/// Turns nest. Tasks deferred while any turn is open run, in FIFO order,
/// right after the outermost turn on this thread closes.
#[must_use = "the turn closes when the guard is dropped"]
pub struct DispatchTurn {
    _thread_bound: PhantomData<*const ()>,
}

impl DispatchTurn {
    /// Open a turn on the calling thread.
    pub fn enter() -> Self {
        TURN.with(|turn| turn.borrow_mut().depth += 1);
        Self {
            _thread_bound: PhantomData,
        }
    }

    /// Check whether the calling thread is inside a turn.
    pub fn is_open() -> bool {
        TURN.with(|turn| {
            let turn = turn.borrow();
            turn.depth > 0 || turn.draining
        })
    }

    /// Queue a task for the end of the current turn.
    ///
    /// Hands the task back if the calling thread is not inside a turn.
    pub fn defer(task: Task) -> std::result::Result<(), Task> {
        TURN.with(|turn| {
            let mut turn = turn.borrow_mut();
            if turn.depth == 0 && !turn.draining {
                return Err(task);
            }
            turn.deferred.push_back(task);
            Ok(())
        })
    }

    fn drain() {
        let mut ran = 0usize;
        loop {
            // The borrow ends before the task runs so it can defer more work.
            let next = TURN.with(|turn| turn.borrow_mut().deferred.pop_front());
            match next {
                Some(task) => {
                    run_task(task);
                    ran += 1;
                }
                None => break,
            }
        }
        TURN.with(|turn| turn.borrow_mut().draining = false);
        trace!(tasks = ran, "Dispatch turn drained");
    }
}

impl Drop for DispatchTurn {
    fn drop(&mut self) {
        let drain = TURN.with(|turn| {
            let mut turn = turn.borrow_mut();
            turn.depth -= 1;
            if turn.depth > 0 || turn.draining || turn.deferred.is_empty() {
                return false;
            }
            turn.draining = true;
            true
        });
        if drain {
            Self::drain();
        }
    }
}

impl std::fmt::Debug for DispatchTurn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let depth = TURN.with(|turn| turn.borrow().depth);
        f.debug_struct("DispatchTurn").field("depth", &depth).finish()
    }
}

/// Runs tasks when the current [`DispatchTurn`] closes.
///
/// Outside a turn, tasks go to the [`background_scheduler`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnScheduler;

impl Scheduler for TurnScheduler {
    fn schedule(&self, task: Task) {
        if let Err(task) = DispatchTurn::defer(task) {
            background_scheduler().schedule(task);
        }
    }

    fn name(&self) -> &'static str {
        "turn"
    }
}

fn run_task(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        warn!("Deferred task panicked");
    }
}

/// An explicit FIFO task queue drained by its owner.
///
/// Useful for single-threaded event loops and deterministic tests: nothing
/// runs until [`run_pending`](Self::run_pending) or
/// [`run_until_idle`](Self::run_until_idle) is called.
#[derive(Default)]
pub struct RunLoop {
    queue: Mutex<VecDeque<Task>>,
}

impl RunLoop {
    /// Create an empty run loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide run loop, used when no background thread can be started.
    pub fn main() -> Arc<RunLoop> {
        static MAIN: OnceLock<Arc<RunLoop>> = OnceLock::new();
        Arc::clone(MAIN.get_or_init(|| Arc::new(RunLoop::new())))
    }

    /// Run the tasks queued before this call.
    ///
    /// Tasks queued while running wait for the next turn. Returns the number
    /// of tasks run.
    pub fn run_pending(&self) -> usize {
        let turn = self.queue.lock().len();
        for _ in 0..turn {
            // The lock is released before the task runs so it can reschedule.
            let next = self.queue.lock().pop_front();
            match next {
                Some(task) => run_task(task),
                None => return turn,
            }
        }
        turn
    }

    /// Run turns until the queue is empty. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Scheduler for RunLoop {
    fn schedule(&self, task: Task) {
        self.queue.lock().push_back(task);
    }

    fn name(&self) -> &'static str {
        "run_loop"
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Runs tasks on a dedicated background thread, in FIFO order.
pub struct ThreadScheduler {
    sender: Sender<Task>,
}

impl ThreadScheduler {
    /// Start a worker thread with the given name.
    ///
    /// The thread exits once the scheduler is dropped and its queue drained.
    pub fn new(thread_name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded::<Task>();
        let name = thread_name.to_string();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for task in receiver {
                    run_task(task);
                }
                info!(thread = %name, "Deferred task thread stopped");
            })?;

        info!(thread = thread_name, "Started deferred task thread");

        Ok(Self { sender })
    }

    /// The process-wide background scheduler, started on first use.
    ///
    /// If the thread cannot be started, falls back to [`RunLoop::main`].
    pub fn global() -> SharedScheduler {
        static GLOBAL: OnceLock<SharedScheduler> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| match ThreadScheduler::new(DEFERRED_THREAD_NAME) {
            Ok(scheduler) => Arc::new(scheduler) as SharedScheduler,
            Err(e) => {
                error!(error = %e, "Deferred task thread unavailable; using RunLoop::main()");
                RunLoop::main()
            }
        }))
    }

    /// Queue a task, reporting a stopped worker.
    pub fn try_schedule(&self, task: Task) -> Result<()> {
        self.sender.send(task).map_err(|_| LaneError::SchedulerClosed)
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        if let Err(e) = self.try_schedule(task) {
            warn!(error = %e, "Dropped deferred task");
        }
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

impl std::fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScheduler")
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// Posts tasks onto a tokio runtime.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioScheduler {
    /// Schedule onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime of the calling thread, if there is one.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        self.handle.spawn(async move { run_task(task) });
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}
