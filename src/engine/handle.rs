use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use crate::engine::Resources;
use crate::error::ResolveError;
use crate::resource::Resource;

type Job = Box<dyn FnOnce() -> Result<Resources, ResolveError> + Send>;

enum State {
    /// Scheduled on the pool, not claimed by any thread yet.
    Pending(Job),
    /// Claimed by the thread with this id.
    Running(ThreadId),
    Done(Result<Resources, ResolveError>),
}

struct Slot {
    state: Mutex<State>,
    ready: Condvar,
    /// Flattened result, filled on first materialization.
    flat: OnceLock<Result<Arc<[Resource]>, ResolveError>>,
}

/// A shared reference to one computation of a producer for one query.
///
/// The computation is executed at most once. It is started by whichever
/// thread gets to it first: usually a worker of the pool, but a caller that
/// needs the result before any worker picked the job up runs it inline.
/// Because of that a waiting caller never starves the pool.
#[derive(Clone)]
pub(crate) struct Handle(Arc<Slot>);

enum Step {
    Finished(Result<Resources, ResolveError>),
    Claim,
    Wait,
    Cycle,
}

thread_local! {
    /// Handles whose results are being flattened on this thread, innermost
    /// last. The flag is set on every entry a cut cycle passed through.
    static READING: RefCell<Vec<(usize, bool)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a handle as being flattened on the current thread until dropped.
struct Reading {
    depth: usize,
}

impl Reading {
    /// `None` if the handle is already being flattened further up the stack,
    /// i.e. its result contains itself.
    fn enter(key: usize) -> Option<Self> {
        READING.with_borrow_mut(|stack| {
            if let Some(pos) = stack.iter().position(|(entry, _)| *entry == key) {
                for (_, cut) in &mut stack[pos + 1..] {
                    *cut = true;
                }
                return None;
            }

            stack.push((key, false));
            Some(Reading {
                depth: stack.len() - 1,
            })
        })
    }

    /// Whether nothing was left out of this read because of a cycle.
    fn is_complete(&self) -> bool {
        READING.with_borrow(|stack| !stack[self.depth].1)
    }
}

impl Drop for Reading {
    fn drop(&mut self) {
        READING.with_borrow_mut(|stack| stack.truncate(self.depth));
    }
}

impl Handle {
    pub(crate) fn new(job: Job) -> Self {
        Self(Arc::new(Slot {
            state: Mutex::new(State::Pending(job)),
            ready: Condvar::new(),
            flat: OnceLock::new(),
        }))
    }

    /// Claims and executes the job, unless some thread already did.
    pub(crate) fn run(&self) {
        let job = {
            let mut state = self.0.state.lock().unwrap();
            if !matches!(*state, State::Pending(_)) {
                return;
            }

            match std::mem::replace(&mut *state, State::Running(thread::current().id())) {
                State::Pending(job) => job,
                _ => unreachable!(),
            }
        };

        let result = job();

        *self.0.state.lock().unwrap() = State::Done(result);
        self.0.ready.notify_all();
    }

    /// Blocks until the job has finished and returns its direct output. The
    /// outer error is a wait on the job from inside the job itself; it is
    /// not the job's result.
    fn outcome(&self) -> Result<Result<Resources, ResolveError>, ResolveError> {
        let me = thread::current().id();
        let mut state = self.0.state.lock().unwrap();

        loop {
            let step = match &*state {
                State::Done(result) => Step::Finished(result.clone()),
                State::Pending(_) => Step::Claim,
                State::Running(owner) if *owner == me => Step::Cycle,
                State::Running(_) => Step::Wait,
            };

            match step {
                Step::Finished(result) => return Ok(result),
                Step::Cycle => {
                    return Err(ResolveError::configuration(
                        "cyclic request: a producer is waiting for its own result",
                    ));
                }
                Step::Claim => {
                    drop(state);
                    self.run();
                    state = self.0.state.lock().unwrap();
                }
                Step::Wait => {
                    state = self.0.ready.wait(state).unwrap();
                }
            }
        }
    }

    /// Blocks until the job and everything it composed has finished, then
    /// returns the flattened sequence. Repeated calls replay the same value.
    ///
    /// Results can contain each other when projects expose one another and
    /// share cache entries. A handle met again while its own result is being
    /// flattened contributes nothing, like a project met again on a query's
    /// path. Reads shortened that way are not stored.
    pub(crate) fn materialize(&self) -> Result<Arc<[Resource]>, ResolveError> {
        if let Some(flat) = self.0.flat.get() {
            return flat.clone();
        }

        // Not `get_or_init` around the whole read: a producer asking for its
        // own result from inside the job must reach the cycle check in
        // `outcome`, not a reentrant init.
        let result = self.outcome()?;

        let Some(reading) = Reading::enter(Arc::as_ptr(&self.0) as usize) else {
            tracing::trace!("cyclic result cut while flattening");
            return Ok(Arc::from([]));
        };

        let flat = result
            .and_then(|resources| resources.collect())
            .map(Arc::from);

        if reading.is_complete() {
            self.0.flat.get_or_init(|| flat).clone()
        } else {
            flat
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(*self.0.state.lock().unwrap(), State::Done(_))
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.0.state.lock().unwrap() {
            State::Pending(_) => "pending",
            State::Running(_) => "running",
            State::Done(Ok(_)) => "done",
            State::Done(Err(_)) => "failed",
        };

        write!(f, "Handle({state})")
    }
}
