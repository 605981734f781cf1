//! The installer's single-threaded run loop.
//!
//! One loop owns the orchestrator for the whole run. Skins never call the
//! orchestrator directly; they enqueue an event through a [`RunLoopSender`]
//! and the loop delivers it at the next dispatch boundary. This is also the
//! cancellation granularity: an event sent while a nested transaction
//! runtime is blocking inside a phase is only seen once that phase returns.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Events delivered to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerEvent {
    /// Start the orchestrator (sent once by `main`).
    Run,
    /// The skin asks to begin installation.
    BeginInstall,
    /// The skin asks to cancel installation.
    CancelInstallation,
    /// The skin acknowledges completion.
    Shutdown,
}

#[derive(Debug, Default)]
struct LoopState {
    queue: VecDeque<InstallerEvent>,
    stopped: bool,
}

/// Handle for enqueueing events and stopping the loop. Cheap to clone;
/// single-threaded by design.
#[derive(Clone)]
pub struct RunLoopSender {
    state: Rc<RefCell<LoopState>>,
}

impl RunLoopSender {
    pub fn send(&self, event: InstallerEvent) {
        self.state.borrow_mut().queue.push_back(event);
    }

    pub fn stop(&self) {
        self.state.borrow_mut().stopped = true;
    }
}

/// The loop itself.
pub struct RunLoop {
    state: Rc<RefCell<LoopState>>,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoop {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopState::default())),
        }
    }

    pub fn sender(&self) -> RunLoopSender {
        RunLoopSender {
            state: Rc::clone(&self.state),
        }
    }

    /// Dispatch queued events until the loop is stopped or the queue runs
    /// dry. Events are only enqueued from within dispatched handlers (or
    /// before the loop starts), so a dry queue means nothing will ever
    /// arrive again.
    pub fn run(&self, mut handler: impl FnMut(InstallerEvent)) {
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                if state.stopped {
                    break;
                }
                state.queue.pop_front()
            };
            match next {
                Some(event) => handler(event),
                None => break,
            }
        }
    }
}
