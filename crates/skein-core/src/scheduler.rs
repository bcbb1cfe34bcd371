//! Micro-task scheduler.
//!
//! A FIFO job queue behind a counting semaphore. Jobs run one at a time and
//! never interleave: a job scheduled while another runs (or while the
//! scheduler is held) waits until the queue is released.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

pub type Job = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct Scheduler {
    queue: RefCell<VecDeque<Job>>,
    semaphore: Cell<usize>,
}

/// Releases one lock on drop, including during unwinding.
struct Lock<'a>(&'a Scheduler);

impl Drop for Lock<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Keeps the scheduler suspended; flushes the queue when dropped.
#[must_use = "the scheduler is released as soon as the hold is dropped"]
pub struct Hold<'a>(&'a Scheduler);

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.release();
        } else {
            self.0.flush();
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job`; run the queue right away unless suspended.
    pub fn asap(&self, job: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(job));
        if self.semaphore.get() == 0 {
            self.suspend();
            self.flush();
        }
    }

    pub fn suspend(&self) {
        self.semaphore.set(self.semaphore.get() + 1);
    }

    fn release(&self) {
        self.semaphore.set(self.semaphore.get().saturating_sub(1));
    }

    /// Release one lock, then run queued jobs while nothing holds the scheduler.
    pub fn flush(&self) {
        self.release();
        while self.semaphore.get() == 0 {
            let job = self.queue.borrow_mut().pop_front();
            match job {
                Some(job) => self.exec(job),
                None => break,
            }
        }
    }

    /// Suspend until the returned guard is dropped.
    pub fn hold(&self) -> Hold<'_> {
        self.suspend();
        Hold(self)
    }

    pub fn is_suspended(&self) -> bool {
        self.semaphore.get() > 0
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    fn exec(&self, job: Job) {
        self.suspend();
        let _lock = Lock(self);
        job();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("semaphore", &self.semaphore.get())
            .field("pending", &self.pending())
            .finish()
    }
}
