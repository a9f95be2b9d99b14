//! Deferred-callback scheduling.
//!
//! Both coalescing tiers are built on the host's deferral primitives:
//! Sensor Agents defer their flush by one task (`setTimeout`),
//! Observers defer theirs by one microtask (`queueMicrotask`).
//!
//! `ManualScheduler` is a virtual event loop for deterministic tests.
//! Nothing runs until the test drives it, and it keeps the HTML ordering
//! rule: a microtask checkpoint follows every task.

use std::cell::RefCell;
use std::collections::VecDeque;

/// A deferred unit of work.
pub type Job = Box<dyn FnOnce()>;

/// How far a job is pushed back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// Runs in a later turn of the event loop, after the current task and
    /// its microtasks have finished.
    Task,
    /// Runs once the current synchronous segment has drained, before the
    /// event loop moves on to the next task.
    Microtask,
}

pub trait Scheduler {
    fn defer(&self, granularity: Granularity, job: Job);
}

/// Virtual event loop with separate task and microtask queues.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: RefCell<VecDeque<Job>>,
    microtasks: RefCell<VecDeque<Job>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.borrow().is_empty() && self.microtasks.borrow().is_empty()
    }

    /// Microtask checkpoint: run microtasks until the queue is empty,
    /// including ones queued while draining.
    pub fn run_microtasks(&self) {
        loop {
            // The borrow must end before the job runs; jobs may queue more work.
            let next = self.microtasks.borrow_mut().pop_front();
            match next {
                Some(job) => job(),
                None => break,
            }
        }
    }

    /// Run the oldest task followed by a microtask checkpoint.
    ///
    /// Returns `false` when there was no task to run.
    pub fn run_next_task(&self) -> bool {
        let next = self.tasks.borrow_mut().pop_front();
        match next {
            Some(job) => {
                job();
                self.run_microtasks();
                true
            }
            None => false,
        }
    }

    /// Run everything that is queued, and everything that gets queued
    /// along the way, until both queues are empty.
    pub fn run_until_idle(&self) {
        self.run_microtasks();
        while self.run_next_task() {}
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, granularity: Granularity, job: Job) {
        match granularity {
            Granularity::Task => self.tasks.borrow_mut().push_back(job),
            Granularity::Microtask => self.microtasks.borrow_mut().push_back(job),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Job) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |label: &'static str| -> Job {
                let log = log.clone();
                Box::new(move || log.borrow_mut().push(label))
            }
        };
        (log, make)
    }

    #[test]
    fn nothing_runs_until_driven() {
        let scheduler = ManualScheduler::new();
        let (log, job) = recorder();

        scheduler.defer(Granularity::Task, job("task"));
        scheduler.defer(Granularity::Microtask, job("micro"));

        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending_tasks(), 1);
        assert_eq!(scheduler.pending_microtasks(), 1);
        assert!(!scheduler.is_idle());
    }

    #[test]
    fn microtasks_run_before_the_next_task() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (log, job) = recorder();

        scheduler.defer(Granularity::Task, job("task 1"));
        scheduler.defer(Granularity::Task, {
            let scheduler = scheduler.clone();
            let log = log.clone();
            let micro = job("micro from task 2");
            Box::new(move || {
                log.borrow_mut().push("task 2");
                scheduler.defer(Granularity::Microtask, micro);
            })
        });
        scheduler.defer(Granularity::Task, job("task 3"));
        scheduler.defer(Granularity::Microtask, job("micro"));

        scheduler.run_until_idle();

        assert_eq!(
            *log.borrow(),
            ["micro", "task 1", "task 2", "micro from task 2", "task 3"]
        );
        assert!(scheduler.is_idle());
    }

    #[test]
    fn checkpoint_drains_nested_microtasks() {
        let scheduler = Rc::new(ManualScheduler::new());
        let (log, job) = recorder();

        scheduler.defer(Granularity::Microtask, {
            let scheduler = scheduler.clone();
            let nested = job("nested");
            Box::new(move || scheduler.defer(Granularity::Microtask, nested))
        });
        scheduler.run_microtasks();

        assert_eq!(*log.borrow(), ["nested"]);
    }

    #[test]
    fn run_next_task_reports_empty_queue() {
        let scheduler = ManualScheduler::new();
        assert!(!scheduler.run_next_task());
    }
}
