// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-threaded task scheduler.
//!
//! Nothing runs concurrently: completing a task queues a step for every
//! state machine waiting on it, and the interpreter drains the queue one
//! job at a time.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::value::{TaskRef, TaskState, TaskStatus, Value};

#[derive(Debug)]
pub enum Job {
    /// Finish a task that was handed out pending.
    Complete(TaskRef, Value),
    /// Step a suspended state machine.
    Resume(Value),
}

#[derive(Debug, Default)]
pub struct Scheduler {
    jobs: VecDeque<Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A task that completes with `value` on a later turn.
    pub fn deferred(&mut self, value: Value) -> TaskRef {
        let task = TaskState::pending();
        self.jobs.push_back(Job::Complete(Rc::clone(&task), value));
        task
    }

    pub fn complete(&mut self, task: &TaskRef, value: Value) {
        self.finish(task, TaskStatus::Completed(value));
    }

    pub fn fault(&mut self, task: &TaskRef, exception: Value) {
        self.finish(task, TaskStatus::Faulted(exception));
    }

    fn finish(&mut self, task: &TaskRef, status: TaskStatus) {
        let waiting = {
            let mut state = task.borrow_mut();
            if state.is_completed() {
                return;
            }
            state.status = status;
            std::mem::take(&mut state.continuations)
        };
        self.jobs.extend(waiting.into_iter().map(Job::Resume));
    }

    /// Step `machine` once `task` finishes, or on the next turn if it
    /// already has.
    pub fn on_completed(&mut self, task: &TaskRef, machine: Value) {
        let mut state = task.borrow_mut();
        if state.is_completed() {
            self.jobs.push_back(Job::Resume(machine));
        } else {
            state.continuations.push(machine);
        }
    }

    pub fn next_job(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_wakes_waiters_in_order() {
        let mut scheduler = Scheduler::new();
        let task = TaskState::pending();
        scheduler.on_completed(&task, Value::Int(1));
        scheduler.on_completed(&task, Value::Int(2));
        assert!(scheduler.is_idle());

        scheduler.complete(&task, Value::Void);
        let woken: Vec<Value> = std::iter::from_fn(|| scheduler.next_job())
            .map(|job| match job {
                Job::Resume(machine) => machine,
                other => panic!("unexpected job {:?}", other),
            })
            .collect();
        assert_eq!(woken, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn waiting_on_a_finished_task_resumes_next_turn() {
        let mut scheduler = Scheduler::new();
        let task = TaskState::completed(Value::Int(3));
        scheduler.on_completed(&task, Value::Null);
        assert!(matches!(scheduler.next_job(), Some(Job::Resume(Value::Null))));
    }

    #[test]
    fn second_completion_is_ignored() {
        let mut scheduler = Scheduler::new();
        let task = TaskState::pending();
        scheduler.complete(&task, Value::Int(1));
        scheduler.fault(&task, Value::exception("late", None));
        assert!(matches!(task.borrow().status, TaskStatus::Completed(Value::Int(1))));
    }

    #[test]
    fn deferred_task_completes_when_its_job_runs() {
        let mut scheduler = Scheduler::new();
        let task = scheduler.deferred(Value::Void);
        assert!(!task.borrow().is_completed());
        match scheduler.next_job() {
            Some(Job::Complete(t, v)) => scheduler.complete(&t, v),
            other => panic!("unexpected job {:?}", other),
        }
        assert!(task.borrow().is_completed());
    }
}
