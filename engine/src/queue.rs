//! Per-record operation queue.
//!
//! Strict FIFO with single-flight: [`OperationQueue::start_next`] hands out
//! the head only when nothing is running. The queue is a plain work list;
//! the scheduler drains it.

use crate::operation::{Operation, OperationState};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct OperationQueue {
    running: Option<Operation>,
    waiting: VecDeque<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    ///
    /// An interrupting operation supersedes everything still waiting (never
    /// the running one). The superseded operations are returned.
    pub fn enqueue(&mut self, mut op: Operation) -> Vec<Operation> {
        let superseded = if op.interrupts() {
            self.waiting
                .drain(..)
                .map(|mut waiting| {
                    waiting.state = OperationState::Superseded;
                    waiting
                })
                .collect()
        } else {
            Vec::new()
        };

        op.state = OperationState::Queued;
        self.waiting.push_back(op);
        superseded
    }

    /// Pop the head and mark it running, if nothing is running.
    pub fn start_next(&mut self) -> Option<Operation> {
        if self.running.is_some() {
            return None;
        }
        let mut op = self.waiting.pop_front()?;
        op.state = OperationState::Running;
        self.running = Some(op.clone());
        Some(op)
    }

    /// Finish the running operation.
    ///
    /// Follow-ups go to the front of the queue, in order, so they run before
    /// older waiting work.
    pub fn finish(&mut self, state: OperationState, follow_ups: Vec<Operation>) -> Option<Operation> {
        let finished = self.running.take().map(|mut op| {
            op.state = state;
            op
        });

        for mut op in follow_ups.into_iter().rev() {
            op.state = OperationState::Queued;
            self.waiting.push_front(op);
        }

        finished
    }

    pub fn running(&self) -> Option<&Operation> {
        self.running.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Has a head and nothing running.
    pub fn has_ready(&self) -> bool {
        self.running.is_none() && !self.waiting.is_empty()
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_none() && self.waiting.is_empty()
    }

    /// Waiting operations, excluding the running one.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn waiting(&self) -> impl Iterator<Item = &Operation> {
        self.waiting.iter()
    }
}
