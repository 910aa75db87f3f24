//! In-process execution guard.
//!
//! Entry points receive a [`Tracer`] they report statement offsets and dump
//! requests through. [`run_guarded`] turns an error or a panic from the entry
//! point into a located failure.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Display,
    panic::{catch_unwind, AssertUnwindSafe},
};

use super::ExecutionResult;
use crate::dump::{dump, DumpNode, Inspect};

pub struct Tracer {
    last_offset: Cell<Option<usize>>,
    dumps: RefCell<Vec<(String, DumpNode)>>,
    max_depth: usize,
    max_items: usize,
}

impl Tracer {
    pub fn new(max_depth: usize, max_items: usize) -> Self {
        Self {
            last_offset: Cell::new(None),
            dumps: RefCell::new(Vec::new()),
            max_depth,
            max_items,
        }
    }

    pub fn track(&self, offset: usize) {
        self.last_offset.set(Some(offset));
    }

    pub fn last_offset(&self) -> Option<usize> {
        self.last_offset.get()
    }

    /// Dump `value` now; `depth_hint` is capped by the tracer's own limit.
    pub fn dump(&self, label: &str, value: &dyn Inspect, depth_hint: usize) {
        let node = dump(value, depth_hint.min(self.max_depth), self.max_items);
        self.dumps.borrow_mut().push((label.to_string(), node));
    }

    fn into_values(self) -> Vec<(String, DumpNode)> {
        self.dumps.into_inner()
    }
}

/// Run `entry` and collect its dump requests. Errors and panics become a
/// failure at the last tracked offset; nothing escapes.
pub fn run_guarded<F, E>(max_depth: usize, max_items: usize, entry: F) -> ExecutionResult
where
    F: FnOnce(&Tracer) -> Result<(), E>,
    E: Display,
{
    let tracer = Tracer::new(max_depth, max_items);
    let outcome = catch_unwind(AssertUnwindSafe(|| entry(&tracer)));
    let offset = tracer.last_offset();
    match outcome {
        Ok(Ok(())) => ExecutionResult::Success(tracer.into_values()),
        Ok(Err(e)) => ExecutionResult::Failure { offset, message: e.to_string() },
        Err(payload) => ExecutionResult::Failure { offset, message: panic_message(payload.as_ref()) },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "entry point panicked".to_string()
    }
}
