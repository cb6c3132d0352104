use std::mem;

use crate::{Annotation, Source};

pub const DEFAULT_MAX_HISTORY: usize = 200;

/// Snapshot ledger for the current image's annotation list.
///
/// Every entry is a full copy of the list as it was before a mutation, most
/// recent last. A new push clears the redo side.
#[derive(Debug, Clone)]
pub struct History {
    undo: Vec<Vec<Annotation>>,
    redo: Vec<Vec<Annotation>>,
    max_history: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_history: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn push(&mut self, before: Vec<Annotation>) {
        log::debug!("history: push snapshot of {} annotations", before.len());
        self.undo.push(before);
        self.redo.clear();
        while self.undo.len() > self.max_history {
            self.undo.remove(0);
        }
    }

    /// Swap `current` with the newest undo snapshot. False when empty.
    pub fn undo(&mut self, current: &mut Vec<Annotation>) -> bool {
        let Some(previous) = self.undo.pop() else {
            return false;
        };
        self.redo.push(mem::replace(current, previous));
        log::debug!("history: undo ({} left)", self.undo.len());
        true
    }

    pub fn redo(&mut self, current: &mut Vec<Annotation>) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        self.undo.push(mem::replace(current, next));
        log::debug!("history: redo ({} left)", self.redo.len());
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

/// One drag-based edit of a single annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub target: String,
    pub before: Vec<Annotation>,
}

impl EditSession {
    pub fn begin(target: impl Into<String>, annotations: &[Annotation]) -> Self {
        Self {
            target: target.into(),
            before: annotations.to_vec(),
        }
    }

    /// Records the session if the target's shape changed. A recorded edit
    /// turns the target into a manual annotation.
    pub fn commit(self, history: &mut History, annotations: &mut [Annotation]) -> bool {
        let Some(after) = annotations.iter_mut().find(|a| a.id == self.target) else {
            return false;
        };
        let changed = self
            .before
            .iter()
            .find(|a| a.id == self.target)
            .is_some_and(|before| !before.same_shape(after));
        if !changed {
            return false;
        }
        after.source = Source::Manual;
        history.push(self.before);
        true
    }
}
