//! Undo/redo over immutable document versions.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::document::GraphDocument;

/// Bounded stack of document versions with a cursor on the current one.
#[derive(Debug, Clone)]
pub struct History {
    versions: VecDeque<Arc<GraphDocument>>,
    current: usize,
    limit: usize,
}

impl History {
    /// Start from `initial`, keeping at most `limit` versions (at least 1).
    pub fn new(initial: Arc<GraphDocument>, limit: usize) -> Self {
        History {
            versions: VecDeque::from([initial]),
            current: 0,
            limit: limit.max(1),
        }
    }

    pub fn current(&self) -> Arc<GraphDocument> {
        Arc::clone(&self.versions[self.current])
    }

    /// Record a new version. Drops any redo tail and the oldest versions
    /// beyond the limit.
    pub fn push(&mut self, doc: Arc<GraphDocument>) {
        self.versions.truncate(self.current + 1);
        self.versions.push_back(doc);
        while self.versions.len() > self.limit {
            self.versions.pop_front();
        }
        self.current = self.versions.len() - 1;
    }

    pub fn undo(&mut self) -> Option<Arc<GraphDocument>> {
        if !self.can_undo() {
            return None;
        }
        self.current -= 1;
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<Arc<GraphDocument>> {
        if !self.can_redo() {
            return None;
        }
        self.current += 1;
        Some(self.current())
    }

    pub fn can_undo(&self) -> bool {
        self.current > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current + 1 < self.versions.len()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
