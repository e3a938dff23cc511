//! Bounded in-memory ring of completed executions.
//!
//! Kept purely in memory — execution history is not a durable audit log,
//! just enough recent context to answer "what happened to job X" without
//! unbounded growth. A `VecDeque` plus a logical-sequence-number index
//! gives O(1) lookup by id without rewriting the index on every eviction.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use uuid::Uuid;

use super::executor::ExecutionResult;

struct Inner {
    entries: VecDeque<ExecutionResult>,
    index: HashMap<Uuid, usize>,
    base_seq: usize,
    capacity: usize,
}

impl Inner {
    fn seq_of(&self, pos: usize) -> usize {
        self.base_seq + pos
    }
}

pub struct ExecutionHistory {
    inner: RwLock<Inner>,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                index: HashMap::new(),
                base_seq: 0,
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn insert(&self, result: ExecutionResult) {
        let mut inner = self.inner.write();
        let id = result.id;
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
            inner.base_seq += 1;
        }
        inner.entries.push_back(result);
        let seq = inner.seq_of(inner.entries.len() - 1);
        inner.index.insert(id, seq);
    }

    pub fn get(&self, id: &Uuid) -> Option<ExecutionResult> {
        let inner = self.inner.read();
        let seq = *inner.index.get(id)?;
        let pos = seq.checked_sub(inner.base_seq)?;
        inner.entries.get(pos).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn recent(&self, limit: usize) -> Vec<ExecutionResult> {
        let inner = self.inner.read();
        inner.entries.iter().rev().take(limit).cloned().collect()
    }
}
