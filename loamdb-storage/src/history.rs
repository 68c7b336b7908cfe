// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Key history
//!
//! The history of a key is the sequence of statements collected by one
//! point lookup, appended in scan order: source precedence first
//! (transaction write set, cache, mems, runs), descending LSN within each
//! source. The head is therefore the newest statement and the tail the
//! oldest. A history is *terminal* once its tail is a full tuple or a
//! tombstone; scanning stops there, and materialization folds the upsert
//! chain from the tail upward.
//!
//! The history lives only for the duration of one lookup. Dropping or
//! clearing it releases every statement reference it holds.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::statement::{Statement, PENDING_LSN};

/// Which scanner contributed a history node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    /// The caller's transaction write set.
    TxWrite,
    /// The shared result cache.
    Cache,
    /// An in-memory write-accumulating tree.
    Mem,
    /// An on-disk run slice.
    Run,
}

/// One collected statement and where it came from.
#[derive(Debug, Clone)]
pub struct HistoryNode {
    src: SourceTag,
    stmt: Arc<Statement>,
}

impl HistoryNode {
    #[inline]
    pub fn source(&self) -> SourceTag {
        self.src
    }

    #[inline]
    pub fn statement(&self) -> &Arc<Statement> {
        &self.stmt
    }
}

/// Ordered statement history of one key, newest first.
#[derive(Debug, Default)]
pub struct History {
    nodes: SmallVec<[HistoryNode; 4]>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node at the tail.
    pub fn append(&mut self, src: SourceTag, stmt: Arc<Statement>) {
        if let Some(last) = self.nodes.last() {
            // LSNs strictly decrease along the history; pending-LSN heads
            // (write-set entries, cache absent-markers) are exempt.
            if last.stmt.lsn() != PENDING_LSN {
                debug_assert!(stmt.lsn() < last.stmt.lsn());
            }
        }
        self.nodes.push(HistoryNode { src, stmt });
    }

    /// Drop every node, releasing the statement references.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The tail node, i.e. the oldest statement collected so far.
    #[inline]
    pub fn tail(&self) -> Option<&HistoryNode> {
        self.nodes.last()
    }

    /// True iff the history ends in a full tuple or a tombstone. Later
    /// sources need not be consulted once this holds.
    pub fn is_terminal(&self) -> bool {
        self.nodes.last().is_some_and(|n| n.stmt.is_terminal())
    }

    /// Whether any node came from `src`.
    pub fn has_source(&self, src: SourceTag) -> bool {
        self.nodes.iter().any(|n| n.src == src)
    }

    /// Iterate from the tail toward the head, i.e. oldest statement first.
    /// This is the materialization order.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &HistoryNode> {
        self.nodes.iter().rev()
    }
}
