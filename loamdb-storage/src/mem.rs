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

//! In-memory write-accumulating trees
//!
//! A [`MemTree`] holds the statements of recent writes, ordered by
//! (key ascending, LSN descending), so the version chain of a key reads
//! newest-first and a lower-bound seek at `(key, vlsn)` lands on the
//! newest statement visible in a snapshot. The index keeps one active
//! mem plus a list of sealed ones awaiting dump; see
//! [`crate::index::MemList`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use loamdb_core::{Tuple, Value};

use crate::keydef::KeyDef;
use crate::statement::{Lsn, Statement};

/// Composite tree key: key image ascending, then LSN descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemKey {
    key: Vec<Value>,
    lsn: Lsn,
}

impl MemKey {
    pub(crate) fn new(key: Vec<Value>, lsn: Lsn) -> Self {
        Self { key, lsn }
    }

    pub(crate) fn key(&self) -> &[Value] {
        &self.key
    }
}

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.lsn.cmp(&self.lsn))
    }
}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One in-memory tree, active or sealed.
#[derive(Debug)]
pub struct MemTree {
    id: u64,
    cmp_def: Arc<KeyDef>,
    tree: RwLock<BTreeMap<MemKey, Arc<Statement>>>,
    sealed: AtomicBool,
}

impl MemTree {
    pub fn new(id: u64, cmp_def: Arc<KeyDef>) -> Self {
        Self {
            id,
            cmp_def,
            tree: RwLock::new(BTreeMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn cmp_def(&self) -> &Arc<KeyDef> {
        &self.cmp_def
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(AtomicOrdering::Acquire)
    }

    /// Stop accepting writes. Called on rotation.
    pub fn seal(&self) {
        self.sealed.store(true, AtomicOrdering::Release);
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    /// Insert a committed statement.
    pub fn insert(&self, stmt: Arc<Statement>) {
        assert!(!self.is_sealed(), "insert into a sealed mem");
        let key = self.cmp_def.extract_key(stmt.tuple());
        self.tree.write().insert(MemKey::new(key, stmt.lsn()), stmt);
    }

    /// All statements in tree order (key ascending, LSN descending).
    /// This is the order a dump writes them in.
    pub fn statements(&self) -> Vec<Arc<Statement>> {
        self.tree.read().values().cloned().collect()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, BTreeMap<MemKey, Arc<Statement>>> {
        self.tree.read()
    }

    /// Lower-bound seek target for the newest statement of `key` visible
    /// at `vlsn`.
    pub(crate) fn seek_bound(&self, key: &Tuple, vlsn: Lsn) -> MemKey {
        MemKey::new(self.cmp_def.extract_key(key), vlsn)
    }
}
